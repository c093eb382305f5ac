use crate::state::AppState;
use axum::Router;

pub mod directory;
mod dto;
pub mod error;
pub mod handlers;
pub mod proxy;
pub mod repo;
pub mod service;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::discovery_routes())
        .merge(handlers::connection_routes())
}
