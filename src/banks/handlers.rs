use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;

use crate::{auth::jwt::AuthUser, state::AppState};

use super::dto::{
    AccountsQuery, BankInfo, ClientsResponse, ConnectBankRequest, ConnectionResponse,
    ConsentResponse, CreateConsentRequest, DataEnvelope, TransactionsQuery,
};
use super::error::BankError;
use super::service;

pub fn discovery_routes() -> Router<AppState> {
    Router::new().route("/banks/available", get(available))
}

pub fn connection_routes() -> Router<AppState> {
    Router::new()
        .route("/banks/connections", get(list_connections))
        .route("/banks/connect", post(connect))
        .route("/banks/connections/:bank_code", delete(disconnect))
        .route("/banks/connections/:bank_code/clients", get(list_clients))
        .route(
            "/banks/connections/:bank_code/consents",
            post(create_consent),
        )
        .route("/banks/connections/:bank_code/accounts", get(accounts))
        .route(
            "/banks/connections/:bank_code/transactions",
            get(transactions),
        )
}

/// The only unauthenticated bank endpoint: which banks can be linked at all.
#[instrument(skip(state))]
pub async fn available(State(state): State<AppState>) -> Json<Vec<BankInfo>> {
    Json(service::available_banks(&state))
}

#[instrument(skip(state))]
pub async fn list_connections(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> Result<Json<Vec<ConnectionResponse>>, BankError> {
    let connections = service::list_connections(&state, user_id).await?;
    Ok(Json(connections))
}

#[instrument(skip(state, payload))]
pub async fn connect(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<ConnectBankRequest>,
) -> Result<(StatusCode, Json<ConnectionResponse>), BankError> {
    let connection = service::connect(&state, user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(connection)))
}

#[instrument(skip(state))]
pub async fn disconnect(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(bank_code): Path<String>,
) -> Result<StatusCode, BankError> {
    service::disconnect(&state, user_id, &bank_code).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state))]
pub async fn list_clients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(bank_code): Path<String>,
) -> Result<Json<ClientsResponse>, BankError> {
    let clients = service::list_clients(&state, user_id, &bank_code).await?;
    Ok(Json(ClientsResponse { clients }))
}

#[instrument(skip(state, payload))]
pub async fn create_consent(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(bank_code): Path<String>,
    Json(payload): Json<CreateConsentRequest>,
) -> Result<(StatusCode, Json<ConsentResponse>), BankError> {
    let consent = service::create_consent(&state, user_id, &bank_code, payload).await?;
    Ok((StatusCode::CREATED, Json(consent)))
}

#[instrument(skip(state))]
pub async fn accounts(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(bank_code): Path<String>,
    Query(query): Query<AccountsQuery>,
) -> Result<Json<DataEnvelope>, BankError> {
    let data = service::fetch_accounts(&state, user_id, &bank_code, query.client_id).await?;
    Ok(Json(DataEnvelope { data }))
}

#[instrument(skip(state))]
pub async fn transactions(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(bank_code): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<DataEnvelope>, BankError> {
    let data = service::fetch_transactions(
        &state,
        user_id,
        &bank_code,
        query.account_id,
        query.client_id,
    )
    .await?;
    Ok(Json(DataEnvelope { data }))
}
