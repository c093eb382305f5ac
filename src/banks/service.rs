//! Connection lifecycle: connect / disconnect / consent / data fetches.
//!
//! Every operation is scoped to the authenticated user before anything else
//! touches the store or the wire, and every outbound call goes through the
//! per-bank proxy built from the directory entry plus any connection-scoped
//! credentials.

use serde_json::Value;
use time::{Duration as TimeDuration, OffsetDateTime};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::state::AppState;

use super::directory::BankConfig;
use super::dto::{
    default_permissions, BankInfo, ConnectBankRequest, ConnectionResponse, ConsentResponse,
    CreateConsentRequest,
};
use super::error::BankError;
use super::proxy::BankProxy;
use super::repo::{BankConnection, NewConnection};

/// Fallback token lifetime when the bank does not report `expires_in`.
const DEFAULT_TOKEN_TTL_SECS: i64 = 86_400;

pub fn available_banks(state: &AppState) -> Vec<BankInfo> {
    state
        .banks
        .list_all()
        .iter()
        .map(|bank| BankInfo {
            code: bank.code.clone(),
            name: bank.name.clone(),
            base_url: bank.base_url.clone(),
        })
        .collect()
}

pub async fn list_connections(
    state: &AppState,
    user_id: Uuid,
) -> Result<Vec<ConnectionResponse>, BankError> {
    let rows = BankConnection::list_for_user(&state.db, user_id).await?;
    Ok(rows.into_iter().map(ConnectionResponse::from).collect())
}

fn lookup_bank<'a>(state: &'a AppState, bank_code: &str) -> Result<&'a BankConfig, BankError> {
    state
        .banks
        .lookup(bank_code)
        .ok_or_else(|| BankError::NotFound(format!("Bank '{bank_code}' not found")))
}

/// The caller's active connection, or `NotFound`. A connection owned by
/// someone else is deliberately indistinguishable from "not connected".
async fn load_active(
    state: &AppState,
    user_id: Uuid,
    bank_code: &str,
) -> Result<BankConnection, BankError> {
    BankConnection::find_active(&state.db, user_id, bank_code)
        .await?
        .ok_or_else(|| BankError::NotFound(format!("No active connection to bank '{bank_code}'")))
}

fn proxy_for(state: &AppState, config: &BankConfig, conn: &BankConnection) -> BankProxy {
    BankProxy::new(state.http.clone(), config)
        .with_credentials(conn.client_id.as_deref(), conn.client_secret.as_deref())
}

/// Connect is atomic: the row is only inserted after the token exchange
/// succeeds, so either a usable connection exists or none does.
#[instrument(skip(state, req), fields(bank_code = %req.bank_code))]
pub async fn connect(
    state: &AppState,
    user_id: Uuid,
    req: ConnectBankRequest,
) -> Result<ConnectionResponse, BankError> {
    let config = lookup_bank(state, &req.bank_code)?;

    if BankConnection::find_active(&state.db, user_id, &req.bank_code)
        .await?
        .is_some()
    {
        return Err(BankError::AlreadyConnected(format!(
            "Bank '{}' is already connected",
            req.bank_code
        )));
    }

    let proxy = BankProxy::new(state.http.clone(), config)
        .with_credentials(Some(&req.client_id), Some(&req.client_secret));
    let grant = proxy.exchange_token().await?;

    let access_token = state.tokens.encrypt(&grant.access_token)?;
    let refresh_token = grant
        .refresh_token
        .as_deref()
        .map(|t| state.tokens.encrypt(t))
        .transpose()?;
    let expires_at = OffsetDateTime::now_utc()
        + TimeDuration::seconds(grant.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));

    let row = BankConnection::insert(
        &state.db,
        NewConnection {
            user_id,
            bank_code: &req.bank_code,
            bank_name: &config.name,
            client_id: Some(&req.client_id),
            client_secret: Some(&req.client_secret),
            access_token: &access_token,
            refresh_token: refresh_token.as_deref(),
            token_expires_at: Some(expires_at),
        },
    )
    .await?;

    info!(user_id = %user_id, bank_code = %row.bank_code, connection_id = %row.id, "bank connected");
    Ok(row.into())
}

#[instrument(skip(state))]
pub async fn disconnect(
    state: &AppState,
    user_id: Uuid,
    bank_code: &str,
) -> Result<(), BankError> {
    let conn = load_active(state, user_id, bank_code).await?;
    BankConnection::revoke(&state.db, conn.id).await?;
    info!(user_id = %user_id, bank_code = %bank_code, connection_id = %conn.id, "bank disconnected");
    Ok(())
}

#[instrument(skip(state))]
pub async fn list_clients(
    state: &AppState,
    user_id: Uuid,
    bank_code: &str,
) -> Result<Vec<Value>, BankError> {
    let config = lookup_bank(state, bank_code)?;
    let conn = load_active(state, user_id, bank_code).await?;
    proxy_for(state, config, &conn).list_clients().await
}

#[instrument(skip(state, req))]
pub async fn create_consent(
    state: &AppState,
    user_id: Uuid,
    bank_code: &str,
    req: CreateConsentRequest,
) -> Result<ConsentResponse, BankError> {
    let config = lookup_bank(state, bank_code)?;
    let conn = load_active(state, user_id, bank_code).await?;

    let permissions = if req.permissions.is_empty() {
        default_permissions()
    } else {
        req.permissions
    };

    let access_token = state.tokens.decrypt(&conn.access_token)?;
    let grant = proxy_for(state, config, &conn)
        .create_consent(
            &access_token,
            &req.client_id,
            &permissions,
            req.requesting_bank_name.as_deref(),
        )
        .await?;

    let row = BankConnection::record_consent(
        &state.db,
        conn.id,
        grant.status.as_deref(),
        grant.consent_id.as_deref(),
    )
    .await?;

    info!(user_id = %user_id, bank_code = %bank_code, status = %row.consent_status, "consent recorded");
    Ok(ConsentResponse {
        consent_id: row.consent_id,
        request_id: grant.request_id,
        status: row.consent_status,
        message: grant.message,
        auto_approved: grant.auto_approved,
    })
}

#[instrument(skip(state))]
pub async fn fetch_accounts(
    state: &AppState,
    user_id: Uuid,
    bank_code: &str,
    client_id: Option<String>,
) -> Result<Value, BankError> {
    // Correlation ids are checked before any store or network I/O.
    let client_id = client_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BankError::BadRequest("client_id query parameter is required".into()))?;

    let config = lookup_bank(state, bank_code)?;
    let conn = load_active(state, user_id, bank_code).await?;

    let access_token = state.tokens.decrypt(&conn.access_token)?;
    let payload = proxy_for(state, config, &conn)
        .fetch_accounts(&access_token, conn.consent_id.as_deref(), &client_id)
        .await?;

    BankConnection::touch_sync(&state.db, conn.id).await?;
    Ok(payload)
}

#[instrument(skip(state))]
pub async fn fetch_transactions(
    state: &AppState,
    user_id: Uuid,
    bank_code: &str,
    account_id: Option<String>,
    client_id: Option<String>,
) -> Result<Value, BankError> {
    let account_id = account_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BankError::BadRequest("account_id query parameter is required".into()))?;
    let client_id = client_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BankError::BadRequest("client_id query parameter is required".into()))?;

    let config = lookup_bank(state, bank_code)?;
    let conn = load_active(state, user_id, bank_code).await?;

    let access_token = state.tokens.decrypt(&conn.access_token)?;
    let payload = proxy_for(state, config, &conn)
        .fetch_transactions(
            &access_token,
            conn.consent_id.as_deref(),
            &client_id,
            &account_id,
        )
        .await?;

    BankConnection::touch_sync(&state.db, conn.id).await?;
    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    // These guards must fire before any database or network I/O, so a fake
    // state with a lazily-connecting pool is enough to exercise them.

    #[tokio::test]
    async fn connect_unknown_bank_is_not_found() {
        let state = AppState::fake();
        let err = connect(
            &state,
            Uuid::new_v4(),
            ConnectBankRequest {
                bank_code: "zbank".into(),
                client_id: "team227".into(),
                client_secret: "s3cret".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BankError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_accounts_requires_client_id() {
        let state = AppState::fake();
        let err = fetch_accounts(&state, Uuid::new_v4(), "vbank", None)
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));

        let err = fetch_accounts(&state, Uuid::new_v4(), "vbank", Some(String::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));
    }

    #[tokio::test]
    async fn fetch_transactions_requires_both_ids() {
        let state = AppState::fake();
        let err = fetch_transactions(
            &state,
            Uuid::new_v4(),
            "vbank",
            None,
            Some("client-9".into()),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));

        let err = fetch_transactions(
            &state,
            Uuid::new_v4(),
            "vbank",
            Some("acc-1".into()),
            None,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BankError::BadRequest(_)));
    }

    #[tokio::test]
    async fn available_banks_mirrors_the_directory() {
        let state = AppState::fake();
        let banks = available_banks(&state);
        assert_eq!(banks.len(), 3);
        assert_eq!(banks[0].code, "vbank");
        assert!(banks[0].base_url.starts_with("http://vbank"));
    }

    // Lifecycle paths that need real rows behind them.

    fn state_with(pool: &sqlx::PgPool) -> AppState {
        let mut state = AppState::fake();
        state.db = pool.clone();
        state
    }

    async fn seed_connected_user(pool: &sqlx::PgPool) -> Uuid {
        let user = crate::auth::repo::User::create(
            pool,
            "linked@example.com",
            "$argon2id$placeholder",
            None,
        )
        .await
        .expect("seed user");
        BankConnection::insert(
            pool,
            NewConnection {
                user_id: user.id,
                bank_code: "vbank",
                bank_name: "Virtual Bank",
                client_id: Some("team227-1"),
                client_secret: Some("s3cret"),
                access_token: "sealed-access-token",
                refresh_token: None,
                token_expires_at: None,
            },
        )
        .await
        .expect("seed connection");
        user.id
    }

    #[sqlx::test]
    async fn connect_while_already_connected_leaves_no_new_row(pool: sqlx::PgPool) {
        let state = state_with(&pool);
        let user_id = seed_connected_user(&pool).await;

        let err = connect(
            &state,
            user_id,
            ConnectBankRequest {
                bank_code: "vbank".into(),
                client_id: "team227".into(),
                client_secret: "s3cret".into(),
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, BankError::AlreadyConnected(_)));

        let rows = BankConnection::list_for_user(&pool, user_id)
            .await
            .expect("list");
        assert_eq!(rows.len(), 1);
    }

    #[sqlx::test]
    async fn disconnect_twice_is_not_found(pool: sqlx::PgPool) {
        let state = state_with(&pool);
        let user_id = seed_connected_user(&pool).await;

        disconnect(&state, user_id, "vbank")
            .await
            .expect("first disconnect");
        let rows = BankConnection::list_for_user(&pool, user_id)
            .await
            .expect("list");
        assert!(!rows[0].is_active);
        assert!(rows[0].revoked_at.is_some());

        let err = disconnect(&state, user_id, "vbank").await.unwrap_err();
        assert!(matches!(err, BankError::NotFound(_)));
    }
}
