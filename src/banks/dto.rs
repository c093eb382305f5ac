use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo::BankConnection;

/// Discovery entry for one configured bank.
#[derive(Debug, Serialize)]
pub struct BankInfo {
    pub code: String,
    pub name: String,
    pub base_url: String,
}

/// Request body for connecting a bank.
#[derive(Debug, Deserialize)]
pub struct ConnectBankRequest {
    pub bank_code: String,
    pub client_id: String,
    pub client_secret: String,
}

/// A connection row as shown to its owner. Token material never leaves the
/// server.
#[derive(Debug, Serialize)]
pub struct ConnectionResponse {
    pub id: Uuid,
    pub bank_code: String,
    pub bank_name: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_sync_at: Option<OffsetDateTime>,
    pub consent_status: String,
    pub consent_id: Option<String>,
}

impl From<BankConnection> for ConnectionResponse {
    fn from(conn: BankConnection) -> Self {
        Self {
            id: conn.id,
            bank_code: conn.bank_code,
            bank_name: conn.bank_name,
            is_active: conn.is_active,
            connected_at: conn.connected_at,
            last_sync_at: conn.last_sync_at,
            consent_status: conn.consent_status,
            consent_id: conn.consent_id,
        }
    }
}

/// Request body for consent creation.
#[derive(Debug, Deserialize)]
pub struct CreateConsentRequest {
    pub client_id: String,
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub requesting_bank_name: Option<String>,
}

pub(crate) fn default_permissions() -> Vec<String> {
    vec![
        "ReadAccountsDetail".to_string(),
        "ReadBalances".to_string(),
        "ReadTransactionsDetail".to_string(),
    ]
}

/// Consent outcome echoed back to the caller.
#[derive(Debug, Serialize)]
pub struct ConsentResponse {
    pub consent_id: Option<String>,
    pub request_id: Option<String>,
    pub status: String,
    pub message: Option<String>,
    pub auto_approved: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AccountsQuery {
    #[serde(default)]
    pub client_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
}

/// Opaque upstream payload, relayed without reshaping.
#[derive(Debug, Serialize)]
pub struct DataEnvelope {
    pub data: Value,
}

/// Flattened client roster.
#[derive(Debug, Serialize)]
pub struct ClientsResponse {
    pub clients: Vec<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn consent_request_defaults_permissions() {
        let req: CreateConsentRequest =
            serde_json::from_str(r#"{"client_id":"client-9"}"#).unwrap();
        assert_eq!(
            req.permissions,
            vec!["ReadAccountsDetail", "ReadBalances", "ReadTransactionsDetail"]
        );
        assert!(req.requesting_bank_name.is_none());
    }

    #[test]
    fn consent_request_keeps_explicit_permissions() {
        let req: CreateConsentRequest = serde_json::from_str(
            r#"{"client_id":"client-9","permissions":["ReadBalances"]}"#,
        )
        .unwrap();
        assert_eq!(req.permissions, vec!["ReadBalances"]);
    }

    #[test]
    fn connection_response_uses_rfc3339_timestamps() {
        let response = ConnectionResponse {
            id: Uuid::new_v4(),
            bank_code: "vbank".into(),
            bank_name: "Virtual Bank".into(),
            is_active: true,
            connected_at: time::macros::datetime!(2024-05-01 12:00 UTC),
            last_sync_at: None,
            consent_status: "pending".into(),
            consent_id: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("2024-05-01T12:00:00Z"));
        assert!(json.contains("\"consent_status\":\"pending\""));
    }
}
