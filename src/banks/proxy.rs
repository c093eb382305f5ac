use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, instrument};

use super::directory::BankConfig;
use super::error::BankError;

/// Hard bound on every outbound bank call. Exceeding it is an upstream
/// failure; there are no retries at this layer.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Token grant returned by a bank's token endpoint.
#[derive(Debug, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds, when the bank reports one.
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Consent outcome as reported by the bank. All fields are advisory; the
/// lifecycle layer merges them into the connection row without validating
/// them further.
#[derive(Debug, Deserialize)]
pub struct ConsentGrant {
    #[serde(default)]
    pub consent_id: Option<String>,
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub auto_approved: Option<bool>,
}

/// Per-request adapter for one bank's HTTP surface. Built from the directory
/// entry, optionally with the connection's own credentials layered on top.
pub struct BankProxy {
    http: reqwest::Client,
    base_url: String,
    auth_url: String,
    client_id: String,
    client_secret: String,
}

impl BankProxy {
    pub fn new(http: reqwest::Client, config: &BankConfig) -> Self {
        Self {
            http,
            base_url: config.base_url.clone(),
            auth_url: config.auth_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Layer connection-scoped credentials over the directory defaults.
    pub fn with_credentials(
        mut self,
        client_id: Option<&str>,
        client_secret: Option<&str>,
    ) -> Self {
        if let Some(id) = client_id {
            self.client_id = id.to_string();
        }
        if let Some(secret) = client_secret {
            self.client_secret = secret.to_string();
        }
        self
    }

    async fn read_success(
        resp: reqwest::Response,
        accepted: &[StatusCode],
    ) -> Result<String, BankError> {
        let status = resp.status();
        let body = resp.text().await?;
        if !accepted.contains(&status) {
            return Err(BankError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    /// Exchange client credentials for a bank access token.
    #[instrument(skip(self))]
    pub async fn exchange_token(&self) -> Result<TokenGrant, BankError> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(BankError::BadRequest(
                "bank credentials are not configured".into(),
            ));
        }

        let resp = self
            .http
            .post(&self.auth_url)
            .query(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await?;

        let body = Self::read_success(resp, &[StatusCode::OK]).await?;
        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| {
            BankError::ContractViolation(format!("token exchange payload: {e}"))
        })?;
        debug!(requesting_bank = %self.client_id, "token exchanged");
        Ok(grant)
    }

    /// Fetch the bank's client roster (banker API) and flatten it.
    #[instrument(skip(self))]
    pub async fn list_clients(&self) -> Result<Vec<Value>, BankError> {
        let resp = self
            .http
            .get(format!("{}/banker/clients", self.base_url))
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await?;

        let body = Self::read_success(resp, &[StatusCode::OK]).await?;
        let payload: Value = serde_json::from_str(&body)
            .map_err(|e| BankError::ContractViolation(format!("clients payload: {e}")))?;
        normalize_clients(payload)
    }

    /// Ask the bank for consent to read a client's account data.
    #[instrument(skip(self, access_token))]
    pub async fn create_consent(
        &self,
        access_token: &str,
        client_id: &str,
        permissions: &[String],
        requesting_bank_name: Option<&str>,
    ) -> Result<ConsentGrant, BankError> {
        let resp = self
            .http
            .post(format!("{}/account-consents/request", self.base_url))
            .bearer_auth(access_token)
            .header("X-Requesting-Bank", &self.client_id)
            .json(&serde_json::json!({
                "client_id": client_id,
                "permissions": permissions,
                "reason": "Multibank aggregator",
                "requesting_bank": self.client_id,
                "requesting_bank_name": requesting_bank_name.unwrap_or("Multibank"),
            }))
            .timeout(UPSTREAM_TIMEOUT)
            .send()
            .await?;

        let body = Self::read_success(resp, &[StatusCode::OK, StatusCode::CREATED]).await?;
        serde_json::from_str(&body)
            .map_err(|e| BankError::ContractViolation(format!("consent payload: {e}")))
    }

    /// Fetch accounts for a bank client. The payload is passed through
    /// opaquely; this layer does not reshape account fields.
    #[instrument(skip(self, access_token))]
    pub async fn fetch_accounts(
        &self,
        access_token: &str,
        consent_id: Option<&str>,
        client_id: &str,
    ) -> Result<Value, BankError> {
        let mut req = self
            .http
            .get(format!("{}/accounts", self.base_url))
            .query(&[("client_id", client_id)])
            .bearer_auth(access_token)
            .header("X-Requesting-Bank", &self.client_id)
            .timeout(UPSTREAM_TIMEOUT);
        // Not every bank path requires a consent; omit the header when we
        // have none rather than blocking the call.
        if let Some(consent) = consent_id {
            req = req.header("X-Consent-Id", consent);
        }

        let resp = req.send().await?;
        let body = Self::read_success(resp, &[StatusCode::OK]).await?;
        serde_json::from_str(&body)
            .map_err(|e| BankError::ContractViolation(format!("accounts payload: {e}")))
    }

    /// Fetch transactions scoped to one account. Same contract as accounts.
    #[instrument(skip(self, access_token))]
    pub async fn fetch_transactions(
        &self,
        access_token: &str,
        consent_id: Option<&str>,
        client_id: &str,
        account_id: &str,
    ) -> Result<Value, BankError> {
        let mut req = self
            .http
            .get(format!("{}/transactions", self.base_url))
            .query(&[("account_id", account_id), ("client_id", client_id)])
            .bearer_auth(access_token)
            .header("X-Requesting-Bank", &self.client_id)
            .timeout(UPSTREAM_TIMEOUT);
        if let Some(consent) = consent_id {
            req = req.header("X-Consent-Id", consent);
        }

        let resp = req.send().await?;
        let body = Self::read_success(resp, &[StatusCode::OK]).await?;
        serde_json::from_str(&body)
            .map_err(|e| BankError::ContractViolation(format!("transactions payload: {e}")))
    }
}

/// Flatten the roster shapes the sandboxes are known to answer with:
/// a bare list, `{"clients": [..]}`, `{"data": {"clients": [..]}}` or
/// `{"data": [..]}`. Anything else is a contract violation, not an empty
/// roster.
fn normalize_clients(payload: Value) -> Result<Vec<Value>, BankError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match (map.remove("clients"), map.remove("data")) {
            (Some(Value::Array(items)), _) => Ok(items),
            (None, Some(Value::Array(items))) => Ok(items),
            (None, Some(Value::Object(mut inner))) => match inner.remove("clients") {
                Some(Value::Array(items)) => Ok(items),
                _ => Err(BankError::ContractViolation(
                    "`data` object without a `clients` list".into(),
                )),
            },
            _ => Err(BankError::ContractViolation(
                "object without a `clients` or `data` list".into(),
            )),
        },
        other => Err(BankError::ContractViolation(format!(
            "clients payload is neither a list nor an object: {other}"
        ))),
    }
}
