use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

/// Failure taxonomy for the connection lifecycle and bank proxy layer.
///
/// Upstream failures are surfaced to the caller as gateway errors with the
/// bank's status and body in the message; nothing is retried here.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    /// Unknown bank code, or no active connection for the caller. A
    /// connection owned by another user also lands here so callers cannot
    /// enumerate other users' links.
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    AlreadyConnected(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("bank returned {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("bank request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The bank answered 2xx but with a payload shape this layer does not
    /// recognize. Hard failure, never coerced to an empty success.
    #[error("unexpected response shape from bank: {0}")]
    ContractViolation(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BankError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BankError::NotFound(_) => StatusCode::NOT_FOUND,
            BankError::AlreadyConnected(_) | BankError::BadRequest(_) => StatusCode::BAD_REQUEST,
            BankError::Upstream { .. }
            | BankError::Transport(_)
            | BankError::ContractViolation(_) => StatusCode::BAD_GATEWAY,
            BankError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BankError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            BankError::Internal(e) => error!(error = %e, "internal error"),
            other => warn!(error = %other, "bank request rejected"),
        }
        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            BankError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            BankError::AlreadyConnected("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BankError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            BankError::Upstream {
                status: 503,
                body: "down".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            BankError::ContractViolation("weird".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            BankError::Internal(anyhow::anyhow!("boom")).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_message_carries_status_and_body() {
        let err = BankError::Upstream {
            status: 401,
            body: "invalid client".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("401"));
        assert!(msg.contains("invalid client"));
    }
}
