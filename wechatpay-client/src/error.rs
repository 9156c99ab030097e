use common_auth::AuthError;
use common_crypto::CryptoError;
use thiserror::Error;

use crate::transport::TransportError;

pub type ApiResult<T> = Result<T, ApiError>;

/// Code reported for failures that never produced a gateway response.
pub const TRANSPORT_ERROR_CODE: &str = "0";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("gateway returned HTTP {status}: {code} {message}")]
    Status {
        status: u16,
        code: String,
        message: String,
    },
    #[error("failed to decode gateway response: {0}")]
    Decode(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("failed to decrypt resource: {0}")]
    Decrypt(#[from] CryptoError),
    #[error("notification rejected: {0}")]
    Notification(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Error code in the gateway's vocabulary where one exists.
    pub fn code(&self) -> &str {
        match self {
            ApiError::Transport(_) => TRANSPORT_ERROR_CODE,
            ApiError::Status { code, .. } => code,
            ApiError::Decode(_) => "DECODE_ERROR",
            ApiError::Auth(_) => "AUTH_ERROR",
            ApiError::Decrypt(_) => "DECRYPT_ERROR",
            ApiError::Notification(_) => "NOTIFICATION_REJECTED",
            ApiError::InvalidRequest(_) => "PARAM_ERROR",
        }
    }

    pub fn message(&self) -> String {
        match self {
            ApiError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_failures_use_code_zero() {
        let err = ApiError::from(TransportError::Network("connection refused".into()));
        assert_eq!(err.code(), "0");
        assert!(err.message().contains("connection refused"));
    }

    #[test]
    fn status_failures_keep_gateway_code() {
        let err = ApiError::Status {
            status: 400,
            code: "PARAM_ERROR".into(),
            message: "appid mismatch".into(),
        };
        assert_eq!(err.code(), "PARAM_ERROR");
        assert_eq!(err.message(), "appid mismatch");
    }
}
