//! Client error types.

use thiserror::Error;

pub type ClientResult<T> = Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{service} unavailable: {message}")]
    ServiceUnavailable { service: &'static str, message: String },

    #[error("{service} rate limited: {message}")]
    RateLimited { service: &'static str, message: String },

    #[error("{service} rejected credentials: {message}")]
    Unauthorized { service: &'static str, message: String },

    #[error("{service} request failed with {status}: {message}")]
    RequestFailed {
        service: &'static str,
        status: u16,
        message: String,
    },

    #[error("Invalid response from {service}: {message}")]
    InvalidResponse { service: &'static str, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Map a non-success HTTP status to an error.
    pub fn from_status(service: &'static str, status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => ClientError::Unauthorized { service, message },
            429 => ClientError::RateLimited { service, message },
            500..=599 => ClientError::ServiceUnavailable { service, message },
            _ => ClientError::RequestFailed {
                service,
                status,
                message,
            },
        }
    }

    pub fn invalid_response(service: &'static str, message: impl Into<String>) -> Self {
        ClientError::InvalidResponse {
            service,
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        ClientError::Config(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::ServiceUnavailable { .. } | ClientError::RateLimited { .. } => true,
            ClientError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            ClientError::from_status("image", 401, ""),
            ClientError::Unauthorized { .. }
        ));
        assert!(ClientError::from_status("image", 429, "slow down").is_retryable());
        assert!(ClientError::from_status("image", 502, "").is_retryable());
        assert!(!ClientError::from_status("image", 400, "bad prompt").is_retryable());
    }

    #[test]
    fn test_message_names_service() {
        let err = ClientError::from_status("speech", 422, "voice not found");
        assert_eq!(
            err.to_string(),
            "speech request failed with 422: voice not found"
        );
    }
}
