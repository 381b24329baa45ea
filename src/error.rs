use axum::http::StatusCode;
use thiserror::Error;
use tracing::error;

/// Domain failures shared by the core computations and the HTTP handlers.
#[derive(Debug, Error)]
pub enum MarketError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("gave up after {attempts} attempts to allocate a unique batch code for {prefix}")]
    ExhaustedRetries { prefix: String, attempts: u32 },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MarketError {
    pub fn status(&self) -> StatusCode {
        match self {
            MarketError::InvalidInput(_) | MarketError::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            MarketError::ExhaustedRetries { .. } => StatusCode::SERVICE_UNAVAILABLE,
            MarketError::NotFound(_) => StatusCode::NOT_FOUND,
            MarketError::Conflict(_) => StatusCode::CONFLICT,
            MarketError::Forbidden(_) => StatusCode::FORBIDDEN,
            MarketError::Database(_) | MarketError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<MarketError> for (StatusCode, String) {
    fn from(err: MarketError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            error!(error = %err, "request failed");
            // Internal details stay in the logs.
            return (status, "Internal server error".into());
        }
        (status, err.to_string())
    }
}

pub(crate) fn internal<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    error!(error = %e, "internal error");
    (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_domain_errors_to_status_codes() {
        assert_eq!(
            MarketError::InvalidFilter("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(MarketError::NotFound("batch").status(), StatusCode::NOT_FOUND);
        assert_eq!(
            MarketError::ExhaustedRetries { prefix: "TOMA-261016".into(), attempts: 3 }.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn client_errors_keep_their_message() {
        let (status, msg): (StatusCode, String) =
            MarketError::Conflict("Batch is already listed".into()).into();
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(msg, "Batch is already listed");
    }

    #[test]
    fn server_errors_hide_details() {
        let (status, msg): (StatusCode, String) =
            MarketError::Internal(anyhow::anyhow!("connection reset")).into();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!msg.contains("connection reset"));
    }
}
