use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{error, warn};

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Vote window has closed")]
    VoteWindowExpired,

    #[error("Vote unchanged")]
    VoteUnchanged,

    #[error("Store unavailable: {0}")]
    Unavailable(#[source] StoreError),

    #[error("Store timed out")]
    Timeout,

    #[error("Store inconsistent: {0}")]
    Inconsistent(String),

    /// A write went out and its reply never arrived. Rerunning it could apply it twice.
    #[error("Outcome unknown: {0}")]
    OutcomeUnknown(String),
}

impl EngineError {
    /// Safe to rerun the whole operation from scratch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Unavailable(_) | EngineError::Timeout)
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Timeout => EngineError::Timeout,
            StoreError::Unacknowledged(reason) => EngineError::OutcomeUnknown(reason),
            other => EngineError::Unavailable(other),
        }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error("Missing user")]
    MissingUser,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::MissingUser => StatusCode::UNAUTHORIZED,
            AppError::Engine(err) => match err {
                EngineError::Validation(_) => StatusCode::BAD_REQUEST,
                EngineError::VoteWindowExpired => StatusCode::FORBIDDEN,
                EngineError::VoteUnchanged => StatusCode::CONFLICT,
                EngineError::Unavailable(_) | EngineError::Timeout => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                EngineError::Inconsistent(_) => {
                    error!("{err}");
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                EngineError::OutcomeUnknown(_) => {
                    warn!("{err}");
                    StatusCode::GATEWAY_TIMEOUT
                }
            },
        };

        (status, self.to_string()).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_retryable() {
        assert!(matches!(
            EngineError::from(StoreError::Timeout),
            EngineError::Timeout
        ));

        let unavailable = EngineError::from(StoreError::Unavailable("down".to_string()));
        assert!(matches!(unavailable, EngineError::Unavailable(_)));
        assert!(unavailable.is_retryable());

        let unknown = EngineError::from(StoreError::Unacknowledged("reset".to_string()));
        assert!(matches!(unknown, EngineError::OutcomeUnknown(_)));
        assert!(!unknown.is_retryable());

        assert!(!EngineError::VoteUnchanged.is_retryable());
        assert!(!EngineError::Inconsistent("gone".to_string()).is_retryable());
    }

    #[test]
    fn test_status_codes() {
        let status = |err: AppError| err.into_response().status();

        assert_eq!(status(AppError::MalformedPayload), StatusCode::BAD_REQUEST);
        assert_eq!(status(AppError::MissingUser), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(EngineError::VoteWindowExpired.into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(EngineError::VoteUnchanged.into()), StatusCode::CONFLICT);
        assert_eq!(
            status(EngineError::Timeout.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(EngineError::Inconsistent("missing".to_string()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(EngineError::OutcomeUnknown("no reply".to_string()).into()),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
