use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid webhook signature")]
    InvalidSignature,

    #[error("Rate limit exceeded")]
    RateLimit,

    #[error("No generations remaining")]
    NoCreditsRemaining,

    #[error("Idea generation failed: {0}")]
    Generation(String),

    #[error("Checkout failed: {0}")]
    Checkout(String),

    #[error("Failed to record generation usage: {0}")]
    PersistenceFailed(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
            }
            AppError::Redis(ref e) => {
                tracing::error!("Redis error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error")
            }
            AppError::Auth(ref msg) => (StatusCode::UNAUTHORIZED, msg.as_str()),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.as_str()),
            AppError::InvalidSignature => (StatusCode::BAD_REQUEST, "Invalid signature"),
            AppError::RateLimit => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded"),
            AppError::NoCreditsRemaining => (
                StatusCode::PAYMENT_REQUIRED,
                "No generations remaining. Purchase a plan to continue.",
            ),
            AppError::Generation(ref msg) => {
                tracing::warn!("Idea generation failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "Idea generation failed. No generation was used.")
            }
            AppError::Checkout(ref msg) => {
                tracing::error!("Checkout failed: {}", msg);
                (StatusCode::BAD_GATEWAY, "Could not start checkout. Please try again.")
            }
            AppError::PersistenceFailed(ref msg) => {
                tracing::error!("Generation usage not recorded: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "Could not record this generation. Please try again.",
                )
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl AppError {
    /// Errors the payment processor should redeliver the event for.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Redis(_) | AppError::Internal(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::NoCreditsRemaining.into_response().status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AppError::PersistenceFailed("down".into()).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Generation("timeout".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(AppError::InvalidSignature.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::Checkout("processor down".into()).into_response().status(),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(AppError::Internal(anyhow::anyhow!("store offline")).is_transient());
        assert!(!AppError::Validation("missing userId".into()).is_transient());
    }
}
