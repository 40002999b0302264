use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
};

use crate::{auth::JwtService, errors::AppError, handlers::AppState};

/// Caller identity taken from a `Bearer` JWT.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Auth("Authentication required".to_string()))?;

        let claims = JwtService::new(&state.config.jwt_secret)
            .verify_token(token.trim())
            .map_err(|_| AppError::Auth("Invalid or expired token".to_string()))?;

        Ok(AuthenticatedUser { user_id: claims.sub })
    }
}
