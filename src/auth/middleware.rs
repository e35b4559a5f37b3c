// Authentication extractor for protected routes

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use tracing::warn;

use crate::auth::{error::AuthError, token::TokenService};

/// Authenticated customer extractor for protected routes
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedCustomer {
    pub customer_id: i64,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedCustomer
where
    Arc<TokenService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .ok_or(AuthError::MissingToken)?
            .to_str()
            .map_err(|_| AuthError::InvalidToken)?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            warn!("Authorization header missing 'Bearer ' prefix for {}", parts.uri.path());
            AuthError::InvalidToken
        })?;

        let tokens = Arc::<TokenService>::from_ref(state);
        let claims = tokens.validate_access_token(token)?;

        Ok(AuthenticatedCustomer {
            customer_id: claims.sub,
        })
    }
}
