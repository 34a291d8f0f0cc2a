use axum::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use subtle::ConstantTimeEq;

use crate::error::AppError;

pub const ADMIN_SECRET_HEADER: &str = "x-admin-secret";

/// Configured admin secret, installed on the router as an `Extension`.
#[derive(Clone, Debug, Default)]
pub struct AdminSecret(pub Option<String>);

/// Proof that the request carried the configured admin secret.
pub struct AdminAuth;

#[async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let expected = parts
            .extensions
            .get::<AdminSecret>()
            .and_then(|secret| secret.0.as_deref())
            .ok_or(AppError::Unauthorized)?;
        let supplied = parts
            .headers
            .get(ADMIN_SECRET_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::Unauthorized)?;
        if bool::from(expected.as_bytes().ct_eq(supplied.as_bytes())) {
            Ok(AdminAuth)
        } else {
            tracing::warn!("rejected admin request with invalid secret");
            Err(AppError::Unauthorized)
        }
    }
}
