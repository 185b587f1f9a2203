//! Authenticated principal extraction and authorization helpers.
//!
//! Reads `Authorization: Bearer <access token>`, verifies it and returns a
//! principal that downstream handlers can use.

use crate::{
    auth::AuthService,
    error::{AuthFailure, CoreError, CoreResult},
    store::Role,
};
use axum::http::{HeaderMap, header::AUTHORIZATION};
use uuid::Uuid;

/// Authenticated user context derived from the access token.
#[derive(Clone, Debug)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub role: Role,
}

/// Bearer token from the `Authorization` header, if any.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Like [`bearer_token`] but a missing header is an error.
///
/// # Errors
/// `Unauthorized` (`MissingToken`) when no bearer token was sent.
pub fn require_bearer(headers: &HeaderMap) -> CoreResult<&str> {
    bearer_token(headers)
        .ok_or_else(|| CoreError::unauthorized(AuthFailure::MissingToken, "Missing bearer token"))
}

/// Resolve the bearer token into a principal.
///
/// # Errors
/// `Unauthorized` for a missing, expired, malformed or forged token.
pub fn require_auth(headers: &HeaderMap, auth: &AuthService) -> CoreResult<Principal> {
    let claims = auth.authenticate(require_bearer(headers)?)?;
    Ok(Principal {
        user_id: claims.id,
        email: claims.email,
        role: claims.role,
    })
}

/// Resolve the bearer token and require the admin role.
///
/// # Errors
/// As [`require_auth`], plus `Forbidden` for non-admins.
pub fn require_admin(headers: &HeaderMap, auth: &AuthService) -> CoreResult<Principal> {
    let principal = require_auth(headers, auth)?;
    if principal.role != Role::Admin {
        return Err(CoreError::Forbidden("Admin access required".to_string()));
    }
    Ok(principal)
}
