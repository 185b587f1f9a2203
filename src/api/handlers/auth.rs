//! Login endpoints.
//!
//! Flow Overview:
//! 1) `POST /v1/auth/login/otp/{email}` issues an OTP and a session token.
//! 2) `.../session/{st}` lets the client check the session token early.
//! 3) `.../verify/{st}` consumes the OTP and returns the token pair.
//!
//! Credential login, refresh and logout live here too.

use super::{
    Envelope, login_audit,
    principal::{require_auth, require_bearer},
    respond,
};
use crate::{auth::OtpChallenge, core::Core, session::Session};
use axum::{
    Json,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct OtpVerifyRequest {
    pub otp: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CredentialLoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/otp/{email}",
    params(("email" = String, Path, description = "Account email")),
    responses(
        (status = 200, description = "OTP sent; data carries the session token.", body = Envelope),
        (status = 400, description = "Invalid email, or an OTP is already outstanding.", body = Envelope),
        (status = 404, description = "Unknown user.", body = Envelope),
        (status = 429, description = "Too many OTP requests.", body = Envelope),
    ),
    tag = "auth"
)]
pub async fn request_otp(Path(email): Path<String>, core: Extension<Core>) -> impl IntoResponse {
    match core.auth.request_otp(&email).await {
        Ok(challenge) => respond::<OtpChallenge>(StatusCode::OK, "OTP sent", Some(challenge)),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/otp/{email}/session/{session_token}",
    params(
        ("email" = String, Path, description = "Account email"),
        ("session_token" = String, Path, description = "OTP session token"),
    ),
    responses(
        (status = 200, description = "Session token is valid for this email.", body = Envelope),
        (status = 401, description = "Invalid or expired session.", body = Envelope),
    ),
    tag = "auth"
)]
pub async fn verify_otp_session(
    Path((email, session_token)): Path<(String, String)>,
    core: Extension<Core>,
) -> impl IntoResponse {
    match core.auth.verify_otp_session(&email, &session_token) {
        Ok(()) => respond::<()>(StatusCode::OK, "Session verified", None),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/otp/{email}/verify/{session_token}",
    params(
        ("email" = String, Path, description = "Account email"),
        ("session_token" = String, Path, description = "OTP session token"),
    ),
    request_body = OtpVerifyRequest,
    responses(
        (status = 200, description = "Logged in; data carries tokens and profile.", body = Envelope),
        (status = 401, description = "Invalid session or OTP.", body = Envelope),
        (status = 404, description = "Unknown user.", body = Envelope),
    ),
    tag = "auth"
)]
pub async fn verify_otp(
    Path((email, session_token)): Path<(String, String)>,
    headers: HeaderMap,
    core: Extension<Core>,
    Json(request): Json<OtpVerifyRequest>,
) -> impl IntoResponse {
    match core
        .auth
        .verify_otp(&email, &session_token, &request.otp, login_audit(&headers))
        .await
    {
        Ok(session) => respond::<Session>(StatusCode::OK, "Login successful", Some(session)),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/otp/{email}/resend",
    params(("email" = String, Path, description = "Account email")),
    responses(
        (status = 200, description = "OTP resent, or the current one is still valid.", body = Envelope),
        (status = 404, description = "Unknown user.", body = Envelope),
        (status = 429, description = "Too many OTP requests.", body = Envelope),
    ),
    tag = "auth"
)]
pub async fn resend_otp(Path(email): Path<String>, core: Extension<Core>) -> impl IntoResponse {
    match core.auth.resend_otp(&email).await {
        Ok(challenge) => {
            let message = if challenge.issued {
                "OTP resent"
            } else {
                "OTP is still valid"
            };
            respond::<OtpChallenge>(StatusCode::OK, message, Some(challenge))
        }
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/login/credential",
    request_body = CredentialLoginRequest,
    responses(
        (status = 200, description = "Logged in.", body = Envelope),
        (status = 401, description = "Invalid email or password.", body = Envelope),
        (status = 403, description = "Vendor pending verification.", body = Envelope),
    ),
    tag = "auth"
)]
pub async fn credential_login(
    headers: HeaderMap,
    core: Extension<Core>,
    Json(request): Json<CredentialLoginRequest>,
) -> impl IntoResponse {
    match core
        .auth
        .credential_login(&request.email, &request.password, login_audit(&headers))
        .await
    {
        Ok(session) => respond::<Session>(StatusCode::OK, "Login successful", Some(session)),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/refresh",
    responses(
        (status = 200, description = "New access token.", body = Envelope),
        (status = 401, description = "Missing, forged or unrecognised token.", body = Envelope),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, core: Extension<Core>) -> impl IntoResponse {
    let token = match require_bearer(&headers) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    match core.auth.refresh(token).await {
        Ok(access_token) => respond(
            StatusCode::OK,
            "Token refreshed",
            Some(RefreshResponse { access_token }),
        ),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 200, description = "Refresh token removed.", body = Envelope),
        (status = 401, description = "Missing or invalid access token.", body = Envelope),
    ),
    security(("bearer" = [])),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, core: Extension<Core>) -> impl IntoResponse {
    let principal = match require_auth(&headers, &core.auth) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    match core.auth.logout(principal.user_id).await {
        Ok(()) => respond::<()>(StatusCode::OK, "Logged out", None),
        Err(err) => err.into_response(),
    }
}
