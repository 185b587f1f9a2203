use super::{Envelope, principal::require_admin, respond};
use crate::{core::Core, onboarding::AdminRegistration};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Serialize;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminCreated {
    pub user_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/v1/admins",
    request_body = AdminRegistration,
    responses(
        (status = 201, description = "Admin account created.", body = Envelope),
        (status = 400, description = "Missing or invalid fields, or email already registered.", body = Envelope),
        (status = 401, description = "Missing or invalid access token.", body = Envelope),
        (status = 403, description = "Admin access required.", body = Envelope),
    ),
    security(("bearer" = [])),
    tag = "admins"
)]
pub async fn create_admin(
    headers: HeaderMap,
    core: Extension<Core>,
    Json(request): Json<AdminRegistration>,
) -> impl IntoResponse {
    let principal = match require_admin(&headers, &core.auth) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    match core.onboarding.create_admin(request).await {
        Ok(user_id) => {
            info!(created_by = %principal.user_id, %user_id, "admin created");
            respond(
                StatusCode::CREATED,
                "Admin created",
                Some(AdminCreated { user_id }),
            )
        }
        Err(err) => err.into_response(),
    }
}
