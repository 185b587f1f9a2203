use super::{Envelope, respond};
use crate::{core::Core, onboarding::ConsumerRegistration};
use axum::{Json, extract::Extension, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
pub struct ConsumerCreated {
    pub user_id: Uuid,
}

/// Consumer sign-up. The account signs in with an emailed OTP.
#[utoipa::path(
    post,
    path = "/v1/users",
    request_body = ConsumerRegistration,
    responses(
        (status = 201, description = "Consumer account created.", body = Envelope),
        (status = 400, description = "Missing or invalid fields, or email already registered.", body = Envelope),
    ),
    tag = "users"
)]
pub async fn create_consumer(
    core: Extension<Core>,
    Json(request): Json<ConsumerRegistration>,
) -> impl IntoResponse {
    match core.onboarding.create_consumer(request).await {
        Ok(user_id) => respond(
            StatusCode::CREATED,
            "User Created Successfully",
            Some(ConsumerCreated { user_id }),
        ),
        Err(err) => err.into_response(),
    }
}
