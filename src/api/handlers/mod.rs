//! API handlers and the shared response envelope.
//!
//! Every JSON response is `{success, status_code, message, data?}`. Errors
//! never carry internals; dependency and internal failures are logged here
//! and reported with a generic message.

pub mod admins;
pub mod auth;
pub mod health;
pub mod notifications;
pub mod principal;
pub mod users;
pub mod vendors;

use crate::{
    error::CoreError,
    store::LoginAudit,
    utils::extract_client_ip,
};
use axum::{
    Json,
    http::{HeaderMap, StatusCode, header::USER_AGENT},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, warn};
use utoipa::ToSchema;

/// Response envelope shared by every endpoint.
#[derive(ToSchema, Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    pub success: bool,
    pub status_code: u16,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub data: Option<Value>,
}

/// Build a successful envelope response.
pub fn respond<T: Serialize>(status: StatusCode, message: &str, data: Option<T>) -> Response {
    let data = match data.map(serde_json::to_value).transpose() {
        Ok(data) => data,
        Err(err) => {
            error!("Failed to serialize response body: {err}");
            return CoreError::Internal(err.into()).into_response();
        }
    };
    let body = Envelope {
        success: true,
        status_code: status.as_u16(),
        message: message.to_string(),
        data,
    };
    (status, Json(body)).into_response()
}

/// Build an error envelope response.
pub fn fail(status: StatusCode, message: &str) -> Response {
    let body = Envelope {
        success: false,
        status_code: status.as_u16(),
        message: message.to_string(),
        data: None,
    };
    (status, Json(body)).into_response()
}

#[must_use]
pub fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
        CoreError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        CoreError::Validation(_) | CoreError::Conflict(_) => StatusCode::BAD_REQUEST,
        CoreError::DependencyFailure { .. } | CoreError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        match &self {
            CoreError::DependencyFailure { message, source } => {
                error!("{message}: {source:#}");
            }
            CoreError::Internal(source) => {
                error!("Internal error: {source:#}");
            }
            CoreError::Unauthorized { kind, .. } => {
                warn!(kind = kind.as_str(), "unauthorized request");
            }
            _ => {}
        }
        fail(status, &self.to_string())
    }
}

/// Login audit fields taken from the request.
#[must_use]
pub fn login_audit(headers: &HeaderMap) -> LoginAudit {
    LoginAudit {
        agent: headers
            .get(USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string),
        ip: extract_client_ip(headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthFailure;
    use anyhow::{Result, anyhow};
    use axum::http::HeaderValue;
    use http_body_util::BodyExt;

    async fn envelope(response: Response) -> Result<Envelope> {
        let bytes = response.into_body().collect().await?.to_bytes();
        Ok(serde_json::from_slice(&bytes)?)
    }

    #[test]
    fn errors_map_to_status_codes() {
        let cases = [
            (CoreError::validation("bad"), StatusCode::BAD_REQUEST),
            (CoreError::not_found("none"), StatusCode::NOT_FOUND),
            (
                CoreError::unauthorized(AuthFailure::Expired, "expired"),
                StatusCode::UNAUTHORIZED,
            ),
            (CoreError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (
                CoreError::RateLimited("slow".into()),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (CoreError::Conflict("dup".into()), StatusCode::BAD_REQUEST),
            (
                CoreError::dependency("down", anyhow!("refused")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                CoreError::Internal(anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(status_for(&err), status, "{err:?}");
        }
    }

    #[tokio::test]
    async fn internal_errors_hide_details() -> Result<()> {
        let response = CoreError::Internal(anyhow!("password=hunter2")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = envelope(response).await?;
        assert!(!body.success);
        assert_eq!(body.status_code, 500);
        assert_eq!(body.message, "internal error");
        assert!(body.data.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn dependency_failures_keep_message_but_not_source() -> Result<()> {
        let response =
            CoreError::dependency("failed to upload file", anyhow!("connection refused")).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = envelope(response).await?;
        assert_eq!(body.status_code, 500);
        assert_eq!(body.message, "failed to upload file");
        assert!(!body.message.contains("refused"));
        Ok(())
    }

    #[tokio::test]
    async fn conflicts_are_bad_requests() -> Result<()> {
        let response = CoreError::Conflict("Email already registered".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = envelope(response).await?;
        assert_eq!(body.message, "Email already registered");
        Ok(())
    }

    #[tokio::test]
    async fn respond_wraps_data() -> Result<()> {
        let response = respond(StatusCode::CREATED, "Created", Some(serde_json::json!({"id": 1})));
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = envelope(response).await?;
        assert!(body.success);
        assert_eq!(body.data, Some(serde_json::json!({"id": 1})));
        Ok(())
    }

    #[test]
    fn login_audit_reads_agent_and_ip() {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("curl/8.0"));
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
        let audit = login_audit(&headers);
        assert_eq!(audit.agent.as_deref(), Some("curl/8.0"));
        assert_eq!(audit.ip.as_deref(), Some("203.0.113.9"));
    }
}
