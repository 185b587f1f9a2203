use super::{Envelope, principal::require_auth, respond};
use crate::{core::Core, notifications::NotificationPage};
use axum::{
    extract::{Extension, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde::Deserialize;
use utoipa::IntoParams;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct PageQuery {
    /// 1-based page number, default 1.
    pub page: Option<u64>,
    /// Page size, default 10.
    pub limit: Option<u64>,
}

#[utoipa::path(
    get,
    path = "/v1/notifications",
    params(PageQuery),
    responses(
        (status = 200, description = "Newest-first page of the caller's notifications.", body = Envelope),
        (status = 400, description = "page or limit below 1.", body = Envelope),
        (status = 401, description = "Missing or invalid access token.", body = Envelope),
    ),
    security(("bearer" = [])),
    tag = "notifications"
)]
pub async fn list_notifications(
    headers: HeaderMap,
    core: Extension<Core>,
    Query(query): Query<PageQuery>,
) -> impl IntoResponse {
    let principal = match require_auth(&headers, &core.auth) {
        Ok(principal) => principal,
        Err(err) => return err.into_response(),
    };
    match core
        .notifications
        .list(principal.user_id, query.page, query.limit)
        .await
    {
        Ok(page) => respond::<NotificationPage>(StatusCode::OK, "Notifications", Some(page)),
        Err(err) => err.into_response(),
    }
}
