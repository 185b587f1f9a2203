//! Persisted notifications with live fan-out.
//!
//! `create` always writes the record first; the push to `user:<id>` is best
//! effort and its failure is only logged.

use crate::{
    error::{CoreError, CoreResult, DependencyContext},
    store::{AccountStore, Notification, NotificationKind, NotificationStore, NotificationView},
    utils::initials,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;
use utoipa::ToSchema;
use uuid::Uuid;

mod sink;

pub use sink::{
    BroadcastSink, LogNotificationSink, NotificationSink, PushEvent, PushPayload, user_channel,
};

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub image: Option<String>,
    pub link: Option<String>,
}

impl NewNotification {
    #[must_use]
    pub fn info(user_id: Uuid, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
            kind: NotificationKind::Info,
            image: None,
            link: None,
        }
    }

    #[must_use]
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationPage {
    pub items: Vec<NotificationView>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

#[derive(Clone)]
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    accounts: Arc<dyn AccountStore>,
    sink: Arc<dyn NotificationSink>,
}

impl NotificationService {
    #[must_use]
    pub fn new(
        store: Arc<dyn NotificationStore>,
        accounts: Arc<dyn AccountStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            store,
            accounts,
            sink,
        }
    }

    /// Persist a notification and push it to the owner's channel.
    ///
    /// # Errors
    /// `NotFound` for an unknown user, `DependencyFailure` when the store
    /// fails. Push failures are not returned.
    pub async fn create(&self, input: NewNotification) -> CoreResult<Notification> {
        let user = self
            .accounts
            .find_user_by_id(input.user_id)
            .await
            .dependency("failed to load notification owner")?
            .ok_or_else(|| CoreError::not_found("User not found"))?;

        let notification = Notification {
            id: Uuid::new_v4(),
            user_id: user.id,
            title: input.title,
            message: input.message,
            kind: input.kind,
            image: input.image.or_else(|| user.avatar_url.clone()),
            link: input.link,
            read_at: None,
            created_at: Utc::now(),
        };
        self.store
            .insert(&notification)
            .await
            .dependency("failed to store notification")?;

        let payload = PushPayload {
            message: notification.message.clone(),
            title: notification.title.clone(),
            link: notification.link.clone(),
            time: relative_time(notification.created_at, Utc::now()),
            image: notification.image.clone(),
            fallback: initials(&user.name),
        };
        let channel = user_channel(user.id);
        if let Err(err) = self.sink.publish(&channel, &payload).await {
            warn!(%channel, "failed to push notification: {err:#}");
        }

        Ok(notification)
    }

    /// Newest-first page of a user's notifications.
    ///
    /// # Errors
    /// `Validation` when `page` or `limit` is zero.
    pub async fn list(
        &self,
        user_id: Uuid,
        page: Option<u64>,
        limit: Option<u64>,
    ) -> CoreResult<NotificationPage> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if page == 0 || limit == 0 {
            return Err(CoreError::validation("page and limit must be at least 1"));
        }

        let offset = (page - 1).saturating_mul(limit);
        let items = self
            .store
            .list_for_user(user_id, offset, limit)
            .await
            .dependency("failed to list notifications")?;
        let total = self
            .store
            .count_for_user(user_id)
            .await
            .dependency("failed to count notifications")?;

        Ok(NotificationPage {
            items,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }
}

impl std::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationService").finish_non_exhaustive()
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {unit} ago")
    } else {
        format!("{count} {unit}s ago")
    }
}

/// Human readable age of `then` relative to `now`.
#[must_use]
pub fn relative_time(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let minutes = elapsed.num_minutes();
    if minutes < 1 {
        return "just now".to_string();
    }
    if minutes < 60 {
        return plural(minutes, "minute");
    }
    let hours = elapsed.num_hours();
    if hours < 24 {
        return plural(hours, "hour");
    }
    plural(elapsed.num_days(), "day")
}
