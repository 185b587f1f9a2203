//! In-memory store backend for tests and local development.
//!
//! The mutex only makes each call memory-safe. It does not add any
//! cross-call atomicity that the Postgres backend lacks.

use super::{
    AccountStore, AccountTx, InsertOutcome, LoginAudit, NewUser, NewVendor, Notification,
    NotificationStore, NotificationView, OtpRecord, OtpStore, RefreshTokenRecord,
    RefreshTokenStore, User, Vendor,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    vendors: HashMap<Uuid, Vendor>,
    otps: Vec<OtpRecord>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    notifications: Vec<Notification>,
}

impl MemoryState {
    fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|user| user.email.eq_ignore_ascii_case(email))
    }
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }

    /// Number of stored vendor profiles.
    pub async fn vendor_count(&self) -> usize {
        self.state.lock().await.vendors.len()
    }

    /// Number of stored OTP rows, used or not.
    pub async fn otp_count(&self, email: &str) -> usize {
        self.state
            .lock()
            .await
            .otps
            .iter()
            .filter(|otp| otp.email == email)
            .count()
    }

    /// Overwrite a user's avatar; profile editing is outside this crate.
    pub async fn set_avatar(&self, user_id: Uuid, avatar_url: Option<String>) {
        if let Some(user) = self.state.lock().await.users.get_mut(&user_id) {
            user.avatar_url = avatar_url;
        }
    }

    /// Insert a ready-made user, bypassing onboarding. Intended for seeding.
    pub async fn seed_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }
}

pub struct MemoryAccountTx {
    state: Arc<Mutex<MemoryState>>,
    users: Vec<User>,
    vendors: Vec<Vendor>,
}

#[async_trait]
impl AccountTx for MemoryAccountTx {
    async fn insert_user(&mut self, user: &NewUser) -> Result<InsertOutcome> {
        let state = self.state.lock().await;
        let staged = self
            .users
            .iter()
            .any(|staged| staged.email.eq_ignore_ascii_case(&user.email));
        if staged || state.email_taken(&user.email) {
            return Ok(InsertOutcome::Conflict);
        }
        drop(state);
        self.users.push(user.clone().into_user(Utc::now()));
        Ok(InsertOutcome::Inserted)
    }

    async fn insert_vendor(&mut self, vendor: &NewVendor) -> Result<InsertOutcome> {
        let state = self.state.lock().await;
        let taken = state
            .vendors
            .values()
            .chain(self.vendors.iter())
            .any(|existing| existing.user_id == vendor.user_id);
        if taken {
            return Ok(InsertOutcome::Conflict);
        }
        let user_known = state.users.contains_key(&vendor.user_id)
            || self.users.iter().any(|user| user.id == vendor.user_id);
        drop(state);
        if !user_known {
            anyhow::bail!("vendor references unknown user {}", vendor.user_id);
        }
        self.vendors.push(vendor.clone().into_vendor(Utc::now()));
        Ok(InsertOutcome::Inserted)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let Self {
            state,
            users,
            vendors,
        } = *self;
        let mut state = state.lock().await;
        if users.iter().any(|user| state.email_taken(&user.email)) {
            anyhow::bail!("unique violation on users.email at commit");
        }
        for user in users {
            state.users.insert(user.id, user);
        }
        for vendor in vendors {
            state.vendors.insert(vendor.id, vendor);
        }
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .values()
            .find(|user| user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        Ok(self.state.lock().await.users.get(&user_id).cloned())
    }

    async fn begin(&self) -> Result<Box<dyn AccountTx>> {
        Ok(Box::new(MemoryAccountTx {
            state: Arc::clone(&self.state),
            users: Vec::new(),
            vendors: Vec::new(),
        }))
    }

    async fn find_vendor(&self, vendor_id: Uuid) -> Result<Option<Vendor>> {
        Ok(self.state.lock().await.vendors.get(&vendor_id).cloned())
    }

    async fn find_vendor_by_user(&self, user_id: Uuid) -> Result<Option<Vendor>> {
        let state = self.state.lock().await;
        Ok(state
            .vendors
            .values()
            .find(|vendor| vendor.user_id == user_id)
            .cloned())
    }

    async fn set_vendor_verified(&self, vendor_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        Ok(match state.vendors.get_mut(&vendor_id) {
            Some(vendor) => {
                vendor.is_vendor_verified = true;
                vendor.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn replace_vendor_credential(&self, vendor: &Vendor, password: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        if let Some(user) = state.users.get_mut(&vendor.user_id) {
            user.password = password.to_string();
            user.updated_at = now;
        } else {
            return Ok(());
        }
        for stored in state.vendors.values_mut() {
            if stored.user_id == vendor.user_id {
                stored.is_dummy_password = false;
                stored.updated_at = now;
            }
        }
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid, audit: &LoginAudit) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(user) = state.users.get_mut(&user_id) {
            let now = Utc::now();
            user.login_at = Some(now);
            user.is_first_login = false;
            user.agent.clone_from(&audit.agent);
            user.ip.clone_from(&audit.ip);
            user.updated_at = now;
        }
        Ok(())
    }
}

#[async_trait]
impl OtpStore for MemoryStore {
    async fn delete_unused(&self, email: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.otps.len();
        state.otps.retain(|otp| otp.email != email || otp.is_used);
        Ok(u64::try_from(before - state.otps.len()).unwrap_or(0))
    }

    async fn insert(&self, record: &OtpRecord) -> Result<()> {
        self.state.lock().await.otps.push(record.clone());
        Ok(())
    }

    async fn latest_unused(&self, email: &str) -> Result<Option<OtpRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .otps
            .iter()
            .filter(|otp| otp.email == email && !otp.is_used)
            .max_by_key(|otp| otp.expires_at)
            .cloned())
    }

    async fn mark_used(&self, otp_id: Uuid) -> Result<bool> {
        let mut state = self.state.lock().await;
        let Some(otp) = state
            .otps
            .iter_mut()
            .find(|otp| otp.id == otp_id && !otp.is_used)
        else {
            return Ok(false);
        };
        otp.is_used = true;
        Ok(true)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.otps.len();
        state.otps.retain(|otp| otp.expires_at > now);
        Ok(u64::try_from(before - state.otps.len()).unwrap_or(0))
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryStore {
    async fn save(&self, record: &RefreshTokenRecord) -> Result<()> {
        self.state
            .lock()
            .await
            .refresh_tokens
            .insert(record.user_id, record.clone());
        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        Ok(self.state.lock().await.refresh_tokens.get(&user_id).cloned())
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool> {
        Ok(self
            .state
            .lock()
            .await
            .refresh_tokens
            .remove(&user_id)
            .is_some())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        self.state
            .lock()
            .await
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NotificationView>> {
        let state = self.state.lock().await;
        let Some(user) = state.users.get(&user_id) else {
            return Ok(Vec::new());
        };
        let mut owned: Vec<&Notification> = state
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        let offset = usize::try_from(offset).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(owned
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|notification| NotificationView {
                id: notification.id,
                title: notification.title.clone(),
                message: notification.message.clone(),
                kind: notification.kind,
                image: notification.image.clone(),
                link: notification.link.clone(),
                created_at: notification.created_at,
                user_name: user.name.clone(),
                user_avatar: user.avatar_url.clone(),
            })
            .collect())
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<u64> {
        let state = self.state.lock().await;
        let total = state
            .notifications
            .iter()
            .filter(|notification| notification.user_id == user_id)
            .count();
        Ok(u64::try_from(total).unwrap_or(u64::MAX))
    }
}
