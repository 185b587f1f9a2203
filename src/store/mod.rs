//! Persistence seams for accounts, OTPs, refresh tokens and notifications.
//!
//! Every store is an object-safe async trait so services can hold
//! `Arc<dyn ...>` and be wired to Postgres in production or to the
//! in-memory backend in tests. Stores only enforce uniqueness and expiry;
//! business rules live in the services.
//!
//! The only multi-record atomic write is `AccountTx`, which inserts a user
//! and its vendor profile and either commits both or neither.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod memory;
pub mod models;
pub mod postgres;

pub use memory::MemoryStore;
pub use models::{
    InsertOutcome, LoginAudit, NewUser, NewVendor, Notification, NotificationKind,
    NotificationView, OtpRecord, RefreshTokenRecord, Role, User, Vendor,
};
pub use postgres::PgStore;

/// Unit of work for onboarding. Dropping it without `commit` rolls back.
#[async_trait]
pub trait AccountTx: Send {
    async fn insert_user(&mut self, user: &NewUser) -> Result<InsertOutcome>;
    async fn insert_vendor(&mut self, vendor: &NewVendor) -> Result<InsertOutcome>;
    async fn commit(self: Box<Self>) -> Result<()>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;
    async fn begin(&self) -> Result<Box<dyn AccountTx>>;
    async fn find_vendor(&self, vendor_id: Uuid) -> Result<Option<Vendor>>;
    async fn find_vendor_by_user(&self, user_id: Uuid) -> Result<Option<Vendor>>;
    /// Returns `false` when no vendor matched.
    async fn set_vendor_verified(&self, vendor_id: Uuid) -> Result<bool>;
    /// Store a new credential for the vendor's user and clear `is_dummy_password`.
    async fn replace_vendor_credential(&self, vendor: &Vendor, password: &str) -> Result<()>;
    async fn record_login(&self, user_id: Uuid, audit: &LoginAudit) -> Result<()>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    /// Delete every unused OTP for the email, returning how many were removed.
    async fn delete_unused(&self, email: &str) -> Result<u64>;
    async fn insert(&self, record: &OtpRecord) -> Result<()>;
    /// The unused record with the latest `expires_at`, expired or not.
    async fn latest_unused(&self, email: &str) -> Result<Option<OtpRecord>>;
    /// Returns `false` when the record was already used or is gone.
    async fn mark_used(&self, otp_id: Uuid) -> Result<bool>;
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Upsert: replaces any token already stored for the user.
    async fn save(&self, record: &RefreshTokenRecord) -> Result<()>;
    async fn get(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>>;
    async fn delete(&self, user_id: Uuid) -> Result<bool>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<()>;
    /// Newest first, joined with the owner's name and avatar.
    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NotificationView>>;
    async fn count_for_user(&self, user_id: Uuid) -> Result<u64>;
}
