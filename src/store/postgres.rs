//! Postgres implementation of the store traits.
//!
//! Statements are raw SQL with positional binds, each wrapped in a
//! `db.query` span carrying the statement text.

use super::{
    AccountStore, AccountTx, InsertOutcome, LoginAudit, NewUser, NewVendor, Notification,
    NotificationStore, NotificationView, OtpRecord, OtpStore, RefreshTokenRecord,
    RefreshTokenStore, User, Vendor,
};
use crate::utils::is_unique_violation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Instrument, info_span};
use uuid::Uuid;

/// Schema applied by `--migrate`.
pub const SCHEMA_SQL: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/db/sql/01_tessera.sql"
));

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema. Every statement is idempotent.
    ///
    /// # Errors
    /// Returns an error if any statement fails.
    pub async fn migrate(&self) -> Result<()> {
        let span = info_span!("db.migrate", db.system = "postgresql");
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to apply schema")?;
        Ok(())
    }
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub struct PgAccountTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl AccountTx for PgAccountTx {
    async fn insert_user(&mut self, user: &NewUser) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO users (id, name, email, password, role, phone_number, address, state)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user.id)
            .bind(&user.name)
            .bind(&user.email)
            .bind(&user.password)
            .bind(user.role.as_str())
            .bind(&user.phone_number)
            .bind(&user.address)
            .bind(&user.state)
            .execute(&mut *self.tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert user"),
        }
    }

    async fn insert_vendor(&mut self, vendor: &NewVendor) -> Result<InsertOutcome> {
        let query = r"
            INSERT INTO vendors (id, user_id, company_name, designation, tax_ref_number, trade_license)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(vendor.id)
            .bind(vendor.user_id)
            .bind(&vendor.company_name)
            .bind(&vendor.designation)
            .bind(&vendor.tax_ref_number)
            .bind(&vendor.trade_license)
            .execute(&mut *self.tx)
            .instrument(span)
            .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(err) if is_unique_violation(&err) => Ok(InsertOutcome::Conflict),
            Err(err) => Err(err).context("failed to insert vendor"),
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .context("failed to commit onboarding transaction")
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE lower(email) = lower($1)";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, User>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by email")
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
        let query = "SELECT * FROM users WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, User>(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up user by id")
    }

    async fn begin(&self) -> Result<Box<dyn AccountTx>> {
        let tx = self
            .pool
            .begin()
            .await
            .context("failed to start onboarding transaction")?;
        Ok(Box::new(PgAccountTx { tx }))
    }

    async fn find_vendor(&self, vendor_id: Uuid) -> Result<Option<Vendor>> {
        let query = "SELECT * FROM vendors WHERE id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Vendor>(query)
            .bind(vendor_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up vendor")
    }

    async fn find_vendor_by_user(&self, user_id: Uuid) -> Result<Option<Vendor>> {
        let query = "SELECT * FROM vendors WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, Vendor>(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to look up vendor by user")
    }

    async fn set_vendor_verified(&self, vendor_id: Uuid) -> Result<bool> {
        let query = r"
            UPDATE vendors
            SET is_vendor_verified = TRUE,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(vendor_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark vendor verified")?;
        Ok(result.rows_affected() > 0)
    }

    async fn replace_vendor_credential(&self, vendor: &Vendor, password: &str) -> Result<()> {
        let query = r"
            WITH updated_user AS (
                UPDATE users
                SET password = $2,
                    updated_at = NOW()
                WHERE id = $1
                RETURNING id
            )
            UPDATE vendors
            SET is_dummy_password = FALSE,
                updated_at = NOW()
            WHERE user_id IN (SELECT id FROM updated_user)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(vendor.user_id)
            .bind(password)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to replace vendor credential")?;
        Ok(())
    }

    async fn record_login(&self, user_id: Uuid, audit: &LoginAudit) -> Result<()> {
        let query = r"
            UPDATE users
            SET login_at = NOW(),
                is_first_login = FALSE,
                agent = $2,
                ip = $3,
                updated_at = NOW()
            WHERE id = $1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(&audit.agent)
            .bind(&audit.ip)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login")?;
        Ok(())
    }
}

#[async_trait]
impl OtpStore for PgStore {
    async fn delete_unused(&self, email: &str) -> Result<u64> {
        let query = "DELETE FROM otps WHERE email = $1 AND is_used = FALSE";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(email)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete unused otps")?;
        Ok(result.rows_affected())
    }

    async fn insert(&self, record: &OtpRecord) -> Result<()> {
        let query = r"
            INSERT INTO otps (id, email, otp_hash, expires_at, is_used, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.id)
            .bind(&record.email)
            .bind(&record.otp_hash)
            .bind(record.expires_at)
            .bind(record.is_used)
            .bind(record.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert otp")?;
        Ok(())
    }

    async fn latest_unused(&self, email: &str) -> Result<Option<OtpRecord>> {
        let query = r"
            SELECT id, email, otp_hash, expires_at, is_used, created_at
            FROM otps
            WHERE email = $1
              AND is_used = FALSE
            ORDER BY expires_at DESC
            LIMIT 1
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, OtpRecord>(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load latest otp")
    }

    async fn mark_used(&self, otp_id: Uuid) -> Result<bool> {
        let query = "UPDATE otps SET is_used = TRUE WHERE id = $1 AND is_used = FALSE";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(otp_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to mark otp used")?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM otps WHERE expires_at <= $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(now)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to purge expired otps")?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl RefreshTokenStore for PgStore {
    async fn save(&self, record: &RefreshTokenRecord) -> Result<()> {
        let query = r"
            INSERT INTO refresh_tokens (user_id, token, expires)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE
            SET token = EXCLUDED.token,
                expires = EXCLUDED.expires,
                updated_at = NOW()
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(record.user_id)
            .bind(&record.token)
            .bind(record.expires)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to save refresh token")?;
        Ok(())
    }

    async fn get(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        let query = "SELECT user_id, token, expires FROM refresh_tokens WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, RefreshTokenRecord>(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to load refresh token")
    }

    async fn delete(&self, user_id: Uuid) -> Result<bool> {
        let query = "DELETE FROM refresh_tokens WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let result = sqlx::query(query)
            .bind(user_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete refresh token")?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert(&self, notification: &Notification) -> Result<()> {
        let query = r"
            INSERT INTO notifications (id, user_id, title, message, kind, image, link, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(notification.id)
            .bind(notification.user_id)
            .bind(&notification.title)
            .bind(&notification.message)
            .bind(notification.kind.as_str())
            .bind(&notification.image)
            .bind(&notification.link)
            .bind(notification.created_at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to insert notification")?;
        Ok(())
    }

    async fn list_for_user(
        &self,
        user_id: Uuid,
        offset: u64,
        limit: u64,
    ) -> Result<Vec<NotificationView>> {
        let query = r"
            SELECT n.id, n.title, n.message, n.kind, n.image, n.link, n.created_at,
                   u.name AS user_name, u.avatar_url AS user_avatar
            FROM notifications n
            JOIN users u ON u.id = n.user_id
            WHERE n.user_id = $1
            ORDER BY n.created_at DESC, n.id DESC
            OFFSET $2
            LIMIT $3
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        sqlx::query_as::<_, NotificationView>(query)
            .bind(user_id)
            .bind(to_i64(offset))
            .bind(to_i64(limit))
            .fetch_all(&self.pool)
            .instrument(span)
            .await
            .context("failed to list notifications")
    }

    async fn count_for_user(&self, user_id: Uuid) -> Result<u64> {
        let query = "SELECT COUNT(*) AS total FROM notifications WHERE user_id = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to count notifications")?;
        let total: i64 = row.get("total");
        Ok(u64::try_from(total).unwrap_or(0))
    }
}
