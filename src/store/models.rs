use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use utoipa::ToSchema;
use uuid::Uuid;

fn invalid_value(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {column} value: {value}"),
    )))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Vendor,
    Consumer,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Vendor => "vendor",
            Self::Consumer => "consumer",
        }
    }

    /// Parse the persisted `users.role` textual value.
    ///
    /// # Errors
    /// Returns a decode error for unknown roles.
    pub fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "admin" => Ok(Self::Admin),
            "vendor" => Ok(Self::Vendor),
            "consumer" => Ok(Self::Consumer),
            _ => Err(invalid_value("users.role", value)),
        }
    }
}

/// Base account record. `password` holds the reversible cipher output.
#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub phone_number: String,
    pub avatar_url: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub is_first_login: bool,
    pub login_at: Option<DateTime<Utc>>,
    pub agent: Option<String>,
    pub ip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for User {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let role: String = row.try_get("role")?;
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            password: row.try_get("password")?,
            role: Role::from_db(&role)?,
            phone_number: row.try_get("phone_number")?,
            avatar_url: row.try_get("avatar_url")?,
            address: row.try_get("address")?,
            state: row.try_get("state")?,
            is_first_login: row.try_get("is_first_login")?,
            login_at: row.try_get("login_at")?,
            agent: row.try_get("agent")?,
            ip: row.try_get("ip")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub phone_number: String,
    pub address: Option<String>,
    pub state: Option<String>,
}

impl NewUser {
    /// Materialize the row as the store would after insert.
    #[must_use]
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: self.id,
            name: self.name,
            email: self.email,
            password: self.password,
            role: self.role,
            phone_number: self.phone_number,
            avatar_url: None,
            address: self.address,
            state: self.state,
            is_first_login: true,
            login_at: None,
            agent: None,
            ip: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Vendor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub designation: String,
    pub tax_ref_number: Option<String>,
    pub trade_license: Option<String>,
    pub is_vendor_verified: bool,
    pub is_dummy_password: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for Vendor {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            company_name: row.try_get("company_name")?,
            designation: row.try_get("designation")?,
            tax_ref_number: row.try_get("tax_ref_number")?,
            trade_license: row.try_get("trade_license")?,
            is_vendor_verified: row.try_get("is_vendor_verified")?,
            is_dummy_password: row.try_get("is_dummy_password")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewVendor {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_name: String,
    pub designation: String,
    pub tax_ref_number: Option<String>,
    pub trade_license: Option<String>,
}

impl NewVendor {
    #[must_use]
    pub fn into_vendor(self, now: DateTime<Utc>) -> Vendor {
        Vendor {
            id: self.id,
            user_id: self.user_id,
            company_name: self.company_name,
            designation: self.designation,
            tax_ref_number: self.tax_ref_number,
            trade_license: self.trade_license,
            is_vendor_verified: false,
            is_dummy_password: true,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Hashed one-time passcode. The plaintext never reaches the store.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: String,
    pub otp_hash: String,
    pub expires_at: DateTime<Utc>,
    pub is_used: bool,
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for OtpRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            otp_hash: row.try_get("otp_hash")?,
            expires_at: row.try_get("expires_at")?,
            is_used: row.try_get("is_used")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct RefreshTokenRecord {
    pub user_id: Uuid,
    pub token: String,
    pub expires: DateTime<Utc>,
}

impl<'r> FromRow<'r, PgRow> for RefreshTokenRecord {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            user_id: row.try_get("user_id")?,
            token: row.try_get("token")?,
            expires: row.try_get("expires")?,
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Warning,
    Error,
}

impl NotificationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }

    /// # Errors
    /// Returns a decode error for unknown kinds.
    pub fn from_db(value: &str) -> Result<Self, sqlx::Error> {
        match value {
            "info" => Ok(Self::Info),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            _ => Err(invalid_value("notifications.kind", value)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub image: Option<String>,
    pub link: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Notification joined with the owning user's display fields.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NotificationView {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub image: Option<String>,
    pub link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub user_name: String,
    pub user_avatar: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for NotificationView {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let kind: String = row.try_get("kind")?;
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            message: row.try_get("message")?,
            kind: NotificationKind::from_db(&kind)?,
            image: row.try_get("image")?,
            link: row.try_get("link")?,
            created_at: row.try_get("created_at")?,
            user_name: row.try_get("user_name")?,
            user_avatar: row.try_get("user_avatar")?,
        })
    }
}

/// Login audit fields written on every successful login.
#[derive(Debug, Clone, Default)]
pub struct LoginAudit {
    pub agent: Option<String>,
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    Conflict,
}
