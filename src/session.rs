//! Login sessions: token pairs, the stored refresh token and login audit.
//!
//! One refresh token is kept per user; issuing a new pair replaces it. The
//! refresh flow identifies the caller by their (possibly expired) access
//! token and takes its authority from the stored refresh token, which is not
//! rotated.

use crate::{
    error::{AuthFailure, CoreError, CoreResult, DependencyContext},
    store::{AccountStore, LoginAudit, RefreshTokenRecord, RefreshTokenStore, Role, User},
    token::{TokenIdentity, TokenKind, TokenPair, TokenService},
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};
use utoipa::ToSchema;
use uuid::Uuid;

/// Public view of an account, returned after login.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub phone_number: String,
    pub avatar_url: Option<String>,
    pub address: Option<String>,
    pub state: Option<String>,
    pub is_first_login: bool,
    pub login_at: Option<DateTime<Utc>>,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            phone_number: user.phone_number.clone(),
            avatar_url: user.avatar_url.clone(),
            address: user.address.clone(),
            state: user.state.clone(),
            is_first_login: user.is_first_login,
            login_at: user.login_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Session {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserProfile,
}

#[must_use]
pub fn identity_of(user: &User) -> TokenIdentity {
    TokenIdentity {
        id: user.id,
        email: user.email.clone(),
        role: user.role,
        name: user.name.clone(),
    }
}

#[derive(Clone)]
pub struct SessionService {
    tokens: TokenService,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    accounts: Arc<dyn AccountStore>,
}

impl SessionService {
    #[must_use]
    pub fn new(
        tokens: TokenService,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        Self {
            tokens,
            refresh_tokens,
            accounts,
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Store `token` as the user's refresh token, replacing any previous one.
    ///
    /// # Errors
    /// Returns an error if the store fails.
    pub async fn save(&self, user_id: Uuid, token: &str) -> Result<()> {
        let refresh_ttl = chrono::Duration::from_std(self.tokens.refresh_ttl())
            .unwrap_or(chrono::Duration::MAX);
        let record = RefreshTokenRecord {
            user_id,
            token: token.to_string(),
            expires: Utc::now()
                .checked_add_signed(refresh_ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        self.refresh_tokens.save(&record).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn get(&self, user_id: Uuid) -> Result<Option<RefreshTokenRecord>> {
        self.refresh_tokens.get(user_id).await
    }

    /// # Errors
    /// Returns an error if the store fails.
    pub async fn delete(&self, user_id: Uuid) -> Result<bool> {
        self.refresh_tokens.delete(user_id).await
    }

    /// Issue a token pair, persist the refresh token and record the login.
    ///
    /// # Errors
    /// `Internal` if signing fails, `DependencyFailure` if a store fails.
    pub async fn establish_session(&self, user: &User, audit: LoginAudit) -> CoreResult<Session> {
        let tokens = self
            .tokens
            .issue_pair(&identity_of(user))
            .map_err(CoreError::Internal)?;
        self.save(user.id, &tokens.refresh_token)
            .await
            .dependency("failed to store refresh token")?;
        self.accounts
            .record_login(user.id, &audit)
            .await
            .dependency("failed to record login")?;

        let mut profile = UserProfile::from(user);
        profile.is_first_login = false;
        profile.login_at = Some(Utc::now());

        info!(user_id = %user.id, role = user.role.as_str(), "session established");
        Ok(Session {
            tokens,
            user: profile,
        })
    }

    /// Mint a new access token for the holder of `access_token`.
    ///
    /// # Errors
    /// `Unauthorized` when the access token is malformed or forged, when no
    /// refresh token is stored, when the stored one expired or when it names
    /// a different user.
    pub async fn refresh(&self, access_token: &str) -> CoreResult<String> {
        let presented = self.tokens.identify_access(access_token)?;

        let stored = self
            .refresh_tokens
            .get(presented.id)
            .await
            .dependency("failed to load refresh token")?
            .ok_or_else(|| {
                CoreError::unauthorized(AuthFailure::Invalid, "No refresh token for this user")
            })?;
        if stored.expires <= Utc::now() {
            return Err(CoreError::unauthorized(
                AuthFailure::Expired,
                "Refresh token expired",
            ));
        }

        let refresh_claims = self.tokens.verify(&stored.token, TokenKind::Refresh)?;
        if refresh_claims.id != presented.id {
            return Err(CoreError::unauthorized(
                AuthFailure::Invalid,
                "Refresh token does not belong to this user",
            ));
        }

        let user = self
            .accounts
            .find_user_by_id(presented.id)
            .await
            .dependency("failed to load user")?
            .ok_or_else(|| CoreError::unauthorized(AuthFailure::Invalid, "User not found"))?;

        debug!(user_id = %user.id, "access token refreshed");
        self.tokens
            .issue_access(&identity_of(&user))
            .map_err(CoreError::Internal)
    }

    /// Drop the user's refresh token. Calling it twice is fine.
    ///
    /// # Errors
    /// `DependencyFailure` if the store fails.
    pub async fn logout(&self, user_id: Uuid) -> CoreResult<()> {
        let removed = self
            .delete(user_id)
            .await
            .dependency("failed to delete refresh token")?;
        debug!(%user_id, removed, "logged out");
        Ok(())
    }
}

impl std::fmt::Debug for SessionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionService")
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}
