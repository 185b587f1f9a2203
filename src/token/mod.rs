//! Access, refresh and OTP session tokens.
//!
//! All three are HS256 JWTs distinguished by their `sub` claim. Access and
//! OTP session tokens are signed with the access secret, refresh tokens with
//! the refresh secret, so a refresh token never verifies as an access token
//! and the other way around.

use crate::{config::CoreConfig, store::Role};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

pub mod jwt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token expired")]
    Expired,
    #[error("malformed token")]
    Malformed,
    #[error("invalid token")]
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
    OtpSession,
}

impl TokenKind {
    #[must_use]
    pub const fn subject(self) -> &'static str {
        match self {
            Self::Access => "accessToken",
            Self::Refresh => "refreshToken",
            Self::OtpSession => "otpVerifyToken",
        }
    }
}

/// Claims carried by access and refresh tokens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Claims binding an OTP request to its verification step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OtpSessionClaims {
    pub email: String,
    pub otp_expiration: i64,
    pub sub: String,
    pub iat: i64,
    pub exp: i64,
}

/// Who a token pair is minted for.
#[derive(Debug, Clone)]
pub struct TokenIdentity {
    pub id: Uuid,
    pub email: String,
    pub role: Role,
    pub name: String,
}

impl TokenIdentity {
    fn split_name(&self) -> (Option<String>, Option<String>) {
        let mut parts = self.name.trim().splitn(2, char::is_whitespace);
        let first = parts
            .next()
            .filter(|part| !part.is_empty())
            .map(str::to_string);
        let last = parts
            .next()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string);
        (first, last)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, utoipa::ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct TokenService {
    access_secret: SecretString,
    refresh_secret: SecretString,
    access_ttl: Duration,
    refresh_ttl: Duration,
    otp_session_ttl: Duration,
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

impl TokenService {
    #[must_use]
    pub fn new(config: &CoreConfig) -> Self {
        Self {
            access_secret: config.access_secret().clone(),
            refresh_secret: config.refresh_secret().clone(),
            access_ttl: config.access_ttl(),
            refresh_ttl: config.refresh_ttl(),
            otp_session_ttl: config.otp_session_ttl(),
        }
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    fn secret(&self, kind: TokenKind) -> &[u8] {
        let secret = match kind {
            TokenKind::Access | TokenKind::OtpSession => &self.access_secret,
            TokenKind::Refresh => &self.refresh_secret,
        };
        secret.expose_secret().as_bytes()
    }

    /// Verify the signature, then require the expected `sub` before decoding
    /// the kind-specific claim set.
    fn decode<T: DeserializeOwned>(&self, token: &str, kind: TokenKind) -> Result<T, TokenError> {
        let value: Value = jwt::verify_hs256(self.secret(kind), token)?;
        if value.get("sub").and_then(Value::as_str) != Some(kind.subject()) {
            return Err(TokenError::Invalid);
        }
        serde_json::from_value(value).map_err(|_| TokenError::Malformed)
    }

    fn ttl(&self, kind: TokenKind) -> Duration {
        match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
            TokenKind::OtpSession => self.otp_session_ttl,
        }
    }

    fn claims_for(&self, identity: &TokenIdentity, kind: TokenKind, now: i64) -> Claims {
        let (first_name, last_name) = identity.split_name();
        Claims {
            id: identity.id,
            email: identity.email.clone(),
            role: identity.role,
            first_name,
            last_name,
            sub: kind.subject().to_string(),
            iat: now,
            exp: now.saturating_add(ttl_seconds(self.ttl(kind))),
        }
    }

    /// Mint a single access token.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_access(&self, identity: &TokenIdentity) -> Result<String> {
        let claims = self.claims_for(identity, TokenKind::Access, Utc::now().timestamp());
        jwt::sign_hs256(self.secret(TokenKind::Access), &claims)
            .context("failed to sign access token")
    }

    /// Mint an access/refresh pair for the same identity.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_pair(&self, identity: &TokenIdentity) -> Result<TokenPair> {
        let now = Utc::now().timestamp();
        let access = self.claims_for(identity, TokenKind::Access, now);
        let refresh = self.claims_for(identity, TokenKind::Refresh, now);
        Ok(TokenPair {
            access_token: jwt::sign_hs256(self.secret(TokenKind::Access), &access)
                .context("failed to sign access token")?,
            refresh_token: jwt::sign_hs256(self.secret(TokenKind::Refresh), &refresh)
                .context("failed to sign refresh token")?,
        })
    }

    /// Verify an access or refresh token.
    ///
    /// # Errors
    /// `Malformed`, `Invalid` (signature or subject) or `Expired`.
    pub fn verify(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        self.verify_at(token, kind, Utc::now().timestamp())
    }

    fn verify_at(&self, token: &str, kind: TokenKind, now: i64) -> Result<Claims, TokenError> {
        let claims = self.verify_signed(token, kind)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    fn verify_signed(&self, token: &str, kind: TokenKind) -> Result<Claims, TokenError> {
        if kind == TokenKind::OtpSession {
            return Err(TokenError::Invalid);
        }
        self.decode(token, kind)
    }

    /// Identify the holder of an access token whose lifetime may have ended.
    ///
    /// Used by the refresh flow, where the access token only names the user
    /// and the stored refresh token carries the authority.
    ///
    /// # Errors
    /// `Malformed` or `Invalid`; never `Expired`.
    pub fn identify_access(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_signed(token, TokenKind::Access)
    }

    /// Mint the intent token returned by an OTP request.
    ///
    /// # Errors
    /// Returns an error if the claims cannot be encoded.
    pub fn issue_otp_session(&self, email: &str, otp_expires_at: DateTime<Utc>) -> Result<String> {
        let now = Utc::now().timestamp();
        let claims = OtpSessionClaims {
            email: email.to_string(),
            otp_expiration: otp_expires_at.timestamp(),
            sub: TokenKind::OtpSession.subject().to_string(),
            iat: now,
            exp: now.saturating_add(ttl_seconds(self.otp_session_ttl)),
        };
        jwt::sign_hs256(self.secret(TokenKind::OtpSession), &claims)
            .context("failed to sign otp session token")
    }

    /// Verify an OTP session token.
    ///
    /// # Errors
    /// `Malformed`, `Invalid` or `Expired`.
    pub fn verify_otp_session(&self, token: &str) -> Result<OtpSessionClaims, TokenError> {
        self.verify_otp_session_at(token, Utc::now().timestamp())
    }

    fn verify_otp_session_at(&self, token: &str, now: i64) -> Result<OtpSessionClaims, TokenError> {
        let claims: OtpSessionClaims = self.decode(token, TokenKind::OtpSession)?;
        if claims.exp <= now {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

impl std::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenService")
            .field("access_secret", &"***")
            .field("refresh_secret", &"***")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("otp_session_ttl", &self.otp_session_ttl)
            .finish()
    }
}
