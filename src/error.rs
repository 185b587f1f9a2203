//! Error taxonomy shared by every service in the crate.
//!
//! Store and transport failures arrive as `anyhow::Error` and are classified
//! here once, so the HTTP layer only has to map a variant to a status code.

use crate::token::TokenError;
use thiserror::Error;

/// Why a caller was not authenticated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// Token signature and structure were fine but `exp` has passed.
    Expired,
    /// Token could not be parsed at all.
    Malformed,
    /// Bad signature, wrong subject or mismatched identity.
    Invalid,
    /// No bearer token was presented.
    MissingToken,
    /// Email/password or OTP did not match.
    Credentials,
}

impl AuthFailure {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::Malformed => "malformed",
            Self::Invalid => "invalid",
            Self::MissingToken => "missing_token",
            Self::Credentials => "credentials",
        }
    }
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{message}")]
    Unauthorized { kind: AuthFailure, message: String },
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    RateLimited(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    DependencyFailure {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn unauthorized(kind: AuthFailure, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            kind,
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>, source: anyhow::Error) -> Self {
        Self::DependencyFailure {
            message: message.into(),
            source,
        }
    }

    /// Authentication failure kind, if this is an `Unauthorized` error.
    #[must_use]
    pub fn auth_failure(&self) -> Option<AuthFailure> {
        match self {
            Self::Unauthorized { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<TokenError> for CoreError {
    fn from(err: TokenError) -> Self {
        let kind = match err {
            TokenError::Expired => AuthFailure::Expired,
            TokenError::Malformed => AuthFailure::Malformed,
            TokenError::Invalid => AuthFailure::Invalid,
        };
        Self::unauthorized(kind, err.to_string())
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Attach a dependency-failure classification to infrastructure results.
pub trait DependencyContext<T> {
    /// # Errors
    /// Returns `CoreError::DependencyFailure` wrapping the original error.
    fn dependency(self, message: &str) -> CoreResult<T>;
}

impl<T> DependencyContext<T> for anyhow::Result<T> {
    fn dependency(self, message: &str) -> CoreResult<T> {
        self.map_err(|err| CoreError::dependency(message, err))
    }
}
