//! Login flows: OTP by email and email/password.
//!
//! OTP login is three calls tied together by a short-lived session token:
//! request (issues the OTP and the token), session check, verify (consumes
//! the OTP and establishes the session). Every path that issues an OTP goes
//! through the rate limiter first.

use crate::{
    crypto::CredentialCipher,
    email::{EmailJob, EmailTemplate, JobQueue},
    error::{AuthFailure, CoreError, CoreResult, DependencyContext},
    notifications::{NewNotification, NotificationService},
    otp::{OtpManager, ResendOutcome},
    rate_limit::OtpRateLimiter,
    session::{Session, SessionService},
    store::{AccountStore, LoginAudit, Role, User},
    token::{Claims, TokenKind},
    utils::{constant_time_eq, normalize_email, valid_email},
};
use secrecy::ExposeSecret;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const OTP_ALREADY_SENT: &str = "OTP already sent, Please check your email";
pub const INVALID_SESSION: &str = "Invalid Session";
pub const INVALID_OTP: &str = "Invalid or expired OTP";
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";
pub const LOGIN_NOTICE_TITLE: &str = "New sign-in";

/// Returned by an OTP request; the session token is required to verify.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OtpChallenge {
    pub email: String,
    pub session_token: String,
    /// `false` when a resend found the previous OTP still valid.
    pub issued: bool,
}

fn first_name(user: &User) -> String {
    user.name
        .split_whitespace()
        .next()
        .unwrap_or(user.name.as_str())
        .to_string()
}

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    otp: OtpManager,
    limiter: OtpRateLimiter,
    sessions: SessionService,
    queue: Arc<dyn JobQueue>,
    cipher: Arc<dyn CredentialCipher>,
    notifications: NotificationService,
}

impl AuthService {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        otp: OtpManager,
        limiter: OtpRateLimiter,
        sessions: SessionService,
        queue: Arc<dyn JobQueue>,
        cipher: Arc<dyn CredentialCipher>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            accounts,
            otp,
            limiter,
            sessions,
            queue,
            cipher,
            notifications,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    async fn user_by_email(&self, email: &str) -> CoreResult<User> {
        self.accounts
            .find_user_by_email(email)
            .await
            .dependency("failed to look up user")?
            .ok_or_else(|| CoreError::not_found("User not found"))
    }

    async fn admit(&self, email: &str) -> CoreResult<()> {
        let admission = self
            .limiter
            .admit(email)
            .await
            .dependency("rate limiter unavailable")?;
        if !admission.allowed {
            warn!("otp request throttled");
            return Err(CoreError::RateLimited(admission.reason.unwrap_or_default()));
        }
        Ok(())
    }

    async fn enqueue(&self, job: EmailJob) {
        let template = job.template.name();
        if let Err(err) = self.queue.enqueue(&job).await {
            error!(template, "failed to enqueue email: {err:#}");
        }
    }

    async fn issue_and_send(&self, user: &User) -> CoreResult<OtpChallenge> {
        let issued = self
            .otp
            .issue(&user.email)
            .await
            .dependency("failed to issue otp")?;

        self.enqueue(EmailJob::new(
            user.email.clone(),
            EmailTemplate::OtpEmail {
                receiver_name: first_name(user),
                otp: issued.expose().to_string(),
            },
        ))
        .await;

        let session_token = self
            .sessions
            .tokens()
            .issue_otp_session(&user.email, issued.expires_at)
            .map_err(CoreError::Internal)?;
        Ok(OtpChallenge {
            email: user.email.clone(),
            session_token,
            issued: true,
        })
    }

    /// Start an OTP login for `email`.
    ///
    /// # Errors
    /// `Validation` for a bad email, `NotFound` for an unknown user,
    /// `Conflict` while an OTP is outstanding, `RateLimited` when throttled.
    pub async fn request_otp(&self, email: &str) -> CoreResult<OtpChallenge> {
        let email = checked_email(email)?;
        let user = self.user_by_email(&email).await?;

        if self
            .otp
            .has_active(&email)
            .await
            .dependency("failed to check otp")?
        {
            return Err(CoreError::Conflict(OTP_ALREADY_SENT.to_string()));
        }

        self.admit(&email).await?;
        let challenge = self.issue_and_send(&user).await?;
        info!(user_id = %user.id, "otp issued");
        Ok(challenge)
    }

    /// Issue a new OTP unless the current one is still valid.
    ///
    /// # Errors
    /// `Validation`, `NotFound`, `RateLimited` as for [`Self::request_otp`].
    pub async fn resend_otp(&self, email: &str) -> CoreResult<OtpChallenge> {
        let email = checked_email(email)?;
        let user = self.user_by_email(&email).await?;
        self.admit(&email).await?;

        match self
            .otp
            .resend(&email)
            .await
            .dependency("failed to resend otp")?
        {
            ResendOutcome::StillValid { expires_at } => {
                let session_token = self
                    .sessions
                    .tokens()
                    .issue_otp_session(&email, expires_at)
                    .map_err(CoreError::Internal)?;
                Ok(OtpChallenge {
                    email,
                    session_token,
                    issued: false,
                })
            }
            ResendOutcome::Issued(issued) => {
                self.enqueue(EmailJob::new(
                    user.email.clone(),
                    EmailTemplate::OtpEmail {
                        receiver_name: first_name(&user),
                        otp: issued.expose().to_string(),
                    },
                ))
                .await;
                let session_token = self
                    .sessions
                    .tokens()
                    .issue_otp_session(&email, issued.expires_at)
                    .map_err(CoreError::Internal)?;
                info!(user_id = %user.id, "otp reissued");
                Ok(OtpChallenge {
                    email,
                    session_token,
                    issued: true,
                })
            }
        }
    }

    /// Check that `session_token` is a live OTP session for `email`.
    ///
    /// # Errors
    /// `Unauthorized` with the token failure kind, or `Invalid` when the
    /// token was issued for another email.
    pub fn verify_otp_session(&self, email: &str, session_token: &str) -> CoreResult<()> {
        let email = normalize_email(email);
        let claims = self
            .sessions
            .tokens()
            .verify_otp_session(session_token)
            .map_err(|err| {
                let kind = CoreError::from(err)
                    .auth_failure()
                    .unwrap_or(AuthFailure::Invalid);
                CoreError::unauthorized(kind, INVALID_SESSION)
            })?;
        if !constant_time_eq(&claims.email, &email) {
            return Err(CoreError::unauthorized(AuthFailure::Invalid, INVALID_SESSION));
        }
        Ok(())
    }

    /// Consume the OTP and log the user in.
    ///
    /// # Errors
    /// `Unauthorized` for a bad session token or OTP, `NotFound` for an
    /// unknown user.
    pub async fn verify_otp(
        &self,
        email: &str,
        session_token: &str,
        otp: &str,
        audit: LoginAudit,
    ) -> CoreResult<Session> {
        self.verify_otp_session(email, session_token)?;
        let email = normalize_email(email);
        let user = self.user_by_email(&email).await?;

        let valid = self
            .otp
            .verify(&email, otp.trim())
            .await
            .dependency("failed to verify otp")?;
        if !valid {
            return Err(CoreError::unauthorized(AuthFailure::Credentials, INVALID_OTP));
        }

        let session = self.sessions.establish_session(&user, audit).await?;
        self.enqueue(EmailJob::new(
            user.email.clone(),
            EmailTemplate::LoginEmail {
                receiver_name: first_name(&user),
            },
        ))
        .await;

        let notice = NewNotification::info(
            user.id,
            LOGIN_NOTICE_TITLE,
            format!("Welcome back, {}. You signed in with a one-time code.", first_name(&user)),
        );
        if let Err(err) = self.notifications.create(notice).await {
            warn!(user_id = %user.id, "failed to create login notification: {err}");
        }
        Ok(session)
    }

    /// Email/password login.
    ///
    /// Vendors whose account still holds the placeholder credential are
    /// refused until an operator verifies them.
    ///
    /// # Errors
    /// `Unauthorized` (`Credentials`) for an unknown email or wrong password,
    /// `Forbidden` for an unverified vendor.
    pub async fn credential_login(
        &self,
        email: &str,
        password: &str,
        audit: LoginAudit,
    ) -> CoreResult<Session> {
        let email = normalize_email(email);
        let user = self
            .accounts
            .find_user_by_email(&email)
            .await
            .dependency("failed to look up user")?
            .ok_or_else(|| CoreError::unauthorized(AuthFailure::Credentials, INVALID_CREDENTIALS))?;

        if user.role == Role::Vendor {
            let vendor = self
                .accounts
                .find_vendor_by_user(user.id)
                .await
                .dependency("failed to load vendor")?;
            if vendor.is_none_or(|vendor| vendor.is_dummy_password || !vendor.is_vendor_verified) {
                return Err(CoreError::Forbidden(
                    "Vendor account is pending verification".to_string(),
                ));
            }
        }

        if user.password.is_empty() {
            return Err(CoreError::unauthorized(
                AuthFailure::Credentials,
                INVALID_CREDENTIALS,
            ));
        }
        let stored = self
            .cipher
            .decrypt(&user.password)
            .map_err(CoreError::Internal)?;
        if !constant_time_eq(stored.expose_secret(), password) {
            return Err(CoreError::unauthorized(
                AuthFailure::Credentials,
                INVALID_CREDENTIALS,
            ));
        }

        let session = self.sessions.establish_session(&user, audit).await?;
        self.enqueue(EmailJob::new(
            user.email.clone(),
            EmailTemplate::LoginEmail {
                receiver_name: first_name(&user),
            },
        ))
        .await;
        Ok(session)
    }

    /// Verify a bearer access token.
    ///
    /// # Errors
    /// `Unauthorized` with the token failure kind.
    pub fn authenticate(&self, access_token: &str) -> CoreResult<Claims> {
        Ok(self.sessions.tokens().verify(access_token, TokenKind::Access)?)
    }

    /// # Errors
    /// See [`SessionService::refresh`].
    pub async fn refresh(&self, access_token: &str) -> CoreResult<String> {
        self.sessions.refresh(access_token).await
    }

    /// # Errors
    /// `DependencyFailure` if the store fails.
    pub async fn logout(&self, user_id: Uuid) -> CoreResult<()> {
        self.sessions.logout(user_id).await
    }
}

fn checked_email(email: &str) -> CoreResult<String> {
    let email = normalize_email(email);
    if !valid_email(&email) {
        return Err(CoreError::validation("Invalid email address"));
    }
    Ok(email)
}

impl std::fmt::Debug for AuthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthService")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}
