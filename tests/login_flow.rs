//! End-to-end flows against the in-memory backends.

use anyhow::{Result, anyhow};
use chrono::Utc;
use secrecy::SecretString;
use tessera::{
    auth::LOGIN_NOTICE_TITLE,
    blob::Upload,
    config::CoreConfig,
    core::{Backends, Core, MemoryHandles},
    email::{EmailTemplate, EmailWorkerConfig, LogEmailSender, process_batch},
    error::{AuthFailure, CoreError},
    onboarding::VendorRegistration,
    store::{LoginAudit, NewUser, Role},
};
use uuid::Uuid;

fn config() -> CoreConfig {
    CoreConfig::new(
        SecretString::from("integration-access-secret"),
        SecretString::from("integration-refresh-secret"),
        SecretString::from("integration-credential-key"),
    )
    .with_otp_limit(3)
}

async fn setup() -> (Core, MemoryHandles) {
    let (backends, handles) = Backends::memory();
    (Core::new(&config(), backends), handles)
}

async fn seed(handles: &MemoryHandles, email: &str, role: Role) -> Uuid {
    let id = Uuid::new_v4();
    handles
        .store
        .seed_user(
            NewUser {
                id,
                name: "Ada Lovelace".to_string(),
                email: email.to_string(),
                password: String::new(),
                role,
                phone_number: "555-0100".to_string(),
                address: None,
                state: None,
            }
            .into_user(Utc::now()),
        )
        .await;
    id
}

async fn latest_otp(handles: &MemoryHandles, email: &str) -> Result<String> {
    handles
        .queue
        .pending_jobs()
        .await
        .into_iter()
        .rev()
        .find_map(|job| match job.template {
            EmailTemplate::OtpEmail { otp, .. } if job.to == email => Some(otp),
            _ => None,
        })
        .ok_or_else(|| anyhow!("no otp email queued for {email}"))
}

#[tokio::test]
async fn otp_login_refresh_and_logout() -> Result<()> {
    let (core, handles) = setup().await;
    let user_id = seed(&handles, "ada@example.com", Role::Consumer).await;

    let challenge = core.auth.request_otp("  Ada@Example.com ").await?;
    assert_eq!(challenge.email, "ada@example.com");
    assert!(challenge.issued);

    // A second request while the first OTP is live is refused.
    let again = core.auth.request_otp("ada@example.com").await;
    assert!(matches!(again, Err(CoreError::Conflict(_))));

    core.auth
        .verify_otp_session("ada@example.com", &challenge.session_token)?;

    let otp = latest_otp(&handles, "ada@example.com").await?;
    let session = core
        .auth
        .verify_otp(
            "ada@example.com",
            &challenge.session_token,
            &otp,
            LoginAudit::default(),
        )
        .await?;
    assert_eq!(session.user.id, user_id);

    let notices = core.notifications.list(user_id, None, None).await?;
    assert_eq!(notices.total, 1);
    assert_eq!(notices.items[0].title, LOGIN_NOTICE_TITLE);

    // The OTP is single use.
    let replay = core
        .auth
        .verify_otp(
            "ada@example.com",
            &challenge.session_token,
            &otp,
            LoginAudit::default(),
        )
        .await;
    assert_eq!(
        replay.err().and_then(|err| err.auth_failure()),
        Some(AuthFailure::Credentials)
    );

    let claims = core.auth.authenticate(&session.tokens.access_token)?;
    assert_eq!(claims.id, user_id);

    let access = core.auth.refresh(&session.tokens.access_token).await?;
    assert_eq!(core.auth.authenticate(&access)?.id, user_id);

    core.auth.logout(user_id).await?;
    let after_logout = core.auth.refresh(&session.tokens.access_token).await;
    assert!(matches!(after_logout, Err(CoreError::Unauthorized { .. })));
    Ok(())
}

#[tokio::test]
async fn session_token_is_bound_to_email() -> Result<()> {
    let (core, handles) = setup().await;
    seed(&handles, "ada@example.com", Role::Consumer).await;
    seed(&handles, "grace@example.com", Role::Consumer).await;

    let challenge = core.auth.request_otp("ada@example.com").await?;
    let result = core
        .auth
        .verify_otp_session("grace@example.com", &challenge.session_token);
    assert_eq!(
        result.err().and_then(|err| err.auth_failure()),
        Some(AuthFailure::Invalid)
    );
    Ok(())
}

#[tokio::test]
async fn resend_is_rate_limited() -> Result<()> {
    let (core, handles) = setup().await;
    seed(&handles, "ada@example.com", Role::Consumer).await;

    // Limit is three: the request and two resends are admitted.
    core.auth.request_otp("ada@example.com").await?;
    let resent = core.auth.resend_otp("ada@example.com").await?;
    assert!(!resent.issued);
    core.auth.resend_otp("ada@example.com").await?;

    let blocked = core.auth.resend_otp("ada@example.com").await;
    assert!(matches!(blocked, Err(CoreError::RateLimited(_))));
    Ok(())
}

#[tokio::test]
async fn unknown_user_cannot_request_otp() {
    let (core, _handles) = setup().await;
    let result = core.auth.request_otp("nobody@example.com").await;
    assert!(matches!(result, Err(CoreError::NotFound(_))));

    let result = core.auth.request_otp("not-an-email").await;
    assert!(matches!(result, Err(CoreError::Validation(_))));
}

#[tokio::test]
async fn vendor_onboarding_verification_and_login() -> Result<()> {
    let (core, handles) = setup().await;

    let registered = core
        .onboarding
        .register_vendor(
            VendorRegistration {
                name: "Grace Hopper".to_string(),
                email: "grace@vendor.example".to_string(),
                phone_number: "555-0199".to_string(),
                company_name: "Cobol Works".to_string(),
                designation: "Founder".to_string(),
                tax_ref_number: None,
                company_address: "1 Harbor Way".to_string(),
                state: "Lagos".to_string(),
            },
            Upload {
                filename: "licence.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                bytes: b"%PDF-1.7".to_vec(),
            },
        )
        .await?;
    assert_eq!(handles.blobs.len().await, 1);
    assert_eq!(handles.store.vendor_count().await, 1);

    let pending = core
        .auth
        .credential_login("grace@vendor.example", "anything", LoginAudit::default())
        .await;
    assert!(matches!(pending, Err(CoreError::Forbidden(_))));

    core.onboarding
        .verify_vendor(registered.vendor_id, "s3cret-pass")
        .await?;

    let wrong = core
        .auth
        .credential_login("grace@vendor.example", "nope", LoginAudit::default())
        .await;
    assert_eq!(
        wrong.err().and_then(|err| err.auth_failure()),
        Some(AuthFailure::Credentials)
    );

    let session = core
        .auth
        .credential_login("grace@vendor.example", "s3cret-pass", LoginAudit::default())
        .await?;
    assert_eq!(session.user.id, registered.user_id);
    assert_eq!(session.user.role, Role::Vendor);

    let page = core
        .notifications
        .list(registered.user_id, None, None)
        .await?;
    assert_eq!(page.total, 1);

    let templates: Vec<&'static str> = handles
        .queue
        .pending_jobs()
        .await
        .iter()
        .map(|job| job.template.name())
        .collect();
    assert!(templates.contains(&"registerVendorEmail"));
    assert!(templates.contains(&"vendorVerifiedEmail"));
    assert!(templates.contains(&"loginEmail"));
    Ok(())
}

#[tokio::test]
async fn worker_drains_queued_emails() -> Result<()> {
    let (core, handles) = setup().await;
    seed(&handles, "ada@example.com", Role::Consumer).await;
    core.auth.request_otp("ada@example.com").await?;
    assert_eq!(handles.queue.pending_jobs().await.len(), 1);

    let config = EmailWorkerConfig::new();
    let delivered = process_batch(core.queue.as_ref(), &LogEmailSender, &config).await?;
    assert_eq!(delivered, 1);
    assert!(handles.queue.pending_jobs().await.is_empty());

    let stats = core.queue.stats().await?;
    assert_eq!(stats.pending, 0);
    assert_eq!(stats.failed, 0);
    Ok(())
}
