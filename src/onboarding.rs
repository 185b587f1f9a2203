//! Consumer, vendor and admin account creation.
//!
//! Consumers sign in with an emailed OTP, so their account is a single user
//! row holding an unusable placeholder credential.
//!
//! Vendor registration runs strictly in order:
//! 1) reject an email that is already registered (checked outside the
//!    transaction; a racing insert still surfaces as a unique violation);
//! 2) upload the trade licence, so a failed upload never leaves an account;
//! 3) encrypt a random placeholder credential (`is_dummy_password = true`);
//! 4) insert the user and the vendor profile in one transaction;
//! 5) after commit, enqueue the confirmation email. Enqueue failures are
//!    logged and do not fail the registration.
//!
//! Vendor verification is two separate writes (flag, then credential). If
//! the second fails the vendor stays verified with the placeholder
//! credential and cannot log in until verification is repeated.

use crate::{
    blob::{BlobStore, Upload},
    crypto::CredentialCipher,
    email::{EmailJob, EmailTemplate, JobQueue},
    error::{CoreError, CoreResult, DependencyContext},
    notifications::{NewNotification, NotificationService},
    store::{AccountStore, AccountTx, InsertOutcome, NewUser, NewVendor, Role},
    utils::{normalize_email, random_token, valid_email},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;

pub const TRADE_LICENSE_PREFIX: &str = "trade-licenses";

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VendorRegistration {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub company_name: String,
    pub designation: String,
    pub tax_ref_number: Option<String>,
    pub company_address: String,
    pub state: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AdminRegistration {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub password: String,
    pub address: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ConsumerRegistration {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VendorRegistered {
    pub user_id: Uuid,
    pub vendor_id: Uuid,
}

fn require(field: &str, value: &str) -> CoreResult<()> {
    if value.trim().is_empty() {
        return Err(CoreError::validation(format!("{field} is required")));
    }
    Ok(())
}

fn checked_email(email: &str) -> CoreResult<String> {
    let email = normalize_email(email);
    if !valid_email(&email) {
        return Err(CoreError::validation("Invalid email address"));
    }
    Ok(email)
}

impl VendorRegistration {
    /// # Errors
    /// `Validation` for empty required fields or a bad email.
    pub fn validate(&self) -> CoreResult<String> {
        require("name", &self.name)?;
        require("phone_number", &self.phone_number)?;
        require("company_name", &self.company_name)?;
        require("designation", &self.designation)?;
        require("company_address", &self.company_address)?;
        require("state", &self.state)?;
        checked_email(&self.email)
    }
}

impl ConsumerRegistration {
    /// # Errors
    /// `Validation` for an empty name or a bad email.
    pub fn validate(&self) -> CoreResult<String> {
        require("name", &self.name)?;
        checked_email(&self.email)
    }
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

impl AdminRegistration {
    /// # Errors
    /// `Validation` for empty required fields or a bad email.
    pub fn validate(&self) -> CoreResult<String> {
        require("name", &self.name)?;
        require("phone_number", &self.phone_number)?;
        require("password", &self.password)?;
        require("address", &self.address)?;
        checked_email(&self.email)
    }
}

#[derive(Clone)]
pub struct OnboardingCoordinator {
    accounts: Arc<dyn AccountStore>,
    blobs: Arc<dyn BlobStore>,
    cipher: Arc<dyn CredentialCipher>,
    queue: Arc<dyn JobQueue>,
    notifications: NotificationService,
}

impl OnboardingCoordinator {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        blobs: Arc<dyn BlobStore>,
        cipher: Arc<dyn CredentialCipher>,
        queue: Arc<dyn JobQueue>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            accounts,
            blobs,
            cipher,
            queue,
            notifications,
        }
    }

    async fn ensure_email_free(&self, email: &str) -> CoreResult<()> {
        let existing = self
            .accounts
            .find_user_by_email(email)
            .await
            .dependency("failed to look up user")?;
        if existing.is_some() {
            return Err(CoreError::Conflict("User already exists".to_string()));
        }
        Ok(())
    }

    async fn enqueue(&self, job: EmailJob) {
        let template = job.template.name();
        if let Err(err) = self.queue.enqueue(&job).await {
            error!(template, "failed to enqueue email: {err:#}");
        }
    }

    /// Create a vendor account with its uploaded trade licence.
    ///
    /// # Errors
    /// `Validation`, `Conflict` for a registered email, `DependencyFailure`
    /// when the upload, the cipher or the transaction fails.
    pub async fn register_vendor(
        &self,
        input: VendorRegistration,
        trade_license: Upload,
    ) -> CoreResult<VendorRegistered> {
        let email = input.validate()?;
        self.ensure_email_free(&email).await?;

        let key = trade_license.object_key(TRADE_LICENSE_PREFIX);
        let license_url = self
            .blobs
            .upload(&key, &trade_license)
            .await
            .dependency("Failed to upload trade license")?;

        let placeholder = random_token().dependency("failed to generate credential")?;
        let password = self
            .cipher
            .encrypt(&placeholder)
            .dependency("failed to encrypt credential")?;

        let user = NewUser {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email: email.clone(),
            password,
            role: Role::Vendor,
            phone_number: input.phone_number.trim().to_string(),
            address: Some(input.company_address.trim().to_string()),
            state: Some(input.state.trim().to_string()),
        };
        let vendor = NewVendor {
            id: Uuid::new_v4(),
            user_id: user.id,
            company_name: input.company_name.trim().to_string(),
            designation: input.designation.trim().to_string(),
            tax_ref_number: input
                .tax_ref_number
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty()),
            trade_license: Some(license_url),
        };

        // Dropping `tx` on any early return rolls back both inserts.
        let mut tx = self
            .accounts
            .begin()
            .await
            .dependency("failed to start onboarding transaction")?;
        if tx
            .insert_user(&user)
            .await
            .dependency("failed to insert user")?
            == InsertOutcome::Conflict
        {
            return Err(CoreError::Conflict("User already exists".to_string()));
        }
        if tx
            .insert_vendor(&vendor)
            .await
            .dependency("failed to insert vendor")?
            == InsertOutcome::Conflict
        {
            return Err(CoreError::Conflict("Vendor already exists".to_string()));
        }
        tx.commit()
            .await
            .dependency("failed to commit onboarding transaction")?;

        info!(user_id = %user.id, vendor_id = %vendor.id, "vendor registered");

        self.enqueue(EmailJob::new(
            email,
            EmailTemplate::RegisterVendorEmail {
                receiver_name: user.name.clone(),
            },
        ))
        .await;

        Ok(VendorRegistered {
            user_id: user.id,
            vendor_id: vendor.id,
        })
    }

    /// Mark a vendor verified and give it an operator-supplied credential.
    ///
    /// # Errors
    /// `Validation` for an empty password, `NotFound` for an unknown vendor,
    /// `DependencyFailure` when either write fails.
    pub async fn verify_vendor(&self, vendor_id: Uuid, password: &str) -> CoreResult<()> {
        require("password", password)?;

        let vendor = self
            .accounts
            .find_vendor(vendor_id)
            .await
            .dependency("failed to load vendor")?
            .ok_or_else(|| CoreError::not_found("Vendor not found"))?;

        let updated = self
            .accounts
            .set_vendor_verified(vendor.id)
            .await
            .dependency("failed to verify vendor")?;
        if !updated {
            return Err(CoreError::not_found("Vendor not found"));
        }

        let encrypted = self
            .cipher
            .encrypt(password)
            .dependency("failed to encrypt credential")?;
        self.accounts
            .replace_vendor_credential(&vendor, &encrypted)
            .await
            .dependency("failed to replace vendor credential")?;

        info!(%vendor_id, user_id = %vendor.user_id, "vendor verified");

        match self.accounts.find_user_by_id(vendor.user_id).await {
            Ok(Some(user)) => {
                self.enqueue(EmailJob::new(
                    user.email.clone(),
                    EmailTemplate::VendorVerifiedEmail {
                        receiver_name: user.name.clone(),
                    },
                ))
                .await;
                let notice = NewNotification::info(
                    user.id,
                    "Vendor account verified",
                    format!("{} has been verified.", vendor.company_name),
                );
                if let Err(err) = self.notifications.create(notice).await {
                    warn!(%vendor_id, "failed to notify verified vendor: {err}");
                }
            }
            Ok(None) => warn!(%vendor_id, "verified vendor has no user"),
            Err(err) => warn!(%vendor_id, "failed to load verified vendor user: {err:#}"),
        }

        Ok(())
    }

    /// Insert one user in its own transaction.
    async fn insert_user(&self, user: &NewUser) -> CoreResult<()> {
        let mut tx = self
            .accounts
            .begin()
            .await
            .dependency("failed to start transaction")?;
        if tx
            .insert_user(user)
            .await
            .dependency("failed to insert user")?
            == InsertOutcome::Conflict
        {
            return Err(CoreError::Conflict("User already exists".to_string()));
        }
        tx.commit().await.dependency("failed to commit user")?;
        Ok(())
    }

    /// Create a consumer account.
    ///
    /// # Errors
    /// `Validation`, `Conflict` for a registered email, `DependencyFailure`
    /// when the cipher or the store fails.
    pub async fn create_consumer(&self, input: ConsumerRegistration) -> CoreResult<Uuid> {
        let email = input.validate()?;
        self.ensure_email_free(&email).await?;

        let placeholder = random_token().dependency("failed to generate credential")?;
        let password = self
            .cipher
            .encrypt(&placeholder)
            .dependency("failed to encrypt placeholder credential")?;
        let user = NewUser {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email,
            password,
            role: Role::Consumer,
            phone_number: trimmed(input.phone_number.as_deref()).unwrap_or_default(),
            address: trimmed(input.address.as_deref()),
            state: trimmed(input.state.as_deref()),
        };
        self.insert_user(&user).await?;

        info!(user_id = %user.id, "consumer created");
        Ok(user.id)
    }

    /// Create an admin account with the supplied credential.
    ///
    /// # Errors
    /// `Validation`, `Conflict` for a registered email, `DependencyFailure`
    /// when the cipher or the store fails.
    pub async fn create_admin(&self, input: AdminRegistration) -> CoreResult<Uuid> {
        let email = input.validate()?;
        self.ensure_email_free(&email).await?;

        let password = self
            .cipher
            .encrypt(&input.password)
            .dependency("failed to encrypt credential")?;
        let user = NewUser {
            id: Uuid::new_v4(),
            name: input.name.trim().to_string(),
            email,
            password,
            role: Role::Admin,
            phone_number: input.phone_number.trim().to_string(),
            address: Some(input.address.trim().to_string()),
            state: None,
        };
        self.insert_user(&user).await?;

        info!(user_id = %user.id, "admin created");
        Ok(user.id)
    }
}

impl std::fmt::Debug for OnboardingCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnboardingCoordinator")
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        blob::MemoryBlobStore,
        crypto::ChaChaCredentialCipher,
        email::MemoryJobQueue,
        notifications::LogNotificationSink,
        store::{LoginAudit, MemoryStore, User, Vendor},
    };
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use secrecy::{ExposeSecret, SecretString};

    struct Harness {
        store: MemoryStore,
        blobs: Arc<MemoryBlobStore>,
        queue: Arc<MemoryJobQueue>,
        cipher: Arc<ChaChaCredentialCipher>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                store: MemoryStore::new(),
                blobs: Arc::new(MemoryBlobStore::new()),
                queue: Arc::new(MemoryJobQueue::new()),
                cipher: Arc::new(ChaChaCredentialCipher::new(&SecretString::from("key"))),
            }
        }

        fn coordinator_with(
            &self,
            accounts: Arc<dyn AccountStore>,
            blobs: Arc<dyn BlobStore>,
        ) -> OnboardingCoordinator {
            let store = Arc::new(self.store.clone());
            let notifications =
                NotificationService::new(store.clone(), store, Arc::new(LogNotificationSink));
            OnboardingCoordinator::new(
                accounts,
                blobs,
                self.cipher.clone(),
                self.queue.clone(),
                notifications,
            )
        }

        fn coordinator(&self) -> OnboardingCoordinator {
            self.coordinator_with(Arc::new(self.store.clone()), self.blobs.clone())
        }
    }

    fn registration(email: &str) -> VendorRegistration {
        VendorRegistration {
            name: "Bob Builder".to_string(),
            email: email.to_string(),
            phone_number: "+15550100".to_string(),
            company_name: "Builder Co".to_string(),
            designation: "Owner".to_string(),
            tax_ref_number: Some(" ".to_string()),
            company_address: "1 Main St".to_string(),
            state: "Lagos".to_string(),
        }
    }

    fn license() -> Upload {
        Upload {
            filename: "license.pdf".to_string(),
            content_type: "application/pdf".to_string(),
            bytes: b"%PDF-1.7".to_vec(),
        }
    }

    #[tokio::test]
    async fn register_vendor_creates_user_vendor_and_email() -> Result<()> {
        let harness = Harness::new();
        let registered = harness
            .coordinator()
            .register_vendor(registration(" Bob@Example.com "), license())
            .await?;

        let user = harness
            .store
            .find_user_by_email("bob@example.com")
            .await?
            .ok_or_else(|| anyhow!("user missing"))?;
        assert_eq!(user.id, registered.user_id);
        assert_eq!(user.role, Role::Vendor);

        let vendor = harness
            .store
            .find_vendor(registered.vendor_id)
            .await?
            .ok_or_else(|| anyhow!("vendor missing"))?;
        assert!(vendor.is_dummy_password);
        assert!(!vendor.is_vendor_verified);
        assert_eq!(vendor.tax_ref_number, None);
        assert!(
            vendor
                .trade_license
                .as_deref()
                .is_some_and(|url| url.starts_with("memory://trade-licenses/"))
        );
        assert_eq!(harness.blobs.len().await, 1);

        let jobs = harness.queue.pending_jobs().await;
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].to, "bob@example.com");
        assert_eq!(jobs[0].template.name(), "registerVendorEmail");
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_email_is_conflict() -> Result<()> {
        let harness = Harness::new();
        let coordinator = harness.coordinator();
        coordinator
            .register_vendor(registration("bob@example.com"), license())
            .await?;
        let second = coordinator
            .register_vendor(registration("BOB@example.com"), license())
            .await;
        assert!(matches!(second, Err(CoreError::Conflict(_))));
        assert_eq!(harness.store.user_count().await, 1);
        Ok(())
    }

    struct FailingBlobStore;

    #[async_trait]
    impl BlobStore for FailingBlobStore {
        async fn upload(&self, _key: &str, _upload: &Upload) -> Result<String> {
            Err(anyhow!("bucket unreachable"))
        }
    }

    #[tokio::test]
    async fn failed_upload_creates_nothing() -> Result<()> {
        let harness = Harness::new();
        let coordinator =
            harness.coordinator_with(Arc::new(harness.store.clone()), Arc::new(FailingBlobStore));
        let result = coordinator
            .register_vendor(registration("bob@example.com"), license())
            .await;

        assert!(matches!(result, Err(CoreError::DependencyFailure { .. })));
        assert!(
            harness
                .store
                .find_user_by_email("bob@example.com")
                .await?
                .is_none()
        );
        assert!(harness.queue.pending_jobs().await.is_empty());
        Ok(())
    }

    /// Delegates to the memory store, failing the selected writes.
    #[derive(Default)]
    struct FaultyAccounts {
        inner: MemoryStore,
        vendor_insert: bool,
        credential_write: bool,
    }

    struct FailingTx(Box<dyn AccountTx>);

    #[async_trait]
    impl AccountTx for FailingTx {
        async fn insert_user(&mut self, user: &NewUser) -> Result<InsertOutcome> {
            self.0.insert_user(user).await
        }

        async fn insert_vendor(&mut self, _vendor: &NewVendor) -> Result<InsertOutcome> {
            Err(anyhow!("write conflict"))
        }

        async fn commit(self: Box<Self>) -> Result<()> {
            self.0.commit().await
        }
    }

    #[async_trait]
    impl AccountStore for FaultyAccounts {
        async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
            self.inner.find_user_by_email(email).await
        }

        async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
            self.inner.find_user_by_id(user_id).await
        }

        async fn begin(&self) -> Result<Box<dyn AccountTx>> {
            let tx = self.inner.begin().await?;
            if self.vendor_insert {
                Ok(Box::new(FailingTx(tx)))
            } else {
                Ok(tx)
            }
        }

        async fn find_vendor(&self, vendor_id: Uuid) -> Result<Option<Vendor>> {
            self.inner.find_vendor(vendor_id).await
        }

        async fn find_vendor_by_user(&self, user_id: Uuid) -> Result<Option<Vendor>> {
            self.inner.find_vendor_by_user(user_id).await
        }

        async fn set_vendor_verified(&self, vendor_id: Uuid) -> Result<bool> {
            self.inner.set_vendor_verified(vendor_id).await
        }

        async fn replace_vendor_credential(&self, vendor: &Vendor, password: &str) -> Result<()> {
            if self.credential_write {
                return Err(anyhow!("credential write timed out"));
            }
            self.inner.replace_vendor_credential(vendor, password).await
        }

        async fn record_login(&self, user_id: Uuid, audit: &LoginAudit) -> Result<()> {
            self.inner.record_login(user_id, audit).await
        }
    }

    #[tokio::test]
    async fn vendor_insert_failure_rolls_back_user() -> Result<()> {
        let harness = Harness::new();
        let coordinator = harness.coordinator_with(
            Arc::new(FaultyAccounts {
                inner: harness.store.clone(),
                vendor_insert: true,
                ..FaultyAccounts::default()
            }),
            harness.blobs.clone(),
        );
        let result = coordinator
            .register_vendor(registration("bob@example.com"), license())
            .await;

        assert!(matches!(result, Err(CoreError::DependencyFailure { .. })));
        assert!(
            harness
                .store
                .find_user_by_email("bob@example.com")
                .await?
                .is_none()
        );
        assert_eq!(harness.store.user_count().await, 0);
        assert_eq!(harness.store.vendor_count().await, 0);
        assert!(harness.queue.pending_jobs().await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn verify_vendor_replaces_credential() -> Result<()> {
        let harness = Harness::new();
        let coordinator = harness.coordinator();
        let registered = coordinator
            .register_vendor(registration("bob@example.com"), license())
            .await?;

        coordinator
            .verify_vendor(registered.vendor_id, "s3cret-pass")
            .await?;

        let vendor = harness
            .store
            .find_vendor(registered.vendor_id)
            .await?
            .ok_or_else(|| anyhow!("vendor missing"))?;
        assert!(vendor.is_vendor_verified);
        assert!(!vendor.is_dummy_password);

        let user = harness
            .store
            .find_user_by_id(registered.user_id)
            .await?
            .ok_or_else(|| anyhow!("user missing"))?;
        assert_eq!(
            harness.cipher.decrypt(&user.password)?.expose_secret(),
            "s3cret-pass"
        );

        let templates: Vec<&str> = harness
            .queue
            .pending_jobs()
            .await
            .iter()
            .map(|job| job.template.name())
            .collect();
        assert_eq!(templates, vec!["registerVendorEmail", "vendorVerifiedEmail"]);
        Ok(())
    }

    #[tokio::test]
    async fn failed_credential_write_leaves_vendor_verified_with_placeholder() -> Result<()> {
        let harness = Harness::new();
        let registered = harness
            .coordinator()
            .register_vendor(registration("bob@example.com"), license())
            .await?;
        let placeholder = harness
            .store
            .find_user_by_id(registered.user_id)
            .await?
            .ok_or_else(|| anyhow!("user missing"))?
            .password;

        let coordinator = harness.coordinator_with(
            Arc::new(FaultyAccounts {
                inner: harness.store.clone(),
                credential_write: true,
                ..FaultyAccounts::default()
            }),
            harness.blobs.clone(),
        );
        let result = coordinator
            .verify_vendor(registered.vendor_id, "s3cret-pass")
            .await;
        assert!(matches!(result, Err(CoreError::DependencyFailure { .. })));

        // The flag write landed, the credential write did not.
        let vendor = harness
            .store
            .find_vendor(registered.vendor_id)
            .await?
            .ok_or_else(|| anyhow!("vendor missing"))?;
        assert!(vendor.is_vendor_verified);
        assert!(vendor.is_dummy_password);
        let user = harness
            .store
            .find_user_by_id(registered.user_id)
            .await?
            .ok_or_else(|| anyhow!("user missing"))?;
        assert_eq!(user.password, placeholder);

        // No verification side effects went out.
        let templates: Vec<&str> = harness
            .queue
            .pending_jobs()
            .await
            .iter()
            .map(|job| job.template.name())
            .collect();
        assert_eq!(templates, vec!["registerVendorEmail"]);

        // Repeating verification against a healthy store completes it.
        harness
            .coordinator()
            .verify_vendor(registered.vendor_id, "s3cret-pass")
            .await?;
        let vendor = harness
            .store
            .find_vendor(registered.vendor_id)
            .await?
            .ok_or_else(|| anyhow!("vendor missing"))?;
        assert!(!vendor.is_dummy_password);
        Ok(())
    }

    #[tokio::test]
    async fn create_consumer_inserts_one_user() -> Result<()> {
        let harness = Harness::new();
        let coordinator = harness.coordinator();
        let input = ConsumerRegistration {
            name: " Ada Lovelace ".to_string(),
            email: "Ada@Example.com".to_string(),
            phone_number: Some("  ".to_string()),
            address: None,
            state: Some("Lagos".to_string()),
        };
        let id = coordinator.create_consumer(input.clone()).await?;

        let user = harness
            .store
            .find_user_by_email("ada@example.com")
            .await?
            .ok_or_else(|| anyhow!("consumer missing"))?;
        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Consumer);
        assert_eq!(user.name, "Ada Lovelace");
        assert_eq!(user.phone_number, "");
        assert_eq!(user.state.as_deref(), Some("Lagos"));
        assert!(!harness.cipher.decrypt(&user.password)?.expose_secret().is_empty());
        assert_eq!(harness.store.vendor_count().await, 0);

        assert!(matches!(
            coordinator.create_consumer(input).await,
            Err(CoreError::Conflict(_))
        ));
        assert_eq!(harness.store.user_count().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn create_consumer_validates_input() {
        let harness = Harness::new();
        let result = harness
            .coordinator()
            .create_consumer(ConsumerRegistration {
                name: String::new(),
                email: "ada@example.com".to_string(),
                phone_number: None,
                address: None,
                state: None,
            })
            .await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test]
    async fn verify_unknown_vendor_is_not_found() {
        let harness = Harness::new();
        let result = harness
            .coordinator()
            .verify_vendor(Uuid::new_v4(), "pass")
            .await;
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn create_admin_encrypts_supplied_password() -> Result<()> {
        let harness = Harness::new();
        let coordinator = harness.coordinator();
        let input = AdminRegistration {
            name: "Root Admin".to_string(),
            email: "root@example.com".to_string(),
            phone_number: "+15550101".to_string(),
            password: "admin-pass".to_string(),
            address: "HQ".to_string(),
        };
        let id = coordinator.create_admin(input.clone()).await?;

        let user = harness
            .store
            .find_user_by_id(id)
            .await?
            .ok_or_else(|| anyhow!("admin missing"))?;
        assert_eq!(user.role, Role::Admin);
        assert_eq!(
            harness.cipher.decrypt(&user.password)?.expose_secret(),
            "admin-pass"
        );

        assert!(matches!(
            coordinator.create_admin(input).await,
            Err(CoreError::Conflict(_))
        ));
        Ok(())
    }
}
