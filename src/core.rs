//! Service wiring.
//!
//! `Core::new` builds every service once from a [`CoreConfig`] and a set of
//! [`Backends`]. Handlers receive the services through `Extension` layers.

use crate::{
    auth::AuthService,
    blob::{BlobStore, MemoryBlobStore},
    config::CoreConfig,
    crypto::{ChaChaCredentialCipher, CredentialCipher},
    email::{JobQueue, MemoryJobQueue, PgJobQueue},
    kv::{KeyValueStore, MemoryKeyValueStore, PgKeyValueStore},
    notifications::{BroadcastSink, NotificationService, NotificationSink},
    onboarding::OnboardingCoordinator,
    otp::OtpManager,
    rate_limit::OtpRateLimiter,
    session::SessionService,
    store::{
        AccountStore, MemoryStore, NotificationStore, OtpStore, PgStore, RefreshTokenStore,
    },
    token::TokenService,
};
use sqlx::PgPool;
use std::sync::Arc;

/// Storage and transport collaborators the services are built on.
#[derive(Clone)]
pub struct Backends {
    pub accounts: Arc<dyn AccountStore>,
    pub otps: Arc<dyn OtpStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub kv: Arc<dyn KeyValueStore>,
    pub queue: Arc<dyn JobQueue>,
    pub blobs: Arc<dyn BlobStore>,
    pub sink: Arc<dyn NotificationSink>,
}

impl Backends {
    /// Postgres for every durable store.
    #[must_use]
    pub fn postgres(
        pool: PgPool,
        blobs: Arc<dyn BlobStore>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        let store = Arc::new(PgStore::new(pool.clone()));
        Self {
            accounts: store.clone(),
            otps: store.clone(),
            refresh_tokens: store.clone(),
            notifications: store,
            kv: Arc::new(PgKeyValueStore::new(pool.clone())),
            queue: Arc::new(PgJobQueue::new(pool)),
            blobs,
            sink,
        }
    }

    /// Everything in process memory. Returns the concrete handles too so
    /// callers can inspect state.
    #[must_use]
    pub fn memory() -> (Self, MemoryHandles) {
        let handles = MemoryHandles {
            store: MemoryStore::new(),
            queue: Arc::new(MemoryJobQueue::new()),
            blobs: Arc::new(MemoryBlobStore::new()),
            sink: BroadcastSink::default(),
        };
        let store = Arc::new(handles.store.clone());
        let backends = Self {
            accounts: store.clone(),
            otps: store.clone(),
            refresh_tokens: store.clone(),
            notifications: store,
            kv: Arc::new(MemoryKeyValueStore::new()),
            queue: handles.queue.clone(),
            blobs: handles.blobs.clone(),
            sink: Arc::new(handles.sink.clone()),
        };
        (backends, handles)
    }
}

impl std::fmt::Debug for Backends {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backends").finish_non_exhaustive()
    }
}

#[derive(Clone, Debug)]
pub struct MemoryHandles {
    pub store: MemoryStore,
    pub queue: Arc<MemoryJobQueue>,
    pub blobs: Arc<MemoryBlobStore>,
    pub sink: BroadcastSink,
}

#[derive(Clone)]
pub struct Core {
    pub auth: AuthService,
    pub onboarding: OnboardingCoordinator,
    pub notifications: NotificationService,
    pub otp: OtpManager,
    pub queue: Arc<dyn JobQueue>,
}

impl Core {
    #[must_use]
    pub fn new(config: &CoreConfig, backends: Backends) -> Self {
        let config = config.clone().normalize();
        let cipher: Arc<dyn CredentialCipher> =
            Arc::new(ChaChaCredentialCipher::new(config.credential_key()));

        let otp = OtpManager::new(backends.otps.clone(), config.otp_ttl());
        let limiter = OtpRateLimiter::new(
            backends.kv.clone(),
            config.otp_limit(),
            config.otp_window(),
            config.otp_block(),
        );
        let sessions = SessionService::new(
            TokenService::new(&config),
            backends.refresh_tokens.clone(),
            backends.accounts.clone(),
        );
        let notifications = NotificationService::new(
            backends.notifications.clone(),
            backends.accounts.clone(),
            backends.sink.clone(),
        );

        let auth = AuthService::new(
            backends.accounts.clone(),
            otp.clone(),
            limiter,
            sessions,
            backends.queue.clone(),
            cipher.clone(),
            notifications.clone(),
        );
        let onboarding = OnboardingCoordinator::new(
            backends.accounts.clone(),
            backends.blobs.clone(),
            cipher,
            backends.queue.clone(),
            notifications.clone(),
        );

        Self {
            auth,
            onboarding,
            notifications,
            otp,
            queue: backends.queue,
        }
    }
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core")
            .field("auth", &self.auth)
            .field("otp", &self.otp)
            .finish_non_exhaustive()
    }
}
