use std::sync::Arc;

use crate::api::{ApiClient, HttpTransport, ReqwestTransport, SessionCookie, TransportError};
use crate::auth::AuthManager;
use crate::clock::{Clock, SystemClock};
use crate::config::ClientConfig;
use crate::constants::{APP_TAG, KEYRING_SERVICE};
use crate::models::Session;
use crate::preferences::NotificationPreferences;
use crate::secure_storage::{KeyringBackend, SecretBackend, SecureStore};
use crate::security::{DeviceFingerprint, Digester, PlatformInfo, RateLimiter, RequestSigner, Sha256Digester};
use crate::sync::ChatSynchronizer;

/// Composition root. Owns one instance of every component; nothing in the
/// crate is a global.
pub struct HuddleCore {
    config: ClientConfig,
    store: Arc<SecureStore>,
    auth: AuthManager,
    chat: ChatSynchronizer,
    preferences: NotificationPreferences,
}

impl HuddleCore {
    /// Production wiring: reqwest transport, OS keychain, SHA-256, wall clock.
    pub fn from_config(config: ClientConfig) -> Result<Self, TransportError> {
        let transport = Arc::new(ReqwestTransport::new()?);
        let backend = Box::new(KeyringBackend::new(KEYRING_SERVICE));
        Ok(Self::new(config, transport, backend))
    }

    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        backend: Box<dyn SecretBackend>,
    ) -> Self {
        Self::with_components(
            config,
            transport,
            backend,
            Some(Arc::new(Sha256Digester)),
            Arc::new(SystemClock),
        )
    }

    pub fn with_components(
        config: ClientConfig,
        transport: Arc<dyn HttpTransport>,
        backend: Box<dyn SecretBackend>,
        digester: Option<Arc<dyn Digester>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = Arc::new(SecureStore::new(backend, digester.clone(), clock.clone()));
        let cookie = Arc::new(SessionCookie::new(store.clone(), clock.clone()));

        let fingerprint = Arc::new(DeviceFingerprint::new(
            PlatformInfo::detect(&config.platform),
            APP_TAG,
            digester.clone(),
            clock.clone(),
        ));
        let signer = RequestSigner::new(fingerprint, digester);

        let auth_limiter = Arc::new(RateLimiter::new(config.auth_rate_limit, clock.clone()));
        let api_limiter = Arc::new(RateLimiter::new(config.api_rate_limit, clock.clone()));

        let api = Arc::new(ApiClient::new(
            &config,
            transport,
            signer,
            api_limiter,
            cookie,
            clock,
        ));

        let auth = AuthManager::new(
            api.clone(),
            config.endpoints.clone(),
            auth_limiter,
            store.clone(),
        );
        let chat = ChatSynchronizer::new(api, config.endpoints.clone(), config.poll_interval());
        let preferences = NotificationPreferences::new(store.clone());

        tracing::debug!(base_url = %config.base_url, "core initialized");
        Self {
            config,
            store,
            auth,
            chat,
            preferences,
        }
    }

    /// Restore the server session held by the stored cookie.
    pub async fn start(&self) -> Option<Session> {
        self.auth.restore_session().await
    }

    /// Stop chat sync, then sign out and purge local secrets.
    pub async fn sign_out(&self) {
        self.chat.reset();
        self.auth.sign_out().await;
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth(&self) -> &AuthManager {
        &self.auth
    }

    pub fn chat(&self) -> &ChatSynchronizer {
        &self.chat
    }

    pub fn preferences(&self) -> &NotificationPreferences {
        &self.preferences
    }

    pub fn secure_store(&self) -> &SecureStore {
        &self.store
    }
}
