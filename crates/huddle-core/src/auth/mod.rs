//! Ownership of the signed-in identity.
//!
//! `AuthManager` is the only writer of the [`Session`]. State moves
//! `Loading -> Authenticated | Unauthenticated` on restore, and between the
//! latter two on sign-in / sign-out. There is never a partially filled
//! session.

pub mod validation;

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiResponse};
use crate::config::Endpoints;
use crate::constants::limit_keys;
use crate::models::Session;
use crate::secure_storage::{SecureKey, SecureStore};
use crate::security::RateLimiter;

use validation::{
    sanitize, sanitize_email, validate_email, validate_name, validate_password_present,
    validate_password_strength,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Loading,
    Unauthenticated,
    Authenticated(Session),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("Too many attempts. Please wait a minute and try again.")]
    RateLimited,
    #[error("{0}")]
    NeedsVerification(String),
    #[error("{0}")]
    RequestFailed(String),
}

#[derive(Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileUpdate<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: Option<&'a str>,
}

#[derive(Deserialize)]
struct UserEnvelope {
    #[serde(default)]
    user: Option<Session>,
}

pub struct AuthManager {
    api: Arc<ApiClient>,
    endpoints: Endpoints,
    limiter: Arc<RateLimiter>,
    store: Arc<SecureStore>,
    state: RwLock<AuthState>,
}

impl AuthManager {
    pub fn new(
        api: Arc<ApiClient>,
        endpoints: Endpoints,
        limiter: Arc<RateLimiter>,
        store: Arc<SecureStore>,
    ) -> Self {
        Self {
            api,
            endpoints,
            limiter,
            store,
            state: RwLock::new(AuthState::Loading),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.read().clone()
    }

    pub fn session(&self) -> Option<Session> {
        match &*self.state.read() {
            AuthState::Authenticated(session) => Some(session.clone()),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.state.read(), AuthState::Authenticated(_))
    }

    /// Ask the server whether the held cookie still maps to a user.
    pub async fn restore_session(&self) -> Option<Session> {
        let response: ApiResponse<UserEnvelope> = self.api.get(&self.endpoints.session).await;
        let session = if response.is_success() {
            response.data.and_then(|envelope| envelope.user)
        } else {
            tracing::debug!(status = response.status, "session check did not return a user");
            None
        };

        *self.state.write() = match &session {
            Some(session) => {
                tracing::info!(user_id = %session.id, "session restored");
                AuthState::Authenticated(session.clone())
            }
            None => AuthState::Unauthenticated,
        };
        session
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        if !self.limiter.can_attempt(limit_keys::SIGN_IN) {
            tracing::warn!("sign-in rate limited");
            return Err(AuthError::RateLimited);
        }

        let email = sanitize_email(email);
        validate_email(&email).map_err(AuthError::InvalidInput)?;
        validate_password_present(password).map_err(AuthError::InvalidInput)?;

        self.limiter.record_attempt(limit_keys::SIGN_IN);
        let response: ApiResponse<UserEnvelope> = self
            .api
            .post(
                &self.endpoints.sign_in,
                &SignInRequest {
                    email: &email,
                    password,
                },
            )
            .await;

        if !response.is_success() {
            return Err(classify_failure(response, "Sign in failed"));
        }
        let Some(minimal) = response.data.and_then(|envelope| envelope.user) else {
            return Err(AuthError::RequestFailed("Sign in failed".to_string()));
        };

        self.limiter.reset(limit_keys::SIGN_IN);

        let session = match self.fetch_profile().await {
            Some(profile) => profile,
            None => {
                tracing::debug!("extended profile unavailable, using sign-in payload");
                minimal
            }
        };
        tracing::info!(user_id = %session.id, "signed in");
        *self.state.write() = AuthState::Authenticated(session.clone());
        Ok(session)
    }

    /// Register an account. Does not sign in.
    pub async fn sign_up(&self, email: &str, password: &str, name: &str) -> Result<(), AuthError> {
        if !self.limiter.can_attempt(limit_keys::SIGN_UP) {
            tracing::warn!("sign-up rate limited");
            return Err(AuthError::RateLimited);
        }

        let email = sanitize_email(email);
        let name = sanitize(name);
        validate_email(&email).map_err(AuthError::InvalidInput)?;
        validate_name(&name).map_err(AuthError::InvalidInput)?;
        validate_password_strength(password).map_err(AuthError::InvalidInput)?;

        self.limiter.record_attempt(limit_keys::SIGN_UP);
        let response: ApiResponse<serde_json::Value> = self
            .api
            .post(
                &self.endpoints.sign_up,
                &SignUpRequest {
                    email: &email,
                    password,
                    name: &name,
                },
            )
            .await;

        if !response.is_success() {
            return Err(classify_failure(response, "Sign up failed"));
        }
        tracing::info!("account created");
        Ok(())
    }

    /// Remote sign-out is best effort; local state is always purged.
    pub async fn sign_out(&self) {
        let response: ApiResponse<serde_json::Value> = self
            .api
            .post(&self.endpoints.sign_out, &serde_json::json!({}))
            .await;
        if !response.is_success() {
            tracing::warn!(
                status = response.status,
                "remote sign-out failed, clearing local session anyway"
            );
        }

        self.store.clear(&SecureKey::SENSITIVE);
        self.api.cookie().clear();
        *self.state.write() = AuthState::Unauthenticated;
        tracing::info!("signed out");
    }

    /// Re-fetch the profile. Keeps the current session on failure.
    pub async fn refresh_user(&self) {
        let Some(profile) = self.fetch_profile().await else {
            tracing::debug!("profile refresh failed, keeping current session");
            return;
        };
        let mut state = self.state.write();
        if matches!(*state, AuthState::Authenticated(_)) {
            *state = AuthState::Authenticated(profile);
        }
    }

    pub async fn update_profile(
        &self,
        name: &str,
        color: Option<&str>,
    ) -> Result<Session, AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::RequestFailed("Not signed in".to_string()));
        }
        let name = sanitize(name);
        validate_name(&name).map_err(AuthError::InvalidInput)?;

        let response: ApiResponse<UserEnvelope> = self
            .api
            .put(&self.endpoints.profile, &ProfileUpdate { name: &name, color })
            .await;
        if !response.is_success() {
            return Err(classify_failure(response, "Failed to update profile"));
        }
        let session = response
            .data
            .and_then(|envelope| envelope.user)
            .ok_or_else(|| AuthError::RequestFailed("Failed to update profile".to_string()))?;

        let mut state = self.state.write();
        if matches!(*state, AuthState::Authenticated(_)) {
            *state = AuthState::Authenticated(session.clone());
        }
        Ok(session)
    }

    async fn fetch_profile(&self) -> Option<Session> {
        let response: ApiResponse<UserEnvelope> = self.api.get(&self.endpoints.profile).await;
        if !response.is_success() {
            return None;
        }
        response.data.and_then(|envelope| envelope.user)
    }
}

fn classify_failure<T>(response: ApiResponse<T>, fallback: &str) -> AuthError {
    if response.is_rate_limited() {
        return AuthError::RateLimited;
    }
    let message = response.error.unwrap_or_else(|| fallback.to_string());
    if message.to_lowercase().contains("verify") {
        AuthError::NeedsVerification(message)
    } else {
        AuthError::RequestFailed(message)
    }
}
