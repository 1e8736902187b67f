use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::constants::{self, paths};

/// Fixed-window admission policy for a [`RateLimiter`](crate::security::RateLimiter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub max_attempts: usize,
    pub window_ms: u64,
}

impl RateLimitPolicy {
    pub const fn new(max_attempts: usize, window_ms: u64) -> Self {
        Self {
            max_attempts,
            window_ms,
        }
    }

    /// Sign-in / sign-up: 5 attempts per minute.
    pub const fn auth() -> Self {
        Self::new(5, 60_000)
    }

    /// Generic API traffic: 10 calls per second.
    pub const fn api() -> Self {
        Self::new(10, 1_000)
    }
}

/// Server paths, one per logical operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Endpoints {
    pub session: String,
    pub sign_in: String,
    pub sign_up: String,
    pub sign_out: String,
    pub profile: String,
    pub groups: String,
    pub group_join: String,
    pub group_preview: String,
    pub dms: String,
    pub messages: String,
    pub pin: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            session: paths::SESSION.to_string(),
            sign_in: paths::SIGN_IN.to_string(),
            sign_up: paths::SIGN_UP.to_string(),
            sign_out: paths::SIGN_OUT.to_string(),
            profile: paths::PROFILE.to_string(),
            groups: paths::GROUPS.to_string(),
            group_join: paths::GROUP_JOIN.to_string(),
            group_preview: paths::GROUP_PREVIEW.to_string(),
            dms: paths::DMS.to_string(),
            messages: paths::MESSAGES.to_string(),
            pin: paths::PIN.to_string(),
        }
    }
}

/// Overrides for the platform identifiers mixed into the device fingerprint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Client configuration, loadable from a camelCase JSON file.
/// Every field has a default so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub base_url: String,
    pub app_version: String,
    /// Surface transport error details to callers. Off in release builds.
    pub verbose_errors: bool,
    pub poll_interval_ms: u64,
    pub auth_rate_limit: RateLimitPolicy,
    pub api_rate_limit: RateLimitPolicy,
    pub platform: PlatformOverride,
    pub endpoints: Endpoints,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: constants::DEFAULT_BASE_URL.to_string(),
            app_version: constants::APP_VERSION.to_string(),
            verbose_errors: cfg!(debug_assertions),
            poll_interval_ms: constants::POLL_INTERVAL_MS,
            auth_rate_limit: RateLimitPolicy::auth(),
            api_rate_limit: RateLimitPolicy::api(),
            platform: PlatformOverride::default(),
            endpoints: Endpoints::default(),
        }
    }
}

impl ClientConfig {
    /// Load config from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load config from `path` if it exists, defaults otherwise
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
