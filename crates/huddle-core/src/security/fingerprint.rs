use std::sync::{Arc, OnceLock};

use crate::clock::Clock;
use crate::config::PlatformOverride;

use super::Digester;

/// Platform identifiers mixed into the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformInfo {
    pub name: String,
    pub version: String,
}

impl PlatformInfo {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Detect the running platform, applying any configured overrides.
    pub fn detect(overrides: &PlatformOverride) -> Self {
        let name = overrides
            .name
            .clone()
            .unwrap_or_else(|| std::env::consts::OS.to_string());
        let version = overrides.version.clone().unwrap_or_else(os_release);
        Self { name, version }
    }
}

#[cfg(unix)]
fn os_release() -> String {
    // SAFETY: utsname is plain old data and uname only writes into it.
    let mut uts: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut uts) } != 0 {
        return "unknown".to_string();
    }
    let release = unsafe { std::ffi::CStr::from_ptr(uts.release.as_ptr()) };
    release.to_string_lossy().into_owned()
}

#[cfg(not(unix))]
fn os_release() -> String {
    "unknown".to_string()
}

/// Stable per-process identifier for this client install.
///
/// Derived lazily on first use and cached for the lifetime of the value.
/// Never persisted, so a fresh instance re-derives it.
pub struct DeviceFingerprint {
    platform: PlatformInfo,
    app_tag: String,
    digester: Option<Arc<dyn Digester>>,
    clock: Arc<dyn Clock>,
    cached: OnceLock<String>,
}

impl DeviceFingerprint {
    pub fn new(
        platform: PlatformInfo,
        app_tag: impl Into<String>,
        digester: Option<Arc<dyn Digester>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            platform,
            app_tag: app_tag.into(),
            digester,
            clock,
            cached: OnceLock::new(),
        }
    }

    pub fn value(&self) -> &str {
        self.cached.get_or_init(|| self.derive())
    }

    /// Truncated form sent in the `X-Device-ID` header.
    pub fn header_value(&self, len: usize) -> String {
        self.value().chars().take(len).collect()
    }

    fn derive(&self) -> String {
        match &self.digester {
            Some(digester) => {
                let material = format!(
                    "{}-{}-{}",
                    self.platform.name, self.platform.version, self.app_tag
                );
                digester.hex_digest(&material)
            }
            None => {
                tracing::warn!("no hash primitive available, using weak device fingerprint");
                format!("{}{}", self.platform.name, self.clock.now_millis())
            }
        }
    }
}
