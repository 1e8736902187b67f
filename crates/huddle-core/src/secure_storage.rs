/// Tamper-evident storage for session secrets and preferences
///
/// Values are wrapped in an envelope `{value, timestamp, hash}` where `hash`
/// is the first 16 hex chars of `H(value + ":" + timestamp)`. A record whose
/// hash does not match is deleted and reported as absent.
///
/// The underlying store is OS-backed secure storage via `keyring`:
/// - macOS/iOS: Keychain
/// - Linux: Secret Service API (gnome-keyring, KWallet, etc.)
/// - Windows: Credential Manager
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use keyring::Entry;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;
use crate::constants::RECORD_HASH_LEN;
use crate::security::Digester;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecureKey {
    SessionToken,
    PushToken,
    NotificationSettings,
    MutedGroups,
}

impl SecureKey {
    /// Keys purged at sign-out.
    pub const SENSITIVE: [SecureKey; 4] = [
        SecureKey::SessionToken,
        SecureKey::PushToken,
        SecureKey::NotificationSettings,
        SecureKey::MutedGroups,
    ];

    pub fn key_name(&self) -> &'static str {
        match self {
            SecureKey::SessionToken => "session_token",
            SecureKey::PushToken => "push_token",
            SecureKey::NotificationSettings => "notification_settings",
            SecureKey::MutedGroups => "muted_groups",
        }
    }
}

impl fmt::Display for SecureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key_name())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SecureStorageError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

/// Raw encrypted key-value store underneath [`SecureStore`].
pub trait SecretBackend: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, SecureStorageError>;
    fn save(&self, key: &str, value: &str) -> Result<(), SecureStorageError>;
    fn remove(&self, key: &str) -> Result<(), SecureStorageError>;
}

/// Backend over the OS keychain.
pub struct KeyringBackend {
    service: String,
}

impl KeyringBackend {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl SecretBackend for KeyringBackend {
    fn load(&self, key: &str) -> Result<Option<String>, SecureStorageError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SecureStorageError::Keyring(e)),
        }
    }

    fn save(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        let entry = Entry::new(&self.service, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SecureStorageError> {
        let entry = Entry::new(&self.service, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()), // Already deleted is success
            Err(e) => Err(SecureStorageError::Keyring(e)),
        }
    }
}

/// In-process backend. Clones share the same map, so a test can hold one
/// handle and inspect or corrupt what the store wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: &str) {
        self.entries.lock().insert(key.to_string(), value.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl SecretBackend for MemoryBackend {
    fn load(&self, key: &str) -> Result<Option<String>, SecureStorageError> {
        Ok(self.raw(key))
    }

    fn save(&self, key: &str, value: &str) -> Result<(), SecureStorageError> {
        self.put_raw(key, value);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SecureStorageError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Envelope persisted for every value written with a hash primitive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecureRecord {
    pub value: String,
    pub timestamp: u64,
    pub hash: String,
}

impl SecureRecord {
    fn seal(value: &str, timestamp: u64, digester: &dyn Digester) -> Self {
        Self {
            value: value.to_string(),
            timestamp,
            hash: record_hash(value, timestamp, digester),
        }
    }

    fn verify(&self, digester: &dyn Digester) -> bool {
        self.hash == record_hash(&self.value, self.timestamp, digester)
    }
}

fn record_hash(value: &str, timestamp: u64, digester: &dyn Digester) -> String {
    let digest = digester.hex_digest(&format!("{}:{}", value, timestamp));
    digest.chars().take(RECORD_HASH_LEN).collect()
}

/// Integrity-checked store. Never fails outward: read failures are absent
/// values, write and delete failures are logged and dropped.
pub struct SecureStore {
    backend: Box<dyn SecretBackend>,
    digester: Option<Arc<dyn Digester>>,
    clock: Arc<dyn Clock>,
}

impl SecureStore {
    pub fn new(
        backend: Box<dyn SecretBackend>,
        digester: Option<Arc<dyn Digester>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            digester,
            clock,
        }
    }

    /// Store a value, sealed in an envelope when hashing is available
    pub fn set(&self, key: SecureKey, value: &str) {
        let stored = match &self.digester {
            Some(digester) => {
                let record = SecureRecord::seal(value, self.clock.now_millis(), digester.as_ref());
                match serde_json::to_string(&record) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(%key, "failed to serialize secure record: {}", e);
                        return;
                    }
                }
            }
            None => value.to_string(),
        };
        if let Err(e) = self.backend.save(key.key_name(), &stored) {
            tracing::warn!(%key, "secure store write failed: {}", e);
        }
    }

    /// Retrieve a value, deleting it if its envelope fails verification
    pub fn get(&self, key: SecureKey) -> Option<String> {
        let raw = match self.backend.load(key.key_name()) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(%key, "secure store read failed: {}", e);
                return None;
            }
        };

        let Ok(record) = serde_json::from_str::<SecureRecord>(&raw) else {
            // Legacy or degraded-mode plain value
            return Some(raw);
        };

        match &self.digester {
            Some(digester) if !record.verify(digester.as_ref()) => {
                tracing::warn!(%key, "secure record failed integrity check, discarding");
                self.delete(key);
                None
            }
            _ => Some(record.value),
        }
    }

    pub fn delete(&self, key: SecureKey) {
        if let Err(e) = self.backend.remove(key.key_name()) {
            tracing::warn!(%key, "secure store delete failed: {}", e);
        }
    }

    pub fn clear(&self, keys: &[SecureKey]) {
        for key in keys {
            self.delete(*key);
        }
    }

    pub fn exists(&self, key: SecureKey) -> bool {
        self.get(key).is_some()
    }
}
