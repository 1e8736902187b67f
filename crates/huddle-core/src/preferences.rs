use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::secure_storage::{SecureKey, SecureStore};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub enabled: bool,
    pub direct_messages: bool,
    pub group_messages: bool,
    pub sound: bool,
    pub show_preview: bool,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            direct_messages: true,
            group_messages: true,
            sound: true,
            show_preview: true,
        }
    }
}

/// Notification settings, muted groups and push token, persisted through the
/// secure store so they are integrity-checked and purged at sign-out.
pub struct NotificationPreferences {
    store: Arc<SecureStore>,
}

impl NotificationPreferences {
    pub fn new(store: Arc<SecureStore>) -> Self {
        Self { store }
    }

    pub fn settings(&self) -> NotificationSettings {
        self.load_json(SecureKey::NotificationSettings)
            .unwrap_or_default()
    }

    pub fn set_settings(&self, settings: &NotificationSettings) {
        self.save_json(SecureKey::NotificationSettings, settings);
    }

    pub fn muted_groups(&self) -> BTreeSet<String> {
        self.load_json(SecureKey::MutedGroups).unwrap_or_default()
    }

    pub fn is_group_muted(&self, group_id: &str) -> bool {
        self.muted_groups().contains(group_id)
    }

    /// Returns true if the group is muted after the call.
    pub fn toggle_group_mute(&self, group_id: &str) -> bool {
        let mut muted = self.muted_groups();
        let now_muted = if muted.remove(group_id) {
            false
        } else {
            muted.insert(group_id.to_string());
            true
        };
        self.save_json(SecureKey::MutedGroups, &muted);
        now_muted
    }

    pub fn push_token(&self) -> Option<String> {
        self.store.get(SecureKey::PushToken)
    }

    pub fn set_push_token(&self, token: &str) {
        self.store.set(SecureKey::PushToken, token);
    }

    /// Whether a message in `group_id` (or a DM when `None`) should notify.
    pub fn should_notify(&self, group_id: Option<&str>) -> bool {
        let settings = self.settings();
        if !settings.enabled {
            return false;
        }
        match group_id {
            Some(id) => settings.group_messages && !self.is_group_muted(id),
            None => settings.direct_messages,
        }
    }

    fn load_json<T: serde::de::DeserializeOwned>(&self, key: SecureKey) -> Option<T> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(%key, "stored preference is malformed, using default: {}", e);
                None
            }
        }
    }

    fn save_json<T: Serialize>(&self, key: SecureKey, value: &T) {
        match serde_json::to_string(value) {
            Ok(json) => self.store.set(key, &json),
            Err(e) => tracing::error!(%key, "failed to serialize preference: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::secure_storage::MemoryBackend;
    use crate::security::Sha256Digester;

    fn prefs(backend: &MemoryBackend) -> NotificationPreferences {
        NotificationPreferences::new(Arc::new(SecureStore::new(
            Box::new(backend.clone()),
            Some(Arc::new(Sha256Digester)),
            Arc::new(ManualClock::new(0)),
        )))
    }

    #[test]
    fn test_settings_default_and_persist() {
        let backend = MemoryBackend::new();
        let prefs = prefs(&backend);
        assert_eq!(prefs.settings(), NotificationSettings::default());

        let settings = NotificationSettings {
            sound: false,
            ..Default::default()
        };
        prefs.set_settings(&settings);
        assert_eq!(prefs.settings(), settings);
    }

    #[test]
    fn test_toggle_group_mute() {
        let backend = MemoryBackend::new();
        let prefs = prefs(&backend);
        assert!(prefs.toggle_group_mute("g1"));
        assert!(prefs.is_group_muted("g1"));
        assert!(!prefs.should_notify(Some("g1")));
        assert!(prefs.should_notify(Some("g2")));
        assert!(!prefs.toggle_group_mute("g1"));
        assert!(!prefs.is_group_muted("g1"));
    }

    #[test]
    fn test_should_notify_respects_master_switch() {
        let backend = MemoryBackend::new();
        let prefs = prefs(&backend);
        prefs.set_settings(&NotificationSettings {
            enabled: false,
            ..Default::default()
        });
        assert!(!prefs.should_notify(None));
        assert!(!prefs.should_notify(Some("g1")));
    }

    #[test]
    fn test_malformed_value_falls_back() {
        let backend = MemoryBackend::new();
        backend.put_raw("muted_groups", "definitely not json");
        assert!(prefs(&backend).muted_groups().is_empty());
    }

    #[test]
    fn test_push_token() {
        let backend = MemoryBackend::new();
        let prefs = prefs(&backend);
        assert_eq!(prefs.push_token(), None);
        prefs.set_push_token("ExponentPushToken[abc]");
        assert_eq!(prefs.push_token().as_deref(), Some("ExponentPushToken[abc]"));
    }
}
