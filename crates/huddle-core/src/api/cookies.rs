use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use parking_lot::RwLock;

use crate::clock::Clock;
use crate::secure_storage::{SecureKey, SecureStore};

/// Holder of the server session cookie.
///
/// The only place cookies are sourced from: the API layer reads it for every
/// request and feeds it `Set-Cookie` values from every response. Persisted
/// through the secure store so a restart can restore the session.
///
/// Every [`clear`](Self::clear) starts a new epoch. Responses to requests
/// sent in an earlier epoch cannot write the cookie back.
pub struct SessionCookie {
    store: Arc<SecureStore>,
    clock: Arc<dyn Clock>,
    cached: RwLock<Option<String>>,
    epoch: AtomicU64,
}

impl SessionCookie {
    pub fn new(store: Arc<SecureStore>, clock: Arc<dyn Clock>) -> Self {
        let cached = store.get(SecureKey::SessionToken);
        Self {
            store,
            clock,
            cached: RwLock::new(cached),
            epoch: AtomicU64::new(0),
        }
    }

    pub fn get(&self) -> Option<String> {
        self.cached.read().clone()
    }

    /// Epoch to hand back to [`absorb`](Self::absorb) with the response.
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Merge `Set-Cookie` header values into the held cookie string.
    ///
    /// Cookies with an empty value, a non-positive `Max-Age` or an `Expires`
    /// in the past are deletions. Updates from a request sent before the
    /// last `clear()` are dropped.
    pub fn absorb<'a>(&self, epoch: u64, set_cookie_values: impl IntoIterator<Item = &'a str>) {
        let now_millis = self.clock.now_millis();
        let updates: Vec<(String, String)> = set_cookie_values
            .into_iter()
            .filter_map(|raw| parse_set_cookie(raw, now_millis))
            .collect();
        if updates.is_empty() {
            return;
        }

        let mut cached = self.cached.write();
        if epoch != self.epoch() {
            tracing::debug!("dropping Set-Cookie from a request sent before sign-out");
            return;
        }
        let mut pairs: Vec<(String, String)> = cached
            .as_deref()
            .map(split_cookie_header)
            .unwrap_or_default();

        for (name, value) in updates {
            pairs.retain(|(n, _)| n != &name);
            if !value.is_empty() {
                pairs.push((name, value));
            }
        }

        if pairs.is_empty() {
            *cached = None;
            self.store.delete(SecureKey::SessionToken);
        } else {
            let header = pairs
                .iter()
                .map(|(n, v)| format!("{}={}", n, v))
                .collect::<Vec<_>>()
                .join("; ");
            self.store.set(SecureKey::SessionToken, &header);
            *cached = Some(header);
        }
    }

    pub fn clear(&self) {
        let mut cached = self.cached.write();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        *cached = None;
        self.store.delete(SecureKey::SessionToken);
    }
}

/// `name=value; Path=/; HttpOnly` -> `(name, value)`. An expired cookie
/// comes back with an empty value.
fn parse_set_cookie(raw: &str, now_millis: u64) -> Option<(String, String)> {
    let mut parts = raw.split(';');
    let pair = parts.next()?.trim();
    let (name, value) = pair.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut max_age = None;
    let mut expires = None;
    for attribute in parts {
        let Some((key, attr_value)) = attribute.trim().split_once('=') else {
            continue;
        };
        let attr_value = attr_value.trim();
        if key.trim().eq_ignore_ascii_case("max-age") {
            max_age = attr_value.parse::<i64>().ok();
        } else if key.trim().eq_ignore_ascii_case("expires") {
            expires = parse_cookie_date(attr_value);
        }
    }

    // Max-Age wins over Expires
    let expired = match (max_age, expires) {
        (Some(seconds), _) => seconds <= 0,
        (None, Some(at)) => at.timestamp_millis() <= now_millis as i64,
        (None, None) => false,
    };
    let value = if expired { "" } else { value.trim() };
    Some((name.to_string(), value.to_string()))
}

/// RFC 1123 dates, plus the dashed `Thu, 01-Jan-1970 00:00:00 GMT` variant.
fn parse_cookie_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%a, %d-%b-%Y %H:%M:%S GMT")
                .ok()
                .map(|at| at.and_utc())
        })
}

fn split_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|part| {
            let (name, value) = part.trim().split_once('=')?;
            Some((name.to_string(), value.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::secure_storage::MemoryBackend;
    use crate::security::Sha256Digester;

    // 2023-11-14T22:13:20Z
    const NOW: u64 = 1_700_000_000_000;

    fn store(backend: &MemoryBackend) -> Arc<SecureStore> {
        Arc::new(SecureStore::new(
            Box::new(backend.clone()),
            Some(Arc::new(Sha256Digester)),
            Arc::new(ManualClock::new(NOW)),
        ))
    }

    fn holder(backend: &MemoryBackend) -> SessionCookie {
        SessionCookie::new(store(backend), Arc::new(ManualClock::new(NOW)))
    }

    #[test]
    fn test_absorb_and_persist() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        assert!(cookie.get().is_none());

        cookie.absorb(0, ["session=abc; Path=/; HttpOnly; SameSite=Lax"]);
        assert_eq!(cookie.get().as_deref(), Some("session=abc"));

        // A fresh holder restores from the store
        let restored = holder(&backend);
        assert_eq!(restored.get().as_deref(), Some("session=abc"));
    }

    #[test]
    fn test_absorb_merges_and_replaces() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        cookie.absorb(0, ["session=abc", "csrf=1"]);
        cookie.absorb(0, ["session=def; Max-Age=3600"]);
        assert_eq!(cookie.get().as_deref(), Some("csrf=1; session=def"));
    }

    #[test]
    fn test_empty_value_deletes() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        cookie.absorb(0, ["session=abc"]);
        cookie.absorb(0, ["session=; Max-Age=0"]);
        assert_eq!(cookie.get(), None);
        assert!(backend.raw("session_token").is_none());
    }

    #[test]
    fn test_garbage_is_ignored() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        cookie.absorb(0, ["", "no-equals-sign", "=value"]);
        assert_eq!(cookie.get(), None);
    }

    #[test]
    fn test_max_age_zero_deletes_placeholder_value() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        cookie.absorb(0, ["session=abc", "csrf=1"]);
        cookie.absorb(0, ["session=deleted; Max-Age=0; Path=/"]);
        assert_eq!(cookie.get().as_deref(), Some("csrf=1"));

        cookie.absorb(0, ["csrf=deleted; max-age=-1"]);
        assert_eq!(cookie.get(), None);
        assert!(backend.raw("session_token").is_none());
    }

    #[test]
    fn test_past_expires_deletes() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        cookie.absorb(0, ["session=abc"]);
        cookie.absorb(0, ["session=x; Expires=Thu, 01 Jan 1970 00:00:00 GMT"]);
        assert_eq!(cookie.get(), None);

        cookie.absorb(0, ["session=abc"]);
        cookie.absorb(0, ["session=x; Path=/; expires=Thu, 01-Jan-1970 00:00:00 GMT"]);
        assert_eq!(cookie.get(), None);
    }

    #[test]
    fn test_future_expires_and_max_age_precedence() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        cookie.absorb(0, ["session=abc; Expires=Fri, 01 Jan 2100 00:00:00 GMT"]);
        assert_eq!(cookie.get().as_deref(), Some("session=abc"));

        // Max-Age overrides a past Expires
        cookie.absorb(0, ["session=def; Max-Age=60; Expires=Thu, 01 Jan 1970 00:00:00 GMT"]);
        assert_eq!(cookie.get().as_deref(), Some("session=def"));

        // An unparseable date is ignored
        cookie.absorb(0, ["session=ghi; Expires=soon"]);
        assert_eq!(cookie.get().as_deref(), Some("session=ghi"));
    }

    #[test]
    fn test_update_from_before_clear_is_dropped() {
        let backend = MemoryBackend::new();
        let cookie = holder(&backend);
        let sent_in = cookie.epoch();
        cookie.absorb(sent_in, ["session=abc"]);

        cookie.clear();
        assert_ne!(cookie.epoch(), sent_in);
        cookie.absorb(sent_in, ["session=late"]);
        assert_eq!(cookie.get(), None);
        assert!(backend.raw("session_token").is_none());

        cookie.absorb(cookie.epoch(), ["session=fresh"]);
        assert_eq!(cookie.get().as_deref(), Some("session=fresh"));
    }
}
