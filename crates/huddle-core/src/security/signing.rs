use std::sync::Arc;

use super::{DeviceFingerprint, Digester};

/// Produces the `X-Request-Signature` header value.
pub struct RequestSigner {
    fingerprint: Arc<DeviceFingerprint>,
    digester: Option<Arc<dyn Digester>>,
}

impl RequestSigner {
    pub fn new(fingerprint: Arc<DeviceFingerprint>, digester: Option<Arc<dyn Digester>>) -> Self {
        Self {
            fingerprint,
            digester,
        }
    }

    pub fn fingerprint(&self) -> &DeviceFingerprint {
        &self.fingerprint
    }

    pub fn sign(&self, method: &str, path: &str, timestamp_millis: u64) -> String {
        match &self.digester {
            Some(digester) => {
                let payload = format!(
                    "{}:{}:{}:{}",
                    method,
                    path,
                    timestamp_millis,
                    self.fingerprint.value()
                );
                digester.hex_digest(&payload)
            }
            None => format!("{}-{}", method, timestamp_millis),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::{PlatformInfo, Sha256Digester};

    fn signer(digester: Option<Arc<dyn Digester>>) -> RequestSigner {
        let fp = DeviceFingerprint::new(
            PlatformInfo::new("ios", "17"),
            "tag",
            digester.clone(),
            Arc::new(ManualClock::new(0)),
        );
        RequestSigner::new(Arc::new(fp), digester)
    }

    #[test]
    fn test_signature_covers_all_inputs() {
        let signer = signer(Some(Arc::new(Sha256Digester)));
        let base = signer.sign("GET", "/api/groups", 1_000);

        assert_eq!(base, signer.sign("GET", "/api/groups", 1_000));
        assert_ne!(base, signer.sign("POST", "/api/groups", 1_000));
        assert_ne!(base, signer.sign("GET", "/api/dms", 1_000));
        assert_ne!(base, signer.sign("GET", "/api/groups", 1_001));

        let expected = Sha256Digester.hex_digest(&format!(
            "GET:/api/groups:1000:{}",
            signer.fingerprint().value()
        ));
        assert_eq!(base, expected);
    }

    #[test]
    fn test_signature_fallback_without_digester() {
        let signer = signer(None);
        assert_eq!(signer.sign("DELETE", "/api/x", 42), "DELETE-42");
    }
}
