use sha2::{Digest, Sha256};

/// Hash primitive used by the secure store, fingerprint and signer.
///
/// Components hold an `Option<Arc<dyn Digester>>`; `None` models a platform
/// without a usable hash primitive and switches them to their weak fallbacks.
pub trait Digester: Send + Sync {
    /// Lowercase hex digest of `input`.
    fn hex_digest(&self, input: &str) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha256Digester;

impl Digester for Sha256Digester {
    fn hex_digest(&self, input: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(input.as_bytes());
        hex::encode(hasher.finalize())
    }
}
