//! Request-integrity primitives: hashing, device fingerprint, request
//! signatures and attempt rate limiting.
//!
//! Fingerprint and signature are advisory headers. Nothing here is a trust
//! boundary; the server is free to ignore them.

pub mod digest;
pub mod fingerprint;
pub mod rate_limit;
pub mod signing;

pub use digest::{Digester, Sha256Digester};
pub use fingerprint::{DeviceFingerprint, PlatformInfo};
pub use rate_limit::RateLimiter;
pub use signing::RequestSigner;
