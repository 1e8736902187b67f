//! Application-wide constants
//!
//! Centralized location for header names, storage key names, endpoint
//! defaults and limits that are shared across modules.

/// Default API server
pub const DEFAULT_BASE_URL: &str = "https://api.huddle.chat";

/// Sent as `X-App-Version` and mixed into the device fingerprint
pub const APP_VERSION: &str = "1.0.0";

/// Static tag mixed into the device fingerprint
pub const APP_TAG: &str = "huddle-mobile";

/// Keyring service under which secure values are stored
pub const KEYRING_SERVICE: &str = "com.huddle.client";

/// Message poll interval while a chat is open
pub const POLL_INTERVAL_MS: u64 = 5_000;

/// Number of fingerprint characters sent in `X-Device-ID`
pub const DEVICE_ID_HEADER_LEN: usize = 32;

/// Length of the hash prefix stored in a secure record envelope
pub const RECORD_HASH_LEN: usize = 16;

/// Rate limiter keys
pub mod limit_keys {
    pub const SIGN_IN: &str = "signIn";
    pub const SIGN_UP: &str = "signUp";
    pub const API: &str = "api";
}

/// HTTP header names produced by the API layer
pub mod headers {
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const ACCEPT: &str = "Accept";
    pub const REQUEST_TIME: &str = "X-Request-Time";
    pub const REQUEST_SIGNATURE: &str = "X-Request-Signature";
    pub const DEVICE_ID: &str = "X-Device-ID";
    pub const APP_VERSION: &str = "X-App-Version";
    pub const COOKIE: &str = "Cookie";
    pub const SET_COOKIE: &str = "set-cookie";
    pub const JSON: &str = "application/json";
}

/// Default endpoint paths, one per logical server operation
pub mod paths {
    pub const SESSION: &str = "/api/auth/get-session";
    pub const SIGN_IN: &str = "/api/auth/sign-in/email";
    pub const SIGN_UP: &str = "/api/auth/sign-up/email";
    pub const SIGN_OUT: &str = "/api/auth/sign-out";
    pub const PROFILE: &str = "/api/users/me";
    pub const GROUPS: &str = "/api/groups";
    pub const GROUP_JOIN: &str = "/api/groups/join";
    pub const GROUP_PREVIEW: &str = "/api/groups/preview";
    pub const DMS: &str = "/api/dms";
    pub const MESSAGES: &str = "/api/messages";
    pub const PIN: &str = "/api/pins";
}
