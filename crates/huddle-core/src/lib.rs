//! Client core for the Huddle chat app: signed API access, tamper-evident
//! local secrets, auth session ownership and polling chat sync.

pub mod api;
pub mod auth;
pub mod clock;
pub mod config;
pub mod constants;
pub mod models;
pub mod preferences;
pub mod runtime;
pub mod secure_storage;
pub mod security;
pub mod sync;
pub mod tracing_setup;

#[cfg(test)]
pub(crate) mod test_support;

pub use api::{ApiClient, ApiResponse};
pub use auth::{AuthError, AuthManager, AuthState};
pub use config::ClientConfig;
pub use models::{ChatTarget, Session};
pub use runtime::HuddleCore;
pub use sync::{ChatSynchronizer, ConversationState, SyncError, SyncEvent};
