pub mod chat;
pub mod session;

pub use chat::{
    Attachment, ChatTarget, DmSummary, GroupPreview, GroupSummary, Message, MessagePreview,
    UserSummary,
};
pub use session::Session;
