use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation the client can open: a group or a direct message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum ChatTarget {
    Group(String),
    Dm(String),
}

impl ChatTarget {
    pub fn id(&self) -> &str {
        match self {
            ChatTarget::Group(id) | ChatTarget::Dm(id) => id,
        }
    }

    /// Field name the server uses to address messages for this target.
    pub fn discriminator(&self) -> &'static str {
        match self {
            ChatTarget::Group(_) => "groupId",
            ChatTarget::Dm(_) => "dmId",
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChatTarget::Group(_) => "group",
            ChatTarget::Dm(_) => "dm",
        }
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub content: String,
    pub sender: UserSummary,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePreview {
    pub content: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub invite_code: Option<String>,
    #[serde(default)]
    pub member_count: u32,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<MessagePreview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmSummary {
    pub id: String,
    pub other_user: UserSummary,
    #[serde(default)]
    pub is_pinned: bool,
    #[serde(default)]
    pub unread_count: u32,
    #[serde(default)]
    pub last_message: Option<MessagePreview>,
}

/// What a user sees before joining a group by invite code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupPreview {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub member_count: u32,
}

/// Shared view of the summary fields the synchronizer mutates in place.
pub trait ChatSummary {
    fn id(&self) -> &str;
    fn is_pinned(&self) -> bool;
    fn set_pinned(&mut self, pinned: bool);
    fn clear_unread(&mut self);
}

impl ChatSummary for GroupSummary {
    fn id(&self) -> &str {
        &self.id
    }
    fn is_pinned(&self) -> bool {
        self.is_pinned
    }
    fn set_pinned(&mut self, pinned: bool) {
        self.is_pinned = pinned;
    }
    fn clear_unread(&mut self) {
        self.unread_count = 0;
    }
}

impl ChatSummary for DmSummary {
    fn id(&self) -> &str {
        &self.id
    }
    fn is_pinned(&self) -> bool {
        self.is_pinned
    }
    fn set_pinned(&mut self, pinned: bool) {
        self.is_pinned = pinned;
    }
    fn clear_unread(&mut self) {
        self.unread_count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_target_discriminator() {
        let group = ChatTarget::Group("g1".into());
        let dm = ChatTarget::Dm("d1".into());
        assert_eq!(group.discriminator(), "groupId");
        assert_eq!(dm.discriminator(), "dmId");
        assert_eq!(group.to_string(), "group:g1");
        assert_eq!(
            serde_json::to_value(&dm).unwrap(),
            serde_json::json!({"type": "dm", "id": "d1"})
        );
    }

    #[test]
    fn test_group_summary_defaults() {
        let group: GroupSummary =
            serde_json::from_str(r#"{"id":"g1","name":"Crew"}"#).unwrap();
        assert!(!group.is_pinned);
        assert_eq!(group.unread_count, 0);
        assert!(group.last_message.is_none());
    }

    #[test]
    fn test_message_parses_server_shape() {
        let json = r#"{
            "id": "m1",
            "content": "hi",
            "sender": {"id": "u1", "name": "Ada"},
            "createdAt": "2024-05-01T10:00:00Z",
            "attachments": [{"url": "https://cdn/x.png", "mimeType": "image/png"}]
        }"#;
        let message: Message = serde_json::from_str(json).unwrap();
        assert_eq!(message.sender.name, "Ada");
        assert_eq!(message.attachments[0].mime_type.as_deref(), Some("image/png"));
    }
}
