use serde::{Deserialize, Serialize};

/// The signed-in user's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub is_verified: bool,
}

fn default_role() -> String {
    "user".to_string()
}

impl Session {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.email
        } else {
            &self.name
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_payload_defaults() {
        let session: Session =
            serde_json::from_str(r#"{"id":"u1","email":"a@b.co"}"#).unwrap();
        assert_eq!(session.role, "user");
        assert!(!session.email_verified);
        assert_eq!(session.display_name(), "a@b.co");
    }

    #[test]
    fn test_full_payload() {
        let json = r##"{"id":"u1","name":"Ada","email":"ada@x.io","role":"admin",
            "color":"#ff0000","emailVerified":true,"isVerified":true}"##;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.display_name(), "Ada");
        assert_eq!(session.color.as_deref(), Some("#ff0000"));
        assert!(session.email_verified && session.is_verified);
    }
}
