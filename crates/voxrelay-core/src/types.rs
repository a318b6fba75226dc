use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one voice call. Derived from the request body's `user` field,
/// falling back to `"default"` when absent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub const DEFAULT: &'static str = "default";

    pub fn from_request_user(user: Option<&str>) -> Self {
        match user.map(str::trim).filter(|s| !s.is_empty()) {
            Some(id) => Self(id.to_string()),
            None => Self(Self::DEFAULT.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single chat-completions message, as exchanged with both the voice
/// platform and the upstream LLM gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_falls_back_to_default() {
        assert_eq!(SessionId::from_request_user(None).as_str(), "default");
        assert_eq!(SessionId::from_request_user(Some("")).as_str(), "default");
        assert_eq!(SessionId::from_request_user(Some("   ")).as_str(), "default");
    }

    #[test]
    fn session_id_uses_user_field_when_present() {
        assert_eq!(SessionId::from_request_user(Some("u1")).as_str(), "u1");
    }
}
