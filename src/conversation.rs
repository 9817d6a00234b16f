//! Conversation messages handed to the engine by the chat transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// How the assistant addresses the founder in German ("Sie" vs "du").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Addressing {
    Formal,
    #[default]
    Informal,
}

impl std::str::FromStr for Addressing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "formal" | "sie" => Ok(Self::Formal),
            "informal" | "du" => Ok(Self::Informal),
            other => Err(format!("unknown addressing style: {other}")),
        }
    }
}

/// A single message in the ordered, append-only history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

/// Iterate over the text of user-authored messages, oldest first.
pub fn user_texts(messages: &[Message]) -> impl Iterator<Item = &str> {
    messages
        .iter()
        .filter(|m| m.is_user())
        .map(|m| m.text.as_str())
}

/// Concatenate all user-authored text into one block.
pub fn combined_user_text(messages: &[Message]) -> String {
    user_texts(messages).collect::<Vec<_>>().join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_user_text_skips_assistant() {
        let history = vec![
            Message::assistant("Hallo! Was möchtest du gründen?"),
            Message::user("Ein Café."),
            Message::assistant("Schön."),
            Message::user("Mit Kuchen."),
        ];
        assert_eq!(combined_user_text(&history), "Ein Café.\nMit Kuchen.");
    }

    #[test]
    fn role_serde_is_lowercase() {
        let json = serde_json::to_string(&Message::user("hi")).unwrap();
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("timestamp"));
    }
}
