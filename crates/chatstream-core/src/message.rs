use std::fmt;

use chrono::{DateTime, Utc};

use crate::part::Part;

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "user")]
    Human,
    #[default]
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Human => f.write_str("human"),
            Self::Assistant => f.write_str("assistant"),
        }
    }
}

/// Whether a message still accepts streamed content.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MessageStatus {
    Streaming,
    Complete,
    /// Closed by a stream error or cancellation. Parts produced before the
    /// failure stay readable.
    Failed { reason: String },
}

/// An ordered sequence of parts under one role.
///
/// Parts are appended in arrival order and never reordered or removed.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    #[serde(flatten)]
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
            status: MessageStatus::Streaming,
            created_at: Utc::now(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == MessageStatus::Streaming
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, MessageStatus::Failed { .. })
    }

    /// Concatenates all text parts in order, ignoring other kinds.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for part in &self.parts {
            if let Part::Text(text) = part {
                out.push_str(&text.content);
            }
        }
        out
    }

    /// Appends a part and returns its index.
    pub(crate) fn push_part(&mut self, part: Part) -> usize {
        self.parts.push(part);
        self.parts.len() - 1
    }

    /// Closes the message and freezes every part. Closing a closed message
    /// leaves it unchanged.
    pub(crate) fn close(&mut self, status: MessageStatus) -> bool {
        if !self.is_open() {
            return false;
        }
        for part in &mut self.parts {
            part.close();
        }
        self.status = status;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::part::{TextPart, ToolCallPart};

    fn text(id: &str, content: &str) -> Part {
        Part::Text(TextPart {
            id: id.into(),
            content: content.into(),
            closed: false,
        })
    }

    #[test]
    fn text_concatenates_text_parts_only() {
        let mut message = Message::new("m1", Role::Assistant);
        message.push_part(text("a", "hello"));
        message.push_part(Part::ToolCall(ToolCallPart::new("t1", "noop")));
        message.push_part(text("b", " world"));
        assert_eq!(message.text(), "hello world");
    }

    #[test]
    fn close_is_one_shot() {
        let mut message = Message::new("m1", Role::Assistant);
        message.push_part(text("a", "partial"));
        assert!(message.close(MessageStatus::Failed {
            reason: "boom".into()
        }));
        assert!(!message.close(MessageStatus::Complete));
        assert!(message.is_failed());
        assert!(matches!(&message.parts[0], Part::Text(part) if part.closed));
    }

    #[test]
    fn role_accepts_user_alias() {
        let role: Role = serde_json::from_str("\"user\"").expect("role");
        assert_eq!(role, Role::Human);
        assert_eq!(serde_json::to_string(&Role::Human).expect("json"), "\"human\"");
    }
}
