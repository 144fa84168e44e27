use serde_json::Value;

use crate::message::Role;

/// One inbound stream event describing an incremental change to the
/// conversation.
///
/// Wire form is a JSON object tagged by `type` (for example
/// `{"type":"TEXT_DELTA","messageId":"m1","content":"Hi"}`).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum Chunk {
    MessageStart {
        message_id: String,
        #[serde(default)]
        role: Role,
    },
    TextDelta {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        part_id: Option<String>,
        content: String,
    },
    TextEnd {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        part_id: Option<String>,
    },
    ThinkingDelta {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        part_id: Option<String>,
        content: String,
    },
    ThinkingEnd {
        message_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        part_id: Option<String>,
    },
    ToolCallStart {
        tool_call_id: String,
        name: String,
    },
    ToolCallArgsDelta {
        tool_call_id: String,
        content: String,
    },
    /// Ends the input phase. `input`, when present, is the authoritative
    /// complete argument value.
    ToolCallEnd {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input: Option<Value>,
    },
    ToolResultStart {
        tool_call_id: String,
    },
    ToolResultDelta {
        tool_call_id: String,
        content: String,
    },
    ToolResultEnd {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default)]
        is_error: bool,
    },
    /// Defaults the approval id to the tool call id when the backend does
    /// not issue a separate one.
    ApprovalRequested {
        tool_call_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        approval_id: Option<String>,
    },
    /// Server echo of a recorded decision.
    ApprovalResponded {
        approval_id: String,
        approved: bool,
    },
    MessageEnd {
        message_id: String,
    },
    StreamError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
        error: String,
    },
}

impl Chunk {
    /// Decodes one chunk from its JSON wire form.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Wire name of the chunk kind, for logs and diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MessageStart { .. } => "MESSAGE_START",
            Self::TextDelta { .. } => "TEXT_DELTA",
            Self::TextEnd { .. } => "TEXT_END",
            Self::ThinkingDelta { .. } => "THINKING_DELTA",
            Self::ThinkingEnd { .. } => "THINKING_END",
            Self::ToolCallStart { .. } => "TOOL_CALL_START",
            Self::ToolCallArgsDelta { .. } => "TOOL_CALL_ARGS_DELTA",
            Self::ToolCallEnd { .. } => "TOOL_CALL_END",
            Self::ToolResultStart { .. } => "TOOL_RESULT_START",
            Self::ToolResultDelta { .. } => "TOOL_RESULT_DELTA",
            Self::ToolResultEnd { .. } => "TOOL_RESULT_END",
            Self::ApprovalRequested { .. } => "APPROVAL_REQUESTED",
            Self::ApprovalResponded { .. } => "APPROVAL_RESPONDED",
            Self::MessageEnd { .. } => "MESSAGE_END",
            Self::StreamError { .. } => "STREAM_ERROR",
        }
    }

    // Shorthand constructors, mostly for tests and replays.

    pub fn message_start(message_id: impl Into<String>, role: Role) -> Self {
        Self::MessageStart {
            message_id: message_id.into(),
            role,
        }
    }

    pub fn text(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::TextDelta {
            message_id: message_id.into(),
            part_id: None,
            content: content.into(),
        }
    }

    pub fn thinking(message_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ThinkingDelta {
            message_id: message_id.into(),
            part_id: None,
            content: content.into(),
        }
    }

    pub fn tool_call_start(tool_call_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ToolCallStart {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
        }
    }

    pub fn tool_call_args(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolCallArgsDelta {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn tool_call_end(tool_call_id: impl Into<String>, input: Option<Value>) -> Self {
        Self::ToolCallEnd {
            tool_call_id: tool_call_id.into(),
            input,
        }
    }

    pub fn message_end(message_id: impl Into<String>) -> Self {
        Self::MessageEnd {
            message_id: message_id.into(),
        }
    }

    pub fn stream_error(error: impl Into<String>) -> Self {
        Self::StreamError {
            message_id: None,
            error: error.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_wire_fields() {
        let chunk =
            Chunk::from_json(r#"{"type":"TEXT_DELTA","messageId":"m1","content":"Hello "}"#)
                .expect("decode");
        assert_eq!(chunk, Chunk::text("m1", "Hello "));
        assert_eq!(chunk.kind(), "TEXT_DELTA");
    }

    #[test]
    fn tool_call_end_carries_optional_authoritative_input() {
        let bare = Chunk::from_json(r#"{"type":"TOOL_CALL_END","toolCallId":"t1"}"#)
            .expect("decode bare");
        assert_eq!(bare, Chunk::tool_call_end("t1", None));

        let full = Chunk::from_json(
            r#"{"type":"TOOL_CALL_END","toolCallId":"t1","input":{"location":"Paris"}}"#,
        )
        .expect("decode full");
        assert_eq!(
            full,
            Chunk::tool_call_end("t1", Some(json!({"location": "Paris"})))
        );
    }

    #[test]
    fn message_start_role_defaults_to_assistant() {
        let chunk = Chunk::from_json(r#"{"type":"MESSAGE_START","messageId":"m1"}"#)
            .expect("decode");
        assert_eq!(chunk, Chunk::message_start("m1", Role::Assistant));
    }

    #[test]
    fn unknown_type_is_a_decode_error() {
        assert!(Chunk::from_json(r#"{"type":"NOPE"}"#).is_err());
    }
}
