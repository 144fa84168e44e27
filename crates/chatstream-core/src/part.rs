use serde_json::Value;

use crate::accumulator::{ParseOutcome, PartialJson};

/// Lifecycle of a tool call part. States only ever move forward.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ToolCallState {
    Streaming,
    InputComplete,
    ApprovalRequested,
    ApprovalResponded,
}

/// Lifecycle of a tool result part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultState {
    Streaming,
    Complete,
}

/// Human approval attached to a tool call.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Approval {
    pub id: String,
    /// `None` until a decision is recorded locally or echoed by the server.
    pub decision: Option<bool>,
}

/// Assistant-visible text.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TextPart {
    pub id: String,
    pub content: String,
    pub closed: bool,
}

/// Intermediate reasoning, rendered apart from the answer text.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ThinkingPart {
    pub id: String,
    pub content: String,
    pub closed: bool,
}

/// A tool invocation requested by the assistant.
///
/// Arguments arrive from two independent sources: streamed fragments fed to
/// `arguments`, and an optional one-shot value on the terminal chunk stored
/// in `authoritative_input`. The latter always wins when present.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolCallPart {
    pub id: String,
    pub name: String,
    pub arguments: PartialJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authoritative_input: Option<Value>,
    pub state: ToolCallState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval: Option<Approval>,
    /// Set when the input phase ended without parseable arguments.
    #[serde(default)]
    pub malformed: bool,
    /// Set once the terminal input chunk has been processed.
    #[serde(default)]
    pub input_closed: bool,
}

impl ToolCallPart {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: PartialJson::new(),
            authoritative_input: None,
            state: ToolCallState::Streaming,
            approval: None,
            malformed: false,
            input_closed: false,
        }
    }

    /// Raw argument text accumulated from fragments.
    pub fn raw_arguments(&self) -> &str {
        self.arguments.as_str()
    }

    /// The input a consumer should act on: the authoritative value when one
    /// was observed, otherwise a parse of the accumulated fragments.
    pub fn resolved_input(&self) -> ParseOutcome {
        match &self.authoritative_input {
            Some(value) => ParseOutcome::Value(value.clone()),
            None => self.arguments.try_parse(),
        }
    }

    /// Best-effort partial input for display while arguments are streaming.
    pub fn preview_input(&self) -> Option<Value> {
        match &self.authoritative_input {
            Some(value) => Some(value.clone()),
            None => self.arguments.repair(),
        }
    }

    /// Moves the state forward. Returns false (leaving the state untouched)
    /// when `next` would not be a forward move.
    pub(crate) fn advance(&mut self, next: ToolCallState) -> bool {
        if next > self.state {
            self.state = next;
            true
        } else {
            false
        }
    }

    pub fn awaiting_decision(&self) -> bool {
        self.state == ToolCallState::ApprovalRequested
    }
}

/// Output of a tool call, correlated by `tool_call_id`.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ToolResultPart {
    /// `{tool_call_id}:result`, distinct from the call part's id.
    pub id: String,
    pub tool_call_id: String,
    pub state: ToolResultState,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default)]
    pub is_error: bool,
}

impl ToolResultPart {
    pub fn new(tool_call_id: impl Into<String>) -> Self {
        let tool_call_id = tool_call_id.into();
        Self {
            id: format!("{tool_call_id}:result"),
            tool_call_id,
            state: ToolResultState::Streaming,
            content: String::new(),
            output: None,
            is_error: false,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.state == ToolResultState::Complete
    }
}

/// A displayable fragment of a message.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    Text(TextPart),
    Thinking(ThinkingPart),
    ToolCall(ToolCallPart),
    ToolResult(ToolResultPart),
}

impl Part {
    /// Stable identity of the part within the conversation.
    pub fn id(&self) -> &str {
        match self {
            Self::Text(part) => &part.id,
            Self::Thinking(part) => &part.id,
            Self::ToolCall(part) => &part.id,
            Self::ToolResult(part) => &part.id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Thinking(_) => "thinking",
            Self::ToolCall(_) => "tool_call",
            Self::ToolResult(_) => "tool_result",
        }
    }

    pub fn as_tool_call(&self) -> Option<&ToolCallPart> {
        match self {
            Self::ToolCall(part) => Some(part),
            _ => None,
        }
    }

    pub fn as_tool_result(&self) -> Option<&ToolResultPart> {
        match self {
            Self::ToolResult(part) => Some(part),
            _ => None,
        }
    }

    pub(crate) fn as_tool_call_mut(&mut self) -> Option<&mut ToolCallPart> {
        match self {
            Self::ToolCall(part) => Some(part),
            _ => None,
        }
    }

    pub(crate) fn as_tool_result_mut(&mut self) -> Option<&mut ToolResultPart> {
        match self {
            Self::ToolResult(part) => Some(part),
            _ => None,
        }
    }

    /// Freezes streamed text. Tool parts keep their state; the owning
    /// message's status marks them immutable.
    pub(crate) fn close(&mut self) {
        match self {
            Self::Text(part) => part.closed = true,
            Self::Thinking(part) => part.closed = true,
            Self::ToolCall(part) => part.input_closed = true,
            Self::ToolResult(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn tool_call_state_never_regresses() {
        let mut call = ToolCallPart::new("t1", "get_weather");
        assert!(call.advance(ToolCallState::ApprovalResponded));
        assert!(!call.advance(ToolCallState::Streaming));
        assert!(!call.advance(ToolCallState::InputComplete));
        assert_eq!(call.state, ToolCallState::ApprovalResponded);
    }

    #[test]
    fn authoritative_input_wins_over_fragments() {
        let mut call = ToolCallPart::new("t1", "search");
        call.arguments.feed("{\"q\":\"from fragments\"}");
        call.authoritative_input = Some(json!({"q": "authoritative"}));
        assert_eq!(
            call.resolved_input(),
            ParseOutcome::Value(json!({"q": "authoritative"}))
        );
        assert_eq!(call.preview_input(), Some(json!({"q": "authoritative"})));
    }

    #[test]
    fn result_part_id_differs_from_its_call() {
        let call = Part::ToolCall(ToolCallPart::new("t1", "search"));
        let result = Part::ToolResult(ToolResultPart::new("t1"));
        assert_eq!(call.id(), "t1");
        assert_eq!(result.id(), "t1:result");
        assert_ne!(call.id(), result.id());
    }

    #[test]
    fn part_serializes_with_type_tag() {
        let part = Part::Text(TextPart {
            id: "m1:0".into(),
            content: "hi".into(),
            closed: false,
        });
        let json = serde_json::to_value(&part).expect("serialize");
        assert_eq!(json["type"], "text");
        assert_eq!(part.id(), "m1:0");
    }
}
