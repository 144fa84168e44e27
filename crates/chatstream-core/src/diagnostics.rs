use std::fmt;

use chrono::{DateTime, Utc};

/// Category of a non-fatal reconciliation problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// A chunk referenced a missing id or arrived out of sequence. The chunk
    /// was dropped.
    ProtocolViolation,
    /// Tool call arguments never became valid JSON. Rendering falls back to
    /// the raw text.
    MalformedArguments,
    /// The server echoed an approval decision that differs from the local one.
    /// The server's value was kept.
    StateConflict,
    /// The inbound stream terminated abnormally.
    TransportFailure,
    /// A tool call's argument buffer hit the configured size limit.
    BufferOverflow,
}

impl DiagnosticKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ProtocolViolation => "protocol_violation",
            Self::MalformedArguments => "malformed_arguments",
            Self::StateConflict => "state_conflict",
            Self::TransportFailure => "transport_failure",
            Self::BufferOverflow => "buffer_overflow",
        }
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded reconciliation problem, kept in the model so renderers can show
/// a degraded view instead of hiding it.
#[derive(Clone, Debug, PartialEq, thiserror::Error, serde::Serialize, serde::Deserialize)]
#[error("{kind}: {detail}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_id: Option<String>,
    pub detail: String,
    pub at: DateTime<Utc>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            message_id: None,
            tool_call_id: None,
            approval_id: None,
            detail: detail.into(),
            at: Utc::now(),
        }
    }

    pub fn violation(detail: impl Into<String>) -> Self {
        Self::new(DiagnosticKind::ProtocolViolation, detail)
    }

    pub fn message(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn tool_call(mut self, tool_call_id: impl Into<String>) -> Self {
        self.tool_call_id = Some(tool_call_id.into());
        self
    }

    pub fn approval(mut self, approval_id: impl Into<String>) -> Self {
        self.approval_id = Some(approval_id.into());
        self
    }
}
