/// Errors returned to callers of engine write operations.
///
/// Reconciliation of inbound chunks never returns these; recoverable problems
/// there are recorded as [`crate::Diagnostic`]s instead.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Invalid caller input (for example blank user text).
    #[error("validation error: {0}")]
    Validation(String),
    /// No tool call is waiting for a decision under this approval id.
    #[error("unknown approval: {approval_id}")]
    UnknownApproval { approval_id: String },
    /// A user message cannot be appended while an assistant message is open.
    #[error("message {message_id} is still streaming")]
    StreamInFlight { message_id: String },
    /// The engine was shut down and no longer accepts writes.
    #[error("engine is shut down")]
    Closed,
}

impl EngineError {
    pub(crate) fn unknown_approval(approval_id: impl Into<String>) -> Self {
        Self::UnknownApproval {
            approval_id: approval_id.into(),
        }
    }
}

/// Errors produced by a transport collaborator.
///
/// Any `Err` on the inbound chunk stream is treated as abnormal stream
/// termination and finalizes the open message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Network or stream I/O failed.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// A frame could not be decoded into a chunk.
    #[error("decode error: {message}")]
    Decode { message: String },
}

impl TransportError {
    /// Creates a transport-level error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> &str {
        match self {
            Self::Transport { message } | Self::Decode { message } => message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_error_message_is_unwrapped() {
        let err = TransportError::decode("bad frame");
        assert_eq!(err.message(), "bad frame");
        assert_eq!(err.to_string(), "decode error: bad frame");
    }

    #[test]
    fn unknown_approval_names_the_id() {
        let err = EngineError::unknown_approval("ap-1");
        assert_eq!(err.to_string(), "unknown approval: ap-1");
    }
}
