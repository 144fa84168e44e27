use std::sync::Arc;

use crate::correlator::Correlator;
use crate::diagnostics::Diagnostic;
use crate::message::Message;
use crate::part::{Approval, Part, ToolCallPart, ToolResultPart};

/// Immutable view of a conversation at one point in time.
///
/// Messages are shared copy-on-write with the engine, so a snapshot taken
/// mid-stream never observes later mutation.
#[derive(Clone, Debug, Default, serde::Serialize)]
pub struct Snapshot {
    pub messages: Vec<Arc<Message>>,
    pub diagnostics: Vec<Diagnostic>,
    /// True while an assistant message is open.
    pub streaming: bool,
    /// Increases every time the model changes.
    pub version: u64,
    #[serde(skip)]
    pub(crate) correlator: Arc<Correlator>,
}

impl Snapshot {
    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages
            .iter()
            .find(|message| message.id == message_id)
            .map(Arc::as_ref)
    }

    pub fn tool_call(&self, tool_call_id: &str) -> Option<&ToolCallPart> {
        self.correlator.tool_call_for(&self.messages, tool_call_id)
    }

    pub fn result_for(&self, tool_call_id: &str) -> Option<&ToolResultPart> {
        self.correlator.result_for(&self.messages, tool_call_id)
    }

    pub fn approval_for(&self, tool_call_id: &str) -> Option<&Approval> {
        self.correlator.approval_for(&self.messages, tool_call_id)
    }

    /// Tool calls waiting on a human decision, in conversation order.
    pub fn pending_approvals(&self) -> Vec<&ToolCallPart> {
        self.messages
            .iter()
            .flat_map(|message| message.parts.iter())
            .filter_map(Part::as_tool_call)
            .filter(|call| call.awaiting_decision())
            .collect()
    }
}
