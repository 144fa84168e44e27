use std::collections::HashMap;
use std::sync::Arc;

use crate::message::Message;
use crate::part::{Approval, ToolCallPart, ToolResultPart};

/// Position of a part inside the conversation.
///
/// Stable for the lifetime of a conversation because messages and parts are
/// append-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PartRef {
    pub message: usize,
    pub part: usize,
}

impl PartRef {
    pub fn new(message: usize, part: usize) -> Self {
        Self { message, part }
    }
}

/// Index linking tool calls, tool results, and approvals by identifier.
///
/// Holds back-references only; parts are owned by their messages. Entries are
/// added as parts are created, so lookups never scan the message list.
#[derive(Clone, Debug, Default)]
pub struct Correlator {
    calls: HashMap<String, PartRef>,
    results: HashMap<String, PartRef>,
    approvals: HashMap<String, String>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool call. Returns the existing location if the id was
    /// already taken.
    pub(crate) fn register_call(&mut self, tool_call_id: &str, at: PartRef) -> Result<(), PartRef> {
        if let Some(existing) = self.calls.get(tool_call_id) {
            return Err(*existing);
        }
        self.calls.insert(tool_call_id.to_string(), at);
        Ok(())
    }

    pub(crate) fn register_result(&mut self, tool_call_id: &str, at: PartRef) {
        self.results.insert(tool_call_id.to_string(), at);
    }

    /// Registers an approval id. Returns false if it is already in use.
    pub(crate) fn register_approval(&mut self, approval_id: &str, tool_call_id: &str) -> bool {
        if self.approvals.contains_key(approval_id) {
            return false;
        }
        self.approvals
            .insert(approval_id.to_string(), tool_call_id.to_string());
        true
    }

    pub fn call(&self, tool_call_id: &str) -> Option<PartRef> {
        self.calls.get(tool_call_id).copied()
    }

    pub fn result(&self, tool_call_id: &str) -> Option<PartRef> {
        self.results.get(tool_call_id).copied()
    }

    /// Tool call id that an approval id was issued for.
    pub fn tool_call_for_approval(&self, approval_id: &str) -> Option<&str> {
        self.approvals.get(approval_id).map(String::as_str)
    }

    /// True when both the call and a result for it have been observed,
    /// regardless of which arrived first.
    pub fn is_linked(&self, tool_call_id: &str) -> bool {
        self.calls.contains_key(tool_call_id) && self.results.contains_key(tool_call_id)
    }

    pub fn tool_call_for<'a>(
        &self,
        messages: &'a [Arc<Message>],
        tool_call_id: &str,
    ) -> Option<&'a ToolCallPart> {
        let at = self.call(tool_call_id)?;
        messages
            .get(at.message)?
            .parts
            .get(at.part)?
            .as_tool_call()
    }

    pub fn result_for<'a>(
        &self,
        messages: &'a [Arc<Message>],
        tool_call_id: &str,
    ) -> Option<&'a ToolResultPart> {
        let at = self.result(tool_call_id)?;
        messages
            .get(at.message)?
            .parts
            .get(at.part)?
            .as_tool_result()
    }

    pub fn approval_for<'a>(
        &self,
        messages: &'a [Arc<Message>],
        tool_call_id: &str,
    ) -> Option<&'a Approval> {
        self.tool_call_for(messages, tool_call_id)?.approval.as_ref()
    }
}
