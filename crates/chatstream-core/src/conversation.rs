use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::accumulator::ParseOutcome;
use crate::chunk::Chunk;
use crate::config::EngineConfig;
use crate::correlator::{Correlator, PartRef};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::errors::EngineError;
use crate::message::{Message, MessageStatus, Role};
use crate::part::{
    Approval, Part, TextPart, ThinkingPart, ToolCallPart, ToolCallState, ToolResultPart,
    ToolResultState,
};
use crate::snapshot::Snapshot;
use crate::transport::OutboundSignal;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Change {
    Mutated,
    Unchanged,
}

type Reconciled = Result<Change, Diagnostic>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ContentKind {
    Text,
    Thinking,
}

impl ContentKind {
    fn label(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Thinking => "thinking",
        }
    }

    fn matches(self, part: &Part) -> bool {
        matches!(
            (self, part),
            (Self::Text, Part::Text(_)) | (Self::Thinking, Part::Thinking(_))
        )
    }

    fn new_part(self, id: String) -> Part {
        match self {
            Self::Text => Part::Text(TextPart {
                id,
                content: String::new(),
                closed: false,
            }),
            Self::Thinking => Part::Thinking(ThinkingPart {
                id,
                content: String::new(),
                closed: false,
            }),
        }
    }
}

fn content_closed(part: &Part) -> bool {
    match part {
        Part::Text(text) => text.closed,
        Part::Thinking(thinking) => thinking.closed,
        _ => true,
    }
}

/// Reconciliation state machine for one conversation.
///
/// Consumes chunks one at a time, in arrival order, and owns the message
/// model. Not synchronized; [`crate::Engine`] wraps it for shared use.
#[derive(Debug)]
pub struct Conversation {
    config: EngineConfig,
    messages: Vec<Arc<Message>>,
    message_index: HashMap<String, usize>,
    content_index: HashMap<(usize, String), usize>,
    open: Option<usize>,
    correlator: Arc<Correlator>,
    diagnostics: VecDeque<Diagnostic>,
    version: u64,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Conversation {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            messages: Vec::new(),
            message_index: HashMap::new(),
            content_index: HashMap::new(),
            open: None,
            correlator: Arc::new(Correlator::new()),
            diagnostics: VecDeque::new(),
            version: 0,
        }
    }

    /// Reconciles one chunk into the model.
    ///
    /// `Err` means the chunk was dropped; the diagnostic is also recorded in
    /// the model. Non-fatal diagnostics for applied chunks (malformed
    /// arguments, approval conflicts) are recorded without an `Err`.
    pub fn apply(&mut self, chunk: Chunk) -> Result<(), Diagnostic> {
        let kind = chunk.kind();
        match self.reconcile(chunk) {
            Ok(Change::Mutated) => {
                self.version += 1;
                Ok(())
            }
            Ok(Change::Unchanged) => Ok(()),
            Err(diagnostic) => Err(self.reject(kind, diagnostic)),
        }
    }

    /// Records `diagnostic` for a chunk that was dropped without touching the
    /// model, and hands it back.
    pub(crate) fn reject(&mut self, chunk: &'static str, diagnostic: Diagnostic) -> Diagnostic {
        warn!(
            chunk,
            diagnostic = %diagnostic.kind,
            message_id = diagnostic.message_id.as_deref(),
            tool_call_id = diagnostic.tool_call_id.as_deref(),
            detail = %diagnostic.detail,
            "chunk dropped"
        );
        self.record(diagnostic.clone());
        self.version += 1;
        diagnostic
    }

    fn reconcile(&mut self, chunk: Chunk) -> Reconciled {
        match chunk {
            Chunk::MessageStart { message_id, role } => {
                self.start_message(&message_id, role).map(|(_, change)| change)
            }
            Chunk::TextDelta {
                message_id,
                part_id,
                content,
            } => self.append_content(ContentKind::Text, &message_id, part_id, &content),
            Chunk::ThinkingDelta {
                message_id,
                part_id,
                content,
            } => self.append_content(ContentKind::Thinking, &message_id, part_id, &content),
            Chunk::TextEnd {
                message_id,
                part_id,
            } => self.end_content(ContentKind::Text, &message_id, part_id),
            Chunk::ThinkingEnd {
                message_id,
                part_id,
            } => self.end_content(ContentKind::Thinking, &message_id, part_id),
            Chunk::ToolCallStart { tool_call_id, name } => {
                self.start_tool_call(&tool_call_id, name)
            }
            Chunk::ToolCallArgsDelta {
                tool_call_id,
                content,
            } => self.append_arguments(&tool_call_id, &content),
            Chunk::ToolCallEnd {
                tool_call_id,
                input,
            } => self.end_tool_call(&tool_call_id, input),
            Chunk::ToolResultStart { tool_call_id } => self.start_result(&tool_call_id),
            Chunk::ToolResultDelta {
                tool_call_id,
                content,
            } => self.append_result(&tool_call_id, &content),
            Chunk::ToolResultEnd {
                tool_call_id,
                output,
                is_error,
            } => self.end_result(&tool_call_id, output, is_error),
            Chunk::ApprovalRequested {
                tool_call_id,
                approval_id,
            } => {
                let approval_id = approval_id.unwrap_or_else(|| tool_call_id.clone());
                self.request_approval(&tool_call_id, &approval_id)
            }
            Chunk::ApprovalResponded {
                approval_id,
                approved,
            } => self.reconcile_echo(&approval_id, approved),
            Chunk::MessageEnd { message_id } => self.end_message(&message_id),
            Chunk::StreamError { message_id, error } => {
                Ok(self.fail_stream(message_id.as_deref(), &error))
            }
        }
    }

    // -- messages --

    fn message_mut(&mut self, idx: usize) -> &mut Message {
        Arc::make_mut(&mut self.messages[idx])
    }

    /// Opens `message_id`, or returns it when it is already the open message.
    fn start_message(&mut self, message_id: &str, role: Role) -> Result<(usize, Change), Diagnostic> {
        if let Some(&idx) = self.message_index.get(message_id) {
            if self.open == Some(idx) {
                return Ok((idx, Change::Unchanged));
            }
            return Err(
                Diagnostic::violation(format!("message {message_id} is closed")).message(message_id),
            );
        }
        if let Some(prev) = self.open {
            let prev_id = self.messages[prev].id.clone();
            self.settle_unterminated_calls(prev);
            self.message_mut(prev).close(MessageStatus::Complete);
            self.open = None;
            self.record(
                Diagnostic::violation(format!(
                    "message {prev_id} had no MESSAGE_END before {message_id} started"
                ))
                .message(prev_id),
            );
        }
        let idx = self.messages.len();
        self.messages.push(Arc::new(Message::new(message_id, role)));
        self.message_index.insert(message_id.to_string(), idx);
        self.open = Some(idx);
        info!(message_id, %role, "message started");
        Ok((idx, Change::Mutated))
    }

    fn end_message(&mut self, message_id: &str) -> Reconciled {
        let Some(&idx) = self.message_index.get(message_id) else {
            return Err(
                Diagnostic::violation(format!("MESSAGE_END for unknown message {message_id}"))
                    .message(message_id),
            );
        };
        if self.open != Some(idx) {
            return Ok(Change::Unchanged);
        }
        self.settle_unterminated_calls(idx);
        self.message_mut(idx).close(MessageStatus::Complete);
        self.open = None;
        info!(message_id, "message complete");
        Ok(Change::Mutated)
    }

    fn fail_stream(&mut self, message_id: Option<&str>, error: &str) -> Change {
        let mut diagnostic = Diagnostic::new(DiagnosticKind::TransportFailure, error);
        if let Some(idx) = self.open {
            diagnostic = diagnostic.message(self.messages[idx].id.clone());
        } else if let Some(id) = message_id {
            diagnostic = diagnostic.message(id);
        }
        warn!(message_id = diagnostic.message_id.as_deref(), error, "stream error");
        self.record(diagnostic);
        self.close_open_failed(error);
        Change::Mutated
    }

    fn close_open_failed(&mut self, reason: &str) -> bool {
        let Some(idx) = self.open else {
            return false;
        };
        self.settle_unterminated_calls(idx);
        self.message_mut(idx).close(MessageStatus::Failed {
            reason: reason.to_string(),
        });
        self.open = None;
        true
    }

    /// Resolves tool calls in message `idx` whose input never saw
    /// `TOOL_CALL_END`, as if it had arrived without an authoritative value.
    /// Runs before the message closes.
    fn settle_unterminated_calls(&mut self, idx: usize) {
        let unterminated = self.messages[idx]
            .parts
            .iter()
            .any(|part| matches!(part, Part::ToolCall(call) if !call.input_closed));
        if !unterminated {
            return;
        }
        let message_id = self.messages[idx].id.clone();
        let mut settled = Vec::new();
        for part in &mut self.message_mut(idx).parts {
            if let Part::ToolCall(call) = part
                && !call.input_closed
            {
                call.input_closed = true;
                settled.push((call.id.clone(), close_input(call, None)));
            }
        }
        for (tool_call_id, malformed_len) in settled {
            warn!(tool_call_id = %tool_call_id, message_id = %message_id, "tool call input never ended");
            self.record(
                Diagnostic::violation(format!(
                    "tool call {tool_call_id} had no TOOL_CALL_END before message {message_id} closed"
                ))
                .message(message_id.clone())
                .tool_call(tool_call_id.clone()),
            );
            if let Some(len) = malformed_len {
                self.record(malformed_arguments(&tool_call_id, len));
            }
        }
    }

    /// Closes the open message, if any, in the failed state. Used when the
    /// surrounding session goes away mid-stream.
    pub fn finalize(&mut self, reason: &str) -> bool {
        let closed = self.close_open_failed(reason);
        if closed {
            self.version += 1;
            info!(reason, "open message finalized");
        }
        closed
    }

    // -- text and thinking --

    fn append_content(
        &mut self,
        kind: ContentKind,
        message_id: &str,
        part_id: Option<String>,
        content: &str,
    ) -> Reconciled {
        let (msg_idx, _) = self.start_message(message_id, self.config.implicit_message_role)?;
        let part_idx = match part_id {
            Some(part_id) => match self.content_index.get(&(msg_idx, part_id.clone())) {
                Some(&idx) => idx,
                None => self.push_content_part(msg_idx, kind, part_id),
            },
            None => match self.trailing_open_content(msg_idx, kind) {
                Some(idx) => idx,
                None => {
                    let part_id = format!("{message_id}:{}", self.messages[msg_idx].parts.len());
                    self.push_content_part(msg_idx, kind, part_id)
                }
            },
        };

        let part = &mut self.message_mut(msg_idx).parts[part_idx];
        match part {
            Part::Text(text) if kind == ContentKind::Text && !text.closed => {
                text.content.push_str(content)
            }
            Part::Thinking(thinking) if kind == ContentKind::Thinking && !thinking.closed => {
                thinking.content.push_str(content)
            }
            other => {
                let detail = if kind.matches(other) {
                    format!("{} part {} is closed", kind.label(), other.id())
                } else {
                    format!(
                        "part {} is a {} part, not {}",
                        other.id(),
                        other.kind(),
                        kind.label()
                    )
                };
                return Err(Diagnostic::violation(detail).message(message_id));
            }
        }
        debug!(message_id, part = part_idx, kind = kind.label(), len = content.len(), "content delta");
        Ok(Change::Mutated)
    }

    fn trailing_open_content(&self, msg_idx: usize, kind: ContentKind) -> Option<usize> {
        let parts = &self.messages[msg_idx].parts;
        let last = parts.last()?;
        if kind.matches(last) && !content_closed(last) {
            Some(parts.len() - 1)
        } else {
            None
        }
    }

    fn push_content_part(&mut self, msg_idx: usize, kind: ContentKind, part_id: String) -> usize {
        let idx = self
            .message_mut(msg_idx)
            .push_part(kind.new_part(part_id.clone()));
        debug!(part_id = %part_id, kind = kind.label(), "content part started");
        self.content_index.insert((msg_idx, part_id), idx);
        idx
    }

    fn end_content(&mut self, kind: ContentKind, message_id: &str, part_id: Option<String>) -> Reconciled {
        let Some(&msg_idx) = self.message_index.get(message_id) else {
            return Err(Diagnostic::violation(format!(
                "{} end for unknown message {message_id}",
                kind.label()
            ))
            .message(message_id));
        };
        if self.open != Some(msg_idx) {
            // closing the message already froze its parts
            return Ok(Change::Unchanged);
        }
        let part_idx = match &part_id {
            Some(part_id) => self.content_index.get(&(msg_idx, part_id.clone())).copied(),
            None => self.messages[msg_idx]
                .parts
                .iter()
                .rposition(|part| kind.matches(part) && !content_closed(part)),
        };
        let Some(part_idx) = part_idx else {
            return Err(Diagnostic::violation(format!(
                "no open {} part to end in message {message_id}",
                kind.label()
            ))
            .message(message_id));
        };
        let part = &mut self.message_mut(msg_idx).parts[part_idx];
        if !kind.matches(part) {
            return Err(Diagnostic::violation(format!(
                "part {} is a {} part, not {}",
                part.id(),
                part.kind(),
                kind.label()
            ))
            .message(message_id));
        }
        if content_closed(part) {
            return Ok(Change::Unchanged);
        }
        part.close();
        Ok(Change::Mutated)
    }

    // -- tool calls --

    fn tool_call_mut(&mut self, tool_call_id: &str, require_open: bool) -> Result<&mut ToolCallPart, Diagnostic> {
        let at = self.correlator.call(tool_call_id).ok_or_else(|| {
            Diagnostic::violation(format!("unknown tool call {tool_call_id}")).tool_call(tool_call_id)
        })?;
        if require_open && self.open != Some(at.message) {
            return Err(Diagnostic::violation(format!(
                "tool call {tool_call_id} belongs to a closed message"
            ))
            .tool_call(tool_call_id));
        }
        self.message_mut(at.message)
            .parts
            .get_mut(at.part)
            .and_then(Part::as_tool_call_mut)
            .ok_or_else(|| {
                Diagnostic::violation(format!("index for tool call {tool_call_id} is stale"))
                    .tool_call(tool_call_id)
            })
    }

    fn start_tool_call(&mut self, tool_call_id: &str, name: String) -> Reconciled {
        let Some(msg_idx) = self.open else {
            return Err(Diagnostic::violation(format!(
                "tool call {tool_call_id} started with no open message"
            ))
            .tool_call(tool_call_id));
        };
        // Registered before any arguments so early approvals/results resolve.
        let at = PartRef::new(msg_idx, self.messages[msg_idx].parts.len());
        if Arc::make_mut(&mut self.correlator)
            .register_call(tool_call_id, at)
            .is_err()
        {
            return Err(
                Diagnostic::violation(format!("duplicate tool call id {tool_call_id}"))
                    .tool_call(tool_call_id),
            );
        }
        self.message_mut(msg_idx)
            .push_part(Part::ToolCall(ToolCallPart::new(tool_call_id, name.clone())));
        if self.correlator.result(tool_call_id).is_some() {
            debug!(tool_call_id, "tool call linked to earlier result");
        }
        info!(tool_call_id, tool = %name, "tool call started");
        Ok(Change::Mutated)
    }

    fn append_arguments(&mut self, tool_call_id: &str, fragment: &str) -> Reconciled {
        let limit = self.config.max_argument_bytes;
        let call = self.tool_call_mut(tool_call_id, true)?;
        if call.input_closed {
            return Err(Diagnostic::violation(format!(
                "arguments for tool call {tool_call_id} already ended"
            ))
            .tool_call(tool_call_id));
        }
        if call.arguments.len() + fragment.len() > limit {
            return Err(Diagnostic::new(
                DiagnosticKind::BufferOverflow,
                format!("arguments for tool call {tool_call_id} exceed {limit} bytes"),
            )
            .tool_call(tool_call_id));
        }
        call.arguments.feed(fragment);
        debug!(tool_call_id, len = fragment.len(), "tool call arguments delta");
        Ok(Change::Mutated)
    }

    fn end_tool_call(&mut self, tool_call_id: &str, input: Option<Value>) -> Reconciled {
        let call = self.tool_call_mut(tool_call_id, true)?;
        if call.input_closed {
            return Err(Diagnostic::violation(format!(
                "tool call {tool_call_id} input already ended"
            ))
            .tool_call(tool_call_id));
        }
        call.input_closed = true;
        match close_input(call, input) {
            Some(len) => self.record(malformed_arguments(tool_call_id, len)),
            None => info!(tool_call_id, "tool call input complete"),
        }
        Ok(Change::Mutated)
    }

    // -- tool results --

    /// Locates the result for `tool_call_id`, creating a placeholder in the
    /// open message when none exists yet. The call need not have been seen.
    fn ensure_result(&mut self, tool_call_id: &str) -> Result<(PartRef, Change), Diagnostic> {
        if let Some(at) = self.correlator.result(tool_call_id) {
            if self.open != Some(at.message) {
                return Err(Diagnostic::violation(format!(
                    "result for tool call {tool_call_id} belongs to a closed message"
                ))
                .tool_call(tool_call_id));
            }
            return Ok((at, Change::Unchanged));
        }
        let Some(msg_idx) = self.open else {
            return Err(Diagnostic::violation(format!(
                "result for tool call {tool_call_id} arrived with no open message"
            ))
            .tool_call(tool_call_id));
        };
        let at = PartRef::new(msg_idx, self.messages[msg_idx].parts.len());
        self.message_mut(msg_idx)
            .push_part(Part::ToolResult(ToolResultPart::new(tool_call_id)));
        Arc::make_mut(&mut self.correlator).register_result(tool_call_id, at);
        if self.correlator.call(tool_call_id).is_none() {
            debug!(tool_call_id, "placeholder result created before its tool call");
        }
        Ok((at, Change::Mutated))
    }

    fn result_mut(&mut self, at: PartRef, tool_call_id: &str) -> Result<&mut ToolResultPart, Diagnostic> {
        self.message_mut(at.message)
            .parts
            .get_mut(at.part)
            .and_then(Part::as_tool_result_mut)
            .ok_or_else(|| {
                Diagnostic::violation(format!("index for result {tool_call_id} is stale"))
                    .tool_call(tool_call_id)
            })
    }

    fn start_result(&mut self, tool_call_id: &str) -> Reconciled {
        let (at, change) = self.ensure_result(tool_call_id)?;
        if change == Change::Unchanged && self.result_mut(at, tool_call_id)?.is_complete() {
            return Err(Diagnostic::violation(format!(
                "result for tool call {tool_call_id} already complete"
            ))
            .tool_call(tool_call_id));
        }
        Ok(change)
    }

    fn append_result(&mut self, tool_call_id: &str, fragment: &str) -> Reconciled {
        let (at, _) = self.ensure_result(tool_call_id)?;
        let result = self.result_mut(at, tool_call_id)?;
        if result.is_complete() {
            return Err(Diagnostic::violation(format!(
                "result for tool call {tool_call_id} already complete"
            ))
            .tool_call(tool_call_id));
        }
        result.content.push_str(fragment);
        Ok(Change::Mutated)
    }

    fn end_result(&mut self, tool_call_id: &str, output: Option<Value>, is_error: bool) -> Reconciled {
        let (at, _) = self.ensure_result(tool_call_id)?;
        let result = self.result_mut(at, tool_call_id)?;
        if result.is_complete() {
            return Err(Diagnostic::violation(format!(
                "result for tool call {tool_call_id} already complete"
            ))
            .tool_call(tool_call_id));
        }
        if result.content.is_empty()
            && let Some(value) = &output
        {
            result.content = render_output(value);
        }
        result.output = output;
        result.is_error = is_error;
        result.state = ToolResultState::Complete;
        info!(tool_call_id, is_error, "tool result complete");
        Ok(Change::Mutated)
    }

    // -- approvals --

    fn request_approval(&mut self, tool_call_id: &str, approval_id: &str) -> Reconciled {
        if self.correlator.tool_call_for_approval(approval_id).is_some() {
            return Err(
                Diagnostic::violation(format!("approval id {approval_id} already in use"))
                    .tool_call(tool_call_id)
                    .approval(approval_id),
            );
        }
        let call = self
            .tool_call_mut(tool_call_id, false)
            .map_err(|diagnostic| diagnostic.approval(approval_id))?;
        if call.state != ToolCallState::InputComplete {
            let state = call.state;
            return Err(Diagnostic::violation(format!(
                "approval requested for tool call {tool_call_id} in state {state:?}"
            ))
            .tool_call(tool_call_id)
            .approval(approval_id));
        }
        call.advance(ToolCallState::ApprovalRequested);
        call.approval = Some(Approval {
            id: approval_id.to_string(),
            decision: None,
        });
        Arc::make_mut(&mut self.correlator).register_approval(approval_id, tool_call_id);
        info!(tool_call_id, approval_id, "approval requested");
        Ok(Change::Mutated)
    }

    /// Records a human decision for a pending approval and returns the
    /// resume signal to send outbound. Leaves the model untouched on error.
    pub fn respond_approval(
        &mut self,
        approval_id: &str,
        decision: bool,
    ) -> Result<OutboundSignal, EngineError> {
        let tool_call_id = self
            .correlator
            .tool_call_for_approval(approval_id)
            .map(str::to_owned)
            .ok_or_else(|| EngineError::unknown_approval(approval_id))?;
        let pending = self
            .correlator
            .tool_call_for(&self.messages, &tool_call_id)
            .is_some_and(ToolCallPart::awaiting_decision);
        if !pending {
            return Err(EngineError::unknown_approval(approval_id));
        }
        let call = self
            .tool_call_mut(&tool_call_id, false)
            .map_err(|_| EngineError::unknown_approval(approval_id))?;
        call.advance(ToolCallState::ApprovalResponded);
        if let Some(approval) = call.approval.as_mut() {
            approval.decision = Some(decision);
        }
        self.version += 1;
        info!(tool_call_id = %tool_call_id, approval_id, decision, "approval decided locally");
        Ok(OutboundSignal::ResumeApproval {
            approval_id: approval_id.to_string(),
            tool_call_id,
            decision,
        })
    }

    /// Applies the server's recorded decision. The server wins on conflict.
    fn reconcile_echo(&mut self, approval_id: &str, approved: bool) -> Reconciled {
        let Some(tool_call_id) = self
            .correlator
            .tool_call_for_approval(approval_id)
            .map(str::to_owned)
        else {
            return Err(
                Diagnostic::violation(format!("echo for unknown approval {approval_id}"))
                    .approval(approval_id),
            );
        };
        let call = self.tool_call_mut(&tool_call_id, false)?;
        let local = call.approval.as_ref().and_then(|approval| approval.decision);
        if local == Some(approved) {
            return Ok(Change::Unchanged);
        }
        if let Some(approval) = call.approval.as_mut() {
            approval.decision = Some(approved);
        }
        call.advance(ToolCallState::ApprovalResponded);
        if let Some(local) = local {
            warn!(tool_call_id = %tool_call_id, approval_id, local, server = approved, "approval decision conflict");
            self.record(
                Diagnostic::new(
                    DiagnosticKind::StateConflict,
                    format!("local decision {local} overridden by server decision {approved}"),
                )
                .tool_call(tool_call_id)
                .approval(approval_id),
            );
        }
        Ok(Change::Mutated)
    }

    // -- outbound user messages --

    /// Appends a closed human message and returns its generated id.
    pub fn submit_user_message(&mut self, text: &str) -> Result<String, EngineError> {
        if text.trim().is_empty() {
            return Err(EngineError::Validation(
                "user message text must not be empty".into(),
            ));
        }
        if let Some(idx) = self.open {
            return Err(EngineError::StreamInFlight {
                message_id: self.messages[idx].id.clone(),
            });
        }
        let message_id = uuid::Uuid::new_v4().to_string();
        let mut message = Message::new(message_id.clone(), Role::Human);
        message.push_part(Part::Text(TextPart {
            id: format!("{message_id}:0"),
            content: text.to_string(),
            closed: true,
        }));
        message.status = MessageStatus::Complete;
        self.message_index
            .insert(message_id.clone(), self.messages.len());
        self.messages.push(Arc::new(message));
        self.version += 1;
        info!(message_id = %message_id, "user message appended");
        Ok(message_id)
    }

    // -- reads --

    pub fn is_streaming(&self) -> bool {
        self.open.is_some()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn messages(&self) -> &[Arc<Message>] {
        &self.messages
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        let idx = *self.message_index.get(message_id)?;
        self.messages.get(idx).map(Arc::as_ref)
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

    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            messages: self.messages.clone(),
            diagnostics: self.diagnostics.iter().cloned().collect(),
            streaming: self.is_streaming(),
            version: self.version,
            correlator: self.correlator.clone(),
        }
    }

    fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push_back(diagnostic);
        while self.diagnostics.len() > self.config.max_diagnostics {
            self.diagnostics.pop_front();
        }
    }
}

/// Ends the input phase of `call`. Returns the argument length when neither
/// an authoritative value nor the fragments yield JSON.
fn close_input(call: &mut ToolCallPart, input: Option<Value>) -> Option<usize> {
    match input {
        Some(value) => {
            call.authoritative_input = Some(value);
            call.advance(ToolCallState::InputComplete);
            None
        }
        None => match call.arguments.try_parse() {
            ParseOutcome::Value(_) => {
                call.advance(ToolCallState::InputComplete);
                None
            }
            ParseOutcome::Incomplete => {
                call.malformed = true;
                Some(call.arguments.len())
            }
        },
    }
}

fn malformed_arguments(tool_call_id: &str, len: usize) -> Diagnostic {
    warn!(tool_call_id, len, "tool call arguments are not valid JSON");
    Diagnostic::new(
        DiagnosticKind::MalformedArguments,
        format!("tool call {tool_call_id} ended with {len} bytes of unparseable arguments"),
    )
    .tool_call(tool_call_id)
}

fn render_output(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
