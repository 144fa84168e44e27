use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::chunk::Chunk;
use crate::config::EngineConfig;
use crate::conversation::Conversation;
use crate::diagnostics::Diagnostic;
use crate::errors::EngineError;
use crate::snapshot::Snapshot;
use crate::transport::OutboundSignal;

struct EngineInner {
    state: Mutex<Conversation>,
    snapshots: watch::Sender<Arc<Snapshot>>,
    outbound: mpsc::Sender<OutboundSignal>,
    closed: AtomicBool,
}

/// Shared handle to one conversation.
///
/// All writes are serialized through a single lock, so chunk application and
/// local decisions never interleave. Readers get immutable snapshots and never
/// block writers for longer than an `Arc` clone.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Creates an engine and the receiving end of its outbound signal channel.
    pub fn new(config: EngineConfig) -> Result<(Self, mpsc::Receiver<OutboundSignal>), EngineError> {
        config.validate()?;
        let (outbound, rx) = mpsc::channel(config.outbound_buffer_capacity);
        let (snapshots, _) = watch::channel(Arc::new(Snapshot::default()));
        let engine = Self {
            inner: Arc::new(EngineInner {
                state: Mutex::new(Conversation::new(config)),
                snapshots,
                outbound,
                closed: AtomicBool::new(false),
            }),
        };
        Ok((engine, rx))
    }

    /// Reconciles one inbound chunk. See [`Conversation::apply`].
    ///
    /// Chunks arriving after [`Engine::shutdown`] are dropped with a
    /// protocol violation.
    pub fn apply(&self, chunk: Chunk) -> Result<(), Diagnostic> {
        let mut state = self.inner.state.lock();
        // Checked under the lock so no chunk lands after shutdown finalized.
        let result = if self.is_closed() {
            let kind = chunk.kind();
            Err(state.reject(
                kind,
                Diagnostic::violation(format!("{kind} received after engine shutdown")),
            ))
        } else {
            state.apply(chunk)
        };
        self.publish(&state);
        result
    }

    /// Records a local approval decision and queues the resume signal.
    pub fn respond_approval(&self, approval_id: &str, approved: bool) -> Result<(), EngineError> {
        let mut state = self.inner.state.lock();
        self.ensure_open()?;
        let signal = state.respond_approval(approval_id, approved)?;
        self.publish(&state);
        self.send(signal);
        Ok(())
    }

    /// Appends a human message and queues it for delivery. Returns the new
    /// message id.
    pub fn submit_user_message(&self, text: &str) -> Result<String, EngineError> {
        let mut state = self.inner.state.lock();
        self.ensure_open()?;
        let message_id = state.submit_user_message(text)?;
        self.publish(&state);
        self.send(OutboundSignal::UserMessage {
            message_id: message_id.clone(),
            text: text.to_string(),
        });
        Ok(message_id)
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.inner.snapshots.borrow().clone()
    }

    /// Receiver notified after every change to the model.
    pub fn subscribe(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.inner.snapshots.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.state.lock().is_streaming()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Closes the open message, if any, as failed. The engine keeps accepting
    /// chunks; a later stream may start a new message.
    pub fn interrupt(&self, reason: &str) -> bool {
        let mut state = self.inner.state.lock();
        self.finalize(&mut state, reason)
    }

    /// Finalizes the open message as failed and stops accepting writes.
    /// Subsequent calls are no-ops.
    pub fn shutdown(&self, reason: &str) {
        let mut state = self.inner.state.lock();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.finalize(&mut state, reason);
        info!(reason, "engine shut down");
    }

    fn finalize(&self, state: &mut Conversation, reason: &str) -> bool {
        let closed = state.finalize(reason);
        if closed {
            self.publish(state);
        }
        closed
    }

    fn ensure_open(&self) -> Result<(), EngineError> {
        if self.is_closed() {
            Err(EngineError::Closed)
        } else {
            Ok(())
        }
    }

    fn publish(&self, state: &Conversation) {
        if self.inner.snapshots.borrow().version == state.version() {
            return;
        }
        self.inner.snapshots.send_replace(Arc::new(state.snapshot()));
    }

    // Outbound delivery is fire-and-forget; the local model is already updated.
    fn send(&self, signal: OutboundSignal) {
        match self.inner.outbound.try_send(signal) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(signal)) => {
                warn!(?signal, "outbound channel full; signal dropped");
            }
            Err(mpsc::error::TrySendError::Closed(signal)) => {
                warn!(?signal, "outbound channel closed; signal dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticKind;
    use crate::message::Role;
    use crate::part::ToolCallState;
    use serde_json::json;

    fn engine() -> (Engine, mpsc::Receiver<OutboundSignal>) {
        Engine::new(EngineConfig::default()).expect("engine")
    }

    fn pending_approval(engine: &Engine) {
        for chunk in [
            Chunk::message_start("m1", Role::Assistant),
            Chunk::tool_call_start("t1", "delete_file"),
            Chunk::tool_call_end("t1", Some(json!({"path": "/tmp/x"}))),
            Chunk::ApprovalRequested {
                tool_call_id: "t1".into(),
                approval_id: Some("ap-1".into()),
            },
        ] {
            engine.apply(chunk).expect("apply");
        }
    }

    #[test]
    fn zero_capacity_config_is_rejected() {
        let err = Engine::new(EngineConfig::default().outbound_buffer_capacity(0))
            .err()
            .expect("invalid config");
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[tokio::test]
    async fn subscribers_observe_each_change() {
        let (engine, _rx) = engine();
        let mut updates = engine.subscribe();
        engine
            .apply(Chunk::message_start("m1", Role::Assistant))
            .expect("start");
        updates.changed().await.expect("changed");
        assert!(updates.borrow_and_update().streaming);

        engine.apply(Chunk::text("m1", "hi")).expect("delta");
        updates.changed().await.expect("changed");
        let snapshot = updates.borrow_and_update().clone();
        assert_eq!(snapshot.messages[0].text(), "hi");
        assert_eq!(snapshot.version, 2);
    }

    #[tokio::test]
    async fn approval_decision_is_sent_outbound() {
        let (engine, mut rx) = engine();
        pending_approval(&engine);
        engine.respond_approval("ap-1", true).expect("respond");

        assert_eq!(
            rx.recv().await,
            Some(OutboundSignal::ResumeApproval {
                approval_id: "ap-1".into(),
                tool_call_id: "t1".into(),
                decision: true,
            })
        );
        assert_eq!(
            engine.snapshot().tool_call("t1").map(|c| c.state),
            Some(ToolCallState::ApprovalResponded)
        );
    }

    #[tokio::test]
    async fn user_message_is_appended_and_sent() {
        let (engine, mut rx) = engine();
        let id = engine.submit_user_message("hello").expect("submit");
        assert_eq!(
            rx.recv().await,
            Some(OutboundSignal::UserMessage {
                message_id: id.clone(),
                text: "hello".into(),
            })
        );
        assert_eq!(engine.snapshot().message(&id).map(|m| m.role), Some(Role::Human));
    }

    #[test]
    fn full_outbound_channel_does_not_fail_the_write() {
        let (engine, _rx) =
            Engine::new(EngineConfig::default().outbound_buffer_capacity(1)).expect("engine");
        engine.submit_user_message("one").expect("first");
        engine.submit_user_message("two").expect("second still succeeds");
        assert_eq!(engine.snapshot().messages.len(), 2);
    }

    #[test]
    fn closed_outbound_channel_does_not_fail_the_write() {
        let (engine, rx) = engine();
        drop(rx);
        engine.submit_user_message("anyone there?").expect("submit");
    }

    #[test]
    fn shutdown_fails_open_message_and_rejects_writes() {
        let (engine, _rx) = engine();
        engine.apply(Chunk::text("m1", "partial")).expect("delta");
        engine.shutdown("session dropped");
        engine.shutdown("again");

        let snapshot = engine.snapshot();
        assert!(!snapshot.streaming);
        assert!(snapshot.messages[0].is_failed());
        assert_eq!(engine.submit_user_message("hi"), Err(EngineError::Closed));
        assert_eq!(engine.respond_approval("x", true), Err(EngineError::Closed));
        let err = engine
            .apply(Chunk::text("m1", "ignored"))
            .expect_err("chunk after shutdown");
        assert_eq!(err.kind, DiagnosticKind::ProtocolViolation);
        assert_eq!(engine.snapshot().messages[0].text(), "partial");
    }

    #[test]
    fn chunk_for_new_message_after_shutdown_opens_nothing() {
        let (engine, _rx) = engine();
        engine.shutdown("session dropped");
        let err = engine
            .apply(Chunk::text("m2", "late"))
            .expect_err("chunk after shutdown");
        assert!(err.detail.contains("TEXT_DELTA"));
        assert!(!engine.is_streaming());

        let snapshot = engine.snapshot();
        assert!(snapshot.messages.is_empty());
        assert_eq!(snapshot.diagnostics.len(), 1);
        assert_eq!(snapshot.diagnostics[0].kind, DiagnosticKind::ProtocolViolation);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_racing_a_writer_leaves_nothing_open() {
        for round in 0..200 {
            let (engine, _rx) = engine();
            let writer = {
                let engine = engine.clone();
                tokio::spawn(async move {
                    for n in 0..20 {
                        let _ = engine.apply(Chunk::text(format!("m{round}-{n}"), "x"));
                    }
                })
            };
            engine.shutdown("session dropped");
            writer.await.expect("writer");
            assert!(!engine.is_streaming());
            assert!(engine.snapshot().messages.iter().all(|m| !m.is_open()));
        }
    }

    #[test]
    fn unknown_approval_leaves_snapshot_untouched() {
        let (engine, _rx) = engine();
        engine.apply(Chunk::text("m1", "hi")).expect("delta");
        let before = engine.snapshot();
        assert!(matches!(
            engine.respond_approval("nope", true),
            Err(EngineError::UnknownApproval { .. })
        ));
        assert!(Arc::ptr_eq(&before, &engine.snapshot()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn decisions_and_chunks_from_separate_tasks_serialize() {
        let (engine, mut rx) = engine();
        pending_approval(&engine);

        let streamer = {
            let engine = engine.clone();
            tokio::spawn(async move {
                for i in 0..200 {
                    engine
                        .apply(Chunk::text("m1", format!("{i} ")))
                        .expect("delta");
                    tokio::task::yield_now().await;
                }
                engine.apply(Chunk::message_end("m1")).expect("end");
            })
        };
        let decider = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.respond_approval("ap-1", false) })
        };
        streamer.await.expect("streamer");
        decider.await.expect("decider").expect("respond");

        let snapshot = engine.snapshot();
        let expected: String = (0..200).map(|i| format!("{i} ")).collect();
        assert_eq!(snapshot.messages[0].text(), expected);
        assert_eq!(snapshot.approval_for("t1").and_then(|a| a.decision), Some(false));
        assert!(matches!(
            rx.recv().await,
            Some(OutboundSignal::ResumeApproval { decision: false, .. })
        ));
    }
}
