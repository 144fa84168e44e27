use futures::StreamExt as _;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::chunk::Chunk;
use crate::engine::Engine;
use crate::transport::ChunkStream;

pub(crate) const CANCELLED: &str = "cancelled";
pub(crate) const ENDED_EARLY: &str = "stream ended before message end";

/// Handle used to request cancellation of a running drive.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

impl AbortHandle {
    /// Requests cancellation.
    ///
    /// Takes effect before the next chunk is applied; the open message is
    /// finalized as failed with reason `"cancelled"`.
    pub fn abort(&self) {
        let _ = self.tx.send(true);
    }
}

/// How a drive ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The stream ended with no message left open.
    Completed,
    /// The transport failed or the stream ended mid-message.
    Failed(String),
    Cancelled,
}

/// Summary of one [`Session::drive`] call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DriveOutcome {
    /// Chunks handed to the engine, including dropped ones.
    pub chunks: u64,
    /// Chunks the engine rejected with a diagnostic.
    pub dropped: u64,
    pub terminated: Termination,
}

/// Pumps an inbound chunk stream into an [`Engine`].
///
/// Dropping the session shuts the engine down, finalizing any open message.
pub struct Session {
    id: uuid::Uuid,
    engine: Engine,
    abort_tx: watch::Sender<bool>,
}

impl Session {
    pub fn new(engine: Engine) -> Self {
        let (abort_tx, _) = watch::channel(false);
        Self {
            id: uuid::Uuid::new_v4(),
            engine,
            abort_tx,
        }
    }

    pub fn id(&self) -> uuid::Uuid {
        self.id
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            tx: self.abort_tx.clone(),
        }
    }

    /// Applies every chunk from `stream` in arrival order until it ends,
    /// fails, or the session is aborted.
    ///
    /// Transport errors and premature stream ends are reconciled as
    /// `STREAM_ERROR` so the open message is never left streaming.
    pub async fn drive(&self, mut stream: ChunkStream) -> DriveOutcome {
        let mut abort_rx = self.abort_tx.subscribe();
        let mut outcome = DriveOutcome {
            chunks: 0,
            dropped: 0,
            terminated: Termination::Completed,
        };
        info!(session_id = %self.id, "drive started");

        loop {
            if *abort_rx.borrow_and_update() {
                self.engine.interrupt(CANCELLED);
                outcome.terminated = Termination::Cancelled;
                break;
            }
            tokio::select! {
                biased;
                // The sender lives in `self`, so this never resolves to `Err`
                // while the drive runs; the flag is read at the loop head.
                _ = abort_rx.changed() => {}
                next = stream.next() => match next {
                    Some(Ok(chunk)) => {
                        outcome.chunks += 1;
                        if self.engine.apply(chunk).is_err() {
                            outcome.dropped += 1;
                        }
                    }
                    Some(Err(err)) => {
                        warn!(session_id = %self.id, error = %err, "transport failed");
                        let reason = err.message().to_string();
                        let _ = self.engine.apply(Chunk::stream_error(reason.clone()));
                        outcome.terminated = Termination::Failed(reason);
                        break;
                    }
                    None => {
                        if self.engine.is_streaming() {
                            let _ = self.engine.apply(Chunk::stream_error(ENDED_EARLY));
                            outcome.terminated = Termination::Failed(ENDED_EARLY.to_string());
                        }
                        break;
                    }
                },
            }
        }

        debug!(
            session_id = %self.id,
            chunks = outcome.chunks,
            dropped = outcome.dropped,
            terminated = ?outcome.terminated,
            "drive finished"
        );
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.engine.shutdown("session closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::diagnostics::DiagnosticKind;
    use crate::errors::{EngineError, TransportError};
    use crate::message::{MessageStatus, Role};
    use crate::part::ToolCallState;
    use futures::stream;
    use serde_json::json;

    fn session() -> Session {
        let (engine, _rx) = Engine::new(EngineConfig::default()).expect("engine");
        Session::new(engine)
    }

    fn chunks(items: Vec<Result<Chunk, TransportError>>) -> ChunkStream {
        Box::pin(stream::iter(items))
    }

    #[tokio::test]
    async fn completed_stream_builds_the_conversation() {
        let session = session();
        let outcome = session
            .drive(chunks(vec![
                Ok(Chunk::message_start("m1", Role::Assistant)),
                Ok(Chunk::text("m1", "Checking the weather")),
                Ok(Chunk::tool_call_start("t1", "get_weather")),
                Ok(Chunk::tool_call_args("t1", "{\"location\":")),
                Ok(Chunk::tool_call_args("t1", "\"Paris\"}")),
                Ok(Chunk::tool_call_end("t1", None)),
                Ok(Chunk::message_end("m1")),
            ]))
            .await;

        assert_eq!(outcome.chunks, 7);
        assert_eq!(outcome.dropped, 0);
        assert_eq!(outcome.terminated, Termination::Completed);
        let snapshot = session.engine().snapshot();
        let call = snapshot.tool_call("t1").expect("call");
        assert_eq!(call.state, ToolCallState::InputComplete);
        assert_eq!(call.resolved_input().value(), Some(&json!({"location": "Paris"})));
    }

    #[tokio::test]
    async fn dropped_chunks_are_counted_and_stream_continues() {
        let session = session();
        let outcome = session
            .drive(chunks(vec![
                Ok(Chunk::message_start("m1", Role::Assistant)),
                Ok(Chunk::tool_call_args("ghost", "{}")),
                Ok(Chunk::text("m1", "still here")),
                Ok(Chunk::message_end("m1")),
            ]))
            .await;
        assert_eq!(outcome.dropped, 1);
        assert_eq!(outcome.terminated, Termination::Completed);
        assert_eq!(
            session.engine().snapshot().message("m1").map(|m| m.text()),
            Some("still here".to_string())
        );
    }

    #[tokio::test]
    async fn transport_error_fails_open_message() {
        let session = session();
        let outcome = session
            .drive(chunks(vec![
                Ok(Chunk::message_start("m2", Role::Assistant)),
                Ok(Chunk::text("m2", "partial")),
                Err(TransportError::transport("connection reset")),
                Ok(Chunk::text("m2", "never applied")),
            ]))
            .await;

        assert_eq!(
            outcome.terminated,
            Termination::Failed("connection reset".into())
        );
        let snapshot = session.engine().snapshot();
        let message = snapshot.message("m2").expect("message");
        assert_eq!(message.text(), "partial");
        assert_eq!(
            message.status,
            MessageStatus::Failed {
                reason: "connection reset".into()
            }
        );
        assert_eq!(snapshot.diagnostics[0].kind, DiagnosticKind::TransportFailure);
    }

    #[tokio::test]
    async fn stream_ending_mid_message_is_a_failure() {
        let session = session();
        let outcome = session
            .drive(chunks(vec![Ok(Chunk::text("m1", "cut off"))]))
            .await;
        assert_eq!(outcome.terminated, Termination::Failed(ENDED_EARLY.into()));
        assert!(!session.engine().is_streaming());
    }

    #[tokio::test]
    async fn abort_finalizes_open_message_as_cancelled() {
        let session = session();
        let abort = session.abort_handle();
        let stream: ChunkStream = Box::pin(
            stream::iter(vec![
                Ok(Chunk::message_start("m1", Role::Assistant)),
                Ok(Chunk::text("m1", "thinking about it")),
            ])
            .chain(stream::pending()),
        );

        let mut updates = session.engine().subscribe();
        let drive = session.drive(stream);
        let watcher = async {
            loop {
                updates.changed().await.expect("changed");
                if updates.borrow_and_update().version >= 2 {
                    abort.abort();
                    break;
                }
            }
        };
        let (outcome, ()) = tokio::join!(drive, watcher);

        assert_eq!(outcome.terminated, Termination::Cancelled);
        let snapshot = session.engine().snapshot();
        let message = snapshot.message("m1").expect("message");
        assert_eq!(
            message.status,
            MessageStatus::Failed {
                reason: CANCELLED.into()
            }
        );
        assert_eq!(message.text(), "thinking about it");
    }

    #[tokio::test]
    async fn dropping_the_session_shuts_the_engine_down() {
        let session = session();
        let engine = session.engine().clone();
        engine.apply(Chunk::text("m1", "half")).expect("delta");
        drop(session);

        assert!(engine.is_closed());
        assert!(engine.snapshot().messages[0].is_failed());
        assert_eq!(engine.submit_user_message("hi"), Err(EngineError::Closed));
    }
}
