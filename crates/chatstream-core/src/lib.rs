//! Streaming conversation reconciliation engine.
//!
//! A backend streams fine-grained chunks (text deltas, tool call argument
//! fragments, tool results, approval requests) over a long-lived connection.
//! This crate folds them, in arrival order, into an append-only message model
//! that a renderer can read at any moment, and lets a human approve or deny
//! gated tool calls while the stream is still running.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chatstream_core::prelude::*;
//!
//! # struct Backend;
//! # #[async_trait::async_trait]
//! # impl Transport for Backend {
//! #     async fn deliver(&self, _signal: OutboundSignal) -> Result<(), TransportError> { Ok(()) }
//! # }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), EngineError> {
//! # let inbound: ChunkStream = Box::pin(futures::stream::empty());
//! let (engine, outbound) = Engine::new(EngineConfig::from_env()?)?;
//! let _forwarder = spawn_outbound_forwarder(outbound, Arc::new(Backend));
//!
//! let session = Session::new(engine.clone());
//! let outcome = session.drive(inbound).await;
//!
//! for call in engine.snapshot().pending_approvals() {
//!     println!("{} wants approval", call.name);
//! }
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

/// Incremental JSON accumulation for tool call arguments.
pub mod accumulator;
/// Inbound chunk alphabet and its JSON wire form.
pub mod chunk;
/// Engine configuration.
pub mod config;
/// The single-writer reconciliation state machine.
pub mod conversation;
/// Cross-reference index for tool calls, results, and approvals.
pub mod correlator;
/// Non-fatal reconciliation diagnostics.
pub mod diagnostics;
/// Shared engine handle with snapshot publication and outbound signals.
pub mod engine;
/// Caller-facing and transport error types.
pub mod errors;
/// Messages and their lifecycle.
pub mod message;
/// Tracing subscriber setup.
pub mod observability;
/// Message parts.
pub mod part;
/// Common imports for typical usage.
pub mod prelude;
/// Async driver pumping a chunk stream into an engine.
pub mod session;
/// Immutable conversation snapshots.
pub mod snapshot;
/// Server-sent event decoding into chunks.
pub mod sse;
/// Transport collaborator contract and outbound signals.
pub mod transport;

pub use accumulator::{ParseOutcome, PartialJson};
pub use chunk::Chunk;
pub use config::EngineConfig;
pub use conversation::Conversation;
pub use correlator::{Correlator, PartRef};
pub use diagnostics::{Diagnostic, DiagnosticKind};
pub use engine::Engine;
pub use errors::{EngineError, TransportError};
pub use message::{Message, MessageStatus, Role};
pub use observability::init_observability;
pub use part::{
    Approval, Part, TextPart, ThinkingPart, ToolCallPart, ToolCallState, ToolResultPart,
    ToolResultState,
};
pub use session::{AbortHandle, DriveOutcome, Session, Termination};
pub use snapshot::Snapshot;
pub use transport::{ChunkStream, OutboundSignal, Transport, spawn_outbound_forwarder};
