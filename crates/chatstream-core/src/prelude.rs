//! Common imports for driving a conversation.
pub use crate::{
    AbortHandle, Chunk, ChunkStream, DriveOutcome, Engine, EngineConfig, EngineError, Message,
    MessageStatus, OutboundSignal, Part, Role, Session, Snapshot, Termination, ToolCallState,
    Transport, TransportError, spawn_outbound_forwarder,
};
