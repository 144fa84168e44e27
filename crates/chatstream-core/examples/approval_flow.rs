use std::sync::Arc;

use chatstream_core::prelude::*;
use futures::StreamExt as _;
use serde_json::json;

struct PrintTransport;

#[async_trait::async_trait]
impl Transport for PrintTransport {
    async fn deliver(&self, signal: OutboundSignal) -> Result<(), TransportError> {
        println!("-> {}", serde_json::to_string(&signal).unwrap_or_default());
        Ok(())
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), EngineError> {
    let (engine, outbound) = Engine::new(EngineConfig::default())?;
    let forwarder = spawn_outbound_forwarder(outbound, Arc::new(PrintTransport));

    engine.submit_user_message("Clean up /tmp/build")?;

    let script = vec![
        Chunk::message_start("m1", Role::Assistant),
        Chunk::text("m1", "I'll remove the build directory."),
        Chunk::tool_call_start("t1", "delete_path"),
        Chunk::tool_call_args("t1", "{\"path\":"),
        Chunk::tool_call_args("t1", "\"/tmp/build\"}"),
        Chunk::tool_call_end("t1", None),
        Chunk::ApprovalRequested {
            tool_call_id: "t1".into(),
            approval_id: Some("ap-1".into()),
        },
        Chunk::message_end("m1"),
    ];
    let inbound: ChunkStream = Box::pin(futures::stream::iter(script).map(Ok::<_, TransportError>));

    let session = Session::new(engine.clone());
    let outcome = session.drive(inbound).await;
    println!("drive: {outcome:?}");

    for call in engine.snapshot().pending_approvals() {
        println!("approval needed for {} {}", call.name, call.raw_arguments());
    }
    engine.respond_approval("ap-1", true)?;
    let _ = engine.apply(Chunk::ApprovalResponded {
        approval_id: "ap-1".into(),
        approved: true,
    });

    for chunk in [
        Chunk::message_start("m2", Role::Assistant),
        Chunk::ToolResultEnd {
            tool_call_id: "t1".into(),
            output: Some(json!({"removed": 42})),
            is_error: false,
        },
        Chunk::text("m2", "Removed 42 files."),
        Chunk::message_end("m2"),
    ] {
        let _ = engine.apply(chunk);
    }

    for message in &engine.snapshot().messages {
        println!("[{} {}] {}", message.role, message.id, message.text());
    }

    drop(session);
    drop(engine);
    let _ = forwarder.await;
    Ok(())
}
