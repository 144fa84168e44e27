//! chatstream-replay: replay a recorded chunk log through the engine and print
//! the reconciled conversation.
//!
//! Usage:
//!   chatstream-replay --input run.jsonl
//!   chatstream-replay --input capture.sse --approve ap-1 --deny ap-2
//!   chatstream-replay --input run.jsonl --json

mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use chatstream_core::{
    Engine, EngineConfig, EngineError, OutboundSignal, Session, Transport, TransportError,
    init_observability, spawn_outbound_forwarder,
};

use crate::input::{Format, InputError};

#[derive(Parser)]
#[command(
    name = "chatstream-replay",
    about = "Replay a recorded chunk stream and print the reconciled conversation."
)]
struct Cli {
    /// Recorded chunk log.
    #[arg(long, value_name = "PATH")]
    input: PathBuf,

    /// Log format. Defaults to `sse` for `.sse` files, `jsonl` otherwise.
    #[arg(long, value_enum)]
    format: Option<Format>,

    /// Approve a pending approval after the replay. Repeatable.
    #[arg(long, value_name = "APPROVAL_ID")]
    approve: Vec<String>,

    /// Deny a pending approval after the replay. Repeatable.
    #[arg(long, value_name = "APPROVAL_ID")]
    deny: Vec<String>,

    /// Print the final snapshot as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, thiserror::Error)]
enum ReplayError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Stands in for the backend: outbound signals are logged, not sent.
struct LoggingTransport;

#[async_trait::async_trait]
impl Transport for LoggingTransport {
    async fn deliver(&self, signal: OutboundSignal) -> Result<(), TransportError> {
        match signal {
            OutboundSignal::UserMessage { message_id, text } => {
                info!(message_id = %message_id, len = text.len(), "would send user message");
            }
            OutboundSignal::ResumeApproval {
                approval_id,
                tool_call_id,
                decision,
            } => {
                info!(approval_id = %approval_id, tool_call_id = %tool_call_id, decision, "would resume tool call");
            }
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_observability();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(output) => print!("{output}"),
        Err(err) => {
            tracing::error!(error = %err, "replay failed");
            eprintln!("error: {err}");
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<String, ReplayError> {
    let (engine, outbound) = Engine::new(EngineConfig::from_env()?)?;
    let forwarder = spawn_outbound_forwarder(outbound, Arc::new(LoggingTransport));

    let format = cli.format.unwrap_or_else(|| Format::detect(&cli.input));
    let chunks = input::open(&cli.input, format).await?;

    let session = Session::new(engine.clone());
    let outcome = session.drive(chunks).await;
    info!(
        chunks = outcome.chunks,
        dropped = outcome.dropped,
        terminated = ?outcome.terminated,
        "replay finished"
    );

    let decisions = cli
        .approve
        .iter()
        .map(|id| (id, true))
        .chain(cli.deny.iter().map(|id| (id, false)));
    for (approval_id, approved) in decisions {
        if let Err(err) = engine.respond_approval(approval_id, approved) {
            warn!(approval_id = %approval_id, error = %err, "decision rejected");
        }
    }

    let snapshot = engine.snapshot();
    let output = if cli.json {
        let mut json = serde_json::to_string_pretty(&*snapshot)?;
        json.push('\n');
        json
    } else {
        render::render(&snapshot)
    };

    // Dropping every engine handle closes the outbound channel.
    drop(session);
    drop(engine);
    let _ = forwarder.await;
    Ok(output)
}
