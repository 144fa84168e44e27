use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::chunk::Chunk;
use crate::errors::TransportError;

/// Inbound chunk stream produced by a transport.
pub type ChunkStream =
    Pin<Box<dyn futures::Stream<Item = Result<Chunk, TransportError>> + Send + 'static>>;

/// Signals the engine pushes toward the remote side.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundSignal {
    /// A locally appended human message to forward for processing.
    UserMessage { message_id: String, text: String },
    /// A human approval decision that resumes a gated tool call.
    ResumeApproval {
        approval_id: String,
        tool_call_id: String,
        decision: bool,
    },
}

/// Collaborator that delivers outbound signals to the remote backend.
///
/// Retry and timeout policy belong to implementations; the engine never
/// waits on delivery.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, signal: OutboundSignal) -> Result<(), TransportError>;
}

/// Drains the engine's outbound channel into a transport until the channel
/// closes. Delivery failures are logged and do not stop the forwarder.
pub fn spawn_outbound_forwarder(
    mut rx: mpsc::Receiver<OutboundSignal>,
    transport: Arc<dyn Transport>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(signal) = rx.recv().await {
            debug!(?signal, "delivering outbound signal");
            if let Err(err) = transport.deliver(signal).await {
                warn!(error = %err, "outbound signal delivery failed");
            }
        }
        debug!("outbound channel closed; forwarder exiting");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        delivered: Mutex<Vec<OutboundSignal>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn deliver(&self, signal: OutboundSignal) -> Result<(), TransportError> {
            self.delivered.lock().push(signal);
            if self.fail {
                return Err(TransportError::transport("backend unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn forwarder_delivers_in_order_and_survives_failures() {
        let transport = Arc::new(RecordingTransport {
            fail: true,
            ..Default::default()
        });
        let (tx, rx) = mpsc::channel(4);
        let handle = spawn_outbound_forwarder(rx, transport.clone());

        tx.send(OutboundSignal::UserMessage {
            message_id: "h1".into(),
            text: "hi".into(),
        })
        .await
        .expect("send");
        tx.send(OutboundSignal::ResumeApproval {
            approval_id: "ap-1".into(),
            tool_call_id: "t1".into(),
            decision: true,
        })
        .await
        .expect("send");
        drop(tx);
        handle.await.expect("forwarder");

        let delivered = transport.delivered.lock();
        assert_eq!(delivered.len(), 2);
        assert!(matches!(delivered[1], OutboundSignal::ResumeApproval { decision: true, .. }));
    }

    #[test]
    fn outbound_signal_serializes_with_type_tag() {
        let json = serde_json::to_value(OutboundSignal::ResumeApproval {
            approval_id: "ap-1".into(),
            tool_call_id: "t1".into(),
            decision: false,
        })
        .expect("serialize");
        assert_eq!(json["type"], "resume_approval");
        assert_eq!(json["decision"], false);
    }
}
