use std::collections::VecDeque;
use std::pin::Pin;

use futures::StreamExt as _;
use futures::stream;

use crate::chunk::Chunk;
use crate::errors::TransportError;
use crate::transport::ChunkStream;

/// Raw byte stream as produced by an HTTP body or file reader.
pub type ByteStream =
    Pin<Box<dyn futures::Stream<Item = Result<bytes::Bytes, TransportError>> + Send + 'static>>;

/// One server-sent event frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

/// Incremental SSE framer. Bytes may be split at any boundary.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Buffers `bytes` and returns every frame completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while let Some((end, delim)) = frame_end(&self.buf) {
            let frame = parse_frame(&self.buf[..end]);
            self.buf.drain(..end + delim);
            frames.extend(frame);
        }
        frames
    }

    /// Flushes a trailing frame that was not followed by a blank line.
    pub fn finish(&mut self) -> Option<SseFrame> {
        let rest = std::mem::take(&mut self.buf);
        parse_frame(&rest)
    }
}

fn frame_end(buf: &[u8]) -> Option<(usize, usize)> {
    let mut i = 0;
    while i + 1 < buf.len() {
        if buf[i] == b'\n' && buf[i + 1] == b'\n' {
            return Some((i, 2));
        }
        if buf[i..].starts_with(b"\r\n\r\n") {
            return Some((i, 4));
        }
        i += 1;
    }
    None
}

fn parse_frame(bytes: &[u8]) -> Option<SseFrame> {
    if bytes.is_empty() {
        return None;
    }
    let text = String::from_utf8_lossy(bytes);
    let mut event = None;
    let mut data = Vec::new();
    for line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
    }
    if event.is_none() && data.is_empty() {
        return None;
    }
    Some(SseFrame {
        event,
        data: data.join("\n"),
    })
}

/// Decodes a frame's data as a chunk. Frames with no payload and the
/// `[DONE]` sentinel yield `Ok(None)`.
pub fn decode_frame(frame: &SseFrame) -> Result<Option<Chunk>, TransportError> {
    let data = frame.data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    Chunk::from_json(data)
        .map(Some)
        .map_err(|e| TransportError::decode(format!("invalid chunk frame: {e}")))
}

/// Adapts an SSE byte stream into a chunk stream.
///
/// A decode failure is yielded as an `Err` item and ends the stream.
pub fn chunk_stream(bytes: ByteStream) -> ChunkStream {
    struct State {
        bytes: ByteStream,
        decoder: SseDecoder,
        pending: VecDeque<Chunk>,
        done: bool,
    }

    let state = State {
        bytes,
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(stream::try_unfold(state, |mut state| async move {
        loop {
            if let Some(chunk) = state.pending.pop_front() {
                return Ok(Some((chunk, state)));
            }
            if state.done {
                return Ok(None);
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => {
                    for frame in state.decoder.push(&bytes) {
                        state.pending.extend(decode_frame(&frame)?);
                    }
                }
                Some(Err(err)) => return Err(err),
                None => {
                    state.done = true;
                    if let Some(frame) = state.decoder.finish() {
                        state.pending.extend(decode_frame(&frame)?);
                    }
                }
            }
        }
    }))
}
