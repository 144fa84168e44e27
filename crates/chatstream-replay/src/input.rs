use std::path::{Path, PathBuf};

use chatstream_core::sse;
use chatstream_core::{Chunk, ChunkStream, TransportError};
use futures::stream;

/// On-disk layout of a recorded chunk log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum Format {
    /// One JSON chunk per line. Blank lines and `#` comments are skipped.
    Jsonl,
    /// Raw server-sent event stream as captured from the wire.
    Sse,
}

impl Format {
    /// Guesses the format from the file extension, defaulting to JSON lines.
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("sse") | Some("txt") => Self::Sse,
            _ => Self::Jsonl,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InputError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Opens a recorded log as a chunk stream.
///
/// Lines that fail to decode surface as `TransportError::Decode` items, which
/// the session treats as a stream failure at that point in the replay.
pub async fn open(path: &Path, format: Format) -> Result<ChunkStream, InputError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let chunks: ChunkStream = match format {
        Format::Jsonl => Box::pin(stream::iter(parse_jsonl(&String::from_utf8_lossy(&bytes)))),
        Format::Sse => {
            let body: sse::ByteStream = Box::pin(stream::iter([Ok::<_, TransportError>(
                bytes::Bytes::from(bytes),
            )]));
            sse::chunk_stream(body)
        }
    };
    Ok(chunks)
}

fn parse_jsonl(text: &str) -> Vec<Result<Chunk, TransportError>> {
    text.lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(line_no, line)| {
            Chunk::from_json(line)
                .map_err(|e| TransportError::decode(format!("line {line_no}: {e}")))
        })
        .collect()
}
