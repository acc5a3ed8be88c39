//! LSP `Content-Length` frame codec.
//!
//! Frames are HTTP-style: one or more `Header: value\r\n` lines, a blank
//! `\r\n`, then exactly `Content-Length` bytes of UTF-8 JSON. Only
//! `Content-Length` is meaningful; other headers are read and discarded.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Error, Debug)]
pub enum FrameError {
    /// The peer closed the stream on a frame boundary. Not an error for a
    /// relay loop, just the end of the conversation.
    #[error("stream closed")]
    Eof,

    #[error("missing or zero Content-Length header")]
    MissingLength,

    #[error("invalid Content-Length value '{0}'")]
    InvalidLength(String),

    /// The peer closed the stream in the middle of a frame.
    #[error("stream closed mid-frame")]
    UnexpectedEof,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

const CONTENT_LENGTH: &str = "content-length:";

/// Reads one frame and returns exactly its payload bytes.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, FrameError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: usize = 0;
    let mut at_frame_start = true;

    loop {
        let mut line = String::new();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            if at_frame_start {
                return Err(FrameError::Eof);
            }
            return Err(FrameError::UnexpectedEof);
        }
        at_frame_start = false;

        let line = line.trim();
        if line.is_empty() {
            break; // end of headers
        }

        if line.len() >= CONTENT_LENGTH.len()
            && line.as_bytes()[..CONTENT_LENGTH.len()].eq_ignore_ascii_case(CONTENT_LENGTH.as_bytes())
        {
            let value = line[CONTENT_LENGTH.len()..].trim();
            content_length = value
                .parse()
                .map_err(|_| FrameError::InvalidLength(value.to_string()))?;
        }
    }

    if content_length == 0 {
        return Err(FrameError::MissingLength);
    }

    let mut payload = vec![0u8; content_length];
    reader.read_exact(&mut payload).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FrameError::UnexpectedEof
        } else {
            FrameError::Io(err)
        }
    })?;

    Ok(payload)
}

/// Writes one framed message as a single unit. The header length is always
/// computed from `payload`, never copied from an inbound header.
pub async fn write_frame<W>(writer: &mut W, payload: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(payload.len() + 32);
    frame.extend_from_slice(format!("Content-Length: {}\r\n\r\n", payload.len()).as_bytes());
    frame.extend_from_slice(payload);

    writer.write_all(&frame).await?;
    writer.flush().await
}
