//! Newline-delimited JSON transport

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::error::IpcError;

/// Reads one message per line from an async byte stream
pub struct LineReader<R> {
    reader: BufReader<R>,
    buffer: String,
}

impl<R: AsyncRead + Unpin> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            buffer: String::new(),
        }
    }

    /// Next non-blank line with its newline removed, or `None` at end of stream
    pub async fn next_line(&mut self) -> Result<Option<String>, IpcError> {
        loop {
            self.buffer.clear();
            let read = self.reader.read_line(&mut self.buffer).await?;
            if read == 0 {
                return Ok(None);
            }

            let line = self.buffer.trim();
            if !line.is_empty() {
                return Ok(Some(line.to_string()));
            }
        }
    }
}

impl LineReader<tokio::io::Stdin> {
    /// Reader over the process stdin
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

/// Writes one JSON document per line to an async byte sink
pub struct LineWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> LineWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Serialize `message` and write it followed by a newline, then flush
    pub async fn send<T: Serialize>(&mut self, message: &T) -> Result<(), IpcError> {
        let mut json = serde_json::to_string(message)
            .map_err(|e| IpcError::SerializationError(e.to_string()))?;
        json.push('\n');

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.flush().await?;
        log::trace!("Sent {} bytes", json.len());
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl LineWriter<tokio::io::Stdout> {
    /// Writer over the process stdout
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}
