//! Script output sink.
//!
//! The sink is opened once per run, passed explicitly to whoever writes, and
//! closed by the run controller on every exit path so buffered text is never
//! lost.

use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::OutputConfig;
use crate::error::Result;

/// UTF-8 byte-order mark written at the start of script files.
pub const BOM: &str = "\u{FEFF}";

/// Boxed writer used for file and stdout targets.
pub type DynWriter = Box<dyn AsyncWrite + Unpin + Send>;

/// Buffered script writer.
pub struct ScriptSink<W: AsyncWrite + Unpin + Send> {
    writer: BufWriter<W>,
    bytes_written: u64,
}

impl ScriptSink<DynWriter> {
    /// Open the configured target: a file (with BOM unless disabled) or stdout.
    pub async fn open(output: &OutputConfig) -> Result<Self> {
        match &output.path {
            Some(path) => {
                let file = tokio::fs::File::create(path).await?;
                debug!("Writing script to {}", path.display());
                let mut sink = Self::from_writer(Box::new(file) as DynWriter);
                if output.bom {
                    sink.write(BOM).await?;
                }
                Ok(sink)
            }
            None => Ok(Self::from_writer(Box::new(tokio::io::stdout()) as DynWriter)),
        }
    }
}

impl<W: AsyncWrite + Unpin + Send> ScriptSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            bytes_written: 0,
        }
    }

    /// Append script text.
    pub async fn write(&mut self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Ok(());
        }
        self.writer.write_all(text.as_bytes()).await?;
        self.bytes_written += text.len() as u64;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Flush and release the underlying writer.
    pub async fn close(mut self) -> Result<W> {
        self.writer.flush().await?;
        let mut inner = self.writer.into_inner();
        inner.shutdown().await?;
        Ok(inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_in_memory_sink() {
        let mut sink = ScriptSink::from_writer(Vec::new());
        sink.write("SELECT 1;\n").await.unwrap();
        sink.write("").await.unwrap();
        assert_eq!(sink.bytes_written(), 10);
        let out = sink.close().await.unwrap();
        assert_eq!(out, b"SELECT 1;\n");
    }

    #[tokio::test]
    async fn test_file_sink_writes_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("out.sql");
        let output = OutputConfig {
            path: Some(path.clone()),
            bom: true,
        };
        let mut sink = ScriptSink::open(&output).await.unwrap();
        sink.write("GO\n").await.unwrap();
        sink.close().await.unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "\u{FEFF}GO\n");
    }

    #[tokio::test]
    async fn test_file_sink_without_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.sql");
        let output = OutputConfig {
            path: Some(path.clone()),
            bom: false,
        };
        let mut sink = ScriptSink::open(&output).await.unwrap();
        sink.write("GO\n").await.unwrap();
        sink.close().await.unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"GO\n");
    }
}
