//! Per-file incremental harvesting.
//!
//! One harvest reads at most `chunk_limit` bytes from the stored offset,
//! trims a trailing partial line, gzips the rest and hands it to the
//! [`Transport`]. The caller gets back the offset to store; nothing here
//! touches the offset table.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::config::{ClientConfig, PartialLinePolicy};
use crate::models::{Envelope, HarvestChunk};
use crate::transport::Transport;

const LINE_TERMINATOR: u8 = b'\n';

pub struct Harvester {
    dir: PathBuf,
    chunk_limit: usize,
    partial_line: PartialLinePolicy,
    transport: Arc<dyn Transport>,
}

impl Harvester {
    pub fn new(
        dir: impl Into<PathBuf>,
        chunk_limit: usize,
        partial_line: PartialLinePolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            dir: dir.into(),
            chunk_limit,
            partial_line,
            transport,
        }
    }

    pub fn from_config(config: &ClientConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            config.watch_dir.clone(),
            config.chunk_limit,
            config.partial_line,
            transport,
        )
    }

    /// Ships the next chunk of `file_name` and returns the offset to store.
    ///
    /// On any error the stored offset must stay at `start_offset`.
    pub async fn harvest(&self, file_name: &str, start_offset: u64) -> Result<u64> {
        let chunk = self.read_chunk(file_name, start_offset).await?;
        if chunk.bytes_consumed == 0 {
            tracing::debug!(file = file_name, offset = start_offset, "nothing new to ship");
            return Ok(start_offset);
        }

        let payload = compress(&chunk.raw_bytes)
            .with_context(|| format!("Failed to compress chunk of {}", file_name))?;
        let envelope = Envelope {
            file_name: file_name.to_string(),
            payload,
        };
        self.transport
            .send(&envelope)
            .await
            .with_context(|| format!("Failed to ship chunk of {}", file_name))?;

        tracing::debug!(
            file = file_name,
            offset = start_offset,
            bytes = chunk.bytes_consumed,
            compressed = envelope.payload.len(),
            "chunk shipped"
        );

        Ok(chunk.next_offset())
    }

    /// Reads and trims the next chunk without sending it.
    pub async fn read_chunk(&self, file_name: &str, start_offset: u64) -> Result<HarvestChunk> {
        let path = self.dir.join(file_name);
        let mut file = tokio::fs::File::open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.seek(SeekFrom::Start(start_offset))
            .await
            .with_context(|| format!("Failed to seek {} to {}", path.display(), start_offset))?;

        let mut buf = Vec::with_capacity(self.chunk_limit.min(64 * 1024));
        file.take(self.chunk_limit as u64)
            .read_to_end(&mut buf)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        let keep = kept_len(&buf, self.chunk_limit, self.partial_line);
        buf.truncate(keep);

        Ok(HarvestChunk {
            file_name: file_name.to_string(),
            raw_bytes: buf,
            offset_base: start_offset,
            bytes_consumed: keep as u64,
        })
    }
}

/// How many leading bytes of `buf` to ship.
///
/// Everything after the last line terminator is dropped and re-read next
/// cycle. A buffer with no terminator at all is shipped whole under
/// [`PartialLinePolicy::Ship`]; under [`PartialLinePolicy::Withhold`] it is
/// kept back unless it already fills `chunk_limit`.
pub fn kept_len(buf: &[u8], chunk_limit: usize, policy: PartialLinePolicy) -> usize {
    match buf.last() {
        None => 0,
        Some(&LINE_TERMINATOR) => buf.len(),
        Some(_) => match buf.iter().rposition(|&b| b == LINE_TERMINATOR) {
            Some(i) => i + 1,
            None => match policy {
                PartialLinePolicy::Ship => buf.len(),
                PartialLinePolicy::Withhold if buf.len() >= chunk_limit => buf.len(),
                PartialLinePolicy::Withhold => 0,
            },
        },
    }
}

/// Gzip at best compression.
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}
