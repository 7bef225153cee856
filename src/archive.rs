//! Collector-side storage.
//!
//! Every source file name maps to one plain file under the storage root.
//! Chunks are appended in arrival order; nothing is deduplicated, so an
//! envelope delivered twice lands twice.

use anyhow::{bail, Context, Result};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::config::MAX_CHUNK_LIMIT;

#[derive(Debug, Clone)]
pub struct Archive {
    root: PathBuf,
    max_chunk_bytes: usize,
}

impl Archive {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_max_chunk_bytes(root, MAX_CHUNK_LIMIT)
    }

    pub fn with_max_chunk_bytes(root: impl Into<PathBuf>, max_chunk_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_chunk_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Largest inflated chunk this archive accepts.
    pub fn max_chunk_bytes(&self) -> usize {
        self.max_chunk_bytes
    }

    /// Destination path for a source file name.
    pub fn path_for(&self, file_name: &str) -> Result<PathBuf> {
        validate_file_name(file_name)?;
        Ok(self.root.join(file_name))
    }

    /// Appends `data` to the archive for `file_name`, creating the storage
    /// directory and the file as needed. Returns the number of bytes written.
    pub async fn append(&self, file_name: &str, data: &[u8]) -> Result<u64> {
        let path = self.path_for(file_name)?;

        tokio::fs::create_dir_all(&self.root).await.with_context(|| {
            format!("Failed to create storage directory: {}", self.root.display())
        })?;

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        file.write_all(data)
            .await
            .with_context(|| format!("Failed to append to {}", path.display()))?;
        file.flush().await?;

        Ok(data.len() as u64)
    }
}

/// Source file names are flat base names; anything that could escape the
/// storage root is refused.
pub fn validate_file_name(file_name: &str) -> Result<()> {
    if file_name.is_empty() {
        bail!("file name must not be empty");
    }
    if file_name == "." || file_name == ".." {
        bail!("invalid file name: '{}'", file_name);
    }
    if file_name.contains('/') || file_name.contains('\\') || file_name.contains('\0') {
        bail!("invalid file name: '{}' (must be a base name)", file_name);
    }
    Ok(())
}

/// Inflates a gzip payload, refusing output larger than `limit` bytes.
pub fn decompress(payload: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(payload)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .context("invalid gzip payload")?;
    if out.len() > limit {
        bail!("inflated chunk exceeds {} bytes", limit);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harvest::compress;
    use tempfile::TempDir;

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("app.log").is_ok());
        assert!(validate_file_name(".hidden.log").is_ok());
        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("..").is_err());
        assert!(validate_file_name("../etc/passwd").is_err());
        assert!(validate_file_name("sub/app.log").is_err());
    }

    #[test]
    fn test_decompress_roundtrip() {
        let packed = compress(b"A\nB\n").unwrap();
        assert_eq!(decompress(&packed, 1024).unwrap(), b"A\nB\n");
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"definitely not gzip", 1024).is_err());
    }

    #[test]
    fn test_decompress_limit() {
        let data = vec![b'x'; 4096];
        let packed = compress(&data).unwrap();
        // highly compressible: tiny payload, large output
        assert!(packed.len() < 100);
        assert_eq!(decompress(&packed, 4096).unwrap().len(), 4096);

        let err = decompress(&packed, 4095).unwrap_err();
        assert!(err.to_string().contains("exceeds 4095 bytes"));
    }

    #[tokio::test]
    async fn test_append_creates_directory_and_appends() {
        let tmp = TempDir::new().unwrap();
        let archive = Archive::new(tmp.path().join("gathered"));

        assert_eq!(archive.append("app.log", b"A\nB\n").await.unwrap(), 4);
        assert_eq!(archive.append("app.log", b"C\n").await.unwrap(), 2);

        let content = std::fs::read(tmp.path().join("gathered").join("app.log")).unwrap();
        assert_eq!(content, b"A\nB\nC\n");
    }

    #[tokio::test]
    async fn test_append_refuses_traversal() {
        let tmp = TempDir::new().unwrap();
        let archive = Archive::new(tmp.path());
        assert!(archive.append("../escape.log", b"x").await.is_err());
    }
}
