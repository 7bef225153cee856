//! Durable per-file read offsets.
//!
//! The table lives in memory behind a mutex and is written back as a single
//! JSON document after every harvest cycle:
//!
//! ```json
//! { "data": { "app.log": 4096, "worker.log": 120 } }
//! ```
//!
//! Writes go to a sibling temporary file which is then renamed over the
//! document, so a crash mid-write leaves the previous checkpoint intact.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::OffsetRecord;

#[derive(Debug, Default, Serialize, Deserialize)]
struct OffsetDocument {
    #[serde(default)]
    data: Option<BTreeMap<String, u64>>,
}

/// File name → next unread byte offset.
#[derive(Debug)]
pub struct OffsetStore {
    path: PathBuf,
    table: Mutex<BTreeMap<String, u64>>,
}

impl OffsetStore {
    /// Loads the document at `path`.
    ///
    /// A missing or empty file yields an empty table. Content that does not
    /// parse is an error; callers treat it as fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let table = match fs::read(&path) {
            Ok(buf) if buf.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(buf) => {
                let doc: OffsetDocument = serde_json::from_slice(&buf).with_context(|| {
                    format!("Malformed offset document: {}", path.display())
                })?;
                doc.data.unwrap_or_default()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read offset document: {}", path.display()))
            }
        };

        Ok(Self {
            path,
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, file_name: &str) -> Option<u64> {
        self.table().get(file_name).copied()
    }

    pub fn set(&self, file_name: &str, offset: u64) {
        self.table().insert(file_name.to_string(), offset);
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// All records, ordered by file name.
    pub fn records(&self) -> Vec<OffsetRecord> {
        self.table()
            .iter()
            .map(|(file_name, offset)| OffsetRecord {
                file_name: file_name.clone(),
                offset: *offset,
            })
            .collect()
    }

    /// Writes the whole table back to the document.
    pub fn persist(&self) -> Result<()> {
        let doc = OffsetDocument {
            data: Some(self.table().clone()),
        };
        atomic_write(&self.path, &doc)
    }

    fn table(&self) -> MutexGuard<'_, BTreeMap<String, u64>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn atomic_write(path: &Path, doc: &OffsetDocument) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create offset directory: {}", parent.display())
            })?;
        }
    }

    let temp_path = path.with_extension(format!("tmp.{}", std::process::id()));

    let file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {}", temp_path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, doc).context("Failed to serialize offsets")?;
    writer.flush().context("Failed to flush offsets")?;
    writer
        .get_ref()
        .sync_all()
        .context("Failed to sync offsets")?;
    drop(writer);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to replace offset document: {}", path.display()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_missing_document_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = OffsetStore::load(tmp.path().join("offsets.json")).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.get("app.log"), None);
    }

    #[test]
    fn test_empty_document_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.json");
        fs::write(&path, "").unwrap();
        assert!(OffsetStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_document_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.json");
        fs::write(&path, "{\"data\": [1, 2").unwrap();
        let err = OffsetStore::load(&path).unwrap_err();
        assert!(err.to_string().contains("Malformed"));
    }

    #[test]
    fn test_negative_offset_is_malformed() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.json");
        fs::write(&path, r#"{"data":{"app.log":-3}}"#).unwrap();
        assert!(OffsetStore::load(&path).is_err());
    }

    #[test]
    fn test_null_data_is_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.json");
        fs::write(&path, r#"{"data":null}"#).unwrap();
        assert!(OffsetStore::load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_persist_then_reload() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.json");

        let store = OffsetStore::load(&path).unwrap();
        store.set("app.log", 4);
        store.set("worker.log", 120);
        store.persist().unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert_eq!(raw, r#"{"data":{"app.log":4,"worker.log":120}}"#);

        let reloaded = OffsetStore::load(&path).unwrap();
        assert_eq!(reloaded.get("app.log"), Some(4));
        assert_eq!(reloaded.get("worker.log"), Some(120));
    }

    #[test]
    fn test_persist_overwrites_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("offsets.json");
        fs::write(&path, r#"{"data":{"old.log":99,"app.log":1}}"#).unwrap();

        let store = OffsetStore::load(&path).unwrap();
        store.set("app.log", 50);
        store.persist().unwrap();

        let reloaded = OffsetStore::load(&path).unwrap();
        assert_eq!(reloaded.get("app.log"), Some(50));
        assert_eq!(reloaded.get("old.log"), Some(99));

        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_persist_creates_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("state").join("offsets.json");
        let store = OffsetStore::load(&path).unwrap();
        store.set("a.log", 1);
        store.persist().unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_concurrent_set_on_distinct_keys() {
        let tmp = TempDir::new().unwrap();
        let store = Arc::new(OffsetStore::load(tmp.path().join("o.json")).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..100u64 {
                        store.set(&format!("file{}.log", i), n);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.len(), 8);
        for i in 0..8 {
            assert_eq!(store.get(&format!("file{}.log", i)), Some(99));
        }
    }

    #[test]
    fn test_records_sorted_by_name() {
        let tmp = TempDir::new().unwrap();
        let store = OffsetStore::load(tmp.path().join("o.json")).unwrap();
        store.set("b.log", 2);
        store.set("a.log", 1);
        let names: Vec<_> = store.records().into_iter().map(|r| r.file_name).collect();
        assert_eq!(names, vec!["a.log", "b.log"]);
    }
}
