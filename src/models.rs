//! Core data models shared by the client and the collector.
//!
//! [`Envelope`] is the only type that crosses the wire; the others live
//! entirely inside one process.

use serde::{Deserialize, Serialize};

/// Harvest progress for one tracked file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetRecord {
    /// Base name of the source file.
    pub file_name: String,
    /// Next unread byte position.
    pub offset: u64,
}

/// Bytes read from one file in one cycle, after trailing partial-line trimming.
#[derive(Debug, Clone)]
pub struct HarvestChunk {
    pub file_name: String,
    pub raw_bytes: Vec<u8>,
    /// Offset the read started at.
    pub offset_base: u64,
    /// Number of bytes kept, which is what the offset advances by.
    pub bytes_consumed: u64,
}

impl HarvestChunk {
    pub fn next_offset(&self) -> u64 {
        self.offset_base + self.bytes_consumed
    }
}

/// Wire container pairing a file name with its gzip-compressed chunk.
///
/// The payload travels as standard base64 inside JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "FileName")]
    pub file_name: String,
    #[serde(rename = "LogInfoGzip", with = "base64_bytes")]
    pub payload: Vec<u8>,
}

/// Collector response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse<T> {
    pub status: Status,
    pub data: Option<T>,
    pub desc: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    #[serde(rename = "OK")]
    Ok,
    Error,
}

/// Result data returned for an accepted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportReceipt {
    pub file_name: String,
    pub bytes_written: u64,
}

mod base64_bytes {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
