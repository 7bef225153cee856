use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Route the collector serves envelopes on.
pub const REPORT_ROUTE: &str = "/loggather/report";

/// Largest chunk, in uncompressed bytes, a client may read and a collector
/// accepts by default.
pub const MAX_CHUNK_LIMIT: usize = 16 * 1024 * 1024;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub client: Option<ClientConfig>,
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    pub watch_dir: PathBuf,
    pub collector_url: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_chunk_limit")]
    pub chunk_limit: usize,
    #[serde(default = "default_offset_file")]
    pub offset_file: PathBuf,
    #[serde(default)]
    pub scan_mode: ScanMode,
    #[serde(default)]
    pub partial_line: PartialLinePolicy,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_interval_secs() -> u64 {
    10
}
fn default_chunk_limit() -> usize {
    100 * 1024
}
fn default_offset_file() -> PathBuf {
    PathBuf::from("./log_record_info.json")
}

impl ClientConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// How the scanner decides which files in the watched directory are candidates.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScanMode {
    /// Regular files currently held open by some process (`lsof +d`).
    #[default]
    Lsof,
    /// Every regular file directly inside the directory.
    Directory,
}

/// What to do with a read buffer that contains no line terminator at all.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PartialLinePolicy {
    /// Ship the whole unterminated buffer.
    #[default]
    Ship,
    /// Keep it back until a terminator arrives, unless the buffer filled
    /// the whole chunk limit.
    Withhold,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
    /// Upper bound on the inflated size of one chunk. Also sizes the request
    /// body limit.
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: usize,
}

fn default_max_chunk_bytes() -> usize {
    MAX_CHUNK_LIMIT
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./gathered")
}

impl Config {
    pub fn client(&self) -> Result<&ClientConfig> {
        self.client
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[client] section missing from config"))
    }

    pub fn server(&self) -> Result<&ServerConfig> {
        self.server
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("[server] section missing from config"))
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;

    if let Some(client) = &config.client {
        if client.watch_dir.as_os_str().is_empty() {
            anyhow::bail!("client.watch_dir must not be empty");
        }
        if client.interval_secs == 0 {
            anyhow::bail!("client.interval_secs must be > 0");
        }
        if client.chunk_limit == 0 {
            anyhow::bail!("client.chunk_limit must be > 0");
        }
        if client.chunk_limit > MAX_CHUNK_LIMIT {
            anyhow::bail!(
                "client.chunk_limit must be <= {} (collector default ceiling)",
                MAX_CHUNK_LIMIT
            );
        }
        if !(client.collector_url.starts_with("http://")
            || client.collector_url.starts_with("https://"))
        {
            anyhow::bail!(
                "client.collector_url must be an http(s) URL, got '{}'",
                client.collector_url
            );
        }
        if client.timeout_secs == Some(0) {
            anyhow::bail!("client.timeout_secs must be > 0 when set");
        }
    }

    if let Some(server) = &config.server {
        if server.bind.trim().is_empty() {
            anyhow::bail!("server.bind must not be empty");
        }
        if server.max_chunk_bytes == 0 {
            anyhow::bail!("server.max_chunk_bytes must be > 0");
        }
    }

    Ok(config)
}
