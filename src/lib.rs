//! # loggather
//!
//! Incrementally harvests growing log files from a directory and ships the
//! newly appended bytes, gzip-compressed, to a remote collector over HTTP.
//! Per-file read offsets are checkpointed to a JSON document after every
//! cycle so a restart resumes where the last successful send left off.
//!
//! ## Architecture
//!
//! ```text
//!  client                                          collector
//! ┌──────────┐   ┌───────────┐   ┌───────────┐    ┌──────────┐   ┌──────────┐
//! │ Scanner  │──▶│ Harvester │──▶│ Transport │───▶│  Server  │──▶│ Archive  │
//! │ lsof/dir │   │ read+gzip │   │ HTTP POST │    │  (axum)  │   │ append   │
//! └──────────┘   └─────┬─────┘   └───────────┘    └──────────┘   └──────────┘
//!                      │ new offsets
//!                      ▼
//!               ┌─────────────┐
//!               │ OffsetStore │  log_record_info.json
//!               └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! loggather --config ./conf/loggather.toml server         # collector
//! loggather --config ./conf/loggather.toml client         # harvester loop
//! loggather --config ./conf/loggather.toml client --once  # single cycle
//! loggather --config ./conf/loggather.toml offsets        # show checkpoints
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Offset record, chunk, and wire envelope types |
//! | [`offsets`] | Durable offset table |
//! | [`scanner`] | Candidate file discovery |
//! | [`harvest`] | Per-file read, trim, compress, send |
//! | [`transport`] | HTTP delivery to the collector |
//! | [`coordinator`] | Timed harvest cycles |
//! | [`archive`] | Collector-side append storage |
//! | [`server`] | Collector HTTP server |

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod harvest;
pub mod models;
pub mod offsets;
pub mod scanner;
pub mod server;
pub mod transport;
