//! Harvest cycle orchestration.
//!
//! Each cycle lists candidate files, spawns one harvest task per file into a
//! [`JoinSet`], joins them all, records every successful offset and then
//! persists the offset table. Cycles never overlap: the timer uses
//! [`MissedTickBehavior::Delay`], so an overrunning cycle pushes the next
//! tick back.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::ClientConfig;
use crate::harvest::Harvester;
use crate::offsets::OffsetStore;
use crate::scanner::{self, FileLister};
use crate::transport::{HttpTransport, Transport};

/// Outcome counts for one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub discovered: usize,
    /// Harvests that returned an offset, including ones with nothing new.
    pub succeeded: usize,
    pub failed: usize,
    /// Bytes the offsets advanced by across all files.
    pub bytes_shipped: u64,
    pub persisted: bool,
}

pub struct Coordinator {
    lister: Box<dyn FileLister>,
    harvester: Arc<Harvester>,
    offsets: Arc<OffsetStore>,
    interval: Duration,
}

impl Coordinator {
    pub fn new(
        lister: Box<dyn FileLister>,
        harvester: Harvester,
        offsets: Arc<OffsetStore>,
        interval: Duration,
    ) -> Self {
        Self {
            lister,
            harvester: Arc::new(harvester),
            offsets,
            interval,
        }
    }

    /// Wires the lsof/directory lister and HTTP transport from config.
    pub fn from_config(config: &ClientConfig, offsets: Arc<OffsetStore>) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::from_config(config)?);
        Ok(Self::new(
            scanner::lister_for(config),
            Harvester::from_config(config, transport),
            offsets,
            config.interval(),
        ))
    }

    pub fn offsets(&self) -> &Arc<OffsetStore> {
        &self.offsets
    }

    /// Runs cycles on the configured interval until the task is dropped.
    ///
    /// The first cycle starts one interval after the call.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.interval.as_secs(),
            tracked = self.offsets.len(),
            "harvest loop started"
        );

        loop {
            ticker.tick().await;
            match self.run_cycle().await {
                Ok(report) => tracing::info!(
                    discovered = report.discovered,
                    succeeded = report.succeeded,
                    failed = report.failed,
                    bytes = report.bytes_shipped,
                    persisted = report.persisted,
                    "harvest cycle complete"
                ),
                Err(e) => tracing::error!(error = %format!("{:#}", e), "harvest cycle skipped"),
            }
        }
    }

    /// Runs one cycle.
    ///
    /// Returns an error only when listing fails, in which case no offset is
    /// touched. Per-file failures are counted in the report and leave that
    /// file's offset where it was.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let names = self.lister.list().await.context("Failed to list files")?;

        let mut report = CycleReport {
            discovered: names.len(),
            ..Default::default()
        };

        let mut tasks = JoinSet::new();
        let mut task_files = HashMap::new();
        for name in names {
            let start = self.offsets.get(&name).unwrap_or(0);
            let harvester = self.harvester.clone();
            let file = name.clone();
            let handle = tasks.spawn(async move {
                let result = harvester.harvest(&file, start).await;
                (file, start, result)
            });
            task_files.insert(handle.id(), name);
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((_, (file, start, Ok(next)))) => {
                    report.succeeded += 1;
                    report.bytes_shipped += next.saturating_sub(start);
                    self.offsets.set(&file, next);
                }
                Ok((_, (file, start, Err(e)))) => {
                    report.failed += 1;
                    tracing::warn!(
                        file = %file,
                        offset = start,
                        error = %format!("{:#}", e),
                        "harvest failed"
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    let file = task_files.get(&e.id()).map(String::as_str).unwrap_or("?");
                    tracing::error!(file = %file, error = %e, "harvest task aborted");
                }
            }
        }

        match self.offsets.persist() {
            Ok(()) => report.persisted = true,
            Err(e) => tracing::error!(
                path = %self.offsets.path().display(),
                error = %format!("{:#}", e),
                "failed to persist offsets"
            ),
        }

        Ok(report)
    }
}
