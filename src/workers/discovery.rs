use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::infrastructure::ledger::processed::ProcessedLedger;
use crate::modules::pipeline::{Pipeline, PipelineError, WorkItem};

#[derive(Debug, Clone)]
pub struct DiscoverySettings {
    pub bucket: String,
    pub prefix: String,
    pub check_interval: Duration,
    pub item_delay: Duration,
    /// Record failed keys too, so a poison item is not retried every pass.
    pub mark_failed_processed: bool,
    /// Where downloaded inputs and converted outputs live while in flight.
    pub work_dir: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Polling,
    Sleeping,
    Stopped,
}

/// Counts for one list-and-dispatch pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub listed: usize,
    pub already_processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Polling front end: lists the prefix, diffs against the ledger and feeds
/// unseen keys through the pipeline one at a time.
pub struct DiscoveryWorker {
    pipeline: Pipeline,
    ledger: ProcessedLedger,
    /// Keys the ledger cannot store. Dispatched at most once per process.
    unrecordable: HashSet<String>,
    settings: DiscoverySettings,
    state: WorkerState,
}

impl DiscoveryWorker {
    pub fn new(pipeline: Pipeline, ledger: ProcessedLedger, settings: DiscoverySettings) -> Self {
        Self {
            pipeline,
            ledger,
            unrecordable: HashSet::new(),
            settings,
            state: WorkerState::Sleeping,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn ledger(&self) -> &ProcessedLedger {
        &self.ledger
    }

    fn is_settled(&self, key: &str) -> bool {
        self.ledger.contains(key) || self.unrecordable.contains(key)
    }

    /// Runs until `shutdown` fires. An item already in the pipeline is always
    /// finished before the loop exits.
    pub async fn run(mut self, shutdown: CancellationToken) -> ProcessedLedger {
        info!(
            "🔍 Discovery worker watching s3://{}/{} every {}s",
            self.settings.bucket,
            self.settings.prefix,
            self.settings.check_interval.as_secs()
        );

        while !shutdown.is_cancelled() {
            self.state = WorkerState::Polling;
            match self.run_pass(&shutdown).await {
                Ok(report) if report.succeeded + report.failed > 0 => {
                    info!(
                        "📋 Pass complete: {} succeeded, {} failed",
                        report.succeeded, report.failed
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    error!("❌ Discovery pass aborted, pausing for a full interval: {}", e);
                }
            }

            self.state = WorkerState::Sleeping;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.check_interval) => {}
            }
        }

        self.state = WorkerState::Stopped;
        info!("🛑 Discovery worker stopped");
        self.ledger
    }

    /// One list-and-dispatch pass. A listing failure degrades to an empty
    /// pass; per-item failures are logged and counted. Only a failure to
    /// write the ledger escapes.
    pub async fn run_pass(&mut self, shutdown: &CancellationToken) -> Result<PassReport, PipelineError> {
        let mut report = PassReport::default();

        let keys = match self.pipeline.store().list(&self.settings.prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                warn!("⚠️ Listing failed, retrying next interval: {}", e);
                return Ok(report);
            }
        };
        report.listed = keys.len();

        let pending: Vec<String> = keys
            .into_iter()
            .filter(|key| !self.is_settled(key))
            .collect();
        report.already_processed = report.listed - pending.len();

        if pending.is_empty() {
            return Ok(report);
        }
        info!("📦 Found {} new source file(s)", pending.len());

        for (index, key) in pending.iter().enumerate() {
            if shutdown.is_cancelled() {
                info!("Shutdown requested, leaving {} item(s) for later", pending.len() - index);
                break;
            }
            if index > 0 && !self.settings.item_delay.is_zero() {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(self.settings.item_delay) => {}
                }
            }

            let recordable = ProcessedLedger::accepts(key);
            if !recordable {
                error!(
                    "❌ Key {:?} cannot be stored in the processed ledger, dispatching it once for this run only",
                    key
                );
                self.unrecordable.insert(key.clone());
            }

            let mut item = WorkItem::new(key, &self.settings.work_dir);
            let ledger = if recordable { Some(&mut self.ledger) } else { None };
            match self.pipeline.process(&mut item, ledger).await {
                Ok(_) => report.succeeded += 1,
                Err(e @ PipelineError::Ledger(_)) => return Err(e),
                Err(e) => {
                    report.failed += 1;
                    error!(
                        "❌ Failed to process {} ({}, {} bytes): {}",
                        key,
                        e.kind(),
                        item.size_bytes.unwrap_or(0),
                        e
                    );
                    if self.settings.mark_failed_processed && recordable {
                        self.ledger.record(key).map_err(PipelineError::Ledger)?;
                        warn!("Marked failed item {} as processed; use `convert` to retry it", key);
                    }
                }
            }
        }

        Ok(report)
    }
}
