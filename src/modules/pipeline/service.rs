use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use super::error::PipelineError;
use super::model::{GLB_CONTENT_TYPE, PipelineOutcome, WorkItem};
use crate::infrastructure::ledger::processed::ProcessedLedger;
use crate::infrastructure::storage::s3::ObjectStore;
use crate::modules::conversion::{Converter, FailureReason};

const MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub conversion_timeout: Duration,
    pub delete_source_after: bool,
    pub large_file_warn_bytes: u64,
}

/// Removes the item's local input and output files when dropped, whichever
/// step the pipeline stopped at.
struct LocalFiles(Vec<PathBuf>);

impl Drop for LocalFiles {
    fn drop(&mut self) {
        for path in &self.0 {
            match std::fs::remove_file(path) {
                Ok(()) => info!("🧹 Removed local file {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("Failed to remove local file {}: {}", path.display(), e),
            }
        }
    }
}

/// The download → convert → upload → record → delete sequence shared by the
/// polling daemon and the event handler.
#[derive(Clone)]
pub struct Pipeline {
    store: Arc<dyn ObjectStore>,
    converter: Arc<dyn Converter>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        converter: Arc<dyn Converter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            converter,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Runs one item to completion. Each step short-circuits on failure; the
    /// local files are gone by the time this returns. When `ledger` is given
    /// the source key is recorded after a successful upload.
    pub async fn process(
        &self,
        item: &mut WorkItem,
        ledger: Option<&mut ProcessedLedger>,
    ) -> Result<PipelineOutcome, PipelineError> {
        let started = Instant::now();
        info!("Processing {}", item.source_key);

        if let Some(dir) = item.local_input_path.parent() {
            std::fs::create_dir_all(dir).map_err(PipelineError::Workspace)?;
        }
        let _cleanup = LocalFiles(vec![
            item.local_input_path.clone(),
            item.local_output_path.clone(),
        ]);

        // 1. Download
        info!("⬇️ Downloading {} from S3", item.source_key);
        let input_size = self
            .store
            .download(&item.source_key, &item.local_input_path)
            .await?;
        item.size_bytes = Some(input_size);
        info!("⬇️ Downloaded {} bytes ({:.2} MB)", input_size, input_size as f64 / MB);
        if input_size > self.settings.large_file_warn_bytes {
            warn!(
                "⚠️ Large input ({:.2} MB), conversion may take several minutes",
                input_size as f64 / MB
            );
        }

        // 2. Convert
        let result = self
            .converter
            .convert(
                &item.local_input_path,
                &item.local_output_path,
                self.settings.conversion_timeout,
            )
            .await;
        if !result.succeeded {
            let reason = result
                .failure_reason
                .unwrap_or(FailureReason::UnexpectedEngineFailure);
            return Err(PipelineError::Conversion {
                reason,
                detail: result.detail.unwrap_or_default(),
            });
        }

        // 3. Upload
        info!(
            "⬆️ Uploading {} ({:.2} MB)",
            item.derived_key,
            result.output_size_bytes as f64 / MB
        );
        self.store
            .upload(&item.local_output_path, &item.derived_key, GLB_CONTENT_TYPE)
            .await?;
        info!("⬆️ Uploaded {}", item.derived_key);

        // 4. Record
        if let Some(ledger) = ledger {
            ledger
                .record(&item.source_key)
                .map_err(PipelineError::Ledger)?;
        }

        // 5. Optional source removal; failure here never fails the item.
        if self.settings.delete_source_after {
            match self.store.delete(&item.source_key).await {
                Ok(()) => info!("🗑️ Deleted source object {}", item.source_key),
                Err(e) => warn!("Could not delete source object {}: {}", item.source_key, e),
            }
        }

        let elapsed = started.elapsed();
        info!(
            "✅ Processed {} -> {} in {:.1}s",
            item.source_key,
            item.derived_key,
            elapsed.as_secs_f64()
        );

        Ok(PipelineOutcome {
            input: item.source_key.clone(),
            output: item.derived_key.clone(),
            input_size,
            output_size: result.output_size_bytes,
            elapsed,
        })
    }
}
