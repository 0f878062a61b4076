use std::sync::Arc;
use tracing::info;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::s3::S3Storage;
use crate::modules::conversion::request::Engine;
use crate::modules::conversion::{ConverterHarness, HarnessSettings};
use crate::state::AppState;

/// Wires the gateway for `bucket` and the configured conversion engine.
pub fn create_state(config: AppConfig, bucket: &str) -> AppState {
    let storage = S3Storage::new(&config, bucket);

    let engine = Engine::new(config.engine, config.engine_binary());
    info!(engine = ?engine.kind, binary = %engine.binary.display(), "converter configured");

    let converter = ConverterHarness::new(
        engine,
        HarnessSettings {
            work_dir: config.work_dir.clone(),
            extraction_timeout: config.extraction_timeout,
            keep_failed_artifacts: config.keep_failed_artifacts,
        },
    );

    AppState::new(config, Arc::new(storage), Arc::new(converter))
}
