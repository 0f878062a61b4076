use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::storage::s3::ObjectStore;
use crate::modules::conversion::Converter;
use crate::modules::pipeline::{Pipeline, PipelineSettings};

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub converter: Arc<dyn Converter>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        converter: Arc<dyn Converter>,
    ) -> Self {
        Self {
            config,
            storage,
            converter,
        }
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.storage.clone(),
            self.converter.clone(),
            PipelineSettings {
                conversion_timeout: self.config.conversion_timeout,
                delete_source_after: self.config.delete_source_after,
                large_file_warn_bytes: self.config.large_file_warn_bytes,
            },
        )
    }
}
