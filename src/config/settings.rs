use crate::config::env::{self, EnvKey};
use crate::modules::conversion::request::EngineKind;
use std::path::PathBuf;
use std::time::Duration;

fn megabytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Absent in event mode, where the bucket comes from the notification.
    pub bucket: Option<String>,
    pub prefix: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: String,
    pub secret_key: String,
    pub session_token: Option<String>,
    pub work_dir: PathBuf,
    pub log_dir: Option<PathBuf>,
    pub check_interval: Duration,
    pub item_delay: Duration,
    pub conversion_timeout: Duration,
    pub extraction_timeout: Duration,
    pub engine: EngineKind,
    pub blender_bin: PathBuf,
    pub gltf_transform_bin: PathBuf,
    pub delete_source_after: bool,
    pub keep_failed_artifacts: bool,
    pub mark_failed_processed: bool,
    pub large_file_warn_bytes: u64,
}

impl AppConfig {
    pub fn new() -> Result<Self, std::env::VarError> {
        Ok(Self {
            bucket: env::get_opt(EnvKey::Bucket),
            prefix: env::get_or(EnvKey::Prefix, "staging/floor-plan/"),
            region: env::get_or(EnvKey::Region, "ap-southeast-1"),
            endpoint: env::get_opt(EnvKey::Endpoint),
            access_key: env::get(EnvKey::AccessKey)?,
            secret_key: env::get(EnvKey::SecretKey)?,
            session_token: env::get_opt(EnvKey::SessionToken),
            work_dir: PathBuf::from(env::get_or(EnvKey::WorkDir, "/tmp/usdz-converter")),
            log_dir: env::get_opt(EnvKey::LogDir).map(PathBuf::from),
            check_interval: Duration::from_secs(env::get_parsed(EnvKey::CheckInterval, 30)),
            item_delay: Duration::from_millis(env::get_parsed(EnvKey::ItemDelay, 2000)),
            conversion_timeout: Duration::from_secs(env::get_parsed(
                EnvKey::ConversionTimeout,
                1800,
            )),
            extraction_timeout: Duration::from_secs(env::get_parsed(
                EnvKey::ExtractionTimeout,
                60,
            )),
            engine: env::get_parsed(EnvKey::Engine, EngineKind::Blender),
            blender_bin: PathBuf::from(env::get_or(EnvKey::BlenderBin, "blender")),
            gltf_transform_bin: PathBuf::from(env::get_or(
                EnvKey::GltfTransformBin,
                "gltf-transform",
            )),
            delete_source_after: env::get_flag(EnvKey::DeleteSourceAfter, false),
            keep_failed_artifacts: env::get_flag(EnvKey::KeepFailedArtifacts, false),
            mark_failed_processed: env::get_flag(EnvKey::MarkFailedProcessed, true),
            large_file_warn_bytes: megabytes(env::get_parsed(EnvKey::LargeFileWarnMb, 100)),
        })
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.work_dir.join("processed.txt")
    }

    pub fn engine_binary(&self) -> PathBuf {
        match self.engine {
            EngineKind::Blender => self.blender_bin.clone(),
            EngineKind::GltfTransform => self.gltf_transform_bin.clone(),
        }
    }
}
