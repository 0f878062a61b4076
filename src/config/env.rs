use std::env;
use std::str::FromStr;

pub enum EnvKey {
    Bucket,
    Prefix,
    Region,
    Endpoint,
    AccessKey,
    SecretKey,
    SessionToken,
    WorkDir,
    LogDir,
    CheckInterval,
    ItemDelay,
    ConversionTimeout,
    ExtractionTimeout,
    Engine,
    BlenderBin,
    GltfTransformBin,
    DeleteSourceAfter,
    KeepFailedArtifacts,
    MarkFailedProcessed,
    LargeFileWarnMb,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::Bucket => "S3_BUCKET",
            EnvKey::Prefix => "S3_PREFIX",
            EnvKey::Region => "AWS_REGION",
            EnvKey::Endpoint => "S3_ENDPOINT",
            EnvKey::AccessKey => "AWS_ACCESS_KEY_ID",
            EnvKey::SecretKey => "AWS_SECRET_ACCESS_KEY",
            EnvKey::SessionToken => "AWS_SESSION_TOKEN",
            EnvKey::WorkDir => "CONVERTER_WORK_DIR",
            EnvKey::LogDir => "CONVERTER_LOG_DIR",
            EnvKey::CheckInterval => "CHECK_INTERVAL_SECS",
            EnvKey::ItemDelay => "ITEM_DELAY_MS",
            EnvKey::ConversionTimeout => "CONVERSION_TIMEOUT_SECS",
            EnvKey::ExtractionTimeout => "EXTRACTION_TIMEOUT_SECS",
            EnvKey::Engine => "CONVERTER_ENGINE",
            EnvKey::BlenderBin => "BLENDER_BIN",
            EnvKey::GltfTransformBin => "GLTF_TRANSFORM_BIN",
            EnvKey::DeleteSourceAfter => "DELETE_SOURCE_AFTER",
            EnvKey::KeepFailedArtifacts => "KEEP_FAILED_ARTIFACTS",
            EnvKey::MarkFailedProcessed => "MARK_FAILED_PROCESSED",
            EnvKey::LargeFileWarnMb => "LARGE_FILE_WARN_MB",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_opt(key: EnvKey) -> Option<String> {
    env::var(key.as_str()).ok().filter(|v| !v.trim().is_empty())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => val.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

pub fn get_flag(key: EnvKey, default: bool) -> bool {
    get(key)
        .ok()
        .and_then(|val| parse_flag(&val))
        .unwrap_or(default)
}

/// Accepts the usual shell spellings of a boolean.
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
