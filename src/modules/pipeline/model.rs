use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Extension of the published artifacts.
pub const TARGET_EXTENSION: &str = "glb";

/// Content type attached to every uploaded artifact.
pub const GLB_CONTENT_TYPE: &str = "model/gltf-binary";

/// One conversion job, keyed by the source object path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub source_key: String,
    pub derived_key: String,
    pub local_input_path: PathBuf,
    pub local_output_path: PathBuf,
    /// Filled in once the download completes.
    pub size_bytes: Option<u64>,
}

impl WorkItem {
    /// Local files are named after the original file so logs and leftovers
    /// stay recognisable.
    pub fn new(source_key: &str, local_dir: &Path) -> Self {
        let file_name = source_key
            .rsplit('/')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("input.usdz");

        Self {
            source_key: source_key.to_string(),
            derived_key: derive_key(source_key),
            local_input_path: local_dir.join(file_name),
            local_output_path: local_dir.join(derive_key(file_name)),
            size_bytes: None,
        }
    }
}

/// Replaces the extension of the final path segment with `.glb`.
pub fn derive_key(key: &str) -> String {
    let name_start = key.rfind('/').map(|i| i + 1).unwrap_or(0);
    match key[name_start..].rfind('.') {
        Some(dot) if dot > 0 => format!("{}.{TARGET_EXTENSION}", &key[..name_start + dot]),
        _ => format!("{key}.{TARGET_EXTENSION}"),
    }
}

/// Summary of one successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineOutcome {
    pub input: String,
    pub output: String,
    pub input_size: u64,
    pub output_size: u64,
    #[serde(skip)]
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_key_replaces_extension() {
        assert_eq!(
            derive_key("staging/floor-plan/demo.usdz"),
            "staging/floor-plan/demo.glb"
        );
        assert_eq!(derive_key("models/A.USDZ"), "models/A.glb");
        assert_eq!(derive_key("models/v1.2/scan.final.usdz"), "models/v1.2/scan.final.glb");
        assert_eq!(derive_key("models/v1.2/scan"), "models/v1.2/scan.glb");
    }

    #[test]
    fn local_paths_keep_original_file_name() {
        let item = WorkItem::new("staging/floor-plan/demo.usdz", Path::new("/tmp/work"));

        assert_eq!(item.derived_key, "staging/floor-plan/demo.glb");
        assert_eq!(item.local_input_path, PathBuf::from("/tmp/work/demo.usdz"));
        assert_eq!(item.local_output_path, PathBuf::from("/tmp/work/demo.glb"));
        assert_eq!(item.size_bytes, None);
    }
}
