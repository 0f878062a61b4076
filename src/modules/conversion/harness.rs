use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use super::archive::{self, ScratchDir};
use super::model::{ConversionResult, FailureReason};
use super::process::{self, ProcessOutcome};
use super::request::{ConversionRequest, EMPTY_IMPORT_EXIT_CODE, EMPTY_IMPORT_MARKER, Engine};

/// Anything that turns a source container into a binary glTF file.
///
/// Implementations never return an error: every failure is a tagged
/// [`ConversionResult`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Converter: Send + Sync {
    async fn convert(&self, input: &Path, output: &Path, timeout: Duration) -> ConversionResult;
}

#[derive(Debug, Clone)]
pub struct HarnessSettings {
    /// Parent of the per-conversion scratch directories.
    pub work_dir: PathBuf,
    pub extraction_timeout: Duration,
    /// Keep scratch directories of failed conversions for inspection.
    pub keep_failed_artifacts: bool,
}

pub struct ConverterHarness {
    engine: Engine,
    settings: HarnessSettings,
}

impl ConverterHarness {
    pub fn new(engine: Engine, settings: HarnessSettings) -> Self {
        Self { engine, settings }
    }

    async fn extract(&self, input: &Path, scratch: &Path) -> Result<PathBuf, (FailureReason, String)> {
        let container = input.to_path_buf();
        let dest = scratch.to_path_buf();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = cancel.clone();

        let mut unpack = tokio::task::spawn_blocking(move || {
            archive::extract_container(&container, &dest, &flag)
        });
        let waited = tokio::time::timeout(self.settings.extraction_timeout, &mut unpack).await;
        let extracted = match waited {
            Ok(Ok(Ok(count))) => count,
            Ok(Ok(Err(e))) => return Err((FailureReason::ExtractionError, e.to_string())),
            Ok(Err(join)) => {
                return Err((
                    FailureReason::ExtractionError,
                    format!("extraction task failed: {join}"),
                ));
            }
            Err(_) => {
                // The blocking task must be done writing before the scratch
                // directory is removed.
                cancel.store(true, Ordering::Relaxed);
                let _ = unpack.await;
                return Err((
                    FailureReason::ExtractionError,
                    format!(
                        "extraction exceeded {}s",
                        self.settings.extraction_timeout.as_secs()
                    ),
                ));
            }
        };
        info!(files = extracted, dir = %scratch.display(), "extracted container");

        match archive::find_scene_file(scratch) {
            Ok(Some(scene)) => {
                let size = std::fs::metadata(&scene).map(|m| m.len()).unwrap_or(0);
                info!(scene = %scene.display(), bytes = size, "found scene file");
                Ok(scene)
            }
            Ok(None) => {
                let contents = archive::list_files(scratch).unwrap_or_default();
                for item in &contents {
                    info!(item = %item.display(), "container entry");
                }
                Err((
                    FailureReason::NoSceneFileFound,
                    format!("no .usda or .usdc file among {} entries", contents.len()),
                ))
            }
            Err(e) => Err((FailureReason::ExtractionError, e.to_string())),
        }
    }

    fn classify(outcome: ProcessOutcome, output: &Path, limit: Duration) -> ConversionResult {
        let ProcessOutcome {
            status,
            lines,
            elapsed,
        } = outcome;

        let Some(status) = status else {
            return ConversionResult::failure(
                FailureReason::Timeout,
                format!("engine did not finish within {}s", limit.as_secs()),
                elapsed,
                lines,
            );
        };

        if status.code() == Some(EMPTY_IMPORT_EXIT_CODE)
            || lines.iter().any(|l| l.contains(EMPTY_IMPORT_MARKER))
        {
            return ConversionResult::failure(
                FailureReason::EmptyImport,
                "import produced no objects",
                elapsed,
                lines,
            );
        }

        if !status.success() {
            let tail = lines.last().cloned().unwrap_or_default();
            return ConversionResult::failure(
                FailureReason::UnexpectedEngineFailure,
                format!("engine exited with {status}: {tail}"),
                elapsed,
                lines,
            );
        }

        // Exit 0 is not proof of output; the engines are known to skip the
        // export on partial failures.
        match std::fs::metadata(output) {
            Ok(meta) if meta.len() > 0 => ConversionResult::success(meta.len(), elapsed, lines),
            Ok(_) => ConversionResult::failure(
                FailureReason::OutputNotProduced,
                format!("{} is empty", output.display()),
                elapsed,
                lines,
            ),
            Err(_) => ConversionResult::failure(
                FailureReason::OutputNotProduced,
                format!("{} was not created", output.display()),
                elapsed,
                lines,
            ),
        }
    }
}

#[async_trait]
impl Converter for ConverterHarness {
    async fn convert(&self, input: &Path, output: &Path, timeout: Duration) -> ConversionResult {
        let started = Instant::now();

        let mut scratch = match ScratchDir::create(&self.settings.work_dir) {
            Ok(dir) => dir,
            Err(e) => {
                return ConversionResult::failure(
                    FailureReason::ExtractionError,
                    format!("cannot create scratch directory: {e}"),
                    started.elapsed(),
                    Vec::new(),
                );
            }
        };

        let source = if self.engine.needs_scene_file() {
            match self.extract(input, scratch.path()).await {
                Ok(scene) => scene,
                Err((reason, detail)) => {
                    error!(input = %input.display(), %reason, %detail, "conversion failed before engine start");
                    if self.settings.keep_failed_artifacts {
                        scratch.retain();
                    }
                    return ConversionResult::failure(reason, detail, started.elapsed(), Vec::new());
                }
            }
        } else {
            input.to_path_buf()
        };

        // A stale artifact from an earlier attempt must not pass the size check.
        if let Err(e) = std::fs::remove_file(output) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!(output = %output.display(), error = %e, "could not clear previous output");
            }
        }

        let request = ConversionRequest {
            source,
            output: output.to_path_buf(),
        };
        let invocation = match self.engine.render(&request, scratch.path()) {
            Ok(invocation) => invocation,
            Err(e) => {
                return ConversionResult::failure(
                    FailureReason::UnexpectedEngineFailure,
                    format!("cannot prepare engine invocation: {e}"),
                    started.elapsed(),
                    Vec::new(),
                );
            }
        };

        info!(
            engine = %self.engine.binary.display(),
            source = %request.source.display(),
            timeout_secs = timeout.as_secs(),
            "starting conversion"
        );

        let mut result = match process::run_bounded(&invocation, timeout).await {
            Ok(outcome) => Self::classify(outcome, output, timeout),
            Err(e) => {
                let detail = if e.kind() == io::ErrorKind::NotFound {
                    format!("engine binary not found: {}", self.engine.binary.display())
                } else {
                    format!("cannot start engine: {e}")
                };
                ConversionResult::failure(
                    FailureReason::UnexpectedEngineFailure,
                    detail,
                    started.elapsed(),
                    Vec::new(),
                )
            }
        };
        result.elapsed = started.elapsed();

        if result.succeeded {
            info!(
                output = %output.display(),
                bytes = result.output_size_bytes,
                elapsed_ms = result.elapsed.as_millis() as u64,
                "conversion finished"
            );
        } else {
            error!(
                input = %input.display(),
                reason = ?result.failure_reason,
                detail = result.detail.as_deref().unwrap_or_default(),
                elapsed_ms = result.elapsed.as_millis() as u64,
                "conversion failed"
            );
            for line in &result.engine_output_lines {
                info!(engine = %line, "engine output (failed run)");
            }
            if self.settings.keep_failed_artifacts {
                scratch.retain();
            }
        }

        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::modules::conversion::archive::tests::write_container;
    use crate::modules::conversion::request::EngineKind;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::{TempDir, tempdir};

    /// Fake toolkit: a shell script invoked as
    /// `engine --background --python <script> -- <scene> <output>`.
    fn fake_engine(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-blender");
        std::fs::write(&path, format!("#!/bin/sh\nscene=\"$5\"\nout=\"$6\"\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn harness(work: &TempDir, binary: PathBuf, keep: bool) -> ConverterHarness {
        harness_with_extraction_limit(work, binary, keep, Duration::from_secs(10))
    }

    fn harness_with_extraction_limit(
        work: &TempDir,
        binary: PathBuf,
        keep: bool,
        extraction_timeout: Duration,
    ) -> ConverterHarness {
        ConverterHarness::new(
            Engine::new(EngineKind::Blender, binary),
            HarnessSettings {
                work_dir: work.path().join("scratch"),
                extraction_timeout,
                keep_failed_artifacts: keep,
            },
        )
    }

    fn scratch_entries(work: &TempDir) -> usize {
        std::fs::read_dir(work.path().join("scratch"))
            .map(|d| d.count())
            .unwrap_or(0)
    }

    fn container(work: &TempDir) -> PathBuf {
        let input = work.path().join("demo.usdz");
        write_container(&input, &[("demo.usda", b"#usda 1.0")]);
        input
    }

    #[tokio::test]
    async fn successful_conversion_cleans_scratch() {
        let work = tempdir().unwrap();
        let engine = fake_engine(
            work.path(),
            "echo \"[0.1s] Importing USD: $scene\"\nprintf glTF > \"$out\"\necho SUCCESS",
        );
        let input = container(&work);
        let output = work.path().join("demo.glb");

        let result = harness(&work, engine, false)
            .convert(&input, &output, Duration::from_secs(10))
            .await;

        assert!(result.succeeded, "{:?}", result.detail);
        assert_eq!(result.output_size_bytes, 4);
        assert!(result.engine_output_lines.iter().any(|l| l.ends_with("demo.usda")));
        assert_eq!(scratch_entries(&work), 0);
    }

    #[tokio::test]
    async fn exit_zero_without_output_is_not_success() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "echo done");
        let input = container(&work);
        let output = work.path().join("demo.glb");

        let result = harness(&work, engine, false)
            .convert(&input, &output, Duration::from_secs(10))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::OutputNotProduced));
    }

    #[tokio::test]
    async fn empty_output_is_not_success() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), ": > \"$out\"");
        let input = container(&work);
        let output = work.path().join("demo.glb");

        let result = harness(&work, engine, false)
            .convert(&input, &output, Duration::from_secs(10))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::OutputNotProduced));
    }

    #[tokio::test]
    async fn empty_import_is_classified() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "echo '[0.2s] ERROR: No objects imported from USD'\nexit 3");
        let input = container(&work);

        let result = harness(&work, engine, false)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::EmptyImport));
    }

    #[tokio::test]
    async fn nonzero_exit_is_unexpected_failure() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "echo 'Segmentation fault' 1>&2\nexit 139");
        let input = container(&work);

        let result = harness(&work, engine, false)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert_eq!(
            result.failure_reason,
            Some(FailureReason::UnexpectedEngineFailure)
        );
        assert!(result.detail.unwrap().contains("Segmentation fault"));
    }

    #[tokio::test]
    async fn overrunning_engine_times_out() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "sleep 30");
        let input = container(&work);

        let result = harness(&work, engine, false)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_millis(300))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::Timeout));
        assert!(result.elapsed < Duration::from_secs(10));
        assert_eq!(scratch_entries(&work), 0);
    }

    #[tokio::test]
    async fn container_without_scene_file() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "exit 0");
        let input = work.path().join("demo.usdz");
        write_container(&input, &[("texture.png", b"png")]);

        let result = harness(&work, engine, false)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::NoSceneFileFound));
    }

    #[tokio::test]
    async fn extraction_timeout_leaves_no_scratch_behind() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "exit 0");
        let input = work.path().join("demo.usdz");
        let names: Vec<String> = (0..3000).map(|i| format!("tex/{i:04}.png")).collect();
        let entries: Vec<(&str, &[u8])> = names
            .iter()
            .map(|n| (n.as_str(), &[0u8; 256][..]))
            .collect();
        write_container(&input, &entries);

        let result = harness_with_extraction_limit(&work, engine, false, Duration::from_millis(1))
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::ExtractionError));
        assert!(result.detail.unwrap().contains("exceeded"));
        // Give a straggling writer a chance to show up before checking.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(scratch_entries(&work), 0);
    }

    #[tokio::test]
    async fn malformed_container_is_extraction_error() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "exit 0");
        let input = work.path().join("demo.usdz");
        std::fs::write(&input, b"not a zip").unwrap();

        let result = harness(&work, engine, false)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert_eq!(result.failure_reason, Some(FailureReason::ExtractionError));
        assert_eq!(scratch_entries(&work), 0);
    }

    #[tokio::test]
    async fn failed_artifacts_retained_when_requested() {
        let work = tempdir().unwrap();
        let engine = fake_engine(work.path(), "exit 1");
        let input = container(&work);

        let result = harness(&work, engine, true)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert!(!result.succeeded);
        assert_eq!(scratch_entries(&work), 1);
    }

    #[tokio::test]
    async fn missing_engine_binary() {
        let work = tempdir().unwrap();
        let input = container(&work);

        let result = harness(&work, work.path().join("no-such-engine"), false)
            .convert(&input, &work.path().join("demo.glb"), Duration::from_secs(10))
            .await;

        assert_eq!(
            result.failure_reason,
            Some(FailureReason::UnexpectedEngineFailure)
        );
        assert!(result.detail.unwrap().contains("not found"));
    }
}
