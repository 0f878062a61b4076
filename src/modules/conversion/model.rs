use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Why a conversion did not produce a usable artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureReason {
    ExtractionError,
    NoSceneFileFound,
    EmptyImport,
    Timeout,
    OutputNotProduced,
    UnexpectedEngineFailure,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::ExtractionError => "ExtractionError",
            FailureReason::NoSceneFileFound => "NoSceneFileFound",
            FailureReason::EmptyImport => "EmptyImport",
            FailureReason::Timeout => "Timeout",
            FailureReason::OutputNotProduced => "OutputNotProduced",
            FailureReason::UnexpectedEngineFailure => "UnexpectedEngineFailure",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one harness invocation, consumed immediately by the pipeline.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub succeeded: bool,
    pub output_size_bytes: u64,
    pub elapsed: Duration,
    pub engine_output_lines: Vec<String>,
    pub failure_reason: Option<FailureReason>,
    pub detail: Option<String>,
}

impl ConversionResult {
    pub fn success(output_size_bytes: u64, elapsed: Duration, lines: Vec<String>) -> Self {
        Self {
            succeeded: true,
            output_size_bytes,
            elapsed,
            engine_output_lines: lines,
            failure_reason: None,
            detail: None,
        }
    }

    pub fn failure(
        reason: FailureReason,
        detail: impl Into<String>,
        elapsed: Duration,
        lines: Vec<String>,
    ) -> Self {
        Self {
            succeeded: false,
            output_size_bytes: 0,
            elapsed,
            engine_output_lines: lines,
            failure_reason: Some(reason),
            detail: Some(detail.into()),
        }
    }
}
