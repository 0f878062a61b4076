use crate::infrastructure::storage::s3::StorageError;
use crate::modules::conversion::FailureReason;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("transfer failed: {0}")]
    Transfer(#[from] StorageError),

    #[error("conversion failed ({reason}): {detail}")]
    Conversion {
        reason: FailureReason,
        detail: String,
    },

    #[error("cannot update processed ledger: {0}")]
    Ledger(#[source] std::io::Error),

    #[error("cannot prepare local workspace: {0}")]
    Workspace(#[source] std::io::Error),
}

impl PipelineError {
    /// Stable tag used in logs and handler payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Transfer(_) => "TransferError",
            PipelineError::Conversion { reason, .. } => reason.as_str(),
            PipelineError::Ledger(_) => "LedgerError",
            PipelineError::Workspace(_) => "WorkspaceError",
        }
    }
}
