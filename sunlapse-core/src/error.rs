use thiserror::Error;

/// Error taxonomy of the pipeline. Per-frame kinds are recorded on frame
/// records and aggregated into `errors_by_kind`; run-level kinds terminate
/// the pass with their corresponding exit code.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("upstream unavailable: {0}")]
    Unavailable(String),

    #[error("invalid image: {0}")]
    InvalidImage(String),

    #[error("every fallback offset produced a duplicate: {0}")]
    DuplicateExhausted(String),

    #[error("composite failed: {0}")]
    Composite(String),

    #[error("encoder failed: {0}")]
    Encoder(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("another run holds the lock (pid {pid})")]
    LockBusy { pid: u32 },

    #[error("free disk space {available} below required floor {required}")]
    DiskFull { available: u64, required: u64 },

    #[error("run interrupted")]
    Interrupted,

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Stable label used to group errors in run-state counters.
    pub fn kind_label(&self) -> &'static str {
        match self {
            PipelineError::Unavailable(_) => "unavailable",
            PipelineError::InvalidImage(_) => "invalid-image",
            PipelineError::DuplicateExhausted(_) => "duplicate-exhausted",
            PipelineError::Composite(_) => "composite",
            PipelineError::Encoder(_) => "encoder",
            PipelineError::Storage(_) => "storage",
            PipelineError::Serialization(_) => "storage",
            PipelineError::LockBusy { .. } => "lock-busy",
            PipelineError::DiskFull { .. } => "disk-full",
            PipelineError::Interrupted => "interrupted",
            PipelineError::Internal(_) => "internal",
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
