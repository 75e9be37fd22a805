use thiserror::Error;

/// Error taxonomy for the transcoding worker. Variants map directly onto the
/// retry/finalize decisions the Job Runner has to make, not onto call sites.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("webdav transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unsupported workspace scheme: {0}")]
    UnsupportedScheme(String),

    #[error("analyze failed: {0}")]
    Analyze(String),

    #[error("no compatible profile: {0}")]
    Profile(String),

    #[error("encoder failed ({0}): {1}")]
    Encode(String, String),

    #[error("job cancelled: {0}")]
    Cancelled(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("job row not owned by this worker anymore")]
    ConcurrencyLost,
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// How the Job Runner's retry combinator should treat a given error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Infrastructure hiccup: retry forever with exponential backoff.
    RetryUnbounded,
    /// Logical/application error: retry a bounded number of times.
    RetryBounded,
    /// Not retryable; caller must surface this as a terminal outcome.
    Fatal,
}

impl WorkerError {
    pub fn retry_class(&self) -> RetryClass {
        match self {
            WorkerError::Database(_) | WorkerError::Transport(_) => RetryClass::RetryUnbounded,
            WorkerError::ConcurrencyLost => RetryClass::Fatal,
            WorkerError::Analyze(_)
            | WorkerError::Profile(_)
            | WorkerError::Encode(_, _)
            | WorkerError::Validation(_)
            | WorkerError::Config(_)
            | WorkerError::UnsupportedScheme(_) => RetryClass::RetryBounded,
            WorkerError::Cancelled(_) => RetryClass::Fatal,
            WorkerError::Io(_) => RetryClass::RetryBounded,
        }
    }

    /// True for the one case the Job Runner treats as "not an error" (§7):
    /// a cooperative cancellation that re-queues the job rather than failing it.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WorkerError::Cancelled(_))
    }
}
