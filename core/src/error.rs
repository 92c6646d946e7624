use thiserror::Error;

/// Errors raised while deciding on or carrying out an update.
#[derive(Debug, Error)]
pub enum UpdaterError {
    /// Policy or host values that make the decision meaningless.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// A step that is not allowed to fail exited unsuccessfully.
    #[error("step '{step}' failed: {reason}")]
    StepFailed {
        /// Step name as listed in the plan.
        step: String,
        /// Exit status or spawn error.
        reason: String,
    },
}

/// Result alias over [`UpdaterError`].
pub type Result<T> = std::result::Result<T, UpdaterError>;
