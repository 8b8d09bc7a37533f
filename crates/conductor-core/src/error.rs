use uuid::Uuid;

/// Top-level error type for the Conductor engine.
///
/// Each variant corresponds to one failure class of a run. Whether a failure
/// is retried, recorded as evidence or terminates the run is decided by the
/// orchestrator; see [`ConductorError::is_transient`].
#[derive(Debug, thiserror::Error)]
pub enum ConductorError {
    /// The reasoning provider failed or returned unusable output.
    #[error("Provider error: {0}")]
    Provider(String),

    /// A worker was invoked for a subtask it does not own, or with no
    /// subtask at the cursor.
    #[error("Misrouted task at {node}: {detail}")]
    MisroutedTask {
        /// Node that detected the mismatch.
        node: String,
        /// What was found at the cursor.
        detail: String,
    },

    /// A delta was applied against an outdated version of the run.
    #[error("Stale run {run_id}: expected version {expected}, found {actual}")]
    StaleRun {
        /// The run being updated.
        run_id: Uuid,
        /// Version the caller read.
        expected: u64,
        /// Version currently stored.
        actual: u64,
    },

    /// A tool invocation failed.
    #[error("Tool '{tool}' failed: {reason}")]
    ToolExecution {
        /// Tool name.
        tool: String,
        /// Failure description.
        reason: String,
    },

    /// A node did not finish within its time budget.
    #[error("Node {node} timed out after {secs}s")]
    NodeTimeout {
        /// Node name.
        node: String,
        /// Budget in seconds.
        secs: u64,
    },

    /// The run was cancelled by the caller.
    #[error("Run {0} was cancelled")]
    Cancelled(Uuid),

    /// No run with this id exists.
    #[error("Run {0} not found")]
    RunNotFound(Uuid),

    /// A delta would break the run state invariants.
    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    /// Checkpoint persistence failed.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An error from an outbound HTTP request.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConductorError {
    /// Failures worth retrying or degrading into a failed subtask rather than
    /// aborting the run.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConductorError::Provider(_) | ConductorError::Http(_) | ConductorError::NodeTimeout { .. }
        )
    }
}

/// A convenience `Result` alias using [`ConductorError`].
pub type ConductorResult<T> = Result<T, ConductorError>;
