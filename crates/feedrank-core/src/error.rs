use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Broad failure category, used by callers that branch on the kind of failure
/// rather than on the individual variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Execution,
    Registration,
    Persistence,
    Schema,
    Configuration,
}

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ScoreRejected,
    FunctionFailed,
    FunctionTimedOut,
    WorkerPoolUnavailable,
    ImplementationNotRegistered,
    AlgorithmNotFound,
    ArtifactIo,
    ArtifactCorrupt,
    ArtifactSchema,
    InvalidAlgorithm,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ScoreRejected => "E1001",
            Self::FunctionFailed => "E1002",
            Self::FunctionTimedOut => "E1003",
            Self::WorkerPoolUnavailable => "E1004",
            Self::ImplementationNotRegistered => "E2001",
            Self::AlgorithmNotFound => "E3001",
            Self::ArtifactIo => "E3002",
            Self::ArtifactCorrupt => "E3003",
            Self::ArtifactSchema => "E3004",
            Self::InvalidAlgorithm => "E4001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ScoreRejected => "Scoring function returned an invalid score",
            Self::FunctionFailed => "Scoring function failed",
            Self::FunctionTimedOut => "Scoring function timed out",
            Self::WorkerPoolUnavailable => "Ranking worker pool could not be started",
            Self::ImplementationNotRegistered => "Scoring implementation not registered",
            Self::AlgorithmNotFound => "Algorithm not found",
            Self::ArtifactIo => "Algorithm artifact I/O failure",
            Self::ArtifactCorrupt => "Algorithm artifact corrupt",
            Self::ArtifactSchema => "Algorithm artifact has an unexpected shape",
            Self::InvalidAlgorithm => "Invalid algorithm definition",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ScoreRejected => Some("Scoring functions must return a finite number in [-100, 100]."),
            Self::FunctionFailed => None,
            Self::FunctionTimedOut => {
                Some("Raise ranking.function_timeout_ms or make the function cheaper.")
            }
            Self::WorkerPoolUnavailable => Some("Lower ranking.workers and retry."),
            Self::ImplementationNotRegistered => {
                Some("Register the implementation before loading algorithms that use it.")
            }
            Self::AlgorithmNotFound => Some("Run `feedrank list` to see saved algorithms."),
            Self::ArtifactIo => Some("Check disk space and permissions on the store directory."),
            Self::ArtifactCorrupt | Self::ArtifactSchema => {
                Some("Re-save the algorithm to regenerate its artifact.")
            }
            Self::InvalidAlgorithm => {
                Some("Give every function a unique display name and a finite weight.")
            }
        }
    }

    /// Category this code belongs to.
    #[must_use]
    pub const fn kind(self) -> ErrorKind {
        match self {
            Self::ScoreRejected => ErrorKind::Validation,
            Self::FunctionFailed | Self::FunctionTimedOut | Self::WorkerPoolUnavailable => {
                ErrorKind::Execution
            }
            Self::ImplementationNotRegistered => ErrorKind::Registration,
            Self::AlgorithmNotFound | Self::ArtifactIo | Self::ArtifactCorrupt => {
                ErrorKind::Persistence
            }
            Self::ArtifactSchema => ErrorKind::Schema,
            Self::InvalidAlgorithm => ErrorKind::Configuration,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Why a function's raw output was rejected.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum InvalidScore {
    #[error("non-numeric result ({0})")]
    NonNumeric(f64),
    #[error("out of range ({0} not in [-100, 100])")]
    OutOfRange(f64),
}

/// How a function's implementation failed to produce a value.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionFailure {
    #[error("{0:#}")]
    Failed(#[source] anyhow::Error),
    #[error("panicked: {0}")]
    Panicked(String),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Algorithm invariant violated at construction time.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InvalidAlgorithm {
    #[error("algorithm name is empty")]
    EmptyName,
    #[error("algorithm has no scoring functions")]
    NoFunctions,
    #[error("display name `{0}` is used by more than one function")]
    DuplicateDisplayName(String),
    #[error("weight for `{display_name}` is not finite ({weight})")]
    NonFiniteWeight { display_name: String, weight: f64 },
}

/// Errors produced by scoring, ranking and persistence.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("function `{function}`{}: {reason}", item_suffix(.item.as_deref()))]
    Validation {
        function: String,
        item: Option<String>,
        reason: InvalidScore,
    },

    #[error("function `{function}`{}: {cause}", item_suffix(.item.as_deref()))]
    Execution {
        function: String,
        item: Option<String>,
        #[source]
        cause: ExecutionFailure,
    },

    #[error("failed to start a pool of {workers} ranking workers: {source}")]
    WorkerPool {
        workers: usize,
        #[source]
        source: rayon::ThreadPoolBuildError,
    },

    #[error("implementation `{key}` (function `{function}`) is not registered")]
    Registration { key: String, function: String },

    #[error("no saved algorithm named `{name}`")]
    NotFound { name: String },

    #[error("artifact I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact at {} is corrupt: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("artifact at {} has an unexpected shape: {reason}", .path.display())]
    Schema { path: PathBuf, reason: String },

    #[error("algorithm `{algorithm}` is invalid: {reason}")]
    Configuration {
        algorithm: String,
        reason: InvalidAlgorithm,
    },
}

impl Error {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::ScoreRejected,
            Self::Execution {
                cause: ExecutionFailure::TimedOut(_),
                ..
            } => ErrorCode::FunctionTimedOut,
            Self::Execution { .. } => ErrorCode::FunctionFailed,
            Self::WorkerPool { .. } => ErrorCode::WorkerPoolUnavailable,
            Self::Registration { .. } => ErrorCode::ImplementationNotRegistered,
            Self::NotFound { .. } => ErrorCode::AlgorithmNotFound,
            Self::Io { .. } => ErrorCode::ArtifactIo,
            Self::Corrupt { .. } => ErrorCode::ArtifactCorrupt,
            Self::Schema { .. } => ErrorCode::ArtifactSchema,
            Self::Configuration { .. } => ErrorCode::InvalidAlgorithm,
        }
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.code().kind()
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Whether repeating the same call could plausibly succeed.
    ///
    /// Definition problems (bad algorithms, bad artifacts, missing
    /// registrations, rejected scores) are never retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Execution { .. } | Self::WorkerPool { .. } | Self::Io { .. }
        )
    }

    /// Name of the scoring function involved, if any.
    #[must_use]
    pub fn function(&self) -> Option<&str> {
        match self {
            Self::Validation { function, .. }
            | Self::Execution { function, .. }
            | Self::Registration { function, .. } => Some(function),
            _ => None,
        }
    }

    /// Identifier of the item being scored when the error occurred, if known.
    #[must_use]
    pub fn item(&self) -> Option<&str> {
        match self {
            Self::Validation { item, .. } | Self::Execution { item, .. } => item.as_deref(),
            _ => None,
        }
    }

    /// Attach the identifier of the item being scored.
    #[must_use]
    pub fn for_item(self, item_id: &str) -> Self {
        match self {
            Self::Validation {
                function, reason, ..
            } => Self::Validation {
                function,
                item: Some(item_id.to_string()),
                reason,
            },
            Self::Execution {
                function, cause, ..
            } => Self::Execution {
                function,
                item: Some(item_id.to_string()),
                cause,
            },
            other => other,
        }
    }
}

fn item_suffix(item: Option<&str>) -> String {
    item.map_or_else(String::new, |id| format!(" on item `{id}`"))
}
