use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Machine-readable error codes for agent-friendly decision making.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigParseError,
    IssueNotFound,
    InvalidEvent,
    SelfLink,
    EventParseFailed,
    DiskFull,
    PermissionDenied,
    LockContention,
    CorruptLog,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::ConfigParseError => "E1002",
            Self::IssueNotFound => "E2001",
            Self::InvalidEvent => "E2005",
            Self::SelfLink => "E2006",
            Self::EventParseFailed => "E3001",
            Self::CorruptLog => "E3003",
            Self::DiskFull => "E5001",
            Self::LockContention => "E5002",
            Self::PermissionDenied => "E5003",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::ConfigParseError => "Config file parse error",
            Self::IssueNotFound => "Issue not found",
            Self::InvalidEvent => "Event rejected by validation",
            Self::SelfLink => "Link endpoints are identical",
            Self::EventParseFailed => "Event log line could not be parsed",
            Self::CorruptLog => "Event log or snapshot is corrupt",
            Self::DiskFull => "Disk full",
            Self::LockContention => "Lock contention",
            Self::PermissionDenied => "Permission denied",
        }
    }

    /// Optional remediation hint that can be surfaced to operators and agents.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::ConfigParseError => Some("Fix syntax in config.toml and retry."),
            Self::IssueNotFound | Self::InvalidEvent => None,
            Self::SelfLink => Some("Links must connect two different issues."),
            Self::EventParseFailed => {
                Some("Run integrity verification to locate the bad line, then repair the log.")
            }
            Self::CorruptLog => Some("Run integrity verification; delete heads.json to force a full replay."),
            Self::DiskFull => Some("Free disk space and retry."),
            Self::LockContention => Some("Retry after the other writer releases its lock."),
            Self::PermissionDenied => Some("Check file ownership and write permissions."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors surfaced by the log stores.
///
/// Every store operation returns this type; nothing panics across the store
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("disk full while writing {}", .path.display())]
    DiskFull { path: PathBuf },

    #[error("permission denied: cannot {operation} {}", .path.display())]
    PermissionDenied { path: PathBuf, operation: String },

    #[error("{}:{line}: {reason} (line: {content:?})", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        content: String,
        reason: String,
    },

    #[error("lock on {} timed out after {timeout_ms}ms", .path.display())]
    LockTimeout { path: PathBuf, timeout_ms: u64 },

    #[error("corruption in {}: {reason}", .path.display())]
    Corruption { path: PathBuf, reason: String },

    #[error("event rejected: {reason}")]
    Invalid { reason: String },
}

impl StoreError {
    /// Classify an I/O failure on `path` into the store taxonomy.
    pub fn from_io(err: &io::Error, path: &Path, operation: &str) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: path.to_path_buf(),
                operation: operation.to_string(),
            },
            io::ErrorKind::StorageFull => Self::DiskFull {
                path: path.to_path_buf(),
            },
            _ if err.raw_os_error() == Some(ENOSPC) => Self::DiskFull {
                path: path.to_path_buf(),
            },
            _ => Self::Corruption {
                path: path.to_path_buf(),
                reason: format!("{operation} failed: {err}"),
            },
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::DiskFull { .. } => ErrorCode::DiskFull,
            Self::PermissionDenied { .. } => ErrorCode::PermissionDenied,
            Self::Parse { .. } => ErrorCode::EventParseFailed,
            Self::LockTimeout { .. } => ErrorCode::LockContention,
            Self::Corruption { .. } => ErrorCode::CorruptLog,
            Self::Invalid { .. } => ErrorCode::InvalidEvent,
        }
    }

    /// Optional remediation hint for operators and agents.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }

    /// Only lock contention is worth retrying without operator action.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

const ENOSPC: i32 = 28;
