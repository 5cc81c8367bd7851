//! Error types for host operations, compilation and run outcomes.
//!
//! Host errors are categorized so callers can decide whether to retry and
//! how to present the failure. Validation errors are produced while
//! compiling declarations and abort the run before anything is applied.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Categories of host errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// External command exceeded its time budget
    Timeout,
    /// Command ran but reported failure
    Command,
    /// Package, module, unit or user does not exist
    NotFound,
    /// Permission denied (usually not running as root)
    Permission,
    /// Network-related errors (transient, retryable)
    Network,
    /// Credential could not be obtained from the secret provider
    Secret,
    /// Local filesystem error
    Io,
    /// Other/unknown errors
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    pub fn description(&self) -> &'static str {
        match self {
            Self::Timeout => "Command timed out",
            Self::Command => "Command failed",
            Self::NotFound => "Not found",
            Self::Permission => "Permission denied",
            Self::Network => "Network connectivity issue",
            Self::Secret => "Secret unavailable",
            Self::Io => "Filesystem error",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Timeout => "Raise command_timeout_secs or the resource timeout",
            Self::Command => "Check the command output for details",
            Self::NotFound => "Verify the name or add the repository that provides it",
            Self::Permission => "Run nodeprep as root",
            Self::Network => "Check your internet connection and try again",
            Self::Secret => "Provide the secret through the configured secret source",
            Self::Io => "Check the path and its permissions",
            Self::Other => "Check the error details for more information",
        }
    }
}

/// Errors raised by host adapters.
#[derive(Debug, Error)]
pub enum HostError {
    /// External command exceeded its budget and was killed
    #[error("`{command}` timed out after {}s", .after.as_secs())]
    Timeout {
        /// Command line that timed out
        command: String,
        /// Budget that was exceeded
        after: Duration,
    },

    /// Command ran and exited unsuccessfully
    #[error("`{command}` failed (exit {}): {stderr}", .code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    CommandFailed {
        /// Command line that failed
        command: String,
        /// Exit code, `None` when killed by a signal
        code: Option<i32>,
        /// Standard error output
        stderr: String,
    },

    /// Something the host was asked about does not exist
    #[error("not found: {what}")]
    NotFound {
        /// What was missing
        what: String,
    },

    /// Permission denied
    #[error("permission denied: {message}")]
    Permission {
        /// Details about what permission was denied
        message: String,
    },

    /// Network-related error (download, repository fetch)
    #[error("network error: {message}")]
    Network {
        /// Detailed error message from the failed network operation
        message: String,
    },

    /// A secret could not be resolved
    #[error("secret `{key}` is not available")]
    SecretUnavailable {
        /// Secret key that was requested
        key: String,
    },

    /// Filesystem error
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path the operation was about
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl HostError {
    /// Wrap an IO error with the path it happened on.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Get the error category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Timeout { .. } => ErrorCategory::Timeout,
            Self::CommandFailed { .. } => ErrorCategory::Command,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::Permission { .. } => ErrorCategory::Permission,
            Self::Network { .. } => ErrorCategory::Network,
            Self::SecretUnavailable { .. } => ErrorCategory::Secret,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied => {
                ErrorCategory::Permission
            }
            Self::Io { .. } => ErrorCategory::Io,
            Self::Other(_) => ErrorCategory::Other,
        }
    }

    /// Whether this error is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

/// Phase of a resource run an error was raised in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Current state could not be observed; nothing was applied
    Query,
    /// Applying an action failed
    Apply,
    /// An only_if / not_if / creates guard could not be evaluated
    Guard,
    /// An external command exceeded its time budget
    Timeout,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Query => "query error",
            Self::Apply => "apply error",
            Self::Guard => "guard evaluation error",
            Self::Timeout => "timeout",
        };
        f.write_str(label)
    }
}

/// Error recorded in a run outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub category: ErrorCategory,
    pub message: String,
}

impl ErrorDetail {
    /// Record a host error raised during `phase`.
    ///
    /// Timeouts are reported as [`ErrorKind::Timeout`] whatever the phase.
    pub fn from_host(phase: ErrorKind, error: &HostError) -> Self {
        let category = error.category();
        let kind = if category == ErrorCategory::Timeout {
            ErrorKind::Timeout
        } else {
            phase
        };
        Self {
            kind,
            category,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Errors found while compiling declarations into a plan.
///
/// Any of these fails the whole run before a single resource executes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unknown resource kind `{kind}` (declared as `{name}`)")]
    UnknownKind { kind: String, name: String },

    #[error("{kind} resource declared with an empty name")]
    EmptyName { kind: String },

    #[error("{resource}: invalid name `{name}`: {reason}")]
    InvalidName {
        resource: String,
        name: String,
        reason: String,
    },

    #[error("{resource} is declared more than once")]
    DuplicateResource { resource: String },

    #[error("{resource}: unknown attribute `{attribute}` (accepted: {accepted})")]
    UnknownAttribute {
        resource: String,
        attribute: String,
        accepted: String,
    },

    #[error("{resource}: attribute `{attribute}` is invalid: {reason}")]
    InvalidAttribute {
        resource: String,
        attribute: String,
        reason: String,
    },

    #[error("{resource}: missing required attribute `{attribute}`")]
    MissingAttribute { resource: String, attribute: String },

    #[error("{resource}: inline passwords are not accepted, reference one with `password_secret`")]
    InlineCredential { resource: String },

    #[error("{resource}: unknown action `{action}` (accepted: {accepted})")]
    UnknownAction {
        resource: String,
        action: String,
        accepted: String,
    },

    #[error("{resource}: no action declared and the kind has no default")]
    MissingAction { resource: String },

    #[error("{resource}: malformed notification target `{target}` (expected kind[name])")]
    MalformedTarget { resource: String, target: String },

    #[error("{resource}: notification target `{target}` is not declared")]
    UnknownTarget { resource: String, target: String },

    #[error("{resource}: unknown notification timing `{timing}` (expected immediate or delayed)")]
    InvalidTiming { resource: String, timing: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_category_retryable() {
        assert!(ErrorCategory::Network.is_retryable());
        assert!(!ErrorCategory::NotFound.is_retryable());
        assert!(!ErrorCategory::Timeout.is_retryable());
    }

    #[test]
    fn test_timeout_detail_overrides_phase() {
        let err = HostError::Timeout {
            command: "swapoff -a".to_string(),
            after: Duration::from_secs(5),
        };
        let detail = ErrorDetail::from_host(ErrorKind::Apply, &err);
        assert_eq!(detail.kind, ErrorKind::Timeout);
        assert_eq!(detail.category, ErrorCategory::Timeout);
        assert!(detail.message.contains("timed out after 5s"));
    }

    #[test]
    fn test_io_permission_denied_category() {
        let err = HostError::io(
            Path::new("/etc/fstab"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert_eq!(err.category(), ErrorCategory::Permission);
    }

    #[test]
    fn test_command_failed_message() {
        let err = HostError::CommandFailed {
            command: "modprobe nope".to_string(),
            code: Some(1),
            stderr: "Module nope not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "`modprobe nope` failed (exit 1): Module nope not found"
        );
    }
}
