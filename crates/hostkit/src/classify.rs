//! Classification of host tool failures.
//!
//! apt, dpkg, modprobe and systemctl report most failures only through
//! stderr. Classifying them into [`HostError`] categories lets callers retry
//! network problems and give useful advice for the rest.

use converge::{CommandOutput, HostError};

/// Markers of transient network failures
const NETWORK_MARKERS: &[&str] = &[
    "could not resolve",
    "temporary failure resolving",
    "failed to fetch",
    "connection refused",
    "connection timed out",
    "network is unreachable",
    "unable to connect",
    "hash sum mismatch",
    "certificate verification failed",
];

const NOT_FOUND_MARKERS: &[&str] = &[
    "unable to locate package",
    "has no installation candidate",
    "no packages found matching",
    "not found in directory",
    "module not found",
    "unit file does not exist",
    "not loaded",
    "does not exist",
];

const PERMISSION_MARKERS: &[&str] = &[
    "permission denied",
    "operation not permitted",
    "are you root",
    "could not get lock",
    "could not open lock file",
    "unable to acquire the dpkg frontend lock",
];

/// Build an error from a failed command's stderr.
///
/// `subject` names what the command was about (a package, a module) and is
/// used for `NotFound` errors.
pub fn classify(command: &str, output: &CommandOutput, subject: Option<&str>) -> HostError {
    let stderr = output.stderr_str();
    let lower = stderr.to_lowercase();
    let message = stderr.trim().to_string();

    if NETWORK_MARKERS.iter().any(|m| lower.contains(m)) {
        return HostError::Network { message };
    }

    if NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m)) {
        return HostError::NotFound {
            what: subject.map_or_else(|| command.to_string(), str::to_string),
        };
    }

    if PERMISSION_MARKERS.iter().any(|m| lower.contains(m)) {
        return HostError::Permission { message };
    }

    HostError::CommandFailed {
        command: command.to_string(),
        code: output.code,
        stderr: message,
    }
}

/// Pass `output` through when it succeeded, classify it otherwise
pub fn check(command: &str, output: CommandOutput, subject: Option<&str>) -> Result<CommandOutput, HostError> {
    if output.success {
        Ok(output)
    } else {
        Err(classify(command, &output, subject))
    }
}
