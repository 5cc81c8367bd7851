//! Guards gating whether a resource runs at all
//!
//! Guards are evaluated before a resource is queried. A guard that says
//! "do not run" skips the resource; a guard that cannot be evaluated fails
//! it. Evaluation never defaults to running.

use crate::error::HostError;
use crate::host::Host;
use crate::value::Value;
use std::fmt;
use std::path::PathBuf;

/// A single predicate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Shell command exits zero
    CommandSucceeds(String),
    /// Path exists on the host
    PathExists(PathBuf),
    Literal(bool),
}

impl Guard {
    /// Evaluate through the host's process executor and filesystem.
    ///
    /// A command exiting non-zero is `false`; a command that cannot be run
    /// or times out is an error.
    pub fn evaluate(&self, host: &Host<'_>) -> Result<bool, HostError> {
        match self {
            Self::CommandSucceeds(command) => {
                Ok(host.exec.shell(command, None, host.timeout)?.success)
            }
            Self::PathExists(path) => host.fs.exists(path),
            Self::Literal(value) => Ok(*value),
        }
    }

    /// Build a guard from an attribute value.
    ///
    /// Strings are commands, booleans are literals, and tables take a single
    /// `command` or `path_exists` key.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::String(command) if command.trim().is_empty() => {
                Err("guard command is empty".to_string())
            }
            Value::String(command) => Ok(Self::CommandSucceeds(command.clone())),
            Value::Bool(b) => Ok(Self::Literal(*b)),
            Value::Table(table) => match (table.len(), table.iter().next()) {
                (1, Some((key, Value::String(s)))) if key == "command" => {
                    Ok(Self::CommandSucceeds(s.clone()))
                }
                (1, Some((key, Value::String(s)))) if key == "path_exists" => {
                    Ok(Self::PathExists(PathBuf::from(s)))
                }
                _ => Err(format!(
                    "expected {{ command = \"...\" }} or {{ path_exists = \"...\" }}, got {value}"
                )),
            },
            other => Err(format!("expected a command, boolean or table, got {}", other.type_name())),
        }
    }

    /// Build a list of guards from a single value or a list of values
    pub fn list_from_value(value: &Value) -> Result<Vec<Self>, String> {
        match value {
            Value::List(items) => items.iter().map(Self::from_value).collect(),
            single => Ok(vec![Self::from_value(single)?]),
        }
    }
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CommandSucceeds(command) => write!(f, "`{command}`"),
            Self::PathExists(path) => write!(f, "path_exists({})", path.display()),
            Self::Literal(value) => write!(f, "{value}"),
        }
    }
}

/// Outcome of guard evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardVerdict {
    Run,
    Skip(String),
}

/// All guards attached to a resource
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Guards {
    /// Every guard must hold
    pub only_if: Vec<Guard>,
    /// No guard may hold
    pub not_if: Vec<Guard>,
    /// Run only while this path is absent
    pub creates: Option<PathBuf>,
}

impl Guards {
    pub fn is_empty(&self) -> bool {
        self.only_if.is_empty() && self.not_if.is_empty() && self.creates.is_none()
    }

    /// Evaluate in order: `only_if`, `not_if`, then `creates`.
    ///
    /// Stops at the first guard that decides to skip.
    pub fn evaluate(&self, host: &Host<'_>) -> Result<GuardVerdict, HostError> {
        for guard in &self.only_if {
            if !guard.evaluate(host)? {
                return Ok(GuardVerdict::Skip(format!("only_if {guard} was false")));
            }
        }

        for guard in &self.not_if {
            if guard.evaluate(host)? {
                return Ok(GuardVerdict::Skip(format!("not_if {guard} was true")));
            }
        }

        if let Some(path) = &self.creates
            && host.fs.exists(path)?
        {
            return Ok(GuardVerdict::Skip(format!(
                "{} already exists",
                path.display()
            )));
        }

        Ok(GuardVerdict::Run)
    }
}
