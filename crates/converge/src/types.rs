//! Core types for state observation and engine options

use serde::{Deserialize, Serialize};
use std::fmt;

/// Current or desired state of a resource action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceState {
    /// Resource exists/is configured
    Present { details: Option<String> },
    /// Resource does not exist/is not configured
    Absent,
}

impl ResourceState {
    /// Present with a detail string
    pub fn present(details: impl Into<String>) -> Self {
        Self::Present {
            details: Some(details.into()),
        }
    }

    /// Check if state represents presence
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present { .. })
    }

    /// Check if state represents absence
    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present { details: None } => f.write_str("present"),
            Self::Present {
                details: Some(details),
            } => f.write_str(details),
            Self::Absent => f.write_str("absent"),
        }
    }
}

/// What an adapter saw when querying one action of a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub current: ResourceState,
    pub desired: ResourceState,
}

impl Observation {
    pub fn new(current: ResourceState, desired: ResourceState) -> Self {
        Self { current, desired }
    }

    /// Presence flag against desired presence, no details
    pub fn presence(present: bool, want_present: bool) -> Self {
        let state = |p: bool| {
            if p {
                ResourceState::Present { details: None }
            } else {
                ResourceState::Absent
            }
        };
        Self::new(state(present), state(want_present))
    }

    /// The action is already satisfied
    pub fn is_converged(&self) -> bool {
        self.current == self.desired
    }
}

/// Options for a convergence run
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Keep walking after a resource fails instead of halting the run
    pub continue_on_error: bool,
}
