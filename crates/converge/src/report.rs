//! Run report: per-resource outcomes, notification firings and exit code

use crate::error::ErrorDetail;
use crate::notify::NotificationEdge;
use crate::resource::{Action, ResourceId};
use serde::{Serialize, Serializer};
use std::fmt;
use std::time::Duration;

/// Terminal status of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Unchanged,
    Changed,
    Failed,
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Unchanged => "unchanged",
            Self::Changed => "changed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        };
        f.write_str(label)
    }
}

/// Why a resource or notification was skipped
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// A guard said not to run
    Guard { detail: String },
    /// Only `nothing` was requested and nothing notified it
    NoAction,
    /// An earlier failure halted the run
    Halted { after: ResourceId },
    Cancelled,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guard { detail } => f.write_str(detail),
            Self::NoAction => f.write_str("no action requested"),
            Self::Halted { after } => write!(f, "halted after {after} failed"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

fn as_millis<S: Serializer>(elapsed: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

/// Outcome of one resource in one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunOutcome {
    #[serde(flatten)]
    pub id: ResourceId,
    pub status: Status,
    /// Actions whose apply reported a change
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub applied: Vec<Action>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl RunOutcome {
    pub fn unchanged(id: ResourceId, elapsed: Duration) -> Self {
        Self {
            id,
            status: Status::Unchanged,
            applied: Vec::new(),
            skip_reason: None,
            error: None,
            elapsed,
        }
    }

    pub fn changed(id: ResourceId, applied: Vec<Action>, elapsed: Duration) -> Self {
        Self {
            status: Status::Changed,
            applied,
            ..Self::unchanged(id, elapsed)
        }
    }

    /// Failure; `applied` holds actions that changed the host before the error
    pub fn failed(id: ResourceId, error: ErrorDetail, applied: Vec<Action>, elapsed: Duration) -> Self {
        Self {
            status: Status::Failed,
            applied,
            error: Some(error),
            ..Self::unchanged(id, elapsed)
        }
    }

    pub fn skipped(id: ResourceId, reason: SkipReason, elapsed: Duration) -> Self {
        Self {
            status: Status::Skipped,
            skip_reason: Some(reason),
            ..Self::unchanged(id, elapsed)
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == Status::Failed
    }
}

/// What happened to one notification edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationRecord {
    pub edge: NotificationEdge,
    /// Changed when the target action ran
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl NotificationRecord {
    pub fn fired(edge: NotificationEdge) -> Self {
        Self {
            edge,
            status: Status::Changed,
            skip_reason: None,
            error: None,
        }
    }

    pub fn failed(edge: NotificationEdge, error: ErrorDetail) -> Self {
        Self {
            status: Status::Failed,
            error: Some(error),
            ..Self::fired(edge)
        }
    }

    pub fn skipped(edge: NotificationEdge, reason: SkipReason) -> Self {
        Self {
            status: Status::Skipped,
            skip_reason: Some(reason),
            ..Self::fired(edge)
        }
    }
}

/// Counts over a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub unchanged: usize,
    pub changed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Subset of `skipped` caused by cancellation
    pub cancelled: usize,
    pub notifications_fired: usize,
    pub notifications_failed: usize,
    pub notifications_skipped: usize,
}

impl Summary {
    /// Add a resource outcome to the summary
    pub fn add_outcome(&mut self, outcome: &RunOutcome) {
        match outcome.status {
            Status::Unchanged => self.unchanged += 1,
            Status::Changed => self.changed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => {
                self.skipped += 1;
                if outcome.skip_reason == Some(SkipReason::Cancelled) {
                    self.cancelled += 1;
                }
            }
        }
    }

    pub fn add_notification(&mut self, record: &NotificationRecord) {
        match record.status {
            Status::Failed => self.notifications_failed += 1,
            Status::Skipped => self.notifications_skipped += 1,
            Status::Changed | Status::Unchanged => self.notifications_fired += 1,
        }
    }

    /// Total number of resources processed
    pub fn total(&self) -> usize {
        self.unchanged + self.changed + self.failed + self.skipped
    }

    /// Check if the run had no failures
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.notifications_failed == 0
    }
}

/// Result of a convergence run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    /// One outcome per declared resource, in declaration order
    pub outcomes: Vec<RunOutcome>,
    pub notifications: Vec<NotificationRecord>,
    pub cancelled: bool,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl RunReport {
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for outcome in &self.outcomes {
            summary.add_outcome(outcome);
        }
        for record in &self.notifications {
            summary.add_notification(record);
        }
        summary
    }

    /// The failure that halted the run, or the first one recorded
    pub fn first_failure(&self) -> Option<(&ResourceId, &ErrorDetail)> {
        let resource = self
            .outcomes
            .iter()
            .find_map(|o| o.error.as_ref().map(|e| (&o.id, e)));
        resource.or_else(|| {
            self.notifications
                .iter()
                .find_map(|n| n.error.as_ref().map(|e| (&n.edge.target, e)))
        })
    }

    pub fn outcome(&self, id: &ResourceId) -> Option<&RunOutcome> {
        self.outcomes.iter().find(|o| &o.id == id)
    }

    /// 0 when nothing failed; in strict mode cancellation skips also count
    pub fn exit_code(&self, strict: bool) -> i32 {
        let summary = self.summary();
        if !summary.is_success() || (strict && summary.cancelled > 0) {
            1
        } else {
            0
        }
    }
}
