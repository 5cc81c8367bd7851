//! Progress reporting and cancellation
//!
//! These let the engine stay free of any terminal or signal handling code.

use crate::report::{NotificationRecord, RunOutcome};
use crate::resource::{Resource, ResourceId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Step a resource is in while it is being converged
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Evaluating only_if / not_if / creates
    Guards,
    Querying,
    Applying,
}

/// Progress callback for a convergence run
///
/// Every method has an empty default so implementors only override what
/// they display.
pub trait ProgressCallback: Send {
    /// Called once before the walk with the number of resources
    fn on_run_start(&mut self, _total: usize) {}

    /// Called when the engine starts on a resource
    fn on_resource_start(&mut self, _index: usize, _resource: &Resource) {}

    /// Called on every state transition of the current resource
    fn on_phase(&mut self, _id: &ResourceId, _phase: Phase) {}

    /// Called once per resource with its final outcome
    fn on_resource_complete(&mut self, _outcome: &RunOutcome) {}

    /// Called after a notification fires, is skipped or fails
    fn on_notification(&mut self, _record: &NotificationRecord) {}
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {}

/// Shared cancellation flag, checked between resources
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing flag (e.g. one a signal handler sets)
    pub fn from_flag(flag: Arc<AtomicBool>) -> Self {
        Self(flag)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
