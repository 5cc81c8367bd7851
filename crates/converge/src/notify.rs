//! Notification bus - "when X changes, run action A on Y"

use crate::resource::{Action, ResourceId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::ControlFlow;

/// When a notification fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    /// Right after the source changes, before the walk continues
    Immediate,
    /// Once, after the walk completes
    Delayed,
}

impl Timing {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "immediate" | "immediately" => Some(Self::Immediate),
            "delayed" => Some(Self::Delayed),
            _ => None,
        }
    }
}

impl fmt::Display for Timing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::Delayed => f.write_str("delayed"),
        }
    }
}

/// A resolved notification edge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEdge {
    pub source: ResourceId,
    pub target: ResourceId,
    pub action: Action,
    pub timing: Timing,
}

impl fmt::Display for NotificationEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} {} ({})",
            self.source, self.target, self.action, self.timing
        )
    }
}

/// Registered edges plus the run-scoped queue of delayed firings
#[derive(Debug, Clone, Default)]
pub struct NotificationBus {
    edges: Vec<NotificationEdge>,
    queued: Vec<NotificationEdge>,
}

impl NotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an edge; an identical edge registered twice is kept once
    pub fn register(&mut self, edge: NotificationEdge) {
        if !self.edges.contains(&edge) {
            self.edges.push(edge);
        }
    }

    /// All registered edges in registration order
    pub fn edges(&self) -> &[NotificationEdge] {
        &self.edges
    }

    /// Edges sourced at `source`, in registration order
    pub fn edges_for<'a>(
        &'a self,
        source: &'a ResourceId,
    ) -> impl Iterator<Item = &'a NotificationEdge> + 'a {
        self.edges.iter().filter(move |e| &e.source == source)
    }

    /// Queue a delayed edge.
    ///
    /// Queued edges are deduplicated by target resource: the first edge
    /// queued for a target wins. Returns whether the edge was queued.
    pub fn queue(&mut self, edge: NotificationEdge) -> bool {
        if self.queued.iter().any(|q| q.target == edge.target) {
            return false;
        }
        self.queued.push(edge);
        true
    }

    /// Delayed edges waiting to fire
    pub fn pending(&self) -> &[NotificationEdge] {
        &self.queued
    }

    /// Drain the queue without firing anything
    pub fn discard_pending(&mut self) -> Vec<NotificationEdge> {
        std::mem::take(&mut self.queued)
    }

    /// Fire every queued delayed edge once, in first-queued order.
    ///
    /// The queue is drained. When `fire` breaks, the edges after the one that
    /// broke are returned unfired.
    pub fn fire_delayed<F>(&mut self, mut fire: F) -> Vec<NotificationEdge>
    where
        F: FnMut(&NotificationEdge) -> ControlFlow<()>,
    {
        let mut queued = std::mem::take(&mut self.queued).into_iter();
        for edge in queued.by_ref() {
            if fire(&edge).is_break() {
                break;
            }
        }
        queued.collect()
    }
}
