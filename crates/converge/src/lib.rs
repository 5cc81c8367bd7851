//! # Converge
//!
//! An idempotent state-reconciliation engine for a single host.
//!
//! This crate provides the core abstractions for declaring desired host state,
//! observing the live state, and converging the host to match it.
//!
//! ## Core Concepts
//!
//! - **Resource**: A declared unit of desired state (`kind[name]` + typed properties + actions)
//! - **ResourceAdapter**: Kind-specific driver that queries and applies state
//! - **NotificationBus**: Edges that trigger an action on a target when a source changes
//! - **Engine**: Walks resources in declaration order, fires notifications, builds a report
//! - **RunReport**: Per-resource outcome, notification firings and exit code
//!
//! ## Example
//!
//! ```ignore
//! use converge::{Declaration, Engine, Plan};
//!
//! let plan = Plan::compile(&[
//!     Declaration::new("kernel_module", "overlay"),
//!     Declaration::new("file", "/etc/modules-load.d/overlay.conf")
//!         .attr("content", "overlay")
//!         .attr("mode", "0644"),
//! ])?;
//!
//! let report = Engine::new(host).run_simple(&plan);
//! std::process::exit(report.exit_code(false));
//! ```
//!
//! ## Host Traits
//!
//! The engine never touches the host directly. Everything goes through the
//! traits in [`host`]:
//!
//! - [`ProcessExecutor`]: Runs commands under a timeout
//! - [`FileSystem`]: Reads, writes and stats files
//! - [`PackageManager`], [`ModuleLoader`], [`SysctlBackend`], [`ServiceController`],
//!   [`MountController`], [`UserDirectory`], [`KeyFetcher`]: Thin wrappers over host tools
//! - [`SecretProvider`]: Supplies credentials that must never be inlined in a recipe

pub mod adapter;
pub mod compile;
pub mod context;
pub mod engine;
pub mod error;
pub mod guard;
pub mod host;
pub mod notify;
pub mod report;
pub mod resource;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod testing;

// Re-export main types at crate root
pub use adapter::{AdapterRegistry, ResourceAdapter};
pub use compile::{Declaration, NotifyDecl, Plan};
pub use context::{CancelToken, NoProgress, Phase, ProgressCallback};
pub use engine::{Engine, PlanEntry, PlanStatus, PlannedChange};
pub use error::{ErrorCategory, ErrorDetail, ErrorKind, HostError, ValidationError};
pub use guard::{Guard, GuardVerdict, Guards};
pub use host::{
    CommandOutput, FileMeta, FileSystem, Host, KeyFetcher, ModuleLoader, MountController,
    PackageManager, ProcessExecutor, SecretProvider, ServiceController, ServiceStatus,
    SysctlBackend, UserDirectory, UserEntry, UserSpec,
};
pub use notify::{NotificationBus, NotificationEdge, Timing};
pub use report::{NotificationRecord, RunOutcome, RunReport, SkipReason, Status, Summary};
pub use resource::{Action, Kind, Properties, Resource, ResourceId};
pub use types::{EngineOptions, Observation, ResourceState};
pub use value::Value;
