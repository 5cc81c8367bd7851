//! # hostkit
//!
//! Real implementations of the [`converge`] host interfaces for Debian and
//! Ubuntu machines running systemd.
//!
//! Every backend shells out to the standard host tool (`apt-get`,
//! `modprobe`, `sysctl`, `systemctl`, `useradd`, ...) through a
//! [`SystemExecutor`] that enforces a timeout on each command, or reads the
//! kernel's own view from `/proc` and `/sys`.
//!
//! ## Example
//!
//! ```no_run
//! use converge::{Declaration, Engine, Plan};
//! use hostkit::{HostOptions, LocalHost};
//!
//! struct NoSecrets;
//!
//! impl converge::SecretProvider for NoSecrets {
//!     fn secret(&self, key: &str) -> Result<String, converge::HostError> {
//!         Err(converge::HostError::SecretUnavailable { key: key.to_string() })
//!     }
//! }
//!
//! let local = LocalHost::new(HostOptions::default(), Box::new(NoSecrets));
//! let plan = Plan::compile(&[Declaration::new("kernel_module", "overlay")]).unwrap();
//! let report = Engine::new(local.host()).run_simple(&plan);
//! assert_eq!(report.exit_code(false), 0);
//! ```
//!
//! ## Retry Logic
//!
//! Network failures from `apt-get` and key downloads are retried with
//! exponential backoff. Configure retry behavior with [`RetryConfig`].

pub mod apt;
pub mod classify;
pub mod fs;
pub mod keys;
pub mod kmod;
pub mod mounts;
pub mod process;
pub mod retry;
pub mod sysctl;
pub mod systemd;
pub mod users;

pub use apt::Apt;
pub use fs::LocalFs;
pub use keys::HttpKeys;
pub use kmod::Kmod;
pub use mounts::Mounts;
pub use process::SystemExecutor;
pub use retry::RetryConfig;
pub use sysctl::ProcSysctl;
pub use systemd::Systemd;
pub use users::LocalUsers;

use converge::{Host, SecretProvider};
use std::sync::Arc;
use std::time::Duration;

/// Settings shared by every backend
#[derive(Debug, Clone)]
pub struct HostOptions {
    /// Budget for each external command
    pub timeout: Duration,
    /// Retries for network failures
    pub retry: RetryConfig,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            retry: RetryConfig::default(),
        }
    }
}

/// The machine we run on, with every backend wired up
pub struct LocalHost {
    exec: Arc<SystemExecutor>,
    fs: LocalFs,
    apt: Apt,
    kmod: Kmod,
    sysctl: ProcSysctl,
    systemd: Systemd,
    mounts: Mounts,
    users: LocalUsers,
    keys: HttpKeys,
    secrets: Box<dyn SecretProvider>,
    timeout: Duration,
}

impl LocalHost {
    pub fn new(options: HostOptions, secrets: Box<dyn SecretProvider>) -> Self {
        let exec = Arc::new(SystemExecutor::new());
        let timeout = options.timeout;
        Self {
            fs: LocalFs,
            apt: Apt::new(exec.clone(), timeout, options.retry.clone()),
            kmod: Kmod::new(exec.clone(), timeout),
            sysctl: ProcSysctl::new(exec.clone(), timeout),
            systemd: Systemd::new(exec.clone(), timeout),
            mounts: Mounts::new(exec.clone(), timeout),
            users: LocalUsers::new(timeout),
            keys: HttpKeys::new(options.retry),
            exec,
            secrets,
            timeout,
        }
    }

    /// Borrow the backends as the engine's host interfaces
    pub fn host(&self) -> Host<'_> {
        Host {
            exec: self.exec.as_ref(),
            fs: &self.fs,
            packages: &self.apt,
            modules: &self.kmod,
            sysctl: &self.sysctl,
            services: &self.systemd,
            mounts: &self.mounts,
            users: &self.users,
            keys: &self.keys,
            secrets: self.secrets.as_ref(),
            timeout: self.timeout,
        }
    }
}
