//! Host interfaces
//!
//! These traits are the only way adapters touch the machine. Real
//! implementations shell out to the host tools; tests use an in-memory host.
//! Every method that can block on an external command takes a timeout.

use crate::error::HostError;
use crate::resource::Action;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::time::{Duration, SystemTime};

/// Output from an external command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub success: bool,
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
            success: output.status.success(),
        }
    }
}

impl CommandOutput {
    /// Get stdout as a string
    pub fn stdout_str(&self) -> String {
        String::from_utf8_lossy(&self.stdout).to_string()
    }

    /// Get stderr as a string
    pub fn stderr_str(&self) -> String {
        String::from_utf8_lossy(&self.stderr).to_string()
    }
}

/// Runs external commands
pub trait ProcessExecutor: Send + Sync {
    /// Run a program, killing it once `timeout` elapses.
    ///
    /// A non-zero exit is not an error here; only failure to spawn or a
    /// timeout is.
    fn run_in(
        &self,
        program: &str,
        args: &[&str],
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, HostError>;

    /// Run a program in the current directory
    fn run(&self, program: &str, args: &[&str], timeout: Duration) -> Result<CommandOutput, HostError> {
        self.run_in(program, args, None, timeout)
    }

    /// Run a command line through `sh -c`
    fn shell(
        &self,
        command: &str,
        cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, HostError> {
        self.run_in("sh", &["-c", command], cwd, timeout)
    }

    /// Run a program and capture stdout, failing on non-zero exit
    fn run_capture(&self, program: &str, args: &[&str], timeout: Duration) -> Result<String, HostError> {
        let output = self.run(program, args, timeout)?;
        if !output.success {
            return Err(HostError::CommandFailed {
                command: command_line(program, args),
                code: output.code,
                stderr: output.stderr_str().trim().to_string(),
            });
        }
        Ok(output.stdout_str())
    }
}

/// Render a program and its arguments for messages
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// File metadata the adapters care about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Permission bits (`0o7777` mask)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub modified: SystemTime,
}

/// Local filesystem
pub trait FileSystem: Send + Sync {
    /// Read a file, `None` when it does not exist
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError>;

    /// Write a file, creating parent directories
    fn write(&self, path: &Path, content: &[u8]) -> Result<(), HostError>;

    /// Stat a file, `None` when it does not exist
    fn stat(&self, path: &Path) -> Result<Option<FileMeta>, HostError>;

    fn set_mode(&self, path: &Path, mode: u32) -> Result<(), HostError>;

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<(), HostError>;

    /// Remove a file; returns whether it existed
    fn remove(&self, path: &Path) -> Result<bool, HostError>;

    fn exists(&self, path: &Path) -> Result<bool, HostError> {
        Ok(self.stat(path)?.is_some())
    }

    /// Read a file as UTF-8 text
    fn read_string(&self, path: &Path) -> Result<Option<String>, HostError> {
        Ok(self
            .read(path)?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }
}

/// Package manager client (apt on Debian/Ubuntu)
pub trait PackageManager: Send + Sync {
    /// Installed version, `None` when not installed
    fn installed_version(&self, name: &str) -> Result<Option<String>, HostError>;

    fn install(&self, name: &str, version: Option<&str>) -> Result<(), HostError>;

    fn remove(&self, name: &str) -> Result<(), HostError>;

    /// Refresh package lists
    fn update(&self) -> Result<(), HostError>;

    /// Time of the last successful refresh
    fn last_update(&self) -> Result<Option<SystemTime>, HostError>;

    /// Release codename of the host (e.g. "jammy")
    fn codename(&self) -> Result<String, HostError>;
}

/// Kernel module loader
pub trait ModuleLoader: Send + Sync {
    fn is_loaded(&self, module: &str) -> Result<bool, HostError>;
    fn load(&self, module: &str) -> Result<(), HostError>;
    fn unload(&self, module: &str) -> Result<(), HostError>;
}

/// Live kernel parameters
pub trait SysctlBackend: Send + Sync {
    /// Current value, `None` when the key does not exist
    fn read(&self, key: &str) -> Result<Option<String>, HostError>;
    fn write(&self, key: &str, value: &str) -> Result<(), HostError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServiceStatus {
    pub enabled: bool,
    pub running: bool,
}

/// Service manager (systemd)
pub trait ServiceController: Send + Sync {
    fn status(&self, name: &str) -> Result<ServiceStatus, HostError>;

    /// Perform one of the service actions (enable, disable, start, stop, restart, reload)
    fn perform(&self, name: &str, action: Action) -> Result<(), HostError>;
}

/// Swap and mount state
pub trait MountController: Send + Sync {
    /// Devices currently used as swap
    fn active_swaps(&self) -> Result<Vec<String>, HostError>;
    fn swap_off_all(&self) -> Result<(), HostError>;
    fn swap_on_all(&self) -> Result<(), HostError>;
    fn is_mounted(&self, mount_point: &Path) -> Result<bool, HostError>;
    fn mount(&self, mount_point: &Path) -> Result<(), HostError>;
    fn unmount(&self, mount_point: &Path) -> Result<(), HostError>;
}

/// An account as the user database reports it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
    pub comment: String,
}

/// Fields to set when creating or modifying an account
///
/// `None` leaves a field to the system default (create) or untouched (modify).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserSpec {
    pub name: String,
    pub uid: Option<u32>,
    pub gid: Option<u32>,
    pub home: Option<PathBuf>,
    pub shell: Option<String>,
    pub comment: Option<String>,
    pub manage_home: bool,
    pub password_hash: Option<String>,
}

impl UserSpec {
    /// Whether a modify spec changes anything
    pub fn has_changes(&self) -> bool {
        self.uid.is_some()
            || self.gid.is_some()
            || self.home.is_some()
            || self.shell.is_some()
            || self.comment.is_some()
            || self.password_hash.is_some()
    }
}

/// User and group database
pub trait UserDirectory: Send + Sync {
    fn lookup_user(&self, name: &str) -> Result<Option<UserEntry>, HostError>;
    fn lookup_group(&self, name: &str) -> Result<Option<u32>, HostError>;
    /// Stored password hash, `None` when the account has none
    fn password_hash(&self, name: &str) -> Result<Option<String>, HostError>;
    fn create_user(&self, spec: &UserSpec) -> Result<(), HostError>;
    fn modify_user(&self, spec: &UserSpec) -> Result<(), HostError>;
    fn remove_user(&self, name: &str, remove_home: bool) -> Result<(), HostError>;
}

/// Downloads signing keys
pub trait KeyFetcher: Send + Sync {
    fn fetch(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, HostError>;
}

/// Supplies credentials kept out of recipes
pub trait SecretProvider: Send + Sync {
    /// Resolve a secret; [`HostError::SecretUnavailable`] when it is not set
    fn secret(&self, key: &str) -> Result<String, HostError>;
}

/// Everything an adapter may touch, plus the default command timeout
#[derive(Clone, Copy)]
pub struct Host<'a> {
    pub exec: &'a dyn ProcessExecutor,
    pub fs: &'a dyn FileSystem,
    pub packages: &'a dyn PackageManager,
    pub modules: &'a dyn ModuleLoader,
    pub sysctl: &'a dyn SysctlBackend,
    pub services: &'a dyn ServiceController,
    pub mounts: &'a dyn MountController,
    pub users: &'a dyn UserDirectory,
    pub keys: &'a dyn KeyFetcher,
    pub secrets: &'a dyn SecretProvider,
    /// Budget for every external command unless a resource overrides it
    pub timeout: Duration,
}
