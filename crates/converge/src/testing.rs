//! In-memory host for tests
//!
//! Implements every host trait over a single mutex-guarded state and records
//! each observable call in `log` so tests can assert ordering.

use crate::error::HostError;
use crate::host::{
    CommandOutput, FileMeta, FileSystem, Host, KeyFetcher, ModuleLoader, MountController,
    PackageManager, ProcessExecutor, SecretProvider, ServiceController, ServiceStatus,
    SysctlBackend, UserDirectory, UserEntry, UserSpec, command_line,
};
use crate::resource::Action;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

#[derive(Debug, Clone)]
pub struct FakeFile {
    pub content: Vec<u8>,
    pub meta: FileMeta,
}

#[derive(Debug)]
pub struct FakeState {
    pub files: BTreeMap<PathBuf, FakeFile>,
    pub packages: BTreeMap<String, String>,
    /// Installing these fails with NotFound
    pub unknown_packages: BTreeSet<String>,
    pub candidate_version: String,
    pub modules: BTreeSet<String>,
    pub sysctl: BTreeMap<String, String>,
    pub services: BTreeMap<String, ServiceStatus>,
    pub swaps: Vec<String>,
    pub mounted: BTreeSet<PathBuf>,
    pub users: BTreeMap<String, UserEntry>,
    pub passwords: BTreeMap<String, String>,
    pub groups: BTreeMap<String, u32>,
    pub secrets: BTreeMap<String, String>,
    pub keys: BTreeMap<String, Vec<u8>>,
    pub command_exits: BTreeMap<String, i32>,
    /// Commands that never finish
    pub hanging: BTreeSet<String>,
    /// Files a command creates when it succeeds
    pub command_creates: BTreeMap<String, PathBuf>,
    /// Operations forced to fail, e.g. "kmod query"
    pub failing: BTreeSet<String>,
    pub last_update: Option<SystemTime>,
    pub codename: String,
    pub log: Vec<String>,
}

impl Default for FakeState {
    fn default() -> Self {
        let mut groups = BTreeMap::new();
        groups.insert("root".to_string(), 0);
        groups.insert("users".to_string(), 100);
        Self {
            files: BTreeMap::new(),
            packages: BTreeMap::new(),
            unknown_packages: BTreeSet::new(),
            candidate_version: "1.0.0".to_string(),
            modules: BTreeSet::new(),
            sysctl: BTreeMap::new(),
            services: BTreeMap::new(),
            swaps: Vec::new(),
            mounted: BTreeSet::new(),
            users: BTreeMap::new(),
            passwords: BTreeMap::new(),
            groups,
            secrets: BTreeMap::new(),
            keys: BTreeMap::new(),
            command_exits: BTreeMap::new(),
            hanging: BTreeSet::new(),
            command_creates: BTreeMap::new(),
            failing: BTreeSet::new(),
            last_update: None,
            codename: "jammy".to_string(),
            log: Vec::new(),
        }
    }
}

impl FakeState {
    fn record(&mut self, entry: String) -> Result<(), HostError> {
        let op = entry.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        self.log.push(entry.clone());
        if self.failing.contains(&op) {
            return Err(HostError::Other(format!("injected failure: {entry}")));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<FakeState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn host(&self) -> Host<'_> {
        Host {
            exec: self,
            fs: self,
            packages: self,
            modules: self,
            sysctl: self,
            services: self,
            mounts: self,
            users: self,
            keys: self,
            secrets: self,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn log(&self) -> Vec<String> {
        self.state().log.clone()
    }

    pub fn clear_log(&self) {
        self.state().log.clear();
    }

    /// Position of the first log entry equal to `entry`
    pub fn log_position(&self, entry: &str) -> Option<usize> {
        self.state().log.iter().position(|e| e == entry)
    }

    pub fn put_file(&self, path: &str, content: &[u8], mode: u32) {
        self.state().files.insert(
            PathBuf::from(path),
            FakeFile {
                content: content.to_vec(),
                meta: FileMeta {
                    mode,
                    uid: 0,
                    gid: 0,
                    modified: SystemTime::now(),
                },
            },
        );
    }

    /// Content and mode of a file
    pub fn file(&self, path: &str) -> Option<(String, u32)> {
        self.state().files.get(Path::new(path)).map(|f| {
            (
                String::from_utf8_lossy(&f.content).to_string(),
                f.meta.mode,
            )
        })
    }

    pub fn set_command_exit(&self, command: &str, code: i32) {
        self.state().command_exits.insert(command.to_string(), code);
    }

    pub fn set_command_hangs(&self, command: &str) {
        self.state().hanging.insert(command.to_string());
    }

    pub fn fail(&self, op: &str) {
        self.state().failing.insert(op.to_string());
    }
}

impl ProcessExecutor for FakeHost {
    fn run_in(
        &self,
        program: &str,
        args: &[&str],
        _cwd: Option<&Path>,
        timeout: Duration,
    ) -> Result<CommandOutput, HostError> {
        let command = match (program, args) {
            ("sh", ["-c", command]) => (*command).to_string(),
            _ => command_line(program, args),
        };
        let mut state = self.state();
        state.record(format!("sh {command}"))?;

        if state.hanging.contains(&command) {
            return Err(HostError::Timeout {
                command,
                after: timeout,
            });
        }

        let code = state.command_exits.get(&command).copied().unwrap_or(0);
        if code == 0
            && let Some(path) = state.command_creates.get(&command).cloned()
        {
            state.files.insert(
                path,
                FakeFile {
                    content: Vec::new(),
                    meta: FileMeta {
                        mode: 0o644,
                        uid: 0,
                        gid: 0,
                        modified: SystemTime::now(),
                    },
                },
            );
        }

        Ok(CommandOutput {
            code: Some(code),
            stdout: Vec::new(),
            stderr: if code == 0 {
                Vec::new()
            } else {
                b"command failed".to_vec()
            },
            success: code == 0,
        })
    }
}

impl FileSystem for FakeHost {
    fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, HostError> {
        Ok(self.state().files.get(path).map(|f| f.content.clone()))
    }

    fn write(&self, path: &Path, content: &[u8]) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("fs write {}", path.display()))?;
        let meta = state.files.get(path).map_or(
            FileMeta {
                mode: 0o644,
                uid: 0,
                gid: 0,
                modified: SystemTime::now(),
            },
            |f| f.meta,
        );
        state.files.insert(
            path.to_path_buf(),
            FakeFile {
                content: content.to_vec(),
                meta,
            },
        );
        Ok(())
    }

    fn stat(&self, path: &Path) -> Result<Option<FileMeta>, HostError> {
        Ok(self.state().files.get(path).map(|f| f.meta))
    }

    fn set_mode(&self, path: &Path, mode: u32) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("fs chmod {} {mode:o}", path.display()))?;
        match state.files.get_mut(path) {
            Some(file) => {
                file.meta.mode = mode;
                Ok(())
            }
            None => Err(HostError::NotFound {
                what: path.display().to_string(),
            }),
        }
    }

    fn set_owner(&self, path: &Path, uid: Option<u32>, gid: Option<u32>) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("fs chown {}", path.display()))?;
        match state.files.get_mut(path) {
            Some(file) => {
                if let Some(uid) = uid {
                    file.meta.uid = uid;
                }
                if let Some(gid) = gid {
                    file.meta.gid = gid;
                }
                Ok(())
            }
            None => Err(HostError::NotFound {
                what: path.display().to_string(),
            }),
        }
    }

    fn remove(&self, path: &Path) -> Result<bool, HostError> {
        let mut state = self.state();
        state.record(format!("fs remove {}", path.display()))?;
        Ok(state.files.remove(path).is_some())
    }
}

impl PackageManager for FakeHost {
    fn installed_version(&self, name: &str) -> Result<Option<String>, HostError> {
        let mut state = self.state();
        state.record(format!("pkg query {name}"))?;
        Ok(state.packages.get(name).cloned())
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("pkg install {name}"))?;
        if state.unknown_packages.contains(name) {
            return Err(HostError::NotFound {
                what: format!("package {name}"),
            });
        }
        let version = version.map_or_else(|| state.candidate_version.clone(), str::to_string);
        state.packages.insert(name.to_string(), version);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("pkg remove {name}"))?;
        state.packages.remove(name);
        Ok(())
    }

    fn update(&self) -> Result<(), HostError> {
        let mut state = self.state();
        state.record("pkg update".to_string())?;
        state.last_update = Some(SystemTime::now());
        Ok(())
    }

    fn last_update(&self) -> Result<Option<SystemTime>, HostError> {
        Ok(self.state().last_update)
    }

    fn codename(&self) -> Result<String, HostError> {
        Ok(self.state().codename.clone())
    }
}

impl ModuleLoader for FakeHost {
    fn is_loaded(&self, module: &str) -> Result<bool, HostError> {
        let mut state = self.state();
        state.record(format!("kmod query {module}"))?;
        Ok(state.modules.contains(module))
    }

    fn load(&self, module: &str) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("kmod load {module}"))?;
        state.modules.insert(module.to_string());
        Ok(())
    }

    fn unload(&self, module: &str) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("kmod unload {module}"))?;
        state.modules.remove(module);
        Ok(())
    }
}

impl SysctlBackend for FakeHost {
    fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        let mut state = self.state();
        state.record(format!("sysctl read {key}"))?;
        Ok(state.sysctl.get(key).cloned())
    }

    fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("sysctl write {key}={value}"))?;
        state.sysctl.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

impl ServiceController for FakeHost {
    fn status(&self, name: &str) -> Result<ServiceStatus, HostError> {
        let mut state = self.state();
        state.record(format!("svc status {name}"))?;
        state
            .services
            .get(name)
            .copied()
            .ok_or_else(|| HostError::NotFound {
                what: format!("unit {name}.service"),
            })
    }

    fn perform(&self, name: &str, action: Action) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("svc {action} {name}"))?;
        let status = state.services.entry(name.to_string()).or_default();
        match action {
            Action::Enable => status.enabled = true,
            Action::Disable => status.enabled = false,
            Action::Start | Action::Restart | Action::Reload => status.running = true,
            Action::Stop => status.running = false,
            other => return Err(HostError::Other(format!("unsupported service action {other}"))),
        }
        Ok(())
    }
}

impl MountController for FakeHost {
    fn active_swaps(&self) -> Result<Vec<String>, HostError> {
        let mut state = self.state();
        state.record("swap query".to_string())?;
        Ok(state.swaps.clone())
    }

    fn swap_off_all(&self) -> Result<(), HostError> {
        let mut state = self.state();
        state.record("swap off".to_string())?;
        state.swaps.clear();
        Ok(())
    }

    fn swap_on_all(&self) -> Result<(), HostError> {
        let mut state = self.state();
        state.record("swap on".to_string())?;
        if state.swaps.is_empty() {
            state.swaps.push("/swap.img".to_string());
        }
        Ok(())
    }

    fn is_mounted(&self, mount_point: &Path) -> Result<bool, HostError> {
        Ok(self.state().mounted.contains(mount_point))
    }

    fn mount(&self, mount_point: &Path) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("mount {}", mount_point.display()))?;
        state.mounted.insert(mount_point.to_path_buf());
        Ok(())
    }

    fn unmount(&self, mount_point: &Path) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("umount {}", mount_point.display()))?;
        state.mounted.remove(mount_point);
        Ok(())
    }
}

impl UserDirectory for FakeHost {
    fn lookup_user(&self, name: &str) -> Result<Option<UserEntry>, HostError> {
        Ok(self.state().users.get(name).cloned())
    }

    fn lookup_group(&self, name: &str) -> Result<Option<u32>, HostError> {
        Ok(self.state().groups.get(name).copied())
    }

    fn password_hash(&self, name: &str) -> Result<Option<String>, HostError> {
        Ok(self.state().passwords.get(name).cloned())
    }

    fn create_user(&self, spec: &UserSpec) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("user create {}", spec.name))?;
        let entry = UserEntry {
            name: spec.name.clone(),
            uid: spec.uid.unwrap_or(1000),
            gid: spec.gid.unwrap_or(100),
            home: spec
                .home
                .clone()
                .unwrap_or_else(|| PathBuf::from(format!("/home/{}", spec.name))),
            shell: spec.shell.clone().unwrap_or_else(|| "/bin/sh".to_string()),
            comment: spec.comment.clone().unwrap_or_default(),
        };
        state.users.insert(spec.name.clone(), entry);
        if let Some(hash) = &spec.password_hash {
            state.passwords.insert(spec.name.clone(), hash.clone());
        }
        Ok(())
    }

    fn modify_user(&self, spec: &UserSpec) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("user modify {}", spec.name))?;
        if let Some(hash) = &spec.password_hash {
            state.passwords.insert(spec.name.clone(), hash.clone());
        }
        let entry = state
            .users
            .get_mut(&spec.name)
            .ok_or_else(|| HostError::NotFound {
                what: format!("user {}", spec.name),
            })?;
        if let Some(uid) = spec.uid {
            entry.uid = uid;
        }
        if let Some(gid) = spec.gid {
            entry.gid = gid;
        }
        if let Some(home) = &spec.home {
            entry.home = home.clone();
        }
        if let Some(shell) = &spec.shell {
            entry.shell = shell.clone();
        }
        if let Some(comment) = &spec.comment {
            entry.comment = comment.clone();
        }
        Ok(())
    }

    fn remove_user(&self, name: &str, _remove_home: bool) -> Result<(), HostError> {
        let mut state = self.state();
        state.record(format!("user remove {name}"))?;
        state.users.remove(name);
        state.passwords.remove(name);
        Ok(())
    }
}

impl KeyFetcher for FakeHost {
    fn fetch(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, HostError> {
        let mut state = self.state();
        state.record(format!("key fetch {url}"))?;
        state.keys.get(url).cloned().ok_or_else(|| HostError::Network {
            message: format!("404 fetching {url}"),
        })
    }
}

impl SecretProvider for FakeHost {
    fn secret(&self, key: &str) -> Result<String, HostError> {
        self.state()
            .secrets
            .get(key)
            .cloned()
            .ok_or_else(|| HostError::SecretUnavailable {
                key: key.to_string(),
            })
    }
}
