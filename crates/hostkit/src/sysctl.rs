//! Kernel parameters read from `/proc/sys`, written with `sysctl -w`.

use crate::classify::check;
use converge::{HostError, ProcessExecutor, SysctlBackend};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct ProcSysctl {
    exec: Arc<dyn ProcessExecutor>,
    timeout: Duration,
    root: PathBuf,
}

impl ProcSysctl {
    pub fn new(exec: Arc<dyn ProcessExecutor>, timeout: Duration) -> Self {
        Self {
            exec,
            timeout,
            root: PathBuf::from("/proc/sys"),
        }
    }

    pub fn with_root(mut self, root: PathBuf) -> Self {
        self.root = root;
        self
    }

    /// `net.ipv4.ip_forward` -> `<root>/net/ipv4/ip_forward`
    fn path_for(&self, key: &str) -> PathBuf {
        key.split(['.', '/']).fold(self.root.clone(), |path, part| path.join(part))
    }
}

impl SysctlBackend for ProcSysctl {
    fn read(&self, key: &str) -> Result<Option<String>, HostError> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(HostError::io(&path, e)),
        }
    }

    fn write(&self, key: &str, value: &str) -> Result<(), HostError> {
        let assignment = format!("{key}={value}");
        let output = self.exec.run("sysctl", &["-w", &assignment], self.timeout)?;
        check(&format!("sysctl -w {assignment}"), output, Some(&format!("sysctl {key}"))).map(|_| ())
    }
}
