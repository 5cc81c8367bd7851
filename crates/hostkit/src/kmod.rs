//! Kernel modules through `/proc/modules`, `/sys/module` and `modprobe`.

use crate::classify::check;
use converge::{HostError, ModuleLoader, ProcessExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub struct Kmod {
    exec: Arc<dyn ProcessExecutor>,
    timeout: Duration,
    proc_modules: PathBuf,
    sys_module: PathBuf,
}

/// Module names treat `-` and `_` as the same character
fn canonical(name: &str) -> String {
    name.replace('-', "_")
}

fn listed(proc_modules: &str, module: &str) -> bool {
    let wanted = canonical(module);
    proc_modules
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .any(|name| canonical(name) == wanted)
}

impl Kmod {
    pub fn new(exec: Arc<dyn ProcessExecutor>, timeout: Duration) -> Self {
        Self {
            exec,
            timeout,
            proc_modules: PathBuf::from("/proc/modules"),
            sys_module: PathBuf::from("/sys/module"),
        }
    }

    pub fn with_paths(mut self, proc_modules: PathBuf, sys_module: PathBuf) -> Self {
        self.proc_modules = proc_modules;
        self.sys_module = sys_module;
        self
    }

    fn modprobe(&self, args: &[&str], module: &str) -> Result<(), HostError> {
        let output = self.exec.run("modprobe", args, self.timeout)?;
        let rendered = format!("modprobe {}", args.join(" "));
        check(&rendered, output, Some(&format!("kernel module {module}"))).map(|_| ())
    }
}

impl ModuleLoader for Kmod {
    /// Loadable modules show up in `/proc/modules`; built-in ones only under
    /// `/sys/module`, and count as loaded.
    fn is_loaded(&self, module: &str) -> Result<bool, HostError> {
        let modules = std::fs::read_to_string(&self.proc_modules)
            .map_err(|e| HostError::io(&self.proc_modules, e))?;
        if listed(&modules, module) {
            return Ok(true);
        }
        Ok(self.sys_module.join(canonical(module)).exists())
    }

    fn load(&self, module: &str) -> Result<(), HostError> {
        self.modprobe(&[module], module)
    }

    fn unload(&self, module: &str) -> Result<(), HostError> {
        self.modprobe(&["-r", module], module)
    }
}
