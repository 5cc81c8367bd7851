//! apt / dpkg package manager backend.

use crate::classify::check;
use crate::retry::{LogCallback, RetryConfig, with_retry};
use converge::{HostError, PackageManager, ProcessExecutor};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// Written by apt's periodic job and by us after every successful update
const UPDATE_STAMP: &str = "/var/lib/apt/periodic/update-success-stamp";
const LISTS_DIR: &str = "/var/lib/apt/lists";
const OS_RELEASE: &str = "/etc/os-release";

/// Packages through `apt-get`, queried through `dpkg-query`
pub struct Apt {
    exec: Arc<dyn ProcessExecutor>,
    timeout: Duration,
    retry: RetryConfig,
    stamp: PathBuf,
    os_release: PathBuf,
}

impl Apt {
    pub fn new(exec: Arc<dyn ProcessExecutor>, timeout: Duration, retry: RetryConfig) -> Self {
        Self {
            exec,
            timeout,
            retry,
            stamp: PathBuf::from(UPDATE_STAMP),
            os_release: PathBuf::from(OS_RELEASE),
        }
    }

    /// Use a different update stamp and os-release file
    pub fn with_paths(mut self, stamp: PathBuf, os_release: PathBuf) -> Self {
        self.stamp = stamp;
        self.os_release = os_release;
        self
    }

    /// Run `apt-get` non-interactively, retrying network failures
    fn apt_get(&self, args: &[&str], subject: Option<&str>) -> Result<(), HostError> {
        let mut full = vec!["DEBIAN_FRONTEND=noninteractive", "apt-get", "-q", "-y"];
        full.extend_from_slice(args);
        let rendered = format!("apt-get {}", args.join(" "));

        let callback = LogCallback { operation: &rendered };
        with_retry(&self.retry, Some(&callback), || {
            let output = self.exec.run("env", &full, self.timeout)?;
            check(&rendered, output, subject).map(|_| ())
        })
    }
}

/// Version from `dpkg-query -W -f '${Status}\t${Version}'`, when installed
fn parse_dpkg_status(line: &str) -> Option<String> {
    let (status, version) = line.trim().split_once('\t')?;
    (status.split_whitespace().last() == Some("installed") && !version.is_empty())
        .then(|| version.to_string())
}

/// Release codename from os-release content
fn parse_codename(os_release: &str) -> Option<String> {
    let field = |key: &str| {
        os_release.lines().find_map(|line| {
            line.strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
                .map(|v| v.trim().trim_matches('"').to_string())
                .filter(|v| !v.is_empty())
        })
    };
    field("VERSION_CODENAME").or_else(|| field("UBUNTU_CODENAME"))
}

impl PackageManager for Apt {
    fn installed_version(&self, name: &str) -> Result<Option<String>, HostError> {
        let output = self
            .exec
            .run("dpkg-query", &["-W", "-f=${Status}\t${Version}", name], self.timeout)?;
        // dpkg-query exits 1 for packages it has never heard of
        if !output.success {
            return Ok(None);
        }
        Ok(parse_dpkg_status(&output.stdout_str()))
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<(), HostError> {
        let spec = version.map_or_else(|| name.to_string(), |v| format!("{name}={v}"));
        self.apt_get(&["install", &spec], Some(&format!("package {name}")))
    }

    fn remove(&self, name: &str) -> Result<(), HostError> {
        self.apt_get(&["remove", name], Some(&format!("package {name}")))
    }

    fn update(&self) -> Result<(), HostError> {
        self.apt_get(&["update"], None)?;
        if let Some(parent) = self.stamp.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HostError::io(parent, e))?;
        }
        std::fs::write(&self.stamp, b"").map_err(|e| HostError::io(&self.stamp, e))
    }

    fn last_update(&self) -> Result<Option<SystemTime>, HostError> {
        for path in [self.stamp.as_path(), std::path::Path::new(LISTS_DIR)] {
            match std::fs::metadata(path) {
                Ok(meta) => return meta.modified().map(Some).map_err(|e| HostError::io(path, e)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(HostError::io(path, e)),
            }
        }
        Ok(None)
    }

    fn codename(&self) -> Result<String, HostError> {
        if let Ok(content) = std::fs::read_to_string(&self.os_release)
            && let Some(codename) = parse_codename(&content)
        {
            return Ok(codename);
        }
        let codename = self.exec.run_capture("lsb_release", &["-cs"], self.timeout)?;
        let codename = codename.trim();
        if codename.is_empty() {
            return Err(HostError::NotFound {
                what: "release codename".to_string(),
            });
        }
        Ok(codename.to_string())
    }
}
