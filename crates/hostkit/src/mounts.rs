//! Swap and mount state from `/proc/swaps` and `/proc/mounts`.

use crate::classify::check;
use converge::{HostError, MountController, ProcessExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

pub struct Mounts {
    exec: Arc<dyn ProcessExecutor>,
    timeout: Duration,
    proc_swaps: PathBuf,
    proc_mounts: PathBuf,
}

/// Device column of `/proc/swaps`, header skipped
fn parse_swaps(content: &str) -> Vec<String> {
    content
        .lines()
        .skip(1)
        .filter_map(|line| line.split_whitespace().next())
        .map(unescape)
        .collect()
}

/// Mount point column of `/proc/mounts`
fn mount_points(content: &str) -> impl Iterator<Item = String> + '_ {
    content
        .lines()
        .filter_map(|line| line.split_whitespace().nth(1))
        .map(unescape)
}

/// Undo the octal escapes the kernel uses for whitespace in paths
fn unescape(field: &str) -> String {
    field
        .replace("\\040", " ")
        .replace("\\011", "\t")
        .replace("\\012", "\n")
        .replace("\\134", "\\")
}

impl Mounts {
    pub fn new(exec: Arc<dyn ProcessExecutor>, timeout: Duration) -> Self {
        Self {
            exec,
            timeout,
            proc_swaps: PathBuf::from("/proc/swaps"),
            proc_mounts: PathBuf::from("/proc/mounts"),
        }
    }

    pub fn with_paths(mut self, proc_swaps: PathBuf, proc_mounts: PathBuf) -> Self {
        self.proc_swaps = proc_swaps;
        self.proc_mounts = proc_mounts;
        self
    }

    fn read(path: &Path) -> Result<String, HostError> {
        std::fs::read_to_string(path).map_err(|e| HostError::io(path, e))
    }

    fn command(&self, program: &str, args: &[&str]) -> Result<(), HostError> {
        let output = self.exec.run(program, args, self.timeout)?;
        let rendered = converge::host::command_line(program, args);
        check(&rendered, output, None).map(|_| ())
    }
}

impl MountController for Mounts {
    fn active_swaps(&self) -> Result<Vec<String>, HostError> {
        Ok(parse_swaps(&Self::read(&self.proc_swaps)?))
    }

    fn swap_off_all(&self) -> Result<(), HostError> {
        self.command("swapoff", &["-a"])
    }

    fn swap_on_all(&self) -> Result<(), HostError> {
        self.command("swapon", &["-a"])
    }

    fn is_mounted(&self, mount_point: &Path) -> Result<bool, HostError> {
        let mounts = Self::read(&self.proc_mounts)?;
        Ok(mount_points(&mounts).any(|p| Path::new(&p) == mount_point))
    }

    fn mount(&self, mount_point: &Path) -> Result<(), HostError> {
        self.command("mount", &[&mount_point.to_string_lossy()])
    }

    fn unmount(&self, mount_point: &Path) -> Result<(), HostError> {
        self.command("umount", &[&mount_point.to_string_lossy()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::SystemExecutor;

    const SWAPS: &str = "\
Filename\t\t\t\tType\t\tSize\t\tUsed\t\tPriority
/swap.img                               file\t\t2097148\t\t0\t\t-2
/dev/sda2                               partition\t8388604\t\t0\t\t-3
";

    const MOUNTS: &str = "\
/dev/sda1 / ext4 rw,relatime 0 0
proc /proc proc rw,nosuid,nodev,noexec,relatime 0 0
/dev/sdb1 /var/lib/container\\040data xfs rw 0 0
";

    #[test]
    fn test_parse_swaps() {
        assert_eq!(parse_swaps(SWAPS), vec!["/swap.img", "/dev/sda2"]);
        assert!(parse_swaps("Filename\tType\tSize\tUsed\tPriority\n").is_empty());
    }

    #[test]
    fn test_is_mounted_handles_escaped_spaces() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("swaps"), SWAPS).unwrap();
        std::fs::write(dir.path().join("mounts"), MOUNTS).unwrap();
        let mounts = Mounts::new(Arc::new(SystemExecutor), Duration::from_secs(5))
            .with_paths(dir.path().join("swaps"), dir.path().join("mounts"));

        assert!(mounts.is_mounted(Path::new("/var/lib/container data")).unwrap());
        assert!(mounts.is_mounted(Path::new("/")).unwrap());
        assert!(!mounts.is_mounted(Path::new("/mnt/data")).unwrap());
        assert_eq!(mounts.active_swaps().unwrap().len(), 2);
    }
}
