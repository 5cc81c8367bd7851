//! systemd units through `systemctl`.

use crate::classify::check;
use converge::{Action, HostError, ProcessExecutor, ServiceController, ServiceStatus};
use std::sync::Arc;
use std::time::Duration;

pub struct Systemd {
    exec: Arc<dyn ProcessExecutor>,
    timeout: Duration,
}

impl Systemd {
    pub fn new(exec: Arc<dyn ProcessExecutor>, timeout: Duration) -> Self {
        Self { exec, timeout }
    }
}

/// Parse `systemctl show -p LoadState,UnitFileState,ActiveState` output.
///
/// `None` when the unit is not known to systemd.
fn parse_show(output: &str) -> Option<ServiceStatus> {
    let field = |key: &str| {
        output
            .lines()
            .find_map(|line| line.strip_prefix(key)?.strip_prefix('='))
            .unwrap_or_default()
            .trim()
    };
    if matches!(field("LoadState"), "not-found" | "") {
        return None;
    }
    Some(ServiceStatus {
        enabled: matches!(
            field("UnitFileState"),
            "enabled" | "enabled-runtime" | "static" | "alias" | "indirect" | "generated"
        ),
        running: matches!(field("ActiveState"), "active" | "reloading" | "activating"),
    })
}

fn verb(action: Action) -> Option<&'static str> {
    match action {
        Action::Enable => Some("enable"),
        Action::Disable => Some("disable"),
        Action::Start => Some("start"),
        Action::Stop => Some("stop"),
        Action::Restart => Some("restart"),
        Action::Reload => Some("reload"),
        _ => None,
    }
}

impl ServiceController for Systemd {
    fn status(&self, name: &str) -> Result<ServiceStatus, HostError> {
        let stdout = self.exec.run_capture(
            "systemctl",
            &["show", "-p", "LoadState,UnitFileState,ActiveState", name],
            self.timeout,
        )?;
        parse_show(&stdout).ok_or_else(|| HostError::NotFound {
            what: format!("unit {name}"),
        })
    }

    fn perform(&self, name: &str, action: Action) -> Result<(), HostError> {
        let verb = verb(action)
            .ok_or_else(|| HostError::Other(format!("`{action}` is not a service action")))?;
        let output = self.exec.run("systemctl", &[verb, name], self.timeout)?;
        check(&format!("systemctl {verb} {name}"), output, Some(&format!("unit {name}"))).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_and_running() {
        let show = "LoadState=loaded\nUnitFileState=enabled\nActiveState=active\n";
        assert_eq!(
            parse_show(show),
            Some(ServiceStatus {
                enabled: true,
                running: true
            })
        );
    }

    #[test]
    fn test_disabled_and_stopped() {
        let show = "LoadState=loaded\nUnitFileState=disabled\nActiveState=inactive\n";
        assert_eq!(parse_show(show), Some(ServiceStatus::default()));
    }

    #[test]
    fn test_unknown_unit() {
        let show = "LoadState=not-found\nUnitFileState=\nActiveState=inactive\n";
        assert_eq!(parse_show(show), None);
    }

    #[test]
    fn test_only_service_actions_have_verbs() {
        assert_eq!(verb(Action::Restart), Some("restart"));
        assert_eq!(verb(Action::Install), None);
    }
}
