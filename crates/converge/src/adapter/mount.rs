use super::{ResourceAdapter, labelled, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, MountProps, Properties, Resource};
use crate::types::{Observation, ResourceState};
use std::path::Path;

pub const FSTAB: &str = "/etc/fstab";

/// Prefix of swap lines this tool commented out, so `enable` only restores those
const DISABLED_MARKER: &str = "# nodeprep-disabled: ";

/// Swap (name `swap` or fstype `swap`) and fstab-backed mount points
pub struct MountAdapter;

fn is_swap(resource: &Resource, props: &MountProps) -> bool {
    resource.name() == "swap" || props.fstype.as_deref() == Some("swap")
}

fn fields(line: &str) -> Option<Vec<&str>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(trimmed.split_whitespace().collect())
}

fn is_swap_line(line: &str) -> bool {
    fields(line).is_some_and(|f| f.get(2) == Some(&"swap"))
}

fn join_lines(lines: &[String]) -> String {
    let mut text = lines.join("\n");
    text.push('\n');
    text
}

/// Comment out active swap lines; returns the new text and how many changed
fn comment_swap_lines(fstab: &str) -> (String, usize) {
    let mut count = 0;
    let lines: Vec<String> = fstab
        .lines()
        .map(|line| {
            if is_swap_line(line) {
                count += 1;
                format!("{DISABLED_MARKER}{line}")
            } else {
                line.to_string()
            }
        })
        .collect();
    (join_lines(&lines), count)
}

/// Restore swap lines previously commented by [`comment_swap_lines`]
fn restore_swap_lines(fstab: &str) -> (String, usize) {
    let mut count = 0;
    let lines: Vec<String> = fstab
        .lines()
        .map(|line| match line.strip_prefix(DISABLED_MARKER) {
            Some(original) => {
                count += 1;
                original.to_string()
            }
            None => line.to_string(),
        })
        .collect();
    (join_lines(&lines), count)
}

fn entry_for<'a>(fstab: &'a str, mount_point: &str) -> Option<&'a str> {
    fstab
        .lines()
        .find(|line| fields(line).is_some_and(|f| f.get(1) == Some(&mount_point)))
}

fn render_entry(mount_point: &str, props: &MountProps) -> String {
    format!(
        "{} {} {} {} 0 0",
        props.device.as_deref().unwrap_or("none"),
        mount_point,
        props.fstype.as_deref().unwrap_or("auto"),
        props.options
    )
}

/// Replace the entry for `mount_point`, or append one
fn upsert_entry(fstab: &str, mount_point: &str, entry: &str) -> String {
    let mut replaced = false;
    let mut lines: Vec<String> = fstab
        .lines()
        .map(|line| {
            if !replaced && fields(line).is_some_and(|f| f.get(1) == Some(&mount_point)) {
                replaced = true;
                entry.to_string()
            } else {
                line.to_string()
            }
        })
        .collect();
    if !replaced {
        lines.push(entry.to_string());
    }
    join_lines(&lines)
}

fn remove_entry(fstab: &str, mount_point: &str) -> String {
    let lines: Vec<String> = fstab
        .lines()
        .filter(|line| !fields(line).is_some_and(|f| f.get(1) == Some(&mount_point)))
        .map(str::to_string)
        .collect();
    join_lines(&lines)
}

fn read_fstab(host: &Host<'_>) -> Result<String, HostError> {
    Ok(host.fs.read_string(Path::new(FSTAB))?.unwrap_or_default())
}

fn write_fstab(host: &Host<'_>, text: &str) -> Result<(), HostError> {
    host.fs.write(Path::new(FSTAB), text.as_bytes())
}

impl ResourceAdapter for MountAdapter {
    fn kind(&self) -> Kind {
        Kind::Mount
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::Mount(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let fstab = read_fstab(host)?;

        if is_swap(resource, props) {
            let active = host.mounts.active_swaps()?;
            let configured = fstab.lines().filter(|l| is_swap_line(l)).count();
            let current = if active.is_empty() && configured == 0 {
                ResourceState::Absent
            } else {
                ResourceState::present(format!(
                    "{} active, {configured} in fstab",
                    active.len()
                ))
            };
            return match action {
                Action::Disable => Ok(Observation::new(current, ResourceState::Absent)),
                Action::Enable => {
                    let (_, disabled) = restore_swap_lines(&fstab);
                    let on = disabled == 0 && (!active.is_empty() || configured == 0);
                    Ok(Observation::new(labelled(on, "on", "off"), ResourceState::present("on")))
                }
                other => Err(unsupported(resource, other)),
            };
        }

        let mount_point = resource.name();
        let mounted = host.mounts.is_mounted(Path::new(mount_point))?;
        let entry = entry_for(&fstab, mount_point);
        match action {
            Action::Enable => {
                let wanted = render_entry(mount_point, props);
                let current = match entry {
                    None => ResourceState::Absent,
                    Some(line) => ResourceState::present(format!(
                        "{} ({})",
                        fields(line).unwrap_or_default().join(" "),
                        if mounted { "mounted" } else { "not mounted" }
                    )),
                };
                Ok(Observation::new(current, ResourceState::present(format!("{wanted} (mounted)"))))
            }
            Action::Disable => Ok(Observation::presence(mounted || entry.is_some(), false)),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::Mount(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let fstab = read_fstab(host)?;

        if is_swap(resource, props) {
            return match action {
                Action::Disable => disable_swap(host, &fstab),
                Action::Enable => enable_swap(host, &fstab),
                other => Err(unsupported(resource, other)),
            };
        }

        let mount_point = resource.name();
        let path = Path::new(mount_point);
        let mut changed = false;
        match action {
            Action::Enable => {
                let wanted = render_entry(mount_point, props);
                let has_entry = entry_for(&fstab, mount_point)
                    .and_then(fields)
                    .is_some_and(|f| f.join(" ") == wanted);
                if !has_entry {
                    write_fstab(host, &upsert_entry(&fstab, mount_point, &wanted))?;
                    changed = true;
                }
                if !host.mounts.is_mounted(path)? {
                    host.mounts.mount(path)?;
                    log::info!("mounted {mount_point}");
                    changed = true;
                }
            }
            Action::Disable => {
                if host.mounts.is_mounted(path)? {
                    host.mounts.unmount(path)?;
                    log::info!("unmounted {mount_point}");
                    changed = true;
                }
                if entry_for(&fstab, mount_point).is_some() {
                    write_fstab(host, &remove_entry(&fstab, mount_point))?;
                    changed = true;
                }
            }
            other => return Err(unsupported(resource, other)),
        }
        Ok(changed)
    }
}

fn disable_swap(host: &Host<'_>, fstab: &str) -> Result<bool, HostError> {
    let mut changed = false;
    let active = host.mounts.active_swaps()?;
    if !active.is_empty() {
        host.mounts.swap_off_all()?;
        log::info!("turned off swap on {}", active.join(", "));
        changed = true;
    }

    let (commented, count) = comment_swap_lines(fstab);
    if count > 0 {
        write_fstab(host, &commented)?;
        log::info!("commented out {count} swap entries in {FSTAB}");
        changed = true;
    }
    Ok(changed)
}

fn enable_swap(host: &Host<'_>, fstab: &str) -> Result<bool, HostError> {
    let mut changed = false;
    let (restored, count) = restore_swap_lines(fstab);
    if count > 0 {
        write_fstab(host, &restored)?;
        changed = true;
    }

    let configured = restored.lines().any(is_swap_line);
    if configured && host.mounts.active_swaps()?.is_empty() {
        host.mounts.swap_on_all()?;
        log::info!("turned on swap");
        changed = true;
    }
    Ok(changed)
}
