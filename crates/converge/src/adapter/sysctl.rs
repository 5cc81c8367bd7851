use super::{ResourceAdapter, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Properties, Resource, SysctlProps};
use crate::types::{Observation, ResourceState};
use std::path::PathBuf;

/// Kernel parameters, set live and persisted under a sysctl.d directory
pub struct SysctlAdapter;

/// Collapse runs of whitespace; the kernel reports tabs between multi-value fields
fn normalize(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn persist_path(key: &str, props: &SysctlProps) -> PathBuf {
    props.conf_dir.join(format!("99-nodeprep-{key}.conf"))
}

fn persist_line(key: &str, props: &SysctlProps) -> String {
    format!("{key} = {}\n", normalize(&props.value))
}

fn live_value(key: &str, host: &Host<'_>) -> Result<String, HostError> {
    host.sysctl
        .read(key)?
        .map(|v| normalize(&v))
        .ok_or_else(|| HostError::NotFound {
            what: format!("sysctl key {key}"),
        })
}

impl ResourceAdapter for SysctlAdapter {
    fn kind(&self) -> Kind {
        Kind::SysctlParam
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::SysctlParam(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let key = resource.name();
        let path = persist_path(key, props);

        match action {
            Action::Apply => {
                let live = live_value(key, host)?;
                let persisted = host.fs.read_string(&path)?.as_deref() == Some(persist_line(key, props).as_str());
                let describe = |value: &str, persisted: bool| {
                    ResourceState::present(format!(
                        "{value} ({})",
                        if persisted { "persisted" } else { "not persisted" }
                    ))
                };
                Ok(Observation::new(
                    describe(&live, persisted),
                    describe(&normalize(&props.value), true),
                ))
            }
            Action::Remove => Ok(Observation::presence(host.fs.exists(&path)?, false)),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::SysctlParam(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let key = resource.name();
        let path = persist_path(key, props);

        match action {
            Action::Apply => {
                let mut changed = false;
                let wanted = normalize(&props.value);
                if live_value(key, host)? != wanted {
                    host.sysctl.write(key, &wanted)?;
                    log::info!("set {key} = {wanted}");
                    changed = true;
                }

                let line = persist_line(key, props);
                if host.fs.read_string(&path)?.as_deref() != Some(line.as_str()) {
                    host.fs.write(&path, line.as_bytes())?;
                    log::info!("persisted {key} to {}", path.display());
                    changed = true;
                }
                Ok(changed)
            }
            Action::Remove => host.fs.remove(&path),
            other => Err(unsupported(resource, other)),
        }
    }
}
