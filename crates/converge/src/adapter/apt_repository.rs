use super::{ResourceAdapter, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, AptRepositoryProps, Kind, Properties, Resource};
use crate::types::{Observation, ResourceState};
use std::path::PathBuf;

const SOURCES_DIR: &str = "/etc/apt/sources.list.d";
const KEYRINGS_DIR: &str = "/etc/apt/keyrings";

/// Third-party apt sources with their signing keys
pub struct AptRepositoryAdapter;

struct Layout {
    list: PathBuf,
    keyring: Option<PathBuf>,
}

impl Layout {
    /// A keyring path only exists when the repository has a key
    fn new(name: &str, props: &AptRepositoryProps) -> Self {
        Self {
            list: PathBuf::from(SOURCES_DIR).join(format!("{name}.list")),
            keyring: props.key.as_ref().map(|_| {
                props
                    .keyring
                    .clone()
                    .unwrap_or_else(|| PathBuf::from(KEYRINGS_DIR).join(format!("{name}.asc")))
            }),
        }
    }
}

/// `deb [arch=.. signed-by=..] uri distribution components`
fn source_line(props: &AptRepositoryProps, layout: &Layout, distribution: &str) -> String {
    let mut options = Vec::new();
    if let Some(arch) = &props.arch {
        options.push(format!("arch={arch}"));
    }
    if let Some(keyring) = &layout.keyring {
        options.push(format!("signed-by={}", keyring.display()));
    }
    let options = if options.is_empty() {
        String::new()
    } else {
        format!("[{}] ", options.join(" "))
    };
    format!(
        "deb {options}{} {distribution} {}\n",
        props.uri,
        props.components.join(" ")
    )
}

fn distribution(props: &AptRepositoryProps, host: &Host<'_>) -> Result<String, HostError> {
    match &props.distribution {
        Some(d) => Ok(d.clone()),
        None => host.packages.codename(),
    }
}

impl ResourceAdapter for AptRepositoryAdapter {
    fn kind(&self) -> Kind {
        Kind::AptRepository
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::AptRepository(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let layout = Layout::new(resource.name(), props);

        match action {
            Action::Add => {
                let line = source_line(props, &layout, &distribution(props, host)?);
                let list = match host.fs.read_string(&layout.list)? {
                    None => "missing",
                    Some(existing) if existing == line => "current",
                    Some(_) => "stale",
                };
                let key_present = match &layout.keyring {
                    Some(keyring) => host.fs.exists(keyring)?,
                    None => true,
                };
                let current = ResourceState::present(format!(
                    "source {list}, key {}",
                    if key_present { "present" } else { "missing" }
                ));
                Ok(Observation::new(
                    current,
                    ResourceState::present("source current, key present"),
                ))
            }
            Action::Remove => {
                let keyring_present = match &layout.keyring {
                    Some(keyring) => host.fs.exists(keyring)?,
                    None => false,
                };
                Ok(Observation::presence(
                    host.fs.exists(&layout.list)? || keyring_present,
                    false,
                ))
            }
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::AptRepository(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let layout = Layout::new(resource.name(), props);

        match action {
            Action::Add => {
                let mut changed = false;

                if let (Some(url), Some(keyring)) = (&props.key, &layout.keyring)
                    && !host.fs.exists(keyring)?
                {
                    let key = host.keys.fetch(url, host.timeout)?;
                    host.fs.write(keyring, &key)?;
                    host.fs.set_mode(keyring, 0o644)?;
                    log::info!("installed signing key {}", keyring.display());
                    changed = true;
                }

                let line = source_line(props, &layout, &distribution(props, host)?);
                if host.fs.read_string(&layout.list)?.as_deref() != Some(line.as_str()) {
                    host.fs.write(&layout.list, line.as_bytes())?;
                    log::info!("wrote {}", layout.list.display());
                    changed = true;
                }

                if changed {
                    host.packages.update()?;
                }
                Ok(changed)
            }
            Action::Remove => {
                let mut changed = host.fs.remove(&layout.list)?;
                if let Some(keyring) = &layout.keyring {
                    changed |= host.fs.remove(keyring)?;
                }
                if changed {
                    host.packages.update()?;
                }
                Ok(changed)
            }
            other => Err(unsupported(resource, other)),
        }
    }
}
