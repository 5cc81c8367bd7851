use super::{ResourceAdapter, resolve_group, resolve_user, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, FileProps, Kind, Properties, Resource};
use crate::types::{Observation, ResourceState};
use std::path::Path;

/// Plain files: content, mode and ownership
pub struct FileAdapter;

/// The managed facets of a file; unmanaged facets stay `None`
#[derive(Debug, Default, PartialEq, Eq)]
struct Facets {
    hash: Option<String>,
    mode: Option<u32>,
    uid: Option<u32>,
    gid: Option<u32>,
}

impl Facets {
    fn desired(props: &FileProps, host: &Host<'_>) -> Result<Self, HostError> {
        Ok(Self {
            hash: props.content.as_deref().map(|c| content_hash(c.as_bytes())),
            mode: props.mode,
            uid: props.owner.as_deref().map(|o| resolve_user(o, host)).transpose()?,
            gid: props.group.as_deref().map(|g| resolve_group(g, host)).transpose()?,
        })
    }

    /// Facets of the file on disk, `None` when it does not exist
    fn current(path: &Path, props: &FileProps, host: &Host<'_>) -> Result<Option<Self>, HostError> {
        let Some(meta) = host.fs.stat(path)? else {
            return Ok(None);
        };
        let hash = if props.content.is_some() {
            host.fs.read(path)?.map(|bytes| content_hash(&bytes))
        } else {
            None
        };
        Ok(Some(Self {
            hash,
            mode: props.mode.map(|_| meta.mode & 0o7777),
            uid: props.owner.as_ref().map(|_| meta.uid),
            gid: props.group.as_ref().map(|_| meta.gid),
        }))
    }

    fn state(&self) -> ResourceState {
        let mut parts = Vec::new();
        if let Some(hash) = &self.hash {
            parts.push(format!("content {}", &hash[..16]));
        }
        if let Some(mode) = self.mode {
            parts.push(format!("mode {mode:04o}"));
        }
        if let Some(uid) = self.uid {
            parts.push(format!("owner {uid}"));
        }
        if let Some(gid) = self.gid {
            parts.push(format!("group {gid}"));
        }
        if parts.is_empty() {
            ResourceState::Present { details: None }
        } else {
            ResourceState::present(parts.join(", "))
        }
    }
}

fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

impl ResourceAdapter for FileAdapter {
    fn kind(&self) -> Kind {
        Kind::File
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::File(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let path = Path::new(resource.name());

        match action {
            Action::Create => {
                let desired = Facets::desired(props, host)?;
                let current = Facets::current(path, props, host)?;
                Ok(Observation::new(
                    current.map_or(ResourceState::Absent, |c| c.state()),
                    desired.state(),
                ))
            }
            Action::Delete => Ok(Observation::presence(host.fs.exists(path)?, false)),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::File(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let path = Path::new(resource.name());

        match action {
            Action::Create => create(path, props, host),
            Action::Delete => {
                let existed = host.fs.remove(path)?;
                if existed {
                    log::info!("deleted {}", path.display());
                }
                Ok(existed)
            }
            other => Err(unsupported(resource, other)),
        }
    }
}

fn create(path: &Path, props: &FileProps, host: &Host<'_>) -> Result<bool, HostError> {
    let desired = Facets::desired(props, host)?;
    let mut changed = false;

    let needs_write = match (host.fs.read(path)?, &desired.hash) {
        (None, _) => true,
        (Some(existing), Some(hash)) => &content_hash(&existing) != hash,
        (Some(_), None) => false,
    };
    if needs_write {
        let content = props.content.as_deref().unwrap_or_default();
        host.fs.write(path, content.as_bytes())?;
        log::info!("wrote {} ({} bytes)", path.display(), content.len());
        changed = true;
    }

    let meta = host.fs.stat(path)?.ok_or_else(|| HostError::NotFound {
        what: path.display().to_string(),
    })?;

    if let Some(mode) = desired.mode
        && meta.mode & 0o7777 != mode
    {
        host.fs.set_mode(path, mode)?;
        log::info!("set mode {mode:04o} on {}", path.display());
        changed = true;
    }

    let uid = desired.uid.filter(|uid| *uid != meta.uid);
    let gid = desired.gid.filter(|gid| *gid != meta.gid);
    if uid.is_some() || gid.is_some() {
        host.fs.set_owner(path, uid, gid)?;
        changed = true;
    }

    Ok(changed)
}
