//! Resource adapters - one per kind
//!
//! An adapter knows how to observe and change one kind of host state. It
//! never decides *whether* to change anything: the engine queries, compares
//! and only then calls `apply` for the actions that diverged. Notifications
//! call `apply` directly, so every `apply` must also be safe on a host that
//! is already converged.

mod apt_repository;
mod apt_update;
mod execute;
mod file;
mod kernel_module;
mod mount;
mod package;
mod service;
mod sysctl;
mod user;

pub use apt_repository::AptRepositoryAdapter;
pub use apt_update::AptUpdateAdapter;
pub use execute::ExecuteAdapter;
pub use file::FileAdapter;
pub use kernel_module::KernelModuleAdapter;
pub use mount::{FSTAB, MountAdapter};
pub use package::PackageAdapter;
pub use service::ServiceAdapter;
pub use sysctl::SysctlAdapter;
pub use user::UserAdapter;

use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Resource};
use crate::types::{Observation, ResourceState};
use std::collections::BTreeMap;

/// Kind-specific driver
pub trait ResourceAdapter: Send + Sync {
    /// Kind this adapter handles
    fn kind(&self) -> Kind;

    /// Observe current state for one requested action, paired with the
    /// state the action wants
    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>)
    -> Result<Observation, HostError>;

    /// Perform one action; returns whether the host changed
    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError>;
}

/// Adapters keyed by kind
pub struct AdapterRegistry {
    adapters: BTreeMap<Kind, Box<dyn ResourceAdapter>>,
}

impl AdapterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Registry with an adapter for every built-in kind
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(PackageAdapter));
        registry.register(Box::new(FileAdapter));
        registry.register(Box::new(KernelModuleAdapter));
        registry.register(Box::new(SysctlAdapter));
        registry.register(Box::new(MountAdapter));
        registry.register(Box::new(ExecuteAdapter));
        registry.register(Box::new(AptRepositoryAdapter));
        registry.register(Box::new(AptUpdateAdapter));
        registry.register(Box::new(ServiceAdapter));
        registry.register(Box::new(UserAdapter));
        registry
    }

    /// Register an adapter, replacing any previous one for its kind
    pub fn register(&mut self, adapter: Box<dyn ResourceAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    pub fn get(&self, kind: Kind) -> Option<&dyn ResourceAdapter> {
        self.adapters.get(&kind).map(AsRef::as_ref)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Resource handed to an adapter of another kind
fn wrong_properties(resource: &Resource) -> HostError {
    HostError::Other(format!(
        "{} carries {} properties",
        resource.id,
        resource.properties.kind()
    ))
}

fn unsupported(resource: &Resource, action: Action) -> HostError {
    HostError::Other(format!("{} does not support action `{action}`", resource.id))
}

/// Numeric uid, or a user name looked up in the user directory
fn resolve_user(owner: &str, host: &Host<'_>) -> Result<u32, HostError> {
    if let Ok(uid) = owner.parse() {
        return Ok(uid);
    }
    host.users
        .lookup_user(owner)?
        .map(|entry| entry.uid)
        .ok_or_else(|| HostError::NotFound {
            what: format!("user {owner}"),
        })
}

/// Numeric gid, or a group name looked up in the user directory
fn resolve_group(group: &str, host: &Host<'_>) -> Result<u32, HostError> {
    if let Ok(gid) = group.parse() {
        return Ok(gid);
    }
    host.users
        .lookup_group(group)?
        .ok_or_else(|| HostError::NotFound {
            what: format!("group {group}"),
        })
}

/// Present state described as `yes` or `no` depending on `flag`
fn labelled(flag: bool, yes: &str, no: &str) -> ResourceState {
    ResourceState::present(if flag { yes } else { no })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_registry_covers_every_kind() {
        let registry = AdapterRegistry::standard();
        for kind in Kind::ALL {
            let adapter = registry.get(kind).unwrap();
            assert_eq!(adapter.kind(), kind);
        }
    }

    #[test]
    fn test_register_replaces() {
        struct Custom;
        impl ResourceAdapter for Custom {
            fn kind(&self) -> Kind {
                Kind::Execute
            }
            fn query(&self, _: &Resource, _: Action, _: &Host<'_>) -> Result<Observation, HostError> {
                Ok(Observation::presence(true, true))
            }
            fn apply(&self, _: &Resource, _: Action, _: &Host<'_>) -> Result<bool, HostError> {
                Ok(false)
            }
        }

        let mut registry = AdapterRegistry::new();
        assert!(registry.get(Kind::Execute).is_none());
        registry.register(Box::new(Custom));
        assert!(registry.get(Kind::Execute).is_some());
    }
}
