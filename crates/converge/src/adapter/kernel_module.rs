use super::{ResourceAdapter, labelled, unsupported};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Resource};
use crate::types::{Observation, ResourceState};

/// Loaded kernel modules
pub struct KernelModuleAdapter;

impl ResourceAdapter for KernelModuleAdapter {
    fn kind(&self) -> Kind {
        Kind::KernelModule
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let loaded = host.modules.is_loaded(resource.name())?;
        let current = labelled(loaded, "loaded", "not loaded");
        match action {
            Action::Load => Ok(Observation::new(current, ResourceState::present("loaded"))),
            Action::Unload => Ok(Observation::new(current, ResourceState::present("not loaded"))),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let module = resource.name();
        let loaded = host.modules.is_loaded(module)?;
        match action {
            Action::Load if loaded => Ok(false),
            Action::Load => {
                host.modules.load(module)?;
                log::info!("loaded kernel module {module}");
                Ok(true)
            }
            Action::Unload if !loaded => Ok(false),
            Action::Unload => {
                host.modules.unload(module)?;
                log::info!("unloaded kernel module {module}");
                Ok(true)
            }
            other => Err(unsupported(resource, other)),
        }
    }
}
