use super::{ResourceAdapter, labelled, unsupported};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Resource};
use crate::types::{Observation, ResourceState};

/// System services
///
/// `restart` and `reload` have no end state to compare against, so they
/// always diverge and always run.
pub struct ServiceAdapter;

impl ResourceAdapter for ServiceAdapter {
    fn kind(&self) -> Kind {
        Kind::Service
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let status = host.services.status(resource.name())?;
        let enabled = labelled(status.enabled, "enabled", "disabled");
        let running = labelled(status.running, "running", "stopped");

        match action {
            Action::Enable => Ok(Observation::new(enabled, ResourceState::present("enabled"))),
            Action::Disable => Ok(Observation::new(enabled, ResourceState::present("disabled"))),
            Action::Start => Ok(Observation::new(running, ResourceState::present("running"))),
            Action::Stop => Ok(Observation::new(running, ResourceState::present("stopped"))),
            Action::Restart => Ok(Observation::new(running, ResourceState::present("restarted"))),
            Action::Reload => Ok(Observation::new(running, ResourceState::present("reloaded"))),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        if !resource.kind().accepts(action) || action == Action::Nothing {
            return Err(unsupported(resource, action));
        }
        host.services.perform(resource.name(), action)?;
        log::info!("{action} {}", resource.name());
        Ok(true)
    }
}
