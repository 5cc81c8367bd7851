use super::{ResourceAdapter, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Properties, Resource};
use crate::types::{Observation, ResourceState};

/// Guarded shell commands
///
/// A command has no observable state of its own: the query always reports it
/// as not yet run, and guards decide whether it runs at all.
pub struct ExecuteAdapter;

impl ResourceAdapter for ExecuteAdapter {
    fn kind(&self) -> Kind {
        Kind::Execute
    }

    fn query(&self, resource: &Resource, action: Action, _host: &Host<'_>) -> Result<Observation, HostError> {
        match action {
            Action::Run => Ok(Observation::new(
                ResourceState::Absent,
                ResourceState::present("ran"),
            )),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::Execute(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        if action != Action::Run {
            return Err(unsupported(resource, action));
        }

        let timeout = props.timeout.unwrap_or(host.timeout);
        log::debug!("running `{}` (timeout {}s)", props.command, timeout.as_secs());
        let output = host.exec.shell(&props.command, props.cwd.as_deref(), timeout)?;
        if !output.success {
            return Err(HostError::CommandFailed {
                command: props.command.clone(),
                code: output.code,
                stderr: output.stderr_str().trim().to_string(),
            });
        }
        log::info!("ran {}", resource.id);
        Ok(true)
    }
}
