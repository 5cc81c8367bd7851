use super::{ResourceAdapter, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Properties, Resource};
use crate::types::{Observation, ResourceState};
use std::time::SystemTime;

/// Package index refresh
pub struct AptUpdateAdapter;

impl ResourceAdapter for AptUpdateAdapter {
    fn kind(&self) -> Kind {
        Kind::AptUpdate
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::AptUpdate(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };

        match action {
            Action::Periodic => {
                let current = match host.packages.last_update()? {
                    None => "never updated".to_string(),
                    // a stamp in the future counts as fresh
                    Some(stamp) => match SystemTime::now().duration_since(stamp) {
                        Ok(age) if age >= props.frequency => {
                            format!("stale ({}s old)", age.as_secs())
                        }
                        _ => "fresh".to_string(),
                    },
                };
                Ok(Observation::new(
                    ResourceState::present(current),
                    ResourceState::present("fresh"),
                ))
            }
            Action::Update => Ok(Observation::new(
                ResourceState::present("cached"),
                ResourceState::present("refreshed"),
            )),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        match action {
            Action::Periodic | Action::Update => {
                host.packages.update()?;
                log::info!("refreshed package index");
                Ok(true)
            }
            other => Err(unsupported(resource, other)),
        }
    }
}
