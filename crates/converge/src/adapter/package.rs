use super::{ResourceAdapter, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::Host;
use crate::resource::{Action, Kind, Properties, Resource};
use crate::types::{Observation, ResourceState};

/// Packages through the host package manager
pub struct PackageAdapter;

impl ResourceAdapter for PackageAdapter {
    fn kind(&self) -> Kind {
        Kind::Package
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::Package(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let installed = host.packages.installed_version(resource.name())?;

        match action {
            Action::Install => Ok(match (installed, props.version.as_deref()) {
                (Some(current), Some(wanted)) => {
                    Observation::new(ResourceState::present(current), ResourceState::present(wanted))
                }
                // any installed version satisfies an unpinned package
                (Some(current), None) => Observation::new(
                    ResourceState::present(current.clone()),
                    ResourceState::present(current),
                ),
                (None, wanted) => Observation::new(
                    ResourceState::Absent,
                    wanted.map_or(ResourceState::Present { details: None }, ResourceState::present),
                ),
            }),
            Action::Remove => Ok(Observation::presence(installed.is_some(), false)),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::Package(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };

        match action {
            Action::Install => {
                host.packages.install(resource.name(), props.version.as_deref())?;
                log::info!("installed {}", resource.name());
                Ok(true)
            }
            Action::Remove => {
                if host.packages.installed_version(resource.name())?.is_none() {
                    return Ok(false);
                }
                host.packages.remove(resource.name())?;
                log::info!("removed {}", resource.name());
                Ok(true)
            }
            other => Err(unsupported(resource, other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::{Declaration, Plan};
    use crate::testing::FakeHost;

    fn package(decl: Declaration) -> Resource {
        Plan::compile(&[decl]).unwrap().resources.remove(0)
    }

    #[test]
    fn test_installed_unpinned_is_converged() {
        let fake = FakeHost::new();
        fake.state().packages.insert("curl".to_string(), "7.81.0".to_string());
        let host = fake.host();

        let curl = package(Declaration::new("package", "curl"));
        assert!(PackageAdapter.query(&curl, Action::Install, &host).unwrap().is_converged());
    }

    #[test]
    fn test_pinned_version_mismatch_diverges() {
        let fake = FakeHost::new();
        fake.state()
            .packages
            .insert("containerd.io".to_string(), "1.6.0".to_string());
        let host = fake.host();

        let containerd = package(Declaration::new("package", "containerd.io").attr("version", "1.7.2"));
        let obs = PackageAdapter.query(&containerd, Action::Install, &host).unwrap();
        assert!(!obs.is_converged());
        assert_eq!(obs.current.to_string(), "1.6.0");

        assert!(PackageAdapter.apply(&containerd, Action::Install, &host).unwrap());
        assert_eq!(fake.state().packages["containerd.io"], "1.7.2");
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let fake = FakeHost::new();
        let host = fake.host();

        let curl = package(Declaration::new("package", "curl").action("remove"));
        assert!(PackageAdapter.query(&curl, Action::Remove, &host).unwrap().is_converged());
        assert!(!PackageAdapter.apply(&curl, Action::Remove, &host).unwrap());
        assert!(!fake.log().contains(&"pkg remove curl".to_string()));
    }

    #[test]
    fn test_unknown_package_install_fails() {
        let fake = FakeHost::new();
        fake.state().unknown_packages.insert("kubelet".to_string());
        let host = fake.host();

        let kubelet = package(Declaration::new("package", "kubelet"));
        assert!(matches!(
            PackageAdapter.apply(&kubelet, Action::Install, &host),
            Err(HostError::NotFound { .. })
        ));
    }
}
