use super::{ResourceAdapter, resolve_group, unsupported, wrong_properties};
use crate::error::HostError;
use crate::host::{Host, UserEntry, UserSpec};
use crate::resource::{Action, Kind, Properties, Resource, UserProps};
use crate::types::{Observation, ResourceState};

/// Local user accounts
///
/// The password hash is never part of a recipe: it comes from the secret
/// provider under the key named by `password_secret`, and is never shown in
/// observations or logs.
pub struct UserAdapter;

fn desired_spec(name: &str, props: &UserProps, host: &Host<'_>) -> Result<UserSpec, HostError> {
    Ok(UserSpec {
        name: name.to_string(),
        uid: props.uid,
        gid: props.gid.as_deref().map(|g| resolve_group(g, host)).transpose()?,
        home: props.home.clone(),
        shell: props.shell.clone(),
        comment: props.comment.clone(),
        manage_home: props.manage_home,
        password_hash: props
            .password_secret
            .as_deref()
            .map(|key| host.secrets.secret(key))
            .transpose()?,
    })
}

/// Fields of `desired` that differ from the live account
fn drift(entry: &UserEntry, stored_hash: Option<&str>, desired: &UserSpec) -> UserSpec {
    UserSpec {
        name: desired.name.clone(),
        uid: desired.uid.filter(|uid| *uid != entry.uid),
        gid: desired.gid.filter(|gid| *gid != entry.gid),
        home: desired.home.clone().filter(|home| *home != entry.home),
        shell: desired.shell.clone().filter(|shell| *shell != entry.shell),
        comment: desired.comment.clone().filter(|c| *c != entry.comment),
        manage_home: desired.manage_home,
        password_hash: desired
            .password_hash
            .clone()
            .filter(|hash| Some(hash.as_str()) != stored_hash),
    }
}

/// Describe the fields set in `spec`, reading values from `entry` when given
fn describe(spec: &UserSpec, entry: Option<&UserEntry>) -> String {
    let mut parts = Vec::new();
    if let Some(uid) = spec.uid {
        parts.push(format!("uid {}", entry.map_or(uid, |e| e.uid)));
    }
    if let Some(gid) = spec.gid {
        parts.push(format!("gid {}", entry.map_or(gid, |e| e.gid)));
    }
    if let Some(home) = &spec.home {
        parts.push(format!("home {}", entry.map_or(home, |e| &e.home).display()));
    }
    if let Some(shell) = &spec.shell {
        parts.push(format!("shell {}", entry.map_or(shell, |e| &e.shell)));
    }
    if let Some(comment) = &spec.comment {
        parts.push(format!("comment {:?}", entry.map_or(comment, |e| &e.comment)));
    }
    if spec.password_hash.is_some() {
        let label = if entry.is_some() { "password differs" } else { "password from secret" };
        parts.push(label.to_string());
    }
    if parts.is_empty() {
        "account".to_string()
    } else {
        parts.join(", ")
    }
}

fn stored_hash(name: &str, desired: &UserSpec, host: &Host<'_>) -> Result<Option<String>, HostError> {
    if desired.password_hash.is_some() {
        host.users.password_hash(name)
    } else {
        Ok(None)
    }
}

impl ResourceAdapter for UserAdapter {
    fn kind(&self) -> Kind {
        Kind::User
    }

    fn query(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<Observation, HostError> {
        let Properties::User(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let name = resource.name();
        let entry = host.users.lookup_user(name)?;

        match action {
            Action::Create => {
                let desired = desired_spec(name, props, host)?;
                let Some(entry) = entry else {
                    return Ok(Observation::new(
                        ResourceState::Absent,
                        ResourceState::present(describe(&desired, None)),
                    ));
                };
                let stored = stored_hash(name, &desired, host)?;
                let diff = drift(&entry, stored.as_deref(), &desired);
                if diff.has_changes() {
                    Ok(Observation::new(
                        ResourceState::present(describe(&diff, Some(&entry))),
                        ResourceState::present(describe(&diff, None)),
                    ))
                } else {
                    Ok(Observation::new(
                        ResourceState::present("account"),
                        ResourceState::present("account"),
                    ))
                }
            }
            Action::Remove => Ok(Observation::presence(entry.is_some(), false)),
            other => Err(unsupported(resource, other)),
        }
    }

    fn apply(&self, resource: &Resource, action: Action, host: &Host<'_>) -> Result<bool, HostError> {
        let Properties::User(props) = &resource.properties else {
            return Err(wrong_properties(resource));
        };
        let name = resource.name();
        let entry = host.users.lookup_user(name)?;

        match action {
            Action::Create => {
                let desired = desired_spec(name, props, host)?;
                let Some(entry) = entry else {
                    host.users.create_user(&desired)?;
                    log::info!("created user {name}");
                    return Ok(true);
                };
                let stored = stored_hash(name, &desired, host)?;
                let diff = drift(&entry, stored.as_deref(), &desired);
                if !diff.has_changes() {
                    return Ok(false);
                }
                host.users.modify_user(&diff)?;
                log::info!("updated user {name}: {}", describe(&diff, None));
                Ok(true)
            }
            Action::Remove => {
                if entry.is_none() {
                    return Ok(false);
                }
                host.users.remove_user(name, props.manage_home)?;
                log::info!("removed user {name}");
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
    use std::path::PathBuf;

    const HASH: &str = "$6$rounds=4096$examplesalt$examplehash";

    fn k8s_dev() -> Resource {
        Plan::compile(&[Declaration::new("user", "k8s-dev")
            .attr("comment", "Kubernetes Developer")
            .attr("uid", 1234)
            .attr("gid", "users")
            .attr("home", "/home/k8s-dev")
            .attr("shell", "/bin/bash")
            .attr("password_secret", "k8s-dev-password")])
        .unwrap()
        .resources
        .remove(0)
    }

    #[test]
    fn test_create_with_secret_password() {
        let fake = FakeHost::new();
        fake.state()
            .secrets
            .insert("k8s-dev-password".to_string(), HASH.to_string());
        let host = fake.host();
        let user = k8s_dev();

        let obs = UserAdapter.query(&user, Action::Create, &host).unwrap();
        assert!(obs.current.is_absent());
        assert!(!obs.desired.to_string().contains(HASH));

        assert!(UserAdapter.apply(&user, Action::Create, &host).unwrap());
        let state = fake.state();
        let entry = &state.users["k8s-dev"];
        assert_eq!(entry.uid, 1234);
        assert_eq!(entry.gid, 100);
        assert_eq!(entry.home, PathBuf::from("/home/k8s-dev"));
        assert_eq!(entry.shell, "/bin/bash");
        assert_eq!(state.passwords["k8s-dev"], HASH);
    }

    #[test]
    fn test_matching_user_is_converged() {
        let fake = FakeHost::new();
        fake.state()
            .secrets
            .insert("k8s-dev-password".to_string(), HASH.to_string());
        let host = fake.host();
        let user = k8s_dev();

        UserAdapter.apply(&user, Action::Create, &host).unwrap();
        assert!(UserAdapter.query(&user, Action::Create, &host).unwrap().is_converged());
        assert!(!UserAdapter.apply(&user, Action::Create, &host).unwrap());
    }

    #[test]
    fn test_drifted_shell_modifies_only_shell() {
        let fake = FakeHost::new();
        fake.state()
            .secrets
            .insert("k8s-dev-password".to_string(), HASH.to_string());
        let host = fake.host();
        let user = k8s_dev();
        UserAdapter.apply(&user, Action::Create, &host).unwrap();
        fake.state().users.get_mut("k8s-dev").unwrap().shell = "/bin/sh".to_string();

        let obs = UserAdapter.query(&user, Action::Create, &host).unwrap();
        assert_eq!(obs.current.to_string(), "shell /bin/sh");
        assert_eq!(obs.desired.to_string(), "shell /bin/bash");

        assert!(UserAdapter.apply(&user, Action::Create, &host).unwrap());
        assert_eq!(fake.state().users["k8s-dev"].shell, "/bin/bash");
    }

    #[test]
    fn test_missing_secret_fails_query() {
        let fake = FakeHost::new();
        let host = fake.host();
        assert!(matches!(
            UserAdapter.query(&k8s_dev(), Action::Create, &host),
            Err(HostError::SecretUnavailable { .. })
        ));
        assert!(fake.state().users.is_empty());
    }

    #[test]
    fn test_remove() {
        let fake = FakeHost::new();
        fake.state()
            .secrets
            .insert("k8s-dev-password".to_string(), HASH.to_string());
        let host = fake.host();
        let user = k8s_dev();
        UserAdapter.apply(&user, Action::Create, &host).unwrap();

        assert!(UserAdapter.apply(&user, Action::Remove, &host).unwrap());
        assert!(!UserAdapter.apply(&user, Action::Remove, &host).unwrap());
    }
}
