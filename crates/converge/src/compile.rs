//! Compile declarations into an immutable plan
//!
//! Declarations are loosely typed (a kind string, a name, and a bag of
//! attribute values). Compilation checks every declaration against the
//! schema of its kind, builds typed properties and guards, and resolves
//! notification references to edges. Any problem fails the whole plan.

use crate::error::ValidationError;
use crate::guard::{Guard, Guards};
use crate::notify::{NotificationBus, NotificationEdge, Timing};
use crate::resource::{
    Action, AptRepositoryProps, AptUpdateProps, ExecuteProps, FileProps, Kind, MountProps,
    PackageProps, Properties, Resource, ResourceId, SysctlProps, UserProps,
};
use crate::value::Value;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

/// Attributes every kind accepts
const GUARD_ATTRIBUTES: [&str; 2] = ["only_if", "not_if"];

const DEFAULT_SYSCTL_DIR: &str = "/etc/sysctl.d";
const DEFAULT_UPDATE_FREQUENCY: Duration = Duration::from_secs(86_400);

static PACKAGE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9][a-z0-9+.\-]*$").expect("valid regex"));
static MODULE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_\-]+$").expect("valid regex"));
static SYSCTL_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_\-]+(\.[A-Za-z0-9_\-]+)+$").expect("valid regex")
});
static UNIT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9@._:\-]+$").expect("valid regex"));
static USER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z_][a-z0-9_\-]*\$?$").expect("valid regex"));
static REPO_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._\-]+$").expect("valid regex"));

/// A notification as written in a declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyDecl {
    pub action: String,
    /// `kind[name]` reference
    pub target: String,
    #[serde(default = "default_timing")]
    pub timing: String,
}

fn default_timing() -> String {
    "delayed".to_string()
}

/// One resource as written in a recipe, before validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: String,
    pub name: String,
    #[serde(
        default,
        rename = "action",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub actions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notifies: Vec<NotifyDecl>,
    /// Notifications declared from the target side
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subscribes: Vec<NotifyDecl>,
    #[serde(flatten)]
    pub attributes: BTreeMap<String, Value>,
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(action) => vec![action],
        OneOrMany::Many(actions) => actions,
    })
}

impl Declaration {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            actions: Vec::new(),
            notifies: Vec::new(),
            subscribes: Vec::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn action(mut self, action: &str) -> Self {
        self.actions.push(action.to_string());
        self
    }

    pub fn attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn notifies(mut self, action: &str, target: &str, timing: &str) -> Self {
        self.notifies.push(NotifyDecl {
            action: action.to_string(),
            target: target.to_string(),
            timing: timing.to_string(),
        });
        self
    }

    pub fn subscribes(mut self, action: &str, source: &str, timing: &str) -> Self {
        self.subscribes.push(NotifyDecl {
            action: action.to_string(),
            target: source.to_string(),
            timing: timing.to_string(),
        });
        self
    }
}

/// Compiled resources in declaration order plus their notification edges
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub resources: Vec<Resource>,
    pub bus: NotificationBus,
}

impl Plan {
    /// Validate declarations and build the plan.
    pub fn compile(declarations: &[Declaration]) -> Result<Self, ValidationError> {
        let mut resources = Vec::with_capacity(declarations.len());
        let mut seen = HashSet::with_capacity(declarations.len());

        for decl in declarations {
            let resource = compile_resource(decl)?;
            if !seen.insert(resource.id.clone()) {
                return Err(ValidationError::DuplicateResource {
                    resource: resource.id.to_string(),
                });
            }
            resources.push(resource);
        }

        let mut bus = NotificationBus::new();
        for (decl, resource) in declarations.iter().zip(&resources) {
            for notify in &decl.notifies {
                let target = resolve_reference(&resource.id, &notify.target, &seen)?;
                let action = resolve_action(&resource.id, target.kind, &notify.action)?;
                let timing = resolve_timing(&resource.id, &notify.timing)?;
                bus.register(NotificationEdge {
                    source: resource.id.clone(),
                    target,
                    action,
                    timing,
                });
            }

            for subscribe in &decl.subscribes {
                let source = resolve_reference(&resource.id, &subscribe.target, &seen)?;
                let action = resolve_action(&resource.id, resource.kind(), &subscribe.action)?;
                let timing = resolve_timing(&resource.id, &subscribe.timing)?;
                bus.register(NotificationEdge {
                    source,
                    target: resource.id.clone(),
                    action,
                    timing,
                });
            }
        }

        log::debug!(
            "compiled {} resources, {} notification edges",
            resources.len(),
            bus.edges().len()
        );

        Ok(Self { resources, bus })
    }

    pub fn get(&self, id: &ResourceId) -> Option<&Resource> {
        self.resources.iter().find(|r| &r.id == id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

fn compile_resource(decl: &Declaration) -> Result<Resource, ValidationError> {
    let kind = Kind::parse(&decl.kind).ok_or_else(|| ValidationError::UnknownKind {
        kind: decl.kind.clone(),
        name: decl.name.clone(),
    })?;

    let name = decl.name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyName {
            kind: kind.to_string(),
        });
    }

    let id = ResourceId::new(kind, name);
    validate_name(&id)?;

    let actions = compile_actions(&id, &decl.actions)?;

    for key in decl.attributes.keys() {
        if GUARD_ATTRIBUTES.contains(&key.as_str())
            || kind.accepted_attributes().contains(&key.as_str())
        {
            continue;
        }
        if kind == Kind::User && key == "password" {
            return Err(ValidationError::InlineCredential {
                resource: id.to_string(),
            });
        }
        let mut accepted: Vec<&str> = kind.accepted_attributes().to_vec();
        accepted.extend(GUARD_ATTRIBUTES);
        return Err(ValidationError::UnknownAttribute {
            resource: id.to_string(),
            attribute: key.clone(),
            accepted: accepted.join(", "),
        });
    }

    let attrs = Attrs {
        resource: id.to_string(),
        map: &decl.attributes,
    };

    let guards = Guards {
        only_if: attrs.guards("only_if")?,
        not_if: attrs.guards("not_if")?,
        creates: if kind == Kind::Execute {
            attrs.path("creates")?
        } else {
            None
        },
    };

    let properties = match kind {
        Kind::Package => Properties::Package(PackageProps {
            version: attrs.scalar("version")?,
        }),
        Kind::File => Properties::File(FileProps {
            content: attrs.string("content")?,
            mode: attrs.mode("mode")?,
            owner: attrs.scalar("owner")?,
            group: attrs.scalar("group")?,
        }),
        Kind::KernelModule => Properties::KernelModule,
        Kind::SysctlParam => Properties::SysctlParam(SysctlProps {
            value: attrs.required(attrs.scalar_or_list("value", " ")?, "value")?,
            conf_dir: attrs
                .path("conf_dir")?
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SYSCTL_DIR)),
        }),
        Kind::Mount => {
            let props = MountProps {
                device: attrs.string("device")?,
                fstype: attrs.string("fstype")?,
                options: attrs
                    .scalar_or_list("options", ",")?
                    .unwrap_or_else(|| "defaults".to_string()),
            };
            let is_swap = name == "swap" || props.fstype.as_deref() == Some("swap");
            if !is_swap && actions.contains(&Action::Enable) {
                attrs.required(props.device.clone(), "device")?;
                attrs.required(props.fstype.clone(), "fstype")?;
            }
            Properties::Mount(props)
        }
        Kind::Execute => Properties::Execute(ExecuteProps {
            command: attrs.required(attrs.string("command")?, "command")?,
            cwd: attrs.path("cwd")?,
            timeout: attrs.seconds("timeout")?,
        }),
        Kind::AptRepository => {
            let components = attrs.string_list("components")?;
            Properties::AptRepository(AptRepositoryProps {
                uri: attrs.required(attrs.string("uri")?, "uri")?,
                distribution: attrs.string("distribution")?,
                components: if components.is_empty() {
                    vec!["main".to_string()]
                } else {
                    components
                },
                arch: attrs.string("arch")?,
                key: attrs.string("key")?,
                keyring: attrs.path("keyring")?,
            })
        }
        Kind::AptUpdate => Properties::AptUpdate(AptUpdateProps {
            frequency: attrs
                .seconds("frequency")?
                .unwrap_or(DEFAULT_UPDATE_FREQUENCY),
        }),
        Kind::Service => Properties::Service,
        Kind::User => Properties::User(UserProps {
            comment: attrs.string("comment")?,
            uid: attrs.u32("uid")?,
            gid: attrs.scalar("gid")?,
            home: attrs.path("home")?,
            shell: attrs.string("shell")?,
            manage_home: attrs.bool("manage_home")?.unwrap_or(false),
            password_secret: attrs.string("password_secret")?,
        }),
    };

    Ok(Resource {
        id,
        actions,
        properties,
        guards,
    })
}

fn validate_name(id: &ResourceId) -> Result<(), ValidationError> {
    let name = id.name.as_str();
    let check = |ok: bool, reason: &str| {
        if ok {
            Ok(())
        } else {
            Err(ValidationError::InvalidName {
                resource: id.to_string(),
                name: name.to_string(),
                reason: reason.to_string(),
            })
        }
    };

    match id.kind {
        Kind::Package => check(PACKAGE_NAME.is_match(name), "not a valid package name"),
        Kind::KernelModule => check(MODULE_NAME.is_match(name), "not a valid module name"),
        Kind::SysctlParam => check(SYSCTL_KEY.is_match(name), "expected a dotted sysctl key"),
        Kind::Service => check(UNIT_NAME.is_match(name), "not a valid unit name"),
        Kind::User => check(USER_NAME.is_match(name), "not a valid user name"),
        Kind::AptRepository => check(REPO_NAME.is_match(name), "used as a file name"),
        Kind::File => check(name.starts_with('/'), "expected an absolute path"),
        Kind::Mount => check(
            name == "swap" || name.starts_with('/'),
            "expected `swap` or an absolute mount point",
        ),
        Kind::Execute | Kind::AptUpdate => Ok(()),
    }
}

fn compile_actions(id: &ResourceId, names: &[String]) -> Result<Vec<Action>, ValidationError> {
    if names.is_empty() {
        let defaults = id.kind.default_actions();
        if defaults.is_empty() {
            return Err(ValidationError::MissingAction {
                resource: id.to_string(),
            });
        }
        return Ok(defaults.to_vec());
    }

    names
        .iter()
        .map(|name| match Action::parse(name) {
            Some(action) if id.kind.accepts(action) => Ok(action),
            _ => Err(unknown_action(id, id.kind, name)),
        })
        .collect()
}

fn unknown_action(resource: &ResourceId, kind: Kind, action: &str) -> ValidationError {
    let accepted: Vec<&str> = kind.accepted_actions().iter().map(Action::as_str).collect();
    ValidationError::UnknownAction {
        resource: resource.to_string(),
        action: action.to_string(),
        accepted: accepted.join(", "),
    }
}

fn resolve_reference(
    resource: &ResourceId,
    reference: &str,
    declared: &HashSet<ResourceId>,
) -> Result<ResourceId, ValidationError> {
    let target = ResourceId::parse(reference).ok_or_else(|| ValidationError::MalformedTarget {
        resource: resource.to_string(),
        target: reference.to_string(),
    })?;
    if !declared.contains(&target) {
        return Err(ValidationError::UnknownTarget {
            resource: resource.to_string(),
            target: reference.to_string(),
        });
    }
    Ok(target)
}

/// Action a notification runs; `nothing` is never a valid notified action
fn resolve_action(
    resource: &ResourceId,
    target_kind: Kind,
    action: &str,
) -> Result<Action, ValidationError> {
    match Action::parse(action) {
        Some(a) if a != Action::Nothing && target_kind.accepts(a) => Ok(a),
        _ => Err(unknown_action(resource, target_kind, action)),
    }
}

fn resolve_timing(resource: &ResourceId, timing: &str) -> Result<Timing, ValidationError> {
    Timing::parse(timing).ok_or_else(|| ValidationError::InvalidTiming {
        resource: resource.to_string(),
        timing: timing.to_string(),
    })
}

/// Typed accessors over a declaration's attribute bag
struct Attrs<'a> {
    resource: String,
    map: &'a BTreeMap<String, Value>,
}

impl Attrs<'_> {
    fn invalid(&self, attribute: &str, reason: impl Into<String>) -> ValidationError {
        ValidationError::InvalidAttribute {
            resource: self.resource.clone(),
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }

    fn required<T>(&self, value: Option<T>, attribute: &str) -> Result<T, ValidationError> {
        value.ok_or_else(|| ValidationError::MissingAttribute {
            resource: self.resource.clone(),
            attribute: attribute.to_string(),
        })
    }

    fn string(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(self.invalid(key, format!("expected a string, got {}", other.type_name()))),
        }
    }

    /// String, integer or boolean rendered as text
    fn scalar(&self, key: &str) -> Result<Option<String>, ValidationError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(value) => value
                .as_scalar_string()
                .map(Some)
                .ok_or_else(|| self.invalid(key, format!("expected a scalar, got {}", value.type_name()))),
        }
    }

    /// Scalar, or list of scalars joined with `separator`
    fn scalar_or_list(&self, key: &str, separator: &str) -> Result<Option<String>, ValidationError> {
        match self.map.get(key) {
            Some(Value::List(items)) => {
                let parts: Option<Vec<String>> = items.iter().map(Value::as_scalar_string).collect();
                parts
                    .map(|p| Some(p.join(separator)))
                    .ok_or_else(|| self.invalid(key, "expected a list of scalars"))
            }
            _ => self.scalar(key),
        }
    }

    fn string_list(&self, key: &str) -> Result<Vec<String>, ValidationError> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(Value::String(s)) => Ok(s.split_whitespace().map(str::to_string).collect()),
            Some(Value::List(items)) => items
                .iter()
                .map(|item| {
                    item.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| self.invalid(key, "expected a list of strings"))
                })
                .collect(),
            Some(other) => Err(self.invalid(key, format!("expected a list, got {}", other.type_name()))),
        }
    }

    fn bool(&self, key: &str) -> Result<Option<bool>, ValidationError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.invalid(key, format!("expected a boolean, got {}", other.type_name()))),
        }
    }

    /// Non-negative integer, or a string of digits
    fn u32(&self, key: &str) -> Result<Option<u32>, ValidationError> {
        let text = match self.map.get(key) {
            None => return Ok(None),
            Some(Value::Integer(i)) => i.to_string(),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(other) => {
                return Err(self.invalid(key, format!("expected an integer, got {}", other.type_name())));
            }
        };
        text.parse::<u32>()
            .map(Some)
            .map_err(|_| self.invalid(key, format!("`{text}` is not a valid id")))
    }

    fn seconds(&self, key: &str) -> Result<Option<Duration>, ValidationError> {
        match self.map.get(key) {
            None => Ok(None),
            Some(Value::Integer(secs)) if *secs > 0 => Ok(Some(Duration::from_secs(secs.unsigned_abs()))),
            Some(other) => Err(self.invalid(key, format!("expected a positive number of seconds, got {other}"))),
        }
    }

    fn path(&self, key: &str) -> Result<Option<PathBuf>, ValidationError> {
        match self.string(key)? {
            None => Ok(None),
            Some(p) if p.starts_with('/') => Ok(Some(PathBuf::from(p))),
            Some(p) => Err(self.invalid(key, format!("`{p}` is not an absolute path"))),
        }
    }

    /// Octal permission bits, written "0644", "644" or 644
    fn mode(&self, key: &str) -> Result<Option<u32>, ValidationError> {
        let text = match self.map.get(key) {
            None => return Ok(None),
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Integer(i)) if *i >= 0 => i.to_string(),
            Some(other) => return Err(self.invalid(key, format!("expected an octal mode, got {other}"))),
        };
        let digits = text.strip_prefix("0o").unwrap_or(&text);
        if digits.is_empty() || digits.len() > 4 {
            return Err(self.invalid(key, format!("`{text}` is not an octal mode")));
        }
        u32::from_str_radix(digits, 8)
            .map(Some)
            .map_err(|_| self.invalid(key, format!("`{text}` is not an octal mode")))
    }

    fn guards(&self, key: &str) -> Result<Vec<Guard>, ValidationError> {
        match self.map.get(key) {
            None => Ok(Vec::new()),
            Some(value) => Guard::list_from_value(value).map_err(|reason| self.invalid(key, reason)),
        }
    }
}
