//! Resource model: kinds, actions, identity and typed properties
//!
//! A Resource is one declared unit of desired host state. It is built once
//! by [`crate::compile`] and never mutated afterwards.

use crate::guard::Guards;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    Package,
    File,
    KernelModule,
    SysctlParam,
    Mount,
    Execute,
    AptRepository,
    AptUpdate,
    Service,
    User,
}

impl Kind {
    pub const ALL: [Kind; 10] = [
        Kind::Package,
        Kind::File,
        Kind::KernelModule,
        Kind::SysctlParam,
        Kind::Mount,
        Kind::Execute,
        Kind::AptRepository,
        Kind::AptUpdate,
        Kind::Service,
        Kind::User,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Package => "package",
            Self::File => "file",
            Self::KernelModule => "kernel_module",
            Self::SysctlParam => "sysctl_param",
            Self::Mount => "mount",
            Self::Execute => "execute",
            Self::AptRepository => "apt_repository",
            Self::AptUpdate => "apt_update",
            Self::Service => "service",
            Self::User => "user",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }

    /// Actions this kind understands, besides `nothing`
    pub fn accepted_actions(&self) -> &'static [Action] {
        match self {
            Self::Package => &[Action::Install, Action::Remove],
            Self::File => &[Action::Create, Action::Delete],
            Self::KernelModule => &[Action::Load, Action::Unload],
            Self::SysctlParam => &[Action::Apply, Action::Remove],
            Self::Mount => &[Action::Enable, Action::Disable],
            Self::Execute => &[Action::Run],
            Self::AptRepository => &[Action::Add, Action::Remove],
            Self::AptUpdate => &[Action::Periodic, Action::Update],
            Self::Service => &[
                Action::Enable,
                Action::Disable,
                Action::Start,
                Action::Stop,
                Action::Restart,
                Action::Reload,
            ],
            Self::User => &[Action::Create, Action::Remove],
        }
    }

    /// Actions used when a declaration names none
    ///
    /// Services have no default: a declared service must say what it wants.
    pub fn default_actions(&self) -> &'static [Action] {
        match self {
            Self::Package => &[Action::Install],
            Self::File => &[Action::Create],
            Self::KernelModule => &[Action::Load],
            Self::SysctlParam => &[Action::Apply],
            Self::Mount => &[Action::Enable],
            Self::Execute => &[Action::Run],
            Self::AptRepository => &[Action::Add],
            Self::AptUpdate => &[Action::Periodic],
            Self::Service => &[],
            Self::User => &[Action::Create],
        }
    }

    pub fn accepts(&self, action: Action) -> bool {
        action == Action::Nothing || self.accepted_actions().contains(&action)
    }

    /// Kind-specific attributes (`only_if` and `not_if` are accepted everywhere)
    pub fn accepted_attributes(&self) -> &'static [&'static str] {
        match self {
            Self::Package => &["version"],
            Self::File => &["content", "mode", "owner", "group"],
            Self::KernelModule => &[],
            Self::SysctlParam => &["value", "conf_dir"],
            Self::Mount => &["device", "fstype", "options"],
            Self::Execute => &["command", "creates", "cwd", "timeout"],
            Self::AptRepository => &[
                "uri",
                "distribution",
                "components",
                "arch",
                "key",
                "keyring",
            ],
            Self::AptUpdate => &["frequency"],
            Self::Service => &[],
            Self::User => &[
                "comment",
                "uid",
                "gid",
                "home",
                "shell",
                "manage_home",
                "password_secret",
            ],
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb requested of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Do nothing unless notified
    Nothing,
    Install,
    Remove,
    Create,
    Delete,
    Load,
    Unload,
    Apply,
    Enable,
    Disable,
    Start,
    Stop,
    Restart,
    Reload,
    Run,
    Add,
    Periodic,
    Update,
}

impl Action {
    const ALL: [Action; 18] = [
        Action::Nothing,
        Action::Install,
        Action::Remove,
        Action::Create,
        Action::Delete,
        Action::Load,
        Action::Unload,
        Action::Apply,
        Action::Enable,
        Action::Disable,
        Action::Start,
        Action::Stop,
        Action::Restart,
        Action::Reload,
        Action::Run,
        Action::Add,
        Action::Periodic,
        Action::Update,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Nothing => "nothing",
            Self::Install => "install",
            Self::Remove => "remove",
            Self::Create => "create",
            Self::Delete => "delete",
            Self::Load => "load",
            Self::Unload => "unload",
            Self::Apply => "apply",
            Self::Enable => "enable",
            Self::Disable => "disable",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::Restart => "restart",
            Self::Reload => "reload",
            Self::Run => "run",
            Self::Add => "add",
            Self::Periodic => "periodic",
            Self::Update => "update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.as_str() == s)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of a resource within a run, displayed as `kind[name]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: Kind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: Kind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }

    /// Parse a `kind[name]` reference.
    ///
    /// Returns `None` when the text is not of that shape or the kind is unknown.
    pub fn parse(reference: &str) -> Option<Self> {
        let (kind, rest) = reference.trim().split_once('[')?;
        let name = rest.strip_suffix(']')?;
        if name.is_empty() {
            return None;
        }
        Some(Self::new(Kind::parse(kind)?, name))
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.kind, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PackageProps {
    /// Exact version to pin; any installed version satisfies when unset
    pub version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileProps {
    /// Full file content; when unset only presence, mode and owner are managed
    pub content: Option<String>,
    pub mode: Option<u32>,
    pub owner: Option<String>,
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SysctlProps {
    pub value: String,
    /// Directory the persisted `99-nodeprep-<key>.conf` lands in
    pub conf_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountProps {
    pub device: Option<String>,
    pub fstype: Option<String>,
    pub options: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecuteProps {
    pub command: String,
    pub cwd: Option<PathBuf>,
    /// Overrides the host-wide command timeout
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptRepositoryProps {
    pub uri: String,
    /// Release codename; the host codename is used when unset
    pub distribution: Option<String>,
    pub components: Vec<String>,
    pub arch: Option<String>,
    /// URL of the signing key
    pub key: Option<String>,
    pub keyring: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AptUpdateProps {
    pub frequency: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserProps {
    pub comment: Option<String>,
    pub uid: Option<u32>,
    /// Group name or numeric id
    pub gid: Option<String>,
    pub home: Option<PathBuf>,
    pub shell: Option<String>,
    pub manage_home: bool,
    /// Key of the password hash in the secret provider
    pub password_secret: Option<String>,
}

/// Typed, validated properties; one variant per kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Properties {
    Package(PackageProps),
    File(FileProps),
    KernelModule,
    SysctlParam(SysctlProps),
    Mount(MountProps),
    Execute(ExecuteProps),
    AptRepository(AptRepositoryProps),
    AptUpdate(AptUpdateProps),
    Service,
    User(UserProps),
}

impl Properties {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Package(_) => Kind::Package,
            Self::File(_) => Kind::File,
            Self::KernelModule => Kind::KernelModule,
            Self::SysctlParam(_) => Kind::SysctlParam,
            Self::Mount(_) => Kind::Mount,
            Self::Execute(_) => Kind::Execute,
            Self::AptRepository(_) => Kind::AptRepository,
            Self::AptUpdate(_) => Kind::AptUpdate,
            Self::Service => Kind::Service,
            Self::User(_) => Kind::User,
        }
    }
}

/// A declared unit of desired state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    pub id: ResourceId,
    /// Requested actions, applied in order
    pub actions: Vec<Action>,
    pub properties: Properties,
    pub guards: Guards,
}

impl Resource {
    pub fn kind(&self) -> Kind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    /// Human-readable description of the requested actions
    pub fn description(&self) -> String {
        let actions: Vec<&str> = self.actions.iter().map(Action::as_str).collect();
        format!("{} ({})", self.id, actions.join(", "))
    }

    /// Whether the resource only runs when notified
    pub fn is_notification_only(&self) -> bool {
        self.actions.iter().all(|a| *a == Action::Nothing)
    }
}
