//! Secret providers for credentials a recipe references by key
//!
//! Values are never logged; only the key and where it was looked up are.

use crate::config::{SecretSource, SecretsConfig};
use converge::{HostError, SecretProvider};
use std::path::PathBuf;

/// Reads `<prefix><KEY>` where KEY is the upper-cased key with `-` and `.`
/// turned into `_`
pub struct EnvSecrets {
    prefix: String,
    lookup: fn(&str) -> Option<String>,
}

fn process_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

impl EnvSecrets {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            lookup: process_env,
        }
    }

    pub fn variable(&self, key: &str) -> String {
        let suffix: String = key
            .chars()
            .map(|c| match c {
                '-' | '.' => '_',
                c => c.to_ascii_uppercase(),
            })
            .collect();
        format!("{}{suffix}", self.prefix)
    }
}

impl SecretProvider for EnvSecrets {
    fn secret(&self, key: &str) -> Result<String, HostError> {
        let variable = self.variable(key);
        log::debug!("Looking up secret `{key}` in ${variable}");
        match (self.lookup)(&variable) {
            Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            _ => Err(HostError::SecretUnavailable {
                key: key.to_string(),
            }),
        }
    }
}

/// Reads `<dir>/<key>`, trailing whitespace trimmed
pub struct DirSecrets {
    dir: PathBuf,
}

impl DirSecrets {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

impl SecretProvider for DirSecrets {
    fn secret(&self, key: &str) -> Result<String, HostError> {
        let unavailable = || HostError::SecretUnavailable {
            key: key.to_string(),
        };
        if key.is_empty() || key.contains('/') || key.contains("..") {
            return Err(unavailable());
        }

        let path = self.dir.join(key);
        log::debug!("Reading secret `{key}` from {}", path.display());
        let value = std::fs::read_to_string(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => unavailable(),
            _ => HostError::io(&path, e),
        })?;
        let value = value.trim_end();
        if value.is_empty() {
            return Err(unavailable());
        }
        Ok(value.to_string())
    }
}

/// Build the provider the config asks for
pub fn provider(config: &SecretsConfig) -> Box<dyn SecretProvider> {
    match config.source {
        SecretSource::Env => Box::new(EnvSecrets::new(config.env_prefix.clone())),
        SecretSource::Dir => Box::new(DirSecrets::new(config.dir_path())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        (name == "NODEPREP_SECRET_K8S_DEV_PASSWORD").then(|| "$6$salt$hash\n".to_string())
    }

    #[test]
    fn test_env_variable_name() {
        let secrets = EnvSecrets::new("NODEPREP_SECRET_");
        assert_eq!(
            secrets.variable("k8s-dev-password"),
            "NODEPREP_SECRET_K8S_DEV_PASSWORD"
        );
        assert_eq!(secrets.variable("db.root"), "NODEPREP_SECRET_DB_ROOT");
    }

    #[test]
    fn test_env_lookup() {
        let secrets = EnvSecrets {
            lookup: fake_env,
            ..EnvSecrets::new("NODEPREP_SECRET_")
        };
        assert_eq!(secrets.secret("k8s-dev-password").unwrap(), "$6$salt$hash");
        assert!(matches!(
            secrets.secret("other"),
            Err(HostError::SecretUnavailable { .. })
        ));
    }

    #[test]
    fn test_dir_secrets() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("k8s-dev-password"), "$6$salt$hash\n").unwrap();
        std::fs::write(dir.path().join("blank"), "\n").unwrap();
        let secrets = DirSecrets::new(dir.path().to_path_buf());

        assert_eq!(secrets.secret("k8s-dev-password").unwrap(), "$6$salt$hash");
        assert!(secrets.secret("blank").is_err());
        assert!(secrets.secret("missing").is_err());
    }

    #[test]
    fn test_dir_secrets_reject_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = DirSecrets::new(dir.path().join("secrets"));
        assert!(matches!(
            secrets.secret("../shadow"),
            Err(HostError::SecretUnavailable { .. })
        ));
        assert!(secrets.secret("a/b").is_err());
    }
}
