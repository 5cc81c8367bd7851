//! Config file resolution
//!
//! # Environment Variables
//!
//! - `NODEPREP_CONFIG_DIR` - Override the config directory
//!
//! # Resolution Priority
//!
//! 1. `--config` / `NODEPREP_CONFIG`
//! 2. `NODEPREP_CONFIG_DIR/config.toml`
//! 3. `XDG_CONFIG_HOME/nodeprep/config.toml` (or `~/.config/nodeprep`) if it exists
//! 4. `/etc/nodeprep/config.toml`

use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "NODEPREP_CONFIG_DIR";

const CONFIG_FILE: &str = "config.toml";
const SYSTEM_CONFIG_DIR: &str = "/etc/nodeprep";

/// The config file to load, if any
pub fn config_file(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return expand_path(&path.to_string_lossy());
    }

    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand_path(&dir).join(CONFIG_FILE);
        log::debug!("Using config from {}: {}", ENV_CONFIG_DIR, path.display());
        return path;
    }

    if let Some(user) = user_config_dir().map(|d| d.join(CONFIG_FILE))
        && user.exists()
    {
        log::debug!("Using user config: {}", user.display());
        return user;
    }

    let system = Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE);
    log::debug!("Using system config: {}", system.display());
    system
}

/// `XDG_CONFIG_HOME/nodeprep`, else the platform config dir
fn user_config_dir() -> Option<PathBuf> {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME")
        && !xdg.is_empty()
    {
        return Some(PathBuf::from(xdg).join("nodeprep"));
    }
    dirs::config_dir().map(|d| d.join("nodeprep"))
}

/// Expand `~` and environment variables in a path
pub fn expand_path(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).map_or_else(
        |_| shellexpand::tilde(path).into_owned(),
        std::borrow::Cow::into_owned,
    );
    PathBuf::from(expanded)
}
