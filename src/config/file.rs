//! Configuration file lookup
//!
//! Finds the configuration file and layers environment overrides on top.

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{EnvConfig, HarnessConfig};

/// Configuration file locations (in order of precedence)
const CONFIG_LOCATIONS: &[&str] = &[
    "./notebook-harness.yaml",
    "./notebook-harness.yml",
    "./.notebook-harness.yaml",
    "~/.config/notebook-harness/config.yaml",
];

/// Find configuration file in standard locations
fn find_config() -> Option<PathBuf> {
    CONFIG_LOCATIONS
        .iter()
        .map(|location| expand_path(location))
        .find(|path| path.exists())
}

/// Resolve the effective configuration.
///
/// An explicit path wins over `NOTEBOOK_HARNESS_CONFIG`, which wins over the
/// standard locations. Environment overrides are applied last.
pub fn load_effective(explicit: Option<&Path>, env: &EnvConfig) -> Result<HarnessConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| env.config_file.as_deref().map(expand_path))
        .or_else(find_config);

    let mut config = match path {
        Some(path) => {
            debug!("Loading configuration from {}", path.display());
            HarnessConfig::load(&path)?
        }
        None => {
            debug!("No configuration file found, using defaults");
            HarnessConfig::default()
        }
    };

    env.apply_to(&mut config);
    config.validate()?;
    Ok(config)
}

/// Expand ~ to home directory
fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// Check if file is YAML based on extension
pub(super) fn is_yaml_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e == "yaml" || e == "yml")
        .unwrap_or(false)
}
