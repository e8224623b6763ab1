//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;
use std::path::PathBuf;

use super::HarnessConfig;

/// Environment variable prefix
const ENV_PREFIX: &str = "NOTEBOOK_HARNESS";

/// Overrides read from `NOTEBOOK_HARNESS_*` variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// Session root from NOTEBOOK_HARNESS_SESSION_ROOT
    pub session_root: Option<PathBuf>,
    /// Output root from NOTEBOOK_HARNESS_OUTPUT_ROOT
    pub output_root: Option<PathBuf>,
    /// Interpreter from NOTEBOOK_HARNESS_PYTHON
    pub python: Option<String>,
    /// Timeout from NOTEBOOK_HARNESS_TIMEOUT
    pub timeout: Option<u64>,
    /// Concurrency from NOTEBOOK_HARNESS_CONCURRENT
    pub max_concurrent: Option<usize>,
    /// Config file from NOTEBOOK_HARNESS_CONFIG
    pub config_file: Option<String>,
    /// Verbose from NOTEBOOK_HARNESS_VERBOSE
    pub verbose: Option<bool>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            session_root: get_env("SESSION_ROOT").map(PathBuf::from),
            output_root: get_env("OUTPUT_ROOT").map(PathBuf::from),
            python: get_env("PYTHON"),
            timeout: get_env_parse("TIMEOUT"),
            max_concurrent: get_env_parse("CONCURRENT"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.session_root.is_some()
            || self.output_root.is_some()
            || self.python.is_some()
            || self.timeout.is_some()
            || self.max_concurrent.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
    }

    /// Overwrite the matching fields of `config`
    pub fn apply_to(&self, config: &mut HarnessConfig) {
        if let Some(root) = &self.session_root {
            config.session_root = root.clone();
        }
        if let Some(root) = &self.output_root {
            config.output_root = root.clone();
        }
        if let Some(python) = &self.python {
            config.python = python.clone();
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(concurrent) = self.max_concurrent {
            config.max_concurrent = concurrent;
        }
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_SESSION_ROOT: {:?}", ENV_PREFIX, self.session_root);
        println!("  {}_OUTPUT_ROOT:  {:?}", ENV_PREFIX, self.output_root);
        println!("  {}_PYTHON:       {:?}", ENV_PREFIX, self.python);
        println!("  {}_TIMEOUT:      {:?}", ENV_PREFIX, self.timeout);
        println!("  {}_CONCURRENT:   {:?}", ENV_PREFIX, self.max_concurrent);
        println!("  {}_CONFIG:       {:?}", ENV_PREFIX, self.config_file);
        println!("  {}_VERBOSE:      {:?}", ENV_PREFIX, self.verbose);
    }
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    env::var(format!("{ENV_PREFIX}_{name}")).ok()
}

/// Get environment variable and parse to type
fn get_env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    get_env(name).and_then(|v| v.parse().ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all NOTEBOOK_HARNESS environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_SESSION_ROOT  Directory holding the base environment and clones");
    println!("  {ENV_PREFIX}_OUTPUT_ROOT   Directory for executed notebooks");
    println!("  {ENV_PREFIX}_PYTHON        Interpreter for the base environment");
    println!("  {ENV_PREFIX}_TIMEOUT       Per-notebook timeout in seconds (0 disables)");
    println!("  {ENV_PREFIX}_CONCURRENT    Notebooks run concurrently per process");
    println!("  {ENV_PREFIX}_CONFIG        Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE       Enable verbose output (true/false)");
    println!();
    println!("Example:");
    println!("  export {ENV_PREFIX}_SESSION_ROOT=/tmp/nb-session");
    println!("  notebook-harness run --shard 0/4");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_config_default() {
        let config = EnvConfig::default();
        assert!(config.session_root.is_none());
        assert!(!config.has_any());
    }

    #[test]
    fn test_apply_to_overrides_only_set_fields() {
        let env = EnvConfig {
            python: Some("python3.11".to_string()),
            timeout: Some(0),
            ..Default::default()
        };
        let mut config = HarnessConfig::default();
        let before = config.clone();
        env.apply_to(&mut config);

        assert_eq!(config.python, "python3.11");
        assert_eq!(config.timeout_secs, 0);
        assert_eq!(config.session_root, before.session_root);
        assert_eq!(config.max_concurrent, before.max_concurrent);
    }

    #[test]
    fn test_load_reads_prefixed_variables() {
        env::set_var("NOTEBOOK_HARNESS_CONCURRENT", "3");
        env::set_var("NOTEBOOK_HARNESS_VERBOSE", "yes");

        let config = EnvConfig::load();

        env::remove_var("NOTEBOOK_HARNESS_CONCURRENT");
        env::remove_var("NOTEBOOK_HARNESS_VERBOSE");

        assert_eq!(config.max_concurrent, Some(3));
        assert_eq!(config.verbose, Some(true));
        assert!(config.has_any());
    }
}
