use std::{collections::HashMap, env, fs, path::PathBuf};

use serde::Deserialize;

use super::ContainerConfig;
use crate::errors::ConfigError;

pub const ENV_ROOT_SCOPE: &str = "WIRING_ROOT_SCOPE";
pub const ENV_ALLOWED_SCOPES: &str = "WIRING_ALLOWED_SCOPES";
pub const ENV_STRICT_LIFETIMES: &str = "WIRING_STRICT_LIFETIMES";
pub const ENV_TRACE_RESOLUTIONS: &str = "WIRING_TRACE_RESOLUTIONS";

/// Partial configuration as read from a TOML file
#[derive(Deserialize, Debug, Default)]
struct PartialContainerConfig {
    root_scope_name: Option<String>,
    allowed_scopes: Option<Vec<String>>,
    strict_lifetimes: Option<bool>,
    trace_resolutions: Option<bool>,
}

/// Configuration loader: defaults, then the config file, then environment overrides
pub struct ConfigLoader {
    file: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a loader that only reads the environment
    pub fn new() -> Self {
        Self { file: None }
    }

    /// Create a loader that also reads the given TOML file
    pub fn with_file(file: PathBuf) -> Self {
        Self { file: Some(file) }
    }

    /// Load the complete container configuration
    pub fn load_config(&self) -> Result<ContainerConfig, ConfigError> {
        let partial = match &self.file {
            Some(path) => self.load_partial_config(path)?,
            None => None,
        };
        let env_map = self.collect_env_vars();
        Self::from_partial_and_env(partial, env_map)
    }

    /// Load partial configuration from TOML file
    fn load_partial_config(&self, config_path: &PathBuf) -> Result<Option<PartialContainerConfig>, ConfigError> {
        if !config_path.exists() {
            tracing::debug!("config file {:?} not found, using defaults", config_path);
            return Ok(None);
        }

        let content = fs::read_to_string(config_path)
            .map_err(|e| ConfigError::FileRead(config_path.to_string_lossy().to_string(), e))?;

        let partial: PartialContainerConfig = toml::from_str(&content)
            .map_err(|e| ConfigError::TomlParse(config_path.to_string_lossy().to_string(), e))?;

        Ok(Some(partial))
    }

    /// Collect relevant environment variables
    fn collect_env_vars(&self) -> HashMap<String, String> {
        let env_keys = [
            ENV_ROOT_SCOPE,
            ENV_ALLOWED_SCOPES,
            ENV_STRICT_LIFETIMES,
            ENV_TRACE_RESOLUTIONS,
        ];

        let mut env_map = HashMap::new();
        for key in &env_keys {
            if let Ok(value) = env::var(key) {
                env_map.insert(key.to_string(), value);
            }
        }
        env_map
    }

    fn from_partial_and_env(
        partial: Option<PartialContainerConfig>,
        env_map: HashMap<String, String>,
    ) -> Result<ContainerConfig, ConfigError> {
        let mut config = ContainerConfig::default();

        if let Some(partial) = partial {
            if let Some(root) = partial.root_scope_name {
                config.root_scope_name = root;
            }
            if partial.allowed_scopes.is_some() {
                config.allowed_scopes = partial.allowed_scopes;
            }
            if let Some(strict) = partial.strict_lifetimes {
                config.strict_lifetimes = strict;
            }
            if let Some(trace) = partial.trace_resolutions {
                config.trace_resolutions = trace;
            }
        }

        if let Some(root) = env_map.get(ENV_ROOT_SCOPE) {
            config.root_scope_name = root.clone();
        }
        if let Some(scopes) = env_map.get(ENV_ALLOWED_SCOPES) {
            config.allowed_scopes = Some(
                scopes
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            );
        }
        if let Some(value) = env_map.get(ENV_STRICT_LIFETIMES) {
            config.strict_lifetimes = parse_bool(ENV_STRICT_LIFETIMES, value)?;
        }
        if let Some(value) = env_map.get(ENV_TRACE_RESOLUTIONS) {
            config.trace_resolutions = parse_bool(ENV_TRACE_RESOLUTIONS, value)?;
        }

        if config.root_scope_name.trim().is_empty() {
            return Err(ConfigError::FieldMissing("root_scope_name".to_string()));
        }
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}
