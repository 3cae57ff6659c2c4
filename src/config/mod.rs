pub mod loader;

use serde::Deserialize;

pub use loader::ConfigLoader;

/// Root scope name used when none is configured
pub const DEFAULT_ROOT_SCOPE: &str = "singleton";

/// Container configuration
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ContainerConfig {
    /// Name of the root scope, which holds singletons
    pub root_scope_name: String,
    /// Whitelist of scope names; `None` accepts any name
    pub allowed_scopes: Option<Vec<String>>,
    /// Resolve dependencies of cached services against the owning scope
    /// instead of the calling scope
    pub strict_lifetimes: bool,
    /// Emit a trace event for every cache hit
    pub trace_resolutions: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            root_scope_name: DEFAULT_ROOT_SCOPE.to_string(),
            allowed_scopes: None,
            strict_lifetimes: false,
            trace_resolutions: false,
        }
    }
}

impl ContainerConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, crate::errors::ConfigError> {
        let loader = match path {
            Some(path) => ConfigLoader::with_file(path.to_path_buf()),
            None => ConfigLoader::new(),
        };
        loader.load_config()
    }
}
