//! Configuration models for sbae.
//!
//! Every user-resolvable parameter is parameterized here and loaded from a
//! TOML file; environment variables fill in secrets at runtime.

use crate::stats::ZeroAreaPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Top-level configuration for sbae.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Primary compute backend (remote endpoint, default)
    #[serde(default)]
    pub backend: BackendConfig,

    /// Additional named endpoints (e.g. a staging deployment)
    #[serde(default)]
    pub endpoints: HashMap<String, EndpointConfig>,

    /// Sampling design defaults
    #[serde(default)]
    pub design: DesignConfig,

    /// Bounded fetch pipeline settings
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Multi-resolution simulation settings
    #[serde(default)]
    pub simulation: SimulationConfig,

    /// Output settings
    #[serde(default)]
    pub output: OutputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            endpoints: HashMap::new(),
            design: DesignConfig::default(),
            fetch: FetchConfig::default(),
            simulation: SimulationConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Compute backend configuration (primary endpoint).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Backend kind: "http" (remote service) or "memory" (in-process, offline)
    #[serde(default = "default_backend_kind")]
    pub kind: String,

    /// API key (can also be set via the env var named by `api_key_env`)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Base URL for the compute service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Request timeout in seconds (evaluations can run long server-side)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Minimum spacing between requests in milliseconds (0 = no pacing)
    #[serde(default)]
    pub min_request_interval_ms: u64,
}

fn default_backend_kind() -> String {
    "http".to_string()
}

fn default_api_key_env() -> String {
    "SBAE_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://compute.sbae.dev/v1".to_string()
}

fn default_timeout() -> u64 {
    300
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            api_key: None,
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            min_request_interval_ms: 0,
        }
    }
}

/// Configuration for an additional named endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL for the service
    pub base_url: String,

    /// API key (optional, can be omitted for unauthenticated deployments)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Custom headers to include in requests
    /// Values can contain ${ENV_VAR} for environment variable expansion
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Minimum spacing between requests in milliseconds
    #[serde(default)]
    pub min_request_interval_ms: u64,
}

/// Sampling design defaults.
///
/// `shape` and `method` stay optional: building a design with either unset
/// fails with `MissingParameter` rather than guessing a default strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DesignConfig {
    /// Grid cell shape (only "square" is implemented)
    #[serde(default)]
    pub shape: Option<String>,

    /// Sampling method: "systematic" or "random"
    #[serde(default)]
    pub method: Option<String>,

    /// Grid cell size in meters
    #[serde(default = "default_grid_size")]
    pub grid_size: u32,

    /// Points per cell (random method only)
    #[serde(default = "default_n_points")]
    pub n_points: u32,

    /// Global seed for random sampling
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Output coordinate reference system
    #[serde(default = "default_crs")]
    pub crs: String,
}

fn default_grid_size() -> u32 {
    1000
}

fn default_n_points() -> u32 {
    1
}

fn default_seed() -> u64 {
    42
}

fn default_crs() -> String {
    "EPSG:3857".to_string()
}

impl Default for DesignConfig {
    fn default() -> Self {
        Self {
            shape: None,
            method: None,
            grid_size: default_grid_size(),
            n_points: default_n_points(),
            seed: default_seed(),
            crs: default_crs(),
        }
    }
}

/// Bounded fetch pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Concurrent page-fetch workers
    #[serde(default = "default_fetch_workers")]
    pub workers: usize,

    /// Maximum records per page (the backend rejects larger requests)
    #[serde(default = "default_page_cap")]
    pub page_cap: u64,
}

fn default_fetch_workers() -> usize {
    4
}

fn default_page_cap() -> u64 {
    5000
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            workers: default_fetch_workers(),
            page_cap: default_page_cap(),
        }
    }
}

/// Multi-resolution simulation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Policy for categories whose real area is zero
    #[serde(default)]
    pub zero_area_policy: ZeroAreaPolicy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            zero_area_policy: ZeroAreaPolicy::default(),
        }
    }
}

/// Output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory for exported files
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Resolve the API key for the primary backend from config or environment.
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        // First check explicit api_key in config
        if let Some(key) = &self.backend.api_key {
            return Ok(expand_env_vars(key));
        }

        // Then check environment variable
        std::env::var(&self.backend.api_key_env).map_err(|_| ConfigError::MissingApiKey {
            endpoint: "default".to_string(),
            env_var: self.backend.api_key_env.clone(),
        })
    }

    /// Resolve the API key for a named endpoint.
    pub fn resolve_endpoint_api_key(
        &self,
        endpoint_name: &str,
    ) -> Result<Option<String>, ConfigError> {
        let endpoint = self
            .endpoints
            .get(endpoint_name)
            .ok_or_else(|| ConfigError::EndpointNotFound(endpoint_name.to_string()))?;

        // Check explicit api_key
        if let Some(key) = &endpoint.api_key {
            return Ok(Some(expand_env_vars(key)));
        }

        // Check environment variable
        if let Some(env_var) = &endpoint.api_key_env {
            match std::env::var(env_var) {
                Ok(key) => return Ok(Some(key)),
                Err(_) => {
                    return Err(ConfigError::MissingApiKey {
                        endpoint: endpoint_name.to_string(),
                        env_var: env_var.clone(),
                    });
                }
            }
        }

        // No API key configured (valid for unauthenticated deployments)
        Ok(None)
    }
}

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let re = regex::Regex::new(r"\$\{([^}]+)\}").unwrap();

    for cap in re.captures_iter(s) {
        let var_name = &cap[1];
        if let Ok(value) = std::env::var(var_name) {
            result = result.replace(&cap[0], &value);
        }
    }

    result
}

/// Expand environment variables in all headers.
pub fn expand_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(k, v)| (k.clone(), expand_env_vars(v)))
        .collect()
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error(
        "Missing API key for endpoint '{endpoint}': set {env_var} env var or api_key in config"
    )]
    MissingApiKey { endpoint: String, env_var: String },

    #[error("Endpoint not found: '{0}' (not configured in [endpoints.*])")]
    EndpointNotFound(String),

    #[error("Unknown backend kind: '{0}' (expected 'http' or 'memory')")]
    UnknownBackendKind(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.fetch.workers, 4);
        assert_eq!(config.fetch.page_cap, 5000);
        assert_eq!(config.design.grid_size, 1000);
        assert_eq!(config.design.crs, "EPSG:3857");
        assert!(config.design.shape.is_none());
        assert!(config.design.method.is_none());
    }

    #[test]
    fn parses_minimal_toml() {
        let toml_str = r#"
            [backend]
            kind = "memory"

            [design]
            shape = "square"
            method = "random"
            grid_size = 500
            n_points = 3
            seed = 7
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.backend.kind, "memory");
        assert_eq!(config.design.shape.as_deref(), Some("square"));
        assert_eq!(config.design.n_points, 3);
        // Unspecified sections fall back to defaults
        assert_eq!(config.fetch.workers, 4);
    }

    #[test]
    fn expand_env_vars_substitutes_known_vars() {
        std::env::set_var("SBAE_TEST_VAR", "hello");
        assert_eq!(expand_env_vars("${SBAE_TEST_VAR}/x"), "hello/x");
        // Unknown vars are left as-is
        assert_eq!(
            expand_env_vars("${SBAE_DOES_NOT_EXIST}"),
            "${SBAE_DOES_NOT_EXIST}"
        );
    }
}
