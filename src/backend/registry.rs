//! Endpoint registry for compute backends.
//!
//! Maps endpoint names to shared backend instances. The "default" endpoint
//! is built from `[backend]` and always present; `[endpoints.*]` adds
//! alternates (a staging deployment, a second region). A "memory" kind
//! resolves to the in-process backend for offline runs.

use crate::backend::{
    Backend, HealthCheckResult, HealthStatus, HttpBackend, MemoryBackend, RateLimiter,
};
use crate::models::{expand_headers, Config, ConfigError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Registry of configured compute backends.
///
/// Thread-safe: all backends are `Arc<dyn Backend>` for shared access.
pub struct BackendRegistry {
    backends: HashMap<String, Arc<dyn Backend>>,
}

impl BackendRegistry {
    /// Build registry from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut backends: HashMap<String, Arc<dyn Backend>> = HashMap::new();

        let default: Arc<dyn Backend> = match config.backend.kind.as_str() {
            "http" => Arc::new(HttpBackend::from_config(config)?),
            "memory" => Arc::new(MemoryBackend::with_demo_raster()),
            other => return Err(ConfigError::UnknownBackendKind(other.to_string()).into()),
        };
        backends.insert("default".to_string(), default);

        for (name, endpoint_config) in &config.endpoints {
            let api_key = config.resolve_endpoint_api_key(name)?;
            let headers = expand_headers(&endpoint_config.headers);

            let backend = HttpBackend::new(
                name.clone(),
                api_key,
                endpoint_config.base_url.clone(),
                headers,
                endpoint_config.timeout_secs,
                Some(Arc::new(RateLimiter::new(Duration::from_millis(
                    endpoint_config.min_request_interval_ms,
                )))),
            )?;

            backends.insert(name.clone(), Arc::new(backend));
        }

        Ok(Self { backends })
    }

    /// Get backend by endpoint name.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(name)
    }

    /// Get the default backend.
    pub fn default_backend(&self) -> &Arc<dyn Backend> {
        self.backends
            .get("default")
            .expect("default backend should always exist")
    }

    /// Get all endpoint names.
    pub fn endpoint_names(&self) -> Vec<&str> {
        self.backends.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Run health checks on all endpoints.
    pub async fn health_check_all(&self) -> Vec<HealthCheckResult> {
        let mut results = Vec::new();

        for (name, backend) in &self.backends {
            let result = backend.health_check().await;

            match result.status {
                HealthStatus::Healthy => {
                    if let Some(latency) = result.latency_ms {
                        info!(endpoint = %name, latency_ms = latency, "Endpoint healthy");
                    }
                }
                HealthStatus::Unhealthy | HealthStatus::Unreachable => {
                    warn!(
                        endpoint = %name,
                        status = %result.status,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Endpoint not healthy"
                    );
                }
            }

            results.push(result);
        }

        results
    }

    /// Run health checks and return (healthy_count, total_count, unhealthy).
    pub async fn health_check_summary(&self) -> (usize, usize, Vec<String>) {
        let results = self.health_check_all().await;
        let total = results.len();
        let healthy = results
            .iter()
            .filter(|r| r.status == HealthStatus::Healthy)
            .count();
        let unhealthy: Vec<String> = results
            .iter()
            .filter(|r| r.status != HealthStatus::Healthy)
            .map(|r| r.endpoint.clone())
            .collect();

        (healthy, total, unhealthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_kind_builds_without_credentials() {
        let mut config = Config::default();
        config.backend.kind = "memory".to_string();

        let registry = BackendRegistry::from_config(&config).unwrap();
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.default_backend().name(), "memory");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let mut config = Config::default();
        config.backend.kind = "quantum".to_string();

        assert!(BackendRegistry::from_config(&config).is_err());
    }
}
