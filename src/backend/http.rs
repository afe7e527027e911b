//! HTTP client for the remote geospatial compute service.
//!
//! Expressions are shipped as JSON; the service materializes them and
//! returns records or grouped reductions. Every call is dispatched once:
//! a failed evaluation surfaces as `BackendFetch` and aborts the batch
//! that issued it. The rate limiter only paces dispatches, it never
//! re-issues a request.

use crate::backend::{
    Backend, DensityExpr, HealthCheckResult, HealthStatus, PointsExpr, RateLimiter,
};
use crate::models::{
    Aoi, BackendError, CategoryAreas, Config, PointRecord, RasterRef, Result, SbaeError,
};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Feature record as it crosses the wire; `plot_id` is assigned locally
/// after pages are reassembled in offset order.
#[derive(Debug, Deserialize)]
struct WireFeature {
    lon: f64,
    lat: f64,
    cell_index: u64,
    #[serde(default)]
    seed_offset: Option<u64>,
    #[serde(default)]
    attributes: serde_json::Value,
}

impl From<WireFeature> for PointRecord {
    fn from(w: WireFeature) -> Self {
        PointRecord {
            plot_id: 0,
            lon: w.lon,
            lat: w.lat,
            cell_index: w.cell_index,
            seed_offset: w.seed_offset,
            attributes: w.attributes,
        }
    }
}

#[derive(Debug, Serialize)]
struct CountRequest<'a> {
    points: &'a PointsExpr,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Serialize)]
struct PageRequest<'a> {
    points: &'a PointsExpr,
    batch_size: u64,
    offset: u64,
}

#[derive(Debug, Deserialize)]
struct PageResponse {
    features: Vec<WireFeature>,
}

#[derive(Debug, Serialize)]
struct ScaleRequest<'a> {
    raster: &'a RasterRef,
}

#[derive(Debug, Deserialize)]
struct ScaleResponse {
    nominal_scale: f64,
}

#[derive(Debug, Serialize)]
struct ReduceRequest<'a> {
    raster: &'a RasterRef,
    geometry: &'a geo::MultiPolygon<f64>,
    scale: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    mask: Option<&'a DensityExpr>,
}

#[derive(Debug, Deserialize)]
struct ReduceResponse {
    groups: Vec<GroupEntry>,
}

/// One (category, sum) pair of a grouped reduction.
#[derive(Debug, Deserialize)]
struct GroupEntry {
    category: f64,
    sum: f64,
}

/// API error response.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// HTTP backend for the remote compute service.
///
/// Features:
/// - Bearer auth from config or environment
/// - Custom headers for deployment flexibility
/// - Pre-dispatch pacing with server backoff hints
/// - Request tallies for run reports
pub struct HttpBackend {
    client: reqwest::Client,
    /// Name of this endpoint (for logging)
    name: String,
    /// API key (None for unauthenticated deployments)
    api_key: Option<String>,
    /// Base URL for the service
    base_url: String,
    /// Custom headers to include in requests
    custom_headers: HashMap<String, String>,
    /// Request timeout
    timeout: Duration,
    /// Rate limiter
    rate_limiter: Arc<RateLimiter>,
    // Request tracking
    total_requests: AtomicU64,
    total_records: AtomicU64,
}

impl HttpBackend {
    /// Create a new HTTP backend.
    pub fn new(
        name: String,
        api_key: Option<String>,
        base_url: String,
        custom_headers: HashMap<String, String>,
        timeout_secs: u64,
        rate_limiter: Option<Arc<RateLimiter>>,
    ) -> Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SbaeError::BackendFetch(BackendError::Network(e)))?;

        Ok(Self {
            client,
            name,
            api_key,
            base_url,
            custom_headers,
            timeout,
            rate_limiter: rate_limiter.unwrap_or_else(|| Arc::new(RateLimiter::default())),
            total_requests: AtomicU64::new(0),
            total_records: AtomicU64::new(0),
        })
    }

    /// Create the primary backend from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let api_key = config.resolve_api_key()?;
        Self::new(
            "default".to_string(),
            Some(api_key),
            config.backend.base_url.clone(),
            HashMap::new(),
            config.backend.timeout_secs,
            Some(Arc::new(RateLimiter::new(Duration::from_millis(
                config.backend.min_request_interval_ms,
            )))),
        )
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the rate limiter.
    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    /// Total (requests, records) dispatched through this backend.
    pub fn totals(&self) -> (u64, u64) {
        (
            self.total_requests.load(Ordering::Relaxed),
            self.total_records.load(Ordering::Relaxed),
        )
    }

    /// Build headers for a request.
    fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        if let Some(ref api_key) = self.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
                headers.insert(AUTHORIZATION, value);
            }
        }

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("X-Client", HeaderValue::from_static("sbae"));

        for (key, value) in &self.custom_headers {
            if let (Ok(name), Ok(val)) = (
                HeaderName::try_from(key.as_str()),
                HeaderValue::from_str(value),
            ) {
                headers.insert(name, val);
            }
        }

        headers
    }

    /// Dispatch one POST evaluation. No retry: the first failure is the
    /// batch's failure.
    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        operation: &'static str,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        self.rate_limiter.wait_if_needed(operation).await;
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let url = format!("{}/{path}", self.base_url);
        let start = Instant::now();

        let response = self
            .client
            .post(&url)
            .headers(self.headers())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout(self.timeout)
                } else {
                    BackendError::Network(e)
                }
            })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<f64>().ok());

        self.rate_limiter
            .record_request(operation, status, retry_after);

        if status == 429 {
            let message = response.text().await.unwrap_or_default();
            return Err(BackendError::RateLimited {
                message,
                retry_after_secs: retry_after,
            }
            .into());
        }

        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let message =
                if let Ok(api_error) = serde_json::from_str::<ApiErrorResponse>(&error_body) {
                    api_error.error.message
                } else {
                    error_body
                };

            let error = match status {
                401 => BackendError::AuthenticationFailed,
                404 => BackendError::AssetNotFound(message),
                _ => BackendError::ApiError { status, message },
            };
            return Err(error.into());
        }

        let parsed: Resp = response.json().await.map_err(|e| {
            SbaeError::BackendFetch(BackendError::InvalidResponse(format!(
                "failed to parse {operation} response: {e}"
            )))
        })?;

        debug!(
            endpoint = %self.name,
            operation = operation,
            status = status,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluation complete"
        );

        Ok(parsed)
    }
}

#[async_trait]
impl Backend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn count_features(&self, points: &PointsExpr) -> Result<u64> {
        let response: CountResponse = self
            .post_json("count_features", "collections/count", &CountRequest { points })
            .await?;
        Ok(response.count)
    }

    async fn page_features(
        &self,
        points: &PointsExpr,
        batch_size: u64,
        offset: u64,
    ) -> Result<Vec<PointRecord>> {
        let response: PageResponse = self
            .post_json(
                "page_features",
                "collections/page",
                &PageRequest {
                    points,
                    batch_size,
                    offset,
                },
            )
            .await?;

        self.total_records
            .fetch_add(response.features.len() as u64, Ordering::Relaxed);

        Ok(response.features.into_iter().map(PointRecord::from).collect())
    }

    async fn nominal_scale(&self, raster: &RasterRef) -> Result<f64> {
        let response: ScaleResponse = self
            .post_json("nominal_scale", "rasters/scale", &ScaleRequest { raster })
            .await?;

        if !response.nominal_scale.is_finite() || response.nominal_scale <= 0.0 {
            return Err(BackendError::InvalidResponse(format!(
                "non-positive nominal scale {} for asset {}",
                response.nominal_scale, raster.asset_id
            ))
            .into());
        }

        Ok(response.nominal_scale)
    }

    async fn reduce_area_by_category(
        &self,
        raster: &RasterRef,
        aoi: &Aoi,
        scale: f64,
        mask: Option<&DensityExpr>,
    ) -> Result<CategoryAreas> {
        let response: ReduceResponse = self
            .post_json(
                "reduce_area_by_category",
                "reduce/area-by-category",
                &ReduceRequest {
                    raster,
                    geometry: aoi.geometry(),
                    scale,
                    mask,
                },
            )
            .await?;

        // Validate at the response boundary, before the aggregator sees it
        let pairs = response
            .groups
            .into_iter()
            .map(|g| (g.category, g.sum))
            .collect();
        Ok(CategoryAreas::from_pairs(pairs)?)
    }

    async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let url = format!("{}/status", self.base_url);

        match self
            .client
            .get(&url)
            .headers(self.headers())
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => {
                let latency_ms = start.elapsed().as_millis() as u64;
                if response.status().is_success() {
                    HealthCheckResult {
                        endpoint: self.name.clone(),
                        status: HealthStatus::Healthy,
                        latency_ms: Some(latency_ms),
                        error: None,
                    }
                } else {
                    HealthCheckResult {
                        endpoint: self.name.clone(),
                        status: HealthStatus::Unhealthy,
                        latency_ms: Some(latency_ms),
                        error: Some(format!("HTTP {}", response.status().as_u16())),
                    }
                }
            }
            Err(e) => HealthCheckResult {
                endpoint: self.name.clone(),
                status: HealthStatus::Unreachable,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }
}
