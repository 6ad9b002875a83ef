use super::fetch_coordinator::FetchCoordinator;
use super::insights;
use super::memory_cache::MemoryCache;
use super::producer::{ExternalProducer, RetryPolicy};
use crate::config::Settings;
use crate::data::{AnalysisResult, Cache, FailureKind, FetchFailure, ProductSnapshot, ReviewRecord};
use crate::workers::ProcessWorker;
use chrono::Utc;
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;
use url::Url;

/// Errors a request can end with
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalysisError {
    #[error("Invalid product URL: {0}")]
    InvalidInput(String),

    #[error("Upstream is rate limiting requests: {0}")]
    RateLimited(String),

    #[error("Product fetch timed out: {0}")]
    Timeout(String),

    #[error("Product data unavailable ({kind}): {detail}")]
    UpstreamUnavailable { kind: FailureKind, detail: String },
}

/// Error object returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl AnalysisError {
    /// HTTP-equivalent status class
    pub fn status(&self) -> u16 {
        match self {
            AnalysisError::InvalidInput(_) => 400,
            AnalysisError::RateLimited(_) => 429,
            AnalysisError::Timeout(_) => 504,
            AnalysisError::UpstreamUnavailable { .. } => 500,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            AnalysisError::InvalidInput(reason) => (
                "Please provide a valid Amazon product URL",
                reason.clone(),
            ),
            AnalysisError::RateLimited(detail) => (
                "Amazon is rate limiting requests. Please try again in a few minutes.",
                detail.clone(),
            ),
            AnalysisError::Timeout(detail) => (
                "Request timed out while fetching product data. Please try again.",
                detail.clone(),
            ),
            AnalysisError::UpstreamUnavailable { detail, .. } => {
                ("Failed to fetch product data", detail.clone())
            }
        };
        ErrorBody {
            error: error.to_string(),
            details: Some(details).filter(|d| !d.is_empty()),
        }
    }

    fn from_primary(failure: FetchFailure) -> Self {
        match failure.kind {
            FailureKind::RateLimited => AnalysisError::RateLimited(failure.detail),
            FailureKind::Timeout => AnalysisError::Timeout(failure.detail),
            kind => AnalysisError::UpstreamUnavailable {
                kind,
                detail: failure.detail,
            },
        }
    }
}

/// Request-level knobs
#[derive(Debug, Clone)]
pub struct AnalyzerOptions {
    /// Lowercase fragments one of which the URL host must contain
    pub accepted_hosts: Vec<String>,
    /// Most reviews kept in a result
    pub review_excerpt: usize,
}

impl Default for AnalyzerOptions {
    fn default() -> Self {
        Self {
            accepted_hosts: vec!["amazon.".to_string(), "amzn.".to_string()],
            review_excerpt: 10,
        }
    }
}

/// Analyzer context: validates a request, serves it from cache or fetches,
/// assembles the report and populates the cache.
pub struct Analyzer<C>
where
    C: Cache<Value = AnalysisResult>,
{
    cache: C,
    coordinator: FetchCoordinator,
    options: AnalyzerOptions,
}

impl Analyzer<MemoryCache<AnalysisResult>> {
    /// Wires process workers, retry policy and an in-memory cache from settings
    pub fn from_settings(settings: &Settings) -> Self {
        let worker = Arc::new(ProcessWorker::from_settings(settings));
        let policy = RetryPolicy::new(settings.max_retries, settings.retry_base_delay());
        let producer = Arc::new(ExternalProducer::new(worker, policy));
        let cache = MemoryCache::new(settings.cache_ttl(), settings.cache_max_entries);

        Analyzer::new(
            cache,
            FetchCoordinator::new(producer),
            AnalyzerOptions {
                accepted_hosts: settings.accepted_hosts.clone(),
                review_excerpt: settings.review_excerpt,
            },
        )
    }
}

impl<C> Analyzer<C>
where
    C: Cache<Value = AnalysisResult>,
{
    pub fn new(cache: C, coordinator: FetchCoordinator, options: AnalyzerOptions) -> Self {
        Self {
            cache,
            coordinator,
            options,
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Checks that `url` is an absolute http(s) URL on an accepted host.
    /// Returns the cache key for the request.
    pub fn validate_url(&self, url: &str) -> Result<String, AnalysisError> {
        let key = url.trim();
        let parsed = Url::parse(key)
            .map_err(|e| AnalysisError::InvalidInput(format!("'{}' is not a URL: {}", key, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AnalysisError::InvalidInput(format!(
                "unsupported scheme '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed.host_str().unwrap_or_default().to_lowercase();
        let accepted = self
            .options
            .accepted_hosts
            .iter()
            .any(|marker| host.contains(marker.as_str()));
        if !accepted {
            return Err(AnalysisError::InvalidInput(format!(
                "host '{}' is not a supported store",
                host
            )));
        }

        Ok(key.to_string())
    }

    /// Public function: handle
    ///
    /// Serves one analysis request. Failures are never cached; a success is
    /// stored before it is returned.
    pub async fn handle(&self, url: &str) -> Result<AnalysisResult, AnalysisError> {
        let started = Instant::now();

        // Step 1: Validate input
        let key = self.validate_url(url)?;

        // Step 2: Check cache for existing result
        if let Some(mut cached) = self.cache.get(&key) {
            info!("cache hit for {}", key);
            cached.cached = true;
            cached.last_updated = Utc::now();
            cached.processing_time_ms = elapsed_ms(started);
            return Ok(cached);
        }

        // Step 3: Cache miss - fetch both sources
        debug!("cache miss for {}", key);
        let report = self.coordinator.fetch_all(&key).await;

        // Step 4: The product snapshot is required
        let snapshot = report.primary.map_err(AnalysisError::from_primary)?;

        // Step 5 and 6: Derive fields, assemble and store
        let elapsed_ms = elapsed_ms(started);
        let result = self.assemble(&key, snapshot, report.reviews, elapsed_ms);
        self.cache.set(&key, result.clone());
        info!(
            "analyzed {} in {}ms ({} reviews)",
            key,
            elapsed_ms,
            result.reviews.len()
        );

        Ok(result)
    }

    fn assemble(
        &self,
        url: &str,
        snapshot: ProductSnapshot,
        mut reviews: Vec<ReviewRecord>,
        processing_time_ms: u64,
    ) -> AnalysisResult {
        let now = Utc::now();
        let analysis = insights::analyze(&snapshot, &reviews);
        let seed_key = snapshot.asin.as_deref().unwrap_or(url);
        let price = insights::price_block(&snapshot, seed_key, now.date_naive());
        reviews.truncate(self.options.review_excerpt);

        AnalysisResult {
            url: url.to_string(),
            asin: ProductSnapshot::known(snapshot.asin.as_deref()),
            title: snapshot.title.as_deref().unwrap_or_default().trim().to_string(),
            price,
            rating: snapshot.rating_value(),
            review_count: snapshot.review_count_value(),
            availability: ProductSnapshot::known(snapshot.availability.as_deref()),
            description: ProductSnapshot::known(snapshot.description.as_deref()),
            images: snapshot.images,
            features: snapshot.features,
            reviews,
            analysis,
            last_updated: now,
            processing_time_ms,
            cached: false,
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
