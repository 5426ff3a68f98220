//! Service layer for querying and memoizing repository metrics.
//!
//! `MetricsQuerier` is the entry point the HTTP layer uses for per-repository metrics:
//! 1. Checking the in-memory cache for a response to the same repository and query.
//! 2. Fetching and deriving metrics through the hosting gateway on a miss.
//! 3. Memoizing only complete responses, so a degraded batch is recomputed next time.

use crate::config::{AppConfig, RepoId};
use crate::fetcher::{self, MetricsQuery, RepoMetricsResponse};
use crate::gateway::HostingGateway;
use moka::future::Cache;
use std::sync::Arc;

#[derive(Clone)]
pub struct MetricsQuerier {
    cache: Cache<(RepoId, MetricsQuery), RepoMetricsResponse>,
    gateway: Arc<dyn HostingGateway>,
}

impl MetricsQuerier {
    pub fn new(config: &AppConfig, gateway: Arc<dyn HostingGateway>) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.metrics_cache_max_capacity)
            .time_to_live(config.metrics_cache_ttl())
            .build();

        Self { cache, gateway }
    }

    /// Retrieves metrics for a repository, fetching them if not cached (read-through).
    pub async fn get(&self, repo_id: RepoId, query: MetricsQuery) -> RepoMetricsResponse {
        let key = (repo_id, query);
        if let Some(metrics) = self.cache.get(&key).await {
            tracing::debug!(repo_id = %key.0, "Serving memoized metrics");
            return metrics;
        }

        let metrics =
            fetcher::fetch_and_calculate_metrics(self.gateway.as_ref(), &key.0, &key.1).await;

        if metrics.failures.is_empty() {
            self.cache.insert(key, metrics.clone()).await;
        } else {
            tracing::info!(
                repo_id = %key.0,
                failures = metrics.failures.len(),
                "Not memoizing degraded metrics"
            );
        }

        metrics
    }
}
