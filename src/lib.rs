pub mod ai;
pub mod cache;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod gateway;
pub mod github;
pub mod metrics;
pub mod querier;
pub mod summaries;
pub mod types;
pub mod webhook;

use ai::{OpenAiAnalyzer, TextAnalyzer};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use cache::ContentCache;
use chrono::NaiveDate;
use config::{AppConfig, RepoId};
use fetcher::{DashboardResponse, MetricsQuery};
use gateway::{Degrade, FetchFailure, HostingGateway};
use github::GitHubGateway;
use querier::MetricsQuerier;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use types::{SecurityAlert, Severity, StateFilter};

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

/// Shared application state accessible to all request handlers.
pub struct AppState {
    /// Hosting API used by every flow.
    pub gateway: Arc<dyn HostingGateway>,
    /// Completion service used for summaries and reviews.
    pub analyzer: Arc<dyn TextAnalyzer>,
    /// Diff-derived AI output, keyed per PR and purpose.
    pub cache: ContentCache,
    /// Memoizing service for repository metrics.
    pub querier: MetricsQuerier,
    /// Application configuration loaded from environment variables.
    pub config: AppConfig,
}

impl AppState {
    /// Initializes the application state with the GitHub and OpenAI clients.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let gateway = GitHubGateway::new(
            &config.github_api_url,
            Some(config.github_token.clone()),
            config.request_timeout(),
        )?;
        let analyzer = OpenAiAnalyzer::new(
            &config.openai_api_url,
            &config.openai_api_key,
            &config.openai_model,
            config.request_timeout(),
        )?;

        Ok(Self::with_services(
            config,
            Arc::new(gateway),
            Arc::new(analyzer),
        ))
    }

    /// Builds the state around already constructed remote services.
    pub fn with_services(
        config: AppConfig,
        gateway: Arc<dyn HostingGateway>,
        analyzer: Arc<dyn TextAnalyzer>,
    ) -> Self {
        let querier = MetricsQuerier::new(&config, gateway.clone());
        let cache = ContentCache::new(&config.cache_database);
        Self {
            gateway,
            analyzer,
            cache,
            querier,
            config,
        }
    }
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/pr-reviewer-webhook", post(webhook::handle_pr_webhook))
        .route("/api/repos/{owner}/{repo}/metrics", get(get_repo_metrics))
        .route("/api/repos/{owner}/{repo}/alerts", get(get_repo_alerts))
        .route("/api/repos/{owner}/{repo}/summaries", post(generate_summaries))
        .route("/api/repos/{owner}/{repo}/reviews", post(review_open_prs))
        .route("/api/orgs/{org}/repos", get(get_org_repos))
        .route("/api/dashboard", get(get_dashboard))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse { status: "Good" })
}

pub async fn get_repo_metrics(
    Path(repo_id): Path<RepoId>,
    Query(query): Query<MetricsQuery>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<fetcher::RepoMetricsResponse>, (StatusCode, String)> {
    if query.since > query.until {
        return Err((
            StatusCode::BAD_REQUEST,
            "since must not be after until".to_string(),
        ));
    }

    let metrics = state.querier.get(repo_id.clone(), query).await;
    tracing::debug!(repo_id = %repo_id, rows = metrics.pull_requests.len(), "Returning metrics");
    Ok(Json(metrics))
}

#[derive(Serialize)]
pub struct AlertsResponse {
    pub repository: String,
    pub alerts: Vec<SecurityAlert>,
    pub severity_counts: BTreeMap<Severity, usize>,
    pub failures: Vec<FetchFailure>,
}

pub async fn get_repo_alerts(
    Path(repo_id): Path<RepoId>,
    State(state): State<Arc<AppState>>,
) -> Json<AlertsResponse> {
    let mut failures = Vec::new();
    let alerts = state
        .gateway
        .list_security_alerts(&repo_id)
        .await
        .or_neutral(&format!("list security alerts for {repo_id}"), &mut failures);

    Json(AlertsResponse {
        repository: repo_id.to_string(),
        severity_counts: metrics::alert_severity_counts(&alerts),
        alerts,
        failures,
    })
}

#[derive(Deserialize)]
pub struct SummariesRequest {
    pub since: NaiveDate,
    pub until: NaiveDate,
}

pub async fn generate_summaries(
    Path(repo_id): Path<RepoId>,
    State(state): State<Arc<AppState>>,
    Json(request): Json<SummariesRequest>,
) -> Json<summaries::SummariesResponse> {
    Json(
        summaries::generate_summaries(
            state.gateway.as_ref(),
            state.analyzer.as_ref(),
            &state.cache,
            &repo_id,
            request.since,
            request.until,
        )
        .await,
    )
}

pub async fn review_open_prs(
    Path(repo_id): Path<RepoId>,
    State(state): State<Arc<AppState>>,
) -> Json<summaries::ReviewsResponse> {
    Json(
        summaries::review_open_prs(
            state.gateway.as_ref(),
            state.analyzer.as_ref(),
            &state.cache,
            &repo_id,
        )
        .await,
    )
}

#[derive(Serialize)]
pub struct OrgReposResponse {
    pub organization: String,
    pub repositories: Vec<String>,
    pub failures: Vec<FetchFailure>,
}

pub async fn get_org_repos(
    Path(org): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Json<OrgReposResponse> {
    let mut failures = Vec::new();
    let repositories = state
        .gateway
        .list_org_repositories(&org)
        .await
        .or_neutral(&format!("list repositories for {org}"), &mut failures);

    Json(OrgReposResponse {
        organization: org,
        repositories,
        failures,
    })
}

#[derive(Deserialize)]
pub struct DashboardParams {
    /// Comma-separated `owner/repo` list; defaults to every repository of the configured org.
    pub repos: Option<String>,
    pub since: NaiveDate,
    pub until: NaiveDate,
    #[serde(default)]
    pub state: StateFilter,
}

pub async fn get_dashboard(
    Query(params): Query<DashboardParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Json<DashboardResponse>, (StatusCode, String)> {
    let mut failures = Vec::new();

    let names: Vec<String> = match (&params.repos, &state.config.github_org) {
        (Some(list), _) => list
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect(),
        (None, Some(org)) => state
            .gateway
            .list_org_repositories(org)
            .await
            .or_neutral(&format!("list repositories for {org}"), &mut failures),
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                "repos is required when no organization is configured".to_string(),
            ))
        }
    };

    let repos = names
        .iter()
        .map(|name| name.parse::<RepoId>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let query = MetricsQuery {
        since: params.since,
        until: params.until,
        state: params.state,
    };

    let mut dashboard = fetcher::build_dashboard(state.gateway.as_ref(), &repos, &query).await;
    failures.append(&mut dashboard.failures);
    dashboard.failures = failures;

    Ok(Json(dashboard))
}
