use crate::config::RepoId;
use crate::gateway::{Degrade, FetchFailure, HostingGateway};
use crate::metrics::{self, AggregateMetrics, DashboardSummary, PrEvidence, PrMetric};
use crate::types::{PullRequest, StateFilter};
use chrono::NaiveDate;
use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

/// Supplementary fetches kept in flight at once within one repository.
const PR_CONCURRENCY: usize = 4;

/// Date window and state a metrics request is scoped to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetricsQuery {
    pub since: NaiveDate,
    pub until: NaiveDate,
    #[serde(default)]
    pub state: StateFilter,
}

#[derive(Clone, Debug, Serialize)]
pub struct RepoMetricsResponse {
    pub repository: String,
    pub query: MetricsQuery,
    pub pull_requests: Vec<PrMetric>,
    pub aggregate: AggregateMetrics,
    /// Remote calls that fell back to neutral values while building this response.
    pub failures: Vec<FetchFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardResponse {
    pub repositories: Vec<String>,
    pub summary: DashboardSummary,
    pub failures: Vec<FetchFailure>,
}

/// Lists the PRs for a query. Listing failures degrade to an empty set.
///
/// Closed listings are already restricted to merges inside the window by the gateway;
/// other states are restricted here by creation date.
pub async fn list_in_window(
    gateway: &dyn HostingGateway,
    repo: &RepoId,
    query: &MetricsQuery,
    failures: &mut Vec<FetchFailure>,
) -> Vec<PullRequest> {
    let prs = gateway
        .list_pull_requests(repo, query.state, query.since, query.until)
        .await
        .or_neutral(&format!("list pull requests for {repo}"), failures);

    match query.state {
        StateFilter::Closed => prs,
        StateFilter::Open | StateFilter::All => prs
            .into_iter()
            .filter(|pr| {
                let day = pr.created_at.date_naive();
                query.since <= day && day <= query.until
            })
            .collect(),
    }
}

/// Fetches comments, review comments, timeline and detail for one PR.
/// The four reads are independent and run concurrently.
async fn gather_evidence(
    gateway: &dyn HostingGateway,
    repo: &RepoId,
    number: u64,
) -> (PrEvidence, Vec<FetchFailure>) {
    let (comments, review_comments, timeline, detail) = futures::join!(
        gateway.list_comments(repo, number),
        gateway.list_review_comments(repo, number),
        gateway.list_timeline_events(repo, number),
        gateway.fetch_pr_detail(repo, number),
    );

    let mut failures = Vec::new();
    let evidence = PrEvidence {
        comments: comments
            .or_neutral(&format!("list comments for {repo}#{number}"), &mut failures),
        review_comments: review_comments.or_neutral(
            &format!("list review comments for {repo}#{number}"),
            &mut failures,
        ),
        timeline: timeline
            .or_neutral(&format!("list timeline for {repo}#{number}"), &mut failures),
        detail: detail
            .map(Some)
            .or_neutral(&format!("fetch detail for {repo}#{number}"), &mut failures),
    };

    (evidence, failures)
}

/// Derives a metric row for every PR. A PR whose supplementary fetches fail still gets a
/// row built from defaults, so one bad PR never drops the batch.
pub async fn collect_pr_metrics(
    gateway: &dyn HostingGateway,
    repo: &RepoId,
    prs: &[PullRequest],
) -> (Vec<PrMetric>, Vec<FetchFailure>) {
    let repository = repo.to_string();

    let pending: Vec<BoxFuture<'_, (PrMetric, Vec<FetchFailure>)>> = prs
        .iter()
        .map(|pr| {
            let repository = repository.as_str();
            async move {
                let (evidence, failures) = gather_evidence(gateway, repo, pr.number).await;
                (metrics::derive_metric(repository, pr, &evidence), failures)
            }
            .boxed()
        })
        .collect();

    let rows: Vec<(PrMetric, Vec<FetchFailure>)> = stream::iter(pending)
        .buffered(PR_CONCURRENCY)
        .collect()
        .await;

    let mut failures = Vec::new();
    let metrics = rows
        .into_iter()
        .map(|(metric, pr_failures)| {
            failures.extend(pr_failures);
            metric
        })
        .collect();

    (metrics, failures)
}

/// Fetches PRs from GitHub and calculates per-PR and aggregate metrics.
pub async fn fetch_and_calculate_metrics(
    gateway: &dyn HostingGateway,
    repo: &RepoId,
    query: &MetricsQuery,
) -> RepoMetricsResponse {
    let mut failures = Vec::new();
    let prs = list_in_window(gateway, repo, query, &mut failures).await;
    let (pull_requests, pr_failures) = collect_pr_metrics(gateway, repo, &prs).await;
    failures.extend(pr_failures);

    let aggregate = metrics::aggregate(&pull_requests);
    tracing::info!(
        repo = %repo,
        total = aggregate.total,
        merged = aggregate.merged,
        avg_size = metrics::round_to(aggregate.avg_pr_size, 1),
        failures = failures.len(),
        "Calculated repository metrics"
    );

    RepoMetricsResponse {
        repository: repo.to_string(),
        query: query.clone(),
        pull_requests,
        aggregate,
        failures,
    }
}

/// Walks the repositories one after another and rolls every PR up into one summary.
pub async fn build_dashboard(
    gateway: &dyn HostingGateway,
    repos: &[RepoId],
    query: &MetricsQuery,
) -> DashboardResponse {
    let mut all_metrics = Vec::new();
    let mut failures = Vec::new();

    for repo in repos {
        let response = fetch_and_calculate_metrics(gateway, repo, query).await;
        all_metrics.extend(response.pull_requests);
        failures.extend(response.failures);
    }

    DashboardResponse {
        repositories: repos.iter().map(ToString::to_string).collect(),
        summary: metrics::summarize_dashboard(&all_metrics),
        failures,
    }
}
