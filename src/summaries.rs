//! Diff summary and open-PR review flows.
//!
//! Both follow the same cache discipline per PR: a cache hit is returned as is, a miss
//! fetches the diff, runs the AI operation matching the cache purpose, stores the result
//! and returns it. A PR whose diff or AI call fails is skipped and recorded; the rest of
//! the batch carries on.

use crate::ai::TextAnalyzer;
use crate::cache::{composite_key, CachePurpose, ContentCache};
use crate::config::RepoId;
use crate::error::AnalysisError;
use crate::gateway::{Degrade, FetchFailure, HostingGateway};
use crate::types::{PullRequest, StateFilter};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

/// AI output for one PR and whether it came from the cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrAnalysis {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub html_url: String,
    pub merged_at: Option<DateTime<Utc>>,
    pub text: String,
    pub cached: bool,
}

#[derive(Clone, Debug, Serialize)]
pub struct SummariesResponse {
    pub repository: String,
    pub since: NaiveDate,
    pub until: NaiveDate,
    pub summaries: Vec<PrAnalysis>,
    /// Present when at least one summary was produced and the collection call succeeded.
    pub release_notes: Option<String>,
    pub failures: Vec<FetchFailure>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ReviewsResponse {
    pub repository: String,
    pub reviews: Vec<PrAnalysis>,
    pub failures: Vec<FetchFailure>,
}

async fn run_analysis(
    analyzer: &dyn TextAnalyzer,
    purpose: CachePurpose,
    diff: &str,
) -> Result<String, AnalysisError> {
    match purpose {
        CachePurpose::GenerateSummaries => analyzer.summarize_diff(diff).await,
        CachePurpose::CheckOpenPrReview => analyzer.review_diff(diff).await,
    }
}

/// Cache hit ⇒ stored text. Cache miss ⇒ diff, analysis, store.
pub async fn cached_analysis(
    gateway: &dyn HostingGateway,
    analyzer: &dyn TextAnalyzer,
    cache: &ContentCache,
    repo: &RepoId,
    pr: &PullRequest,
    purpose: CachePurpose,
) -> Result<PrAnalysis, FetchFailure> {
    let key = composite_key(repo, pr.number, purpose);
    let analysis = |text: String, cached: bool| PrAnalysis {
        number: pr.number,
        title: pr.title.clone(),
        author: pr.author.clone(),
        html_url: pr.html_url.clone(),
        merged_at: pr.merged_at,
        text,
        cached,
    };

    match cache.lookup(purpose, &key).await {
        Ok(Some(text)) => return Ok(analysis(text, true)),
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cache lookup failed; recomputing");
        }
    }

    let operation = format!("fetch diff for {repo}#{}", pr.number);
    let diff = gateway
        .fetch_diff(repo, pr.number)
        .await
        .map_err(|e| FetchFailure::new(&operation, format!("diff-unavailable: {e}")))?;
    if diff.trim().is_empty() {
        return Err(FetchFailure::new(operation, "diff-unavailable: empty diff"));
    }

    let text = run_analysis(analyzer, purpose, &diff)
        .await
        .map_err(|e| FetchFailure::new(format!("{purpose} for {repo}#{}", pr.number), e))?;

    if let Err(e) = cache.store(purpose, &key, &text).await {
        tracing::warn!(key = %key, error = %e, "Failed to cache analysis");
    }

    Ok(analysis(text, false))
}

async fn analyze_all(
    gateway: &dyn HostingGateway,
    analyzer: &dyn TextAnalyzer,
    cache: &ContentCache,
    repo: &RepoId,
    prs: &[PullRequest],
    purpose: CachePurpose,
    failures: &mut Vec<FetchFailure>,
) -> Vec<PrAnalysis> {
    let mut results = Vec::with_capacity(prs.len());
    for pr in prs {
        match cached_analysis(gateway, analyzer, cache, repo, pr, purpose).await {
            Ok(analysis) => results.push(analysis),
            Err(failure) => {
                tracing::warn!(
                    repo = %repo,
                    pr = pr.number,
                    reason = %failure.reason,
                    "Skipping pull request"
                );
                failures.push(failure);
            }
        }
    }
    results
}

fn collection_input(summaries: &[PrAnalysis]) -> String {
    summaries
        .iter()
        .map(|s| format!("#{} {}: {}", s.number, s.title, s.text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Summarizes every PR merged within the window, then turns the summaries into release notes.
pub async fn generate_summaries(
    gateway: &dyn HostingGateway,
    analyzer: &dyn TextAnalyzer,
    cache: &ContentCache,
    repo: &RepoId,
    since: NaiveDate,
    until: NaiveDate,
) -> SummariesResponse {
    let mut failures = Vec::new();
    let prs = gateway
        .list_pull_requests(repo, StateFilter::Closed, since, until)
        .await
        .or_neutral(&format!("list merged pull requests for {repo}"), &mut failures);
    tracing::info!(repo = %repo, merged = prs.len(), "Generating summaries");

    let summaries = analyze_all(
        gateway,
        analyzer,
        cache,
        repo,
        &prs,
        CachePurpose::GenerateSummaries,
        &mut failures,
    )
    .await;

    let release_notes = if summaries.is_empty() {
        None
    } else {
        analyzer
            .summarize_collection(&collection_input(&summaries))
            .await
            .map(Some)
            .or_neutral(&format!("release notes for {repo}"), &mut failures)
    };

    SummariesResponse {
        repository: repo.to_string(),
        since,
        until,
        summaries,
        release_notes,
        failures,
    }
}

/// Reviews every open PR, reusing earlier reviews from the cache.
pub async fn review_open_prs(
    gateway: &dyn HostingGateway,
    analyzer: &dyn TextAnalyzer,
    cache: &ContentCache,
    repo: &RepoId,
) -> ReviewsResponse {
    let mut failures = Vec::new();
    // The open listing ignores the window.
    let prs = gateway
        .list_pull_requests(repo, StateFilter::Open, NaiveDate::MIN, NaiveDate::MAX)
        .await
        .or_neutral(&format!("list open pull requests for {repo}"), &mut failures);
    tracing::info!(repo = %repo, open = prs.len(), "Reviewing open pull requests");

    let reviews = analyze_all(
        gateway,
        analyzer,
        cache,
        repo,
        &prs,
        CachePurpose::CheckOpenPrReview,
        &mut failures,
    )
    .await;

    ReviewsResponse {
        repository: repo.to_string(),
        reviews,
        failures,
    }
}
