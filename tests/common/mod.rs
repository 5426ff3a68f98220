//! In-memory stand-ins for the hosting API and the completion service.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use pr_insights::ai::TextAnalyzer;
use pr_insights::config::{AppConfig, RepoId};
use pr_insights::error::{AnalysisError, GatewayError};
use pr_insights::gateway::HostingGateway;
use pr_insights::github::merged_within;
use pr_insights::types::{
    Comment, PrState, PullRequest, SecurityAlert, StateFilter, TimelineEvent,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const WEBHOOK_SECRET: &str = "test-secret";

pub fn test_config(cache_database: &std::path::Path) -> AppConfig {
    AppConfig {
        github_api_url: "http://127.0.0.1:9".to_string(),
        github_token: "ghp_test".to_string(),
        openai_api_key: "sk-test".to_string(),
        openai_api_url: "http://127.0.0.1:9".to_string(),
        openai_model: "gpt-4o".to_string(),
        github_webhook_secret: WEBHOOK_SECRET.to_string(),
        github_org: None,
        cache_database: cache_database.to_string_lossy().into_owned(),
        request_timeout_seconds: 5,
        metrics_cache_ttl_seconds: 60,
        metrics_cache_max_capacity: 100,
        port: 0,
    }
}

pub fn repo() -> RepoId {
    "acme/widgets".parse().unwrap()
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
}

pub fn pull(
    number: u64,
    created_at: DateTime<Utc>,
    merged_after_hours: Option<i64>,
) -> PullRequest {
    let merged_at = merged_after_hours.map(|h| created_at + Duration::hours(h));
    PullRequest {
        number,
        title: format!("Change {number}"),
        author: "dev".to_string(),
        created_at,
        merged_at,
        state: if merged_at.is_some() {
            PrState::Closed
        } else {
            PrState::Open
        },
        additions: 0,
        deletions: 0,
        comments: 0,
        review_comments: 0,
        html_url: format!("https://github.com/acme/widgets/pull/{number}"),
    }
}

pub fn comment(author: &str) -> Comment {
    Comment {
        author: author.to_string(),
        body: "nit".to_string(),
        created_at: None,
    }
}

pub fn reviewed(at: DateTime<Utc>) -> TimelineEvent {
    TimelineEvent {
        kind: "reviewed".to_string(),
        actor: Some("reviewer".to_string()),
        occurred_at: Some(at),
    }
}

fn unavailable() -> GatewayError {
    GatewayError::Timeout(std::time::Duration::from_secs(5))
}

#[derive(Default)]
pub struct MockGateway {
    /// List records; the detail endpoint serves `details` first and falls back to these.
    pub pulls: Vec<PullRequest>,
    pub details: HashMap<u64, PullRequest>,
    pub diffs: HashMap<u64, String>,
    pub comments: HashMap<u64, Vec<Comment>>,
    pub review_comments: HashMap<u64, Vec<Comment>>,
    pub timelines: HashMap<u64, Vec<TimelineEvent>>,
    pub failing_details: HashSet<u64>,
    pub failing_listing: bool,
    pub alerts: Vec<SecurityAlert>,
    pub org_repos: Vec<String>,
    pub posted: Mutex<Vec<(String, u64, String)>>,
    pub diff_calls: AtomicUsize,
}

impl MockGateway {
    pub fn posted_count(&self) -> usize {
        self.posted.lock().unwrap().len()
    }

    pub fn diff_call_count(&self) -> usize {
        self.diff_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostingGateway for MockGateway {
    async fn list_pull_requests(
        &self,
        _repo: &RepoId,
        state: StateFilter,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        if self.failing_listing {
            return Err(unavailable());
        }
        let pulls = self.pulls.clone();
        Ok(match state {
            StateFilter::Closed => merged_within(pulls, since, until),
            StateFilter::Open => pulls
                .into_iter()
                .filter(|pr| pr.state == PrState::Open)
                .collect(),
            StateFilter::All => pulls,
        })
    }

    async fn fetch_diff(&self, _repo: &RepoId, number: u64) -> Result<String, GatewayError> {
        self.diff_calls.fetch_add(1, Ordering::SeqCst);
        self.diffs.get(&number).cloned().ok_or_else(unavailable)
    }

    async fn fetch_pr_detail(
        &self,
        _repo: &RepoId,
        number: u64,
    ) -> Result<PullRequest, GatewayError> {
        if self.failing_details.contains(&number) {
            return Err(unavailable());
        }
        self.details
            .get(&number)
            .or_else(|| self.pulls.iter().find(|pr| pr.number == number))
            .cloned()
            .ok_or_else(|| GatewayError::Decode(format!("no PR #{number}")))
    }

    async fn list_comments(
        &self,
        _repo: &RepoId,
        number: u64,
    ) -> Result<Vec<Comment>, GatewayError> {
        Ok(self.comments.get(&number).cloned().unwrap_or_default())
    }

    async fn list_review_comments(
        &self,
        _repo: &RepoId,
        number: u64,
    ) -> Result<Vec<Comment>, GatewayError> {
        Ok(self.review_comments.get(&number).cloned().unwrap_or_default())
    }

    async fn list_timeline_events(
        &self,
        _repo: &RepoId,
        number: u64,
    ) -> Result<Vec<TimelineEvent>, GatewayError> {
        Ok(self.timelines.get(&number).cloned().unwrap_or_default())
    }

    async fn list_org_repositories(&self, _org: &str) -> Result<Vec<String>, GatewayError> {
        Ok(self.org_repos.clone())
    }

    async fn list_security_alerts(
        &self,
        _repo: &RepoId,
    ) -> Result<Vec<SecurityAlert>, GatewayError> {
        Ok(self.alerts.clone())
    }

    async fn post_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), GatewayError> {
        self.posted
            .lock()
            .unwrap()
            .push((repo.to_string(), number, body.to_string()));
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAnalyzer {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl MockAnalyzer {
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn respond(&self, kind: &str, input: &str) -> Result<String, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(AnalysisError::EmptyOutput);
        }
        Ok(format!("{kind} of {} chars", input.chars().count()))
    }
}

#[async_trait]
impl TextAnalyzer for MockAnalyzer {
    async fn summarize_diff(&self, diff: &str) -> Result<String, AnalysisError> {
        self.respond("summary", diff)
    }

    async fn summarize_collection(&self, summaries: &str) -> Result<String, AnalysisError> {
        self.respond("release notes", summaries)
    }

    async fn review_diff(&self, diff: &str) -> Result<String, AnalysisError> {
        self.respond("review", diff)
    }
}
