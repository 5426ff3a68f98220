//! The hosting API seam.
//!
//! `HostingGateway` is what the metrics engine, the summary flows and the webhook
//! talk to. Failures come back as `GatewayError`; callers that must keep a batch
//! going fold them into neutral values with [`Degrade`].

use crate::config::RepoId;
use crate::error::GatewayError;
use crate::types::{Comment, PullRequest, SecurityAlert, StateFilter, TimelineEvent};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;

#[async_trait]
pub trait HostingGateway: Send + Sync {
    /// Lists pull requests. With `StateFilter::Closed` only PRs merged within
    /// `[since, until]` (inclusive, by date) are returned.
    async fn list_pull_requests(
        &self,
        repo: &RepoId,
        state: StateFilter,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<PullRequest>, GatewayError>;

    async fn fetch_diff(&self, repo: &RepoId, number: u64) -> Result<String, GatewayError>;

    async fn fetch_pr_detail(&self, repo: &RepoId, number: u64)
        -> Result<PullRequest, GatewayError>;

    async fn list_comments(&self, repo: &RepoId, number: u64)
        -> Result<Vec<Comment>, GatewayError>;

    async fn list_review_comments(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<Vec<Comment>, GatewayError>;

    async fn list_timeline_events(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<Vec<TimelineEvent>, GatewayError>;

    async fn list_org_repositories(&self, org: &str) -> Result<Vec<String>, GatewayError>;

    /// A non-success response from the remote is reported as an empty list.
    async fn list_security_alerts(&self, repo: &RepoId)
        -> Result<Vec<SecurityAlert>, GatewayError>;

    async fn post_comment(&self, repo: &RepoId, number: u64, body: &str)
        -> Result<(), GatewayError>;
}

/// Why a value in a response fell back to its neutral default.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FetchFailure {
    pub operation: String,
    pub reason: String,
}

impl FetchFailure {
    pub fn new(operation: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }
}

/// Folds a failed remote call into `T::default()` and records the reason.
pub trait Degrade<T> {
    fn or_neutral(self, operation: &str, failures: &mut Vec<FetchFailure>) -> T;
}

impl<T, E> Degrade<T> for Result<T, E>
where
    T: Default,
    E: std::fmt::Display,
{
    fn or_neutral(self, operation: &str, failures: &mut Vec<FetchFailure>) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(operation, error = %e, "remote call degraded to neutral value");
                failures.push(FetchFailure::new(operation, e));
                T::default()
            }
        }
    }
}
