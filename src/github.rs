//! GitHub implementation of the hosting gateway, built on `octocrab`.
//!
//! Responses are decoded into the loosely-shaped `Raw*` records below and converted into
//! the domain types from `types.rs` right here, so nothing downstream ever sees a missing
//! key. Every call is bounded by the configured request timeout.

use crate::config::RepoId;
use crate::error::GatewayError;
use crate::gateway::HostingGateway;
use crate::types::{
    Comment, PrState, PullRequest, SecurityAlert, Severity, StateFilter, TimelineEvent,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use octocrab::Octocrab;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

const PER_PAGE: u8 = 100;
const UNKNOWN_LOGIN: &str = "unknown";

#[derive(Clone)]
pub struct GitHubGateway {
    octocrab: Octocrab,
    timeout: Duration,
}

impl GitHubGateway {
    pub fn new(base_url: &str, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let mut builder = Octocrab::builder().base_uri(base_url)?;
        if let Some(token) = token {
            builder = builder.personal_token(token);
        }

        Ok(Self {
            octocrab: builder.build()?,
            timeout,
        })
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, GatewayError>
    where
        F: Future<Output = octocrab::Result<T>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::Timeout(self.timeout)),
        }
    }

    async fn get_json<R, P>(&self, route: String, params: Option<&P>) -> Result<R, GatewayError>
    where
        R: serde::de::DeserializeOwned + Send,
        P: Serialize + ?Sized + Sync,
    {
        tracing::debug!(%route, "GET");
        self.bounded(self.octocrab.get::<R, _, _>(route, params)).await
    }

    async fn list_comments_at(&self, route: String) -> Result<Vec<Comment>, GatewayError> {
        let raw: Vec<RawComment> = self.get_json(route, Some(&PageParams::default())).await?;
        Ok(raw.into_iter().map(RawComment::into_domain).collect())
    }
}

#[derive(Serialize)]
struct PageParams {
    per_page: u8,
}

impl Default for PageParams {
    fn default() -> Self {
        Self { per_page: PER_PAGE }
    }
}

#[derive(Serialize)]
struct ListPullsParams {
    state: &'static str,
    sort: &'static str,
    direction: &'static str,
    per_page: u8,
}

#[derive(Deserialize, Default)]
struct RawUser {
    login: Option<String>,
}

fn login_of(user: Option<RawUser>) -> String {
    user.and_then(|u| u.login)
        .unwrap_or_else(|| UNKNOWN_LOGIN.to_string())
}

#[derive(Deserialize)]
struct RawPull {
    number: u64,
    title: Option<String>,
    user: Option<RawUser>,
    created_at: Option<DateTime<Utc>>,
    merged_at: Option<DateTime<Utc>>,
    state: Option<String>,
    additions: Option<u64>,
    deletions: Option<u64>,
    comments: Option<u64>,
    review_comments: Option<u64>,
    html_url: Option<String>,
}

impl RawPull {
    fn into_domain(self) -> Result<PullRequest, GatewayError> {
        let created_at = self
            .created_at
            .ok_or_else(|| GatewayError::Decode(format!("PR #{} has no created_at", self.number)))?;

        if self.merged_at.is_some_and(|merged| merged < created_at) {
            return Err(GatewayError::Decode(format!(
                "PR #{} merged before it was created",
                self.number
            )));
        }

        let state = match self.state.as_deref() {
            Some("open") => PrState::Open,
            Some(_) => PrState::Closed,
            None if self.merged_at.is_some() => PrState::Closed,
            None => PrState::Open,
        };

        Ok(PullRequest {
            number: self.number,
            title: self.title.unwrap_or_default(),
            author: login_of(self.user),
            created_at,
            merged_at: self.merged_at,
            state,
            additions: self.additions.unwrap_or(0),
            deletions: self.deletions.unwrap_or(0),
            comments: self.comments.unwrap_or(0),
            review_comments: self.review_comments.unwrap_or(0),
            html_url: self.html_url.unwrap_or_default(),
        })
    }
}

#[derive(Deserialize)]
struct RawComment {
    user: Option<RawUser>,
    body: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl RawComment {
    fn into_domain(self) -> Comment {
        Comment {
            author: login_of(self.user),
            body: self.body.unwrap_or_default(),
            created_at: self.created_at,
        }
    }
}

#[derive(Deserialize)]
struct RawTimelineEvent {
    event: Option<String>,
    actor: Option<RawUser>,
    // Review entries carry `user` and `submitted_at` instead of `actor` and `created_at`.
    user: Option<RawUser>,
    submitted_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
}

impl RawTimelineEvent {
    fn into_domain(self) -> TimelineEvent {
        TimelineEvent {
            kind: self.event.unwrap_or_default(),
            actor: self.actor.or(self.user).and_then(|u| u.login),
            occurred_at: self.submitted_at.or(self.created_at),
        }
    }
}

#[derive(Deserialize)]
struct RawRepository {
    name: String,
    full_name: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawRule {
    description: Option<String>,
    severity: Option<String>,
    security_severity_level: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawTool {
    name: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawLocation {
    path: Option<String>,
    start_line: Option<u64>,
}

#[derive(Deserialize, Default)]
struct RawInstance {
    #[serde(rename = "ref")]
    git_ref: Option<String>,
    location: Option<RawLocation>,
}

#[derive(Deserialize)]
struct RawAlert {
    number: u64,
    created_at: Option<DateTime<Utc>>,
    html_url: Option<String>,
    rule: Option<RawRule>,
    tool: Option<RawTool>,
    most_recent_instance: Option<RawInstance>,
}

impl RawAlert {
    fn into_domain(self) -> SecurityAlert {
        let rule = self.rule.unwrap_or_default();
        let instance = self.most_recent_instance.unwrap_or_default();
        let location = instance.location.unwrap_or_default();
        let severity = rule
            .security_severity_level
            .or(rule.severity)
            .map(|raw| Severity::parse(&raw))
            .unwrap_or(Severity::Unknown);

        SecurityAlert {
            number: self.number,
            rule_description: rule.description.unwrap_or_default(),
            severity,
            tool: self.tool.and_then(|t| t.name).unwrap_or_default(),
            path: location.path.unwrap_or_default(),
            line: location.start_line,
            created_at: self.created_at,
            git_ref: instance.git_ref.unwrap_or_default(),
            html_url: self.html_url.unwrap_or_default(),
        }
    }
}

/// Keeps only PRs merged within `[since, until]`, compared by calendar date.
pub fn merged_within(
    prs: Vec<PullRequest>,
    since: NaiveDate,
    until: NaiveDate,
) -> Vec<PullRequest> {
    prs.into_iter()
        .filter(|pr| {
            pr.merged_at.is_some_and(|merged| {
                let day = merged.date_naive();
                since <= day && day <= until
            })
        })
        .collect()
}

#[async_trait]
impl HostingGateway for GitHubGateway {
    async fn list_pull_requests(
        &self,
        repo: &RepoId,
        state: StateFilter,
        since: NaiveDate,
        until: NaiveDate,
    ) -> Result<Vec<PullRequest>, GatewayError> {
        // Closed PRs are ordered by last update so recently merged ones land on the first page.
        let sort = match state {
            StateFilter::Closed => "updated",
            _ => "created",
        };
        let params = ListPullsParams {
            state: state.as_str(),
            sort,
            direction: "desc",
            per_page: PER_PAGE,
        };

        let raw: Vec<RawPull> = self
            .get_json(format!("/repos/{repo}/pulls"), Some(&params))
            .await?;

        let prs: Vec<PullRequest> = raw
            .into_iter()
            .filter_map(|pr| match pr.into_domain() {
                Ok(pr) => Some(pr),
                Err(e) => {
                    tracing::warn!(repo = %repo, error = %e, "Skipping malformed pull request");
                    None
                }
            })
            .collect();

        let prs = match state {
            StateFilter::Closed => merged_within(prs, since, until),
            _ => prs,
        };

        tracing::debug!(
            repo = %repo,
            state = state.as_str(),
            count = prs.len(),
            "Listed pull requests"
        );
        Ok(prs)
    }

    async fn fetch_diff(&self, repo: &RepoId, number: u64) -> Result<String, GatewayError> {
        self.bounded(
            self.octocrab
                .pulls(&repo.owner, &repo.repo)
                .get_diff(number),
        )
        .await
    }

    async fn fetch_pr_detail(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<PullRequest, GatewayError> {
        let raw: RawPull = self
            .get_json(format!("/repos/{repo}/pulls/{number}"), None::<&()>)
            .await?;
        raw.into_domain()
    }

    async fn list_comments(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<Vec<Comment>, GatewayError> {
        self.list_comments_at(format!("/repos/{repo}/issues/{number}/comments"))
            .await
    }

    async fn list_review_comments(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<Vec<Comment>, GatewayError> {
        self.list_comments_at(format!("/repos/{repo}/pulls/{number}/comments"))
            .await
    }

    async fn list_timeline_events(
        &self,
        repo: &RepoId,
        number: u64,
    ) -> Result<Vec<TimelineEvent>, GatewayError> {
        let raw: Vec<RawTimelineEvent> = self
            .get_json(
                format!("/repos/{repo}/issues/{number}/timeline"),
                Some(&PageParams::default()),
            )
            .await?;
        Ok(raw.into_iter().map(RawTimelineEvent::into_domain).collect())
    }

    async fn list_org_repositories(&self, org: &str) -> Result<Vec<String>, GatewayError> {
        let org = org.trim();
        let raw: Vec<RawRepository> = self
            .get_json(format!("/orgs/{org}/repos"), Some(&PageParams::default()))
            .await?;
        Ok(raw
            .into_iter()
            .map(|r| r.full_name.unwrap_or_else(|| format!("{org}/{}", r.name)))
            .collect())
    }

    async fn list_security_alerts(
        &self,
        repo: &RepoId,
    ) -> Result<Vec<SecurityAlert>, GatewayError> {
        let result: Result<Vec<RawAlert>, GatewayError> = self
            .get_json(
                format!("/repos/{repo}/code-scanning/alerts"),
                Some(&PageParams::default()),
            )
            .await;

        match result {
            Ok(raw) => Ok(raw.into_iter().map(RawAlert::into_domain).collect()),
            Err(GatewayError::Transport(octocrab::Error::GitHub { source, .. })) => {
                tracing::warn!(
                    repo = %repo,
                    message = %source.message,
                    "Code scanning alerts unavailable; reporting none"
                );
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn post_comment(
        &self,
        repo: &RepoId,
        number: u64,
        body: &str,
    ) -> Result<(), GatewayError> {
        let route = format!("/repos/{repo}/issues/{number}/comments");
        let payload = serde_json::json!({ "body": body });
        let _: serde_json::Value = self
            .bounded(self.octocrab.post(route, Some(&payload)))
            .await?;
        tracing::info!(repo = %repo, pr = number, "Posted comment");
        Ok(())
    }
}
