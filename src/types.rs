//! Domain records produced by the hosting gateway.
//!
//! Raw API payloads never leave `github.rs`; everything downstream works on these
//! explicit records whose optional fields carry documented defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Listing filter accepted by the pulls endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StateFilter {
    Open,
    #[default]
    Closed,
    All,
}

impl StateFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateFilter::Open => "open",
            StateFilter::Closed => "closed",
            StateFilter::All => "all",
        }
    }
}

/// Raw state reported by the hosting API.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
}

/// Mutually exclusive bucket a pull request falls into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrStatus {
    Open,
    Merged,
    ClosedUnmerged,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    /// Never earlier than `created_at`.
    pub merged_at: Option<DateTime<Utc>>,
    pub state: PrState,
    /// Zero when the listing endpoint omits diff stats.
    pub additions: u64,
    pub deletions: u64,
    pub comments: u64,
    pub review_comments: u64,
    pub html_url: String,
}

impl PullRequest {
    /// A merge timestamp wins over the raw state, so a PR is in exactly one bucket.
    pub fn status(&self) -> PrStatus {
        if self.merged_at.is_some() {
            PrStatus::Merged
        } else {
            match self.state {
                PrState::Open => PrStatus::Open,
                PrState::Closed => PrStatus::ClosedUnmerged,
            }
        }
    }

    pub fn lines_changed(&self) -> u64 {
        self.additions + self.deletions
    }
}

/// An issue or review comment.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub body: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// One entry of a pull request's timeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Event kind as reported upstream, e.g. `reviewed`, `labeled`, `commented`.
    pub kind: String,
    pub actor: Option<String>,
    /// `submitted_at` for reviews, `created_at` for everything else.
    pub occurred_at: Option<DateTime<Utc>>,
}

impl TimelineEvent {
    pub fn is_review(&self) -> bool {
        self.kind == "reviewed"
    }
}

/// Normalized severity of a code scanning alert.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Error,
    High,
    Medium,
    Low,
    Unknown,
}

impl Severity {
    pub const ALL: [Severity; 6] = [
        Severity::Critical,
        Severity::Error,
        Severity::High,
        Severity::Medium,
        Severity::Low,
        Severity::Unknown,
    ];

    /// Case-insensitive; anything unrecognized maps to `Unknown`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "critical" => Severity::Critical,
            "error" => Severity::Error,
            "high" => Severity::High,
            "medium" => Severity::Medium,
            "low" => Severity::Low,
            _ => Severity::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Error => "error",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A static-analysis finding on a repository.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub number: u64,
    pub rule_description: String,
    pub severity: Severity,
    pub tool: String,
    pub path: String,
    pub line: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub git_ref: String,
    pub html_url: String,
}
