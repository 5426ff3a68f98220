//! PR metrics engine.
//!
//! Derives one [`PrMetric`] per pull request from its record plus supplementary evidence
//! (comments, review comments, timeline), then folds a set of them into
//! [`AggregateMetrics`] and, across repositories, a [`DashboardSummary`].
//! Everything here is pure; fetching lives in `fetcher.rs`.

use crate::types::{Comment, PrStatus, PullRequest, SecurityAlert, Severity, TimelineEvent};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};

const TOP_REVIEWERS: usize = 5;
const MOST_COMMENTED: usize = 3;

/// Supplementary data fetched per PR. Anything that failed to load is left at its default.
#[derive(Clone, Debug, Default)]
pub struct PrEvidence {
    /// Full record including diff stats and comment counts.
    pub detail: Option<PullRequest>,
    pub comments: Vec<Comment>,
    pub review_comments: Vec<Comment>,
    pub timeline: Vec<TimelineEvent>,
}

/// Derived metrics for a single pull request.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrMetric {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub repository: String,
    pub html_url: String,
    pub status: PrStatus,
    pub lines_changed: u64,
    /// Issue comments plus review comments.
    pub comment_count: u64,
    pub review_comment_count: u64,
    pub reviewers: BTreeSet<String>,
    pub time_to_first_review_hours: Option<f64>,
    /// Creation to merge; `None` for unmerged PRs.
    pub review_duration_hours: Option<f64>,
    pub merged_without_comments: bool,
}

/// Counts of PRs per size bucket, by lines changed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SizeDistribution {
    /// Up to 10 lines.
    pub xs: usize,
    /// Up to 100 lines.
    pub s: usize,
    /// Up to 500 lines.
    pub m: usize,
    /// Up to 1000 lines.
    pub l: usize,
    pub xl: usize,
}

impl SizeDistribution {
    fn record(&mut self, lines: u64) {
        match lines {
            0..=10 => self.xs += 1,
            11..=100 => self.s += 1,
            101..=500 => self.m += 1,
            501..=1000 => self.l += 1,
            _ => self.xl += 1,
        }
    }
}

/// Statistics over a filtered set of PRs. Averages over an empty set are zero;
/// the review duration average is `None` when no PR in the set was merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregateMetrics {
    pub total: usize,
    pub open: usize,
    pub merged: usize,
    pub closed_unmerged: usize,
    pub avg_review_duration_hours: Option<f64>,
    pub avg_pr_size: f64,
    pub avg_comments: f64,
    pub merged_without_comments: usize,
    pub size_distribution: SizeDistribution,
}

/// `(end - start)` in hours, at whole-second resolution.
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

/// Timestamp of the first `reviewed` entry, in the order the timeline was delivered.
pub fn first_review_at(timeline: &[TimelineEvent]) -> Option<DateTime<Utc>> {
    timeline
        .iter()
        .find(|event| event.is_review())
        .and_then(|event| event.occurred_at)
}

/// Rounds for display only; aggregates are always computed on unrounded values.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

fn mean(sum: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Derives the metric row for one PR.
///
/// The detail record wins over the list record when present. When the detail fetch
/// failed, diff stats and comment counts are zero; reviewers still come from whatever
/// comments were fetched.
pub fn derive_metric(repository: &str, pr: &PullRequest, evidence: &PrEvidence) -> PrMetric {
    let record = evidence.detail.as_ref().unwrap_or(pr);

    let (lines_changed, issue_comments, review_comments) = match &evidence.detail {
        Some(detail) => (detail.lines_changed(), detail.comments, detail.review_comments),
        None => (0, 0, 0),
    };

    let reviewers: BTreeSet<String> = evidence
        .comments
        .iter()
        .chain(evidence.review_comments.iter())
        .map(|c| c.author.clone())
        .collect();

    let time_to_first_review_hours = first_review_at(&evidence.timeline)
        .map(|reviewed| hours_between(record.created_at, reviewed));

    let review_duration_hours = record
        .merged_at
        .map(|merged| hours_between(record.created_at, merged));

    PrMetric {
        number: record.number,
        title: record.title.clone(),
        author: record.author.clone(),
        repository: repository.to_string(),
        html_url: record.html_url.clone(),
        status: record.status(),
        lines_changed,
        comment_count: issue_comments + review_comments,
        review_comment_count: review_comments,
        reviewers,
        time_to_first_review_hours,
        review_duration_hours,
        merged_without_comments: record.merged_at.is_some() && review_comments == 0,
    }
}

pub fn aggregate(metrics: &[PrMetric]) -> AggregateMetrics {
    let mut agg = AggregateMetrics {
        total: metrics.len(),
        ..AggregateMetrics::default()
    };

    let mut size_sum = 0u64;
    let mut comment_sum = 0u64;
    let mut durations = Vec::new();

    for metric in metrics {
        match metric.status {
            PrStatus::Open => agg.open += 1,
            PrStatus::Merged => agg.merged += 1,
            PrStatus::ClosedUnmerged => agg.closed_unmerged += 1,
        }
        if metric.merged_without_comments {
            agg.merged_without_comments += 1;
        }
        if let Some(hours) = metric.review_duration_hours {
            durations.push(hours);
        }
        size_sum += metric.lines_changed;
        comment_sum += metric.comment_count;
        agg.size_distribution.record(metric.lines_changed);
    }

    agg.avg_pr_size = mean(size_sum as f64, metrics.len());
    agg.avg_comments = mean(comment_sum as f64, metrics.len());
    agg.avg_review_duration_hours =
        (!durations.is_empty()).then(|| mean(durations.iter().sum(), durations.len()));

    agg
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReviewerCount {
    pub reviewer: String,
    pub prs: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrRef {
    pub repository: String,
    pub number: u64,
    pub comments: u64,
    pub html_url: String,
}

impl From<&PrMetric> for PrRef {
    fn from(metric: &PrMetric) -> Self {
        Self {
            repository: metric.repository.clone(),
            number: metric.number,
            comments: metric.comment_count,
            html_url: metric.html_url.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RepoCount {
    pub repository: String,
    pub prs: usize,
}

/// Cross-repository rollup for the admin view.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_prs: usize,
    pub open_prs: usize,
    pub merged_prs: usize,
    pub total_comments: u64,
    pub top_reviewers: Vec<ReviewerCount>,
    pub most_commented: Vec<PrRef>,
    pub merged_without_review: Vec<PrRef>,
    pub busiest_repository: Option<RepoCount>,
}

pub fn summarize_dashboard(metrics: &[PrMetric]) -> DashboardSummary {
    let mut summary = DashboardSummary {
        total_prs: metrics.len(),
        ..DashboardSummary::default()
    };

    let mut reviewer_prs: HashMap<&str, usize> = HashMap::new();
    let mut repo_prs: BTreeMap<&str, usize> = BTreeMap::new();

    for metric in metrics {
        match metric.status {
            PrStatus::Open => summary.open_prs += 1,
            PrStatus::Merged => summary.merged_prs += 1,
            PrStatus::ClosedUnmerged => {}
        }
        summary.total_comments += metric.comment_count;
        for reviewer in &metric.reviewers {
            *reviewer_prs.entry(reviewer.as_str()).or_default() += 1;
        }
        *repo_prs.entry(metric.repository.as_str()).or_default() += 1;
        if metric.merged_without_comments {
            summary.merged_without_review.push(PrRef::from(metric));
        }
    }

    let mut reviewers: Vec<ReviewerCount> = reviewer_prs
        .into_iter()
        .map(|(reviewer, prs)| ReviewerCount {
            reviewer: reviewer.to_string(),
            prs,
        })
        .collect();
    reviewers.sort_by(|a, b| b.prs.cmp(&a.prs).then_with(|| a.reviewer.cmp(&b.reviewer)));
    reviewers.truncate(TOP_REVIEWERS);
    summary.top_reviewers = reviewers;

    let mut by_comments: Vec<&PrMetric> = metrics.iter().filter(|m| m.comment_count > 0).collect();
    by_comments.sort_by(|a, b| b.comment_count.cmp(&a.comment_count));
    summary.most_commented = by_comments
        .into_iter()
        .take(MOST_COMMENTED)
        .map(PrRef::from)
        .collect();

    // Ties go to the alphabetically first repository.
    summary.busiest_repository = repo_prs
        .into_iter()
        .fold(None::<RepoCount>, |best, (repository, prs)| match best {
            Some(best) if best.prs >= prs => Some(best),
            _ => Some(RepoCount {
                repository: repository.to_string(),
                prs,
            }),
        });

    summary
}

/// Alert counts per severity; every severity is present, possibly with zero.
pub fn alert_severity_counts(alerts: &[SecurityAlert]) -> BTreeMap<Severity, usize> {
    let mut counts: BTreeMap<Severity, usize> =
        Severity::ALL.iter().map(|severity| (*severity, 0)).collect();
    for alert in alerts {
        *counts.entry(alert.severity).or_default() += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PrState;
    use chrono::{Duration, TimeZone};

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn pr(number: u64, state: PrState, merged_after_hours: Option<i64>) -> PullRequest {
        PullRequest {
            number,
            title: format!("PR {number}"),
            author: "dev".into(),
            created_at: created(),
            merged_at: merged_after_hours.map(|h| created() + Duration::hours(h)),
            state,
            additions: 0,
            deletions: 0,
            comments: 0,
            review_comments: 0,
            html_url: format!("https://github.com/acme/widgets/pull/{number}"),
        }
    }

    fn comment(author: &str) -> Comment {
        Comment {
            author: author.into(),
            body: "lgtm".into(),
            created_at: None,
        }
    }

    fn event(kind: &str, after_hours: i64) -> TimelineEvent {
        TimelineEvent {
            kind: kind.into(),
            actor: None,
            occurred_at: Some(created() + Duration::hours(after_hours)),
        }
    }

    fn with_detail(
        pr: &PullRequest,
        lines: u64,
        comments: u64,
        review_comments: u64,
    ) -> PrEvidence {
        PrEvidence {
            detail: Some(PullRequest {
                additions: lines,
                deletions: 0,
                comments,
                review_comments,
                ..pr.clone()
            }),
            ..PrEvidence::default()
        }
    }

    #[test]
    fn test_reviewers_are_distinct_across_comment_kinds() {
        let pr = pr(1, PrState::Open, None);
        let evidence = PrEvidence {
            comments: vec![comment("alice"), comment("bob"), comment("alice")],
            review_comments: vec![comment("bob"), comment("carol")],
            ..PrEvidence::default()
        };

        let metric = derive_metric("acme/widgets", &pr, &evidence);
        let reviewers: Vec<&str> = metric.reviewers.iter().map(String::as_str).collect();
        assert_eq!(reviewers, vec!["alice", "bob", "carol"]);
    }

    #[test]
    fn test_missing_detail_zeroes_stats_and_counts() {
        let mut listed = pr(1, PrState::Closed, Some(2));
        listed.additions = 40;
        listed.deletions = 2;
        listed.comments = 3;
        let evidence = PrEvidence {
            comments: vec![comment("alice")],
            review_comments: vec![comment("bob")],
            ..PrEvidence::default()
        };

        let metric = derive_metric("acme/widgets", &listed, &evidence);
        assert_eq!(metric.lines_changed, 0);
        assert_eq!(metric.comment_count, 0);
        assert_eq!(metric.review_comment_count, 0);
        assert!(metric.merged_without_comments);
        assert_eq!(metric.reviewers.len(), 2);
        assert_eq!(metric.review_duration_hours, Some(2.0));
    }

    #[test]
    fn test_first_review_is_first_match_not_earliest() {
        let pr = pr(1, PrState::Open, None);
        let evidence = PrEvidence {
            timeline: vec![
                event("labeled", 1),
                event("reviewed", 5),
                event("reviewed", 2),
            ],
            ..PrEvidence::default()
        };

        let metric = derive_metric("acme/widgets", &pr, &evidence);
        assert_eq!(metric.time_to_first_review_hours, Some(5.0));
    }

    #[test]
    fn test_no_review_event_yields_none() {
        let pr = pr(1, PrState::Open, None);
        let evidence = PrEvidence {
            timeline: vec![event("commented", 1)],
            ..PrEvidence::default()
        };
        assert_eq!(
            derive_metric("acme/widgets", &pr, &evidence).time_to_first_review_hours,
            None
        );
    }

    #[test]
    fn test_hours_are_fractional() {
        let start = created();
        let end = start + Duration::minutes(90);
        assert_eq!(hours_between(start, end), 1.5);
        assert_eq!(round_to(1.0 / 3.0, 2), 0.33);
        assert_eq!(round_to(2.25, 1), 2.3);
    }

    #[test]
    fn test_merged_without_comments_ignores_issue_comments() {
        let merged = pr(1, PrState::Closed, Some(3));
        let metric = derive_metric("acme/widgets", &merged, &with_detail(&merged, 10, 1, 0));
        assert!(metric.merged_without_comments);
        assert_eq!(metric.comment_count, 1);

        let reviewed = derive_metric("acme/widgets", &merged, &with_detail(&merged, 10, 0, 1));
        assert!(!reviewed.merged_without_comments);

        let open = pr(2, PrState::Open, None);
        let open_metric = derive_metric("acme/widgets", &open, &with_detail(&open, 10, 0, 0));
        assert!(!open_metric.merged_without_comments);
    }

    #[test]
    fn test_aggregate_example_set() {
        let a = pr(1, PrState::Closed, Some(2));
        let b = pr(2, PrState::Closed, Some(4));
        let c = pr(3, PrState::Closed, Some(6));
        let metrics = vec![
            derive_metric("acme/widgets", &a, &with_detail(&a, 100, 1, 1)),
            derive_metric("acme/widgets", &b, &with_detail(&b, 50, 0, 0)),
            derive_metric("acme/widgets", &c, &with_detail(&c, 0, 0, 1)),
        ];

        let agg = aggregate(&metrics);
        assert_eq!(agg.total, 3);
        assert_eq!(agg.merged, 3);
        assert_eq!(agg.avg_pr_size, 50.0);
        assert_eq!(agg.avg_comments, 1.0);
        assert_eq!(agg.merged_without_comments, 1);
        assert_eq!(agg.avg_review_duration_hours, Some(4.0));
    }

    #[test]
    fn test_buckets_partition_the_set() {
        let prs = vec![
            pr(1, PrState::Open, None),
            pr(2, PrState::Open, None),
            pr(3, PrState::Closed, Some(1)),
            pr(4, PrState::Closed, None),
            pr(5, PrState::Closed, None),
        ];
        let metrics: Vec<PrMetric> = prs
            .iter()
            .map(|pr| derive_metric("acme/widgets", pr, &PrEvidence::default()))
            .collect();

        let agg = aggregate(&metrics);
        assert_eq!(agg.open, 2);
        assert_eq!(agg.merged, 1);
        assert_eq!(agg.closed_unmerged, 2);
        assert_eq!(agg.open + agg.merged + agg.closed_unmerged, agg.total);
    }

    #[test]
    fn test_unmerged_prs_do_not_dilute_review_duration() {
        let merged = pr(1, PrState::Closed, Some(10));
        let open = pr(2, PrState::Open, None);
        let metrics = vec![
            derive_metric("acme/widgets", &merged, &PrEvidence::default()),
            derive_metric("acme/widgets", &open, &PrEvidence::default()),
        ];

        assert_eq!(aggregate(&metrics).avg_review_duration_hours, Some(10.0));
    }

    #[test]
    fn test_aggregate_empty_set() {
        let agg = aggregate(&[]);
        assert_eq!(agg.total, 0);
        assert_eq!(agg.avg_pr_size, 0.0);
        assert_eq!(agg.avg_comments, 0.0);
        assert_eq!(agg.avg_review_duration_hours, None);
    }

    #[test]
    fn test_size_distribution_buckets() {
        let base = pr(1, PrState::Open, None);
        let metrics: Vec<PrMetric> = [0, 10, 11, 100, 500, 1000, 1001]
            .iter()
            .map(|lines| derive_metric("acme/widgets", &base, &with_detail(&base, *lines, 0, 0)))
            .collect();

        assert_eq!(
            aggregate(&metrics).size_distribution,
            SizeDistribution {
                xs: 2,
                s: 2,
                m: 1,
                l: 1,
                xl: 1
            }
        );
    }

    #[test]
    fn test_dashboard_rollup() {
        let merged = pr(1, PrState::Closed, Some(1));
        let open = pr(2, PrState::Open, None);
        let other = pr(7, PrState::Open, None);

        let metrics = vec![
            derive_metric(
                "acme/widgets",
                &merged,
                &PrEvidence {
                    comments: vec![comment("alice")],
                    ..with_detail(&merged, 5, 1, 0)
                },
            ),
            derive_metric(
                "acme/widgets",
                &open,
                &PrEvidence {
                    comments: vec![comment("alice"), comment("bob")],
                    ..with_detail(&open, 5, 4, 2)
                },
            ),
            derive_metric("acme/gadgets", &other, &PrEvidence::default()),
        ];

        let summary = summarize_dashboard(&metrics);
        assert_eq!(summary.total_prs, 3);
        assert_eq!(summary.open_prs, 2);
        assert_eq!(summary.merged_prs, 1);
        assert_eq!(summary.total_comments, 7);
        assert_eq!(
            summary.top_reviewers[0],
            ReviewerCount {
                reviewer: "alice".into(),
                prs: 2
            }
        );
        assert_eq!(summary.most_commented[0].number, 2);
        assert_eq!(summary.most_commented.len(), 2);
        assert_eq!(summary.merged_without_review.len(), 1);
        assert_eq!(summary.merged_without_review[0].number, 1);
        assert_eq!(
            summary.busiest_repository,
            Some(RepoCount {
                repository: "acme/widgets".into(),
                prs: 2
            })
        );
    }

    #[test]
    fn test_alert_severity_counts() {
        let alert = |severity| SecurityAlert {
            number: 1,
            rule_description: String::new(),
            severity,
            tool: "CodeQL".into(),
            path: String::new(),
            line: None,
            created_at: None,
            git_ref: String::new(),
            html_url: String::new(),
        };

        let counts = alert_severity_counts(&[
            alert(Severity::High),
            alert(Severity::High),
            alert(Severity::Unknown),
        ]);
        assert_eq!(counts[&Severity::High], 2);
        assert_eq!(counts[&Severity::Unknown], 1);
        assert_eq!(counts[&Severity::Critical], 0);
        assert_eq!(counts.len(), 6);
    }
}
