//! Pull request webhook: verifies the delivery, reviews the diff, comments on the PR.
//!
//! Deliveries are handled inline, one event at a time. Nothing is queued or retried; a
//! failed review or comment post is logged and reported to the sender.

use crate::config::RepoId;
use crate::gateway::HostingGateway;
use crate::AppState;
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";
const SIGNATURE_PREFIX: &str = "sha256=";

/// Actions that trigger a review.
const REVIEWED_ACTIONS: [&str; 2] = ["opened", "synchronize"];

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct WebhookStatus {
    pub status: &'static str,
}

impl WebhookStatus {
    const IGNORED: Self = Self { status: "ignored" };
    const SUCCESS: Self = Self { status: "success" };
}

type WebhookRejection = (StatusCode, Json<serde_json::Value>);

fn reject(status: StatusCode, detail: &str) -> WebhookRejection {
    (status, Json(serde_json::json!({ "detail": detail })))
}

#[derive(Debug, Deserialize)]
struct EventUser {
    login: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventPullRequest {
    number: u64,
    title: Option<String>,
    user: Option<EventUser>,
}

#[derive(Debug, Deserialize)]
struct EventRepository {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PullRequestEvent {
    action: Option<String>,
    pull_request: Option<EventPullRequest>,
    repository: Option<EventRepository>,
}

/// Checks a `sha256=<hex>` header against the HMAC-SHA256 of `body` in constant time.
pub fn verify_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    let Some(hex_digest) = header.strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_digest) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

fn review_comment(number: u64, title: &str, author: &str, review: &str) -> String {
    format!(
        "🤖 **AI Code Review Suggestions for #{number} - {title}**\n\n\
         👤 Author: `{author}`\n\n---\n\n{review}"
    )
}

pub async fn handle_pr_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookStatus>, WebhookRejection> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !verify_signature(state.config.github_webhook_secret.as_bytes(), &body, signature) {
        tracing::warn!("Rejected webhook delivery with invalid signature");
        return Err(reject(StatusCode::UNAUTHORIZED, "Invalid signature"));
    }

    let event: PullRequestEvent = serde_json::from_slice(&body).map_err(|e| {
        tracing::warn!(error = %e, "Webhook payload is not valid JSON");
        reject(StatusCode::BAD_REQUEST, "Invalid payload")
    })?;

    let action = event.action.as_deref().unwrap_or("");
    if !REVIEWED_ACTIONS.contains(&action) {
        tracing::debug!(action, "Ignoring pull request action");
        return Ok(Json(WebhookStatus::IGNORED));
    }

    let (Some(pr), Some(repository)) = (event.pull_request, event.repository) else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            "Missing pull_request or repository",
        ));
    };
    let repo: RepoId = repository
        .full_name
        .parse()
        .map_err(|e: String| reject(StatusCode::BAD_REQUEST, &e))?;

    review_and_comment(state.as_ref(), &repo, pr).await
}

async fn review_and_comment(
    state: &AppState,
    repo: &RepoId,
    pr: EventPullRequest,
) -> Result<Json<WebhookStatus>, WebhookRejection> {
    let gateway: &dyn HostingGateway = state.gateway.as_ref();
    let title = pr.title.unwrap_or_default();
    let author = pr
        .user
        .and_then(|u| u.login)
        .unwrap_or_else(|| "unknown".to_string());

    tracing::info!(repo = %repo, pr = pr.number, "Reviewing pull request from webhook");

    let diff = gateway
        .fetch_diff(repo, pr.number)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(repo = %repo, pr = pr.number, error = %e, "diff-unavailable");
            String::new()
        });
    if diff.trim().is_empty() {
        tracing::warn!(repo = %repo, pr = pr.number, "No diff available; skipping review");
        return Ok(Json(WebhookStatus::IGNORED));
    }

    let review = state.analyzer.review_diff(&diff).await.map_err(|e| {
        tracing::error!(repo = %repo, pr = pr.number, error = %e, "AI review failed");
        reject(StatusCode::BAD_GATEWAY, "Review generation failed")
    })?;

    let body = review_comment(pr.number, &title, &author, &review);
    gateway
        .post_comment(repo, pr.number, &body)
        .await
        .map_err(|e| {
            tracing::error!(
                repo = %repo,
                pr = pr.number,
                error = %e,
                "Posting review comment failed"
            );
            reject(StatusCode::BAD_GATEWAY, "Posting review comment failed")
        })?;

    Ok(Json(WebhookStatus::SUCCESS))
}
