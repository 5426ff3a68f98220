//! AI analysis gateway.
//!
//! Three stateless text transforms over an OpenAI-compatible chat completion endpoint:
//! - [`TextAnalyzer::summarize_diff`]: short technical summary of one diff
//! - [`TextAnalyzer::summarize_collection`]: release notes from many summaries
//! - [`TextAnalyzer::review_diff`]: code-quality critique of one diff
//!
//! Inputs are cut to a character budget before they are sent. Each call is a single
//! request/response without retries; callers decide what a failure means for their batch.

use crate::error::AnalysisError;
use async_trait::async_trait;
use reqwest::header;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Character budget for a single diff summary.
pub const DIFF_SUMMARY_BUDGET: usize = 10_000;
/// Character budget for the concatenated summaries fed into release notes.
pub const COLLECTION_BUDGET: usize = 40_000;

const SUMMARY_INSTRUCTIONS: &str = "You're a senior engineer summarizing GitHub pull requests \
for a functional team. Write a concise 2-3 sentence technical summary of the change.";

const COLLECTION_INSTRUCTIONS: &str = "You're an engineering lead writing release notes for \
management. Synthesize the pull request summaries below into short bullet points grouped by theme.";

const REVIEW_INSTRUCTIONS: &str = "You are a lead software engineer. Review the following GitHub \
PR diff. Identify code quality issues (style, structure, edge cases, security), give specific \
improvement suggestions with example fixes where possible, and keep it concise.";

#[async_trait]
pub trait TextAnalyzer: Send + Sync {
    async fn summarize_diff(&self, diff: &str) -> Result<String, AnalysisError>;

    async fn summarize_collection(&self, summaries: &str) -> Result<String, AnalysisError>;

    async fn review_diff(&self, diff: &str) -> Result<String, AnalysisError>;
}

/// Returns at most `budget` characters of `text`, never splitting a UTF-8 sequence.
pub fn truncate_chars(text: &str, budget: usize) -> &str {
    match text.char_indices().nth(budget) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[derive(Debug)]
pub struct OpenAiAnalyzer {
    client: reqwest::Client,
    url_chat: String,
    model: String,
}

impl OpenAiAnalyzer {
    pub fn new(
        endpoint: &str,
        api_key: &str,
        model: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            header::HeaderValue::from_str(&format!("Bearer {api_key}"))?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()?;

        let url_chat = format!("{}/v1/chat/completions", endpoint.trim_end_matches('/'));
        tracing::info!(model, url = %url_chat, "Completion client initialized");

        Ok(Self {
            client,
            url_chat,
            model: model.to_string(),
        })
    }

    async fn complete(&self, instructions: &str, input: &str) -> Result<String, AnalysisError> {
        let started = Instant::now();
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: instructions,
                },
                ChatMessage {
                    role: "user",
                    content: input,
                },
            ],
        };

        let resp = self.client.post(&self.url_chat).json(&body).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            let snippet = truncate_chars(text.trim(), 200).to_string();
            tracing::error!(%status, %snippet, model = %self.model, "Completion request rejected");
            return Err(AnalysisError::Status { status, snippet });
        }

        let out: ChatCompletionResponse = resp.json().await?;
        let content = out
            .choices
            .into_iter()
            .find_map(|c| c.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or(AnalysisError::EmptyOutput)?;

        tracing::info!(
            model = %self.model,
            input_chars = input.chars().count(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Completion finished"
        );
        Ok(content)
    }
}

#[async_trait]
impl TextAnalyzer for OpenAiAnalyzer {
    async fn summarize_diff(&self, diff: &str) -> Result<String, AnalysisError> {
        let input = format!(
            "Summarize this GitHub PR diff:\n{}",
            truncate_chars(diff, DIFF_SUMMARY_BUDGET)
        );
        self.complete(SUMMARY_INSTRUCTIONS, &input).await
    }

    async fn summarize_collection(&self, summaries: &str) -> Result<String, AnalysisError> {
        let input = format!(
            "Pull request summaries:\n{}",
            truncate_chars(summaries, COLLECTION_BUDGET)
        );
        self.complete(COLLECTION_INSTRUCTIONS, &input).await
    }

    async fn review_diff(&self, diff: &str) -> Result<String, AnalysisError> {
        let input = format!("PR diff:\n{diff}");
        self.complete(REVIEW_INSTRUCTIONS, &input).await
    }
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageOut,
}

#[derive(Debug, Deserialize)]
struct ChatMessageOut {
    content: Option<String>,
}
