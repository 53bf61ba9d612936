use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

mod http_impl;

pub use http_impl::HttpContentGenerator;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("generation service returned an unreadable response: {0}")]
    InvalidResponse(String),
}

/// What the generation service thinks of a prompt before any content is
/// produced. `is_valid == false` carries the rejection reason.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptAnalysis {
    pub is_valid: bool,
    #[serde(default)]
    pub topic: String,
    #[serde(default)]
    pub domain: String,
    #[serde(default)]
    pub audience: String,
    #[serde(default)]
    pub purpose: String,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedArticle {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub excerpt: Option<String>,
}

/// Prompt-to-article generation. Both calls may be slow or fail outright;
/// callers are expected to wrap them in their own timeout and treat either
/// outcome as a retryable attempt failure.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn analyze_prompt(&self, prompt: &str) -> Result<PromptAnalysis, GenerationError>;

    async fn generate_article(
        &self,
        prompt: &str,
        analysis: &PromptAnalysis,
    ) -> Result<GeneratedArticle, GenerationError>;
}
