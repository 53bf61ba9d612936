use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::{ContentGenerator, GeneratedArticle, GenerationError, PromptAnalysis};

/// Client for the content-generation service's JSON API.
pub struct HttpContentGenerator {
    pub client: Client,
    pub base_url: String,
    pub api_token: Option<String>,
}

impl HttpContentGenerator {
    pub fn new(client: Client, base_url: String, api_token: Option<String>) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_token,
        }
    }

    fn request(&self, path: &str, body: serde_json::Value) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .json(&body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token);
        }
        req
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(
    res: reqwest::Response,
) -> Result<T, GenerationError> {
    let status = res.status();
    if !status.is_success() {
        let message = res.text().await.unwrap_or_default();
        return Err(GenerationError::Service {
            status: status.as_u16(),
            message,
        });
    }
    res.json::<T>()
        .await
        .map_err(|err| GenerationError::InvalidResponse(err.to_string()))
}

#[async_trait]
impl ContentGenerator for HttpContentGenerator {
    async fn analyze_prompt(&self, prompt: &str) -> Result<PromptAnalysis, GenerationError> {
        let res = self
            .request("/analyze", json!({ "prompt": prompt }))
            .send()
            .await?;
        read_json(res).await
    }

    async fn generate_article(
        &self,
        prompt: &str,
        analysis: &PromptAnalysis,
    ) -> Result<GeneratedArticle, GenerationError> {
        let res = self
            .request("/generate", json!({ "prompt": prompt, "analysis": analysis }))
            .send()
            .await?;
        read_json(res).await
    }
}
