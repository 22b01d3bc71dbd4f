//! Ollama-backed advisory oracle.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::platform::Platform;

use super::{AdviceRequest, AdvisoryOracle};

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
    #[serde(default)]
    done: bool,
}

/// Queries a local Ollama server for a platform suggestion.
pub struct OllamaOracle {
    endpoint: String,
    model: String,
    http_client: Client,
}

impl OllamaOracle {
    /// Creates an oracle for `model` served at `endpoint`.
    pub fn new(endpoint: &str, model: &str, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Advisor(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            model: model.to_string(),
            http_client,
        })
    }

    /// Builds the prompt for a request.
    fn build_prompt(request: &AdviceRequest) -> String {
        let options = Platform::ALL
            .iter()
            .map(|p| p.display_name())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "You are an expert DevOps assistant. Recommend the best free hosting platform \
             for a {} project.\n\
             Project: {}\n\
             Options: {}.\n\
             Respond in JSON format: {{\"platform\": \"...\", \"reason\": \"...\"}}",
            request.kind, request.summary, options
        )
    }
}

#[async_trait]
impl AdvisoryOracle for OllamaOracle {
    async fn advise(&self, request: &AdviceRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.endpoint);
        let body = GenerateRequest {
            model: &self.model,
            prompt: Self::build_prompt(request),
            stream: false,
            format: "json",
        };

        tracing::debug!(url = %url, model = %self.model, "querying advisory oracle");

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Advisor(format!("request to {} timed out", url))
                } else if e.is_connect() {
                    Error::Advisor(format!("cannot connect to Ollama at {}", self.endpoint))
                } else {
                    Error::Advisor(format!("request failed: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Advisor(format!("HTTP {}: {}", status, text)));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Advisor(format!("invalid Ollama response: {}", e)))?;

        if !generated.done {
            tracing::warn!(model = %self.model, "Ollama reported incomplete generation");
        }

        Ok(generated.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}
