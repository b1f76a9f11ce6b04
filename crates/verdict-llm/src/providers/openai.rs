use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use verdict_core::config::ModelConfig;
use verdict_core::error::{Result, VerdictError};
use verdict_core::traits::TextGenerator;
use verdict_core::types::GenerationParams;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible text completions client. Works with vLLM, Ollama,
/// llama.cpp server, TGI's OpenAI route, OpenRouter, etc.
///
/// The completions endpoint returns only the continuation; this client
/// prepends the prompt so callers see the same echoed output as a local
/// text-generation pipeline.
pub struct CompletionsClient {
    http: Client,
    model_id: String,
    base_url: String,
    api_key: Option<String>,
}

impl CompletionsClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VerdictError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            model_id: config.model_id.clone(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_API_URL.to_string()),
            api_key: config.api_key.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/completions", self.base_url.trim_end_matches('/'))
    }

    fn failure(&self, status: Option<u16>, message: impl Into<String>) -> VerdictError {
        VerdictError::GenerationFailed {
            model: self.model_id.clone(),
            status,
            message: message.into(),
        }
    }
}

// Request types
#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

impl<'a> CompletionRequest<'a> {
    fn new(model: &'a str, prompt: &'a str, params: GenerationParams) -> Self {
        Self {
            model,
            prompt,
            max_tokens: params.max_new_tokens,
            // Greedy decoding is expressed as temperature 0 on this API.
            temperature: if params.do_sample { params.temperature } else { 0.0 },
            stream: false,
        }
    }
}

// Response types
#[derive(Deserialize, Debug)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize, Debug)]
struct CompletionChoice {
    #[serde(default)]
    text: String,
}

/// Extract the continuation text from a completions response body.
fn parse_completion(body: &str) -> Result<String> {
    let parsed: CompletionResponse = serde_json::from_str(body)
        .map_err(|e| VerdictError::GenerationParse(e.to_string()))?;
    parsed
        .choices
        .into_iter()
        .next()
        .map(|c| c.text)
        .ok_or_else(|| VerdictError::GenerationParse("response has no choices".into()))
}

impl TextGenerator for CompletionsClient {
    fn model(&self) -> &str {
        &self.model_id
    }

    fn generate<'a>(
        &'a self,
        prompt: &'a str,
        params: GenerationParams,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let body = CompletionRequest::new(&self.model_id, prompt, params);

            let mut req = self
                .http
                .post(self.endpoint())
                .header("content-type", "application/json")
                .json(&body);
            if let Some(ref key) = self.api_key {
                req = req.bearer_auth(key);
            }

            let resp = req.send().await.map_err(|e| {
                let kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection failed"
                } else {
                    "request failed"
                };
                self.failure(None, format!("{}: {}", kind, e))
            })?;

            let status = resp.status();
            let text = resp
                .text()
                .await
                .map_err(|e| self.failure(None, format!("connection dropped: {}", e)))?;

            if !status.is_success() {
                warn!(model = %self.model_id, status = status.as_u16(), "Completion request rejected");
                return Err(self.failure(Some(status.as_u16()), text));
            }

            let continuation = parse_completion(&text)?;
            debug!(model = %self.model_id, chars = continuation.len(), "Completion received");
            Ok(format!("{}{}", prompt, continuation))
        })
    }
}
