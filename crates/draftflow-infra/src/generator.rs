//! HTTP-backed generator and evaluator against an OpenAI-compatible
//! chat-completions endpoint.
//!
//! Both boundaries speak the same wire protocol; the evaluator is just a
//! second prompt over the same client, asking for a score and findings
//! instead of a draft.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use draftflow_core::phase::{
    ArtifactEvaluator, ContentGenerator, GenerationRequest, GenerationResponse,
};
use draftflow_types::config::ThemeConfig;
use draftflow_types::error::GeneratorError;
use draftflow_types::session::{Artifact, Evaluation};

#[derive(Clone)]
pub struct HttpGenerator {
    client: reqwest::Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl HttpGenerator {
    pub fn new(base_url: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        }
    }

    async fn chat(&self, request: &GenerationRequest) -> Result<Value, GeneratorError> {
        let body = json!({
            "model": request.model,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.instruction},
            ],
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Http {
                status: status.as_u16(),
                detail: truncate(&detail, 300),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| GeneratorError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .ok_or_else(|| GeneratorError::InvalidResponse("no choices returned".to_string()))?;
        debug!(model = %request.model, bytes = content.len(), "chat completion received");
        parse_json_content(content)
    }
}

fn map_transport_error(err: reqwest::Error) -> GeneratorError {
    if err.is_timeout() {
        GeneratorError::Timeout
    } else {
        GeneratorError::Unavailable(err.to_string())
    }
}

/// Parse the model's reply as JSON, tolerating markdown code fences.
fn parse_json_content(content: &str) -> Result<Value, GeneratorError> {
    let trimmed = content.trim();
    let stripped = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);
    serde_json::from_str(stripped)
        .map_err(|e| GeneratorError::InvalidResponse(format!("reply is not JSON: {e}")))
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

impl ContentGenerator for HttpGenerator {
    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> Result<GenerationResponse, GeneratorError> {
        let content = self.chat(&request).await?;
        Ok(GenerationResponse { content })
    }
}

/// Evaluator over the same chat endpoint.
#[derive(Clone)]
pub struct HttpEvaluator {
    inner: HttpGenerator,
}

impl HttpEvaluator {
    pub fn new(inner: HttpGenerator) -> Self {
        Self { inner }
    }
}

impl ArtifactEvaluator for HttpEvaluator {
    async fn evaluate(
        &self,
        artifact: Artifact,
        value: &Value,
        config: &ThemeConfig,
    ) -> Result<Evaluation, GeneratorError> {
        let request = GenerationRequest {
            artifact,
            model: config.model.clone(),
            system: config.prompts.evaluator.clone(),
            instruction: format!("Draft {artifact} to score:\n{value}"),
            timeout: std::time::Duration::from_secs(config.generation_timeout_secs),
        };
        let verdict = self.inner.chat(&request).await?;
        serde_json::from_value(verdict)
            .map_err(|e| GeneratorError::InvalidResponse(format!("verdict is not a score: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_fenced_json() {
        let plain = parse_json_content(r#"{"sections": ["a"]}"#).unwrap();
        assert_eq!(plain["sections"][0], "a");

        let fenced = parse_json_content("```json\n{\"body\": \"text\"}\n```").unwrap();
        assert_eq!(fenced["body"], "text");

        let bare_fence = parse_json_content("```\n{\"body\": \"text\"}\n```").unwrap();
        assert_eq!(bare_fence["body"], "text");

        assert!(parse_json_content("not json at all").is_err());
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "héllo wörld".repeat(50);
        let short = truncate(&s, 300);
        assert!(short.len() <= 304);
        assert!(short.ends_with('…'));
    }
}
