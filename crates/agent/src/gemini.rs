//! Generative-language (Gemini) oracle over HTTPS with function calling.

use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use grantwise_core::config::LlmConfig;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::warn;

use crate::llm::{ExtractionRequest, FunctionCall, LlmClient, MessageRole, OracleReply};
use crate::tools::function_declarations;

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiClient {
    http: Client,
    base_url: String,
    model: String,
    api_key: SecretString,
    temperature: f32,
    max_retries: u32,
}

impl GeminiClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|_| config.has_api_key())
            .ok_or_else(|| {
                anyhow!("llm.api_key is required (set GEMINI_API_KEY or GRANTWISE_LLM_API_KEY)")
            })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            temperature: config.temperature,
            max_retries: config.max_retries,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    async fn send_once(&self, body: &Value) -> Result<Value, AttemptError> {
        let response = self
            .http
            .post(self.endpoint())
            .header(API_KEY_HEADER, self.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|error| AttemptError::Retryable(anyhow!("request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            let error = anyhow!("HTTP {status}: {detail}");
            return Err(if is_retryable(status) {
                AttemptError::Retryable(error)
            } else {
                AttemptError::Fatal(error)
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| AttemptError::Fatal(anyhow!("response was not JSON: {error}")))
    }
}

enum AttemptError {
    Retryable(anyhow::Error),
    Fatal(anyhow::Error),
}

fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(2_u64.saturating_pow(attempt).saturating_mul(250))
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<OracleReply> {
        let body = build_request_body(request, self.temperature);

        let mut attempt = 0;
        loop {
            match self.send_once(&body).await {
                Ok(response) => return parse_generate_response(&response),
                Err(AttemptError::Fatal(error)) => return Err(error),
                Err(AttemptError::Retryable(error)) => {
                    if attempt >= self.max_retries {
                        let attempts = attempt + 1;
                        return Err(error.context(format!("gave up after {attempts} attempts")));
                    }
                    warn!(
                        event_name = "consultation.oracle.retrying",
                        attempt,
                        max_retries = self.max_retries,
                        error = %error,
                        "oracle request failed; retrying"
                    );
                    tokio::time::sleep(backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }
}

pub fn build_request_body(request: &ExtractionRequest, temperature: f32) -> Value {
    let summary = format!("Currently collected data:\n{}", request.data_summary);
    let mut contents = vec![text_content("user", &summary)];
    contents.extend(request.history.iter().map(|message| {
        let role = match message.role {
            MessageRole::User => "user",
            MessageRole::Assistant => "model",
        };
        text_content(role, &message.content)
    }));
    contents.push(text_content("user", &request.user_text));

    json!({
        "systemInstruction": { "parts": [{ "text": request.system_prompt }] },
        "contents": contents,
        "tools": function_declarations(),
        "toolConfig": { "functionCallingConfig": { "mode": "AUTO" } },
        "generationConfig": { "temperature": temperature }
    })
}

fn text_content(role: &str, text: &str) -> Value {
    json!({ "role": role, "parts": [{ "text": text }] })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    text: Option<String>,
    function_call: Option<PartFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct PartFunctionCall {
    name: String,
    #[serde(default)]
    args: Map<String, Value>,
}

/// Collects text parts into the message and function-call parts into calls, from the first
/// candidate only.
pub fn parse_generate_response(response: &Value) -> Result<OracleReply> {
    let parsed = GenerateResponse::deserialize(response)
        .context("unexpected generateContent response shape")?;

    let Some(candidate) = parsed.candidates.into_iter().next() else {
        match parsed.prompt_feedback {
            Some(feedback) => bail!("no candidates returned (prompt feedback: {feedback})"),
            None => bail!("no candidates returned"),
        }
    };

    let mut reply = OracleReply::default();
    for part in candidate.content.map(|content| content.parts).unwrap_or_default() {
        if let Some(call) = part.function_call {
            reply.function_calls.push(FunctionCall { name: call.name, arguments: call.args });
        } else if let Some(text) = part.text {
            reply.message.push_str(&text);
        }
    }

    Ok(reply)
}
