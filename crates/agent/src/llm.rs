use std::collections::VecDeque;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: MessageRole::User, content: content.into(), created_at: Utc::now() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: MessageRole::Assistant, content: content.into(), created_at: Utc::now() }
    }
}

/// Everything the oracle sees for one turn.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub system_prompt: String,
    pub data_summary: String,
    pub history: Vec<ChatMessage>,
    pub user_text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self { name: name.into(), arguments }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleReply {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

impl OracleReply {
    pub fn text(message: impl Into<String>) -> Self {
        Self { message: message.into(), function_calls: Vec::new() }
    }

    pub fn call(name: impl Into<String>, arguments: Value) -> Self {
        Self { message: String::new(), function_calls: vec![FunctionCall::new(name, arguments)] }
    }

    pub fn with_call(mut self, name: impl Into<String>, arguments: Value) -> Self {
        self.function_calls.push(FunctionCall::new(name, arguments));
        self
    }
}

/// The external extraction oracle. It only translates free text into field values and intents;
/// it never decides amounts.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn extract(&self, request: &ExtractionRequest) -> Result<OracleReply>;
}

/// Replays queued replies in order and records every request it was given.
#[derive(Default)]
pub struct ScriptedLlmClient {
    replies: Mutex<VecDeque<std::result::Result<OracleReply, String>>>,
    requests: Mutex<Vec<ExtractionRequest>>,
}

impl ScriptedLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: OracleReply) -> Self {
        self.push_reply(reply);
        self
    }

    pub fn with_failure(self, message: impl Into<String>) -> Self {
        self.push_failure(message);
        self
    }

    pub fn push_reply(&self, reply: OracleReply) {
        lock(&self.replies).push_back(Ok(reply));
    }

    pub fn push_failure(&self, message: impl Into<String>) {
        lock(&self.replies).push_back(Err(message.into()));
    }

    pub fn requests(&self) -> Vec<ExtractionRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.replies).len()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn extract(&self, request: &ExtractionRequest) -> Result<OracleReply> {
        lock(&self.requests).push(request.clone());
        match lock(&self.replies).pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("scripted oracle has no reply queued")),
        }
    }
}
