//! Completion-provider boundary.
//!
//! Both turn phases talk to an OpenAI-compatible `chat/completions` endpoint. Phase 1 sends the
//! tool schema and expects function calls back; phase 2 sends the tool results and expects prose.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::Mutex;

use kathir_core::config::{LlmConfig, LlmProvider};

const OPENROUTER_REFERER: &str = "https://kathir.app";
const OPENROUTER_TITLE: &str = "Kathir AI Assistant";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

/// A function call emitted by the model. Arguments that are not valid JSON are kept as a raw
/// string so the dispatcher can report them instead of the turn failing.
#[derive(Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(ChatRole::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(ChatRole::Assistant, content)
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { role: ChatRole::Assistant, content, tool_calls, tool_call_id: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: ChatRole, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), tool_calls: Vec::new(), tool_call_id: None }
    }

    pub fn to_wire(&self) -> Value {
        let mut message = json!({ "role": self.role.as_str(), "content": self.content });
        if !self.tool_calls.is_empty() {
            message["tool_calls"] = Value::Array(
                self.tool_calls
                    .iter()
                    .map(|call| {
                        let arguments = match &call.arguments {
                            Value::String(raw) => raw.clone(),
                            other => other.to_string(),
                        };
                        json!({
                            "id": call.id,
                            "type": "function",
                            "function": { "name": call.name, "arguments": arguments },
                        })
                    })
                    .collect(),
            );
        }
        if let Some(tool_call_id) = &self.tool_call_id {
            message["tool_call_id"] = json!(tool_call_id);
        }
        message
    }
}

/// Model and sampling settings for one phase of a turn.
#[derive(Clone, Debug, PartialEq)]
pub struct PhaseProfile {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl PhaseProfile {
    pub fn tool_selection(config: &LlmConfig) -> Self {
        Self {
            model: config.tool_model.clone(),
            temperature: config.tool_temperature,
            max_tokens: config.max_output_tokens,
        }
    }

    pub fn response(config: &LlmConfig) -> Self {
        Self {
            model: config.response_model.clone(),
            temperature: config.response_temperature,
            max_tokens: config.max_output_tokens,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompletionRequest {
    pub profile: PhaseProfile,
    pub messages: Vec<ChatMessage>,
    pub tools: Option<Value>,
}

impl CompletionRequest {
    pub fn to_wire(&self) -> Value {
        let mut body = json!({
            "model": self.profile.model,
            "messages": self.messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
            "temperature": self.profile.temperature,
            "max_tokens": self.profile.max_tokens,
        });
        if let Some(tools) = &self.tools {
            body["tools"] = tools.clone();
            body["tool_choice"] = json!("auto");
        }
        body
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Completion {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl Completion {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), tool_calls: Vec::new() }
    }

    pub fn with_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { content: None, tool_calls }
    }

    /// Content with surrounding whitespace removed; `None` when the model sent nothing useful.
    pub fn trimmed_content(&self) -> Option<&str> {
        self.content.as_deref().map(str::trim).filter(|text| !text.is_empty())
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("completion transport failed: {0}")]
    Transport(String),
    #[error("completion endpoint returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("completion provider reported an error: {0}")]
    Provider(String),
    #[error("malformed completion payload: {0}")]
    Malformed(String),
    #[error("completion client misconfigured: {0}")]
    Configuration(String),
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError>;
}

pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    provider: LlmProvider,
}

impl OpenAiCompatibleClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|error| LlmError::Configuration(error.to_string()))?;
        let endpoint = format!("{}/chat/completions", config.endpoint().trim_end_matches('/'));

        Ok(Self { http, endpoint, api_key: config.api_key.clone(), provider: config.provider })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompatibleClient {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        let mut builder = self.http.post(&self.endpoint).json(&request.to_wire());
        if let Some(api_key) = &self.api_key {
            builder = builder.bearer_auth(api_key.expose_secret());
        }
        if self.provider == LlmProvider::OpenRouter {
            builder =
                builder.header("HTTP-Referer", OPENROUTER_REFERER).header("X-Title", OPENROUTER_TITLE);
        }

        let response =
            builder.send().await.map_err(|error| LlmError::Transport(error.to_string()))?;
        let status = response.status();
        let body = response.text().await.map_err(|error| LlmError::Transport(error.to_string()))?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiResponse>(&body)
                .ok()
                .and_then(|parsed| parsed.error)
                .map(|error| error.message)
                .unwrap_or(body);
            return Err(LlmError::Status { status: status.as_u16(), message });
        }

        parse_completion(&body)
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    id: Option<String>,
    function: ApiFunction,
}

#[derive(Debug, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Parses a `chat/completions` body. Provider errors delivered with a 200 status are still errors.
pub fn parse_completion(body: &str) -> Result<Completion, LlmError> {
    let parsed: ApiResponse =
        serde_json::from_str(body).map_err(|error| LlmError::Malformed(error.to_string()))?;

    if let Some(error) = parsed.error {
        return Err(LlmError::Provider(error.message));
    }

    let message = parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message)
        .ok_or_else(|| LlmError::Malformed("response contained no choices".to_string()))?;

    let tool_calls = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, call)| ToolCall {
            id: call.id.unwrap_or_else(|| format!("call_{index}")),
            name: call.function.name,
            arguments: decode_arguments(call.function.arguments),
        })
        .collect();

    Ok(Completion { content: message.content, tool_calls })
}

fn decode_arguments(raw: Value) -> Value {
    match raw {
        Value::Null => json!({}),
        Value::String(text) if text.trim().is_empty() => json!({}),
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

/// Replays queued completions in order and keeps every request it was sent.
#[derive(Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<Completion, LlmError>>) -> Self {
        Self { script: Mutex::new(script.into()), requests: Mutex::new(Vec::new()) }
    }

    pub async fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, LlmError> {
        self.requests.lock().await.push(request);
        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Transport("scripted provider exhausted".to_string())))
    }
}
