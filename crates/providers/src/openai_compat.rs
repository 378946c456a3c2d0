//! OpenAI-compatible chat backend.
//!
//! Works with: OpenAI, vLLM, Ollama's `/v1` endpoint, and any server that
//! exposes `/v1/chat/completions` with SSE streaming.
//!
//! Supports:
//! - Streaming chat completions with native tool calling
//! - Model listing
//! - A custom CA certificate for private endpoints

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use kubeinteract_core::error::ProviderError;
use kubeinteract_core::provider::*;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

/// An OpenAI-compatible LLM client.
pub struct OpenAiCompatClient {
    name: String,
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl OpenAiCompatClient {
    /// Create a new OpenAI-compatible client.
    ///
    /// `base_url` may be given with or without the trailing `/v1`.
    pub fn new(
        name: impl Into<String>,
        base_url: &str,
        api_key: Option<String>,
        ca_cert: Option<&Path>,
    ) -> Result<Self, ProviderError> {
        let mut builder = reqwest::Client::builder().timeout(Duration::from_secs(300));

        if let Some(path) = ca_cert {
            let pem = std::fs::read(path).map_err(|e| {
                ProviderError::NotConfigured(format!(
                    "unable to read CA cert {}: {e}",
                    path.display()
                ))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem).map_err(|e| {
                ProviderError::NotConfigured(format!("invalid CA cert {}: {e}", path.display()))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("building HTTP client: {e}")))?;

        Ok(Self {
            name: name.into(),
            base_url: normalize_base_url(base_url),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }
}

/// Trim trailing slashes and make sure the URL ends with `/v1`.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn authorize(request: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => request.header("Authorization", format!("Bearer {key}")),
        None => request,
    }
}

/// Map non-success HTTP statuses to provider errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if status == 404 {
        let error_body = response.text().await.unwrap_or_default();
        return Err(ProviderError::ModelNotFound(error_body));
    }

    if !(200..300).contains(&status) {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Provider returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

fn network_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl LlmClient for OpenAiCompatClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_chat(&self, system_prompt: &str, model: &str) -> Box<dyn Chat> {
        debug!(provider = %self.name, model, "Starting chat session");
        Box::new(OpenAiChat {
            provider_name: self.name.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: model.to_string(),
            client: self.client.clone(),
            tools: Vec::new(),
            history: Arc::new(Mutex::new(vec![ApiMessage::new("system", system_prompt)])),
            answer_task: None,
        })
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = authorize(self.client.get(&url), self.api_key.as_deref())
            .send()
            .await
            .map_err(network_error)?;
        let response = check_status(response).await?;

        let body: ModelList = response.json().await.map_err(|e| ProviderError::ApiError {
            status_code: 200,
            message: format!("Failed to parse model list: {e}"),
        })?;

        Ok(body.data.into_iter().map(|m| m.id).collect())
    }
}

/// A chat session against an OpenAI-compatible endpoint.
///
/// History is shared with the streaming task, which records the assistant
/// turn when the answer ends, is cancelled, or its receiver is dropped. A
/// stream must be drained or dropped before the next send.
pub struct OpenAiChat {
    provider_name: String,
    base_url: String,
    api_key: Option<String>,
    model: String,
    client: reqwest::Client,
    tools: Vec<ApiToolDefinition>,
    history: Arc<Mutex<Vec<ApiMessage>>>,
    answer_task: Option<JoinHandle<()>>,
}

impl OpenAiChat {
    fn request_body(&self) -> serde_json::Value {
        let messages = self
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });

        if !self.tools.is_empty() {
            body["tools"] = serde_json::json!(self.tools);
        }
        body
    }
}

#[async_trait]
impl Chat for OpenAiChat {
    fn set_function_definitions(
        &mut self,
        definitions: Vec<FunctionDefinition>,
    ) -> Result<(), ProviderError> {
        self.tools = definitions
            .into_iter()
            .map(|d| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: d.name,
                    description: d.description,
                    parameters: d.parameters,
                },
            })
            .collect();
        Ok(())
    }

    async fn send_streaming(
        &mut self,
        cancel: &CancellationToken,
        contents: Vec<String>,
    ) -> Result<ChatStream, ProviderError> {
        self.await_previous_answer().await;

        let user_turn = ApiMessage::new("user", contents.join("\n"));
        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(user_turn);

        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body();

        debug!(provider = %self.provider_name, model = %self.model, "Sending streaming request");

        let request = authorize(self.client.post(&url), self.api_key.as_deref())
            .header("Content-Type", "application/json")
            .header("Accept", "text/event-stream")
            .json(&body)
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                self.pop_unanswered_turn();
                return Err(ProviderError::Cancelled);
            }
            result = request => result.map_err(network_error),
        };

        let response = match response {
            Ok(response) => check_status(response).await,
            Err(e) => Err(e),
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => {
                // A failed send leaves no trace in history, so a retry resends the same turn.
                self.pop_unanswered_turn();
                return Err(e);
            }
        };

        let (tx, rx) = tokio::sync::mpsc::channel(64);
        let provider_name = self.provider_name.clone();
        let history = self.history.clone();
        let cancel = cancel.clone();

        // Spawn task to read the SSE byte stream and parse chunks
        self.answer_task = Some(tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut assembler = StreamAssembler::default();

            let ended = 'read: loop {
                let chunk_result = tokio::select! {
                    _ = cancel.cancelled() => break 'read Err(ProviderError::Cancelled),
                    _ = tx.closed() => {
                        debug!(provider = %provider_name, "Receiver dropped, keeping the answer so far");
                        break 'read Ok(());
                    }
                    next = byte_stream.next() => match next {
                        Some(chunk) => chunk,
                        None => break 'read Ok(()),
                    },
                };

                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => break 'read Err(ProviderError::StreamInterrupted(e.to_string())),
                };

                buffer.push_str(&String::from_utf8_lossy(&bytes));

                // Process complete lines
                while let Some(line_end) = buffer.find('\n') {
                    let line = buffer[..line_end].trim_end_matches('\r').to_string();
                    buffer.drain(..=line_end);

                    // Skip empty lines and SSE comments
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };

                    match assembler.handle_data(data.trim()) {
                        Ok(Some(response)) => {
                            // A closed receiver is noticed by the next select.
                            let _ = tx.send(Ok(response)).await;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            trace!(
                                provider = %provider_name,
                                data = %data,
                                error = %e,
                                "Ignoring unparseable SSE chunk"
                            );
                        }
                    }

                    if assembler.is_done() {
                        break 'read Ok(());
                    }
                }
            };

            record_answer(&history, &assembler, ended.is_ok());

            let tail = match ended {
                Ok(()) => assembler.finish(),
                Err(e) => Err(e),
            };
            match tail {
                Ok(Some(response)) => {
                    let _ = tx.send(Ok(response)).await;
                }
                Ok(None) => {}
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                }
            }
        }));

        Ok(rx)
    }
}

impl OpenAiChat {
    fn pop_unanswered_turn(&self) {
        pop_user_turn(&mut self.history.lock().unwrap_or_else(|e| e.into_inner()));
    }

    /// The previous answer has to be in history before the next user turn.
    async fn await_previous_answer(&mut self) {
        if let Some(task) = self.answer_task.take()
            && let Err(e) = task.await
        {
            warn!(provider = %self.provider_name, error = %e, "Answer task failed");
        }
    }
}

fn pop_user_turn(history: &mut Vec<ApiMessage>) {
    if history.last().is_some_and(|m| m.role == "user") {
        history.pop();
    }
}

/// Record what the model said, even if the stream was cut short.
///
/// An interrupted answer with no content leaves no trace, like a failed send.
fn record_answer(history: &Mutex<Vec<ApiMessage>>, assembler: &StreamAssembler, complete: bool) {
    let mut history = history.lock().unwrap_or_else(|e| e.into_inner());
    if complete || !assembler.is_empty() {
        history.push(assembler.assistant_message());
    } else {
        pop_user_turn(&mut history);
    }
}

/// Turns SSE `data:` payloads into [`ChatResponse`] units.
///
/// Text deltas are emitted as they arrive; tool call deltas are accumulated
/// and emitted once, as a single function-calls part, when the stream ends.
#[derive(Default)]
struct StreamAssembler {
    text: String,
    tool_calls: BTreeMap<u32, ToolCallAccumulator>,
    usage: Option<Usage>,
    done: bool,
}

impl StreamAssembler {
    fn handle_data(&mut self, data: &str) -> Result<Option<ChatResponse>, serde_json::Error> {
        // "[DONE]" signals end of stream
        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let stream_resp: StreamResponse = serde_json::from_str(data)?;

        if let Some(usage) = stream_resp.usage {
            self.usage = Some(Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            });
        }

        let Some(choice) = stream_resp.choices.into_iter().next() else {
            return Ok(None);
        };

        for tc_delta in choice.delta.tool_calls.unwrap_or_default() {
            let acc = self.tool_calls.entry(tc_delta.index).or_default();
            if let Some(function) = tc_delta.function {
                if let Some(name) = function.name {
                    acc.name = name;
                }
                if let Some(args) = function.arguments {
                    acc.arguments.push_str(&args);
                }
            }
        }

        match choice.delta.content {
            Some(content) if !content.is_empty() => {
                self.text.push_str(&content);
                Ok(Some(ChatResponse::text(content)))
            }
            _ => Ok(None),
        }
    }

    fn is_done(&self) -> bool {
        self.done
    }

    fn is_empty(&self) -> bool {
        self.text.is_empty() && self.tool_calls.is_empty()
    }

    /// The assistant turn to record in history.
    ///
    /// Tool calls are recorded as text because observations come back as a
    /// plain user turn rather than as `tool` messages.
    fn assistant_message(&self) -> ApiMessage {
        let mut content = self.text.clone();
        for acc in self.tool_calls.values() {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(&format!(
                "Calling function {} with arguments {}",
                acc.name, acc.arguments
            ));
        }
        ApiMessage::new("assistant", content)
    }

    /// The trailing function-calls response, if the model requested any.
    fn finish(self) -> Result<Option<ChatResponse>, ProviderError> {
        if self.tool_calls.is_empty() {
            return Ok(None);
        }

        let calls = self
            .tool_calls
            .into_values()
            .map(ToolCallAccumulator::into_function_call)
            .collect::<Result<Vec<_>, _>>()?;

        let mut response = ChatResponse::single(vec![Part::FunctionCalls(calls)]);
        if let Some(usage) = self.usage {
            response = response.with_usage(usage);
        }
        Ok(Some(response))
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

impl ApiMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

// --- Streaming SSE types ---

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<StreamToolCallDelta>>,
}

/// A tool call delta: arrives incrementally across chunks.
#[derive(Debug, Deserialize)]
struct StreamToolCallDelta {
    index: u32,
    #[serde(default)]
    function: Option<StreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct StreamFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

/// Accumulates incremental tool call deltas into a complete call.
#[derive(Default)]
struct ToolCallAccumulator {
    name: String,
    arguments: String,
}

impl ToolCallAccumulator {
    fn into_function_call(self) -> Result<FunctionCall, ProviderError> {
        let arguments = if self.arguments.trim().is_empty() {
            serde_json::Map::new()
        } else {
            serde_json::from_str(&self.arguments).map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Malformed arguments for tool call {}: {e}", self.name),
            })?
        };
        Ok(FunctionCall {
            name: self.name,
            arguments,
        })
    }
}
