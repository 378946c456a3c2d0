//! Tool use for models without native function calling.
//!
//! The system prompt asks such models to answer with a single fenced JSON
//! block:
//!
//! ````text
//! ```json
//! {"thought": "...", "answer": "...", "action": {"name": "kubectl", "reason": "...", "command": "...", "modifies_resource": "no"}}
//! ```
//! ````
//!
//! [`ShimChat`] wraps the backend's chat, buffers the streamed text until a
//! complete block has arrived and re-emits it as one structured response, so
//! the conversation loop sees the same parts a native backend would produce.

use async_trait::async_trait;
use kubeinteract_core::error::{ProtocolError, ProviderError};
use kubeinteract_core::provider::{
    Chat, ChatResponse, ChatStream, FunctionCall, FunctionDefinition, Part, stream_of,
};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const OPEN_FENCE: &str = "```json";
const CLOSE_FENCE: &str = "```";

/// The answer format the prompt asks for.
#[derive(Debug, Default, Deserialize)]
struct ReActResponse {
    #[serde(default)]
    thought: Option<String>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    action: Option<Action>,
}

#[derive(Debug, Deserialize)]
struct Action {
    /// Missing names are left to the tool catalog to reject.
    #[serde(default)]
    name: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    reason: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    command: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    modifies_resource: String,
}

impl Action {
    /// Every field except `name` becomes an argument.
    fn into_function_call(self) -> FunctionCall {
        let mut arguments = Map::new();
        arguments.insert("reason".into(), Value::String(self.reason));
        arguments.insert("command".into(), Value::String(self.command));
        arguments.insert(
            "modifies_resource".into(),
            Value::String(self.modifies_resource),
        );
        FunctionCall {
            name: self.name,
            arguments,
        }
    }
}

/// Models regularly answer `"modifies_resource": true`; keep it as text.
fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// A [`Chat`] that turns fenced JSON answers into structured responses.
///
/// Function definitions are described to the model in the system prompt, so
/// they are never passed on to the backend.
pub struct ShimChat {
    inner: Box<dyn Chat>,
}

impl ShimChat {
    pub fn new(inner: Box<dyn Chat>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Chat for ShimChat {
    fn set_function_definitions(
        &mut self,
        definitions: Vec<FunctionDefinition>,
    ) -> Result<(), ProviderError> {
        debug!(count = definitions.len(), "Shim keeps function definitions local");
        Ok(())
    }

    async fn send_streaming(
        &mut self,
        cancel: &CancellationToken,
        contents: Vec<String>,
    ) -> Result<ChatStream, ProviderError> {
        let mut stream = self.inner.send_streaming(cancel, contents).await?;
        let mut buffer = String::new();
        let mut block = None;

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                item = stream.recv() => item,
            };
            let Some(item) = item else { break };

            let response = match item {
                Ok(response) => response,
                Err(e) => return Ok(stream_of(vec![Err(e)])),
            };
            let Some(candidate) = response.candidates().first() else {
                return Ok(failed(ProtocolError::NoCandidates));
            };
            for part in candidate.parts() {
                match part {
                    Part::Text(text) => buffer.push_str(text),
                    _ => return Ok(failed(ProtocolError::NonTextPart)),
                }
            }

            if let Some(segment) = extract_json(&buffer) {
                block = Some(segment.to_string());
                break;
            }
        }

        let Some(raw) = block else {
            let text = buffer.trim();
            if text.is_empty() {
                return Ok(stream_of(vec![]));
            }
            // Plain prose with no action is shown as the answer.
            debug!("Model answer has no JSON action block");
            return Ok(stream_of(vec![Ok(ChatResponse::text(text))]));
        };

        Ok(stream_of(vec![parse_response(&raw)]))
    }
}

fn failed(error: ProtocolError) -> ChatStream {
    stream_of(vec![Err(ProviderError::Protocol(error))])
}

/// The content between the first opening fence and the last closing fence.
///
/// A buffer holding only the opening fence has no block yet.
fn extract_json(s: &str) -> Option<&str> {
    let first = s.find(OPEN_FENCE)?;
    let last = s.rfind(CLOSE_FENCE)?;
    let start = first + OPEN_FENCE.len();
    if last < start {
        return None;
    }
    Some(&s[start..last])
}

fn parse_response(raw: &str) -> Result<ChatResponse, ProviderError> {
    let cleaned = raw.replace('\n', "");
    let parsed: ReActResponse = serde_json::from_str(cleaned.trim()).map_err(|e| {
        ProviderError::Protocol(ProtocolError::MalformedAction {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
    })?;

    let mut parts = Vec::new();
    if let Some(thought) = parsed.thought.filter(|t| !t.is_empty()) {
        parts.push(Part::Text(thought));
    }
    if let Some(answer) = parsed.answer.filter(|a| !a.is_empty()) {
        parts.push(Part::Text(answer));
    }
    if let Some(action) = parsed.action {
        parts.push(Part::FunctionCalls(vec![action.into_function_call()]));
    }

    Ok(ChatResponse::single(parts))
}
