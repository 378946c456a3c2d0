//! LLM capability: the abstraction over chat backends.
//!
//! An [`LlmClient`] opens [`Chat`] sessions. A chat keeps its own history and
//! answers every send with a stream of [`ChatResponse`] units. Each response
//! carries candidates, each candidate carries parts, and a part is either text
//! or a batch of function calls.
//!
//! Backends with native function calling and the text-only shim both implement
//! [`Chat`], so the conversation loop never knows which one it is talking to.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;

/// A function (tool) the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    /// The function name
    pub name: String,

    /// Description of what the function does
    pub description: String,

    /// JSON Schema describing the function's parameters
    pub parameters: serde_json::Value,
}

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// Name of the function to invoke
    pub name: String,

    /// Arguments keyed by parameter name
    #[serde(default)]
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// One piece of a candidate.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    FunctionCalls(Vec<FunctionCall>),
}

impl Part {
    /// The text of this part, if it is non-empty text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text(text) if !text.is_empty() => Some(text),
            _ => None,
        }
    }

    /// The function calls in this part, if any.
    pub fn as_function_calls(&self) -> Option<&[FunctionCall]> {
        match self {
            Part::FunctionCalls(calls) if !calls.is_empty() => Some(calls),
            _ => None,
        }
    }
}

/// A single candidate completion.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    parts: Vec<Part>,
}

impl Candidate {
    pub fn new(parts: Vec<Part>) -> Self {
        Self { parts }
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}

/// Token usage information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One unit of a streamed chat answer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatResponse {
    candidates: Vec<Candidate>,
    usage: Option<Usage>,
}

impl ChatResponse {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates,
            usage: None,
        }
    }

    /// A response with exactly one candidate holding `parts`.
    pub fn single(parts: Vec<Part>) -> Self {
        Self::new(vec![Candidate::new(parts)])
    }

    /// A single-candidate response with one text part.
    pub fn text(text: impl Into<String>) -> Self {
        Self::single(vec![Part::Text(text.into())])
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn usage(&self) -> Option<&Usage> {
        self.usage.as_ref()
    }
}

/// The stream of response units produced by one send.
///
/// The sender side closes the channel when the answer is complete. A channel
/// that closes without yielding anything means the model had nothing to say.
pub type ChatStream = mpsc::Receiver<std::result::Result<ChatResponse, ProviderError>>;

/// A live chat session with its own history.
#[async_trait]
pub trait Chat: Send {
    /// Declare the functions the model may call for the rest of the session.
    fn set_function_definitions(
        &mut self,
        definitions: Vec<FunctionDefinition>,
    ) -> std::result::Result<(), ProviderError>;

    /// Send the next user turn and stream the answer.
    ///
    /// `contents` are joined into one turn (the query, or the observations
    /// collected during the previous round).
    async fn send_streaming(
        &mut self,
        cancel: &CancellationToken,
        contents: Vec<String>,
    ) -> std::result::Result<ChatStream, ProviderError>;
}

/// The core LLM client trait.
///
/// Every chat backend implements this trait. The conversation loop only ever
/// calls `start_chat()` and then talks to the returned [`Chat`].
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "ollama").
    fn name(&self) -> &str;

    /// Open a new chat session with the given system prompt and model.
    fn start_chat(&self, system_prompt: &str, model: &str) -> Box<dyn Chat>;

    /// List available models for this backend.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }
}

/// Wrap a ready list of responses as a [`ChatStream`].
pub fn stream_of(
    responses: Vec<std::result::Result<ChatResponse, ProviderError>>,
) -> ChatStream {
    let (tx, rx) = mpsc::channel(responses.len().max(1));
    for response in responses {
        // Capacity covers every item, so try_send cannot fail on a full channel.
        let _ = tx.try_send(response);
    }
    rx
}
