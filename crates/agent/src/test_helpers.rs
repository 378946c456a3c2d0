//! Shared test helpers for the shim and conversation tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kubeinteract_core::error::{InputError, ProviderError, ToolError};
use kubeinteract_core::provider::{
    Chat, ChatResponse, ChatStream, FunctionDefinition, LlmClient, stream_of,
};
use kubeinteract_core::tool::{InvokeToolOptions, ToolCatalog, ToolInvocation};
use kubeinteract_ui::{Block, Document, Subscriber};
use tokio_util::sync::CancellationToken;

/// What one send streams back.
pub type Script = Vec<Result<ChatResponse, ProviderError>>;

#[derive(Default)]
struct MockState {
    scripts: Vec<Script>,
    sends: AtomicUsize,
    sent: Mutex<Vec<Vec<String>>>,
    system_prompts: Mutex<Vec<String>>,
    definitions: Mutex<Vec<FunctionDefinition>>,
}

/// A backend that answers each send with the next scripted stream.
///
/// Once the scripts run out the last one is repeated, so a single script
/// models a model that always answers the same way.
pub struct SequentialMockLlm {
    state: Arc<MockState>,
}

impl SequentialMockLlm {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            state: Arc::new(MockState {
                scripts,
                ..MockState::default()
            }),
        }
    }

    pub fn sends(&self) -> usize {
        self.state.sends.load(Ordering::SeqCst)
    }

    /// The contents of every send, in order.
    pub fn sent(&self) -> Vec<Vec<String>> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn system_prompts(&self) -> Vec<String> {
        self.state.system_prompts.lock().unwrap().clone()
    }

    pub fn definitions(&self) -> Vec<FunctionDefinition> {
        self.state.definitions.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for SequentialMockLlm {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    fn start_chat(&self, system_prompt: &str, _model: &str) -> Box<dyn Chat> {
        self.state
            .system_prompts
            .lock()
            .unwrap()
            .push(system_prompt.to_string());
        Box::new(MockChat {
            state: self.state.clone(),
        })
    }
}

struct MockChat {
    state: Arc<MockState>,
}

#[async_trait]
impl Chat for MockChat {
    fn set_function_definitions(
        &mut self,
        definitions: Vec<FunctionDefinition>,
    ) -> Result<(), ProviderError> {
        *self.state.definitions.lock().unwrap() = definitions;
        Ok(())
    }

    async fn send_streaming(
        &mut self,
        _cancel: &CancellationToken,
        contents: Vec<String>,
    ) -> Result<ChatStream, ProviderError> {
        let n = self.state.sends.fetch_add(1, Ordering::SeqCst);
        self.state.sent.lock().unwrap().push(contents);
        let script = self
            .state
            .scripts
            .get(n)
            .or(self.state.scripts.last())
            .cloned()
            .unwrap_or_default();
        Ok(stream_of(script))
    }
}

/// A script streaming `pieces` as separate text increments.
pub fn chunks(pieces: &[&str]) -> Script {
    pieces
        .iter()
        .map(|p| Ok(ChatResponse::text(*p)))
        .collect()
}

/// A fenced JSON answer asking to run `command` with kubectl.
pub fn kubectl_action(command: &str) -> String {
    format!(
        "```json\n{{\"thought\": \"I need to look at the cluster.\", \"action\": {{\"name\": \"kubectl\", \"reason\": \"inspect\", \"command\": \"{command}\", \"modifies_resource\": \"no\"}}}}\n```"
    )
}

/// A fenced JSON final answer.
pub fn final_answer(answer: &str) -> String {
    format!("```json\n{{\"thought\": \"\", \"answer\": \"{answer}\"}}\n```")
}

/// A catalog with a single `kubectl` tool that records invocations instead
/// of running anything.
#[derive(Default)]
pub struct RecordingCatalog {
    invoked: Arc<Mutex<Vec<String>>>,
}

impl RecordingCatalog {
    pub fn invoked(&self) -> Vec<String> {
        self.invoked.lock().unwrap().clone()
    }
}

impl ToolCatalog for RecordingCatalog {
    fn all_tools(&self) -> Vec<FunctionDefinition> {
        vec![FunctionDefinition {
            name: "kubectl".into(),
            description: "Executes a kubectl command".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {"command": {"type": "string"}},
                "required": ["command"]
            }),
        }]
    }

    fn parse_tool_invocation(
        &self,
        name: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Box<dyn ToolInvocation>, ToolError> {
        if name != "kubectl" {
            return Err(ToolError::NotFound(name.to_string()));
        }
        let command = arguments
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'command' argument".into()))?;
        Ok(Box::new(RecordingInvocation {
            command: command.to_string(),
            invoked: self.invoked.clone(),
        }))
    }
}

struct RecordingInvocation {
    command: String,
    invoked: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ToolInvocation for RecordingInvocation {
    fn name(&self) -> &str {
        "kubectl"
    }

    fn pretty_print(&self) -> String {
        self.command.clone()
    }

    async fn invoke_tool(
        &self,
        _cancel: &CancellationToken,
        options: &InvokeToolOptions,
    ) -> Result<String, ToolError> {
        assert!(options.work_dir.is_dir(), "work dir must exist while invoking");
        self.invoked.lock().unwrap().push(self.command.clone());
        Ok("NAME    READY   STATUS\nweb-0   1/1     Running".into())
    }
}

/// How [`AutoResponder`] answers confirmation prompts.
#[derive(Debug, Clone)]
pub enum Answer {
    Choose(&'static str),
    EndOfInput,
}

/// A headless renderer: answers every option block as soon as it appears.
pub struct AutoResponder {
    answer: Answer,
    prompts: AtomicUsize,
}

impl AutoResponder {
    pub fn attach(doc: &Document, answer: Answer) -> (Arc<Self>, kubeinteract_ui::Subscription) {
        let responder = Arc::new(Self {
            answer,
            prompts: AtomicUsize::new(0),
        });
        let subscription = doc.add_subscription(responder.clone());
        (responder, subscription)
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }
}

impl Subscriber for AutoResponder {
    fn document_changed(&self, _doc: &Document, block: &Block) {
        let Block::InputOption(options) = block else {
            return;
        };
        if options.observable().is_resolved() {
            return;
        }
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let result = match &self.answer {
            Answer::Choose(choice) => Ok(choice.to_string()),
            Answer::EndOfInput => Err(InputError::EndOfInput),
        };
        let _ = options.observable().set(result);
    }
}
