//! The conversation loop.
//!
//! One round takes a query and runs **send → stream → confirm → invoke →
//! observe** until the model stops asking for tools:
//!
//! 1. **Send** the accumulated content through the retrying chat
//! 2. **Stream** the answer into a growing [`TextBlock`], queueing calls
//! 3. **Confirm** each queued call with the operator through an
//!    [`InputOptionBlock`]
//! 4. **Invoke** approved calls and collect their output as observations
//!    for the next send
//!
//! The round fails with [`Error::MaxIterationsReached`] when the model keeps
//! calling tools past the configured bound.

use std::path::PathBuf;
use std::sync::Arc;

use kubeinteract_config::RetryConfig;
use kubeinteract_core::error::{Error, InputError, ProtocolError, Result, ToolError};
use kubeinteract_core::provider::{Chat, FunctionCall, LlmClient, Part};
use kubeinteract_core::tool::{InvokeToolOptions, ToolCatalog};
use kubeinteract_providers::RetryChat;
use kubeinteract_ui::{Document, ErrorBlock, FunctionCallRequestBlock, InputOptionBlock, TextBlock};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::prompt::system_prompt;
use crate::shim::ShimChat;

const DEFAULT_MAX_ITERATIONS: usize = 20;

const CONFIRMATION_PROMPT: &str = "  Do you want to proceed ?\n  1) Yes\n  2) No";
const PROCEED: &str = "proceed";
const SKIP: &str = "skip";

/// A single operator session with the model.
pub struct Conversation {
    /// The chat backend
    llm: Arc<dyn LlmClient>,

    /// Model id passed to every chat
    model: String,

    /// Actions offered to the model
    tools: Arc<dyn ToolCatalog>,

    /// Kubeconfig handed to approved invocations
    kubeconfig: Option<PathBuf>,

    /// Whether the model answers in fenced JSON instead of native calls
    enable_tool_use_shim: bool,

    /// Transport retry policy
    retry: RetryConfig,

    /// Maximum sends per round
    max_iterations: usize,

    /// Identifies the session in logs
    session_id: String,

    doc: Document,
    chat: Option<Box<dyn Chat>>,
    work_dir: Option<TempDir>,
}

impl Conversation {
    /// Create a conversation. Nothing is started until [`Conversation::init`].
    pub fn new(
        llm: Arc<dyn LlmClient>,
        model: impl Into<String>,
        tools: Arc<dyn ToolCatalog>,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            tools,
            kubeconfig: None,
            enable_tool_use_shim: true,
            retry: RetryConfig::default(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            session_id: uuid::Uuid::new_v4().to_string(),
            doc: Document::new(),
            chat: None,
            work_dir: None,
        }
    }

    pub fn with_kubeconfig(mut self, kubeconfig: impl Into<PathBuf>) -> Self {
        self.kubeconfig = Some(kubeconfig.into());
        self
    }

    pub fn with_tool_use_shim(mut self, enabled: bool) -> Self {
        self.enable_tool_use_shim = enabled;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum number of sends per round.
    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn document(&self) -> &Document {
        &self.doc
    }

    /// Scratch directory of the running session.
    pub fn work_dir(&self) -> Option<&std::path::Path> {
        self.work_dir.as_ref().map(|d| d.path())
    }

    /// Start (or restart) the session, rendering into `doc`.
    ///
    /// Any previous chat and scratch directory are torn down first, so this
    /// doubles as "reset".
    pub fn init(&mut self, doc: Document) -> Result<()> {
        self.close();

        let work_dir = tempfile::Builder::new()
            .prefix("agent-workdir-")
            .tempdir()?;

        let mut definitions = self.tools.all_tools();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));

        let prompt = system_prompt(&definitions, self.enable_tool_use_shim)?;
        let chat = self.llm.start_chat(&prompt, &self.model);
        let chat: Box<dyn Chat> = Box::new(RetryChat::new(chat, self.retry.clone()));
        let mut chat: Box<dyn Chat> = if self.enable_tool_use_shim {
            Box::new(ShimChat::new(chat))
        } else {
            chat
        };
        chat.set_function_definitions(definitions)?;

        info!(
            session_id = %self.session_id,
            backend = self.llm.name(),
            model = %self.model,
            work_dir = %work_dir.path().display(),
            shim = self.enable_tool_use_shim,
            "Conversation initialized"
        );

        self.doc = doc;
        self.chat = Some(chat);
        self.work_dir = Some(work_dir);
        Ok(())
    }

    /// Drop the chat and remove the scratch directory.
    ///
    /// Cleanup failures are logged, never returned.
    pub fn close(&mut self) {
        self.chat = None;
        if let Some(work_dir) = self.work_dir.take() {
            let path = work_dir.path().to_path_buf();
            match work_dir.close() {
                Ok(()) => debug!(path = %path.display(), "Removed work dir"),
                Err(e) => warn!(path = %path.display(), "Failed to remove work dir: {e}"),
            }
        }
    }

    /// Run one round for `query`.
    ///
    /// End of input during a confirmation ends the round successfully. Any
    /// other failure is shown in the document before it is returned.
    pub async fn run_one_round(&mut self, cancel: &CancellationToken, query: &str) -> Result<()> {
        info!(session_id = %self.session_id, "Starting round");

        match self.drive(cancel, query).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_end_of_input() => Ok(()),
            Err(e) => {
                if !already_rendered(&e) {
                    self.doc.add_block(ErrorBlock::new(format!("Error: {e}\n")));
                }
                Err(e)
            }
        }
    }

    async fn drive(&mut self, cancel: &CancellationToken, query: &str) -> Result<()> {
        let Some(chat) = self.chat.as_mut() else {
            return Err(Error::Internal("conversation is not initialized".into()));
        };
        let options = InvokeToolOptions {
            kubeconfig: self.kubeconfig.clone(),
            work_dir: self
                .work_dir
                .as_ref()
                .map(|d| d.path().to_path_buf())
                .unwrap_or_default(),
        };

        let mut contents = vec![query.to_string()];

        for iteration in 1..=self.max_iterations {
            debug!(session_id = %self.session_id, iteration, "Sending to model");

            let pending =
                stream_answer(&self.doc, chat, cancel, std::mem::take(&mut contents)).await?;

            if pending.is_empty() {
                info!(session_id = %self.session_id, iterations = iteration, "Round complete");
                return Ok(());
            }

            for call in &pending {
                let invocation = self
                    .tools
                    .parse_tool_invocation(&call.name, &call.arguments)?;

                self.doc.add_block(FunctionCallRequestBlock::new(format!(
                    "  Running: {}\n",
                    invocation.pretty_print()
                )));

                let choice = InputOptionBlock::new(CONFIRMATION_PROMPT, [PROCEED, SKIP]);
                self.doc.add_block(choice.clone());

                let answer = tokio::select! {
                    _ = cancel.cancelled() => {
                        return Err(ToolError::Cancelled(invocation.pretty_print()).into());
                    }
                    answer = choice.observable().wait() => answer,
                };

                match answer.as_deref() {
                    Ok(PROCEED) => {}
                    Ok(SKIP) => {
                        info!(tool = %call.name, "Operator skipped tool call");
                        self.doc
                            .add_block(TextBlock::with_text("Operation was skipped.\n"));
                        contents.push(format!("User didn't approve running {:?}.\n", call.name));
                        continue;
                    }
                    Ok(other) => {
                        self.doc.add_block(ErrorBlock::new(
                            "Invalid choice received. Cancelling operation.\n",
                        ));
                        return Err(ProtocolError::InvalidChoice(other.to_string()).into());
                    }
                    Err(InputError::EndOfInput) => {
                        info!(session_id = %self.session_id, "Input closed during confirmation");
                        return Ok(());
                    }
                    Err(e) => return Err(e.clone().into()),
                }

                info!(tool = %call.name, command = %invocation.pretty_print(), "Invoking tool");
                let output = invocation.invoke_tool(cancel, &options).await?;
                contents.push(format!("Result of running {:?}:\n{output}", call.name));
            }
        }

        warn!(
            session_id = %self.session_id,
            max_iterations = self.max_iterations,
            "Max iterations reached"
        );
        self.doc.add_block(ErrorBlock::new(format!(
            "Sorry, couldn't complete the task after {} iterations.\n",
            self.max_iterations
        )));
        Err(Error::MaxIterationsReached {
            iterations: self.max_iterations,
        })
    }
}

impl Drop for Conversation {
    fn drop(&mut self) {
        self.close();
    }
}

/// Send `contents` and render the answer, returning the calls it asked for.
///
/// Text goes into one streaming [`TextBlock`], created on the first
/// non-empty text. Only the first candidate of each unit is used.
async fn stream_answer(
    doc: &Document,
    chat: &mut Box<dyn Chat>,
    cancel: &CancellationToken,
    contents: Vec<String>,
) -> Result<Vec<FunctionCall>> {
    let mut stream = chat.send_streaming(cancel, contents).await?;
    let mut pending = Vec::new();
    let mut text_block: Option<Arc<TextBlock>> = None;

    let drained = loop {
        let Some(item) = stream.recv().await else {
            break Ok(());
        };
        let response = match item {
            Ok(response) => response,
            Err(e) => break Err(Error::from(e)),
        };
        let Some(candidate) = response.candidates().first() else {
            break Err(ProtocolError::NoCandidates.into());
        };

        for part in candidate.parts() {
            match part {
                Part::Text(text) if !text.is_empty() => {
                    let block = text_block.get_or_insert_with(|| {
                        let block = TextBlock::new();
                        block.set_streaming(true);
                        doc.add_block(block.clone());
                        block
                    });
                    block.append_text(text);
                }
                Part::FunctionCalls(calls) => pending.extend(calls.iter().cloned()),
                Part::Text(_) => {}
            }
        }
    };

    if let Some(block) = &text_block {
        if !block.text().ends_with('\n') {
            block.append_text("\n");
        }
        block.set_streaming(false);
    }

    drained.map(|()| pending)
}

/// Errors that already put their own block into the document.
fn already_rendered(e: &Error) -> bool {
    matches!(
        e,
        Error::MaxIterationsReached { .. } | Error::Protocol(ProtocolError::InvalidChoice(_))
    )
}
