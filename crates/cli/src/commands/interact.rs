//! `kubeinteract interact`: REPL or single-query mode.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;
use kubeinteract_agent::Conversation;
use kubeinteract_config::AppConfig;
use kubeinteract_core::InputError;
use kubeinteract_ui::{Document, InputTextBlock, TerminalUi, TextBlock};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{EndpointArgs, load_config};

#[derive(Args, Debug, Default)]
pub struct InteractArgs {
    #[command(flatten)]
    pub endpoint: EndpointArgs,

    /// Model id to chat with
    #[arg(long)]
    pub model_id: Option<String>,

    /// Kubeconfig handed to kubectl (default: $KUBECONFIG or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<PathBuf>,

    /// Use the model's native function calling instead of the JSON prompt format
    #[arg(long)]
    pub no_shim: bool,

    /// Maximum model calls per query
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Run a single query and exit instead of starting the REPL
    #[arg(short, long)]
    pub query: Option<String>,
}

impl InteractArgs {
    fn apply(&self, config: &mut AppConfig) {
        self.endpoint.apply(config);
        if let Some(model) = &self.model_id {
            config.model = Some(model.clone());
        }
        if let Some(kubeconfig) = &self.kubeconfig {
            config.kubeconfig = Some(kubeconfig.clone());
        }
        if self.no_shim {
            config.enable_tool_use_shim = false;
        }
        if let Some(max) = self.max_iterations {
            config.max_iterations = max;
        }
    }
}

/// What the operator typed at the prompt.
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Empty,
    Exit,
    Reset,
    Clear,
    Query(&'a str),
}

impl<'a> Command<'a> {
    fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            "exit" | "quit" => Command::Exit,
            "reset" => Command::Reset,
            "clear" => Command::Clear,
            query => Command::Query(query),
        }
    }
}

pub async fn run(
    args: InteractArgs,
    cancel: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(&args.endpoint)?;
    args.apply(&mut config);
    config.validate()?;

    let (api_url, model) = config.require_model_endpoint()?;
    let (api_url, model) = (api_url.to_string(), model.to_string());

    let llm = kubeinteract_providers::build_from_config(&config)?;
    let tools = Arc::new(kubeinteract_tools::default_registry());

    let mut conversation = Conversation::new(llm, &model, tools)
        .with_kubeconfig(config.kubeconfig_path())
        .with_tool_use_shim(config.enable_tool_use_shim)
        .with_retry(config.retry.clone())
        .with_max_iterations(config.max_iterations);

    let ui = TerminalUi::stdio();
    let doc = Document::new();
    let _subscription = ui.subscribe(&doc);
    conversation.init(doc.clone())?;

    if let Some(query) = args.query {
        let result = conversation.run_one_round(&cancel, &query).await;
        conversation.close();
        println!();
        return result.map_err(Into::into);
    }

    doc.add_block(TextBlock::with_text(format!(
        "\n  Hey there, what can I help you with today?\n\n  \
         Model endpoint: {api_url}\n  \
         Model:          {model}\n  \
         Type 'exit' to quit, 'reset' to start over, 'clear' to clear the screen.\n"
    )));

    let result = repl(&mut conversation, &ui, &doc, &cancel).await;
    conversation.close();

    println!();
    println!("  Goodbye!");
    println!();

    result
}

async fn repl(
    conversation: &mut Conversation,
    ui: &TerminalUi,
    doc: &Document,
    cancel: &CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        let input = InputTextBlock::new();
        doc.add_block(input.clone());

        let line = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            line = input.observable().wait() => line,
        };
        let line = match line {
            Ok(line) => line,
            Err(InputError::EndOfInput) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        match Command::parse(&line) {
            Command::Empty => {}
            Command::Exit => return Ok(()),
            Command::Clear => ui.clear_screen(),
            Command::Reset => {
                ui.clear_screen();
                conversation.init(doc.clone())?;
            }
            Command::Query(query) => {
                if let Err(e) = conversation.run_one_round(cancel, query).await {
                    // already shown to the operator as an error block
                    debug!(error = %e, "Round failed");
                    if cancel.is_cancelled() {
                        return Ok(());
                    }
                }
            }
        }
    }
}
