//! kubectl tool: run kubectl commands against the session's cluster.
//!
//! Commands that need an interactive terminal are refused with an
//! explanation instead of being started, since they would never return.

use async_trait::async_trait;
use kubeinteract_core::error::ToolError;
use kubeinteract_core::tool::{InvokeToolOptions, Tool, ToolInvocation};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::args::ToolArgs;
use crate::exec::run_shell;

pub struct KubectlTool;

impl Tool for KubectlTool {
    fn name(&self) -> &str {
        "kubectl"
    }

    fn description(&self) -> &str {
        "Executes a kubectl command against the user's Kubernetes cluster. \
         Use this tool only when you need to query or modify the state of the \
         user's Kubernetes cluster. Interactive commands (edit, attach, \
         port-forward, exec -it) are not supported."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The complete kubectl command to execute, including the kubectl prefix, e.g. 'kubectl get pods -n default'"
                },
                "modifies_resource": {
                    "type": "string",
                    "description": "Whether the command modifies a kubernetes resource: 'yes', 'no' or 'unknown'"
                }
            },
            "required": ["command"]
        })
    }

    fn parse_invocation(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Box<dyn ToolInvocation>, ToolError> {
        match ToolArgs::parse(self.name(), arguments)? {
            ToolArgs::Kubectl {
                command,
                modifies_resource,
            } => Ok(Box::new(KubectlInvocation {
                command: with_kubectl_prefix(&command),
                modifies_resource,
            })),
            other => Err(ToolError::InvalidArguments(format!(
                "unexpected arguments for kubectl: {other:?}"
            ))),
        }
    }
}

/// A parsed kubectl call awaiting confirmation.
#[derive(Debug, Clone)]
pub struct KubectlInvocation {
    command: String,
    modifies_resource: Option<String>,
}

#[async_trait]
impl ToolInvocation for KubectlInvocation {
    fn name(&self) -> &str {
        "kubectl"
    }

    /// The command, flagged when the model says it changes the cluster.
    fn pretty_print(&self) -> String {
        let modifies = self
            .modifies_resource
            .as_deref()
            .map(|m| m.trim().to_ascii_lowercase());
        match modifies.as_deref() {
            Some("yes" | "true") => format!("{} (modifies cluster resources)", self.command),
            Some("unknown") => format!("{} (may modify cluster resources)", self.command),
            _ => self.command.clone(),
        }
    }

    async fn invoke_tool(
        &self,
        cancel: &CancellationToken,
        options: &InvokeToolOptions,
    ) -> Result<String, ToolError> {
        if let Some(reason) = interactive_reason(&self.command) {
            info!(command = %self.command, "Refusing interactive kubectl command");
            return Ok(format!(
                "The command \"{}\" was not run: {reason}. Interactive commands are not \
                 supported; use a non-interactive alternative instead.",
                self.command
            ));
        }

        run_shell("kubectl", &self.command, cancel, options).await
    }
}

fn with_kubectl_prefix(command: &str) -> String {
    if command.split_whitespace().next() == Some("kubectl") {
        command.to_string()
    } else {
        format!("kubectl {command}")
    }
}

/// Why `command` would need an interactive terminal, if it would.
fn interactive_reason(command: &str) -> Option<&'static str> {
    let words: Vec<&str> = command.split_whitespace().collect();

    match subcommand(&words)? {
        "edit" => Some("'kubectl edit' opens an interactive editor"),
        "attach" => Some("'kubectl attach' attaches to a running container"),
        "port-forward" => Some("'kubectl port-forward' runs until interrupted"),
        "proxy" => Some("'kubectl proxy' runs until interrupted"),
        "exec" | "run" if words.iter().any(|w| is_tty_flag(w)) => {
            Some("the command requests an interactive terminal")
        }
        _ => None,
    }
}

/// The kubectl subcommand, skipping global flags and their values.
fn subcommand<'a>(words: &[&'a str]) -> Option<&'a str> {
    const FLAGS_WITH_VALUE: &[&str] = &[
        "-n",
        "--namespace",
        "--context",
        "--cluster",
        "--user",
        "--kubeconfig",
        "-s",
        "--server",
    ];

    let mut rest = words.iter().skip(1);
    while let Some(word) = rest.next() {
        if FLAGS_WITH_VALUE.contains(word) {
            rest.next();
        } else if !word.starts_with('-') {
            return Some(*word);
        }
    }
    None
}

fn is_tty_flag(word: &str) -> bool {
    matches!(
        word,
        "-i" | "-t" | "-it" | "-ti" | "--stdin" | "--tty" | "--stdin=true" | "--tty=true"
    )
}
