//! bash tool: run a shell command in the session's working directory.

use async_trait::async_trait;
use kubeinteract_core::error::ToolError;
use kubeinteract_core::tool::{InvokeToolOptions, Tool, ToolInvocation};
use tokio_util::sync::CancellationToken;

use crate::args::ToolArgs;
use crate::exec::run_shell;

pub struct BashTool;

impl Tool for BashTool {
    fn name(&self) -> &str {
        "bash"
    }

    fn description(&self) -> &str {
        "Executes a bash command. Use this tool only when you need to execute a \
         shell command, for example to post-process kubectl output or inspect \
         files in the working directory."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The bash command to execute"
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
            ToolArgs::Bash { command } => Ok(Box::new(BashInvocation { command })),
            other => Err(ToolError::InvalidArguments(format!(
                "unexpected arguments for bash: {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BashInvocation {
    command: String,
}

#[async_trait]
impl ToolInvocation for BashInvocation {
    fn name(&self) -> &str {
        "bash"
    }

    fn pretty_print(&self) -> String {
        self.command.clone()
    }

    async fn invoke_tool(
        &self,
        cancel: &CancellationToken,
        options: &InvokeToolOptions,
    ) -> Result<String, ToolError> {
        run_shell("bash", &self.command, cancel, options).await
    }
}
