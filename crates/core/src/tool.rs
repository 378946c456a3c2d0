//! Tool catalog: the abstraction over operator actions.
//!
//! The catalog tells the model which actions exist and turns a model-issued
//! function call into a [`ToolInvocation`]. Nothing runs until the invocation
//! is explicitly invoked, which the conversation loop only does after the
//! operator approved it.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::provider::FunctionDefinition;

/// Session resources handed to an approved invocation.
#[derive(Debug, Clone, Default)]
pub struct InvokeToolOptions {
    /// Path to the kubeconfig the session talks to
    pub kubeconfig: Option<PathBuf>,

    /// Private scratch directory for the session
    pub work_dir: PathBuf,
}

/// A parsed, not yet executed, tool call.
#[async_trait]
pub trait ToolInvocation: Send + Sync {
    /// Name of the tool this invocation belongs to.
    fn name(&self) -> &str;

    /// Human-readable rendering shown to the operator before confirmation.
    fn pretty_print(&self) -> String;

    /// Execute the call and return its output.
    async fn invoke_tool(
        &self,
        cancel: &CancellationToken,
        options: &InvokeToolOptions,
    ) -> std::result::Result<String, ToolError>;
}

/// The set of actions available to the model.
pub trait ToolCatalog: Send + Sync {
    /// All tool definitions, sorted by name.
    fn all_tools(&self) -> Vec<FunctionDefinition>;

    /// All tool names, sorted.
    fn names(&self) -> Vec<String> {
        self.all_tools().into_iter().map(|d| d.name).collect()
    }

    /// Turn a model-issued call into an invocation.
    fn parse_tool_invocation(
        &self,
        name: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<Box<dyn ToolInvocation>, ToolError>;
}

/// A single tool family that knows its schema and how to parse its calls.
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "kubectl", "bash").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the LLM).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Validate arguments and build an invocation.
    fn parse_invocation(
        &self,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<Box<dyn ToolInvocation>, ToolError>;

    /// Convert this tool into a FunctionDefinition for sending to the LLM.
    fn to_definition(&self) -> FunctionDefinition {
        FunctionDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Tools are kept ordered by name so definitions go to the model in a stable
/// order across sessions.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolCatalog for ToolRegistry {
    fn all_tools(&self) -> Vec<FunctionDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    fn parse_tool_invocation(
        &self,
        name: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<Box<dyn ToolInvocation>, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.parse_invocation(arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A simple test tool for unit tests.
    struct EchoTool {
        name: &'static str,
    }

    struct EchoInvocation {
        text: String,
    }

    #[async_trait]
    impl ToolInvocation for EchoInvocation {
        fn name(&self) -> &str {
            "echo"
        }

        fn pretty_print(&self) -> String {
            format!("echo {}", self.text)
        }

        async fn invoke_tool(
            &self,
            _cancel: &CancellationToken,
            _options: &InvokeToolOptions,
        ) -> std::result::Result<String, ToolError> {
            Ok(self.text.clone())
        }
    }

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" }
                },
                "required": ["text"]
            })
        }
        fn parse_invocation(
            &self,
            arguments: &serde_json::Map<String, serde_json::Value>,
        ) -> std::result::Result<Box<dyn ToolInvocation>, ToolError> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidArguments("Missing 'text' argument".into()))?;
            Ok(Box::new(EchoInvocation {
                text: text.to_string(),
            }))
        }
    }

    fn args(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn registry_register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { name: "echo" }));
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
    }

    #[test]
    fn registry_definitions_are_sorted() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { name: "zeta" }));
        registry.register(Box::new(EchoTool { name: "alpha" }));
        registry.register(Box::new(EchoTool { name: "mid" }));
        assert_eq!(registry.names(), vec!["alpha", "mid", "zeta"]);
    }

    #[tokio::test]
    async fn registry_parse_and_invoke() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { name: "echo" }));

        let invocation = registry
            .parse_tool_invocation("echo", &args(serde_json::json!({"text": "hello world"})))
            .unwrap();
        assert_eq!(invocation.pretty_print(), "echo hello world");

        let output = invocation
            .invoke_tool(&CancellationToken::new(), &InvokeToolOptions::default())
            .await
            .unwrap();
        assert_eq!(output, "hello world");
    }

    #[test]
    fn registry_parse_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .parse_tool_invocation("nonexistent", &serde_json::Map::new())
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[test]
    fn registry_parse_invalid_arguments() {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool { name: "echo" }));
        let err = registry
            .parse_tool_invocation("echo", &serde_json::Map::new())
            .err()
            .unwrap();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
