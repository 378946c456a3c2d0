//! Built-in tool catalog for kubeinteract.
//!
//! Two tool families are available to the model:
//! - `kubectl`: run a kubectl command against the session's cluster
//! - `bash`: run a shell command in the session's working directory
//!
//! Both run only after the operator approved the call.

pub mod args;
pub mod bash;
pub mod exec;
pub mod kubectl;

use kubeinteract_core::tool::ToolRegistry;

pub use args::ToolArgs;
pub use bash::BashTool;
pub use kubectl::KubectlTool;

/// Create a tool registry with all built-in tools.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(KubectlTool));
    registry.register(Box::new(BashTool));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeinteract_core::tool::ToolCatalog;

    #[test]
    fn default_registry_lists_tools_sorted() {
        let registry = default_registry();
        assert_eq!(registry.names(), vec!["bash", "kubectl"]);
    }

    #[test]
    fn unknown_tool_is_not_found() {
        let registry = default_registry();
        let result = registry.parse_tool_invocation("helm", &serde_json::Map::new());
        assert!(matches!(
            result,
            Err(kubeinteract_core::ToolError::NotFound(_))
        ));
    }
}
