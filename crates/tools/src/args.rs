//! Typed arguments for the tool families the model may call.

use kubeinteract_core::error::ToolError;
use serde_json::{Map, Value};

/// Arguments of a model-issued call, decoded per tool family.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolArgs {
    Kubectl {
        command: String,
        /// The model's own guess: "yes", "no" or "unknown"
        modifies_resource: Option<String>,
    },
    Bash {
        command: String,
    },
    /// A tool this crate has no typed view of
    Other(Map<String, Value>),
}

impl ToolArgs {
    pub fn parse(tool_name: &str, arguments: &Map<String, Value>) -> Result<Self, ToolError> {
        match tool_name {
            "kubectl" => Ok(ToolArgs::Kubectl {
                command: required_string(arguments, "command")?,
                modifies_resource: optional_string(arguments, "modifies_resource"),
            }),
            "bash" => Ok(ToolArgs::Bash {
                command: required_string(arguments, "command")?,
            }),
            _ => Ok(ToolArgs::Other(arguments.clone())),
        }
    }
}

fn required_string(arguments: &Map<String, Value>, key: &str) -> Result<String, ToolError> {
    match arguments.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must not be empty"
        ))),
        Some(other) => Err(ToolError::InvalidArguments(format!(
            "'{key}' must be a string, got {other}"
        ))),
        None => Err(ToolError::InvalidArguments(format!(
            "Missing '{key}' argument"
        ))),
    }
}

/// Strings are taken as-is; other scalars (e.g. a boolean) are stringified.
fn optional_string(arguments: &Map<String, Value>, key: &str) -> Option<String> {
    match arguments.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn parse_kubectl() {
        let parsed = ToolArgs::parse(
            "kubectl",
            &args(json!({
                "command": "kubectl get pods",
                "modifies_resource": "no",
                "reason": "list pods"
            })),
        )
        .unwrap();
        assert_eq!(
            parsed,
            ToolArgs::Kubectl {
                command: "kubectl get pods".into(),
                modifies_resource: Some("no".into()),
            }
        );
    }

    #[test]
    fn boolean_modifies_resource_is_stringified() {
        let parsed = ToolArgs::parse(
            "kubectl",
            &args(json!({"command": "kubectl delete pod x", "modifies_resource": true})),
        )
        .unwrap();
        assert!(matches!(
            parsed,
            ToolArgs::Kubectl { modifies_resource: Some(ref m), .. } if m == "true"
        ));
    }

    #[test]
    fn parse_bash() {
        let parsed = ToolArgs::parse("bash", &args(json!({"command": "ls -la"}))).unwrap();
        assert_eq!(parsed, ToolArgs::Bash { command: "ls -la".into() });
    }

    #[test]
    fn missing_command_is_invalid() {
        let err = ToolArgs::parse("kubectl", &Map::new()).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn non_string_command_is_invalid() {
        let err = ToolArgs::parse("bash", &args(json!({"command": 42}))).unwrap_err();
        assert!(err.to_string().contains("must be a string"));
    }

    #[test]
    fn unknown_tool_falls_back_to_map() {
        let raw = args(json!({"query": "pods"}));
        let parsed = ToolArgs::parse("search", &raw).unwrap();
        assert_eq!(parsed, ToolArgs::Other(raw));
    }
}
