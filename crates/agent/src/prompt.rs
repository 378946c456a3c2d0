//! System prompt rendering.

use kubeinteract_core::provider::FunctionDefinition;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.txt");
const SHIM_FORMAT: &str = include_str!("prompts/shim_format.txt");
const NATIVE_FORMAT: &str = "Call the tools through function calling. When you have the final \
answer, reply to the user in plain text without calling a tool.";

/// Render the system prompt for a session with the given tools.
///
/// `definitions` are expected sorted by name. With the shim the model is
/// told to answer in the fenced JSON format instead of calling functions.
pub fn system_prompt(
    definitions: &[FunctionDefinition],
    enable_tool_use_shim: bool,
) -> Result<String, serde_json::Error> {
    let tools = serde_json::to_string_pretty(definitions)?;
    let names = definitions
        .iter()
        .map(|d| d.name.as_str())
        .collect::<Vec<_>>()
        .join(", ");

    let format = if enable_tool_use_shim {
        SHIM_FORMAT.replace("{{TOOL_NAMES}}", &names)
    } else {
        NATIVE_FORMAT.to_string()
    };

    Ok(SYSTEM_TEMPLATE
        .replace("{{TOOLS}}", &tools)
        .replace("{{RESPONSE_FORMAT}}", format.trim_end()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definitions() -> Vec<FunctionDefinition> {
        vec![
            FunctionDefinition {
                name: "bash".into(),
                description: "Executes a bash command".into(),
                parameters: json!({"type": "object"}),
            },
            FunctionDefinition {
                name: "kubectl".into(),
                description: "Executes a kubectl command".into(),
                parameters: json!({"type": "object"}),
            },
        ]
    }

    #[test]
    fn shim_prompt_describes_the_json_format() {
        let prompt = system_prompt(&definitions(), true).unwrap();
        assert!(prompt.contains("```json"));
        assert!(prompt.contains("one of [bash, kubectl]"));
        assert!(prompt.contains("\"name\": \"kubectl\""));
        assert!(prompt.contains("Executes a bash command"));
        assert!(!prompt.contains("{{"));
    }

    #[test]
    fn native_prompt_has_no_fenced_format() {
        let prompt = system_prompt(&definitions(), false).unwrap();
        assert!(!prompt.contains("```json"));
        assert!(prompt.contains("function calling"));
        assert!(!prompt.contains("{{"));
    }
}
