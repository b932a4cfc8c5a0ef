//! Declared tools the model may call during reasoning.
//!
//! The tool set is fixed and small: integer addition and subtraction. The
//! model can only request tools from the declared schemas, so an undeclared
//! tool name is unreachable in normal operation; malformed operands are the
//! recoverable failure mode.

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::llm::ToolSchema;

#[async_trait]
pub trait AgentTool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Parameter schema (JSON Schema format).
    fn parameters_schema(&self) -> JsonValue;
    async fn execute(&self, arguments: &JsonValue) -> Result<String>;
}

/// Registry of declared tools.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn AgentTool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            tools: HashMap::new(),
        };
        registry.register(Arc::new(AddTool));
        registry.register(Arc::new(SubtractTool));
        registry
    }

    pub fn register(&mut self, tool: Arc<dyn AgentTool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn AgentTool>> {
        self.tools.get(name).cloned()
    }

    /// Schemas declared to the generation service.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|tool| ToolSchema {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn two_integer_schema(a_desc: &str, b_desc: &str) -> JsonValue {
    json!({
        "type": "object",
        "properties": {
            "a": { "type": "integer", "description": a_desc },
            "b": { "type": "integer", "description": b_desc }
        },
        "required": ["a", "b"]
    })
}

/// Reject anything that is not a JSON integer; floats and numeric strings
/// both count as malformed payloads the model must correct.
fn integer_arg(tool: &str, arguments: &JsonValue, key: &str) -> Result<i64> {
    match arguments.get(key) {
        Some(value) => value.as_i64().ok_or_else(|| Error::ToolArgument {
            tool: tool.to_string(),
            reason: format!("'{}' must be an integer, got {}", key, value),
        }),
        None => Err(Error::ToolArgument {
            tool: tool.to_string(),
            reason: format!("missing required argument '{}'", key),
        }),
    }
}

pub struct AddTool;

#[async_trait]
impl AgentTool for AddTool {
    fn name(&self) -> &str {
        "add"
    }

    fn description(&self) -> &str {
        "Add two integers and return the sum."
    }

    fn parameters_schema(&self) -> JsonValue {
        two_integer_schema("First addend", "Second addend")
    }

    async fn execute(&self, arguments: &JsonValue) -> Result<String> {
        let a = integer_arg(self.name(), arguments, "a")?;
        let b = integer_arg(self.name(), arguments, "b")?;
        let sum = a.checked_add(b).ok_or_else(|| Error::ToolArgument {
            tool: self.name().to_string(),
            reason: "integer overflow".to_string(),
        })?;
        Ok(sum.to_string())
    }
}

pub struct SubtractTool;

#[async_trait]
impl AgentTool for SubtractTool {
    fn name(&self) -> &str {
        "subtract"
    }

    fn description(&self) -> &str {
        "Subtract the second integer from the first and return the difference."
    }

    fn parameters_schema(&self) -> JsonValue {
        two_integer_schema("Minuend", "Subtrahend")
    }

    async fn execute(&self, arguments: &JsonValue) -> Result<String> {
        let a = integer_arg(self.name(), arguments, "a")?;
        let b = integer_arg(self.name(), arguments, "b")?;
        let difference = a.checked_sub(b).ok_or_else(|| Error::ToolArgument {
            tool: self.name().to_string(),
            reason: "integer overflow".to_string(),
        })?;
        Ok(difference.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_two_and_three_is_five() {
        let result = AddTool.execute(&json!({ "a": 2, "b": 3 })).await.unwrap();
        assert_eq!(result, "5");
    }

    #[tokio::test]
    async fn subtract_ten_and_four_is_six() {
        let result = SubtractTool
            .execute(&json!({ "a": 10, "b": 4 }))
            .await
            .unwrap();
        assert_eq!(result, "6");
    }

    #[tokio::test]
    async fn string_operand_is_a_tool_argument_error() {
        let err = AddTool.execute(&json!({ "a": "x", "b": 3 })).await.unwrap_err();
        assert!(matches!(err, Error::ToolArgument { tool, .. } if tool == "add"));
    }

    #[tokio::test]
    async fn float_operand_is_rejected() {
        let err = AddTool.execute(&json!({ "a": 1.5, "b": 3 })).await.unwrap_err();
        assert!(matches!(err, Error::ToolArgument { .. }));
    }

    #[tokio::test]
    async fn missing_operand_is_rejected() {
        let err = SubtractTool.execute(&json!({ "a": 1 })).await.unwrap_err();
        assert!(matches!(err, Error::ToolArgument { .. }));
    }

    #[test]
    fn registry_declares_exactly_the_fixed_tool_set() {
        let registry = ToolRegistry::new();
        let schemas = registry.schemas();
        let names: Vec<&str> = schemas.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["add", "subtract"]);
        assert!(registry.get("add").is_some());
        assert!(registry.get("multiply").is_none());
    }
}
