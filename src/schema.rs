//! Tool-Schema Index (§3.1, §3.3): a per-request, read-only view of each
//! tool's declared parameters, built once when `tools` is non-empty.

use crate::types::ToolDefinition;
use serde_json::Value;
use std::collections::HashMap;

/// `{names, types}` for one tool's `input_schema.properties`.
#[derive(Debug, Clone, Default)]
pub struct ToolSchemaInfo {
    pub names: std::collections::HashSet<String>,
    pub types: HashMap<String, String>,
}

impl ToolSchemaInfo {
    fn from_schema(schema: &Value) -> Self {
        let mut info = ToolSchemaInfo::default();
        let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
            return info;
        };
        for (name, definition) in properties {
            info.names.insert(name.clone());
            if let Some(type_str) = definition.get("type").and_then(Value::as_str) {
                info.types.insert(name.clone(), type_str.to_string());
            }
        }
        info
    }
}

/// Tool name → schema view, built once per request.
pub type ToolSchemaIndex = HashMap<String, ToolSchemaInfo>;

pub fn build_index(tools: &[ToolDefinition]) -> ToolSchemaIndex {
    tools
        .iter()
        .map(|tool| (tool.name.clone(), ToolSchemaInfo::from_schema(&tool.input_schema)))
        .collect()
}
