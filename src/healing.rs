//! The three-phase Tool Healer (§4.2): argument-format recovery,
//! parameter-name correction, and parameter-type coercion. Every phase is a
//! pure function over a tool call's argument object plus the action log it
//! produced, so callers can record what happened without re-deriving it.

use crate::schema::ToolSchemaInfo;
use serde_json::{Map, Number, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum HealingAction {
    FormatRecovered { tool: String },
    FormatFallbackRaw { tool: String },
    ParamRenamed { tool: String, from: String, to: String },
    ParamCoerced { tool: String, param: String, from_type: String, to_type: String },
}

/// Phase 1 — argument format recovery. `args` is whatever the model produced
/// for `arguments`: already an object, a (possibly double-encoded) string,
/// or something else entirely.
pub fn heal_format(tool: &str, args: &Value) -> (Map<String, Value>, Vec<HealingAction>) {
    match args {
        Value::Object(map) => (map.clone(), Vec::new()),
        Value::String(s) => {
            if let Some(map) = try_parse_object(s) {
                return (map, Vec::new());
            }
            let unescaped = s.replace("\\\"", "\"");
            if let Some(map) = try_parse_object(&unescaped) {
                return (
                    map,
                    vec![HealingAction::FormatRecovered {
                        tool: tool.to_string(),
                    }],
                );
            }
            if s.len() >= 2 && s.starts_with('"') && s.ends_with('"') {
                if let Some(Value::String(inner)) = try_parse_value(s) {
                    if let Some(map) = try_parse_object(&inner) {
                        return (
                            map,
                            vec![HealingAction::FormatRecovered {
                                tool: tool.to_string(),
                            }],
                        );
                    }
                }
            }
            (raw_fallback(args), vec![HealingAction::FormatFallbackRaw { tool: tool.to_string() }])
        }
        other => (
            raw_fallback(other),
            vec![HealingAction::FormatFallbackRaw {
                tool: tool.to_string(),
            }],
        ),
    }
}

fn try_parse_value(s: &str) -> Option<Value> {
    serde_json::from_str(s).ok()
}

fn try_parse_object(s: &str) -> Option<Map<String, Value>> {
    match try_parse_value(s) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn raw_fallback(original: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("raw".to_string(), original.clone());
    map
}

/// Phase 2 — parameter-name correction. Unique substring matches against
/// the schema's property names get renamed; ambiguous or unmatched keys are
/// left alone.
pub fn heal_param_names(
    tool: &str,
    args: Map<String, Value>,
    schema: Option<&ToolSchemaInfo>,
) -> (Map<String, Value>, Vec<HealingAction>) {
    let Some(schema) = schema else {
        return (args, Vec::new());
    };
    if args.keys().all(|k| schema.names.contains(k)) {
        return (args, Vec::new());
    }

    let mut actions = Vec::new();
    let mut renamed = Map::new();
    for (key, value) in args {
        if schema.names.contains(&key) {
            renamed.insert(key, value);
            continue;
        }
        let candidates: Vec<&String> = schema
            .names
            .iter()
            .filter(|p| p.contains(key.as_str()) || key.contains(p.as_str()))
            .collect();
        if candidates.len() == 1 {
            let new_key = candidates[0].clone();
            actions.push(HealingAction::ParamRenamed {
                tool: tool.to_string(),
                from: key,
                to: new_key.clone(),
            });
            renamed.insert(new_key, value);
        } else {
            renamed.insert(key, value);
        }
    }
    (renamed, actions)
}

/// Phase 3 — parameter-type coercion, driven by the schema's declared type
/// for each surviving key.
pub fn heal_param_types(
    tool: &str,
    args: Map<String, Value>,
    schema: Option<&ToolSchemaInfo>,
) -> (Map<String, Value>, Vec<HealingAction>) {
    let Some(schema) = schema else {
        return (args, Vec::new());
    };

    let mut actions = Vec::new();
    let mut coerced = Map::new();
    for (key, value) in args {
        if value.is_null() {
            coerced.insert(key, value);
            continue;
        }
        let Some(declared_type) = schema.types.get(&key) else {
            coerced.insert(key, value);
            continue;
        };
        match coerce(declared_type, &value) {
            Some((new_value, from_type)) => {
                actions.push(HealingAction::ParamCoerced {
                    tool: tool.to_string(),
                    param: key.clone(),
                    from_type,
                    to_type: declared_type.clone(),
                });
                coerced.insert(key, new_value);
            }
            None => {
                coerced.insert(key, value);
            }
        }
    }
    (coerced, actions)
}

/// Attempts one coercion for `value` towards `declared_type`. Returns the
/// new value and the observed source type name on success.
fn coerce(declared_type: &str, value: &Value) -> Option<(Value, String)> {
    match (declared_type, value) {
        ("string", Value::Array(items)) => {
            let joined = items
                .iter()
                .map(value_as_join_fragment)
                .collect::<Vec<_>>()
                .join(", ");
            Some((Value::String(joined), "array".to_string()))
        }
        ("string", Value::Number(n)) => Some((Value::String(n.to_string()), "number".to_string())),
        ("number" | "integer", Value::String(s)) => s
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(|n| (Value::Number(n), "string".to_string())),
        ("boolean", Value::String(s)) => match s.to_lowercase().as_str() {
            "true" => Some((Value::Bool(true), "string".to_string())),
            "false" => Some((Value::Bool(false), "string".to_string())),
            _ => None,
        },
        _ => None,
    }
}

fn value_as_join_fragment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs all three phases over a freshly-produced model tool call.
pub fn heal_tool_call(
    tool: &str,
    raw_args: &Value,
    schema: Option<&ToolSchemaInfo>,
) -> (Map<String, Value>, Vec<HealingAction>) {
    let (args, mut actions) = heal_format(tool, raw_args);
    let (args, more) = heal_param_names(tool, args, schema);
    actions.extend(more);
    let (args, more) = heal_param_types(tool, args, schema);
    actions.extend(more);
    (args, actions)
}

/// Runs Phases 2-3 over an already-structured argument object, used by the
/// History Healer to re-canonicalize prior turns.
pub fn heal_existing_input(
    tool: &str,
    args: Map<String, Value>,
    schema: Option<&ToolSchemaInfo>,
) -> (Map<String, Value>, Vec<HealingAction>) {
    let (args, mut actions) = heal_param_names(tool, args, schema);
    let (args, more) = heal_param_types(tool, args, schema);
    actions.extend(more);
    (args, actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::build_index;
    use crate::types::ToolDefinition;
    use serde_json::json;

    fn glob_schema() -> ToolSchemaInfo {
        let tools = vec![ToolDefinition {
            name: "Glob".to_string(),
            description: None,
            input_schema: json!({"properties": {"pattern": {"type": "string"}, "path": {"type": "string"}}}),
        }];
        build_index(&tools).remove("Glob").unwrap()
    }

    #[test]
    fn phase1_object_passes_through() {
        let args = json!({"file": "/tmp/a"});
        let (healed, actions) = heal_format("Read", &args);
        assert_eq!(healed.get("file").unwrap(), "/tmp/a");
        assert!(actions.is_empty());
    }

    #[test]
    fn phase1_direct_json_string_parses() {
        let args = Value::String(r#"{"file":"/tmp/a"}"#.to_string());
        let (healed, _) = heal_format("Read", &args);
        assert_eq!(healed.get("file").unwrap(), "/tmp/a");
    }

    #[test]
    fn phase1_escaped_quotes_are_repaired() {
        let args = Value::String(r#"{\"file\":\"/tmp/a\"}"#.to_string());
        let (healed, actions) = heal_format("Read", &args);
        assert_eq!(healed.get("file").unwrap(), "/tmp/a");
        assert!(matches!(actions[0], HealingAction::FormatRecovered { .. }));
    }

    #[test]
    fn phase1_double_encoded_string_is_unwrapped() {
        let inner = r#"{"file":"/tmp/a"}"#;
        let once = serde_json::to_string(inner).unwrap();
        let args = Value::String(once);
        let (healed, _) = heal_format("Read", &args);
        assert_eq!(healed.get("file").unwrap(), "/tmp/a");
    }

    #[test]
    fn phase1_unrecoverable_wraps_raw() {
        let args = Value::String("not json at all {{{".to_string());
        let (healed, actions) = heal_format("Read", &args);
        assert_eq!(healed.get("raw").unwrap(), &args);
        assert!(matches!(actions[0], HealingAction::FormatFallbackRaw { .. }));
    }

    #[test]
    fn phase2_renames_unique_substring_match() {
        let schema = glob_schema();
        let mut args = Map::new();
        args.insert("patt".to_string(), json!("*.ts"));
        let (healed, actions) = heal_param_names("Glob", args, Some(&schema));
        assert!(healed.contains_key("pattern"));
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn phase2_leaves_ambiguous_keys_unchanged() {
        let schema = glob_schema();
        let mut args = Map::new();
        args.insert("p".to_string(), json!("*.ts"));
        let (healed, actions) = heal_param_names("Glob", args, Some(&schema));
        assert!(healed.contains_key("p"));
        assert!(actions.is_empty());
    }

    #[test]
    fn phase2_identity_when_all_keys_known() {
        let schema = glob_schema();
        let mut args = Map::new();
        args.insert("pattern".to_string(), json!("*.ts"));
        let (healed, actions) = heal_param_names("Glob", args, Some(&schema));
        assert!(healed.contains_key("pattern"));
        assert!(actions.is_empty());
    }

    #[test]
    fn phase3_array_to_string_joins_with_comma_space() {
        let schema = glob_schema();
        let mut args = Map::new();
        args.insert("pattern".to_string(), json!(["*.ts", "*.js"]));
        let (healed, actions) = heal_param_types("Glob", args, Some(&schema));
        assert_eq!(healed.get("pattern").unwrap(), "*.ts, *.js");
        assert_eq!(actions.len(), 1);
    }

    #[test]
    fn phase3_string_to_boolean() {
        let tools = vec![ToolDefinition {
            name: "Toggle".to_string(),
            description: None,
            input_schema: json!({"properties": {"flag": {"type": "boolean"}}}),
        }];
        let schema = build_index(&tools).remove("Toggle").unwrap();
        let mut args = Map::new();
        args.insert("flag".to_string(), json!("TRUE"));
        let (healed, _) = heal_param_types("Toggle", args, Some(&schema));
        assert_eq!(healed.get("flag").unwrap(), &Value::Bool(true));
    }

    #[test]
    fn phase3_identity_when_types_already_match() {
        let schema = glob_schema();
        let mut args = Map::new();
        args.insert("pattern".to_string(), json!("*.ts"));
        let (healed, actions) = heal_param_types("Glob", args, Some(&schema));
        assert_eq!(healed.get("pattern").unwrap(), "*.ts");
        assert!(actions.is_empty());
    }
}
