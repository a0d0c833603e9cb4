use std::borrow::Cow;
use std::sync::Arc;

use rmcp::model::{JsonObject, Tool};
use serde_json::json;

pub(crate) fn tool_goto_definition() -> Tool {
    Tool::new(
        Cow::Borrowed("goto_definition"),
        Cow::Borrowed(
            "Jump to the definition of the symbol at a 1-based position (line/character). Returns path:line:col lines.",
        ),
        Arc::new(schema(position_schema(json!({})))),
    )
}

pub(crate) fn tool_find_references() -> Tool {
    Tool::new(
        Cow::Borrowed("find_references"),
        Cow::Borrowed(
            "Find all references (including the declaration) to the symbol at a 1-based position. At most 200 are listed.",
        ),
        Arc::new(schema(position_schema(json!({})))),
    )
}

pub(crate) fn tool_diagnostics() -> Tool {
    Tool::new(
        Cow::Borrowed("diagnostics"),
        Cow::Borrowed(
            "Get errors and warnings the language server reports for a file, optionally filtered by severity.",
        ),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {
                "file_path": { "type": "string" },
                "severity": {
                    "type": "string",
                    "enum": ["error", "warning", "information", "hint", "all"],
                    "default": "all"
                }
            },
            "required": ["file_path"],
            "additionalProperties": false
        }))),
    )
}

pub(crate) fn tool_rename() -> Tool {
    Tool::new(
        Cow::Borrowed("rename"),
        Cow::Borrowed(
            "Rename the symbol at a 1-based position across the workspace and apply the edit to disk.",
        ),
        Arc::new(schema(position_schema(json!({
            "new_name": { "type": "string", "minLength": 1 }
        })))),
    )
}

pub(crate) fn tool_list_servers() -> Tool {
    Tool::new(
        Cow::Borrowed("list_servers"),
        Cow::Borrowed(
            "List known language servers, whether each is installed, and the running server pool.",
        ),
        Arc::new(schema(json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        }))),
    )
}

/// `file_path`, `line`, `character` plus any `extra` properties (all required).
fn position_schema(extra: serde_json::Value) -> serde_json::Value {
    let mut properties = json!({
        "file_path": { "type": "string" },
        "line": { "type": "integer", "minimum": 1 },
        "character": { "type": "integer", "minimum": 1 }
    });
    let mut required = vec!["file_path".to_string(), "line".to_string(), "character".to_string()];
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        for (name, value) in extra {
            props.insert(name.clone(), value.clone());
            required.push(name.clone());
        }
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

fn schema(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}
