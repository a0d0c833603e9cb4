use lspx_core::ToolError;
use serde_json::{Value, json};

pub(crate) const STRUCTURED_SCHEMA_VERSION: u32 = 1;

pub(crate) fn structured_ok(tool: &str, server_id: Option<&str>, input: Value) -> Value {
    json!({
        "schema_version": STRUCTURED_SCHEMA_VERSION,
        "ok": true,
        "tool": tool,
        "server_id": server_id,
        "input": input,
    })
}

pub(crate) fn structured_error(
    tool: &str,
    server_id: Option<&str>,
    input: Option<Value>,
    kind: &str,
    message: &str,
) -> Value {
    json!({
        "schema_version": STRUCTURED_SCHEMA_VERSION,
        "ok": false,
        "tool": tool,
        "server_id": server_id,
        "input": input,
        "error": {
            "kind": kind,
            "message": message
        },
    })
}

/// Structured payload for a failed façade call. Transient failures carry a
/// `retryable` flag so agents can tell them apart from permanent ones.
pub(crate) fn structured_tool_error(tool: &str, input: Option<Value>, err: &ToolError) -> Value {
    let server_id = match err {
        ToolError::Unavailable { server_id, .. } | ToolError::Transient { server_id } => {
            Some(server_id.as_str())
        }
        _ => None,
    };
    let mut payload = structured_error(tool, server_id, input, err.kind(), &err.to_string());
    if let Some(error) = payload.get_mut("error").and_then(Value::as_object_mut) {
        error.insert("retryable".to_string(), Value::Bool(err.is_retryable()));
        if let ToolError::Unavailable { install_hint, .. } = err {
            error.insert(
                "install_hint".to_string(),
                Value::String(install_hint.clone()),
            );
        }
    }
    payload
}
