use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content};
use serde_json::{Value, json};

use crate::structured::structured_ok;
use crate::workspace_edit::format_apply_result;
use crate::{LspxMcpServer, RenameArgs, parse_arguments, tool_error_result};

impl LspxMcpServer {
    pub(crate) async fn rename(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let args: RenameArgs = parse_arguments(request.arguments)?;
        let new_name = args.new_name.trim();
        if new_name.is_empty() {
            return Err(McpError::invalid_params("new_name must not be empty", None));
        }
        let input = json!({
            "file_path": args.file_path,
            "line": args.line,
            "character": args.character,
            "new_name": new_name,
        });

        let result = match self
            .lsp
            .rename_symbol(&args.file_path, args.line, args.character, new_name)
            .await
        {
            Ok(result) => result,
            Err(err) => return Ok(tool_error_result("rename", Some(input), &err)),
        };

        let text = format_apply_result(&result);
        let mut structured = structured_ok("rename", None, input);
        if let Some(obj) = structured.as_object_mut() {
            obj.insert("ok".to_string(), Value::Bool(result.success));
            obj.insert("result".to_string(), json!(result));
        }

        Ok(CallToolResult {
            content: vec![Content::text(text)],
            structured_content: Some(structured),
            is_error: Some(!result.success),
            meta: None,
        })
    }
}
