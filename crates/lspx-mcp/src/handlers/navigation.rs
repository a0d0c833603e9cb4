use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde_json::json;

use crate::{LspxMcpServer, PositionArgs, parse_arguments};

impl LspxMcpServer {
    pub(crate) async fn goto_definition(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let args: PositionArgs = parse_arguments(request.arguments)?;
        let input = json!({
            "file_path": args.file_path,
            "line": args.line,
            "character": args.character,
        });
        let outcome = self
            .lsp
            .goto_definition(&args.file_path, args.line, args.character)
            .await;
        Ok(self.text_result("goto_definition", input, outcome))
    }

    pub(crate) async fn find_references(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let args: PositionArgs = parse_arguments(request.arguments)?;
        let input = json!({
            "file_path": args.file_path,
            "line": args.line,
            "character": args.character,
        });
        let outcome = self
            .lsp
            .find_references(&args.file_path, args.line, args.character)
            .await;
        Ok(self.text_result("find_references", input, outcome))
    }
}
