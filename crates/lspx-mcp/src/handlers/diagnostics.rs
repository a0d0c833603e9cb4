use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolRequestParam, CallToolResult};
use serde_json::json;

use crate::format::SeverityFilter;
use crate::{DiagnosticsArgs, LspxMcpServer, parse_arguments};

impl LspxMcpServer {
    pub(crate) async fn diagnostics(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let args: DiagnosticsArgs = parse_arguments(request.arguments)?;
        let severity = match args.severity.as_deref() {
            Some(raw) => raw
                .parse::<SeverityFilter>()
                .map_err(|e| McpError::invalid_params(e, None))?,
            None => SeverityFilter::All,
        };
        let input = json!({
            "file_path": args.file_path,
            "severity": args.severity.as_deref().unwrap_or("all"),
        });
        let outcome = self.lsp.diagnostics(&args.file_path, severity).await;
        Ok(self.text_result("diagnostics", input, outcome))
    }
}
