use rmcp::ErrorData as McpError;
use rmcp::model::{CallToolRequestParam, CallToolResult, Content};
use serde_json::json;

use crate::structured::structured_ok;
use crate::{ListServersArgs, LspxMcpServer, parse_arguments};

impl LspxMcpServer {
    pub(crate) async fn list_servers(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, McpError> {
        let _args: ListServersArgs = parse_arguments(request.arguments)?;

        let statuses = self.lsp.registry().statuses();
        let running = self.lsp.pool().snapshot();

        let mut lines = Vec::with_capacity(statuses.len() + running.len() + 1);
        for s in &statuses {
            let state = if s.installed {
                "installed".to_string()
            } else {
                format!("not installed ({})", s.install_hint)
            };
            lines.push(format!(
                "{} [{}]: {}",
                s.id,
                s.extensions
                    .iter()
                    .map(|e| format!(".{e}"))
                    .collect::<Vec<_>>()
                    .join(", "),
                state
            ));
        }
        if !running.is_empty() {
            lines.push(format!("{} pooled server(s):", running.len()));
            for h in &running {
                lines.push(format!(
                    "  - {} at {} ({:?}, refs={})",
                    h.server_id,
                    h.root.display(),
                    h.phase,
                    h.ref_count
                ));
            }
        }

        let mut structured = structured_ok("list_servers", None, json!({}));
        if let Some(obj) = structured.as_object_mut() {
            obj.insert("workspace_root".to_string(), json!(self.lsp.workspace_base()));
            obj.insert("read_only".to_string(), json!(self.read_only));
            obj.insert("servers".to_string(), json!(statuses));
            obj.insert("pool".to_string(), json!(running));
        }

        Ok(CallToolResult {
            content: vec![Content::text(lines.join("\n"))],
            structured_content: Some(structured),
            is_error: Some(false),
            meta: None,
        })
    }
}
