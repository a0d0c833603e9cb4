//! MCP server exposing language-server navigation and refactoring tools.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use lspx_core::ToolError;
use lspx_core::config::load_config;
use lspx_lsp::{ClientPool, PoolOptions, StdioLauncher};
use rmcp::ErrorData as McpError;
use rmcp::ServiceExt;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, JsonObject, ListToolsResult,
    PaginatedRequestParam, ServerCapabilities, ServerInfo, Tool,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

mod format;
mod handlers;
mod operations;
mod structured;
mod tool_schemas;
mod tools;
mod workspace_edit;

pub use format::SeverityFilter;
pub use operations::LspTools;
pub use workspace_edit::{ApplyResult, apply_workspace_edit, format_apply_result};

use structured::{structured_error, structured_ok, structured_tool_error};

#[derive(Debug, Clone, Default)]
pub struct McpOptions {
    pub config_path: Option<PathBuf>,
    pub workspace_root: Option<PathBuf>,
    /// Forces read-only mode regardless of `mcp.read_only` in the config.
    pub read_only: bool,
}

pub async fn run_stdio() -> Result<()> {
    run_stdio_with_options(McpOptions::default()).await
}

/// Serves MCP over stdin/stdout until the client disconnects, then stops
/// every pooled language server.
pub async fn run_stdio_with_options(options: McpOptions) -> Result<()> {
    let service = LspxMcpServer::new(options)?;
    let pool = service.lsp.pool().clone();
    let reaper = pool.start_idle_reaper();

    let outcome = match service
        .serve((tokio::io::stdin(), tokio::io::stdout()))
        .await
    {
        Ok(running) => running.waiting().await.map(drop).map_err(anyhow::Error::from),
        Err(err) => Err(anyhow::Error::from(err)),
    };

    if let Some(reaper) = reaper {
        reaper.abort();
    }
    pool.shutdown_all().await;
    info!("MCP session ended; language servers stopped");
    outcome
}

#[derive(Clone)]
pub(crate) struct LspxMcpServer {
    tools: Arc<Vec<Tool>>,
    lsp: Arc<LspTools>,
    read_only: bool,
}

impl LspxMcpServer {
    fn new(options: McpOptions) -> Result<Self> {
        let loaded = load_config(
            options.config_path.as_deref(),
            options.workspace_root.as_deref(),
        )?;
        let config = loaded.config;
        let pool_config = config.pool();
        let read_only = options.read_only || config.read_only();

        info!(
            "lspx MCP server starting workspace_root={} config_source={:?} read_only={}",
            loaded.workspace_root.display(),
            loaded.source,
            read_only
        );

        let launcher = Arc::new(StdioLauncher {
            initialize_timeout: pool_config.initialize_timeout(),
            request_timeout: pool_config.request_timeout(),
        });
        let pool = Arc::new(ClientPool::new(
            launcher,
            PoolOptions {
                acquire_timeout: pool_config.acquire_timeout(),
                idle_shutdown: pool_config.idle_shutdown(),
            },
        ));
        let lsp = LspTools::new(
            config.registry(),
            pool,
            loaded.workspace_root,
            pool_config.diagnostics_wait(),
        );

        let tools = tools::filter_tools_by_config(tools::all_tools(), config.mcp.as_ref());
        Ok(Self::from_parts(lsp, tools, read_only))
    }

    fn from_parts(lsp: LspTools, tools: Vec<Tool>, read_only: bool) -> Self {
        let tools = if read_only {
            tools::filter_tools_read_only(tools)
        } else {
            tools
        };
        Self {
            tools: Arc::new(tools),
            lsp: Arc::new(lsp),
            read_only,
        }
    }

    async fn dispatch(&self, request: CallToolRequestParam) -> Result<CallToolResult, McpError> {
        let tool = request.name.to_string();
        let input = request.arguments.clone().map(Value::Object);

        if self.read_only && tools::WRITE_TOOLS.contains(&tool.as_str()) {
            let message = format!("Tool '{tool}' is disabled in read-only mode.");
            return Ok(CallToolResult {
                content: vec![Content::text(message.clone())],
                structured_content: Some(structured_error(
                    &tool, None, input, "read_only", &message,
                )),
                is_error: Some(true),
                meta: None,
            });
        }

        let result = match tool.as_str() {
            "goto_definition" => self.goto_definition(request).await,
            "find_references" => self.find_references(request).await,
            "diagnostics" => self.diagnostics(request).await,
            "rename" => self.rename(request).await,
            "list_servers" => self.list_servers(request).await,
            other => Err(McpError::invalid_params(
                format!("unknown tool: {other}"),
                None,
            )),
        };

        match result {
            Ok(r) => Ok(r),
            Err(err) => Ok(mcp_error_to_call_tool_result(&tool, input, err)),
        }
    }

    /// Wraps a façade outcome: rendered text on success, the error's text
    /// and kind on failure.
    fn text_result(
        &self,
        tool: &str,
        input: Value,
        outcome: Result<String, ToolError>,
    ) -> CallToolResult {
        match outcome {
            Ok(text) => {
                let mut structured = structured_ok(tool, None, input);
                if let Some(obj) = structured.as_object_mut() {
                    obj.insert("text".to_string(), Value::String(text.clone()));
                }
                CallToolResult {
                    content: vec![Content::text(text)],
                    structured_content: Some(structured),
                    is_error: Some(false),
                    meta: None,
                }
            }
            Err(err) => tool_error_result(tool, Some(input), &err),
        }
    }
}

pub(crate) fn tool_error_result(tool: &str, input: Option<Value>, err: &ToolError) -> CallToolResult {
    warn!("tool {tool} failed ({}): {err}", err.kind());
    CallToolResult {
        content: vec![Content::text(err.to_string())],
        structured_content: Some(structured_tool_error(tool, input, err)),
        is_error: Some(true),
        meta: None,
    }
}

fn mcp_error_kind_name(code: i32) -> &'static str {
    match code {
        -32600 => "invalid_request",
        -32601 => "method_not_found",
        -32602 => "invalid_params",
        -32603 => "internal_error",
        -32700 => "parse_error",
        _ => "mcp_error",
    }
}

fn mcp_error_to_call_tool_result(tool: &str, input: Option<Value>, err: McpError) -> CallToolResult {
    let message = err.message.to_string();
    let mut structured = structured_error(
        tool,
        None,
        input,
        mcp_error_kind_name(err.code.0),
        &message,
    );
    if let Some(error) = structured.get_mut("error").and_then(Value::as_object_mut) {
        error.insert("code".to_string(), Value::from(err.code.0));
    }
    CallToolResult {
        content: vec![Content::text(message)],
        structured_content: Some(structured),
        is_error: Some(true),
        meta: None,
    }
}

impl ServerHandler for LspxMcpServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(
                "Language-server backed code navigation. Positions are 1-based (line/character). \
                 Errors of kind server_initializing are safe to retry after a few seconds."
                    .to_string(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.tools.clone();
        async move {
            Ok(ListToolsResult {
                tools: (*tools).clone(),
                next_cursor: None,
            })
        }
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(request).await
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct PositionArgs {
    file_path: String,
    line: u32,
    character: u32,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct DiagnosticsArgs {
    file_path: String,
    #[serde(default)]
    severity: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RenameArgs {
    file_path: String,
    line: u32,
    character: u32,
    new_name: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct ListServersArgs {}

fn parse_arguments<T: for<'de> Deserialize<'de>>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    let arguments = arguments.unwrap_or_default();
    serde_json::from_value::<T>(Value::Object(arguments))
        .map_err(|e| McpError::invalid_params(e.to_string(), None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::tests::{Script, ScriptedLauncher, project, tools_with};
    use lspx_lsp::path_to_uri;
    use serde_json::json;
    use std::borrow::Cow;
    use std::time::Duration;

    fn request(name: &'static str, arguments: Value) -> CallToolRequestParam {
        CallToolRequestParam {
            name: Cow::Borrowed(name),
            arguments: arguments.as_object().cloned(),
        }
    }

    fn server(script: Script, base: &std::path::Path, read_only: bool) -> LspxMcpServer {
        let lsp = tools_with(ScriptedLauncher::new(script), base, Duration::from_secs(5));
        LspxMcpServer::from_parts(lsp, tools::all_tools(), read_only)
    }

    fn text(result: &CallToolResult) -> String {
        result
            .content
            .iter()
            .filter_map(|c| c.as_text().map(|t| t.text.clone()))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn goto_definition_returns_text_and_structured_content() {
        let (dir, file) = project();
        let uri = path_to_uri(&file).unwrap();
        let server = server(
            Script {
                locations: vec![json!({
                    "uri": uri,
                    "range": { "start": { "line": 0, "character": 3 }, "end": { "line": 0, "character": 6 } }
                })],
                ..Default::default()
            },
            dir.path(),
            false,
        );

        let result = server
            .dispatch(request(
                "goto_definition",
                json!({ "file_path": "src/main.rs", "line": 2, "character": 13 }),
            ))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert_eq!(text(&result), format!("{}:1:4", file.display()));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["ok"], true);
        assert_eq!(structured["tool"], "goto_definition");
    }

    #[tokio::test]
    async fn tool_errors_are_reported_in_band() {
        let (dir, _) = project();
        std::fs::write(dir.path().join("readme.xyz"), "").unwrap();
        let server = server(Script::default(), dir.path(), false);

        let result = server
            .dispatch(request(
                "find_references",
                json!({ "file_path": "readme.xyz", "line": 1, "character": 1 }),
            ))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(text(&result), "No LSP server configured for extension: .xyz");
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["ok"], false);
        assert_eq!(structured["error"]["kind"], "not_configured");
    }

    #[tokio::test]
    async fn bad_arguments_are_invalid_params() {
        let (dir, _) = project();
        let server = server(Script::default(), dir.path(), false);

        let result = server
            .dispatch(request(
                "diagnostics",
                json!({ "file_path": "src/main.rs", "severity": "fatal" }),
            ))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert_eq!(
            result.structured_content.unwrap()["error"]["kind"],
            "invalid_params"
        );

        let result = server
            .dispatch(request("goto_definition", json!({ "file_path": "src/main.rs" })))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }

    #[tokio::test]
    async fn read_only_mode_rejects_rename() {
        let (dir, file) = project();
        let server = server(Script::default(), dir.path(), true);
        assert!(!server.tools.iter().any(|t| t.name == "rename"));

        let result = server
            .dispatch(request(
                "rename",
                json!({ "file_path": "src/main.rs", "line": 1, "character": 4, "new_name": "x" }),
            ))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("read-only"));
        assert_eq!(result.structured_content.unwrap()["error"]["kind"], "read_only");
        assert_eq!(
            std::fs::read_to_string(&file).unwrap(),
            "fn old() {}\nfn main() { old(); }\n"
        );
    }

    #[tokio::test]
    async fn rename_reports_the_apply_result() {
        let (dir, file) = project();
        let uri = path_to_uri(&file).unwrap();
        let mut changes = serde_json::Map::new();
        changes.insert(
            uri,
            json!([{ "range": { "start": { "line": 0, "character": 3 }, "end": { "line": 0, "character": 6 } }, "newText": "renamed" }]),
        );
        let server = server(
            Script {
                rename: Some(json!({ "changes": changes })),
                ..Default::default()
            },
            dir.path(),
            false,
        );

        let result = server
            .dispatch(request(
                "rename",
                json!({ "file_path": "src/main.rs", "line": 1, "character": 4, "new_name": "renamed" }),
            ))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(false));
        assert!(text(&result).starts_with("Applied 1 edit(s) to 1 file(s):"));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["result"]["total_edits"], 1);
        assert!(
            std::fs::read_to_string(&file)
                .unwrap()
                .starts_with("fn renamed() {}")
        );
    }

    #[tokio::test]
    async fn list_servers_reports_install_state() {
        let (dir, _) = project();
        let server = server(Script::default(), dir.path(), false);

        let result = server
            .dispatch(request("list_servers", json!({})))
            .await
            .unwrap();
        let body = text(&result);
        assert!(body.contains("fake-rs [.rs]: installed"));
        assert!(body.contains("missing-go [.go]: not installed (go install example.com/missing@latest)"));
        let structured = result.structured_content.unwrap();
        assert_eq!(structured["servers"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error_result() {
        let (dir, _) = project();
        let server = server(Script::default(), dir.path(), false);
        let result = server
            .dispatch(request("hover", json!({})))
            .await
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("unknown tool: hover"));
    }
}
