use std::collections::HashSet;

use lspx_core::config::McpConfig;
use rmcp::model::Tool;
use tracing::warn;

/// Tools that write to the workspace.
pub(crate) const WRITE_TOOLS: &[&str] = &["rename"];

pub(crate) fn all_tools() -> Vec<Tool> {
    use crate::tool_schemas as schemas;
    vec![
        schemas::tool_goto_definition(),
        schemas::tool_find_references(),
        schemas::tool_diagnostics(),
        schemas::tool_rename(),
        schemas::tool_list_servers(),
    ]
}

/// Applies `mcp.tools.allow` / `mcp.tools.exclude`. A non-empty allow list
/// wins over exclude. Unknown names are logged and ignored.
pub(crate) fn filter_tools_by_config(tools: Vec<Tool>, mcp: Option<&McpConfig>) -> Vec<Tool> {
    let Some(tools_cfg) = mcp.and_then(|m| m.tools.as_ref()) else {
        return tools;
    };

    let normalize = |s: &str| s.trim().to_ascii_lowercase();
    let collect = |list: Option<&Vec<String>>| -> HashSet<String> {
        list.into_iter()
            .flatten()
            .map(|s| normalize(s.as_str()))
            .filter(|n| !n.is_empty())
            .collect()
    };
    let known: HashSet<String> = tools.iter().map(|t| normalize(t.name.as_ref())).collect();
    let allow_set = collect(tools_cfg.allow.as_ref());
    let exclude_set = collect(tools_cfg.exclude.as_ref());
    let has_allow = !allow_set.is_empty();

    let (listed, label) = if has_allow {
        (&allow_set, "allow")
    } else {
        (&exclude_set, "exclude")
    };
    for name in listed.iter().filter(|n| !known.contains(*n)) {
        warn!("mcp.tools.{label} includes unknown tool: {name}");
    }

    tools
        .into_iter()
        .filter(|tool| {
            let name = normalize(tool.name.as_ref());
            if has_allow {
                allow_set.contains(&name)
            } else {
                !exclude_set.contains(&name)
            }
        })
        .collect()
}

pub(crate) fn filter_tools_read_only(tools: Vec<Tool>) -> Vec<Tool> {
    tools
        .into_iter()
        .filter(|t| !WRITE_TOOLS.contains(&t.name.as_ref()))
        .collect()
}
