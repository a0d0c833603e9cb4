use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lspx_core::config::load_config;
use lspx_lsp::LspWorkspaceEdit;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "lspx")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the MCP server over stdio
    Mcp {
        /// Optional path to an `lspx` config file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override workspace root (defaults to config or current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
        /// Hide and reject tools that write to disk
        #[arg(long)]
        read_only: bool,
    },
    /// Show which language servers are installed
    Doctor {
        /// Optional path to an `lspx` config file (.toml or .json)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override workspace root (defaults to config or current directory)
        #[arg(long)]
        workspace_root: Option<PathBuf>,
    },
    /// Apply a WorkspaceEdit JSON document below a root directory
    ApplyEdit {
        /// Every touched path must lie inside this directory
        #[arg(long)]
        root: PathBuf,
        /// File containing the WorkspaceEdit (JSON)
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // stdout carries the MCP protocol, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match args.command {
        Command::Mcp {
            config,
            workspace_root,
            read_only,
        } => {
            lspx_mcp::run_stdio_with_options(lspx_mcp::McpOptions {
                config_path: config,
                workspace_root,
                read_only,
            })
            .await
        }
        Command::Doctor {
            config,
            workspace_root,
        } => doctor(config, workspace_root),
        Command::ApplyEdit { root, file } => apply_edit(root, file).await,
    }
}

fn doctor(config: Option<PathBuf>, workspace_root: Option<PathBuf>) -> Result<()> {
    let loaded = load_config(config.as_deref(), workspace_root.as_deref())?;
    println!("config_source: {:?}", loaded.source);
    println!("workspace_root: {}", loaded.workspace_root.display());

    let statuses = loaded.config.registry().statuses();
    println!("servers.count: {}", statuses.len());
    let mut installed = 0usize;
    for s in &statuses {
        let extensions: Vec<String> = s.extensions.iter().map(|e| format!(".{e}")).collect();
        if s.installed {
            installed += 1;
            println!(
                "server: id={} extensions={} command={:?} installed",
                s.id,
                extensions.join(","),
                s.command
            );
        } else {
            println!(
                "server: id={} extensions={} command={:?} NOT INSTALLED",
                s.id,
                extensions.join(","),
                s.command
            );
            println!("  install: {}", s.install_hint);
        }
    }

    if installed == 0 {
        anyhow::bail!(
            "no language server is installed ({} configured)",
            statuses.len()
        );
    }
    Ok(())
}

async fn apply_edit(root: PathBuf, file: PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let value: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not valid JSON", file.display()))?;
    let edit = LspWorkspaceEdit::from_value(value)?;

    let root = root
        .canonicalize()
        .with_context(|| format!("failed to resolve root {}", root.display()))?;
    info!("applying {} below {}", file.display(), root.display());

    let result = lspx_mcp::apply_workspace_edit(&root, edit.as_ref()).await;
    println!("{}", lspx_mcp::format_apply_result(&result));
    if !result.success {
        anyhow::bail!("{} change(s) failed", result.errors.len());
    }
    Ok(())
}
