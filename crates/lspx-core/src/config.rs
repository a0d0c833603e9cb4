use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::registry::{ServerDescriptor, ServerRegistry, normalize_extension};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct LspxConfig {
    /// Base directory for relative `file` arguments.
    #[serde(default)]
    pub workspace_root: Option<PathBuf>,
    #[serde(default)]
    pub servers: Option<Vec<ServerConfig>>,
    #[serde(default)]
    pub pool: Option<PoolConfig>,
    #[serde(default)]
    pub mcp: Option<McpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Matches a built-in server to override it; any other id adds a server.
    pub id: String,
    /// Launch argv, e.g. `["typescript-language-server", "--stdio"]`.
    #[serde(default)]
    pub command: Option<Vec<String>>,
    /// File extensions routed to this server, with or without the leading dot.
    #[serde(default)]
    pub extensions: Option<Vec<String>>,
    #[serde(default)]
    #[serde(alias = "installHint")]
    pub install_hint: Option<String>,
    #[serde(default)]
    #[serde(alias = "languageId")]
    pub language_id: Option<String>,
    /// Removes a built-in server from the registry.
    #[serde(default)]
    pub disabled: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct PoolConfig {
    #[serde(default)]
    pub initialize_timeout_ms: Option<u64>,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    /// How long a tool call waits for a handshake in progress before reporting
    /// that the server is still initializing.
    #[serde(default)]
    pub acquire_timeout_ms: Option<u64>,
    /// Stop servers that have been unused this long. Unset keeps them warm
    /// until shutdown.
    #[serde(default)]
    pub idle_shutdown_ms: Option<u64>,
    #[serde(default)]
    pub diagnostics_wait_ms: Option<u64>,
}

impl PoolConfig {
    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_millis(self.initialize_timeout_ms.unwrap_or(30_000))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.unwrap_or(30_000))
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms.unwrap_or(45_000))
    }

    pub fn idle_shutdown(&self) -> Option<Duration> {
        self.idle_shutdown_ms
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    pub fn diagnostics_wait(&self) -> Duration {
        Duration::from_millis(self.diagnostics_wait_ms.unwrap_or(3_000))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct McpConfig {
    /// Disables tools that write to disk (`rename`).
    #[serde(default)]
    pub read_only: Option<bool>,
    #[serde(default)]
    pub tools: Option<McpToolsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct McpToolsConfig {
    /// If set and non-empty, only these tools are exposed through MCP.
    #[serde(default)]
    pub allow: Option<Vec<String>>,
    /// Tools to exclude from MCP exposure (ignored when `allow` is set and non-empty).
    #[serde(default)]
    pub exclude: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: LspxConfig,
    pub workspace_root: PathBuf,
    pub source: ConfigSource,
}

#[derive(Debug, Clone)]
pub enum ConfigSource {
    None,
    Path(PathBuf),
    Env(PathBuf),
    Workspace(PathBuf),
}

impl LspxConfig {
    pub fn pool(&self) -> PoolConfig {
        self.pool.clone().unwrap_or_default()
    }

    pub fn read_only(&self) -> bool {
        self.mcp
            .as_ref()
            .and_then(|m| m.read_only)
            .unwrap_or(false)
    }

    /// Built-in servers with this config's `[[servers]]` entries applied.
    pub fn registry(&self) -> ServerRegistry {
        let mut registry = ServerRegistry::builtin();
        for entry in self.servers.iter().flatten() {
            apply_server_override(&mut registry, entry);
        }
        registry
    }
}

pub fn load_config(
    cli_config_path: Option<&Path>,
    cli_workspace_root: Option<&Path>,
) -> Result<LoadedConfig> {
    if let Some(path) = cli_config_path {
        let config = read_config_file(path)?;
        let workspace_root =
            resolve_workspace_root(cli_workspace_root, config.workspace_root.as_deref())?;
        return Ok(LoadedConfig {
            config,
            workspace_root,
            source: ConfigSource::Path(path.to_path_buf()),
        });
    }

    if let Ok(path) = std::env::var("LSPX_CONFIG_PATH")
        && !path.trim().is_empty()
    {
        let path = PathBuf::from(path);
        let config = read_config_file(&path)?;
        let workspace_root =
            resolve_workspace_root(cli_workspace_root, config.workspace_root.as_deref())?;
        return Ok(LoadedConfig {
            config,
            workspace_root,
            source: ConfigSource::Env(path),
        });
    }

    let fallback_root = cli_workspace_root
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    let workspace_root = fallback_root
        .canonicalize()
        .unwrap_or(fallback_root.clone());

    for candidate in workspace_config_candidates(&workspace_root) {
        if candidate.exists() {
            let config = read_config_file(&candidate)?;
            let effective_root =
                resolve_workspace_root(Some(&workspace_root), config.workspace_root.as_deref())?;
            return Ok(LoadedConfig {
                config,
                workspace_root: effective_root,
                source: ConfigSource::Workspace(candidate),
            });
        }
    }

    Ok(LoadedConfig {
        config: LspxConfig::default(),
        workspace_root,
        source: ConfigSource::None,
    })
}

fn resolve_workspace_root(cli: Option<&Path>, from_config: Option<&Path>) -> Result<PathBuf> {
    if let Some(cli) = cli {
        return cli
            .canonicalize()
            .with_context(|| format!("failed to canonicalize workspace_root: {cli:?}"));
    }
    if let Some(cfg) = from_config {
        return cfg
            .canonicalize()
            .with_context(|| format!("failed to canonicalize workspace_root: {cfg:?}"));
    }
    let cwd = std::env::current_dir().context("failed to get current_dir")?;
    Ok(cwd.canonicalize().unwrap_or(cwd))
}

fn workspace_config_candidates(workspace_root: &Path) -> Vec<PathBuf> {
    vec![
        workspace_root.join(".lspx").join("config.toml"),
        workspace_root.join(".lspx").join("config.json"),
        workspace_root.join("lspx.toml"),
        workspace_root.join("lspx.json"),
    ]
}

fn read_config_file(path: &Path) -> Result<LspxConfig> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read config file: {path:?}"))?;
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or("");

    if ext.eq_ignore_ascii_case("toml") {
        let s = String::from_utf8(bytes).context("config file is not valid UTF-8")?;
        let cfg: LspxConfig = toml::from_str(&s).context("failed to parse TOML config")?;
        return Ok(cfg);
    }
    if ext.eq_ignore_ascii_case("json") {
        let cfg: LspxConfig =
            serde_json::from_slice(&bytes).context("failed to parse JSON config")?;
        return Ok(cfg);
    }

    Err(anyhow!(
        "unsupported config extension (expected .toml or .json): {path:?}"
    ))
}

fn apply_server_override(registry: &mut ServerRegistry, entry: &ServerConfig) {
    let id = entry.id.trim();
    if id.is_empty() {
        warn!("ignoring [[servers]] entry without id");
        return;
    }

    let servers = registry.servers_mut();
    if entry.disabled.unwrap_or(false) {
        servers.retain(|s| s.id != id);
        return;
    }

    let command = entry
        .command
        .clone()
        .map(|argv| {
            argv.into_iter()
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|argv| !argv.is_empty());
    let extensions = entry.extensions.as_ref().map(|exts| {
        exts.iter()
            .filter_map(|e| normalize_extension(e))
            .collect::<Vec<_>>()
    });

    if let Some(existing) = servers.iter_mut().find(|s| s.id == id) {
        if let Some(command) = command {
            existing.command = command;
        }
        if let Some(extensions) = extensions {
            existing.extensions = extensions;
        }
        if let Some(hint) = entry.install_hint.clone() {
            existing.install_hint = hint;
        }
        if let Some(language_id) = entry.language_id.clone() {
            existing.language_id = Some(language_id);
        }
        return;
    }

    let (Some(command), Some(extensions)) = (command, extensions.filter(|e| !e.is_empty())) else {
        warn!("ignoring [[servers]] entry id={id}: new servers need `command` and `extensions`");
        return;
    };

    let install_hint = entry
        .install_hint
        .clone()
        .unwrap_or_else(|| format!("Install `{}` and make sure it is on PATH", command[0]));

    servers.push(ServerDescriptor {
        id: id.to_string(),
        command,
        extensions,
        install_hint,
        language_id: entry.language_id.clone(),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_uses_builtin_registry_and_pool_defaults() {
        let config = LspxConfig::default();
        assert!(config.registry().get("rust-analyzer").is_some());
        let pool = config.pool();
        assert_eq!(pool.initialize_timeout(), Duration::from_secs(30));
        assert_eq!(pool.idle_shutdown(), None);
        assert!(!config.read_only());
    }

    #[test]
    fn toml_overrides_disables_and_adds_servers() {
        let toml = r#"
[[servers]]
id = "pyright"
command = ["basedpyright-langserver", "--stdio"]
install_hint = "pip install basedpyright"

[[servers]]
id = "gopls"
disabled = true

[[servers]]
id = "vue"
command = ["vue-language-server", "--stdio"]
extensions = [".VUE"]
language_id = "vue"

[pool]
idle_shutdown_ms = 60000
"#;
        let config: LspxConfig = toml::from_str(toml).unwrap();
        let registry = config.registry();

        let pyright = registry.get("pyright").unwrap();
        assert_eq!(pyright.program(), "basedpyright-langserver");
        assert_eq!(pyright.install_hint, "pip install basedpyright");
        assert!(pyright.handles("py"));

        assert!(registry.get("gopls").is_none());

        let vue = registry.get("vue").unwrap();
        assert_eq!(vue.extensions, vec!["vue".to_string()]);
        assert_eq!(vue.language_id_for("vue"), "vue");
        assert!(vue.install_hint.contains("vue-language-server"));

        assert_eq!(
            config.pool().idle_shutdown(),
            Some(Duration::from_secs(60))
        );
    }

    #[test]
    fn new_server_without_extensions_is_ignored() {
        let config = LspxConfig {
            servers: Some(vec![ServerConfig {
                id: "half".to_string(),
                command: Some(vec!["half-ls".to_string()]),
                extensions: None,
                install_hint: None,
                language_id: None,
                disabled: None,
            }]),
            ..Default::default()
        };
        assert!(config.registry().get("half").is_none());
    }

    #[test]
    fn json_accepts_camel_case_aliases() {
        let json = r#"
{
  "servers": [
    { "id": "ts", "command": ["tsls"], "extensions": ["ts"], "installHint": "npm i tsls", "languageId": "typescript" }
  ],
  "mcp": { "read_only": true, "tools": { "exclude": ["rename"] } }
}
"#;
        let config: LspxConfig = serde_json::from_str(json).unwrap();
        let server = config.servers.as_ref().unwrap()[0].clone();
        assert_eq!(server.install_hint.as_deref(), Some("npm i tsls"));
        assert_eq!(server.language_id.as_deref(), Some("typescript"));
        assert!(config.read_only());
    }

    #[test]
    fn load_config_discovers_workspace_file() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".lspx")).unwrap();
        std::fs::write(
            dir.path().join(".lspx").join("config.toml"),
            "[pool]\nrequest_timeout_ms = 1500\n",
        )
        .unwrap();

        let loaded = load_config(None, Some(dir.path())).unwrap();
        assert!(matches!(loaded.source, ConfigSource::Workspace(_)));
        assert_eq!(
            loaded.config.pool().request_timeout(),
            Duration::from_millis(1500)
        );
        assert_eq!(loaded.workspace_root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn load_config_rejects_unknown_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lspx.yaml");
        std::fs::write(&path, "pool: {}\n").unwrap();
        let err = load_config(Some(&path), Some(dir.path())).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }
}
