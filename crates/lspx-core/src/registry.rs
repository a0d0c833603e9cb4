//! Static extension → language server table.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::ToolError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerDescriptor {
    pub id: String,
    /// Launch argv; the first element is the executable.
    pub command: Vec<String>,
    /// Normalized extensions (no leading dot, lowercase).
    pub extensions: Vec<String>,
    pub install_hint: String,
    /// Overrides the extension-based `languageId` used for `didOpen`.
    pub language_id: Option<String>,
}

impl ServerDescriptor {
    pub fn program(&self) -> &str {
        self.command.first().map(String::as_str).unwrap_or("")
    }

    pub fn handles(&self, extension: &str) -> bool {
        self.extensions.iter().any(|e| e == extension)
    }

    pub fn language_id_for(&self, extension: &str) -> String {
        self.language_id
            .clone()
            .unwrap_or_else(|| language_id_for_extension(extension).to_string())
    }
}

/// Outcome of [`ServerRegistry::lookup`].
///
/// The two failure modes carry different remediation: install something vs.
/// the file type is simply unsupported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLookup<'a> {
    Found(&'a ServerDescriptor),
    NotInstalled {
        server: &'a ServerDescriptor,
        install_hint: String,
    },
    NotConfigured {
        extension: String,
    },
}

impl<'a> ServerLookup<'a> {
    pub fn into_result(self) -> Result<&'a ServerDescriptor, ToolError> {
        match self {
            ServerLookup::Found(server) => Ok(server),
            ServerLookup::NotInstalled {
                server,
                install_hint,
            } => Err(ToolError::Unavailable {
                server_id: server.id.clone(),
                command: server.program().to_string(),
                install_hint,
            }),
            ServerLookup::NotConfigured { extension } => {
                Err(ToolError::Configuration { extension })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerStatus {
    pub id: String,
    pub command: Vec<String>,
    pub extensions: Vec<String>,
    pub installed: bool,
    pub install_hint: String,
}

#[derive(Debug, Clone)]
pub struct ServerRegistry {
    servers: Vec<ServerDescriptor>,
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ServerRegistry {
    pub fn new(servers: Vec<ServerDescriptor>) -> Self {
        Self { servers }
    }

    pub fn builtin() -> Self {
        Self::new(builtin_servers())
    }

    pub fn servers(&self) -> &[ServerDescriptor] {
        &self.servers
    }

    pub fn get(&self, id: &str) -> Option<&ServerDescriptor> {
        self.servers.iter().find(|s| s.id == id)
    }

    pub(crate) fn servers_mut(&mut self) -> &mut Vec<ServerDescriptor> {
        &mut self.servers
    }

    /// Resolves the server for `extension` (with or without the leading dot).
    pub fn lookup(&self, extension: &str) -> ServerLookup<'_> {
        self.lookup_with(extension, command_is_executable)
    }

    /// [`lookup`](Self::lookup) with an explicit executable probe.
    pub fn lookup_with(
        &self,
        extension: &str,
        is_executable: impl Fn(&str) -> bool,
    ) -> ServerLookup<'_> {
        let Some(ext) = normalize_extension(extension) else {
            return ServerLookup::NotConfigured {
                extension: "(none)".to_string(),
            };
        };

        let mut first_claimant = None;
        for server in self.servers.iter().filter(|s| s.handles(&ext)) {
            if is_executable(server.program()) {
                return ServerLookup::Found(server);
            }
            first_claimant.get_or_insert(server);
        }

        match first_claimant {
            Some(server) => ServerLookup::NotInstalled {
                server,
                install_hint: server.install_hint.clone(),
            },
            None => ServerLookup::NotConfigured {
                extension: format!(".{ext}"),
            },
        }
    }

    /// Resolves the server for a file path by its extension.
    pub fn lookup_path(&self, path: &Path) -> ServerLookup<'_> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        self.lookup(ext)
    }

    pub fn statuses(&self) -> Vec<ServerStatus> {
        self.servers
            .iter()
            .map(|s| ServerStatus {
                id: s.id.clone(),
                command: s.command.clone(),
                extensions: s.extensions.clone(),
                installed: command_is_executable(s.program()),
                install_hint: s.install_hint.clone(),
            })
            .collect()
    }
}

pub fn normalize_extension(ext: &str) -> Option<String> {
    let ext = ext.trim();
    let ext = ext.strip_prefix('.').unwrap_or(ext).trim();
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// True when `command` names an executable file, either directly (when it
/// contains a path separator) or through a `PATH` entry.
pub fn command_is_executable(command: &str) -> bool {
    resolve_command(command).is_some()
}

pub fn resolve_command(command: &str) -> Option<PathBuf> {
    let command = command.trim();
    if command.is_empty() {
        return None;
    }

    let direct = Path::new(command);
    if direct.components().count() > 1 || direct.is_absolute() {
        return executable_candidates(direct).find(|c| is_executable_file(c));
    }

    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .filter(|dir| !dir.as_os_str().is_empty())
        .flat_map(|dir| executable_candidates(&dir.join(command)).collect::<Vec<_>>())
        .find(|c| is_executable_file(c))
}

#[cfg(windows)]
fn executable_candidates(base: &Path) -> impl Iterator<Item = PathBuf> {
    let exts = std::env::var("PATHEXT").unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string());
    let mut out = vec![base.to_path_buf()];
    for ext in exts.split(';').filter(|e| !e.is_empty()) {
        let mut name = base.as_os_str().to_os_string();
        name.push(ext);
        out.push(PathBuf::from(name));
    }
    out.into_iter()
}

#[cfg(not(windows))]
fn executable_candidates(base: &Path) -> impl Iterator<Item = PathBuf> {
    std::iter::once(base.to_path_buf())
}

#[cfg(unix)]
fn is_executable_file(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable_file(path: &Path) -> bool {
    path.is_file()
}

pub fn language_id_for_extension(ext: &str) -> &'static str {
    match ext {
        "ts" | "mts" | "cts" => "typescript",
        "tsx" => "typescriptreact",
        "js" | "mjs" | "cjs" => "javascript",
        "jsx" => "javascriptreact",
        "py" | "pyi" => "python",
        "rs" => "rust",
        "go" => "go",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" | "hxx" => "cpp",
        "sh" | "bash" => "shellscript",
        "lua" => "lua",
        "zig" => "zig",
        _ => "plaintext",
    }
}

fn descriptor(id: &str, command: &[&str], extensions: &[&str], install_hint: &str) -> ServerDescriptor {
    ServerDescriptor {
        id: id.to_string(),
        command: command.iter().map(|s| s.to_string()).collect(),
        extensions: extensions.iter().map(|s| s.to_string()).collect(),
        install_hint: install_hint.to_string(),
        language_id: None,
    }
}

fn builtin_servers() -> Vec<ServerDescriptor> {
    vec![
        descriptor(
            "typescript",
            &["typescript-language-server", "--stdio"],
            &["ts", "tsx", "js", "jsx", "mjs", "cjs", "mts", "cts"],
            "npm install -g typescript-language-server typescript",
        ),
        descriptor(
            "pyright",
            &["pyright-langserver", "--stdio"],
            &["py", "pyi"],
            "pip install pyright (or: npm install -g pyright)",
        ),
        descriptor(
            "rust-analyzer",
            &["rust-analyzer"],
            &["rs"],
            "rustup component add rust-analyzer",
        ),
        descriptor(
            "gopls",
            &["gopls"],
            &["go"],
            "go install golang.org/x/tools/gopls@latest",
        ),
        descriptor(
            "clangd",
            &["clangd", "--background-index"],
            &["c", "cc", "cpp", "cxx", "h", "hh", "hpp", "hxx"],
            "Install clangd via your package manager (e.g. `apt install clangd` or `brew install llvm`)",
        ),
        descriptor(
            "bash-language-server",
            &["bash-language-server", "start"],
            &["sh", "bash"],
            "npm install -g bash-language-server",
        ),
        descriptor(
            "lua-language-server",
            &["lua-language-server"],
            &["lua"],
            "See https://luals.github.io/#install",
        ),
        descriptor(
            "zls",
            &["zls"],
            &["zig"],
            "See https://github.com/zigtools/zls#installation",
        ),
    ]
}
