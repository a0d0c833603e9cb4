use std::path::PathBuf;

use thiserror::Error;

/// Failures that reach the calling agent.
///
/// `Display` is the text the agent sees, so every variant renders as a
/// complete, actionable sentence rather than a raw internal error.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    /// No server descriptor claims the file's extension.
    #[error("No LSP server configured for extension: {extension}")]
    Configuration { extension: String },

    /// A descriptor exists but its command is not executable here.
    #[error(
        "LSP server '{server_id}' is NOT INSTALLED.\n\nCommand not found: {command}\n\nTo install: {install_hint}"
    )]
    Unavailable {
        server_id: String,
        command: String,
        install_hint: String,
    },

    /// A path escapes the workspace root (or is not absolute).
    #[error("{message}")]
    Security { path: PathBuf, message: String },

    /// The request ran into a handshake that is still in progress; retrying is sensible.
    #[error("LSP server '{server_id}' is still initializing. Please retry in a few seconds.")]
    Transient { server_id: String },

    /// Any other request failure.
    #[error("LSP request failed: {0}")]
    Protocol(String),

    /// Filesystem failure scoped to one file.
    #[error("{}: {message}", path.display())]
    Io { path: PathBuf, message: String },
}

impl ToolError {
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::Configuration { .. } => "not_configured",
            ToolError::Unavailable { .. } => "not_installed",
            ToolError::Security { .. } => "outside_workspace",
            ToolError::Transient { .. } => "server_initializing",
            ToolError::Protocol(_) => "protocol_error",
            ToolError::Io { .. } => "io_error",
        }
    }

    /// Whether the caller may reasonably retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ToolError::Transient { .. })
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        ToolError::Protocol(err.to_string())
    }
}
