use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lspx_core::ToolError;
use lspx_core::registry::{ServerDescriptor, ServerRegistry};
use lspx_core::workspace::{find_root, resolve_against, validate_within_root};
use lspx_lsp::{ClientPool, LanguageServer, LspPosition, PooledClient, is_request_timeout};
use tracing::debug;

use crate::format::{SeverityFilter, format_definitions, format_diagnostics, format_references};
use crate::workspace_edit::{ApplyResult, apply_workspace_edit, format_apply_result};

/// The four agent-facing operations.
///
/// Each call resolves the file's project root, checks the path against it,
/// leases a pooled server for (root, server id), and renders the answer as
/// text. The lease is released when the call returns, on every path.
pub struct LspTools {
    registry: ServerRegistry,
    pool: Arc<ClientPool>,
    workspace_base: PathBuf,
    diagnostics_wait: Duration,
}

struct Target<'a> {
    file: PathBuf,
    root: PathBuf,
    server: &'a ServerDescriptor,
}

impl LspTools {
    pub fn new(
        registry: ServerRegistry,
        pool: Arc<ClientPool>,
        workspace_base: PathBuf,
        diagnostics_wait: Duration,
    ) -> Self {
        Self {
            registry,
            pool,
            workspace_base,
            diagnostics_wait,
        }
    }

    pub fn registry(&self) -> &ServerRegistry {
        &self.registry
    }

    pub fn pool(&self) -> &Arc<ClientPool> {
        &self.pool
    }

    pub fn workspace_base(&self) -> &Path {
        &self.workspace_base
    }

    pub async fn goto_definition(
        &self,
        file: &str,
        line: u32,
        character: u32,
    ) -> Result<String, ToolError> {
        let target = self.target(file)?;
        let client = self.lease(&target).await?;
        let locations = client
            .definition(&target.file, to_protocol(line, character))
            .await
            .map_err(|err| self.classify(err, &target))?;
        Ok(format_definitions(&locations))
    }

    pub async fn find_references(
        &self,
        file: &str,
        line: u32,
        character: u32,
    ) -> Result<String, ToolError> {
        let target = self.target(file)?;
        let client = self.lease(&target).await?;
        let locations = client
            .references(&target.file, to_protocol(line, character), true)
            .await
            .map_err(|err| self.classify(err, &target))?;
        Ok(format_references(&locations))
    }

    pub async fn diagnostics(
        &self,
        file: &str,
        severity: SeverityFilter,
    ) -> Result<String, ToolError> {
        let target = self.target(file)?;
        let client = self.lease(&target).await?;
        let diagnostics = client
            .diagnostics(&target.file, self.diagnostics_wait)
            .await
            .map_err(|err| self.classify(err, &target))?;
        Ok(format_diagnostics(&diagnostics, severity))
    }

    pub async fn rename(
        &self,
        file: &str,
        line: u32,
        character: u32,
        new_name: &str,
    ) -> Result<String, ToolError> {
        let result = self.rename_symbol(file, line, character, new_name).await?;
        Ok(format_apply_result(&result))
    }

    /// Asks the server for a rename edit and applies it below the file's
    /// project root. Partial failures are reported in the result, not as `Err`.
    pub async fn rename_symbol(
        &self,
        file: &str,
        line: u32,
        character: u32,
        new_name: &str,
    ) -> Result<ApplyResult, ToolError> {
        let target = self.target(file)?;
        let edit = {
            let client = self.lease(&target).await?;
            client
                .rename(&target.file, to_protocol(line, character), new_name)
                .await
                .map_err(|err| self.classify(err, &target))?
        };
        Ok(apply_workspace_edit(&target.root, edit.as_ref()).await)
    }

    fn target(&self, file: &str) -> Result<Target<'_>, ToolError> {
        let path = resolve_against(&self.workspace_base, Path::new(file));
        let server = self.registry.lookup_path(&path).into_result()?;
        let root = find_root(&path);
        let file = validate_within_root(&path, &root)?;
        if !file.is_file() {
            return Err(ToolError::Io {
                path: file,
                message: "file not found".to_string(),
            });
        }
        debug!(
            "resolved {} -> root={} server={}",
            file.display(),
            root.display(),
            server.id
        );
        Ok(Target { file, root, server })
    }

    async fn lease(&self, target: &Target<'_>) -> Result<PooledClient, ToolError> {
        self.pool.acquire(&target.root, target.server).await
    }

    fn classify(&self, err: anyhow::Error, target: &Target<'_>) -> ToolError {
        if is_request_timeout(&err) && self.pool.is_initializing(&target.root, &target.server.id) {
            return ToolError::Transient {
                server_id: target.server.id.clone(),
            };
        }
        ToolError::protocol(format!("{err:#}"))
    }
}

/// 1-based tool input to 0-based protocol position; zero is treated as one.
fn to_protocol(line: u32, character: u32) -> LspPosition {
    LspPosition {
        line: line.max(1) - 1,
        character: character.max(1) - 1,
    }
}
