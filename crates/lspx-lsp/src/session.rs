use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lspx_core::hashing::sha256_hex;
use lspx_core::registry::ServerDescriptor;
use tokio::fs;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::debug;

use crate::lsp::{
    AnyLocation, LspClient, LspClientOptions, LspDiagnostic, LspPosition, LspWorkspaceEdit,
    parse_locations,
};

/// One initialized (or initializing) language server, as the pool sees it.
#[async_trait]
pub trait LanguageServer: Send + Sync {
    /// Runs the protocol handshake. Called exactly once, by the pool.
    async fn initialize(&self) -> Result<()>;

    async fn definition(&self, file: &Path, position: LspPosition) -> Result<Vec<AnyLocation>>;

    async fn references(
        &self,
        file: &Path,
        position: LspPosition,
        include_declaration: bool,
    ) -> Result<Vec<AnyLocation>>;

    async fn diagnostics(&self, file: &Path, max_wait: Duration) -> Result<Vec<LspDiagnostic>>;

    /// `Ok(None)` when the server has no edit for the position.
    async fn rename(
        &self,
        file: &Path,
        position: LspPosition,
        new_name: &str,
    ) -> Result<Option<LspWorkspaceEdit>>;

    async fn shutdown(&self) -> Result<()>;
}

/// Creates server sessions for the pool; the seam tests replace.
pub trait ServerLauncher: Send + Sync {
    fn launch(&self, root: &Path, server: &ServerDescriptor) -> Result<Arc<dyn LanguageServer>>;
}

/// Launches real servers as child processes speaking LSP over stdio.
#[derive(Debug, Clone)]
pub struct StdioLauncher {
    pub initialize_timeout: Duration,
    pub request_timeout: Duration,
}

impl ServerLauncher for StdioLauncher {
    fn launch(&self, root: &Path, server: &ServerDescriptor) -> Result<Arc<dyn LanguageServer>> {
        let lsp = LspClient::spawn(LspClientOptions {
            command: server.command.clone(),
            root: root.to_path_buf(),
            request_timeout: self.request_timeout,
        })?;
        Ok(Arc::new(LspSession::new(
            lsp,
            server.clone(),
            self.initialize_timeout,
        )))
    }
}

pub struct LspSession {
    lsp: LspClient,
    server: ServerDescriptor,
    initialize_timeout: Duration,
    open_files: Mutex<HashMap<PathBuf, OpenFileState>>,
}

#[derive(Debug, Clone)]
struct OpenFileState {
    version: i32,
    last_sha256: String,
}

impl LspSession {
    pub fn new(lsp: LspClient, server: ServerDescriptor, initialize_timeout: Duration) -> Self {
        Self {
            lsp,
            server,
            initialize_timeout,
            open_files: Mutex::new(HashMap::new()),
        }
    }

    /// Sends `didOpen` the first time a file is seen, and a full-text
    /// `didChange` whenever its content hash differs from the last sync.
    async fn open_or_sync(&self, file_path: &Path) -> Result<()> {
        let content = fs::read(file_path)
            .await
            .with_context(|| format!("failed to read file: {file_path:?}"))?;
        let hash = sha256_hex(&content);
        let text = String::from_utf8(content).context("file is not valid UTF-8")?;

        let mut open = self.open_files.lock().await;
        match open.get_mut(file_path) {
            None => {
                let extension = file_path
                    .extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or_default()
                    .to_ascii_lowercase();
                let language_id = self.server.language_id_for(&extension);
                debug!("didOpen {:?} languageId={}", file_path, language_id);
                self.lsp.did_open(file_path, &language_id, 1, text).await?;
                open.insert(
                    file_path.to_path_buf(),
                    OpenFileState {
                        version: 1,
                        last_sha256: hash,
                    },
                );
            }
            Some(state) => {
                if state.last_sha256 != hash {
                    state.version += 1;
                    state.last_sha256 = hash;
                    debug!("didChange {:?} version={}", file_path, state.version);
                    self.lsp.did_change(file_path, state.version, text).await?;
                }
            }
        }
        Ok(())
    }

    /// Servers that are still indexing tend to answer with an empty result
    /// rather than an error, so empty answers are retried a couple of times.
    async fn locations_with_retry(
        &self,
        file_path: &Path,
        position: LspPosition,
        references: Option<bool>,
    ) -> Result<Vec<AnyLocation>> {
        for attempt in 0..3u64 {
            let raw = match references {
                Some(include_declaration) => {
                    self.lsp
                        .references(file_path, position, include_declaration)
                        .await?
                }
                None => self.lsp.definition(file_path, position).await?,
            };
            let locations = parse_locations(raw)?;
            if !locations.is_empty() || attempt == 2 {
                return Ok(locations);
            }
            tokio::time::sleep(Duration::from_millis(200 * (attempt + 1))).await;
        }
        Ok(Vec::new())
    }
}

#[async_trait]
impl LanguageServer for LspSession {
    async fn initialize(&self) -> Result<()> {
        self.lsp
            .initialize(self.initialize_timeout)
            .await
            .with_context(|| format!("failed to initialize LSP server '{}'", self.server.id))
    }

    async fn definition(&self, file: &Path, position: LspPosition) -> Result<Vec<AnyLocation>> {
        self.open_or_sync(file).await?;
        self.locations_with_retry(file, position, None).await
    }

    async fn references(
        &self,
        file: &Path,
        position: LspPosition,
        include_declaration: bool,
    ) -> Result<Vec<AnyLocation>> {
        self.open_or_sync(file).await?;
        self.locations_with_retry(file, position, Some(include_declaration))
            .await
    }

    async fn diagnostics(&self, file: &Path, max_wait: Duration) -> Result<Vec<LspDiagnostic>> {
        self.open_or_sync(file).await?;

        if let Some(diags) = self.lsp.document_diagnostics(file, max_wait).await? {
            return Ok(diags);
        }

        self.lsp.wait_for_diagnostics(file, max_wait).await
    }

    async fn rename(
        &self,
        file: &Path,
        position: LspPosition,
        new_name: &str,
    ) -> Result<Option<LspWorkspaceEdit>> {
        self.open_or_sync(file).await?;
        let raw = self.lsp.rename(file, position, new_name).await?;
        LspWorkspaceEdit::from_value(raw)
    }

    async fn shutdown(&self) -> Result<()> {
        debug!("shutting down LSP server '{}'", self.server.id);
        self.lsp.shutdown().await
    }
}
