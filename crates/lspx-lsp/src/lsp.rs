use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use anyhow::{Context, Result, anyhow};
use indexmap::IndexMap;
use lspx_core::text_edit::{Position, Range, TextEdit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, Notify, oneshot};
use tokio::time::{Duration, timeout};
use tracing::{debug, warn};
use url::Url;

pub const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspPosition {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LspRange {
    pub start: LspPosition,
    pub end: LspPosition,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspLocation {
    pub uri: String,
    pub range: LspRange,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspLocationLink {
    pub target_uri: String,
    pub target_range: LspRange,
    pub target_selection_range: LspRange,
}

/// `Location | LocationLink`, as returned by definition and references.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnyLocation {
    Link(LspLocationLink),
    Plain(LspLocation),
}

impl AnyLocation {
    pub fn uri(&self) -> &str {
        match self {
            AnyLocation::Link(link) => &link.target_uri,
            AnyLocation::Plain(loc) => &loc.uri,
        }
    }

    /// The range to point a reader at: the whole target for links.
    pub fn range(&self) -> &LspRange {
        match self {
            AnyLocation::Link(link) => &link.target_range,
            AnyLocation::Plain(loc) => &loc.range,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspTextEdit {
    pub range: LspRange,
    pub new_text: String,
}

impl From<&LspTextEdit> for TextEdit {
    fn from(edit: &LspTextEdit) -> Self {
        let pos = |p: LspPosition| Position {
            line: p.line,
            character: p.character,
        };
        TextEdit {
            range: Range {
                start: pos(edit.range.start),
                end: pos(edit.range.end),
            },
            new_text: edit.new_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspOptionalVersionedTextDocumentIdentifier {
    pub uri: String,
    #[serde(default)]
    pub version: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspTextDocumentEdit {
    pub text_document: LspOptionalVersionedTextDocumentIdentifier,
    pub edits: Vec<LspTextEdit>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFileOptions {
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub ignore_if_exists: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameFileOptions {
    #[serde(default)]
    pub overwrite: Option<bool>,
    #[serde(default)]
    pub ignore_if_exists: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteFileOptions {
    #[serde(default)]
    pub recursive: Option<bool>,
    #[serde(default)]
    pub ignore_if_not_exists: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ResourceOperation {
    Create {
        uri: String,
        #[serde(default)]
        options: Option<CreateFileOptions>,
    },
    #[serde(rename_all = "camelCase")]
    Rename {
        old_uri: String,
        new_uri: String,
        #[serde(default)]
        options: Option<RenameFileOptions>,
    },
    Delete {
        uri: String,
        #[serde(default)]
        options: Option<DeleteFileOptions>,
    },
}

/// One entry of `WorkspaceEdit.documentChanges`.
///
/// File operations carry a `kind` discriminator; text edit groups do not, so
/// the operation variant is tried first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocumentChange {
    Operation(ResourceOperation),
    Edit(LspTextDocumentEdit),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspWorkspaceEdit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changes: Option<IndexMap<String, Vec<LspTextEdit>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_changes: Option<Vec<DocumentChange>>,
}

impl LspWorkspaceEdit {
    /// `null` (no edit) maps to `None`.
    pub fn from_value(value: Value) -> Result<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value)
            .map(Some)
            .context("failed to parse WorkspaceEdit")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspDiagnostic {
    pub range: LspRange,
    #[serde(default)]
    pub severity: Option<u32>,
    #[serde(default)]
    pub code: Option<Value>,
    #[serde(default)]
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublishDiagnosticsParams {
    pub uri: String,
    pub diagnostics: Vec<LspDiagnostic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspTextDocumentItem {
    pub uri: String,
    pub language_id: String,
    pub version: i32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspTextDocumentIdentifier {
    pub uri: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspVersionedTextDocumentIdentifier {
    pub uri: String,
    pub version: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LspTextDocumentContentChangeEvent {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LspTextDocumentPositionParams {
    pub text_document: LspTextDocumentIdentifier,
    pub position: LspPosition,
}

/// A request that got no response within its deadline.
///
/// Carried inside `anyhow::Error`; use [`is_request_timeout`] to classify.
#[derive(Debug, Clone, Error)]
#[error("LSP request timed out: {method}")]
pub struct RequestTimeout {
    pub method: String,
}

/// A JSON-RPC error response.
#[derive(Debug, Clone, Error)]
#[error("LSP error for {method}: {message} (code {code})")]
pub struct ResponseError {
    pub method: String,
    pub code: i64,
    pub message: String,
}

pub fn is_request_timeout(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<RequestTimeout>())
}

fn is_method_not_found(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<ResponseError>())
        .any(|e| e.code == METHOD_NOT_FOUND)
}

#[derive(Debug, Clone)]
pub struct LspClientOptions {
    /// Launch argv; the first element is the executable.
    pub command: Vec<String>,
    /// Workspace root; becomes the process cwd and the `rootUri`.
    pub root: PathBuf,
    pub request_timeout: Duration,
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct Shared {
    writer: Mutex<Writer>,
    pending: Mutex<HashMap<i64, oneshot::Sender<Value>>>,
    diagnostics: Mutex<HashMap<String, Vec<LspDiagnostic>>>,
    diagnostics_notify: Notify,
}

/// JSON-RPC connection to one language server process.
pub struct LspClient {
    shared: Arc<Shared>,
    child: Mutex<Option<Child>>,
    next_id: AtomicI64,
    root_uri: String,
    diagnostic_pull_supported: AtomicU8, // 0=unknown, 1=yes, 2=no
    default_request_timeout: Duration,
}

impl LspClient {
    /// Starts the server process and its reader tasks. The handshake is a
    /// separate step, see [`LspClient::initialize`].
    pub fn spawn(options: LspClientOptions) -> Result<Self> {
        let (program, args) = options
            .command
            .split_first()
            .ok_or_else(|| anyhow!("LSP server command must not be empty"))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&options.root)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn LSP server: {program}"))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("failed to capture LSP stdin"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("failed to capture LSP stdout"))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| anyhow!("failed to capture LSP stderr"))?;

        spawn_stderr_logger(stderr);
        Self::with_streams(
            stdout,
            stdin,
            &options.root,
            options.request_timeout,
            Some(child),
        )
    }

    /// Builds a client over arbitrary streams (no child process).
    pub fn from_transport<R, W>(
        reader: R,
        writer: W,
        root: &Path,
        request_timeout: Duration,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_streams(reader, writer, root, request_timeout, None)
    }

    fn with_streams<R, W>(
        reader: R,
        writer: W,
        root: &Path,
        request_timeout: Duration,
        child: Option<Child>,
    ) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let root_uri = Url::from_directory_path(root)
            .map_err(|_| anyhow!("failed to build rootUri for {root:?}"))?
            .to_string();

        let shared = Arc::new(Shared {
            writer: Mutex::new(Box::new(writer)),
            pending: Mutex::new(HashMap::new()),
            diagnostics: Mutex::new(HashMap::new()),
            diagnostics_notify: Notify::new(),
        });

        let reader_shared = shared.clone();
        tokio::spawn(async move {
            run_reader(BufReader::new(reader), reader_shared).await;
        });

        Ok(Self {
            shared,
            child: Mutex::new(child),
            next_id: AtomicI64::new(1),
            root_uri,
            diagnostic_pull_supported: AtomicU8::new(0),
            default_request_timeout: request_timeout,
        })
    }

    /// `initialize` request followed by the `initialized` notification.
    pub async fn initialize(&self, initialize_timeout: Duration) -> Result<()> {
        let params = serde_json::json!({
            "processId": std::process::id(),
            "rootUri": self.root_uri,
            "capabilities": {
                "textDocument": {
                    "synchronization": { "didSave": false },
                    "definition": { "linkSupport": true },
                    "references": {},
                    "rename": { "prepareSupport": false },
                    "publishDiagnostics": { "relatedInformation": false },
                    "diagnostic": { "dynamicRegistration": false }
                },
                "workspace": {
                    "workspaceEdit": {
                        "documentChanges": true,
                        "resourceOperations": ["create", "rename", "delete"]
                    },
                    "configuration": true,
                    "workspaceFolders": true
                }
            },
            "workspaceFolders": [
                { "uri": self.root_uri, "name": "workspace" }
            ]
        });

        let result = self
            .send_request("initialize", &params, Some(initialize_timeout))
            .await?;
        let pull = result
            .get("capabilities")
            .and_then(|c| c.get("diagnosticProvider"))
            .is_some_and(|p| !p.is_null());
        self.diagnostic_pull_supported
            .store(if pull { 1 } else { 2 }, Ordering::Relaxed);

        self.send_notification("initialized", &serde_json::json!({}))
            .await
    }

    pub async fn did_open(
        &self,
        path: &Path,
        language_id: &str,
        version: i32,
        text: String,
    ) -> Result<()> {
        let uri = path_to_uri(path)?;
        self.forget_diagnostics(&uri).await;
        let document = LspTextDocumentItem {
            uri,
            language_id: language_id.to_string(),
            version,
            text,
        };
        let params = serde_json::json!({ "textDocument": document });
        self.send_notification("textDocument/didOpen", &params)
            .await
    }

    pub async fn did_change(&self, path: &Path, version: i32, text: String) -> Result<()> {
        let uri = path_to_uri(path)?;
        self.forget_diagnostics(&uri).await;
        let document = LspVersionedTextDocumentIdentifier { uri, version };
        let change = LspTextDocumentContentChangeEvent { text };
        let params = serde_json::json!({
            "textDocument": document,
            "contentChanges": [change]
        });
        self.send_notification("textDocument/didChange", &params)
            .await
    }

    pub async fn definition(&self, path: &Path, position: LspPosition) -> Result<Value> {
        let params = LspTextDocumentPositionParams {
            text_document: LspTextDocumentIdentifier {
                uri: path_to_uri(path)?,
            },
            position,
        };
        self.send_request("textDocument/definition", &params, None)
            .await
    }

    pub async fn references(
        &self,
        path: &Path,
        position: LspPosition,
        include_declaration: bool,
    ) -> Result<Value> {
        let params = serde_json::json!({
            "textDocument": { "uri": path_to_uri(path)? },
            "position": position,
            "context": { "includeDeclaration": include_declaration }
        });
        self.send_request("textDocument/references", &params, None)
            .await
    }

    pub async fn rename(
        &self,
        path: &Path,
        position: LspPosition,
        new_name: &str,
    ) -> Result<Value> {
        let params = serde_json::json!({
            "textDocument": { "uri": path_to_uri(path)? },
            "position": position,
            "newName": new_name
        });
        self.send_request("textDocument/rename", &params, None)
            .await
    }

    /// Pull diagnostics. `Ok(None)` means the server does not support pulling.
    pub async fn document_diagnostics(
        &self,
        path: &Path,
        request_timeout: Duration,
    ) -> Result<Option<Vec<LspDiagnostic>>> {
        if self.diagnostic_pull_supported.load(Ordering::Relaxed) == 2 {
            return Ok(None);
        }

        let params = serde_json::json!({
            "textDocument": { "uri": path_to_uri(path)? },
            "identifier": null,
            "previousResultId": null
        });

        match self
            .send_request("textDocument/diagnostic", &params, Some(request_timeout))
            .await
        {
            Ok(value) => {
                self.diagnostic_pull_supported.store(1, Ordering::Relaxed);
                parse_document_diagnostic_report(value).map(Some)
            }
            Err(err) if is_method_not_found(&err) => {
                self.diagnostic_pull_supported.store(2, Ordering::Relaxed);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    pub async fn cached_diagnostics(&self, path: &Path) -> Result<Option<Vec<LspDiagnostic>>> {
        let uri = path_to_uri(path)?;
        let guard = self.shared.diagnostics.lock().await;
        Ok(guard.get(&uri).cloned())
    }

    /// Waits up to `max_wait` for a `publishDiagnostics` for `path`.
    ///
    /// Returns the cached set immediately when one exists; an empty list when
    /// nothing arrives in time.
    pub async fn wait_for_diagnostics(
        &self,
        path: &Path,
        max_wait: Duration,
    ) -> Result<Vec<LspDiagnostic>> {
        let deadline = tokio::time::Instant::now() + max_wait;
        loop {
            let notified = self.shared.diagnostics_notify.notified();
            if let Some(existing) = self.cached_diagnostics(path).await? {
                return Ok(existing);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn forget_diagnostics(&self, uri: &str) {
        self.shared.diagnostics.lock().await.remove(uri);
    }

    pub async fn send_request<T: Serialize>(
        &self,
        method: &str,
        params: &T,
        request_timeout: Option<Duration>,
    ) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.shared.pending.lock().await.insert(id, tx);

        let request = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        if let Err(err) = write_message(&self.shared.writer, &request).await {
            self.shared.pending.lock().await.remove(&id);
            return Err(err.context(format!("failed to send {method}")));
        }

        let wait = request_timeout.unwrap_or(self.default_request_timeout);
        let response_value = match timeout(wait, rx).await {
            Ok(Ok(value)) => value,
            Ok(Err(_)) => return Err(anyhow!("LSP connection closed while waiting for {method}")),
            Err(_) => {
                self.shared.pending.lock().await.remove(&id);
                return Err(RequestTimeout {
                    method: method.to_string(),
                }
                .into());
            }
        };

        if let Some(error) = response_value.get("error") {
            return Err(ResponseError {
                method: method.to_string(),
                code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            }
            .into());
        }

        Ok(response_value.get("result").cloned().unwrap_or(Value::Null))
    }

    pub async fn send_notification<T: Serialize>(&self, method: &str, params: &T) -> Result<()> {
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        write_message(&self.shared.writer, &notification).await
    }

    /// Sends `shutdown` + `exit`, then kills and reaps the process.
    ///
    /// A server that does not answer the polite part is still stopped; only
    /// a process that cannot be killed or reaped is reported as an error.
    pub async fn shutdown(&self) -> Result<()> {
        if let Err(err) = self
            .send_request("shutdown", &Value::Null, Some(Duration::from_secs(2)))
            .await
        {
            debug!("LSP shutdown request failed: {err:#}");
        }
        if let Err(err) = self.send_notification("exit", &Value::Null).await {
            debug!("LSP exit notification failed: {err:#}");
        }

        let Some(mut child) = self.child.lock().await.take() else {
            return Ok(());
        };
        match child
            .try_wait()
            .context("failed to poll LSP server process")?
        {
            Some(status) => debug!("LSP server exited with {status}"),
            None => child
                .kill()
                .await
                .context("failed to kill LSP server process")?,
        }
        Ok(())
    }
}

fn parse_document_diagnostic_report(value: Value) -> Result<Vec<LspDiagnostic>> {
    // DocumentDiagnosticReport: { kind: "full", items: Diagnostic[] } or { kind: "unchanged" }.
    let Some(items) = value.get("items").and_then(|v| v.as_array()) else {
        return Ok(Vec::new());
    };

    serde_json::from_value(Value::Array(items.clone())).context("failed to parse Diagnostic[]")
}

/// Decodes a definition/references result: `null`, one location, or an array.
pub fn parse_locations(value: Value) -> Result<Vec<AnyLocation>> {
    match value {
        Value::Null => Ok(Vec::new()),
        Value::Array(_) => serde_json::from_value(value).context("failed to parse Location[]"),
        other => serde_json::from_value(other)
            .map(|loc| vec![loc])
            .context("failed to parse Location"),
    }
}

async fn write_message(writer: &Mutex<Writer>, value: &Value) -> Result<()> {
    let body = serde_json::to_vec(value)?;
    let header = format!("Content-Length: {}\r\n\r\n", body.len());
    let mut writer = writer.lock().await;
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

async fn run_reader<R: AsyncBufRead + Unpin>(mut reader: R, shared: Arc<Shared>) {
    loop {
        match read_lsp_message(&mut reader).await {
            Ok(Some(message)) => handle_lsp_message(message, &shared).await,
            Ok(None) => break,
            Err(err) => {
                warn!("failed to read LSP message: {err:#}");
                break;
            }
        }
    }
    // Dropping the senders wakes every waiter with a closed-channel error.
    shared.pending.lock().await.clear();
    debug!("LSP reader stopped");
}

async fn handle_lsp_message(message: Value, shared: &Shared) {
    let method = message.get("method").and_then(Value::as_str);
    let id = message.get("id").cloned();

    match (method, id) {
        (Some(method), Some(id)) => {
            let result = server_request_result(method, message.get("params"));
            debug!("answering server request {method}");
            let response = serde_json::json!({ "jsonrpc": "2.0", "id": id, "result": result });
            if let Err(err) = write_message(&shared.writer, &response).await {
                warn!("failed to answer server request {method}: {err:#}");
            }
        }
        (Some("textDocument/publishDiagnostics"), None) => {
            let Some(params) = message.get("params") else {
                return;
            };
            match serde_json::from_value::<PublishDiagnosticsParams>(params.clone()) {
                Ok(p) => {
                    shared.diagnostics.lock().await.insert(p.uri, p.diagnostics);
                    shared.diagnostics_notify.notify_waiters();
                }
                Err(err) => warn!("failed to parse publishDiagnostics params: {err:#}"),
            }
        }
        (Some("window/logMessage" | "window/showMessage"), None) => {
            if let Some(text) = message
                .get("params")
                .and_then(|p| p.get("message"))
                .and_then(Value::as_str)
            {
                debug!(target: "lsp.stderr", "{text}");
            }
        }
        (Some(_), None) => {}
        (None, Some(id)) => {
            let id = match id {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.parse::<i64>().ok(),
                _ => None,
            };
            let Some(id) = id else {
                return;
            };
            let tx = shared.pending.lock().await.remove(&id);
            match tx {
                Some(tx) => {
                    let _ = tx.send(message);
                }
                None => debug!("received response for unknown id: {id}"),
            }
        }
        (None, None) => debug!("ignoring LSP message without method or id"),
    }
}

/// Result for a request sent by the server. Servers block on some of these
/// (`workspace/configuration` in particular), so each gets a neutral answer.
fn server_request_result(method: &str, params: Option<&Value>) -> Value {
    match method {
        "workspace/configuration" => {
            let count = params
                .and_then(|p| p.get("items"))
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0);
            Value::Array(vec![Value::Null; count])
        }
        _ => Value::Null,
    }
}

async fn read_lsp_message<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<Value>> {
    let mut content_length: Option<usize> = None;

    loop {
        let mut line = String::new();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(None);
        }

        let line_trimmed = line.trim_end_matches(['\r', '\n']);
        if line_trimmed.is_empty() {
            break;
        }

        if let Some((name, value)) = line_trimmed.split_once(':')
            && name.trim().eq_ignore_ascii_case("content-length")
        {
            content_length = value.trim().parse::<usize>().ok();
        }
    }

    let Some(len) = content_length else {
        return Err(anyhow!("missing Content-Length header"));
    };

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await?;
    let value: Value = serde_json::from_slice(&buf)?;
    Ok(Some(value))
}

fn spawn_stderr_logger<R: AsyncRead + Send + Unpin + 'static>(stderr: R) {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        loop {
            let mut line = String::new();
            match reader.read_line(&mut line).await {
                Ok(0) => break,
                Ok(_) => debug!(target: "lsp.stderr", "{}", line.trim_end()),
                Err(_) => break,
            }
        }
    });
}

pub fn path_to_uri(path: &Path) -> Result<String> {
    Url::from_file_path(path)
        .map_err(|_| anyhow!("failed to convert path to file URI: {path:?}"))
        .map(|u| u.to_string())
}

pub fn uri_to_path(uri: &str) -> Result<PathBuf> {
    let url = Url::parse(uri).with_context(|| format!("invalid URI: {uri}"))?;
    if url.scheme() != "file" {
        return Err(anyhow!("unsupported URI scheme: {}", url.scheme()));
    }
    url.to_file_path()
        .map_err(|_| anyhow!("failed to convert URI to path: {uri}"))
}
