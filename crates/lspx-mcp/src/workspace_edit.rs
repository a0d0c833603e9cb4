use std::path::{Path, PathBuf};

use lspx_core::ToolError;
use lspx_core::text_edit::{TextEdit, apply_text_edits_to_lines};
use lspx_core::workspace::validate_within_root;
use lspx_lsp::{
    CreateFileOptions, DeleteFileOptions, DocumentChange, LspTextEdit, LspWorkspaceEdit,
    RenameFileOptions, ResourceOperation, uri_to_path,
};
use serde::Serialize;
use tracing::{debug, warn};

/// Outcome of applying one WorkspaceEdit. Failures are per entry; whatever
/// was written before a failure stays written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ApplyResult {
    pub success: bool,
    pub files_modified: Vec<PathBuf>,
    pub total_edits: usize,
    pub errors: Vec<String>,
}

impl ApplyResult {
    fn record_error(&mut self, error: String) {
        warn!("workspace edit entry failed: {error}");
        self.success = false;
        self.errors.push(error);
    }
}

/// Applies `edit` below `root`.
///
/// `changes` are applied first, in the order the server sent them, then
/// `documentChanges` in array order. Every path is checked against `root` before it is read or written.
/// The file rename operation is read, write, delete: a failure after the
/// write leaves both files on disk.
pub async fn apply_workspace_edit(root: &Path, edit: Option<&LspWorkspaceEdit>) -> ApplyResult {
    let Some(edit) = edit else {
        return ApplyResult {
            success: false,
            errors: vec!["No edit provided".to_string()],
            ..Default::default()
        };
    };

    let mut result = ApplyResult {
        success: true,
        ..Default::default()
    };

    for (uri, edits) in edit.changes.iter().flatten() {
        apply_file_edits(root, uri, edits, &mut result).await;
    }

    for change in edit.document_changes.iter().flatten() {
        match change {
            DocumentChange::Edit(doc) => {
                apply_file_edits(root, &doc.text_document.uri, &doc.edits, &mut result).await;
            }
            DocumentChange::Operation(ResourceOperation::Create { uri, options }) => {
                let options = options.clone().unwrap_or_default();
                if let Err(err) = create_file(root, uri, &options, &mut result).await {
                    result.record_error(format!("Create {uri}: {err}"));
                }
            }
            DocumentChange::Operation(ResourceOperation::Rename {
                old_uri,
                new_uri,
                options,
            }) => {
                let options = options.clone().unwrap_or_default();
                if let Err(err) = rename_file(root, old_uri, new_uri, &options, &mut result).await
                {
                    result.record_error(format!("Rename {old_uri}: {err}"));
                }
            }
            DocumentChange::Operation(ResourceOperation::Delete { uri, options }) => {
                let options = options.clone().unwrap_or_default();
                if let Err(err) = delete_file(root, uri, &options, &mut result).await {
                    result.record_error(format!("Delete {uri}: {err}"));
                }
            }
        }
    }

    result
}

/// Maps a `file:` URI to a path inside `root`.
fn resolve_target(root: &Path, uri: &str) -> Result<PathBuf, String> {
    let path = uri_to_path(uri).map_err(|err| format!("{err:#}"))?;
    validate_within_root(&path, root).map_err(|err| err.to_string())
}

async fn apply_file_edits(root: &Path, uri: &str, edits: &[LspTextEdit], result: &mut ApplyResult) {
    let path = match resolve_target(root, uri) {
        Ok(path) => path,
        Err(err) => {
            result.record_error(format!("{uri}: {err}"));
            return;
        }
    };

    let edits: Vec<TextEdit> = edits.iter().map(TextEdit::from).collect();
    match rewrite_file(&path, &edits).await {
        Ok(()) => {
            debug!("applied {} edit(s) to {}", edits.len(), path.display());
            result.total_edits += edits.len();
            result.files_modified.push(path);
        }
        Err(err) => result.record_error(
            ToolError::Io {
                path,
                message: err.to_string(),
            }
            .to_string(),
        ),
    }
}

async fn rewrite_file(path: &Path, edits: &[TextEdit]) -> std::io::Result<()> {
    let content = tokio::fs::read_to_string(path).await?;
    let mut lines: Vec<String> = content.split('\n').map(str::to_string).collect();
    apply_text_edits_to_lines(&mut lines, edits)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
    tokio::fs::write(path, lines.join("\n")).await
}

async fn create_file(
    root: &Path,
    uri: &str,
    options: &CreateFileOptions,
    result: &mut ApplyResult,
) -> Result<(), String> {
    let path = resolve_target(root, uri)?;
    let overwrite = options.overwrite.unwrap_or(false);
    if !overwrite && options.ignore_if_exists.unwrap_or(false) && path.exists() {
        debug!("create skipped, {} exists", path.display());
        return Ok(());
    }

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }
    tokio::fs::write(&path, "")
        .await
        .map_err(|e| e.to_string())?;
    result.files_modified.push(path);
    Ok(())
}

async fn rename_file(
    root: &Path,
    old_uri: &str,
    new_uri: &str,
    options: &RenameFileOptions,
    result: &mut ApplyResult,
) -> Result<(), String> {
    let old_path = resolve_target(root, old_uri)?;
    let new_path = resolve_target(root, new_uri)?;
    let overwrite = options.overwrite.unwrap_or(false);
    if !overwrite && options.ignore_if_exists.unwrap_or(false) && new_path.exists() {
        debug!("rename skipped, {} exists", new_path.display());
        return Ok(());
    }

    let content = tokio::fs::read(&old_path)
        .await
        .map_err(|e| e.to_string())?;
    if let Some(parent) = new_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| e.to_string())?;
    }
    tokio::fs::write(&new_path, content)
        .await
        .map_err(|e| e.to_string())?;
    tokio::fs::remove_file(&old_path)
        .await
        .map_err(|e| e.to_string())?;
    result.files_modified.push(new_path);
    Ok(())
}

async fn delete_file(
    root: &Path,
    uri: &str,
    options: &DeleteFileOptions,
    result: &mut ApplyResult,
) -> Result<(), String> {
    let path = resolve_target(root, uri)?;
    let metadata = match tokio::fs::symlink_metadata(&path).await {
        Ok(metadata) => metadata,
        Err(err)
            if err.kind() == std::io::ErrorKind::NotFound
                && options.ignore_if_not_exists.unwrap_or(false) =>
        {
            return Ok(());
        }
        Err(err) => return Err(err.to_string()),
    };

    let removed = if metadata.is_dir() {
        if options.recursive.unwrap_or(false) {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_dir(&path).await
        }
    } else {
        tokio::fs::remove_file(&path).await
    };
    removed.map_err(|e| e.to_string())?;
    result.files_modified.push(path);
    Ok(())
}

/// Renders an [`ApplyResult`] for the agent.
pub fn format_apply_result(result: &ApplyResult) -> String {
    let mut lines = Vec::new();

    if result.success {
        lines.push(format!(
            "Applied {} edit(s) to {} file(s):",
            result.total_edits,
            result.files_modified.len()
        ));
        for file in &result.files_modified {
            lines.push(format!("  - {}", file.display()));
        }
    } else {
        lines.push("Failed to apply some changes:".to_string());
        for err in &result.errors {
            lines.push(format!("  Error: {err}"));
        }
        if !result.files_modified.is_empty() {
            let files: Vec<String> = result
                .files_modified
                .iter()
                .map(|p| p.display().to_string())
                .collect();
            lines.push(format!("Successfully modified: {}", files.join(", ")));
        }
    }

    lines.join("\n")
}
