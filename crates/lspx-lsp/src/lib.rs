mod lsp;
mod pool;
mod session;

pub use lsp::{
    AnyLocation, CreateFileOptions, DeleteFileOptions, DocumentChange, LspClient,
    LspClientOptions, LspDiagnostic, LspLocation, LspLocationLink, LspPosition, LspRange,
    LspTextDocumentEdit, LspTextEdit, LspWorkspaceEdit, RenameFileOptions, RequestTimeout,
    ResourceOperation, ResponseError, is_request_timeout, parse_locations, path_to_uri,
    uri_to_path,
};
pub use pool::{ClientPool, HandlePhase, HandleSnapshot, PoolKey, PoolOptions, PooledClient};
pub use session::{LanguageServer, LspSession, ServerLauncher, StdioLauncher};
