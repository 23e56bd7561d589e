//
// error.rs
//
// Error kinds produced by the core indexing/resolution engine (spec §7).
//

use std::path::Path;

use thiserror::Error;

/// Errors the core engine can report. Document- and folder-level errors
/// never bubble up to crash the server; only `NoWorkspace` during
/// `initialize` is fatal (handled in `backend`).
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("handler invoked before the server was initialized")]
    NotInitialized,

    #[error("no workspace folders could be resolved from the initialize request")]
    NoWorkspace,

    #[error("'{0}' is not a valid absolute file URI or path")]
    BadPath(String),

    // `Path`/`PathBuf` don't implement `Display` (paths aren't guaranteed
    // UTF-8), so the printable form is captured up front via `.display()`.
    #[error("failed to read '{path}': {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no document found for '{0}'")]
    UnknownDocument(String),

    #[error("invalid edit: {0}")]
    InvalidEdit(String),
}

impl ServerError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        ServerError::IoError {
            path: path.display().to_string(),
            source,
        }
    }

    pub fn unknown_document(path: &Path) -> Self {
        ServerError::UnknownDocument(path.display().to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

impl From<ServerError> for tower_lsp::jsonrpc::Error {
    fn from(err: ServerError) -> Self {
        let mut rpc_err = tower_lsp::jsonrpc::Error::internal_error();
        rpc_err.message = err.to_string().into();
        rpc_err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_to_internal_rpc_error() {
        let rpc_err: tower_lsp::jsonrpc::Error = ServerError::NotInitialized.into();
        assert_eq!(rpc_err.code, tower_lsp::jsonrpc::ErrorCode::InternalError);
    }
}
