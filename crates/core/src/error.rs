use crate::scripting::loader::LoadFailure;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Syntactically invalid input, rejected before any I/O.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A resolved destination that lands outside the script base directory.
    #[error("Resolved path escapes script base directory: {0}")]
    PathEscape(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Load(#[from] LoadFailure),
}
