//! The ingestion request body.

use serde::Deserialize;
use validator::Validate;

use crate::error::CoreError;

/// A named script plus its source text, as submitted by a client.
///
/// Only shape limits are checked here; the filename's domain rules live in
/// [`validate_filename`](super::path::validate_filename).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ScriptUpload {
    /// Relative path under the script base directory, ending in `.rhai`.
    #[validate(length(min = 1, max = 255))]
    pub filename: String,
    /// Full Rhai source.
    #[serde(alias = "script")]
    #[validate(length(min = 1))]
    pub source: String,
}

impl ScriptUpload {
    /// Run the derived shape checks, mapping failures to a validation error.
    pub fn check_shape(&self) -> Result<(), CoreError> {
        self.validate()
            .map_err(|e| CoreError::Validation(e.to_string()))
    }
}
