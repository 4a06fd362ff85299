//! Error taxonomy shared by the stores, the projector and the API client.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// A named preset or template does not exist
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("validation failed: {0}")]
    Validation(String),

    /// A JSON document on disk exists but could not be parsed
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Transport failure, non-success status or malformed body from the API
    #[error("request to {endpoint} failed: {reason}")]
    Upstream { endpoint: String, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn preset_not_found(name: impl Into<String>) -> Self {
        Error::NotFound { kind: "preset", name: name.into() }
    }

    pub fn template_not_found(name: impl Into<String>) -> Self {
        Error::NotFound { kind: "template", name: name.into() }
    }

    pub fn upstream(endpoint: &str, reason: impl ToString) -> Self {
        Error::Upstream {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Attach a "what were we doing with which path" context to io results
pub(crate) trait IoResultExt<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, action: &str, path: &Path) -> Result<T> {
        self.map_err(|source| Error::Io {
            context: format!("Failed to {action} {path:?}"),
            source,
        })
    }
}
