/// Error types for sandbox lifecycle and command operations.
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by [`crate::sandbox::Sandbox`] and its components.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// A config accessor or command was used before `init()` succeeded.
    #[error("The sandbox must be initialized by calling the \"init()\" method")]
    NotInitialized,

    /// The scenario configuration file could not be read or parsed.
    #[error("failed to load sandbox config {path}: {source}")]
    Config {
        path: PathBuf,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A filesystem operation failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A JSON document (package.json, module manifest) was malformed.
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// No package.json could be found for a declared Alliage module.
    #[error("cannot find module '{module}' (searched: {})", .searched.join(", "))]
    ModuleNotFound {
        module: String,
        searched: Vec<String>,
    },

    /// A `copyFiles` entry has no final path segment to name the copy.
    #[error("cannot copy '{path}': path has no file name")]
    InvalidCopySource { path: String },
}

impl SandboxError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_initialized_message() {
        assert_eq!(
            SandboxError::NotInitialized.to_string(),
            "The sandbox must be initialized by calling the \"init()\" method"
        );
    }

    #[test]
    fn test_module_not_found_lists_searched_dirs() {
        let err = SandboxError::ModuleNotFound {
            module: "@alliage/di".to_string(),
            searched: vec!["/a/node_modules".to_string(), "/b".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("@alliage/di"));
        assert!(msg.contains("/a/node_modules, /b"));
    }
}
