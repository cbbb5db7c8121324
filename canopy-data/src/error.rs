use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the settings store and its storage backends.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Settings file not found: {0}")]
    Missing(PathBuf),

    #[error("Settings I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SettingsError>;
