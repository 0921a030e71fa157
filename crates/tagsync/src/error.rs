//! Error types for TagSync

use crate::tag::TagError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// TagSync error type
#[derive(Error, Debug)]
pub enum TagSyncError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tag error: {0}")]
    Tag(#[from] TagError),

    #[error("Config error: {0}")]
    Config(String),

    /// The scan reached a directory whose `tagsync.json` declares it a backup destination.
    #[error("Refusing to scan backup destination: {}", path.display())]
    DestinationGuard { path: PathBuf },

    #[error("Failed to write manifest {}: {source}", path.display())]
    ManifestWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Attribute store error on {}: {message}", path.display())]
    AttributeStore { path: PathBuf, message: String },

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),
}

impl TagSyncError {
    /// True for the destination-guard abort, which callers map to a reserved exit status.
    pub fn is_destination_guard(&self) -> bool {
        matches!(self, TagSyncError::DestinationGuard { .. })
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, TagSyncError>;
