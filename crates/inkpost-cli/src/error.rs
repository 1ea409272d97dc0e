use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] inkpost_core::Error),
    #[error(transparent)]
    Remote(#[from] inkpost_core::RemoteError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No post content provided")]
    EmptyContent,
    #[error("No post title provided; pass --title")]
    EmptyTitle,
    #[error("Draft ID cannot be empty")]
    EmptyDraftId,
    #[error("Draft not found for id/prefix: {0}")]
    DraftNotFound(String),
    #[error("{0}")]
    AmbiguousDraftId(String),
    #[error("Blog {0} is not available offline")]
    BlogUnavailable(String),
    #[error("Editor command failed: {0}")]
    EditorFailed(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Refusing to delete unsynced drafts without --yes")]
    ConfirmationRequired,
}
