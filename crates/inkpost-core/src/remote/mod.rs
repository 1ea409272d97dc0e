//! Boundary to the remote blog service.

mod http;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Blog, BlogMutationPayload};

pub use http::{classify_status, HttpBlogService};

/// Whether a failed remote call is worth retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network trouble, timeouts, server errors
    Transient,
    /// Validation errors and remote conflicts
    Permanent,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Request timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid response payload: {0}")]
    InvalidPayload(String),
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

impl RemoteError {
    pub const fn class(&self) -> FailureClass {
        match self {
            Self::Network(_) | Self::Timeout(_) | Self::Server { .. } => FailureClass::Transient,
            Self::Validation(_)
            | Self::Conflict(_)
            | Self::NotFound(_)
            | Self::InvalidPayload(_)
            | Self::InvalidConfiguration(_) => FailureClass::Permanent,
        }
    }

    pub const fn is_transient(&self) -> bool {
        matches!(self.class(), FailureClass::Transient)
    }
}

/// Remote blog operations the offline engine depends on.
#[async_trait]
pub trait BlogService: Send + Sync {
    async fn create_blog(&self, payload: &BlogMutationPayload) -> RemoteResult<Blog>;

    async fn update_blog(&self, blog_id: &str, payload: &BlogMutationPayload)
        -> RemoteResult<Blog>;

    async fn get_blog_by_id(&self, blog_id: &str) -> RemoteResult<Blog>;
}

/// Bound a remote call by `limit`; expiry becomes [`RemoteError::Timeout`].
pub(crate) async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = RemoteResult<T>> + Send,
) -> RemoteResult<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RemoteError::Timeout(limit)))
}
