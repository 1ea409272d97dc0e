//! Data models for Inkpost

mod blog;
mod cache;
mod draft;
mod network;

pub use blog::{Blog, BlogMutationPayload, BlogStatus};
pub use cache::CachedBlog;
pub use draft::{Draft, DraftId, SyncStatus, SyncStatusSummary};
pub use network::{ConnectionType, NetworkState};
