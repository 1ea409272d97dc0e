//! inkpost-core - Offline engine for the Inkpost blog client
//!
//! This crate contains the models, local store, draft queue, sync engine and
//! content cache shared by every Inkpost host (CLI, desktop and mobile shells).
//! Hosts interact through [`OfflineFacade`].

pub mod cache;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod models;
pub mod network;
pub mod queue;
pub mod remote;
pub mod sync;
pub mod util;

#[cfg(test)]
mod test_support;

pub use cache::{BlogCache, BlogSource, CachePreloader, FetchedBlog, PreloadFailure, PreloadReport};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{parse_offline_config, CacheBudget, OfflineConfig, RetryPolicy};
pub use db::LocalStore;
pub use error::{Error, Result};
pub use facade::{BackgroundSync, OfflineFacade, OfflineSnapshot};
pub use models::{
    Blog, BlogMutationPayload, BlogStatus, CachedBlog, ConnectionType, Draft, DraftId,
    NetworkState, SyncStatus, SyncStatusSummary,
};
pub use network::NetworkMonitor;
pub use queue::{DraftPatch, DraftQueue};
pub use remote::{BlogService, HttpBlogService, RemoteError};
pub use sync::{PassOutcome, SyncEngine, SyncReport, SyncTrigger};
