//! Cached blog snapshot model

use serde::{Deserialize, Serialize};

use super::Blog;

/// Full blog content kept locally for offline reading
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedBlog {
    pub blog_id: String,
    pub content: Blog,
    /// When the snapshot was fetched (Unix ms)
    pub cached_at: i64,
}

impl CachedBlog {
    #[must_use]
    pub fn new(content: Blog, cached_at: i64) -> Self {
        Self {
            blog_id: content.id.clone(),
            content,
            cached_at,
        }
    }

    /// Whether the snapshot is older than `ttl_ms` at `now_ms`.
    pub const fn is_stale(&self, now_ms: i64, ttl_ms: i64) -> bool {
        now_ms.saturating_sub(self.cached_at) >= ttl_ms
    }
}
