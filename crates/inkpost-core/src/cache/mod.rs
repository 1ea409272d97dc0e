//! Offline content cache and the preloader that fills it.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::clock::Clock;
use crate::config::CacheBudget;
use crate::db::{LocalStore, Namespace, NamespaceUsage};
use crate::error::{Error, Result};
use crate::models::{Blog, CachedBlog};
use crate::network::NetworkMonitor;
use crate::remote::{with_timeout, BlogService, RemoteResult};
use crate::util::{duration_millis, normalize_text_option};

/// Budgeted, LRU-evicting store of full blog snapshots.
#[derive(Clone)]
pub struct BlogCache {
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    budget: CacheBudget,
    ttl: Duration,
}

impl BlogCache {
    pub fn new(
        store: Arc<LocalStore>,
        clock: Arc<dyn Clock>,
        budget: CacheBudget,
        ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            budget,
            ttl,
        }
    }

    /// Read a snapshot and mark it recently used.
    pub fn get(&self, blog_id: &str) -> Result<Option<CachedBlog>> {
        self.store
            .get_and_touch(Namespace::Blogs, blog_id, self.clock.now_ms())
    }

    /// Read a snapshot without affecting eviction order.
    pub fn peek(&self, blog_id: &str) -> Result<Option<CachedBlog>> {
        self.store.get(Namespace::Blogs, blog_id)
    }

    pub fn contains(&self, blog_id: &str) -> Result<bool> {
        self.store.contains(Namespace::Blogs, blog_id)
    }

    /// Whether the snapshot is younger than the cache TTL.
    pub fn is_fresh(&self, cached: &CachedBlog) -> bool {
        !cached.is_stale(self.clock.now_ms(), duration_millis(self.ttl))
    }

    /// Store a blog, evicting least recently used entries to stay in budget.
    pub fn insert(&self, blog: Blog) -> Result<CachedBlog> {
        let blog_id = blog.id.clone();
        self.insert_as(&blog_id, blog)
    }

    /// Store a blog under the id it was requested by, which may differ from
    /// the id the server reports (e.g. a slug).
    pub fn insert_as(&self, blog_id: &str, blog: Blog) -> Result<CachedBlog> {
        let now_ms = self.clock.now_ms();
        let mut cached = CachedBlog::new(blog, now_ms);
        cached.blog_id = blog_id.to_string();
        let evicted = self.store.put_within_budget(
            Namespace::Blogs,
            &cached.blog_id,
            &cached,
            now_ms,
            self.budget,
        )?;
        if !evicted.is_empty() {
            tracing::warn!(
                "Evicted {} cached blog(s) to fit {}: {}",
                evicted.len(),
                cached.blog_id,
                evicted.join(", ")
            );
        }
        Ok(cached)
    }

    pub fn remove(&self, blog_id: &str) -> Result<bool> {
        self.store.remove(Namespace::Blogs, blog_id)
    }

    /// All snapshots, oldest insert first.
    pub fn list(&self) -> Result<Vec<CachedBlog>> {
        self.store.scan(Namespace::Blogs)
    }

    pub fn usage(&self) -> Result<NamespaceUsage> {
        self.store.usage(Namespace::Blogs)
    }

    /// Purge every snapshot. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        self.store.clear(Namespace::Blogs)
    }
}

/// One blog id the preloader could not cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreloadFailure {
    pub blog_id: String,
    pub error: String,
}

/// Aggregate outcome of a preload request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreloadReport {
    /// Fetched and written during this request
    pub cached: Vec<String>,
    /// Already present and fresh (or present while offline)
    pub already_cached: Vec<String>,
    pub failed: Vec<PreloadFailure>,
}

impl PreloadReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, blog_id: String, error: impl ToString) {
        self.failed.push(PreloadFailure {
            blog_id,
            error: error.to_string(),
        });
    }
}

/// Where a looked-up blog came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlogSource {
    Remote,
    Cache { cached_at: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBlog {
    pub blog: Blog,
    pub source: BlogSource,
}

/// Fetches full blog content ahead of time for offline reading.
#[derive(Clone)]
pub struct CachePreloader {
    cache: BlogCache,
    service: Arc<dyn BlogService>,
    network: NetworkMonitor,
    request_timeout: Duration,
}

impl CachePreloader {
    pub fn new(
        cache: BlogCache,
        service: Arc<dyn BlogService>,
        network: NetworkMonitor,
        request_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            service,
            network,
            request_timeout,
        }
    }

    async fn fetch(&self, blog_id: &str) -> RemoteResult<Blog> {
        with_timeout(self.request_timeout, self.service.get_blog_by_id(blog_id)).await
    }

    /// Cache every listed blog that is missing or stale.
    ///
    /// Ids are trimmed and deduplicated. A failure for one id never affects
    /// the others. While offline no remote call is made and every id without
    /// a local snapshot is reported as failed.
    pub async fn preload<I, S>(&self, blog_ids: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let blog_ids = blog_ids
            .into_iter()
            .filter_map(|id| normalize_text_option(Some(id.as_ref().to_string())))
            .filter(|id| seen.insert(id.clone()))
            .collect::<Vec<_>>();

        let mut report = PreloadReport::default();
        for blog_id in blog_ids {
            let offline = self.network.is_offline();
            match self.cache.peek(&blog_id) {
                Ok(Some(cached)) if offline || self.cache.is_fresh(&cached) => {
                    report.already_cached.push(blog_id);
                    continue;
                }
                Ok(_) => {}
                Err(error) => {
                    tracing::error!("Failed to read cached blog {blog_id}: {error}");
                    report.fail(blog_id, error);
                    continue;
                }
            }

            if offline {
                report.fail(blog_id, "offline: blog is not cached");
                continue;
            }

            match self.fetch(&blog_id).await {
                Ok(blog) => match self.cache.insert_as(&blog_id, blog) {
                    Ok(_) => report.cached.push(blog_id),
                    Err(error) => {
                        tracing::warn!("Failed to cache blog {blog_id}: {error}");
                        report.fail(blog_id, error);
                    }
                },
                Err(error) => {
                    tracing::warn!("Failed to preload blog {blog_id}: {error}");
                    report.fail(blog_id, error);
                }
            }
        }

        tracing::info!(
            "Preload finished: {} cached, {} already cached, {} failed",
            report.cached.len(),
            report.already_cached.len(),
            report.failed.len()
        );
        report
    }

    /// Read-through lookup.
    ///
    /// Online, the remote copy is fetched and cached. While offline, or when
    /// the fetch fails transiently, the cached snapshot is returned instead.
    /// `Ok(None)` means the blog is unavailable offline.
    pub async fn get_blog(&self, blog_id: &str) -> Result<Option<FetchedBlog>> {
        let blog_id = blog_id.trim();
        if blog_id.is_empty() {
            return Err(Error::InvalidInput("blog id must not be empty".into()));
        }

        if !self.network.is_offline() {
            match self.fetch(blog_id).await {
                Ok(blog) => {
                    if let Err(error) = self.cache.insert_as(blog_id, blog.clone()) {
                        tracing::warn!("Failed to cache blog {blog_id}: {error}");
                    }
                    return Ok(Some(FetchedBlog {
                        blog,
                        source: BlogSource::Remote,
                    }));
                }
                Err(error) if error.is_transient() => {
                    tracing::warn!("Falling back to cached copy of {blog_id}: {error}");
                    return match self.cached(blog_id)? {
                        Some(found) => Ok(Some(found)),
                        None => Err(error.into()),
                    };
                }
                Err(error) => return Err(error.into()),
            }
        }

        self.cached(blog_id)
    }

    fn cached(&self, blog_id: &str) -> Result<Option<FetchedBlog>> {
        Ok(self.cache.get(blog_id)?.map(|cached| FetchedBlog {
            source: BlogSource::Cache {
                cached_at: cached.cached_at,
            },
            blog: cached.content,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::models::{BlogMutationPayload, ConnectionType, NetworkState};
    use crate::remote::RemoteError;
    use crate::test_support::MockBlogService;
    use pretty_assertions::assert_eq;

    const TTL: Duration = Duration::from_secs(60);

    fn blog(id: &str) -> Blog {
        Blog::from_payload(id, &BlogMutationPayload::new(format!("Title {id}"), "body"))
    }

    fn cache_with(budget: CacheBudget) -> (BlogCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        (BlogCache::new(store, clock.clone(), budget, TTL), clock)
    }

    fn preloader(
        online: bool,
    ) -> (CachePreloader, Arc<MockBlogService>, NetworkMonitor, Arc<ManualClock>) {
        let (cache, clock) = cache_with(CacheBudget::default());
        let service = MockBlogService::new();
        let state = if online {
            NetworkState::online(ConnectionType::Wifi)
        } else {
            NetworkState::offline()
        };
        let network = NetworkMonitor::new(state, Duration::ZERO);
        let preloader = CachePreloader::new(
            cache,
            service.clone(),
            network.clone(),
            Duration::from_secs(15),
        );
        (preloader, service, network, clock)
    }

    #[test]
    fn insert_evicts_least_recently_used() {
        let (cache, clock) = cache_with(CacheBudget {
            max_entries: 2,
            max_bytes: 1024 * 1024,
        });
        cache.insert(blog("a")).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.insert(blog("b")).unwrap();
        clock.advance(Duration::from_secs(1));
        cache.get("a").unwrap();
        clock.advance(Duration::from_secs(1));
        cache.insert(blog("c")).unwrap();

        assert!(cache.contains("a").unwrap());
        assert!(!cache.contains("b").unwrap());
        assert!(cache.contains("c").unwrap());
        assert_eq!(cache.usage().unwrap().entries, 2);
    }

    #[test]
    fn freshness_follows_ttl() {
        let (cache, clock) = cache_with(CacheBudget::default());
        let cached = cache.insert(blog("a")).unwrap();
        assert!(cache.is_fresh(&cached));
        clock.advance(TTL);
        assert!(!cache.is_fresh(&cached));
    }

    #[tokio::test]
    async fn preload_dedupes_and_isolates_failures() {
        let (preloader, service, _, _) = preloader(true);
        service.insert_blog(blog("b1"));
        service.insert_blog(blog("b3"));
        service.fail_fetch("b2", RemoteError::Server {
            status: 503,
            message: "busy".into(),
        });

        let report = preloader.preload(["b1", " b1 ", "b2", "b3", ""]).await;

        assert_eq!(report.cached, vec!["b1".to_string(), "b3".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].blog_id, "b2");
        assert_eq!(service.fetch_count(), 3);
    }

    #[tokio::test]
    async fn preload_skips_fresh_and_refetches_stale() {
        let (preloader, service, _, clock) = preloader(true);
        service.insert_blog(blog("b1"));

        preloader.preload(["b1"]).await;
        let report = preloader.preload(["b1"]).await;
        assert_eq!(report.already_cached, vec!["b1".to_string()]);
        assert_eq!(service.fetch_count(), 1);

        clock.advance(TTL);
        let report = preloader.preload(["b1"]).await;
        assert_eq!(report.cached, vec!["b1".to_string()]);
        assert_eq!(service.fetch_count(), 2);
    }

    #[tokio::test]
    async fn preload_keys_entries_by_requested_id() {
        let (preloader, service, _, _) = preloader(true);
        service.insert_blog_as("my-first-post", blog("b1"));

        let report = preloader.preload(["my-first-post"]).await;

        assert_eq!(report.cached, vec!["my-first-post".to_string()]);
        assert!(preloader.cache.contains("my-first-post").unwrap());
        let cached = preloader.cache.peek("my-first-post").unwrap().unwrap();
        assert_eq!(cached.content.id, "b1");

        let report = preloader.preload(["my-first-post"]).await;
        assert_eq!(report.already_cached, vec!["my-first-post".to_string()]);
        assert_eq!(service.fetch_count(), 1);
    }

    #[tokio::test]
    async fn preload_offline_makes_no_remote_calls() {
        let (preloader, service, _, _) = preloader(false);
        service.insert_blog(blog("b1"));

        let report = preloader.preload(["b1", "b2"]).await;

        assert!(report.cached.is_empty());
        assert_eq!(report.failed.len(), 2);
        assert_eq!(service.fetch_count(), 0);
    }

    #[tokio::test]
    async fn get_blog_falls_back_to_cache() {
        let (preloader, service, network, _) = preloader(true);
        service.insert_blog(blog("b1"));

        let fetched = preloader.get_blog("b1").await.unwrap().unwrap();
        assert_eq!(fetched.source, BlogSource::Remote);

        service.fail_fetch("b1", RemoteError::Network("reset".into()));
        let fetched = preloader.get_blog("b1").await.unwrap().unwrap();
        assert!(matches!(fetched.source, BlogSource::Cache { .. }));

        network.report(NetworkState::offline());
        let calls = service.fetch_count();
        let fetched = preloader.get_blog("b1").await.unwrap().unwrap();
        assert_eq!(fetched.blog.id, "b1");
        assert_eq!(service.fetch_count(), calls);
        assert_eq!(preloader.get_blog("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn get_blog_surfaces_permanent_errors() {
        let (preloader, _, _, _) = preloader(true);
        let result = preloader.get_blog("gone").await;
        assert!(matches!(result, Err(Error::Remote(RemoteError::NotFound(_)))));
    }
}
