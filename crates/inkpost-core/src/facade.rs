//! Single entry point for UI and CLI hosts.
//!
//! [`OfflineFacade`] composes the network monitor, draft queue, sync engine
//! and cache. It owns no state of its own beyond a derived snapshot channel
//! that hosts can watch instead of polling.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::cache::{BlogCache, CachePreloader, FetchedBlog, PreloadReport};
use crate::clock::{Clock, SystemClock};
use crate::config::OfflineConfig;
use crate::db::LocalStore;
use crate::error::{Error, Result};
use crate::models::{
    BlogMutationPayload, CachedBlog, Draft, DraftId, NetworkState, SyncStatusSummary,
};
use crate::network::NetworkMonitor;
use crate::queue::DraftQueue;
use crate::remote::BlogService;
use crate::sync::{SyncEngine, SyncReport, SyncTrigger};

/// Shortest wait the background loop arms for a backoff deadline.
const MIN_RETRY_WAIT: Duration = Duration::from_millis(500);

/// Derived, read-only view of offline state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OfflineSnapshot {
    pub network: NetworkState,
    pub is_offline: bool,
    pub status: SyncStatusSummary,
}

#[derive(Clone)]
pub struct OfflineFacade {
    inner: Arc<Inner>,
}

struct Inner {
    network: NetworkMonitor,
    queue: DraftQueue,
    cache: BlogCache,
    engine: SyncEngine,
    preloader: CachePreloader,
    clock: Arc<dyn Clock>,
    snapshot: watch::Sender<OfflineSnapshot>,
    kick: Notify,
}

impl OfflineFacade {
    /// Build the engine on top of an opened store, using the wall clock.
    pub fn new(
        store: Arc<LocalStore>,
        service: Arc<dyn BlogService>,
        network: NetworkMonitor,
        config: &OfflineConfig,
    ) -> Result<Self> {
        Self::with_clock(store, service, network, config, Arc::new(SystemClock))
    }

    /// Build the engine with an explicit time source.
    ///
    /// Drafts left `syncing` by an interrupted process are returned to
    /// `pending` here.
    pub fn with_clock(
        store: Arc<LocalStore>,
        service: Arc<dyn BlogService>,
        network: NetworkMonitor,
        config: &OfflineConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate().map_err(Error::InvalidInput)?;

        let queue = DraftQueue::new(store.clone(), clock.clone());
        queue.recover_interrupted()?;
        let cache = BlogCache::new(
            store,
            clock.clone(),
            config.cache_budget(),
            config.cache_ttl(),
        );
        let engine = SyncEngine::new(
            queue.clone(),
            cache.clone(),
            service.clone(),
            network.clone(),
            config,
        );
        let preloader = CachePreloader::new(
            cache.clone(),
            service,
            network.clone(),
            config.request_timeout(),
        );

        let initial = OfflineSnapshot {
            network: network.current(),
            is_offline: network.is_offline(),
            status: queue.summary(engine.last_sync_at()?, false)?,
        };
        let (snapshot, _) = watch::channel(initial);

        Ok(Self {
            inner: Arc::new(Inner {
                network,
                queue,
                cache,
                engine,
                preloader,
                clock,
                snapshot,
                kick: Notify::new(),
            }),
        })
    }

    pub fn is_offline(&self) -> bool {
        self.inner.network.is_offline()
    }

    pub fn network_state(&self) -> NetworkState {
        self.inner.network.current()
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.inner.network
    }

    /// Queued drafts, oldest first.
    pub fn drafts(&self) -> Result<Vec<Draft>> {
        self.inner.queue.list()
    }

    pub fn sync_status(&self) -> Result<SyncStatusSummary> {
        self.inner
            .queue
            .summary(self.inner.engine.last_sync_at()?, self.inner.engine.is_running())
    }

    pub fn snapshot(&self) -> Result<OfflineSnapshot> {
        let network = self.network_state();
        Ok(OfflineSnapshot {
            network,
            is_offline: network.is_offline(),
            status: self.sync_status()?,
        })
    }

    /// Watch derived state. The receiver starts at the latest snapshot.
    pub fn subscribe(&self) -> watch::Receiver<OfflineSnapshot> {
        self.inner.snapshot.subscribe()
    }

    fn publish_snapshot(&self) {
        match self.snapshot() {
            Ok(snapshot) => {
                self.inner.snapshot.send_if_modified(|current| {
                    if *current == snapshot {
                        false
                    } else {
                        *current = snapshot;
                        true
                    }
                });
            }
            Err(error) => tracing::warn!("Failed to refresh offline snapshot: {error}"),
        }
    }

    /// Queue a create (`blog_id` of `None`) or an edit of an existing blog.
    ///
    /// The draft is durable when this returns. Online, the background loop
    /// is nudged to sync it right away.
    pub fn save_draft(
        &self,
        blog_id: Option<&str>,
        payload: BlogMutationPayload,
    ) -> Result<Draft> {
        let offline = self.is_offline();
        let draft = self.inner.queue.upsert_for_blog(blog_id, payload, offline)?;
        self.publish_snapshot();
        if !offline {
            self.inner.kick.notify_one();
        }
        Ok(draft)
    }

    /// Return a failed draft to the queue.
    pub fn retry_draft(&self, id: &DraftId) -> Result<Draft> {
        let draft = self.inner.queue.retry(id)?;
        self.publish_snapshot();
        if !self.is_offline() {
            self.inner.kick.notify_one();
        }
        Ok(draft)
    }

    /// Drop a queued draft without syncing it.
    pub fn discard_draft(&self, id: &DraftId) -> Result<bool> {
        let removed = self.inner.queue.remove(id)?;
        self.publish_snapshot();
        Ok(removed)
    }

    /// Run a sync pass now (coalesced if one is already running).
    pub async fn sync_pending_data(&self) -> SyncReport {
        self.run_pass(SyncTrigger::Manual).await
    }

    /// Host hook for the app returning to the foreground.
    pub async fn on_foreground(&self) -> SyncReport {
        self.run_pass(SyncTrigger::Foreground).await
    }

    async fn run_pass(&self, trigger: SyncTrigger) -> SyncReport {
        let report = self.inner.engine.run_pass(trigger).await;
        self.publish_snapshot();
        report
    }

    /// Empty the draft queue and purge every cached blog.
    pub fn clear_offline_data(&self) -> Result<()> {
        let cache = &self.inner.cache;
        let (drafts, blogs) = self.inner.queue.clear_with(|| cache.clear())?;
        tracing::info!("Cleared offline data: {drafts} draft(s), {blogs} cached blog(s)");
        self.publish_snapshot();
        Ok(())
    }

    pub async fn preload_blogs_for_offline<I, S>(&self, blog_ids: I) -> PreloadReport
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.preloader.preload(blog_ids).await
    }

    /// Whether a snapshot of the blog is stored locally.
    pub fn is_blog_available_offline(&self, blog_id: &str) -> bool {
        match self.inner.cache.contains(blog_id.trim()) {
            Ok(found) => found,
            Err(error) => {
                tracing::error!("Failed to check offline availability of {blog_id}: {error}");
                false
            }
        }
    }

    /// Read-through blog lookup; see [`CachePreloader::get_blog`].
    pub async fn get_blog(&self, blog_id: &str) -> Result<Option<FetchedBlog>> {
        self.inner.preloader.get_blog(blog_id).await
    }

    pub fn cached_blogs(&self) -> Result<Vec<CachedBlog>> {
        self.inner.cache.list()
    }

    /// Spawn the background task that reacts to reconnects, local edits and
    /// backoff deadlines. Must be called inside a tokio runtime.
    pub fn start(&self) -> BackgroundSync {
        let facade = self.clone();
        BackgroundSync {
            handle: tokio::spawn(async move { facade.run_background().await }),
        }
    }

    /// Time until the earliest backoff deadline, if one should be armed.
    fn retry_wait(&self) -> Option<Duration> {
        if self.is_offline() {
            return None;
        }
        let next_at = match self.inner.queue.next_retry_at() {
            Ok(next_at) => next_at?,
            Err(error) => {
                tracing::warn!("Failed to read retry schedule: {error}");
                return None;
            }
        };
        let wait_ms = next_at.saturating_sub(self.inner.clock.now_ms());
        let wait = Duration::from_millis(u64::try_from(wait_ms).unwrap_or_default());
        Some(wait.max(MIN_RETRY_WAIT))
    }

    async fn run_background(self) {
        let mut network = self.inner.network.subscribe();
        let mut queue = self.inner.queue.subscribe();
        let mut was_offline = self.is_offline();
        tracing::debug!("Background sync started");

        loop {
            let retry_wait = self.retry_wait();
            tokio::select! {
                changed = network.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let offline = network.borrow_and_update().is_offline();
                    let reconnected = was_offline && !offline;
                    was_offline = offline;
                    self.publish_snapshot();
                    if reconnected {
                        tracing::info!("Connectivity restored; syncing pending drafts");
                        self.run_pass(SyncTrigger::Reconnected).await;
                    }
                }
                changed = queue.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    queue.borrow_and_update();
                    self.publish_snapshot();
                }
                () = self.inner.kick.notified() => {
                    self.run_pass(SyncTrigger::LocalEdit).await;
                }
                () = sleep_or_pending(retry_wait) => {
                    self.run_pass(SyncTrigger::RetryTimer).await;
                }
            }
        }
        tracing::debug!("Background sync stopped");
    }
}

async fn sleep_or_pending(wait: Option<Duration>) {
    match wait {
        Some(wait) => tokio::time::sleep(wait).await,
        None => std::future::pending().await,
    }
}

/// Handle to the background sync task. Dropping it stops the task.
#[derive(Debug)]
pub struct BackgroundSync {
    handle: JoinHandle<()>,
}

impl BackgroundSync {
    /// Stop the background task.
    pub fn stop(self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for BackgroundSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
