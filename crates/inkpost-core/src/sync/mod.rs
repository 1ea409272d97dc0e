//! Drains the draft queue against the remote blog service.
//!
//! A pass walks the queue in FIFO order and submits every eligible draft.
//! Transient failures are rescheduled with exponential backoff until the retry
//! cap; permanent failures mark the draft `failed` right away. Only one pass
//! runs at a time: a trigger that arrives mid-pass is coalesced into it.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::BlogCache;
use crate::config::{OfflineConfig, RetryPolicy};
use crate::db::Namespace;
use crate::error::Result;
use crate::models::{Blog, Draft, DraftId, SyncStatus};
use crate::network::NetworkMonitor;
use crate::queue::{DraftPatch, DraftQueue, Settlement};
use crate::remote::{with_timeout, BlogService, RemoteError, RemoteResult};
use crate::util::duration_millis;

const LAST_SYNC_KEY: &str = "last_sync_at";

/// What started a sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncTrigger {
    /// Connectivity came back after being offline
    Reconnected,
    /// Explicit user request
    Manual,
    /// App returned to the foreground
    Foreground,
    /// A draft was saved while online
    LocalEdit,
    /// A backoff deadline elapsed
    RetryTimer,
}

impl SyncTrigger {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reconnected => "reconnected",
            Self::Manual => "manual",
            Self::Foreground => "foreground",
            Self::LocalEdit => "local_edit",
            Self::RetryTimer => "retry_timer",
        }
    }
}

impl fmt::Display for SyncTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a pass ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    /// Every eligible draft was attempted
    Completed,
    /// Another pass was already running
    Coalesced,
    /// Offline when the pass started; nothing was attempted
    Offline,
    /// Connectivity dropped between drafts; the rest stay pending
    Aborted,
    /// The local store failed; the pass stopped early
    StorageError(String),
}

/// A draft the remote service accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncedDraft {
    pub draft_id: DraftId,
    /// Server id of the blog (newly assigned for creates)
    pub blog_id: String,
    pub created: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub trigger: SyncTrigger,
    pub outcome: PassOutcome,
    /// Remote submits made during the pass
    pub attempted: usize,
    pub synced: Vec<SyncedDraft>,
    /// Transient failures put back to `pending` with a backoff deadline
    pub rescheduled: Vec<DraftId>,
    pub failed: Vec<DraftId>,
    /// Drafts edited while their submit was in flight
    pub superseded: Vec<DraftId>,
    /// Pending drafts still waiting on a backoff deadline
    pub deferred: usize,
}

impl SyncReport {
    const fn new(trigger: SyncTrigger, outcome: PassOutcome) -> Self {
        Self {
            trigger,
            outcome,
            attempted: 0,
            synced: Vec::new(),
            rescheduled: Vec::new(),
            failed: Vec::new(),
            superseded: Vec::new(),
            deferred: 0,
        }
    }

    /// True when the pass made no remote calls.
    pub const fn is_noop(&self) -> bool {
        self.attempted == 0
    }
}

/// Resets the in-flight flag even if the pass future is dropped.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Returns a draft to `pending` if its submit is dropped before it settles.
struct SubmitGuard<'a> {
    queue: &'a DraftQueue,
    id: DraftId,
    armed: bool,
}

impl<'a> SubmitGuard<'a> {
    const fn new(queue: &'a DraftQueue, id: DraftId) -> Self {
        Self {
            queue,
            id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match self.queue.release_syncing(&self.id) {
            Ok(true) => tracing::warn!(
                "Submit of draft {} was cancelled; returned to pending",
                self.id
            ),
            Ok(false) => {}
            Err(error) => {
                tracing::error!("Failed to release interrupted draft {}: {error}", self.id);
            }
        }
    }
}

pub struct SyncEngine {
    queue: DraftQueue,
    cache: BlogCache,
    service: Arc<dyn BlogService>,
    network: NetworkMonitor,
    policy: RetryPolicy,
    request_timeout: Duration,
    in_flight: AtomicBool,
}

impl SyncEngine {
    pub fn new(
        queue: DraftQueue,
        cache: BlogCache,
        service: Arc<dyn BlogService>,
        network: NetworkMonitor,
        config: &OfflineConfig,
    ) -> Self {
        Self {
            queue,
            cache,
            service,
            network,
            policy: config.retry_policy(),
            request_timeout: config.request_timeout(),
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a pass currently holds the in-flight guard
    pub fn is_running(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Unix ms of the last pass that ran to completion.
    pub fn last_sync_at(&self) -> Result<Option<i64>> {
        self.queue.store().get(Namespace::Meta, LAST_SYNC_KEY)
    }

    /// Run one sync pass. Never fails; every problem ends up in the report
    /// or on the affected draft.
    pub async fn run_pass(&self, trigger: SyncTrigger) -> SyncReport {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("Sync pass ({trigger}) coalesced into running pass");
            return SyncReport::new(trigger, PassOutcome::Coalesced);
        }
        let _in_flight = InFlight(&self.in_flight);

        if self.network.is_offline() {
            tracing::debug!("Sync pass ({trigger}) skipped while offline");
            return SyncReport::new(trigger, PassOutcome::Offline);
        }

        let mut report = SyncReport::new(trigger, PassOutcome::Completed);
        if let Err(error) = self.drain(&mut report).await {
            tracing::error!("Sync pass ({trigger}) stopped on storage failure: {error}");
            report.outcome = PassOutcome::StorageError(error.to_string());
        }

        if report.outcome == PassOutcome::Completed {
            let now_ms = self.queue.clock().now_ms();
            if let Err(error) = self
                .queue
                .store()
                .put(Namespace::Meta, LAST_SYNC_KEY, &now_ms, now_ms)
            {
                tracing::error!("Failed to record last sync time: {error}");
            }
        }

        if report.is_noop() {
            tracing::debug!("Sync pass ({trigger}) finished with nothing to submit");
        } else {
            tracing::info!(
                "Sync pass ({trigger}) finished: {} synced, {} rescheduled, {} failed, {} deferred",
                report.synced.len(),
                report.rescheduled.len(),
                report.failed.len(),
                report.deferred
            );
        }
        report
    }

    /// Submit eligible drafts until none is left that this pass has not
    /// already tried with its current payload.
    async fn drain(&self, report: &mut SyncReport) -> Result<()> {
        let mut tried = HashSet::new();

        loop {
            let now_ms = self.queue.clock().now_ms();
            let next = self.queue.list()?.into_iter().find(|draft| {
                draft.is_eligible(now_ms) && !tried.contains(&(draft.id, draft.payload_revision))
            });
            let Some(draft) = next else {
                break;
            };

            if self.network.is_offline() {
                tracing::info!("Connectivity lost mid-pass; remaining drafts stay pending");
                report.outcome = PassOutcome::Aborted;
                break;
            }

            tried.insert((draft.id, draft.payload_revision));
            self.sync_draft(&draft, report).await?;
        }

        let now_ms = self.queue.clock().now_ms();
        report.deferred = self
            .queue
            .list()?
            .iter()
            .filter(|draft| draft.sync_status == SyncStatus::Pending && !draft.is_eligible(now_ms))
            .count();
        Ok(())
    }

    async fn sync_draft(&self, draft: &Draft, report: &mut SyncReport) -> Result<()> {
        let draft = self
            .queue
            .patch(&draft.id, DraftPatch::status(SyncStatus::Syncing))?;
        let revision = draft.payload_revision;
        tracing::debug!(
            "Submitting draft {} ({}, attempt {})",
            draft.id,
            draft.target_label(),
            draft.retry_count + 1
        );

        let mut guard = SubmitGuard::new(&self.queue, draft.id);
        report.attempted += 1;
        let settled = match with_timeout(self.request_timeout, self.submit(&draft)).await {
            Ok(blog) => self.record_success(&draft, revision, blog, report),
            Err(error) => self.record_failure(&draft, revision, &error, report),
        };
        if settled.is_ok() {
            guard.disarm();
        }
        settled
    }

    async fn submit(&self, draft: &Draft) -> RemoteResult<Blog> {
        match draft.blog_id.as_deref() {
            None => self.service.create_blog(&draft.payload).await,
            Some(blog_id) => self.service.update_blog(blog_id, &draft.payload).await,
        }
    }

    fn record_success(
        &self,
        draft: &Draft,
        revision: u64,
        blog: Blog,
        report: &mut SyncReport,
    ) -> Result<()> {
        let blog_id = blog.id.clone();
        let cache_key = draft.blog_id.clone().unwrap_or_else(|| blog_id.clone());
        let cache = &self.cache;
        let settlement = self.queue.settle_success(&draft.id, revision, || {
            if let Err(error) = cache.insert_as(&cache_key, blog) {
                tracing::warn!("Synced blog {cache_key} could not be cached: {error}");
            }
        })?;

        match settlement {
            Settlement::Superseded => report.superseded.push(draft.id),
            Settlement::Applied | Settlement::Missing => {
                if draft.is_create() {
                    tracing::info!("Draft {} created blog {blog_id}", draft.id);
                } else {
                    tracing::debug!("Draft {} synced to blog {blog_id}", draft.id);
                }
                report.synced.push(SyncedDraft {
                    draft_id: draft.id,
                    blog_id,
                    created: draft.is_create(),
                });
            }
        }
        Ok(())
    }

    fn record_failure(
        &self,
        draft: &Draft,
        revision: u64,
        error: &RemoteError,
        report: &mut SyncReport,
    ) -> Result<()> {
        let (patch, rescheduled) = if error.is_transient() {
            let retry_count = draft.retry_count + 1;
            if self.policy.is_exhausted(retry_count) {
                tracing::warn!(
                    "Draft {} failed after {retry_count} attempts: {error}",
                    draft.id
                );
                let patch = DraftPatch::status(SyncStatus::Failed)
                    .with_retry_count(retry_count)
                    .with_last_error(Some(error.to_string()))
                    .with_next_attempt_at(None);
                (patch, false)
            } else {
                let delay = self.policy.delay_for(retry_count);
                let next_attempt_at = self.queue.clock().now_ms() + duration_millis(delay);
                tracing::warn!(
                    "Draft {} attempt {retry_count} failed, retrying in {}s: {error}",
                    draft.id,
                    delay.as_secs()
                );
                let patch = DraftPatch::status(SyncStatus::Pending)
                    .with_retry_count(retry_count)
                    .with_last_error(Some(error.to_string()))
                    .with_next_attempt_at(Some(next_attempt_at));
                (patch, true)
            }
        } else {
            let message = match error {
                RemoteError::Conflict(_) | RemoteError::NotFound(_) => format!("conflict: {error}"),
                _ => error.to_string(),
            };
            tracing::warn!("Draft {} rejected: {message}", draft.id);
            let patch = DraftPatch::status(SyncStatus::Failed)
                .with_last_error(Some(message))
                .with_next_attempt_at(None);
            (patch, false)
        };

        match self.queue.settle_failure(&draft.id, revision, patch)? {
            Settlement::Applied if rescheduled => report.rescheduled.push(draft.id),
            Settlement::Applied => report.failed.push(draft.id),
            Settlement::Superseded => report.superseded.push(draft.id),
            Settlement::Missing => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::db::LocalStore;
    use crate::models::{BlogMutationPayload, ConnectionType, NetworkState};
    use crate::test_support::{MockBlogService, MockCall};
    use pretty_assertions::assert_eq;

    struct Harness {
        engine: Arc<SyncEngine>,
        store: Arc<LocalStore>,
        queue: DraftQueue,
        cache: BlogCache,
        network: NetworkMonitor,
        clock: Arc<ManualClock>,
        service: Arc<MockBlogService>,
    }

    fn harness(online: bool) -> Harness {
        let config = OfflineConfig::default();
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(LocalStore::open_in_memory().unwrap());
        let queue = DraftQueue::new(store.clone(), clock.clone());
        let cache = BlogCache::new(
            store.clone(),
            clock.clone(),
            config.cache_budget(),
            config.cache_ttl(),
        );
        let state = if online {
            NetworkState::online(ConnectionType::Wifi)
        } else {
            NetworkState::offline()
        };
        let network = NetworkMonitor::new(state, Duration::ZERO);
        let service = MockBlogService::new();
        let engine = Arc::new(SyncEngine::new(
            queue.clone(),
            cache.clone(),
            service.clone(),
            network.clone(),
            &config,
        ));
        Harness {
            engine,
            store,
            queue,
            cache,
            network,
            clock,
            service,
        }
    }

    fn payload(title: &str) -> BlogMutationPayload {
        BlogMutationPayload::new(title, "body")
    }

    fn server_error() -> RemoteError {
        RemoteError::Server {
            status: 500,
            message: "boom".into(),
        }
    }

    #[tokio::test]
    async fn empty_queue_makes_no_remote_calls() {
        let h = harness(true);
        let report = h.engine.run_pass(SyncTrigger::Manual).await;

        assert_eq!(report.outcome, PassOutcome::Completed);
        assert!(report.is_noop());
        assert!(h.service.calls().is_empty());
        assert_eq!(h.engine.last_sync_at().unwrap(), Some(1_000_000));
    }

    #[tokio::test]
    async fn drafts_are_submitted_in_fifo_order() {
        let h = harness(true);
        h.queue.upsert_for_blog(Some("b1"), payload("first"), false).unwrap();
        h.queue.upsert_for_blog(None, payload("second"), false).unwrap();
        h.queue.upsert_for_blog(Some("b3"), payload("third"), false).unwrap();

        let report = h.engine.run_pass(SyncTrigger::Manual).await;

        assert_eq!(h.service.submitted_titles(), vec!["first", "second", "third"]);
        assert_eq!(report.synced.len(), 3);
        assert!(report.synced[1].created);
        assert_eq!(report.synced[1].blog_id, "blog-1");
        assert!(h.queue.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_edit_syncs_after_reconnect() {
        let h = harness(false);
        let draft = h
            .queue
            .upsert_for_blog(Some("b1"), payload("offline edit"), true)
            .unwrap();
        assert!(draft.is_offline_draft);

        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(report.outcome, PassOutcome::Offline);
        assert!(h.service.calls().is_empty());
        assert_eq!(h.engine.last_sync_at().unwrap(), None);

        h.network.report(NetworkState::online(ConnectionType::Wifi));
        let report = h.engine.run_pass(SyncTrigger::Reconnected).await;

        assert_eq!(report.outcome, PassOutcome::Completed);
        assert_eq!(
            h.service.calls(),
            vec![MockCall::Update {
                blog_id: "b1".into(),
                title: "offline edit".into()
            }]
        );
        assert!(h.queue.list().unwrap().is_empty());
        assert_eq!(h.cache.get("b1").unwrap().unwrap().content.title, "offline edit");
    }

    #[tokio::test]
    async fn server_error_then_success_after_backoff() {
        let h = harness(true);
        h.service.fail_submits([server_error()]);
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("retry me"), false).unwrap();

        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(report.rescheduled, vec![draft.id]);
        let stored = h.queue.get(&draft.id).unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(stored.next_attempt_at, Some(1_000_000 + 2_000));
        assert!(stored.last_error.unwrap().contains("500"));

        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert!(report.is_noop());
        assert_eq!(report.deferred, 1);

        h.clock.advance(Duration::from_secs(2));
        let report = h.engine.run_pass(SyncTrigger::RetryTimer).await;
        assert_eq!(report.synced.len(), 1);
        assert_eq!(h.service.submitted_titles().len(), 2);
        assert!(h.queue.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn transient_failures_fail_after_exactly_max_retries() {
        let h = harness(true);
        let max_retries = h.engine.policy().max_retries;
        h.service
            .fail_submits((0..max_retries + 1).map(|_| RemoteError::Network("reset".into())));
        let draft = h.queue.upsert_for_blog(None, payload("flaky"), false).unwrap();

        let mut expected_delays = Vec::new();
        for _ in 0..max_retries + 2 {
            h.engine.run_pass(SyncTrigger::RetryTimer).await;
            let stored = h.queue.get(&draft.id).unwrap().unwrap();
            if let Some(at) = stored.next_attempt_at {
                expected_delays.push(at - h.clock.now_ms());
                h.clock.set(at);
            }
        }

        let stored = h.queue.get(&draft.id).unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Failed);
        assert_eq!(stored.retry_count, max_retries);
        assert_eq!(h.service.submitted_titles().len(), max_retries as usize);
        assert_eq!(expected_delays, vec![2_000, 4_000, 8_000, 16_000]);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let h = harness(true);
        h.service.fail_submits([
            RemoteError::Validation("title too long".into()),
            RemoteError::Conflict("stale".into()),
        ]);
        let invalid = h.queue.upsert_for_blog(None, payload("one"), false).unwrap();
        let conflicted = h.queue.upsert_for_blog(Some("b2"), payload("two"), false).unwrap();

        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(report.failed, vec![invalid.id, conflicted.id]);

        let invalid = h.queue.get(&invalid.id).unwrap().unwrap();
        assert_eq!(invalid.sync_status, SyncStatus::Failed);
        assert_eq!(invalid.retry_count, 0);
        let conflicted = h.queue.get(&conflicted.id).unwrap().unwrap();
        assert!(conflicted.last_error.unwrap().starts_with("conflict:"));

        h.clock.advance(Duration::from_secs(3_600));
        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert!(report.is_noop());
        assert_eq!(h.service.submitted_titles().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_submit_times_out_as_transient() {
        let h = harness(true);
        h.service.set_delay(Duration::from_secs(60));
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("slow"), false).unwrap();

        let report = h.engine.run_pass(SyncTrigger::Manual).await;

        assert_eq!(report.rescheduled, vec![draft.id]);
        let stored = h.queue.get(&draft.id).unwrap().unwrap();
        assert_eq!(stored.retry_count, 1);
        assert_eq!(
            stored.last_error.as_deref(),
            Some("Request timed out after 15s")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_trigger_is_coalesced() {
        let h = harness(true);
        h.service.set_delay(Duration::from_millis(100));
        h.queue.upsert_for_blog(Some("b1"), payload("one"), false).unwrap();

        let engine = h.engine.clone();
        let running = tokio::spawn(async move { engine.run_pass(SyncTrigger::Manual).await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(h.engine.is_running());
        let second = h.engine.run_pass(SyncTrigger::Foreground).await;
        assert_eq!(second.outcome, PassOutcome::Coalesced);

        let first = running.await.unwrap();
        assert_eq!(first.synced.len(), 1);
        assert!(!h.engine.is_running());
        assert_eq!(h.service.submitted_titles().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn going_offline_stops_between_drafts() {
        let h = harness(true);
        h.service.set_delay(Duration::from_millis(100));
        h.queue.upsert_for_blog(Some("b1"), payload("one"), false).unwrap();
        let second = h.queue.upsert_for_blog(Some("b2"), payload("two"), false).unwrap();

        let engine = h.engine.clone();
        let running = tokio::spawn(async move { engine.run_pass(SyncTrigger::Manual).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.network.report(NetworkState::offline());

        let report = running.await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Aborted);
        assert_eq!(report.synced.len(), 1);
        let remaining = h.queue.list().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, second.id);
        assert_eq!(remaining[0].sync_status, SyncStatus::Pending);
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_submit_is_resubmitted() {
        let h = harness(true);
        h.service.set_delay(Duration::from_millis(100));
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("v1"), false).unwrap();

        let engine = h.engine.clone();
        let running = tokio::spawn(async move { engine.run_pass(SyncTrigger::Manual).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.queue.upsert_for_blog(Some("b1"), payload("v2"), false).unwrap();

        let report = running.await.unwrap();
        assert_eq!(report.superseded, vec![draft.id]);
        assert_eq!(report.synced.len(), 1);
        assert_eq!(h.service.submitted_titles(), vec!["v1", "v2"]);
        assert!(h.queue.list().unwrap().is_empty());
        assert_eq!(h.cache.get("b1").unwrap().unwrap().content.title, "v2");
    }

    #[tokio::test]
    async fn failed_drafts_wait_for_manual_retry() {
        let h = harness(true);
        h.service.fail_submits([RemoteError::Validation("bad".into())]);
        let draft = h.queue.upsert_for_blog(None, payload("one"), false).unwrap();
        h.engine.run_pass(SyncTrigger::Manual).await;

        h.queue.retry(&draft.id).unwrap();
        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(report.synced.len(), 1);
        assert!(h.queue.list().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pass_returns_draft_to_pending() {
        let h = harness(true);
        h.service.set_delay(Duration::from_millis(100));
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("v1"), false).unwrap();

        let engine = h.engine.clone();
        let running = tokio::spawn(async move { engine.run_pass(SyncTrigger::Manual).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            h.queue.get(&draft.id).unwrap().unwrap().sync_status,
            SyncStatus::Syncing
        );
        running.abort();
        assert!(running.await.unwrap_err().is_cancelled());

        let stored = h.queue.get(&draft.id).unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert!(!h.engine.is_running());

        h.queue.upsert_for_blog(Some("b1"), payload("v2"), false).unwrap();
        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(report.synced.len(), 1);
        assert_eq!(h.service.submitted_titles(), vec!["v1", "v2"]);
        assert!(h.queue.list().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn draft_cleared_mid_submit_is_not_cached() {
        let h = harness(true);
        h.service.set_delay(Duration::from_millis(100));
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("v1"), false).unwrap();

        let engine = h.engine.clone();
        let running = tokio::spawn(async move { engine.run_pass(SyncTrigger::Manual).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        let cache = h.cache.clone();
        h.queue.clear_with(|| cache.clear()).unwrap();

        let report = running.await.unwrap();
        assert_eq!(report.synced[0].draft_id, draft.id);
        assert!(!h.cache.contains("b1").unwrap());
        assert!(h.cache.list().unwrap().is_empty());
        assert!(h.queue.list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_ends_pass_without_losing_drafts() {
        let h = harness(true);
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("kept"), false).unwrap();
        h.store
            .execute_batch("ALTER TABLE kv_entries RENAME TO kv_entries_hidden")
            .unwrap();

        let report = h.engine.run_pass(SyncTrigger::Manual).await;

        assert!(matches!(report.outcome, PassOutcome::StorageError(_)));
        assert!(report.is_noop());
        assert!(h.service.calls().is_empty());
        assert!(!h.engine.is_running());

        h.store
            .execute_batch("ALTER TABLE kv_entries_hidden RENAME TO kv_entries")
            .unwrap();
        let stored = h.queue.get(&draft.id).unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.payload.title, "kept");
        assert_eq!(h.engine.last_sync_at().unwrap(), None);

        let report = h.engine.run_pass(SyncTrigger::Manual).await;
        assert_eq!(report.outcome, PassOutcome::Completed);
        assert_eq!(report.synced.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn storage_failure_mid_submit_keeps_draft() {
        let h = harness(true);
        h.service.set_delay(Duration::from_millis(100));
        let draft = h.queue.upsert_for_blog(Some("b1"), payload("kept"), false).unwrap();

        let engine = h.engine.clone();
        let running = tokio::spawn(async move { engine.run_pass(SyncTrigger::Manual).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        h.store
            .execute_batch("ALTER TABLE kv_entries RENAME TO kv_entries_hidden")
            .unwrap();

        let report = running.await.unwrap();
        assert!(matches!(report.outcome, PassOutcome::StorageError(_)));

        h.store
            .execute_batch("ALTER TABLE kv_entries_hidden RENAME TO kv_entries")
            .unwrap();
        let stored = h.queue.get(&draft.id).unwrap().unwrap();
        assert_eq!(stored.payload.title, "kept");
        assert_eq!(h.queue.recover_interrupted().unwrap(), 1);
        assert_eq!(h.engine.run_pass(SyncTrigger::Manual).await.synced.len(), 1);
    }
}
