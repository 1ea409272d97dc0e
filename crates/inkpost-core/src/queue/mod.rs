//! Durable FIFO queue of local blog mutations.
//!
//! Every mutating call writes through to the [`LocalStore`] before it returns.
//! Read-modify-write paths hold the queue write lock, so the collapse rule and
//! the sync engine's status transitions never interleave on one draft.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;

use crate::clock::Clock;
use crate::db::{LocalStore, Namespace};
use crate::error::{Error, Result};
use crate::models::{BlogMutationPayload, Draft, DraftId, SyncStatus, SyncStatusSummary};
use crate::util::normalize_text_option;

/// Partial update of a draft's sync bookkeeping.
///
/// Payload changes go through [`DraftQueue::upsert_for_blog`] instead.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftPatch {
    pub sync_status: Option<SyncStatus>,
    pub retry_count: Option<u32>,
    pub last_error: Option<Option<String>>,
    pub next_attempt_at: Option<Option<i64>>,
}

impl DraftPatch {
    pub fn status(status: SyncStatus) -> Self {
        Self {
            sync_status: Some(status),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = Some(retry_count);
        self
    }

    #[must_use]
    pub fn with_last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = Some(last_error);
        self
    }

    #[must_use]
    pub const fn with_next_attempt_at(mut self, next_attempt_at: Option<i64>) -> Self {
        self.next_attempt_at = Some(next_attempt_at);
        self
    }

    fn apply(self, draft: &mut Draft) {
        if let Some(status) = self.sync_status {
            draft.sync_status = status;
        }
        if let Some(retry_count) = self.retry_count {
            draft.retry_count = retry_count;
        }
        if let Some(last_error) = self.last_error {
            draft.last_error = last_error;
        }
        if let Some(next_attempt_at) = self.next_attempt_at {
            draft.next_attempt_at = next_attempt_at;
        }
    }
}

/// Result of settling an in-flight submit against the stored draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// The outcome was applied to the draft that was submitted
    Applied,
    /// The payload changed while the submit was in flight; the draft went
    /// back to `pending` with the newer payload
    Superseded,
    /// The draft was discarded or cleared while the submit was in flight
    Missing,
}

/// Persistent, ordered draft collection.
#[derive(Clone)]
pub struct DraftQueue {
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
    write_lock: Arc<Mutex<()>>,
    revision: Arc<watch::Sender<u64>>,
}

impl DraftQueue {
    pub fn new(store: Arc<LocalStore>, clock: Arc<dyn Clock>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            store,
            clock,
            write_lock: Arc::new(Mutex::new(())),
            revision: Arc::new(revision),
        }
    }

    pub(crate) const fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub(crate) const fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, draft: &Draft) -> Result<()> {
        self.store
            .put(Namespace::Drafts, &draft.id.as_str(), draft, self.clock.now_ms())
    }

    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn find_for_blog(&self, blog_id: &str) -> Result<Option<Draft>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|draft| draft.blog_id.as_deref() == Some(blog_id)))
    }

    fn require(&self, id: &DraftId) -> Result<Draft> {
        self.get(id)?
            .ok_or_else(|| Error::NotFound(format!("draft {id}")))
    }

    /// Add a fully built draft at the back of the queue.
    ///
    /// Fails when the draft's blog already has a queued draft; edits to a
    /// queued blog go through [`Self::upsert_for_blog`].
    pub fn append(&self, draft: Draft) -> Result<Draft> {
        draft.payload.validate()?;
        let _guard = self.lock();

        if let Some(blog_id) = draft.blog_id.as_deref() {
            if let Some(existing) = self.find_for_blog(blog_id)? {
                return Err(Error::InvalidInput(format!(
                    "blog {blog_id} already has queued draft {}",
                    existing.id
                )));
            }
        }
        if self.store.contains(Namespace::Drafts, &draft.id.as_str())? {
            return Err(Error::InvalidInput(format!("draft {} already queued", draft.id)));
        }

        self.save(&draft)?;
        self.notify();
        tracing::debug!("Queued draft {} for {}", draft.id, draft.target_label());
        Ok(draft)
    }

    /// Queue an edit, collapsing onto the blog's existing draft if there is one.
    ///
    /// `blog_id` of `None` (or blank) always queues a new create draft.
    /// Collapsing replaces the payload, bumps `payload_revision` and resets
    /// `retry_count`; a `failed` draft returns to `pending`. A draft that is
    /// currently `syncing` keeps its status so the in-flight submit can settle.
    pub fn upsert_for_blog(
        &self,
        blog_id: Option<&str>,
        payload: BlogMutationPayload,
        is_offline: bool,
    ) -> Result<Draft> {
        let payload = payload.normalized();
        payload.validate()?;
        let blog_id = normalize_text_option(blog_id.map(str::to_string));

        let _guard = self.lock();
        let now_ms = self.clock.now_ms();

        if let Some(blog_id) = blog_id.as_deref() {
            if let Some(mut existing) = self.find_for_blog(blog_id)? {
                existing.payload = payload;
                existing.payload_revision += 1;
                existing.updated_at = now_ms;
                existing.retry_count = 0;
                existing.is_offline_draft |= is_offline;
                if existing.sync_status != SyncStatus::Syncing {
                    existing.sync_status = SyncStatus::Pending;
                    existing.last_error = None;
                    existing.next_attempt_at = None;
                }

                self.save(&existing)?;
                self.notify();
                tracing::debug!(
                    "Collapsed edit for blog {blog_id} into draft {} (revision {})",
                    existing.id,
                    existing.payload_revision
                );
                return Ok(existing);
            }
        }

        let draft = Draft::new(blog_id, payload, is_offline, now_ms);
        self.save(&draft)?;
        self.notify();
        tracing::debug!("Queued draft {} for {}", draft.id, draft.target_label());
        Ok(draft)
    }

    /// Apply a bookkeeping patch to an existing draft.
    pub fn patch(&self, id: &DraftId, patch: DraftPatch) -> Result<Draft> {
        let _guard = self.lock();
        let mut draft = self.require(id)?;
        patch.apply(&mut draft);
        draft.updated_at = self.clock.now_ms();
        self.save(&draft)?;
        self.notify();
        Ok(draft)
    }

    /// Discard a draft. Returns whether it existed.
    pub fn remove(&self, id: &DraftId) -> Result<bool> {
        let _guard = self.lock();
        let removed = self.store.remove(Namespace::Drafts, &id.as_str())?;
        if removed {
            self.notify();
            tracing::debug!("Removed draft {id}");
        }
        Ok(removed)
    }

    pub fn get(&self, id: &DraftId) -> Result<Option<Draft>> {
        self.store.get(Namespace::Drafts, &id.as_str())
    }

    /// All drafts in creation order, oldest first.
    pub fn list(&self) -> Result<Vec<Draft>> {
        self.store.scan(Namespace::Drafts)
    }

    /// Manually re-enqueue a failed draft with fresh retry counters.
    pub fn retry(&self, id: &DraftId) -> Result<Draft> {
        let _guard = self.lock();
        let mut draft = self.require(id)?;
        if draft.sync_status != SyncStatus::Failed {
            return Err(Error::InvalidInput(format!(
                "draft {id} is {}, only failed drafts can be retried",
                draft.sync_status
            )));
        }

        draft.sync_status = SyncStatus::Pending;
        draft.retry_count = 0;
        draft.last_error = None;
        draft.next_attempt_at = None;
        draft.updated_at = self.clock.now_ms();
        self.save(&draft)?;
        self.notify();
        tracing::info!("Draft {id} re-enqueued for sync");
        Ok(draft)
    }

    /// Drop every queued draft. Returns the number removed.
    pub fn clear(&self) -> Result<usize> {
        self.clear_with(|| Ok(())).map(|(removed, ())| removed)
    }

    /// Drop every queued draft and run `also` under the same write lock, so
    /// no settlement can interleave with it.
    pub(crate) fn clear_with<T>(&self, also: impl FnOnce() -> Result<T>) -> Result<(usize, T)> {
        let _guard = self.lock();
        let removed = self.store.clear(Namespace::Drafts)?;
        self.notify();
        Ok((removed, also()?))
    }

    /// Put a draft whose submit was abandoned mid-flight back to `pending`.
    ///
    /// Returns false when the draft is gone or no longer `syncing`.
    pub(crate) fn release_syncing(&self, id: &DraftId) -> Result<bool> {
        let _guard = self.lock();
        let Some(mut draft) = self.get(id)? else {
            return Ok(false);
        };
        if draft.sync_status != SyncStatus::Syncing {
            return Ok(false);
        }
        draft.sync_status = SyncStatus::Pending;
        draft.updated_at = self.clock.now_ms();
        self.save(&draft)?;
        self.notify();
        Ok(true)
    }

    /// Return drafts left `syncing` by an interrupted process to `pending`.
    pub fn recover_interrupted(&self) -> Result<usize> {
        let _guard = self.lock();
        let mut recovered = 0;
        for mut draft in self.list()? {
            if draft.sync_status == SyncStatus::Syncing {
                draft.sync_status = SyncStatus::Pending;
                self.save(&draft)?;
                recovered += 1;
            }
        }
        if recovered > 0 {
            self.notify();
            tracing::warn!("Recovered {recovered} draft(s) interrupted mid-sync");
        }
        Ok(recovered)
    }

    /// Earliest backoff deadline among pending drafts.
    pub fn next_retry_at(&self) -> Result<Option<i64>> {
        Ok(self
            .list()?
            .iter()
            .filter(|draft| draft.sync_status == SyncStatus::Pending)
            .filter_map(|draft| draft.next_attempt_at)
            .min())
    }

    pub fn summary(
        &self,
        last_sync_at: Option<i64>,
        in_progress: bool,
    ) -> Result<SyncStatusSummary> {
        Ok(SyncStatusSummary::from_drafts(
            &self.list()?,
            last_sync_at,
            in_progress,
        ))
    }

    /// Receiver whose value changes on every queue mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Remove a successfully submitted draft unless its payload changed meanwhile.
    ///
    /// `on_settled` runs under the write lock unless the draft was removed
    /// meanwhile (discarded or cleared).
    pub(crate) fn settle_success(
        &self,
        id: &DraftId,
        submitted_revision: u64,
        on_settled: impl FnOnce(),
    ) -> Result<Settlement> {
        let _guard = self.lock();
        let Some(draft) = self.get(id)? else {
            return Ok(Settlement::Missing);
        };
        if draft.payload_revision != submitted_revision {
            self.requeue_superseded(draft)?;
            on_settled();
            return Ok(Settlement::Superseded);
        }

        self.store.remove(Namespace::Drafts, &id.as_str())?;
        self.notify();
        on_settled();
        Ok(Settlement::Applied)
    }

    /// Record a failed submit unless the payload changed meanwhile.
    pub(crate) fn settle_failure(
        &self,
        id: &DraftId,
        submitted_revision: u64,
        patch: DraftPatch,
    ) -> Result<Settlement> {
        let _guard = self.lock();
        let Some(mut draft) = self.get(id)? else {
            return Ok(Settlement::Missing);
        };
        if draft.payload_revision != submitted_revision {
            self.requeue_superseded(draft)?;
            return Ok(Settlement::Superseded);
        }

        patch.apply(&mut draft);
        draft.updated_at = self.clock.now_ms();
        self.save(&draft)?;
        self.notify();
        Ok(Settlement::Applied)
    }

    fn requeue_superseded(&self, mut draft: Draft) -> Result<()> {
        draft.sync_status = SyncStatus::Pending;
        draft.retry_count = 0;
        draft.last_error = None;
        draft.next_attempt_at = None;
        draft.updated_at = self.clock.now_ms();
        self.save(&draft)?;
        self.notify();
        tracing::debug!("Draft {} was edited mid-sync; requeued", draft.id);
        Ok(())
    }
}
