//! Draft model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::BlogMutationPayload;

/// A unique identifier for a draft, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DraftId(Uuid);

impl DraftId {
    /// Create a new unique draft ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DraftId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle stage of a draft
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Pending,
    Syncing,
    Synced,
    Failed,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Failed => "failed",
        }
    }

    /// `synced` and `failed` need no further automatic work.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Synced | Self::Failed)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A locally queued, not yet confirmed blog create or update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    /// Unique identifier
    pub id: DraftId,
    /// Target blog; `None` means the draft creates a new blog
    pub blog_id: Option<String>,
    /// Latest payload to submit
    pub payload: BlogMutationPayload,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last modification timestamp (Unix ms)
    pub updated_at: i64,
    pub sync_status: SyncStatus,
    /// Whether the draft was first queued while the device was offline
    pub is_offline_draft: bool,
    /// Failed transient attempts since the last reset
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Earliest time (Unix ms) the next attempt may run
    #[serde(default)]
    pub next_attempt_at: Option<i64>,
    /// Bumped every time the payload is replaced
    #[serde(default)]
    pub payload_revision: u64,
}

impl Draft {
    /// Create a pending draft
    #[must_use]
    pub fn new(
        blog_id: Option<String>,
        payload: BlogMutationPayload,
        is_offline_draft: bool,
        now_ms: i64,
    ) -> Self {
        Self {
            id: DraftId::new(),
            blog_id,
            payload,
            created_at: now_ms,
            updated_at: now_ms,
            sync_status: SyncStatus::Pending,
            is_offline_draft,
            retry_count: 0,
            last_error: None,
            next_attempt_at: None,
            payload_revision: 0,
        }
    }

    /// Whether the draft creates a new blog rather than updating one
    pub const fn is_create(&self) -> bool {
        self.blog_id.is_none()
    }

    /// Pending and past its backoff delay.
    pub fn is_eligible(&self, now_ms: i64) -> bool {
        self.sync_status == SyncStatus::Pending
            && self.next_attempt_at.is_none_or(|at| at <= now_ms)
    }

    /// Human-readable target, e.g. `new blog` or `blog abc123`
    #[must_use]
    pub fn target_label(&self) -> String {
        self.blog_id
            .as_ref()
            .map_or_else(|| "new blog".to_string(), |id| format!("blog {id}"))
    }
}

/// Counts derived from the current draft set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatusSummary {
    pub pending_count: usize,
    pub syncing_count: usize,
    pub failed_count: usize,
    /// Unix ms of the last sync pass that ran to completion
    pub last_sync_at: Option<i64>,
    /// A sync pass currently holds the in-flight guard
    pub in_progress: bool,
}

impl SyncStatusSummary {
    /// Tally a draft set.
    pub fn from_drafts<'a>(
        drafts: impl IntoIterator<Item = &'a Draft>,
        last_sync_at: Option<i64>,
        in_progress: bool,
    ) -> Self {
        let mut summary = Self {
            last_sync_at,
            in_progress,
            ..Self::default()
        };
        for draft in drafts {
            match draft.sync_status {
                SyncStatus::Pending => summary.pending_count += 1,
                SyncStatus::Syncing => summary.syncing_count += 1,
                SyncStatus::Failed => summary.failed_count += 1,
                SyncStatus::Synced => {}
            }
        }
        summary
    }

    pub const fn total(&self) -> usize {
        self.pending_count + self.syncing_count + self.failed_count
    }
}
