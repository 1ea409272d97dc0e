//! Durable key-value store backing the draft queue and the blog cache.
//!
//! Values are JSON documents grouped by [`Namespace`]. Every entry keeps an
//! insertion sequence (stable across updates, used for FIFO listing) and a
//! last-access timestamp (used for LRU eviction). All access goes through one
//! connection behind a mutex, so each call is an atomic unit with respect to
//! every other caller in the process.

#![allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)] // SQLite stores sizes as i64

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::CacheBudget;
use crate::error::{Error, Result};

use super::Database;

/// Logical partition of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Queued drafts, keyed by draft id
    Drafts,
    /// Cached blog snapshots, keyed by blog id
    Blogs,
    /// Engine bookkeeping such as the last sync time
    Meta,
}

impl Namespace {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Drafts => "drafts",
            Self::Blogs => "blogs",
            Self::Meta => "meta",
        }
    }
}

/// Size and access metadata of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    pub key: String,
    pub size_bytes: u64,
    pub accessed_at: i64,
}

/// Aggregate footprint of a namespace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NamespaceUsage {
    pub entries: usize,
    pub bytes: u64,
}

/// Thread-safe local persistence layer.
pub struct LocalStore {
    db: Mutex<Database>,
}

impl LocalStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }

    /// Open (or create) the store file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Database::open(path).map(Self::new)
    }

    /// Open an in-memory store (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        Database::open_in_memory().map(Self::new)
    }

    fn with_conn<R>(&self, f: impl FnOnce(&mut Connection) -> Result<R>) -> Result<R> {
        let mut db = self
            .db
            .lock()
            .map_err(|_| Error::Storage("local store lock poisoned".into()))?;
        f(db.connection_mut())
    }

    /// Run raw SQL against the store, for tests that need to break it.
    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.with_conn(|conn| Ok(conn.execute_batch(sql)?))
    }

    /// Insert or replace a value. Replacing keeps the entry's sequence position.
    pub fn put<T: Serialize>(
        &self,
        ns: Namespace,
        key: &str,
        value: &T,
        now_ms: i64,
    ) -> Result<()> {
        let encoded = serde_json::to_string(value)?;
        self.with_conn(|conn| upsert(conn, ns, key, &encoded, now_ms))
    }

    /// Fetch a value without touching its access time.
    pub fn get<T: DeserializeOwned>(&self, ns: Namespace, key: &str) -> Result<Option<T>> {
        let raw = self.with_conn(|conn| select_value(conn, ns, key))?;
        raw.map(|raw| decode(ns, key, &raw)).transpose()
    }

    /// Fetch a value and mark it as accessed at `now_ms`.
    pub fn get_and_touch<T: DeserializeOwned>(
        &self,
        ns: Namespace,
        key: &str,
        now_ms: i64,
    ) -> Result<Option<T>> {
        let raw = self.with_conn(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE kv_entries SET accessed_at = ?3 WHERE namespace = ?1 AND key = ?2",
                params![ns.as_str(), key, now_ms],
            )?;
            let raw = select_value(&tx, ns, key)?;
            tx.commit()?;
            Ok(raw)
        })?;
        raw.map(|raw| decode(ns, key, &raw)).transpose()
    }

    pub fn contains(&self, ns: Namespace, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM kv_entries WHERE namespace = ?1 AND key = ?2)",
                params![ns.as_str(), key],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Delete an entry. Returns whether it existed.
    pub fn remove(&self, ns: Namespace, key: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                params![ns.as_str(), key],
            )?;
            Ok(rows > 0)
        })
    }

    /// All values of a namespace in insertion order, oldest first.
    ///
    /// Entries that no longer decode are logged and skipped, never deleted.
    pub fn scan<T: DeserializeOwned>(&self, ns: Namespace) -> Result<Vec<T>> {
        let rows = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, value FROM kv_entries WHERE namespace = ?1 ORDER BY seq ASC",
            )?;
            let rows = stmt
                .query_map(params![ns.as_str()], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, raw)| match decode(ns, &key, &raw) {
                Ok(value) => Some(value),
                Err(error) => {
                    tracing::error!("Skipping undecodable {} entry {key}: {error}", ns.as_str());
                    None
                }
            })
            .collect())
    }

    /// Delete every entry of a namespace. Returns the number removed.
    pub fn clear(&self, ns: Namespace) -> Result<usize> {
        self.with_conn(|conn| {
            let rows = conn.execute(
                "DELETE FROM kv_entries WHERE namespace = ?1",
                params![ns.as_str()],
            )?;
            Ok(rows)
        })
    }

    pub fn usage(&self, ns: Namespace) -> Result<NamespaceUsage> {
        self.with_conn(|conn| {
            let (entries, bytes): (i64, i64) = conn.query_row(
                "SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM kv_entries WHERE namespace = ?1",
                params![ns.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            Ok(NamespaceUsage {
                entries: usize::try_from(entries).unwrap_or_default(),
                bytes: bytes as u64,
            })
        })
    }

    /// Entry metadata ordered least recently accessed first.
    pub fn entries_by_access(&self, ns: Namespace) -> Result<Vec<EntryMeta>> {
        self.with_conn(|conn| entries_by_access(conn, ns))
    }

    /// Insert or replace a value, first evicting least recently accessed
    /// entries of the same namespace until the new value fits `budget`.
    ///
    /// Eviction and insert commit together. Returns the evicted keys.
    pub fn put_within_budget<T: Serialize>(
        &self,
        ns: Namespace,
        key: &str,
        value: &T,
        now_ms: i64,
        budget: CacheBudget,
    ) -> Result<Vec<String>> {
        let encoded = serde_json::to_string(value)?;
        let size = encoded.len() as u64;
        if size > budget.max_bytes {
            return Err(Error::InvalidInput(format!(
                "entry {key} is {size} bytes, larger than the {} byte budget",
                budget.max_bytes
            )));
        }

        self.with_conn(|conn| {
            let tx = conn.transaction()?;

            let others = entries_by_access(&tx, ns)?
                .into_iter()
                .filter(|entry| entry.key != key)
                .collect::<Vec<_>>();
            let mut entries = others.len();
            let mut bytes = others.iter().map(|entry| entry.size_bytes).sum::<u64>();

            let mut evicted = Vec::new();
            for entry in others {
                if entries < budget.max_entries && bytes + size <= budget.max_bytes {
                    break;
                }
                tx.execute(
                    "DELETE FROM kv_entries WHERE namespace = ?1 AND key = ?2",
                    params![ns.as_str(), entry.key],
                )?;
                entries -= 1;
                bytes -= entry.size_bytes;
                evicted.push(entry.key);
            }

            upsert(&tx, ns, key, &encoded, now_ms)?;
            tx.commit()?;
            Ok(evicted)
        })
    }
}

fn upsert(conn: &Connection, ns: Namespace, key: &str, encoded: &str, now_ms: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO kv_entries (namespace, key, value, size_bytes, seq, updated_at, accessed_at)
         VALUES (?1, ?2, ?3, ?4,
                 (SELECT COALESCE(MAX(seq), 0) + 1 FROM kv_entries WHERE namespace = ?1),
                 ?5, ?5)
         ON CONFLICT(namespace, key) DO UPDATE SET
             value = excluded.value,
             size_bytes = excluded.size_bytes,
             updated_at = excluded.updated_at,
             accessed_at = excluded.accessed_at",
        params![ns.as_str(), key, encoded, encoded.len() as i64, now_ms],
    )?;
    Ok(())
}

fn select_value(conn: &Connection, ns: Namespace, key: &str) -> Result<Option<String>> {
    let raw = conn
        .query_row(
            "SELECT value FROM kv_entries WHERE namespace = ?1 AND key = ?2",
            params![ns.as_str(), key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(raw)
}

fn entries_by_access(conn: &Connection, ns: Namespace) -> Result<Vec<EntryMeta>> {
    let mut stmt = conn.prepare(
        "SELECT key, size_bytes, accessed_at FROM kv_entries
         WHERE namespace = ?1
         ORDER BY accessed_at ASC, seq ASC",
    )?;
    let entries = stmt
        .query_map(params![ns.as_str()], |row| {
            Ok(EntryMeta {
                key: row.get(0)?,
                size_bytes: row.get::<_, i64>(1)? as u64,
                accessed_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

fn decode<T: DeserializeOwned>(ns: Namespace, key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|error| {
        Error::Storage(format!(
            "corrupt {} entry {key}: {error}",
            ns.as_str()
        ))
    })
}
