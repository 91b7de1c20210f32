//! Dirty-path tracking for cross-process snapshot invalidation.
//!
//! Structural tree changes mark the affected path dirty in the shared
//! `cache_flags` store. Any process whose cached subject snapshot was
//! loaded before the mark must rebuild it. Invalidation is coarse by
//! design: the whole snapshot reloads rather than being patched.
//!
//! Ordering uses monotonic sequence numbers allocated inside the store
//! (`max + 1` within the marking transaction); local clocks are never
//! compared, so clock skew between processes cannot reorder marks.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sea_orm::ConnectionTrait;
use tracing::warn;

use accesstree_sdk::models::ContextPath;

use super::error::DomainError;
use super::repo::FlagRepository;

/// Flag type under which dirty paths are recorded.
pub const DIRTY_FLAG_TYPE: &str = "accesstree/dirtycontexts";

/// Process-local view over the shared dirty-path set.
pub struct DirtyTracker<F: FlagRepository> {
    flags: Arc<F>,
    loaded: Mutex<HashMap<ContextPath, i64>>,
}

impl<F: FlagRepository> DirtyTracker<F> {
    #[must_use]
    pub fn new(flags: Arc<F>) -> Self {
        Self {
            flags,
            loaded: Mutex::new(HashMap::new()),
        }
    }

    /// Refresh the local view from the shared store. Unparseable flag
    /// names are skipped with a warning; they cannot match any path.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn load<C: ConnectionTrait>(&self, conn: &C) -> Result<(), DomainError> {
        let records = self.flags.all(conn, DIRTY_FLAG_TYPE).await?;
        let mut view = HashMap::with_capacity(records.len());
        for record in records {
            match record.name.parse::<ContextPath>() {
                Ok(path) => {
                    view.insert(path, record.value);
                }
                Err(_) => {
                    warn!(flag = %record.name, "skipping malformed dirty flag");
                }
            }
        }
        *self.loaded.lock() = view;
        Ok(())
    }

    /// Record `path` as dirty; descendants are covered implicitly by
    /// the prefix match on read. Returns the sequence written.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn mark_dirty<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &ContextPath,
    ) -> Result<i64, DomainError> {
        let seq = self
            .flags
            .mark(conn, DIRTY_FLAG_TYPE, &path.to_string())
            .await?;
        self.loaded.lock().insert(path.clone(), seq);
        Ok(seq)
    }

    /// True when `path` or any of its ancestors was marked dirty after
    /// `since`, judging by the last [`load`](Self::load)ed view.
    #[must_use]
    pub fn is_dirty_since(&self, path: &ContextPath, since: i64) -> bool {
        self.loaded
            .lock()
            .iter()
            .any(|(dirty, seq)| *seq > since && dirty.is_or_contains(path))
    }

    /// Highest sequence currently recorded in the shared store.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn current<C: ConnectionTrait>(&self, conn: &C) -> Result<i64, DomainError> {
        self.flags.current(conn, DIRTY_FLAG_TYPE).await
    }

    /// Drop every dirty mark, shared and local.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn clear_all<C: ConnectionTrait>(&self, conn: &C) -> Result<(), DomainError> {
        self.flags.clear(conn, DIRTY_FLAG_TYPE).await?;
        self.loaded.lock().clear();
        Ok(())
    }
}
