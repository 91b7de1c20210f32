//! Scope-tree service: lookup, on-demand creation, moves, deletion and
//! path maintenance.
//!
//! Every bulk mutation (move, delete, rebuild, orphan cleanup) runs in
//! one transaction: a move that rewrites N descendant paths either
//! fully succeeds or fully rolls back.

use std::collections::HashMap;
use std::sync::Arc;

use sea_orm::{DatabaseConnection, TransactionTrait};
use tracing::{info, instrument, warn};

use accesstree_sdk::models::{ContextLevel, ContextNode, ContextPath};

use super::cache::ContextCache;
use super::directory::ContextDirectory;
use super::dirty::DirtyTracker;
use super::error::DomainError;
use super::repo::{
    AssignmentRepository, ContextRecord, ContextRepository, FlagRepository, OverrideRepository,
};

/// Hard bound on parent-chain length during on-demand creation; a
/// longer chain indicates a cycle in the directory's parent answers.
const MAX_PARENT_CHAIN: usize = 64;

fn depth_i32(path: &ContextPath) -> i32 {
    i32::try_from(path.depth()).unwrap_or(i32::MAX)
}

/// Tree CRUD and path maintenance over the `context` table, fronted by
/// the in-process [`ContextCache`].
pub struct ContextService<R, A, O, F, D>
where
    R: ContextRepository,
    A: AssignmentRepository,
    O: OverrideRepository,
    F: FlagRepository,
    D: ContextDirectory,
{
    db: DatabaseConnection,
    repo: Arc<R>,
    assignments: Arc<A>,
    overrides: Arc<O>,
    cache: Arc<ContextCache>,
    dirty: Arc<DirtyTracker<F>>,
    directory: Arc<D>,
}

impl<R, A, O, F, D> ContextService<R, A, O, F, D>
where
    R: ContextRepository,
    A: AssignmentRepository,
    O: OverrideRepository,
    F: FlagRepository,
    D: ContextDirectory,
{
    pub fn new(
        db: DatabaseConnection,
        repo: Arc<R>,
        assignments: Arc<A>,
        overrides: Arc<O>,
        cache: Arc<ContextCache>,
        dirty: Arc<DirtyTracker<F>>,
        directory: Arc<D>,
    ) -> Self {
        Self {
            db,
            repo,
            assignments,
            overrides,
            cache,
            dirty,
            directory,
        }
    }

    #[must_use]
    pub fn cache(&self) -> &ContextCache {
        &self.cache
    }

    /// The single system context, created on first access.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn system(&self) -> Result<Arc<ContextNode>, DomainError> {
        self.instance(ContextLevel::System, 0, true).await
    }

    /// Look a context up by id.
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for an unknown id;
    /// [`DomainError::Configuration`] when the row's path is pending
    /// rebuild.
    pub async fn instance_by_id(&self, id: i64) -> Result<Arc<ContextNode>, DomainError> {
        if let Some(node) = self.cache.get(id) {
            return Ok(node);
        }
        let record = self
            .repo
            .find_by_id(&self.db, id)
            .await?
            .ok_or(DomainError::not_found("context", id))?;
        Ok(self.cache.put(record.hydrate()?))
    }

    /// Look a context up by `(level, instance)`, creating the row (and
    /// any missing parent chain) on first access when `create` is set.
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] when absent and `create` is false;
    /// [`DomainError::Integrity`] for a non-zero system instance or a
    /// cyclic directory answer.
    pub async fn instance(
        &self,
        level: ContextLevel,
        instance_id: i64,
        create: bool,
    ) -> Result<Arc<ContextNode>, DomainError> {
        if level == ContextLevel::System && instance_id != 0 {
            return Err(DomainError::integrity(
                "system context instance id must be 0",
            ));
        }
        if let Some(node) = self.cache.get_by_instance(level, instance_id) {
            return Ok(node);
        }
        if let Some(record) = self
            .repo
            .find_by_instance(&self.db, level.as_i16(), instance_id)
            .await?
        {
            return Ok(self.cache.put(record.hydrate()?));
        }
        if !create {
            return Err(DomainError::not_found("context instance", instance_id));
        }
        self.create_chain(level, instance_id).await
    }

    /// Parent context; `None` for the system context.
    ///
    /// # Errors
    ///
    /// [`DomainError::Integrity`] when the path references a missing
    /// ancestor row.
    pub async fn parent(
        &self,
        node: &ContextNode,
    ) -> Result<Option<Arc<ContextNode>>, DomainError> {
        match node.parent_id() {
            None => Ok(None),
            Some(id) => Ok(Some(self.instance_by_id(id).await?)),
        }
    }

    /// Ancestors, nearest first, optionally including the node itself.
    ///
    /// # Errors
    ///
    /// [`DomainError::Integrity`] when the path references a missing
    /// ancestor row.
    pub async fn ancestors(
        &self,
        node: &ContextNode,
        include_self: bool,
    ) -> Result<Vec<Arc<ContextNode>>, DomainError> {
        let ids = node.path.segments();
        let by_id = self.nodes_by_ids(ids).await?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids.iter().rev() {
            if !include_self && *id == node.id {
                continue;
            }
            let found = by_id
                .get(id)
                .ok_or_else(|| {
                    DomainError::integrity(format!(
                        "context {} path references missing ancestor {id}",
                        node.id
                    ))
                })?
                .clone();
            out.push(found);
        }
        Ok(out)
    }

    /// Ancestor ids in `path` split order (root first).
    #[must_use]
    pub fn ancestor_ids(node: &ContextNode, include_self: bool) -> Vec<i64> {
        let segments = node.path.segments();
        if include_self {
            segments.to_vec()
        } else {
            segments[..segments.len() - 1].to_vec()
        }
    }

    /// All descendants (unordered), fetched with a single prefix query
    /// and fed through the cache.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn descendants(
        &self,
        node: &ContextNode,
    ) -> Result<Vec<Arc<ContextNode>>, DomainError> {
        let records = self
            .repo
            .descendants(&self.db, &node.path.to_string())
            .await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            match record.hydrate() {
                Ok(hydrated) => out.push(self.cache.put(hydrated)),
                Err(DomainError::Configuration(_)) => {
                    warn!(context = record.id, "skipping descendant pending rebuild");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    /// Nearest ancestor (or self) at [`ContextLevel::Course`].
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] when `must_exist` and no course scope
    /// encloses the node.
    pub async fn course_ancestor(
        &self,
        node: &ContextNode,
        must_exist: bool,
    ) -> Result<Option<Arc<ContextNode>>, DomainError> {
        for ancestor in self.ancestors(node, true).await? {
            if ancestor.level == ContextLevel::Course {
                return Ok(Some(ancestor));
            }
        }
        if must_exist {
            return Err(DomainError::not_found("course context", node.id));
        }
        Ok(None)
    }

    /// Re-parent a context. Recomputes the paths of the node and all
    /// descendants in one bulk pass and marks both the old and new
    /// paths dirty. Moving to the current parent is a no-op.
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for unknown ids;
    /// [`DomainError::Integrity`] for the system context or a move
    /// under the node's own subtree.
    #[instrument(skip(self))]
    pub async fn move_context(
        &self,
        context_id: i64,
        new_parent_id: i64,
    ) -> Result<(), DomainError> {
        let txn = self.db.begin().await?;
        let node = self
            .repo
            .find_by_id(&txn, context_id)
            .await?
            .ok_or(DomainError::not_found("context", context_id))?
            .hydrate()?;
        if node.is_system() {
            return Err(DomainError::integrity("system context cannot be moved"));
        }
        let parent = self
            .repo
            .find_by_id(&txn, new_parent_id)
            .await?
            .ok_or(DomainError::not_found("context", new_parent_id))?
            .hydrate()?;
        if node.parent_id() == Some(parent.id) {
            txn.commit().await?;
            return Ok(());
        }
        if node.path.is_or_contains(&parent.path) {
            return Err(DomainError::integrity(
                "cannot move a context under its own subtree",
            ));
        }
        let new_path = parent.path.child(node.id);
        let delta = depth_i32(&new_path) - depth_i32(&node.path);
        let rewritten = self
            .repo
            .move_subtree(&txn, &node.path.to_string(), &new_path.to_string(), delta)
            .await?;
        self.dirty.mark_dirty(&txn, &node.path).await?;
        self.dirty.mark_dirty(&txn, &new_path).await?;
        txn.commit().await?;
        self.cache.reset_all();
        info!(context = context_id, rewritten, "moved context subtree");
        Ok(())
    }

    /// Delete a context and every descendant context in one operation,
    /// cascading role assignments and overrides, after handing the
    /// domain content to [`ContextDirectory::delete_content`].
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for an unknown id;
    /// [`DomainError::Integrity`] for the system context.
    #[instrument(skip(self))]
    pub async fn delete_context(&self, context_id: i64) -> Result<(), DomainError> {
        let node = self.instance_by_id(context_id).await?;
        if node.is_system() {
            return Err(DomainError::integrity("system context cannot be deleted"));
        }
        self.directory.delete_content(&node).await?;
        let txn = self.db.begin().await?;
        let ids = self
            .repo
            .delete_subtree(&txn, &node.path.to_string())
            .await?;
        self.assignments.remove_by_context_ids(&txn, &ids).await?;
        self.overrides.remove_by_context_ids(&txn, &ids).await?;
        self.dirty.mark_dirty(&txn, &node.path).await?;
        txn.commit().await?;
        self.cache.remove_many(&ids);
        info!(
            context = context_id,
            descendants = ids.len().saturating_sub(1),
            "deleted context subtree"
        );
        Ok(())
    }

    /// Reset a context (and optionally its descendants) to the unknown
    /// path state, pending [`rebuild_all_paths`](Self::rebuild_all_paths).
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for an unknown id.
    pub async fn reset_paths(&self, context_id: i64, recursive: bool) -> Result<(), DomainError> {
        let record = self
            .repo
            .find_by_id(&self.db, context_id)
            .await?
            .ok_or(DomainError::not_found("context", context_id))?;
        let txn = self.db.begin().await?;
        if recursive {
            if let Some(path) = &record.path {
                self.repo.clear_paths_under(&txn, path).await?;
            }
        }
        self.repo.clear_path(&txn, context_id).await?;
        txn.commit().await?;
        self.cache.reset_all();
        Ok(())
    }

    /// Recompute every path and depth top-down from the system context.
    /// Idempotent: a second run updates nothing. Rows whose parent
    /// cannot be located are left untouched and logged.
    ///
    /// # Errors
    ///
    /// [`DomainError::Configuration`] when no system context exists.
    #[instrument(skip(self))]
    pub async fn rebuild_all_paths(&self) -> Result<usize, DomainError> {
        let txn = self.db.begin().await?;
        let records = self.repo.all(&txn).await?;
        let Some(sys) = records
            .iter()
            .find(|r| r.level == ContextLevel::System.as_i16())
        else {
            return Err(DomainError::configuration(
                "no system context to rebuild from",
            ));
        };

        let mut resolved: HashMap<(i16, i64), ContextPath> = HashMap::new();
        resolved.insert((sys.level, sys.instance_id), ContextPath::root(sys.id));

        let mut pending: Vec<(&ContextRecord, (i16, i64))> = Vec::new();
        for record in &records {
            if record.id == sys.id {
                continue;
            }
            let level = ContextLevel::from_i16(record.level).ok_or_else(|| {
                DomainError::integrity(format!(
                    "context {} has unknown level {}",
                    record.id, record.level
                ))
            })?;
            let parent = match self.directory.parent_of(level, record.instance_id).await? {
                Some((pl, pi)) => (pl.as_i16(), pi),
                None => (ContextLevel::System.as_i16(), 0),
            };
            pending.push((record, parent));
        }

        // Fixpoint over the parent map: each pass materializes the rows
        // whose parent got a path in an earlier pass (breadth-first by
        // depth).
        loop {
            let before = pending.len();
            let mut unresolved = Vec::with_capacity(pending.len());
            for (record, parent) in pending {
                if let Some(parent_path) = resolved.get(&parent) {
                    let path = parent_path.child(record.id);
                    resolved.insert((record.level, record.instance_id), path);
                } else {
                    unresolved.push((record, parent));
                }
            }
            pending = unresolved;
            if pending.len() == before {
                break;
            }
        }
        for (record, _) in &pending {
            warn!(
                context = record.id,
                "cannot rebuild path: parent context missing"
            );
        }

        let mut updated = 0usize;
        for record in &records {
            let Some(path) = resolved.get(&(record.level, record.instance_id)) else {
                continue;
            };
            let rendered = path.to_string();
            let depth = depth_i32(path);
            if record.path.as_deref() != Some(rendered.as_str()) || record.depth != depth {
                self.repo.set_path(&txn, record.id, &rendered, depth).await?;
                updated += 1;
            }
        }
        txn.commit().await?;
        self.cache.reset_all();
        info!(updated, "rebuilt context paths");
        Ok(updated)
    }

    /// Delete context rows whose underlying instance no longer exists,
    /// bulk per level, cascading their assignments and overrides.
    ///
    /// # Errors
    ///
    /// Storage or directory failures.
    #[instrument(skip(self))]
    pub async fn cleanup_orphans(&self) -> Result<usize, DomainError> {
        let txn = self.db.begin().await?;
        let mut removed = 0usize;
        for level in ContextLevel::non_system() {
            let rows = self.repo.list_by_level(&txn, level.as_i16()).await?;
            let mut dead = Vec::new();
            for row in rows {
                if !self.directory.exists(level, row.instance_id).await? {
                    dead.push(row.id);
                }
            }
            if dead.is_empty() {
                continue;
            }
            self.assignments.remove_by_context_ids(&txn, &dead).await?;
            self.overrides.remove_by_context_ids(&txn, &dead).await?;
            let count = self.repo.delete_by_ids(&txn, &dead).await?;
            removed += usize::try_from(count).unwrap_or(usize::MAX);
        }
        txn.commit().await?;
        if removed > 0 {
            self.cache.reset_all();
            info!(removed, "deleted orphaned contexts");
        }
        Ok(removed)
    }

    /// Bulk-hydrate contexts into the cache with one query, for
    /// page-render style access patterns. Rows pending rebuild are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Storage failures or integrity violations.
    pub async fn preload_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<Vec<Arc<ContextNode>>, DomainError> {
        let by_id = self.nodes_by_ids(ids).await?;
        Ok(by_id.into_values().collect())
    }

    /// Bulk-hydrate a subtree into the cache with one query.
    ///
    /// # Errors
    ///
    /// Storage failures or integrity violations.
    pub async fn preload_descendants(
        &self,
        node: &ContextNode,
    ) -> Result<Vec<Arc<ContextNode>>, DomainError> {
        self.descendants(node).await
    }

    /// Drop the context cache.
    pub fn reset_caches(&self) {
        self.cache.reset_all();
    }

    /// Resolve many ids through the cache, fetching the misses with a
    /// single query. Rows pending rebuild are skipped with a warning.
    pub(crate) async fn nodes_by_ids(
        &self,
        ids: &[i64],
    ) -> Result<HashMap<i64, Arc<ContextNode>>, DomainError> {
        let mut out = HashMap::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            if let Some(node) = self.cache.get(*id) {
                out.insert(*id, node);
            } else if !missing.contains(id) {
                missing.push(*id);
            }
        }
        if missing.is_empty() {
            return Ok(out);
        }
        for record in self.repo.find_by_ids(&self.db, &missing).await? {
            match record.hydrate() {
                Ok(node) => {
                    out.insert(node.id, self.cache.put(node));
                }
                Err(DomainError::Configuration(_)) => {
                    warn!(context = record.id, "skipping context pending rebuild");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn create_chain(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Result<Arc<ContextNode>, DomainError> {
        let txn = self.db.begin().await?;
        // Walk the directory up to the nearest ancestor that already
        // has a context row.
        let mut chain = vec![(level, instance_id)];
        let mut parent_record: Option<ContextRecord> = None;
        let (mut cur_level, mut cur_instance) = (level, instance_id);
        loop {
            if chain.len() > MAX_PARENT_CHAIN {
                return Err(DomainError::integrity(
                    "parent chain exceeds depth bound; cyclic directory answers",
                ));
            }
            match self.directory.parent_of(cur_level, cur_instance).await? {
                Some((parent_level, parent_instance)) => {
                    if let Some(record) = self
                        .repo
                        .find_by_instance(&txn, parent_level.as_i16(), parent_instance)
                        .await?
                    {
                        parent_record = Some(record);
                        break;
                    }
                    chain.push((parent_level, parent_instance));
                    cur_level = parent_level;
                    cur_instance = parent_instance;
                }
                None => {
                    if cur_level != ContextLevel::System {
                        parent_record = Some(self.ensure_system(&txn).await?);
                    }
                    break;
                }
            }
        }

        let mut parent_path = match &parent_record {
            Some(record) => Some(record.hydrate()?.path),
            None => None,
        };
        let mut created = Vec::with_capacity(chain.len());
        for (chain_level, chain_instance) in chain.into_iter().rev() {
            let id = self
                .repo
                .insert(&txn, chain_level.as_i16(), chain_instance)
                .await?;
            let path = match &parent_path {
                Some(parent) => parent.child(id),
                None => ContextPath::root(id),
            };
            self.repo
                .set_path(&txn, id, &path.to_string(), depth_i32(&path))
                .await?;
            created.push(ContextNode {
                id,
                level: chain_level,
                instance_id: chain_instance,
                depth: path.depth(),
                path: path.clone(),
            });
            parent_path = Some(path);
        }
        txn.commit().await?;

        let mut leaf = None;
        for node in created {
            leaf = Some(self.cache.put(node));
        }
        leaf.ok_or_else(|| DomainError::integrity("context creation produced no rows"))
    }

    async fn ensure_system(
        &self,
        txn: &sea_orm::DatabaseTransaction,
    ) -> Result<ContextRecord, DomainError> {
        if let Some(record) = self
            .repo
            .find_by_instance(txn, ContextLevel::System.as_i16(), 0)
            .await?
        {
            return Ok(record);
        }
        let id = self
            .repo
            .insert(txn, ContextLevel::System.as_i16(), 0)
            .await?;
        let path = ContextPath::root(id);
        self.repo
            .set_path(txn, id, &path.to_string(), depth_i32(&path))
            .await?;
        Ok(ContextRecord {
            id,
            level: ContextLevel::System.as_i16(),
            instance_id: 0,
            path: Some(path.to_string()),
            depth: depth_i32(&path),
        })
    }
}
