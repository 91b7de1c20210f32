//! Repository traits: the relational contract the engine consumes.
//!
//! Every method is generic over the connection so callers can pass
//! either the pooled connection or an open transaction. Records are
//! storage-shaped; hydration into domain types validates required
//! fields and fails fast on malformed rows.

use async_trait::async_trait;
use sea_orm::ConnectionTrait;

use accesstree_sdk::models::{CapType, Capability, ContextLevel, ContextNode, ContextPath, RiskMask};

use super::error::DomainError;

/// Raw `context` row.
#[derive(Clone, Debug, PartialEq)]
pub struct ContextRecord {
    pub id: i64,
    pub level: i16,
    pub instance_id: i64,
    /// `None` means "reset, pending rebuild".
    pub path: Option<String>,
    pub depth: i32,
}

impl ContextRecord {
    /// Validate and convert into a domain node.
    ///
    /// # Errors
    ///
    /// [`DomainError::Configuration`] when the path is not materialized;
    /// [`DomainError::Integrity`] when the row contradicts itself
    /// (unknown level, malformed path, path/depth mismatch).
    pub fn hydrate(&self) -> Result<ContextNode, DomainError> {
        let level = ContextLevel::from_i16(self.level).ok_or_else(|| {
            DomainError::integrity(format!("context {} has unknown level {}", self.id, self.level))
        })?;
        let raw = self.path.as_deref().ok_or_else(|| {
            DomainError::configuration(format!(
                "context {} has no materialized path; rebuild required",
                self.id
            ))
        })?;
        let path: ContextPath = raw.parse().map_err(|_| {
            DomainError::integrity(format!("context {} has malformed path {raw:?}", self.id))
        })?;
        if path.leaf() != self.id {
            return Err(DomainError::integrity(format!(
                "context {} path {raw:?} does not end in its own id",
                self.id
            )));
        }
        if i64::from(self.depth) != i64::from(path.depth()) {
            return Err(DomainError::integrity(format!(
                "context {} depth {} does not match path {raw:?}",
                self.id, self.depth
            )));
        }
        let depth = path.depth();
        Ok(ContextNode {
            id: self.id,
            level,
            instance_id: self.instance_id,
            path,
            depth,
        })
    }
}

/// CRUD + tree maintenance over the `context` table.
#[async_trait]
pub trait ContextRepository: Send + Sync {
    /// Insert a row with `path = NULL, depth = 0`; returns the new id.
    async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: i16,
        instance_id: i64,
    ) -> Result<i64, DomainError>;

    async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<Option<ContextRecord>, DomainError>;

    async fn find_by_instance<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: i16,
        instance_id: i64,
    ) -> Result<Option<ContextRecord>, DomainError>;

    async fn find_by_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i64],
    ) -> Result<Vec<ContextRecord>, DomainError>;

    async fn all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<ContextRecord>, DomainError>;

    async fn list_by_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: i16,
    ) -> Result<Vec<ContextRecord>, DomainError>;

    async fn set_path<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        path: &str,
        depth: i32,
    ) -> Result<(), DomainError>;

    /// Reset one row to the unknown state (`path = NULL, depth = 0`).
    async fn clear_path<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<(), DomainError>;

    /// Reset every row strictly under `path`.
    async fn clear_paths_under<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &str,
    ) -> Result<u64, DomainError>;

    /// Rows strictly under `path` (prefix match; a single query).
    async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &str,
    ) -> Result<Vec<ContextRecord>, DomainError>;

    /// Re-prefix an entire subtree in one bulk pass: every row whose
    /// path is `old_path` or starts with `old_path/` gets the prefix
    /// replaced by `new_path` and its depth shifted by `depth_delta`.
    async fn move_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        old_path: &str,
        new_path: &str,
        depth_delta: i32,
    ) -> Result<u64, DomainError>;

    /// Delete a row and all its descendants; returns the deleted ids.
    async fn delete_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &str,
    ) -> Result<Vec<i64>, DomainError>;

    async fn delete_by_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i64],
    ) -> Result<u64, DomainError>;
}

/// Raw `role_assignments` row.
#[derive(Clone, Debug, PartialEq)]
pub struct AssignmentRecord {
    pub id: i64,
    pub role_id: i64,
    pub subject_id: i64,
    pub context_id: i64,
    pub component: String,
    pub item_id: i64,
}

/// New assignment to persist.
#[derive(Clone, Debug, PartialEq)]
pub struct NewAssignment {
    pub role_id: i64,
    pub subject_id: i64,
    pub context_id: i64,
    pub component: String,
    pub item_id: i64,
}

impl NewAssignment {
    /// Manual grant (no owning component).
    #[must_use]
    pub fn manual(role_id: i64, subject_id: i64, context_id: i64) -> Self {
        Self {
            role_id,
            subject_id,
            context_id,
            component: String::new(),
            item_id: 0,
        }
    }
}

/// Optional criteria for bulk unassignment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssignmentFilter {
    pub role_id: Option<i64>,
    pub subject_id: Option<i64>,
    pub context_id: Option<i64>,
    pub component: Option<String>,
}

/// CRUD over `role_assignments`.
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    /// Idempotent insert; returns `true` when a row was created.
    async fn insert_if_absent<C: ConnectionTrait>(
        &self,
        conn: &C,
        assignment: &NewAssignment,
    ) -> Result<bool, DomainError>;

    async fn remove<C: ConnectionTrait>(
        &self,
        conn: &C,
        assignment: &NewAssignment,
    ) -> Result<u64, DomainError>;

    async fn remove_matching<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &AssignmentFilter,
    ) -> Result<u64, DomainError>;

    async fn remove_by_context_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<u64, DomainError>;

    async fn for_subject<C: ConnectionTrait>(
        &self,
        conn: &C,
        subject_id: i64,
    ) -> Result<Vec<AssignmentRecord>, DomainError>;

    async fn in_contexts<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<Vec<AssignmentRecord>, DomainError>;
}

/// Raw `role_capabilities` row. Stored rows never carry `Inherit`;
/// that value is represented by the absence of the row.
#[derive(Clone, Debug, PartialEq)]
pub struct OverrideRecord {
    pub context_id: i64,
    pub role_id: i64,
    pub capability: String,
    pub permission: i32,
}

/// CRUD over `role_capabilities`.
#[async_trait]
pub trait OverrideRepository: Send + Sync {
    async fn upsert<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_id: i64,
        role_id: i64,
        capability: &str,
        permission: i32,
    ) -> Result<(), DomainError>;

    async fn remove<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_id: i64,
        role_id: i64,
        capability: &str,
    ) -> Result<u64, DomainError>;

    async fn for_roles<C: ConnectionTrait>(
        &self,
        conn: &C,
        role_ids: &[i64],
    ) -> Result<Vec<OverrideRecord>, DomainError>;

    async fn for_contexts<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<Vec<OverrideRecord>, DomainError>;

    async fn remove_by_context_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<u64, DomainError>;

    /// Carry override rows across a capability rename.
    async fn rename_capability<C: ConnectionTrait>(
        &self,
        conn: &C,
        old_name: &str,
        new_name: &str,
    ) -> Result<u64, DomainError>;

    async fn remove_capability<C: ConnectionTrait>(
        &self,
        conn: &C,
        capability: &str,
    ) -> Result<u64, DomainError>;
}

/// Raw `capabilities` row.
#[derive(Clone, Debug, PartialEq)]
pub struct CapabilityRecord {
    pub id: i64,
    pub name: String,
    pub captype: String,
    pub context_level: i16,
    pub component: String,
    pub risk: i64,
}

impl CapabilityRecord {
    /// Validate and convert into the domain type.
    ///
    /// # Errors
    ///
    /// [`DomainError::Integrity`] on unknown captype/level or a risk
    /// mask outside the storable range.
    pub fn hydrate(&self) -> Result<Capability, DomainError> {
        let captype = CapType::parse(&self.captype).ok_or_else(|| {
            DomainError::integrity(format!(
                "capability {:?} has unknown captype {:?}",
                self.name, self.captype
            ))
        })?;
        let context_level = ContextLevel::from_i16(self.context_level).ok_or_else(|| {
            DomainError::integrity(format!(
                "capability {:?} has unknown context level {}",
                self.name, self.context_level
            ))
        })?;
        let risk = u32::try_from(self.risk).map(RiskMask).map_err(|_| {
            DomainError::integrity(format!(
                "capability {:?} has out-of-range risk mask {}",
                self.name, self.risk
            ))
        })?;
        Ok(Capability {
            name: self.name.clone(),
            captype,
            context_level,
            component: self.component.clone(),
            risk,
        })
    }
}

/// CRUD over the `capabilities` catalog.
#[async_trait]
pub trait CapabilityRepository: Send + Sync {
    async fn find_by_name<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<Option<CapabilityRecord>, DomainError>;

    async fn list_by_component<C: ConnectionTrait>(
        &self,
        conn: &C,
        component: &str,
    ) -> Result<Vec<CapabilityRecord>, DomainError>;

    async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        captype: &str,
        context_level: i16,
        component: &str,
        risk: i64,
    ) -> Result<(), DomainError>;

    /// Update everything but the id for the row named `name`.
    async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        new_name: &str,
        captype: &str,
        context_level: i16,
        component: &str,
        risk: i64,
    ) -> Result<(), DomainError>;

    async fn remove<C: ConnectionTrait>(&self, conn: &C, name: &str) -> Result<u64, DomainError>;
}

/// Raw `cache_flags` row.
#[derive(Clone, Debug, PartialEq)]
pub struct FlagRecord {
    pub name: String,
    pub value: i64,
}

/// Shared key-value flags used for cross-process invalidation.
///
/// Values are monotonic sequence numbers allocated inside the store
/// (`max + 1`), never local wall-clock timestamps.
#[async_trait]
pub trait FlagRepository: Send + Sync {
    /// Record `name` under `flagtype` with the next sequence number;
    /// returns the sequence written.
    async fn mark<C: ConnectionTrait>(
        &self,
        conn: &C,
        flagtype: &str,
        name: &str,
    ) -> Result<i64, DomainError>;

    async fn all<C: ConnectionTrait>(
        &self,
        conn: &C,
        flagtype: &str,
    ) -> Result<Vec<FlagRecord>, DomainError>;

    /// Highest sequence currently recorded for `flagtype` (0 if none).
    async fn current<C: ConnectionTrait>(&self, conn: &C, flagtype: &str)
    -> Result<i64, DomainError>;

    async fn clear<C: ConnectionTrait>(&self, conn: &C, flagtype: &str)
    -> Result<u64, DomainError>;
}
