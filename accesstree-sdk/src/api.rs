//! Versioned client trait implemented by the engine.

use async_trait::async_trait;

use crate::errors::AccessError;
use crate::models::{CapabilityDef, CatalogSyncReport, ContextLevel, ContextNode, Permission, Subject};

/// Library-level contract of the RBAC engine, consumed by enrollment,
/// course management and other collaborators.
///
/// Permission-denied is a `false` return, not an error; callers decide
/// how that becomes a user-visible response.
#[async_trait]
pub trait AccessTreeClientV1: Send + Sync {
    /// Whether `subject` holds `capability` at the given scope.
    ///
    /// Designated super-admins pass unconditionally; anonymous/guest
    /// subjects never pass for write or high-risk capabilities.
    ///
    /// # Errors
    ///
    /// [`AccessError::NotFound`] for an unknown scope id. An unknown
    /// capability name is `Ok(false)`, not an error.
    async fn has_capability(
        &self,
        capability: &str,
        context_id: i64,
        subject: Subject,
    ) -> Result<bool, AccessError>;

    /// Subjects holding `capability` at the scope, computed in bulk.
    /// Set-equivalent to probing [`has_capability`](Self::has_capability)
    /// per assignable subject (anonymous/guest excluded).
    ///
    /// # Errors
    ///
    /// [`AccessError::NotFound`] for an unknown scope id.
    async fn users_by_capability(
        &self,
        context_id: i64,
        capability: &str,
    ) -> Result<Vec<i64>, AccessError>;

    /// Scope for `(level, instance)`, creating it (and its parent
    /// chain) on first access.
    ///
    /// # Errors
    ///
    /// [`AccessError::Configuration`] when the parent chain cannot be
    /// materialized.
    async fn context(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Result<ContextNode, AccessError>;

    /// Re-parent a scope; recomputes the subtree's paths in one pass
    /// and marks both the old and new paths dirty.
    ///
    /// # Errors
    ///
    /// [`AccessError::NotFound`] for unknown ids,
    /// [`AccessError::Integrity`] when the move would create a cycle.
    async fn move_context(&self, context_id: i64, new_parent_id: i64) -> Result<(), AccessError>;

    /// Delete a scope and every descendant scope, cascading role
    /// assignments and overrides, and marking the path dirty.
    ///
    /// # Errors
    ///
    /// [`AccessError::NotFound`] for an unknown id,
    /// [`AccessError::Integrity`] for the system context.
    async fn delete_context(&self, context_id: i64) -> Result<(), AccessError>;

    /// Idempotently grant `role_id` to `subject_id` at the scope.
    ///
    /// # Errors
    ///
    /// [`AccessError::Internal`] on storage failure.
    async fn assign_role(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<(), AccessError>;

    /// Revoke a previously granted role.
    ///
    /// # Errors
    ///
    /// [`AccessError::Internal`] on storage failure.
    async fn unassign_role(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<(), AccessError>;

    /// Set an explicit permission override. [`Permission::Inherit`]
    /// removes the row. Callers batching many overrides should call
    /// [`reset_caches`](Self::reset_caches) once afterwards.
    ///
    /// # Errors
    ///
    /// [`AccessError::Internal`] on storage failure.
    async fn set_override(
        &self,
        capability: &str,
        role_id: i64,
        context_id: i64,
        permission: Permission,
    ) -> Result<(), AccessError>;

    /// Sync a component's capability catalog. Per-item failures are
    /// reported, not raised; override rows survive renames.
    ///
    /// # Errors
    ///
    /// [`AccessError::Internal`] on storage failure affecting the batch.
    async fn update_capabilities(
        &self,
        component: &str,
        defs: Vec<CapabilityDef>,
    ) -> Result<CatalogSyncReport, AccessError>;

    /// Drop every in-process cache (context cache, subject snapshots).
    ///
    /// # Errors
    ///
    /// Infallible today; reserved for shared-store resets.
    async fn reset_caches(&self) -> Result<(), AccessError>;
}
