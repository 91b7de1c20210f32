//! Role grants: persistent assignments, explicit permission overrides,
//! session role switching and temporary elevation.
//!
//! Assignment and override writes do not invalidate subject snapshots
//! per call, since the tree shape is untouched. Callers batching changes
//! invalidate once afterwards via
//! [`invalidate_subject_snapshots`](RoleService::invalidate_subject_snapshots).

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use tracing::{debug, instrument};

use accesstree_sdk::models::{ContextNode, Permission};

use super::error::DomainError;
use super::repo::{AssignmentFilter, AssignmentRepository, NewAssignment, OverrideRepository};
use super::resolver::SessionStore;

/// Grant management over `role_assignments` and `role_capabilities`.
pub struct RoleService<A, O>
where
    A: AssignmentRepository,
    O: OverrideRepository,
{
    db: DatabaseConnection,
    assignments: Arc<A>,
    overrides: Arc<O>,
    sessions: Arc<SessionStore>,
}

impl<A, O> RoleService<A, O>
where
    A: AssignmentRepository,
    O: OverrideRepository,
{
    pub fn new(
        db: DatabaseConnection,
        assignments: Arc<A>,
        overrides: Arc<O>,
        sessions: Arc<SessionStore>,
    ) -> Self {
        Self {
            db,
            assignments,
            overrides,
            sessions,
        }
    }

    /// Idempotently grant `role_id` to `subject_id` at the scope; a
    /// second identical grant leaves a single row.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn assign(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<(), DomainError> {
        self.assign_component(role_id, subject_id, context_id, "", 0)
            .await
    }

    /// Component-owned variant of [`assign`](Self::assign), used by
    /// enrolment plugins that need to tell their grants apart.
    ///
    /// # Errors
    ///
    /// Storage failures.
    #[instrument(skip(self))]
    pub async fn assign_component(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
        component: &str,
        item_id: i64,
    ) -> Result<(), DomainError> {
        let assignment = NewAssignment {
            role_id,
            subject_id,
            context_id,
            component: component.to_owned(),
            item_id,
        };
        let inserted = self
            .assignments
            .insert_if_absent(&self.db, &assignment)
            .await?;
        if inserted {
            debug!(role_id, subject_id, context_id, "assigned role");
        }
        Ok(())
    }

    /// Revoke a manual grant.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub async fn unassign(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<(), DomainError> {
        self.assignments
            .remove(&self.db, &NewAssignment::manual(role_id, subject_id, context_id))
            .await?;
        Ok(())
    }

    /// Bulk revoke; returns the number of rows removed.
    ///
    /// # Errors
    ///
    /// Storage failures.
    #[instrument(skip(self))]
    pub async fn unassign_all(&self, filter: &AssignmentFilter) -> Result<u64, DomainError> {
        if filter.role_id.is_none()
            && filter.subject_id.is_none()
            && filter.context_id.is_none()
            && filter.component.is_none()
        {
            return Err(DomainError::configuration(
                "refusing to unassign with an empty filter",
            ));
        }
        self.assignments.remove_matching(&self.db, filter).await
    }

    /// For the current session only, replace the subject's effective
    /// roles at the scope and its descendants with exactly `role_id`
    /// (`None` clears the switch). Switches stack by scope path, so
    /// nested switches stay distinguishable.
    pub fn switch_role(&self, subject_id: i64, scope: &ContextNode, role_id: Option<i64>) {
        self.sessions
            .set_switch(subject_id, scope.path.clone(), role_id);
    }

    /// Whether the session has an active switch exactly at the scope.
    #[must_use]
    pub fn is_role_switched(&self, subject_id: i64, scope: &ContextNode) -> bool {
        self.sessions.is_switched(subject_id, &scope.path)
    }

    /// Session-scoped just-in-time elevation at the scope, e.g. for
    /// enrolment wizards. Cleared explicitly via
    /// [`remove_temporary_roles`](Self::remove_temporary_roles) or by
    /// session end.
    pub fn load_temporary_role(&self, subject_id: i64, scope: &ContextNode, role_id: i64) {
        self.sessions
            .add_temp_role(subject_id, scope.path.clone(), role_id);
    }

    /// Drop every temporary role the session holds at the scope.
    pub fn remove_temporary_roles(&self, subject_id: i64, scope: &ContextNode) {
        self.sessions.remove_temp_roles(subject_id, &scope.path);
    }

    /// Set an explicit `(capability, role, scope)` permission.
    /// [`Permission::Inherit`] deletes the row; it is equivalent to no
    /// explicit override. Batch callers invalidate snapshots once at
    /// the end, not per row.
    ///
    /// # Errors
    ///
    /// Storage failures.
    #[instrument(skip(self))]
    pub async fn set_override(
        &self,
        capability: &str,
        role_id: i64,
        context_id: i64,
        permission: Permission,
    ) -> Result<(), DomainError> {
        match permission {
            Permission::Inherit => {
                self.overrides
                    .remove(&self.db, context_id, role_id, capability)
                    .await?;
            }
            other => {
                self.overrides
                    .upsert(&self.db, context_id, role_id, capability, other.as_i32())
                    .await?;
            }
        }
        Ok(())
    }

    /// Drop every subject snapshot. Call once after a batch of
    /// assignment/override changes.
    pub fn invalidate_subject_snapshots(&self) {
        self.sessions.drop_all_snapshots();
    }
}
