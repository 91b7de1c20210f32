//! Capability resolution.
//!
//! Per subject the engine keeps a session-scoped permission snapshot:
//! `ra` maps each scope path the subject holds roles at to those role
//! ids, `rdef` maps `(scope path, role)` to the explicit permission
//! rows for that pair. Resolution walks the queried scope's ancestor
//! path: per role the closest explicit value wins, then roles are
//! aggregated with `Prohibit` absolute over `Allow` over everything
//! else. No explicit grant anywhere means not permitted.
//!
//! Session role switches and temporary roles live next to the snapshot,
//! not inside it, so a dirty reload cannot silently drop them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use sea_orm::DatabaseConnection;
use tracing::{instrument, warn};

use accesstree_sdk::models::{CapType, ContextPath, Permission, Subject};

use crate::config::AccessConfig;

use super::directory::ContextDirectory;
use super::dirty::DirtyTracker;
use super::error::DomainError;
use super::repo::{
    AssignmentRepository, CapabilityRepository, ContextRepository, FlagRepository,
    OverrideRepository,
};
use super::tree::ContextService;

/// Aggregated permission state of one subject, keyed by scope path.
pub(crate) struct SubjectSnapshot {
    /// Dirty sequence current when this snapshot was built.
    loaded_at: i64,
    /// Scope path → role ids assigned there.
    ra: HashMap<ContextPath, Vec<i64>>,
    /// (scope path, role) → capability → explicit permission.
    /// Stored rows never carry `Inherit`.
    rdef: HashMap<(ContextPath, i64), HashMap<String, Permission>>,
}

/// Session-scoped per-subject state.
#[derive(Default)]
pub(crate) struct SessionState {
    snapshot: Option<SubjectSnapshot>,
    /// Scope path → the single role the session switched to there.
    switches: HashMap<ContextPath, i64>,
    /// Scope path → just-in-time elevated roles.
    temp_roles: HashMap<ContextPath, Vec<i64>>,
}

/// Process-local store of per-subject session state.
#[derive(Default)]
pub struct SessionStore {
    inner: Mutex<HashMap<i64, SessionState>>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session's effective roles at `path` (and below) with
    /// exactly `role`; `None` clears the switch. Drops the snapshot so
    /// the switched role's permission rows get loaded.
    pub fn set_switch(&self, subject_id: i64, path: ContextPath, role: Option<i64>) {
        let mut inner = self.inner.lock();
        let state = inner.entry(subject_id).or_default();
        match role {
            Some(role_id) => {
                state.switches.insert(path, role_id);
            }
            None => {
                state.switches.remove(&path);
            }
        }
        state.snapshot = None;
    }

    #[must_use]
    pub fn is_switched(&self, subject_id: i64, path: &ContextPath) -> bool {
        self.inner
            .lock()
            .get(&subject_id)
            .is_some_and(|state| state.switches.contains_key(path))
    }

    /// Grant `role` at `path` for this session only.
    pub fn add_temp_role(&self, subject_id: i64, path: ContextPath, role_id: i64) {
        let mut inner = self.inner.lock();
        let state = inner.entry(subject_id).or_default();
        let roles = state.temp_roles.entry(path).or_default();
        if !roles.contains(&role_id) {
            roles.push(role_id);
        }
        state.snapshot = None;
    }

    /// Remove every session-scoped role granted at `path`.
    pub fn remove_temp_roles(&self, subject_id: i64, path: &ContextPath) {
        let mut inner = self.inner.lock();
        if let Some(state) = inner.get_mut(&subject_id) {
            state.temp_roles.remove(path);
            state.snapshot = None;
        }
    }

    /// Discard one subject's snapshot (kept switches and temp roles).
    pub fn drop_snapshot(&self, subject_id: i64) {
        if let Some(state) = self.inner.lock().get_mut(&subject_id) {
            state.snapshot = None;
        }
    }

    /// Discard every snapshot; used once after a batch of assignment
    /// or override changes.
    pub fn drop_all_snapshots(&self) {
        for state in self.inner.lock().values_mut() {
            state.snapshot = None;
        }
    }

    /// Forget a subject entirely (logout).
    pub fn logout(&self, subject_id: i64) {
        self.inner.lock().remove(&subject_id);
    }

    pub fn clear_all(&self) {
        self.inner.lock().clear();
    }

    /// Role ids a session contributes beyond persistent assignments.
    fn session_role_ids(&self, subject_id: i64) -> Vec<i64> {
        let inner = self.inner.lock();
        let Some(state) = inner.get(&subject_id) else {
            return Vec::new();
        };
        let mut roles: Vec<i64> = state.switches.values().copied().collect();
        roles.extend(state.temp_roles.values().flatten().copied());
        roles.sort_unstable();
        roles.dedup();
        roles
    }
}

/// The resolution service: answers `(capability, scope, subject)`
/// questions and keeps subject snapshots coherent with the dirty-path
/// flags.
pub struct AccessService<R, A, O, P, F, D>
where
    R: ContextRepository,
    A: AssignmentRepository,
    O: OverrideRepository,
    P: CapabilityRepository,
    F: FlagRepository,
    D: ContextDirectory,
{
    db: DatabaseConnection,
    contexts: Arc<ContextService<R, A, O, F, D>>,
    assignments: Arc<A>,
    overrides: Arc<O>,
    capabilities: Arc<P>,
    dirty: Arc<DirtyTracker<F>>,
    sessions: Arc<SessionStore>,
    config: AccessConfig,
}

impl<R, A, O, P, F, D> AccessService<R, A, O, P, F, D>
where
    R: ContextRepository,
    A: AssignmentRepository,
    O: OverrideRepository,
    P: CapabilityRepository,
    F: FlagRepository,
    D: ContextDirectory,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: DatabaseConnection,
        contexts: Arc<ContextService<R, A, O, F, D>>,
        assignments: Arc<A>,
        overrides: Arc<O>,
        capabilities: Arc<P>,
        dirty: Arc<DirtyTracker<F>>,
        sessions: Arc<SessionStore>,
        config: AccessConfig,
    ) -> Self {
        Self {
            db,
            contexts,
            assignments,
            overrides,
            capabilities,
            dirty,
            sessions,
            config,
        }
    }

    pub(crate) fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub(crate) fn capability_repo(&self) -> &Arc<P> {
        &self.capabilities
    }

    pub(crate) fn override_repo(&self) -> &Arc<O> {
        &self.overrides
    }

    pub(crate) fn context_service(&self) -> &Arc<ContextService<R, A, O, F, D>> {
        &self.contexts
    }

    pub(crate) fn session_store(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Whether `subject` holds `capability` at the scope, with the
    /// elevated super-admin bypass enabled (the default).
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for an unknown scope id. An unknown
    /// capability is `Ok(false)`.
    pub async fn has_capability(
        &self,
        capability: &str,
        context_id: i64,
        subject: Subject,
    ) -> Result<bool, DomainError> {
        self.has_capability_with(capability, context_id, subject, true)
            .await
    }

    /// As [`has_capability`](Self::has_capability), with the
    /// super-admin bypass under caller control.
    ///
    /// # Errors
    ///
    /// See [`has_capability`](Self::has_capability).
    #[instrument(skip(self))]
    pub async fn has_capability_with(
        &self,
        capability: &str,
        context_id: i64,
        subject: Subject,
        do_anything: bool,
    ) -> Result<bool, DomainError> {
        let node = self.contexts.instance_by_id(context_id).await?;
        let Some(record) = self.capabilities.find_by_name(&self.db, capability).await? else {
            warn!(capability, "capability not in catalog; treating as never granted");
            return Ok(false);
        };
        let cap = record.hydrate()?;

        // Explicit bypass, not a resolved Allow.
        if let Subject::User(id) = subject {
            if do_anything && self.config.super_admins.contains(&id) {
                return Ok(true);
            }
        }

        let is_guest = match subject {
            Subject::Anonymous => true,
            Subject::User(id) => self.config.guest_subject == Some(id),
        };
        if is_guest && (cap.captype == CapType::Write || cap.risk.is_high_risk()) {
            return Ok(false);
        }

        let resolved_subject = match subject {
            Subject::User(id) => Some(id),
            Subject::Anonymous => self.config.guest_subject,
        };
        let Some(subject_id) = resolved_subject else {
            return Ok(false);
        };

        self.ensure_snapshot(subject_id, &node.path).await?;

        let inner = self.sessions.inner.lock();
        let granted = inner
            .get(&subject_id)
            .and_then(|state| {
                state
                    .snapshot
                    .as_ref()
                    .map(|snapshot| resolve(state, snapshot, &node.path, capability))
            })
            .unwrap_or(false);
        Ok(granted)
    }

    /// Subjects holding `capability` at the scope, computed from two
    /// bulk queries over the ancestor axis instead of one resolution
    /// per subject. Produces the same set `has_capability` would,
    /// ignoring session switches and temporary roles; anonymous/guest
    /// subjects are excluded.
    ///
    /// # Errors
    ///
    /// [`DomainError::NotFound`] for an unknown scope id.
    #[instrument(skip(self))]
    pub async fn users_by_capability(
        &self,
        context_id: i64,
        capability: &str,
    ) -> Result<Vec<i64>, DomainError> {
        let node = self.contexts.instance_by_id(context_id).await?;
        if self
            .capabilities
            .find_by_name(&self.db, capability)
            .await?
            .is_none()
        {
            return Ok(Vec::new());
        }
        let ancestor_ids = ContextService::<R, A, O, F, D>::ancestor_ids(&node, true);
        let assignments = self.assignments.in_contexts(&self.db, &ancestor_ids).await?;
        if assignments.is_empty() {
            return Ok(Vec::new());
        }
        let overrides = self.overrides.for_contexts(&self.db, &ancestor_ids).await?;
        let ancestor_nodes = self.contexts.nodes_by_ids(&ancestor_ids).await?;

        let mut rdef: HashMap<(ContextPath, i64), HashMap<String, Permission>> = HashMap::new();
        for record in overrides {
            let Some(ctx) = ancestor_nodes.get(&record.context_id) else {
                continue;
            };
            let Some(permission) = Permission::from_i32(record.permission) else {
                warn!(
                    context = record.context_id,
                    role = record.role_id,
                    value = record.permission,
                    "skipping override with unknown permission value"
                );
                continue;
            };
            rdef.entry((ctx.path.clone(), record.role_id))
                .or_default()
                .insert(record.capability, permission);
        }

        let mut roles_by_subject: HashMap<i64, Vec<i64>> = HashMap::new();
        for assignment in &assignments {
            if self.config.guest_subject == Some(assignment.subject_id) {
                continue;
            }
            let roles = roles_by_subject.entry(assignment.subject_id).or_default();
            if !roles.contains(&assignment.role_id) {
                roles.push(assignment.role_id);
            }
        }

        let mut granted = Vec::with_capacity(roles_by_subject.len());
        for (subject_id, roles) in &roles_by_subject {
            let passes = self.config.super_admins.contains(subject_id)
                || aggregate(
                    roles
                        .iter()
                        .map(|role| resolve_role(&rdef, &node.path, *role, capability)),
                );
            if passes {
                granted.push(*subject_id);
            }
        }
        granted.sort_unstable();
        Ok(granted)
    }

    /// Forget a subject's session (snapshot, switches, temp roles).
    pub fn logout(&self, subject_id: i64) {
        self.sessions.logout(subject_id);
    }

    /// Drop every subject snapshot; call once after a batch of
    /// assignment or override changes.
    pub fn invalidate_subject_snapshots(&self) {
        self.sessions.drop_all_snapshots();
    }

    /// Drop every in-process cache: context cache and session state.
    pub fn reset_all_caches(&self) {
        self.contexts.reset_caches();
        self.sessions.clear_all();
    }

    /// Make sure the subject's snapshot exists and is not stale with
    /// respect to the shared dirty flags; rebuild it wholesale if it
    /// is. A dirty mark at any ancestor of `leaf` invalidates, by
    /// prefix match.
    async fn ensure_snapshot(
        &self,
        subject_id: i64,
        leaf: &ContextPath,
    ) -> Result<(), DomainError> {
        self.dirty.load(&self.db).await?;
        let stale = {
            let inner = self.sessions.inner.lock();
            match inner.get(&subject_id).and_then(|s| s.snapshot.as_ref()) {
                Some(snapshot) => self.dirty.is_dirty_since(leaf, snapshot.loaded_at),
                None => true,
            }
        };
        if !stale {
            return Ok(());
        }
        let snapshot = self.build_snapshot(subject_id).await?;
        self.sessions
            .inner
            .lock()
            .entry(subject_id)
            .or_default()
            .snapshot = Some(snapshot);
        Ok(())
    }

    async fn build_snapshot(&self, subject_id: i64) -> Result<SubjectSnapshot, DomainError> {
        // Sequence first: anything marked dirty after this point will
        // invalidate the snapshot, never slip past it.
        let loaded_at = self.dirty.current(&self.db).await?;
        let assignments = self.assignments.for_subject(&self.db, subject_id).await?;

        let mut role_ids: Vec<i64> = assignments.iter().map(|a| a.role_id).collect();
        role_ids.extend(self.sessions.session_role_ids(subject_id));
        role_ids.sort_unstable();
        role_ids.dedup();

        let assignment_ctx_ids: Vec<i64> = assignments.iter().map(|a| a.context_id).collect();
        let assignment_nodes = self.contexts.nodes_by_ids(&assignment_ctx_ids).await?;

        let mut ra: HashMap<ContextPath, Vec<i64>> = HashMap::new();
        for assignment in &assignments {
            let Some(ctx) = assignment_nodes.get(&assignment.context_id) else {
                warn!(
                    context = assignment.context_id,
                    "assignment references a context pending rebuild; ignored until rebuilt"
                );
                continue;
            };
            let roles = ra.entry(ctx.path.clone()).or_default();
            if !roles.contains(&assignment.role_id) {
                roles.push(assignment.role_id);
            }
        }

        let mut rdef: HashMap<(ContextPath, i64), HashMap<String, Permission>> = HashMap::new();
        if !role_ids.is_empty() {
            let overrides = self.overrides.for_roles(&self.db, &role_ids).await?;
            let override_ctx_ids: Vec<i64> = overrides.iter().map(|o| o.context_id).collect();
            let override_nodes = self.contexts.nodes_by_ids(&override_ctx_ids).await?;
            for record in overrides {
                let Some(ctx) = override_nodes.get(&record.context_id) else {
                    continue;
                };
                let Some(permission) = Permission::from_i32(record.permission) else {
                    warn!(
                        context = record.context_id,
                        role = record.role_id,
                        value = record.permission,
                        "skipping override with unknown permission value"
                    );
                    continue;
                };
                rdef.entry((ctx.path.clone(), record.role_id))
                    .or_default()
                    .insert(record.capability, permission);
            }
        }

        Ok(SubjectSnapshot {
            loaded_at,
            ra,
            rdef,
        })
    }
}

/// Roles effective for the subject at `leaf`: the deepest applicable
/// role switch masks everything; otherwise assignments and temporary
/// roles at `leaf` or any ancestor apply.
fn effective_roles(state: &SessionState, snapshot: &SubjectSnapshot, leaf: &ContextPath) -> Vec<i64> {
    let switched = state
        .switches
        .iter()
        .filter(|(path, _)| path.is_or_contains(leaf))
        .max_by_key(|(path, _)| path.depth())
        .map(|(_, role)| *role);
    if let Some(role) = switched {
        return vec![role];
    }
    let mut roles = Vec::new();
    for (path, assigned) in &snapshot.ra {
        if path.is_or_contains(leaf) {
            for role in assigned {
                if !roles.contains(role) {
                    roles.push(*role);
                }
            }
        }
    }
    for (path, elevated) in &state.temp_roles {
        if path.is_or_contains(leaf) {
            for role in elevated {
                if !roles.contains(role) {
                    roles.push(*role);
                }
            }
        }
    }
    roles
}

/// Closest-scope explicit value for one role along the leaf's path;
/// `Inherit` when the role has no explicit row anywhere on it.
fn resolve_role(
    rdef: &HashMap<(ContextPath, i64), HashMap<String, Permission>>,
    leaf: &ContextPath,
    role: i64,
    capability: &str,
) -> Permission {
    for n in (1..=leaf.segments().len()).rev() {
        let prefix = leaf.prefix(n);
        if let Some(caps) = rdef.get(&(prefix, role)) {
            if let Some(permission) = caps.get(capability) {
                return *permission;
            }
        }
    }
    Permission::Inherit
}

/// Aggregate per-role resolutions: any `Prohibit` is absolute, else
/// any `Allow` grants, else deny.
fn aggregate(permissions: impl Iterator<Item = Permission>) -> bool {
    let mut allowed = false;
    for permission in permissions {
        match permission {
            Permission::Prohibit => return false,
            Permission::Allow => allowed = true,
            Permission::Prevent | Permission::Inherit => {}
        }
    }
    allowed
}

fn resolve(
    state: &SessionState,
    snapshot: &SubjectSnapshot,
    leaf: &ContextPath,
    capability: &str,
) -> bool {
    let roles = effective_roles(state, snapshot, leaf);
    if roles.is_empty() {
        return false;
    }
    aggregate(
        roles
            .iter()
            .map(|role| resolve_role(&snapshot.rdef, leaf, *role, capability)),
    )
}
