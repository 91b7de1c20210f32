//! Engine assembly: wires the domain services to the SeaORM storage
//! layer and the caller-supplied [`ContextDirectory`].

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AccessConfig;
use crate::domain::cache::ContextCache;
use crate::domain::directory::ContextDirectory;
use crate::domain::dirty::DirtyTracker;
use crate::domain::resolver::{AccessService, SessionStore};
use crate::domain::roles::RoleService;
use crate::domain::tree::ContextService;
use crate::infra::storage::assignment_repo::SeaOrmAssignmentRepository;
use crate::infra::storage::capability_repo::SeaOrmCapabilityRepository;
use crate::infra::storage::context_repo::SeaOrmContextRepository;
use crate::infra::storage::flag_repo::SeaOrmFlagRepository;
use crate::infra::storage::override_repo::SeaOrmOverrideRepository;

/// Context service over the SeaORM repositories.
pub type EngineContextService<D> = ContextService<
    SeaOrmContextRepository,
    SeaOrmAssignmentRepository,
    SeaOrmOverrideRepository,
    SeaOrmFlagRepository,
    D,
>;

/// Role service over the SeaORM repositories.
pub type EngineRoleService = RoleService<SeaOrmAssignmentRepository, SeaOrmOverrideRepository>;

/// Resolution service over the SeaORM repositories.
pub type EngineAccessService<D> = AccessService<
    SeaOrmContextRepository,
    SeaOrmAssignmentRepository,
    SeaOrmOverrideRepository,
    SeaOrmCapabilityRepository,
    SeaOrmFlagRepository,
    D,
>;

/// The fully wired engine. One instance per process; the services
/// share the context cache, the dirty tracker and the session store.
pub struct AccessEngine<D: ContextDirectory> {
    contexts: Arc<EngineContextService<D>>,
    roles: Arc<EngineRoleService>,
    access: Arc<EngineAccessService<D>>,
}

impl<D: ContextDirectory> AccessEngine<D> {
    #[must_use]
    pub fn new(db: DatabaseConnection, directory: Arc<D>, config: AccessConfig) -> Self {
        let context_repo = Arc::new(SeaOrmContextRepository::new());
        let assignment_repo = Arc::new(SeaOrmAssignmentRepository::new());
        let override_repo = Arc::new(SeaOrmOverrideRepository::new());
        let capability_repo = Arc::new(SeaOrmCapabilityRepository::new());
        let flag_repo = Arc::new(SeaOrmFlagRepository::new());

        let cache = Arc::new(ContextCache::new(config.cache_capacity));
        let dirty = Arc::new(DirtyTracker::new(flag_repo));
        let sessions = Arc::new(SessionStore::new());

        let contexts = Arc::new(ContextService::new(
            db.clone(),
            context_repo,
            Arc::clone(&assignment_repo),
            Arc::clone(&override_repo),
            cache,
            Arc::clone(&dirty),
            directory,
        ));
        let roles = Arc::new(RoleService::new(
            db.clone(),
            Arc::clone(&assignment_repo),
            Arc::clone(&override_repo),
            Arc::clone(&sessions),
        ));
        let access = Arc::new(AccessService::new(
            db,
            Arc::clone(&contexts),
            assignment_repo,
            override_repo,
            capability_repo,
            dirty,
            sessions,
            config,
        ));

        Self {
            contexts,
            roles,
            access,
        }
    }

    #[must_use]
    pub fn contexts(&self) -> &Arc<EngineContextService<D>> {
        &self.contexts
    }

    #[must_use]
    pub fn roles(&self) -> &Arc<EngineRoleService> {
        &self.roles
    }

    #[must_use]
    pub fn access(&self) -> &Arc<EngineAccessService<D>> {
        &self.access
    }
}
