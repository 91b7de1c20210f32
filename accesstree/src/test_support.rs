//! Shared helpers for the service test suites.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;

use accesstree_sdk::models::ContextLevel;

use crate::config::AccessConfig;
use crate::domain::directory::ContextDirectory;
use crate::domain::error::DomainError;
use crate::engine::AccessEngine;
use crate::infra::storage::migrations::Migrator;

/// In-memory SQLite with migrations applied. A single pooled
/// connection keeps the whole test on one database.
pub async fn inmem_db() -> DatabaseConnection {
    let mut opts = ConnectOptions::new("sqlite::memory:");
    opts.max_connections(1).min_connections(1);
    let db = Database::connect(opts)
        .await
        .expect("failed to connect to in-memory database");
    Migrator::up(&db, None)
        .await
        .expect("failed to run migrations");
    db
}

/// Static in-memory directory: tests register instances and their
/// parent links up front.
#[derive(Default)]
pub struct StaticDirectory {
    inner: Mutex<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    parents: HashMap<(ContextLevel, i64), (ContextLevel, i64)>,
    existing: HashSet<(ContextLevel, i64)>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an instance living directly under the system context.
    pub fn add_root(&self, level: ContextLevel, instance_id: i64) {
        self.inner.lock().existing.insert((level, instance_id));
    }

    /// Register an instance under the given parent instance.
    pub fn add_child(
        &self,
        level: ContextLevel,
        instance_id: i64,
        parent: (ContextLevel, i64),
    ) {
        let mut inner = self.inner.lock();
        inner.existing.insert((level, instance_id));
        inner.parents.insert((level, instance_id), parent);
    }

    /// Forget an instance, as if the underlying entity was deleted.
    pub fn remove(&self, level: ContextLevel, instance_id: i64) {
        let mut inner = self.inner.lock();
        inner.existing.remove(&(level, instance_id));
        inner.parents.remove(&(level, instance_id));
    }
}

#[async_trait]
impl ContextDirectory for StaticDirectory {
    async fn parent_of(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Result<Option<(ContextLevel, i64)>, DomainError> {
        Ok(self.inner.lock().parents.get(&(level, instance_id)).copied())
    }

    async fn exists(&self, level: ContextLevel, instance_id: i64) -> Result<bool, DomainError> {
        Ok(self.inner.lock().existing.contains(&(level, instance_id)))
    }
}

/// Fully wired engine over in-memory SQLite.
pub async fn build_engine(
    config: AccessConfig,
) -> (
    AccessEngine<StaticDirectory>,
    Arc<StaticDirectory>,
    DatabaseConnection,
) {
    let db = inmem_db().await;
    let directory = Arc::new(StaticDirectory::new());
    let engine = AccessEngine::new(db.clone(), Arc::clone(&directory), config);
    (engine, directory, db)
}
