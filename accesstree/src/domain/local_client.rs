//! In-process implementation of the SDK client trait.

use std::sync::Arc;

use async_trait::async_trait;

use accesstree_sdk::models::{
    CapabilityDef, CatalogSyncReport, ContextLevel, ContextNode, Permission, Subject,
};
use accesstree_sdk::{AccessError, AccessTreeClientV1};

use crate::engine::AccessEngine;

use super::directory::ContextDirectory;

/// Thin adapter exposing the engine through [`AccessTreeClientV1`].
pub struct LocalClient<D: ContextDirectory + 'static> {
    engine: Arc<AccessEngine<D>>,
}

impl<D: ContextDirectory + 'static> LocalClient<D> {
    pub fn new(engine: Arc<AccessEngine<D>>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl<D: ContextDirectory + 'static> AccessTreeClientV1 for LocalClient<D> {
    async fn has_capability(
        &self,
        capability: &str,
        context_id: i64,
        subject: Subject,
    ) -> Result<bool, AccessError> {
        self.engine
            .access()
            .has_capability(capability, context_id, subject)
            .await
            .map_err(Into::into)
    }

    async fn users_by_capability(
        &self,
        context_id: i64,
        capability: &str,
    ) -> Result<Vec<i64>, AccessError> {
        self.engine
            .access()
            .users_by_capability(context_id, capability)
            .await
            .map_err(Into::into)
    }

    async fn context(
        &self,
        level: ContextLevel,
        instance_id: i64,
    ) -> Result<ContextNode, AccessError> {
        let node = self
            .engine
            .contexts()
            .instance(level, instance_id, true)
            .await?;
        Ok((*node).clone())
    }

    async fn move_context(&self, context_id: i64, new_parent_id: i64) -> Result<(), AccessError> {
        self.engine
            .contexts()
            .move_context(context_id, new_parent_id)
            .await
            .map_err(Into::into)
    }

    async fn delete_context(&self, context_id: i64) -> Result<(), AccessError> {
        self.engine
            .contexts()
            .delete_context(context_id)
            .await
            .map_err(Into::into)
    }

    async fn assign_role(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<(), AccessError> {
        self.engine
            .roles()
            .assign(role_id, subject_id, context_id)
            .await
            .map_err(Into::into)
    }

    async fn unassign_role(
        &self,
        role_id: i64,
        subject_id: i64,
        context_id: i64,
    ) -> Result<(), AccessError> {
        self.engine
            .roles()
            .unassign(role_id, subject_id, context_id)
            .await
            .map_err(Into::into)
    }

    async fn set_override(
        &self,
        capability: &str,
        role_id: i64,
        context_id: i64,
        permission: Permission,
    ) -> Result<(), AccessError> {
        self.engine
            .roles()
            .set_override(capability, role_id, context_id, permission)
            .await
            .map_err(Into::into)
    }

    async fn update_capabilities(
        &self,
        component: &str,
        defs: Vec<CapabilityDef>,
    ) -> Result<CatalogSyncReport, AccessError> {
        self.engine
            .access()
            .update_capabilities(component, &defs)
            .await
            .map_err(Into::into)
    }

    async fn reset_caches(&self) -> Result<(), AccessError> {
        self.engine.access().reset_all_caches();
        Ok(())
    }
}
