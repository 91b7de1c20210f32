//! Capability catalog sync.
//!
//! Components declare their capabilities; sync reconciles the stored
//! catalog with the declarations. Role/permission rows are keyed by
//! capability name and must survive the sync, including renames
//! declared through [`CapabilityDef::replaces`]. One broken definition
//! must not take the whole batch down: per-item failures are logged
//! and reported, and the rest of the batch proceeds.

use std::collections::HashSet;

use sea_orm::{ConnectionTrait, TransactionTrait};
use tracing::{info, instrument, warn};

use accesstree_sdk::models::{CapabilityDef, CatalogSyncReport};

use super::directory::ContextDirectory;
use super::error::DomainError;
use super::repo::{
    AssignmentRepository, CapabilityRecord, CapabilityRepository, ContextRepository,
    FlagRepository, OverrideRepository,
};
use super::resolver::AccessService;

enum SyncOutcome {
    Installed,
    Updated,
    Unchanged,
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
    /// Reconcile the stored catalog of `component` with `defs`.
    ///
    /// Declarations absent from the store are installed; changed ones
    /// updated in place; stored rows the component no longer declares
    /// are pruned together with their override rows. A declaration
    /// whose name is new but names a `replaces` predecessor renames
    /// the stored row and migrates its overrides.
    ///
    /// # Errors
    ///
    /// Batch-level storage failures. Individual definition failures
    /// are reported through [`CatalogSyncReport::failed`] instead.
    #[instrument(skip(self, defs), fields(count = defs.len()))]
    pub async fn update_capabilities(
        &self,
        component: &str,
        defs: &[CapabilityDef],
    ) -> Result<CatalogSyncReport, DomainError> {
        let txn = self.db().begin().await?;
        let existing = self
            .capability_repo()
            .list_by_component(&txn, component)
            .await?;

        let mut report = CatalogSyncReport::default();
        let mut keep: HashSet<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        keep.extend(defs.iter().filter_map(|d| d.replaces.as_deref()));

        for def in defs {
            match self.sync_one(&txn, component, def, &existing).await {
                Ok(SyncOutcome::Installed) => report.installed += 1,
                Ok(SyncOutcome::Updated) => report.updated += 1,
                Ok(SyncOutcome::Unchanged) => {}
                Err(e) => {
                    warn!(capability = %def.name, error = %e, "capability sync failed; continuing");
                    report.failed.push(def.name.clone());
                }
            }
        }

        for stale in existing
            .iter()
            .filter(|record| !keep.contains(record.name.as_str()))
        {
            self.override_repo()
                .remove_capability(&txn, &stale.name)
                .await?;
            self.capability_repo().remove(&txn, &stale.name).await?;
            report.removed += 1;
        }

        txn.commit().await?;

        // Resolution results may have changed shape; start fresh.
        self.session_store().drop_all_snapshots();
        self.context_service().reset_caches();

        info!(
            component,
            installed = report.installed,
            updated = report.updated,
            removed = report.removed,
            failed = report.failed.len(),
            "synced capability catalog"
        );
        Ok(report)
    }

    async fn sync_one<C: ConnectionTrait>(
        &self,
        conn: &C,
        component: &str,
        def: &CapabilityDef,
        existing: &[CapabilityRecord],
    ) -> Result<SyncOutcome, DomainError> {
        let level = def.context_level.as_i16();
        let captype = def.captype.as_str();
        let risk = i64::from(def.risk.0);

        if let Some(current) = existing.iter().find(|record| record.name == def.name) {
            if current.captype == captype && current.context_level == level && current.risk == risk
            {
                return Ok(SyncOutcome::Unchanged);
            }
            self.capability_repo()
                .update(conn, &def.name, &def.name, captype, level, component, risk)
                .await?;
            return Ok(SyncOutcome::Updated);
        }

        if let Some(old_name) = &def.replaces {
            if self
                .capability_repo()
                .find_by_name(conn, old_name)
                .await?
                .is_some()
            {
                self.capability_repo()
                    .update(conn, old_name, &def.name, captype, level, component, risk)
                    .await?;
                let moved = self
                    .override_repo()
                    .rename_capability(conn, old_name, &def.name)
                    .await?;
                info!(from = %old_name, to = %def.name, moved, "renamed capability");
                return Ok(SyncOutcome::Updated);
            }
        }

        self.capability_repo()
            .insert(conn, &def.name, captype, level, component, risk)
            .await?;
        Ok(SyncOutcome::Installed)
    }
}
