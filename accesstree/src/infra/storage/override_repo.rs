use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::domain::error::DomainError;
use crate::domain::repo::{OverrideRecord, OverrideRepository};

use super::entity::role_capability::{ActiveModel, Column, Entity as OverrideEntity, Model};

/// ORM-based implementation of the [`OverrideRepository`] trait.
#[derive(Clone, Default)]
pub struct SeaOrmOverrideRepository;

impl SeaOrmOverrideRepository {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn to_record(model: Model) -> OverrideRecord {
    OverrideRecord {
        context_id: model.contextid,
        role_id: model.roleid,
        capability: model.capability,
        permission: model.permission,
    }
}

#[async_trait]
impl OverrideRepository for SeaOrmOverrideRepository {
    async fn upsert<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_id: i64,
        role_id: i64,
        capability: &str,
        permission: i32,
    ) -> Result<(), DomainError> {
        let existing = OverrideEntity::find()
            .filter(Column::Contextid.eq(context_id))
            .filter(Column::Roleid.eq(role_id))
            .filter(Column::Capability.eq(capability))
            .one(conn)
            .await?;
        if let Some(row) = existing {
            OverrideEntity::update_many()
                .col_expr(Column::Permission, Expr::value(permission))
                .col_expr(Column::Timemodified, Expr::value(Utc::now()))
                .filter(Column::Id.eq(row.id))
                .exec(conn)
                .await?;
        } else {
            let model = ActiveModel {
                contextid: ActiveValue::Set(context_id),
                roleid: ActiveValue::Set(role_id),
                capability: ActiveValue::Set(capability.to_owned()),
                permission: ActiveValue::Set(permission),
                timemodified: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            OverrideEntity::insert(model).exec(conn).await?;
        }
        Ok(())
    }

    async fn remove<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_id: i64,
        role_id: i64,
        capability: &str,
    ) -> Result<u64, DomainError> {
        let result = OverrideEntity::delete_many()
            .filter(Column::Contextid.eq(context_id))
            .filter(Column::Roleid.eq(role_id))
            .filter(Column::Capability.eq(capability))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn for_roles<C: ConnectionTrait>(
        &self,
        conn: &C,
        role_ids: &[i64],
    ) -> Result<Vec<OverrideRecord>, DomainError> {
        if role_ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = OverrideEntity::find()
            .filter(Column::Roleid.is_in(role_ids.iter().copied()))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn for_contexts<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<Vec<OverrideRecord>, DomainError> {
        if context_ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = OverrideEntity::find()
            .filter(Column::Contextid.is_in(context_ids.iter().copied()))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn remove_by_context_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<u64, DomainError> {
        if context_ids.is_empty() {
            return Ok(0);
        }
        let result = OverrideEntity::delete_many()
            .filter(Column::Contextid.is_in(context_ids.iter().copied()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn rename_capability<C: ConnectionTrait>(
        &self,
        conn: &C,
        old_name: &str,
        new_name: &str,
    ) -> Result<u64, DomainError> {
        let result = OverrideEntity::update_many()
            .col_expr(Column::Capability, Expr::value(new_name.to_owned()))
            .filter(Column::Capability.eq(old_name))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn remove_capability<C: ConnectionTrait>(
        &self,
        conn: &C,
        capability: &str,
    ) -> Result<u64, DomainError> {
        let result = OverrideEntity::delete_many()
            .filter(Column::Capability.eq(capability))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
