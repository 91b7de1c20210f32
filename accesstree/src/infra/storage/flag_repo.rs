use async_trait::async_trait;
use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::domain::error::DomainError;
use crate::domain::repo::{FlagRecord, FlagRepository};

use super::entity::cache_flag::{ActiveModel, Column, Entity as FlagEntity};

/// ORM-based implementation of the [`FlagRepository`] trait.
///
/// Sequence numbers are allocated as `max(value) + 1` over the flag
/// type, inside whatever transaction the caller passes. The shared
/// store orders marks, not local clocks.
#[derive(Clone, Default)]
pub struct SeaOrmFlagRepository;

impl SeaOrmFlagRepository {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl FlagRepository for SeaOrmFlagRepository {
    async fn mark<C: ConnectionTrait>(
        &self,
        conn: &C,
        flagtype: &str,
        name: &str,
    ) -> Result<i64, DomainError> {
        let rows = FlagEntity::find()
            .filter(Column::Flagtype.eq(flagtype))
            .all(conn)
            .await?;
        let next = rows.iter().map(|row| row.value).max().unwrap_or(0) + 1;
        if let Some(existing) = rows.iter().find(|row| row.name == name) {
            FlagEntity::update_many()
                .col_expr(Column::Value, Expr::value(next))
                .col_expr(Column::Timemodified, Expr::value(Utc::now()))
                .filter(Column::Id.eq(existing.id))
                .exec(conn)
                .await?;
        } else {
            let model = ActiveModel {
                flagtype: ActiveValue::Set(flagtype.to_owned()),
                name: ActiveValue::Set(name.to_owned()),
                value: ActiveValue::Set(next),
                timemodified: ActiveValue::Set(Utc::now()),
                ..Default::default()
            };
            FlagEntity::insert(model).exec(conn).await?;
        }
        Ok(next)
    }

    async fn all<C: ConnectionTrait>(
        &self,
        conn: &C,
        flagtype: &str,
    ) -> Result<Vec<FlagRecord>, DomainError> {
        let rows = FlagEntity::find()
            .filter(Column::Flagtype.eq(flagtype))
            .all(conn)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| FlagRecord {
                name: row.name,
                value: row.value,
            })
            .collect())
    }

    async fn current<C: ConnectionTrait>(
        &self,
        conn: &C,
        flagtype: &str,
    ) -> Result<i64, DomainError> {
        let rows = FlagEntity::find()
            .filter(Column::Flagtype.eq(flagtype))
            .all(conn)
            .await?;
        Ok(rows.iter().map(|row| row.value).max().unwrap_or(0))
    }

    async fn clear<C: ConnectionTrait>(
        &self,
        conn: &C,
        flagtype: &str,
    ) -> Result<u64, DomainError> {
        let result = FlagEntity::delete_many()
            .filter(Column::Flagtype.eq(flagtype))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
