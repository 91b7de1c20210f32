use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::domain::error::DomainError;
use crate::domain::repo::{ContextRecord, ContextRepository};

use super::entity::context::{ActiveModel, Column, Entity as ContextEntity, Model};

/// ORM-based implementation of the [`ContextRepository`] trait.
#[derive(Clone, Default)]
pub struct SeaOrmContextRepository;

impl SeaOrmContextRepository {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn to_record(model: Model) -> ContextRecord {
    ContextRecord {
        id: model.id,
        level: model.contextlevel,
        instance_id: model.instanceid,
        path: model.path,
        depth: model.depth,
    }
}

/// Rows whose path equals `path` or lives under it.
fn subtree_condition(path: &str) -> sea_orm::sea_query::SimpleExpr {
    Column::Path
        .eq(path)
        .or(Column::Path.like(format!("{path}/%")))
}

#[async_trait]
impl ContextRepository for SeaOrmContextRepository {
    async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: i16,
        instance_id: i64,
    ) -> Result<i64, DomainError> {
        let model = ActiveModel {
            contextlevel: ActiveValue::Set(level),
            instanceid: ActiveValue::Set(instance_id),
            path: ActiveValue::Set(None),
            depth: ActiveValue::Set(0),
            ..Default::default()
        };
        let result = ContextEntity::insert(model).exec(conn).await?;
        Ok(result.last_insert_id)
    }

    async fn find_by_id<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
    ) -> Result<Option<ContextRecord>, DomainError> {
        let found = ContextEntity::find_by_id(id).one(conn).await?;
        Ok(found.map(to_record))
    }

    async fn find_by_instance<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: i16,
        instance_id: i64,
    ) -> Result<Option<ContextRecord>, DomainError> {
        let found = ContextEntity::find()
            .filter(Column::Contextlevel.eq(level))
            .filter(Column::Instanceid.eq(instance_id))
            .one(conn)
            .await?;
        Ok(found.map(to_record))
    }

    async fn find_by_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i64],
    ) -> Result<Vec<ContextRecord>, DomainError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = ContextEntity::find()
            .filter(Column::Id.is_in(ids.iter().copied()))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn all<C: ConnectionTrait>(&self, conn: &C) -> Result<Vec<ContextRecord>, DomainError> {
        let found = ContextEntity::find().all(conn).await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn list_by_level<C: ConnectionTrait>(
        &self,
        conn: &C,
        level: i16,
    ) -> Result<Vec<ContextRecord>, DomainError> {
        let found = ContextEntity::find()
            .filter(Column::Contextlevel.eq(level))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn set_path<C: ConnectionTrait>(
        &self,
        conn: &C,
        id: i64,
        path: &str,
        depth: i32,
    ) -> Result<(), DomainError> {
        ContextEntity::update_many()
            .col_expr(Column::Path, Expr::value(path.to_owned()))
            .col_expr(Column::Depth, Expr::value(depth))
            .filter(Column::Id.eq(id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn clear_path<C: ConnectionTrait>(&self, conn: &C, id: i64) -> Result<(), DomainError> {
        ContextEntity::update_many()
            .col_expr(Column::Path, Expr::value(Option::<String>::None))
            .col_expr(Column::Depth, Expr::value(0))
            .filter(Column::Id.eq(id))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn clear_paths_under<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &str,
    ) -> Result<u64, DomainError> {
        let result = ContextEntity::update_many()
            .col_expr(Column::Path, Expr::value(Option::<String>::None))
            .col_expr(Column::Depth, Expr::value(0))
            .filter(Column::Path.like(format!("{path}/%")))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn descendants<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &str,
    ) -> Result<Vec<ContextRecord>, DomainError> {
        let found = ContextEntity::find()
            .filter(Column::Path.like(format!("{path}/%")))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn move_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        old_path: &str,
        new_path: &str,
        depth_delta: i32,
    ) -> Result<u64, DomainError> {
        // Single-pass prefix replace; the WHERE clause pins the match to
        // the subtree, and path segments are unique along any one path,
        // so REPLACE cannot fire twice within a selected row.
        let result = ContextEntity::update_many()
            .col_expr(Column::Depth, Expr::col(Column::Depth).add(depth_delta))
            .col_expr(
                Column::Path,
                Expr::cust_with_values("REPLACE(path, ?, ?)", [old_path, new_path]),
            )
            .filter(subtree_condition(old_path))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn delete_subtree<C: ConnectionTrait>(
        &self,
        conn: &C,
        path: &str,
    ) -> Result<Vec<i64>, DomainError> {
        let rows = ContextEntity::find()
            .filter(subtree_condition(path))
            .all(conn)
            .await?;
        let ids: Vec<i64> = rows.into_iter().map(|row| row.id).collect();
        ContextEntity::delete_many()
            .filter(subtree_condition(path))
            .exec(conn)
            .await?;
        Ok(ids)
    }

    async fn delete_by_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        ids: &[i64],
    ) -> Result<u64, DomainError> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = ContextEntity::delete_many()
            .filter(Column::Id.is_in(ids.iter().copied()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
