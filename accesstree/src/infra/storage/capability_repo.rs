use async_trait::async_trait;
use sea_orm::sea_query::Expr;
use sea_orm::{ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};

use crate::domain::error::DomainError;
use crate::domain::repo::{CapabilityRecord, CapabilityRepository};

use super::entity::capability::{ActiveModel, Column, Entity as CapabilityEntity, Model};

/// ORM-based implementation of the [`CapabilityRepository`] trait.
#[derive(Clone, Default)]
pub struct SeaOrmCapabilityRepository;

impl SeaOrmCapabilityRepository {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn to_record(model: Model) -> CapabilityRecord {
    CapabilityRecord {
        id: model.id,
        name: model.name,
        captype: model.captype,
        context_level: model.contextlevel,
        component: model.component,
        risk: model.riskbitmask,
    }
}

#[async_trait]
impl CapabilityRepository for SeaOrmCapabilityRepository {
    async fn find_by_name<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
    ) -> Result<Option<CapabilityRecord>, DomainError> {
        let found = CapabilityEntity::find()
            .filter(Column::Name.eq(name))
            .one(conn)
            .await?;
        Ok(found.map(to_record))
    }

    async fn list_by_component<C: ConnectionTrait>(
        &self,
        conn: &C,
        component: &str,
    ) -> Result<Vec<CapabilityRecord>, DomainError> {
        let found = CapabilityEntity::find()
            .filter(Column::Component.eq(component))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn insert<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        captype: &str,
        context_level: i16,
        component: &str,
        risk: i64,
    ) -> Result<(), DomainError> {
        let model = ActiveModel {
            name: ActiveValue::Set(name.to_owned()),
            captype: ActiveValue::Set(captype.to_owned()),
            contextlevel: ActiveValue::Set(context_level),
            component: ActiveValue::Set(component.to_owned()),
            riskbitmask: ActiveValue::Set(risk),
            ..Default::default()
        };
        CapabilityEntity::insert(model).exec(conn).await?;
        Ok(())
    }

    async fn update<C: ConnectionTrait>(
        &self,
        conn: &C,
        name: &str,
        new_name: &str,
        captype: &str,
        context_level: i16,
        component: &str,
        risk: i64,
    ) -> Result<(), DomainError> {
        CapabilityEntity::update_many()
            .col_expr(Column::Name, Expr::value(new_name.to_owned()))
            .col_expr(Column::Captype, Expr::value(captype.to_owned()))
            .col_expr(Column::Contextlevel, Expr::value(context_level))
            .col_expr(Column::Component, Expr::value(component.to_owned()))
            .col_expr(Column::Riskbitmask, Expr::value(risk))
            .filter(Column::Name.eq(name))
            .exec(conn)
            .await?;
        Ok(())
    }

    async fn remove<C: ConnectionTrait>(&self, conn: &C, name: &str) -> Result<u64, DomainError> {
        let result = CapabilityEntity::delete_many()
            .filter(Column::Name.eq(name))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}
