use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveValue, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
};

use crate::domain::error::DomainError;
use crate::domain::repo::{
    AssignmentFilter, AssignmentRecord, AssignmentRepository, NewAssignment,
};

use super::entity::role_assignment::{ActiveModel, Column, Entity as AssignmentEntity, Model};

/// ORM-based implementation of the [`AssignmentRepository`] trait.
#[derive(Clone, Default)]
pub struct SeaOrmAssignmentRepository;

impl SeaOrmAssignmentRepository {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn to_record(model: Model) -> AssignmentRecord {
    AssignmentRecord {
        id: model.id,
        role_id: model.roleid,
        subject_id: model.subjectid,
        context_id: model.contextid,
        component: model.component,
        item_id: model.itemid,
    }
}

fn triple_condition(assignment: &NewAssignment) -> Condition {
    Condition::all()
        .add(Column::Roleid.eq(assignment.role_id))
        .add(Column::Subjectid.eq(assignment.subject_id))
        .add(Column::Contextid.eq(assignment.context_id))
        .add(Column::Component.eq(assignment.component.clone()))
        .add(Column::Itemid.eq(assignment.item_id))
}

#[async_trait]
impl AssignmentRepository for SeaOrmAssignmentRepository {
    async fn insert_if_absent<C: ConnectionTrait>(
        &self,
        conn: &C,
        assignment: &NewAssignment,
    ) -> Result<bool, DomainError> {
        let existing = AssignmentEntity::find()
            .filter(triple_condition(assignment))
            .one(conn)
            .await?;
        if existing.is_some() {
            return Ok(false);
        }
        let model = ActiveModel {
            roleid: ActiveValue::Set(assignment.role_id),
            subjectid: ActiveValue::Set(assignment.subject_id),
            contextid: ActiveValue::Set(assignment.context_id),
            component: ActiveValue::Set(assignment.component.clone()),
            itemid: ActiveValue::Set(assignment.item_id),
            timemodified: ActiveValue::Set(Utc::now()),
            ..Default::default()
        };
        AssignmentEntity::insert(model).exec(conn).await?;
        Ok(true)
    }

    async fn remove<C: ConnectionTrait>(
        &self,
        conn: &C,
        assignment: &NewAssignment,
    ) -> Result<u64, DomainError> {
        let result = AssignmentEntity::delete_many()
            .filter(triple_condition(assignment))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn remove_matching<C: ConnectionTrait>(
        &self,
        conn: &C,
        filter: &AssignmentFilter,
    ) -> Result<u64, DomainError> {
        let mut condition = Condition::all();
        if let Some(role_id) = filter.role_id {
            condition = condition.add(Column::Roleid.eq(role_id));
        }
        if let Some(subject_id) = filter.subject_id {
            condition = condition.add(Column::Subjectid.eq(subject_id));
        }
        if let Some(context_id) = filter.context_id {
            condition = condition.add(Column::Contextid.eq(context_id));
        }
        if let Some(component) = &filter.component {
            condition = condition.add(Column::Component.eq(component.clone()));
        }
        let result = AssignmentEntity::delete_many()
            .filter(condition)
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn remove_by_context_ids<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<u64, DomainError> {
        if context_ids.is_empty() {
            return Ok(0);
        }
        let result = AssignmentEntity::delete_many()
            .filter(Column::Contextid.is_in(context_ids.iter().copied()))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    async fn for_subject<C: ConnectionTrait>(
        &self,
        conn: &C,
        subject_id: i64,
    ) -> Result<Vec<AssignmentRecord>, DomainError> {
        let found = AssignmentEntity::find()
            .filter(Column::Subjectid.eq(subject_id))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }

    async fn in_contexts<C: ConnectionTrait>(
        &self,
        conn: &C,
        context_ids: &[i64],
    ) -> Result<Vec<AssignmentRecord>, DomainError> {
        if context_ids.is_empty() {
            return Ok(Vec::new());
        }
        let found = AssignmentEntity::find()
            .filter(Column::Contextid.is_in(context_ids.iter().copied()))
            .all(conn)
            .await?;
        Ok(found.into_iter().map(to_record).collect())
    }
}
