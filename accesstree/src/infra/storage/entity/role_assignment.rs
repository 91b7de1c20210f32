use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "role_assignments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub roleid: i64,
    pub subjectid: i64,
    pub contextid: i64,
    /// Owning component for plugin-managed grants; empty for manual ones.
    pub component: String,
    pub itemid: i64,
    pub timemodified: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
