use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "role_capabilities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub contextid: i64,
    pub roleid: i64,
    pub capability: String,
    /// Never stores the `Inherit` value; that is the absence of the row.
    pub permission: i32,
    pub timemodified: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
