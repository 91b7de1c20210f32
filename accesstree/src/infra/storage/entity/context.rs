use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "context")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub contextlevel: i16,
    pub instanceid: i64,
    /// `NULL` while the path is reset and pending rebuild.
    pub path: Option<String>,
    pub depth: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
