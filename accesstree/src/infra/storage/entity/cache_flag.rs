use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "cache_flags")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub flagtype: String,
    pub name: String,
    /// Monotonic sequence number, allocated as `max + 1` inside the
    /// marking transaction.
    pub value: i64,
    pub timemodified: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
