//! Schema migrations for the engine's relational contract.

use sea_orm_migration::prelude::*;

pub struct Migrator;

impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![Box::new(m0001_create_access_tables::Migration)]
    }
}

mod m0001_create_access_tables {
    use super::*;

    #[derive(DeriveMigrationName)]
    pub struct Migration;

    #[derive(DeriveIden)]
    enum Context {
        Table,
        Id,
        Contextlevel,
        Instanceid,
        Path,
        Depth,
    }

    #[derive(DeriveIden)]
    enum RoleAssignments {
        Table,
        Id,
        Roleid,
        Subjectid,
        Contextid,
        Component,
        Itemid,
        Timemodified,
    }

    #[derive(DeriveIden)]
    enum RoleCapabilities {
        Table,
        Id,
        Contextid,
        Roleid,
        Capability,
        Permission,
        Timemodified,
    }

    #[derive(DeriveIden)]
    enum Capabilities {
        Table,
        Id,
        Name,
        Captype,
        Contextlevel,
        Component,
        Riskbitmask,
    }

    #[derive(DeriveIden)]
    enum CacheFlags {
        Table,
        Id,
        Flagtype,
        Name,
        Value,
        Timemodified,
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Context::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Context::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(Context::Contextlevel).small_integer().not_null())
                        .col(ColumnDef::new(Context::Instanceid).big_integer().not_null())
                        .col(ColumnDef::new(Context::Path).string().null())
                        .col(ColumnDef::new(Context::Depth).integer().not_null().default(0))
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("uq_context_level_instance")
                        .table(Context::Table)
                        .col(Context::Contextlevel)
                        .col(Context::Instanceid)
                        .unique()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_context_path")
                        .table(Context::Table)
                        .col(Context::Path)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RoleAssignments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RoleAssignments::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(RoleAssignments::Roleid).big_integer().not_null())
                        .col(ColumnDef::new(RoleAssignments::Subjectid).big_integer().not_null())
                        .col(ColumnDef::new(RoleAssignments::Contextid).big_integer().not_null())
                        .col(
                            ColumnDef::new(RoleAssignments::Component)
                                .string()
                                .not_null()
                                .default(""),
                        )
                        .col(
                            ColumnDef::new(RoleAssignments::Itemid)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(RoleAssignments::Timemodified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("uq_role_assignment")
                        .table(RoleAssignments::Table)
                        .col(RoleAssignments::Roleid)
                        .col(RoleAssignments::Subjectid)
                        .col(RoleAssignments::Contextid)
                        .col(RoleAssignments::Component)
                        .col(RoleAssignments::Itemid)
                        .unique()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_role_assignments_subject")
                        .table(RoleAssignments::Table)
                        .col(RoleAssignments::Subjectid)
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_role_assignments_context")
                        .table(RoleAssignments::Table)
                        .col(RoleAssignments::Contextid)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(RoleCapabilities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(RoleCapabilities::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(RoleCapabilities::Contextid).big_integer().not_null())
                        .col(ColumnDef::new(RoleCapabilities::Roleid).big_integer().not_null())
                        .col(ColumnDef::new(RoleCapabilities::Capability).string().not_null())
                        .col(ColumnDef::new(RoleCapabilities::Permission).integer().not_null())
                        .col(
                            ColumnDef::new(RoleCapabilities::Timemodified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("uq_role_capability")
                        .table(RoleCapabilities::Table)
                        .col(RoleCapabilities::Contextid)
                        .col(RoleCapabilities::Roleid)
                        .col(RoleCapabilities::Capability)
                        .unique()
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("idx_role_capabilities_role")
                        .table(RoleCapabilities::Table)
                        .col(RoleCapabilities::Roleid)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Capabilities::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Capabilities::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(
                            ColumnDef::new(Capabilities::Name)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Capabilities::Captype).string().not_null())
                        .col(ColumnDef::new(Capabilities::Contextlevel).small_integer().not_null())
                        .col(ColumnDef::new(Capabilities::Component).string().not_null())
                        .col(
                            ColumnDef::new(Capabilities::Riskbitmask)
                                .big_integer()
                                .not_null()
                                .default(0),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(CacheFlags::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(CacheFlags::Id)
                                .big_integer()
                                .not_null()
                                .auto_increment()
                                .primary_key(),
                        )
                        .col(ColumnDef::new(CacheFlags::Flagtype).string().not_null())
                        .col(ColumnDef::new(CacheFlags::Name).string().not_null())
                        .col(ColumnDef::new(CacheFlags::Value).big_integer().not_null())
                        .col(
                            ColumnDef::new(CacheFlags::Timemodified)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;
            manager
                .create_index(
                    Index::create()
                        .name("uq_cache_flags")
                        .table(CacheFlags::Table)
                        .col(CacheFlags::Flagtype)
                        .col(CacheFlags::Name)
                        .unique()
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(CacheFlags::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Capabilities::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RoleCapabilities::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(RoleAssignments::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Context::Table).to_owned())
                .await?;
            Ok(())
        }
    }
}
