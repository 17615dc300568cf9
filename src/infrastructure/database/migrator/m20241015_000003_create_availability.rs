//! Create availability table
//!
//! Operational status per station (0,0), EVSE (id,0), and connector.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Availability::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Availability::EvseId).integer().not_null())
                    .col(
                        ColumnDef::new(Availability::ConnectorId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Availability::Status)
                            .string()
                            .not_null()
                            .default("Operative"),
                    )
                    .primary_key(
                        Index::create()
                            .col(Availability::EvseId)
                            .col(Availability::ConnectorId),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Availability::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Availability {
    Table,
    EvseId,
    ConnectorId,
    Status,
}
