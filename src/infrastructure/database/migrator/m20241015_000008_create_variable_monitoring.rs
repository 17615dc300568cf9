//! Create variable_monitoring table

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VariableMonitoring::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VariableMonitoring::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(VariableMonitoring::Component)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VariableMonitoring::Variable)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(VariableMonitoring::Kind).string().not_null())
                    .col(ColumnDef::new(VariableMonitoring::Value).double().not_null())
                    .col(
                        ColumnDef::new(VariableMonitoring::Severity)
                            .integer()
                            .not_null()
                            .default(9),
                    )
                    .col(
                        ColumnDef::new(VariableMonitoring::TransactionOnly)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VariableMonitoring::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum VariableMonitoring {
    Table,
    Id,
    Component,
    Variable,
    Kind,
    Value,
    Severity,
    TransactionOnly,
}
