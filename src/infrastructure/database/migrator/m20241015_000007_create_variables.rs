//! Create variables table
//!
//! Device model storage: one row per (component, variable, attribute)
//! cell together with the variable's declared characteristics.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Variables::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Variables::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Variables::Component).string().not_null())
                    .col(
                        ColumnDef::new(Variables::ComponentInstance)
                            .string()
                            .null(),
                    )
                    .col(ColumnDef::new(Variables::EvseId).integer().null())
                    .col(ColumnDef::new(Variables::ConnectorId).integer().null())
                    .col(ColumnDef::new(Variables::Variable).string().not_null())
                    .col(
                        ColumnDef::new(Variables::VariableInstance)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Variables::Attribute)
                            .string()
                            .not_null()
                            .default("Actual"),
                    )
                    .col(ColumnDef::new(Variables::Value).text().null())
                    .col(
                        ColumnDef::new(Variables::Mutability)
                            .string()
                            .not_null()
                            .default("ReadWrite"),
                    )
                    .col(
                        ColumnDef::new(Variables::DataType)
                            .string()
                            .not_null()
                            .default("string"),
                    )
                    .col(ColumnDef::new(Variables::ValuesList).text().null())
                    .col(ColumnDef::new(Variables::Unit).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_variables_selector")
                    .table(Variables::Table)
                    .col(Variables::Component)
                    .col(Variables::Variable)
                    .col(Variables::Attribute)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Variables::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Variables {
    Table,
    Id,
    Component,
    ComponentInstance,
    EvseId,
    ConnectorId,
    Variable,
    VariableInstance,
    Attribute,
    Value,
    Mutability,
    DataType,
    ValuesList,
    Unit,
}
