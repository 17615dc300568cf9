//! Create transaction_meter_values table

use sea_orm_migration::prelude::*;

use super::m20241015_000004_create_transactions::Transactions;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TransactionMeterValues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransactionMeterValues::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TransactionMeterValues::TransactionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionMeterValues::Payload)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransactionMeterValues::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_meter_values_transaction")
                            .from(
                                TransactionMeterValues::Table,
                                TransactionMeterValues::TransactionId,
                            )
                            .to(Transactions::Table, Transactions::TransactionId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_meter_values_transaction")
                    .table(TransactionMeterValues::Table)
                    .col(TransactionMeterValues::TransactionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(TransactionMeterValues::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(Iden)]
pub enum TransactionMeterValues {
    Table,
    Id,
    TransactionId,
    Payload,
    CreatedAt,
}
