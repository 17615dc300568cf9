//! Create transactions table
//!
//! Rows live from transaction start until the Ended event has been
//! acknowledged by the CSMS; rows present at boot are interrupted
//! transactions awaiting replay.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::TransactionId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::EvseId).integer().not_null())
                    .col(
                        ColumnDef::new(Transactions::ConnectorId)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::StartTime)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::SeqNo)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Transactions::ChargingState)
                            .string()
                            .not_null()
                            .default("EVConnected"),
                    )
                    .col(ColumnDef::new(Transactions::IdToken).text().null())
                    .col(ColumnDef::new(Transactions::GroupIdToken).text().null())
                    .col(ColumnDef::new(Transactions::ReservationId).integer().null())
                    .col(ColumnDef::new(Transactions::RemoteStartId).integer().null())
                    .col(ColumnDef::new(Transactions::StartEnergyWh).double().null())
                    .col(ColumnDef::new(Transactions::StoppedReason).string().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_transactions_evse")
                    .table(Transactions::Table)
                    .col(Transactions::EvseId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Transactions {
    Table,
    TransactionId,
    EvseId,
    ConnectorId,
    StartTime,
    SeqNo,
    ChargingState,
    IdToken,
    GroupIdToken,
    ReservationId,
    RemoteStartId,
    StartEnergyWh,
    StoppedReason,
}
