//! Create charging_profiles table
//!
//! Profiles installed via SetChargingProfile. The schedule is kept in
//! wire shape so it round-trips to ReportChargingProfiles unchanged.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ChargingProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ChargingProfiles::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::ProfileId)
                            .integer()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::EvseId)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::StackLevel)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::Purpose)
                            .string()
                            .not_null()
                            .default("TxDefaultProfile"),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::Kind)
                            .string()
                            .not_null()
                            .default("Absolute"),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::RecurrencyKind)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::ValidFrom)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::ValidTo)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::TransactionId)
                            .string()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::ScheduleJson)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ChargingProfiles::InstalledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_profiles_evse")
                    .table(ChargingProfiles::Table)
                    .col(ChargingProfiles::EvseId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_charging_profiles_transaction")
                    .table(ChargingProfiles::Table)
                    .col(ChargingProfiles::TransactionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ChargingProfiles::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum ChargingProfiles {
    Table,
    Id,
    ProfileId,
    EvseId,
    StackLevel,
    Purpose,
    Kind,
    RecurrencyKind,
    ValidFrom,
    ValidTo,
    TransactionId,
    ScheduleJson,
    InstalledAt,
}
