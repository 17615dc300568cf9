//! Create message_queue table
//!
//! Persisted outbound Calls awaiting acknowledgement; the rowid gives
//! the replay order after a restart.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MessageQueue::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MessageQueue::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(MessageQueue::UniqueId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(MessageQueue::Action).string().not_null())
                    .col(ColumnDef::new(MessageQueue::Payload).text().not_null())
                    .col(
                        ColumnDef::new(MessageQueue::Priority)
                            .string()
                            .not_null()
                            .default("Normal"),
                    )
                    .col(
                        ColumnDef::new(MessageQueue::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(MessageQueue::FirstEnqueuedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MessageQueue::TransactionId)
                            .string()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_message_queue_transaction")
                    .table(MessageQueue::Table)
                    .col(MessageQueue::TransactionId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MessageQueue::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum MessageQueue {
    Table,
    Id,
    UniqueId,
    Action,
    Payload,
    Priority,
    Attempts,
    FirstEnqueuedAt,
    TransactionId,
}
