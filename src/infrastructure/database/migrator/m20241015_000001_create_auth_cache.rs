//! Create auth_cache table
//!
//! Tokens learned from CSMS authorization answers, keyed by token
//! hash, LRU-tracked via last_used.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuthCache::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthCache::IdTokenHash)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuthCache::IdTokenInfo)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(AuthCache::LastUsed)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_auth_cache_last_used")
                    .table(AuthCache::Table)
                    .col(AuthCache::LastUsed)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthCache::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum AuthCache {
    Table,
    IdTokenHash,
    IdTokenInfo,
    LastUsed,
}
