//! Create auth_list and auth_list_version tables
//!
//! The local authorization list managed by SendLocalList, plus its
//! single-row version counter.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(AuthList::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(AuthList::IdToken).string().not_null())
                    .col(ColumnDef::new(AuthList::TokenType).string().not_null())
                    .col(ColumnDef::new(AuthList::IdTokenInfo).text().not_null())
                    .primary_key(
                        Index::create()
                            .col(AuthList::IdToken)
                            .col(AuthList::TokenType),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AuthListVersion::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AuthListVersion::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AuthListVersion::Version)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AuthListVersion::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(AuthList::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum AuthList {
    Table,
    IdToken,
    TokenType,
    IdTokenInfo,
}

#[derive(Iden)]
pub enum AuthListVersion {
    Table,
    Id,
    Version,
}
