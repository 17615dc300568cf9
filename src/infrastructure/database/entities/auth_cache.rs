//! AuthCache entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "auth_cache")]
pub struct Model {
    /// SHA-256 of the id token; the raw token is never stored.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id_token_hash: String,

    /// IdTokenInfo as JSON.
    #[sea_orm(column_type = "Text")]
    pub id_token_info: String,

    pub last_used: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
