//! AuthList entity
//!
//! One row per local authorization list entry, keyed by the token
//! value plus its type (the same value may exist as e.g. ISO14443 and
//! Central without colliding).

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "auth_list")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id_token: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub token_type: String,

    /// IdTokenInfo as JSON.
    #[sea_orm(column_type = "Text")]
    pub id_token_info: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
