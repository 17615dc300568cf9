//! AuthListVersion entity (single-row table)

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "auth_list_version")]
pub struct Model {
    /// Always 0; the table holds exactly one row.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i32,

    pub version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
