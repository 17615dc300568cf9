//! Availability entity
//!
//! `evse_id = 0` addresses the whole station; `connector_id = 0`
//! addresses a whole EVSE.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "availability")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub evse_id: i32,

    #[sea_orm(primary_key, auto_increment = false)]
    pub connector_id: i32,

    /// OperationalStatus: Operative or Inoperative.
    pub status: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
