//! MessageQueue entity
//!
//! The auto-increment id is the replay order: rows are transmitted
//! oldest-first after a restart.

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "message_queue")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub unique_id: String,

    pub action: String,

    /// Call payload as JSON.
    #[sea_orm(column_type = "Text")]
    pub payload: String,

    /// Queue tier: Transactional or Normal.
    pub priority: String,

    pub attempts: i32,

    pub first_enqueued_at: DateTimeUtc,

    #[sea_orm(nullable)]
    pub transaction_id: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
