//! Transaction entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub transaction_id: String,

    pub evse_id: i32,

    pub connector_id: i32,

    pub start_time: DateTimeUtc,

    /// Next sequence number to emit; persisted before each event.
    pub seq_no: i32,

    /// ChargingState: Charging, EVConnected, SuspendedEV, SuspendedEVSE, Idle.
    pub charging_state: String,

    /// IdToken as JSON (value + type + additional info).
    #[sea_orm(nullable, column_type = "Text")]
    pub id_token: Option<String>,

    #[sea_orm(nullable, column_type = "Text")]
    pub group_id_token: Option<String>,

    #[sea_orm(nullable)]
    pub reservation_id: Option<i32>,

    #[sea_orm(nullable)]
    pub remote_start_id: Option<i32>,

    /// Energy.Active.Import.Register at start (Wh).
    #[sea_orm(nullable)]
    pub start_energy_wh: Option<f64>,

    #[sea_orm(nullable)]
    pub stopped_reason: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::transaction_meter_value::Entity")]
    MeterValues,
}

impl Related<super::transaction_meter_value::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::MeterValues.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
