//! ChargingProfile entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "charging_profiles")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Profile ID from the OCPP ChargingProfile object.
    #[sea_orm(unique)]
    pub profile_id: i32,

    /// EVSE ID (0 = station-wide).
    pub evse_id: i32,

    pub stack_level: i32,

    /// ChargingProfilePurpose: TxDefaultProfile, TxProfile,
    /// ChargingStationMaxProfile.
    pub purpose: String,

    /// ChargingProfileKind: Absolute, Recurring, Relative.
    pub kind: String,

    /// RecurrencyKind: Daily, Weekly (nullable).
    #[sea_orm(nullable)]
    pub recurrency_kind: Option<String>,

    #[sea_orm(nullable)]
    pub valid_from: Option<DateTimeUtc>,

    #[sea_orm(nullable)]
    pub valid_to: Option<DateTimeUtc>,

    /// Transaction bound to a TxProfile.
    #[sea_orm(nullable)]
    pub transaction_id: Option<String>,

    /// Charging schedule as wire-shape JSON.
    #[sea_orm(column_type = "Text")]
    pub schedule_json: String,

    pub installed_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
