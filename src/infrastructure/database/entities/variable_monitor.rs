//! VariableMonitoring entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "variable_monitoring")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub component: String,

    pub variable: String,

    /// Monitor kind: UpperThreshold, LowerThreshold, Delta, Periodic,
    /// PeriodicClockAligned.
    pub kind: String,

    pub value: f64,

    pub severity: i32,

    /// Only evaluated while a transaction is running.
    pub transaction_only: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
