//! Variable attribute entity

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "variables")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub component: String,

    #[sea_orm(nullable)]
    pub component_instance: Option<String>,

    #[sea_orm(nullable)]
    pub evse_id: Option<i32>,

    #[sea_orm(nullable)]
    pub connector_id: Option<i32>,

    pub variable: String,

    #[sea_orm(nullable)]
    pub variable_instance: Option<String>,

    /// Attribute: Actual, Target, MinSet, MaxSet.
    pub attribute: String,

    #[sea_orm(nullable, column_type = "Text")]
    pub value: Option<String>,

    /// Mutability: ReadOnly, WriteOnly, ReadWrite.
    pub mutability: String,

    /// DataType: string, decimal, integer, dateTime, boolean,
    /// OptionList, SequenceList, MemberList.
    pub data_type: String,

    /// Accepted members as a JSON array, for list data types.
    #[sea_orm(nullable, column_type = "Text")]
    pub values_list: Option<String>,

    #[sea_orm(nullable)]
    pub unit: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
