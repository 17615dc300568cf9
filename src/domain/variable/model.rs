//! Device model variable entities

use rust_ocpp::v2_0_1::datatypes::component_type::ComponentType;
use rust_ocpp::v2_0_1::datatypes::evse_type::EVSEType;
use rust_ocpp::v2_0_1::datatypes::variable_type::VariableType;
use rust_ocpp::v2_0_1::enumerations::attribute_enum_type::AttributeEnumType;
use rust_ocpp::v2_0_1::enumerations::data_enum_type::DataEnumType;
use rust_ocpp::v2_0_1::enumerations::monitor_enum_type::MonitorEnumType;
use rust_ocpp::v2_0_1::enumerations::mutability_enum_type::MutabilityEnumType;

/// Addresses one `(component, variable, attribute)` cell.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableSelector {
    pub component: String,
    pub component_instance: Option<String>,
    pub evse_id: Option<i32>,
    pub connector_id: Option<i32>,
    pub variable: String,
    pub variable_instance: Option<String>,
    pub attribute: AttributeEnumType,
}

impl VariableSelector {
    /// Shorthand for the common `Actual` attribute of a station-level
    /// component variable.
    pub fn actual(component: &str, variable: &str) -> Self {
        Self {
            component: component.to_string(),
            component_instance: None,
            evse_id: None,
            connector_id: None,
            variable: variable.to_string(),
            variable_instance: None,
            attribute: AttributeEnumType::Actual,
        }
    }

    pub fn from_wire(
        component: &ComponentType,
        variable: &VariableType,
        attribute: Option<AttributeEnumType>,
    ) -> Self {
        Self {
            component: component.name.clone(),
            component_instance: component.instance.clone(),
            evse_id: component.evse.as_ref().map(|e| e.id),
            connector_id: component.evse.as_ref().and_then(|e| e.connector_id),
            variable: variable.name.clone(),
            variable_instance: variable.instance.clone(),
            attribute: attribute.unwrap_or(AttributeEnumType::Actual),
        }
    }

    pub fn component_type(&self) -> ComponentType {
        ComponentType {
            name: self.component.clone(),
            instance: self.component_instance.clone(),
            evse: self.evse_id.map(|id| EVSEType {
                id,
                connector_id: self.connector_id,
            }),
        }
    }

    pub fn variable_type(&self) -> VariableType {
        VariableType {
            name: self.variable.clone(),
            instance: self.variable_instance.clone(),
        }
    }
}

/// One stored variable attribute with its declared characteristics.
#[derive(Debug, Clone)]
pub struct VariableAttribute {
    pub selector: VariableSelector,
    pub value: Option<String>,
    pub mutability: MutabilityEnumType,
    pub data_type: DataEnumType,
    /// Accepted members when `data_type` is OptionList/MemberList.
    pub values_list: Option<Vec<String>>,
    pub unit: Option<String>,
}

/// One installed variable monitor.
#[derive(Debug, Clone)]
pub struct VariableMonitor {
    pub id: i32,
    pub component: String,
    pub variable: String,
    pub kind: MonitorEnumType,
    pub value: f64,
    pub severity: i32,
    /// Only evaluated while a transaction is running.
    pub transaction: bool,
}
