//! SeaORM implementation of DeviceModelRepository

use async_trait::async_trait;
use rust_ocpp::v2_0_1::enumerations::attribute_enum_type::AttributeEnumType;
use rust_ocpp::v2_0_1::enumerations::data_enum_type::DataEnumType;
use rust_ocpp::v2_0_1::enumerations::monitor_enum_type::MonitorEnumType;
use rust_ocpp::v2_0_1::enumerations::mutability_enum_type::MutabilityEnumType;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    Select, Set,
};
use tracing::debug;

use super::{db_err, enum_from_string, enum_to_string};
use crate::domain::variable::{
    DeviceModelRepository, MonitorCriteria, VariableAttribute, VariableMonitor, VariableSelector,
};
use crate::infrastructure::database::entities::{variable, variable_monitor};
use crate::support::errors::{DomainError, DomainResult};

pub struct SeaOrmDeviceModelRepository {
    db: DatabaseConnection,
}

impl SeaOrmDeviceModelRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

// ── Conversion helpers ──────────────────────────────────────────

fn filter_by_selector(
    mut query: Select<variable::Entity>,
    selector: &VariableSelector,
) -> Select<variable::Entity> {
    query = query
        .filter(variable::Column::Component.eq(selector.component.clone()))
        .filter(variable::Column::Variable.eq(selector.variable.clone()))
        .filter(variable::Column::Attribute.eq(enum_to_string(&selector.attribute)));

    query = match &selector.component_instance {
        Some(v) => query.filter(variable::Column::ComponentInstance.eq(v.clone())),
        None => query.filter(variable::Column::ComponentInstance.is_null()),
    };
    query = match selector.evse_id {
        Some(v) => query.filter(variable::Column::EvseId.eq(v)),
        None => query.filter(variable::Column::EvseId.is_null()),
    };
    query = match selector.connector_id {
        Some(v) => query.filter(variable::Column::ConnectorId.eq(v)),
        None => query.filter(variable::Column::ConnectorId.is_null()),
    };
    match &selector.variable_instance {
        Some(v) => query.filter(variable::Column::VariableInstance.eq(v.clone())),
        None => query.filter(variable::Column::VariableInstance.is_null()),
    }
}

fn model_to_domain(m: variable::Model) -> VariableAttribute {
    VariableAttribute {
        selector: VariableSelector {
            component: m.component,
            component_instance: m.component_instance,
            evse_id: m.evse_id,
            connector_id: m.connector_id,
            variable: m.variable,
            variable_instance: m.variable_instance,
            attribute: enum_from_string(&m.attribute).unwrap_or(AttributeEnumType::Actual),
        },
        value: m.value,
        mutability: enum_from_string(&m.mutability).unwrap_or(MutabilityEnumType::ReadWrite),
        data_type: enum_from_string(&m.data_type).unwrap_or(DataEnumType::String),
        values_list: m
            .values_list
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok()),
        unit: m.unit,
    }
}

fn monitor_to_domain(m: variable_monitor::Model) -> VariableMonitor {
    VariableMonitor {
        id: m.id,
        component: m.component,
        variable: m.variable,
        kind: enum_from_string(&m.kind).unwrap_or(MonitorEnumType::UpperThreshold),
        value: m.value,
        severity: m.severity,
        transaction: m.transaction_only,
    }
}

// ── DeviceModelRepository impl ──────────────────────────────────

#[async_trait]
impl DeviceModelRepository for SeaOrmDeviceModelRepository {
    async fn upsert_attribute(&self, attribute: &VariableAttribute) -> DomainResult<()> {
        let values_list = attribute
            .values_list
            .as_ref()
            .map(|v| {
                serde_json::to_string(v)
                    .map_err(|e| DomainError::Validation(format!("Serialize valuesList: {}", e)))
            })
            .transpose()?;

        let existing = filter_by_selector(variable::Entity::find(), &attribute.selector)
            .one(&self.db)
            .await
            .map_err(db_err)?;

        match existing {
            Some(row) => {
                let mut active: variable::ActiveModel = row.into();
                active.value = Set(attribute.value.clone());
                active.mutability = Set(enum_to_string(&attribute.mutability));
                active.data_type = Set(enum_to_string(&attribute.data_type));
                active.values_list = Set(values_list);
                active.unit = Set(attribute.unit.clone());
                active.update(&self.db).await.map_err(db_err)?;
            }
            None => {
                let model = variable::ActiveModel {
                    id: Default::default(),
                    component: Set(attribute.selector.component.clone()),
                    component_instance: Set(attribute.selector.component_instance.clone()),
                    evse_id: Set(attribute.selector.evse_id),
                    connector_id: Set(attribute.selector.connector_id),
                    variable: Set(attribute.selector.variable.clone()),
                    variable_instance: Set(attribute.selector.variable_instance.clone()),
                    attribute: Set(enum_to_string(&attribute.selector.attribute)),
                    value: Set(attribute.value.clone()),
                    mutability: Set(enum_to_string(&attribute.mutability)),
                    data_type: Set(enum_to_string(&attribute.data_type)),
                    values_list: Set(values_list),
                    unit: Set(attribute.unit.clone()),
                };
                model.insert(&self.db).await.map_err(db_err)?;
            }
        }
        Ok(())
    }

    async fn get_attribute(
        &self,
        selector: &VariableSelector,
    ) -> DomainResult<Option<VariableAttribute>> {
        let row = filter_by_selector(variable::Entity::find(), selector)
            .one(&self.db)
            .await
            .map_err(db_err)?;
        Ok(row.map(model_to_domain))
    }

    async fn set_value(&self, selector: &VariableSelector, value: &str) -> DomainResult<()> {
        let Some(row) = filter_by_selector(variable::Entity::find(), selector)
            .one(&self.db)
            .await
            .map_err(db_err)?
        else {
            return Err(DomainError::NotFound {
                entity: "VariableAttribute",
                field: "selector",
                value: format!("{}/{}", selector.component, selector.variable),
            });
        };

        debug!(
            component = selector.component.as_str(),
            variable = selector.variable.as_str(),
            "Setting variable value"
        );

        let mut active: variable::ActiveModel = row.into();
        active.value = Set(Some(value.to_string()));
        active.update(&self.db).await.map_err(db_err)?;
        Ok(())
    }

    async fn list_all(&self) -> DomainResult<Vec<VariableAttribute>> {
        let models = variable::Entity::find()
            .order_by_asc(variable::Column::Component)
            .order_by_asc(variable::Column::Variable)
            .order_by_asc(variable::Column::Attribute)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(models.into_iter().map(model_to_domain).collect())
    }

    async fn upsert_monitor(
        &self,
        monitor: &VariableMonitor,
        id: Option<i32>,
    ) -> DomainResult<i32> {
        match id {
            Some(id) => {
                let Some(row) = variable_monitor::Entity::find_by_id(id)
                    .one(&self.db)
                    .await
                    .map_err(db_err)?
                else {
                    return Err(DomainError::NotFound {
                        entity: "VariableMonitor",
                        field: "id",
                        value: id.to_string(),
                    });
                };
                let mut active: variable_monitor::ActiveModel = row.into();
                active.component = Set(monitor.component.clone());
                active.variable = Set(monitor.variable.clone());
                active.kind = Set(enum_to_string(&monitor.kind));
                active.value = Set(monitor.value);
                active.severity = Set(monitor.severity);
                active.transaction_only = Set(monitor.transaction);
                active.update(&self.db).await.map_err(db_err)?;
                Ok(id)
            }
            None => {
                let model = variable_monitor::ActiveModel {
                    id: Default::default(),
                    component: Set(monitor.component.clone()),
                    variable: Set(monitor.variable.clone()),
                    kind: Set(enum_to_string(&monitor.kind)),
                    value: Set(monitor.value),
                    severity: Set(monitor.severity),
                    transaction_only: Set(monitor.transaction),
                };
                let inserted = model.insert(&self.db).await.map_err(db_err)?;
                Ok(inserted.id)
            }
        }
    }

    async fn list_monitors(
        &self,
        criteria: &MonitorCriteria,
    ) -> DomainResult<Vec<VariableMonitor>> {
        let mut query = variable_monitor::Entity::find();
        if let Some(component) = &criteria.component {
            query = query.filter(variable_monitor::Column::Component.eq(component.clone()));
        }
        if let Some(variable) = &criteria.variable {
            query = query.filter(variable_monitor::Column::Variable.eq(variable.clone()));
        }
        let models = query
            .order_by_asc(variable_monitor::Column::Id)
            .all(&self.db)
            .await
            .map_err(db_err)?;
        Ok(models.into_iter().map(monitor_to_domain).collect())
    }

    async fn delete_monitor(&self, id: i32) -> DomainResult<bool> {
        let result = variable_monitor::Entity::delete_by_id(id)
            .exec(&self.db)
            .await
            .map_err(db_err)?;
        Ok(result.rows_affected > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::{init_database, DatabaseConfig};

    async fn repo() -> SeaOrmDeviceModelRepository {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        SeaOrmDeviceModelRepository::new(db)
    }

    fn attribute(component: &str, variable: &str, value: &str) -> VariableAttribute {
        VariableAttribute {
            selector: VariableSelector::actual(component, variable),
            value: Some(value.to_string()),
            mutability: MutabilityEnumType::ReadWrite,
            data_type: DataEnumType::Integer,
            values_list: None,
            unit: None,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_roundtrip() {
        let repo = repo().await;
        repo.upsert_attribute(&attribute("OCPPCommCtrlr", "HeartbeatInterval", "300"))
            .await
            .unwrap();

        let selector = VariableSelector::actual("OCPPCommCtrlr", "HeartbeatInterval");
        let got = repo.get_attribute(&selector).await.unwrap().unwrap();
        assert_eq!(got.value.as_deref(), Some("300"));
        assert_eq!(got.data_type, DataEnumType::Integer);
    }

    #[tokio::test]
    async fn set_value_requires_existing_row() {
        let repo = repo().await;
        let selector = VariableSelector::actual("OCPPCommCtrlr", "Missing");
        assert!(repo.set_value(&selector, "1").await.is_err());

        repo.upsert_attribute(&attribute("OCPPCommCtrlr", "Missing", "0"))
            .await
            .unwrap();
        repo.set_value(&selector, "1").await.unwrap();
        let got = repo.get_attribute(&selector).await.unwrap().unwrap();
        assert_eq!(got.value.as_deref(), Some("1"));
    }

    #[tokio::test]
    async fn monitors_crud() {
        let repo = repo().await;
        let monitor = VariableMonitor {
            id: 0,
            component: "SampledDataCtrlr".into(),
            variable: "TxUpdatedInterval".into(),
            kind: MonitorEnumType::UpperThreshold,
            value: 900.0,
            severity: 5,
            transaction: true,
        };

        let id = repo.upsert_monitor(&monitor, None).await.unwrap();
        assert!(id > 0);

        let listed = repo
            .list_monitors(&MonitorCriteria {
                component: Some("SampledDataCtrlr".into()),
                variable: None,
            })
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].severity, 5);

        assert!(repo.delete_monitor(id).await.unwrap());
        assert!(!repo.delete_monitor(id).await.unwrap());
    }
}
