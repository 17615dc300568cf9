//! Device model persistence trait

use async_trait::async_trait;

use super::model::{VariableAttribute, VariableMonitor, VariableSelector};
use crate::support::errors::DomainResult;

/// Filter for GetMonitoringReport.
#[derive(Debug, Clone, Default)]
pub struct MonitorCriteria {
    pub component: Option<String>,
    pub variable: Option<String>,
}

/// VARIABLES + VARIABLE_MONITORING tables.
#[async_trait]
pub trait DeviceModelRepository: Send + Sync {
    /// Insert or replace a full attribute row (declaration + value).
    async fn upsert_attribute(&self, attribute: &VariableAttribute) -> DomainResult<()>;

    async fn get_attribute(
        &self,
        selector: &VariableSelector,
    ) -> DomainResult<Option<VariableAttribute>>;

    /// Persist only the value of an existing attribute row.
    async fn set_value(&self, selector: &VariableSelector, value: &str) -> DomainResult<()>;

    /// Every stored attribute, ordered by component then variable.
    async fn list_all(&self) -> DomainResult<Vec<VariableAttribute>>;

    // Monitors

    /// Insert (id = None) or replace (id = Some) a monitor; returns
    /// its id.
    async fn upsert_monitor(&self, monitor: &VariableMonitor, id: Option<i32>)
        -> DomainResult<i32>;

    async fn list_monitors(&self, criteria: &MonitorCriteria)
        -> DomainResult<Vec<VariableMonitor>>;

    async fn delete_monitor(&self, id: i32) -> DomainResult<bool>;
}
