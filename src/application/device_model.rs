//! Device model
//!
//! Typed access to the `(component, variable, attribute)` store with
//! validation against each variable's declared data type and values
//! list, plus change notification over a broadcast channel.

use std::sync::Arc;

use chrono::DateTime;
use rust_ocpp::v2_0_1::enumerations::data_enum_type::DataEnumType;
use rust_ocpp::v2_0_1::enumerations::mutability_enum_type::MutabilityEnumType;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::StationConfig;
use crate::domain::variable::{
    DeviceModelRepository, MonitorCriteria, VariableAttribute, VariableMonitor, VariableSelector,
};
use crate::support::errors::DomainResult;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Where a set originates; mutability rules only bind the CSMS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetSource {
    Csms,
    Actual,
    Default,
    Internal,
}

/// Why a set was refused, mapped onto SetVariableStatus by the
/// SetVariables handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetRejection {
    UnknownVariable,
    ReadOnly,
    InvalidValue(String),
    NotInValuesList(String),
}

/// Change notification delivered to subscribers.
#[derive(Debug, Clone)]
pub struct VariableChange {
    pub component: String,
    pub variable: String,
    pub value: String,
    pub source: SetSource,
}

#[derive(Clone)]
pub struct DeviceModel {
    repo: Arc<dyn DeviceModelRepository>,
    changes: broadcast::Sender<VariableChange>,
}

impl DeviceModel {
    pub fn new(repo: Arc<dyn DeviceModelRepository>) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self { repo, changes }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<VariableChange> {
        self.changes.subscribe()
    }

    /// Seed the standard variables the core reads at runtime. Existing
    /// rows win: a value the CSMS set in an earlier boot stays.
    pub async fn seed_standard_variables(&self, config: &StationConfig) -> DomainResult<()> {
        let seeds: Vec<(&str, &str, String, MutabilityEnumType)> = vec![
            (
                "OCPPCommCtrlr",
                "HeartbeatInterval",
                config.metering.heartbeat_interval_s.to_string(),
                MutabilityEnumType::ReadWrite,
            ),
            (
                "OCPPCommCtrlr",
                "MessageTimeout",
                config.messaging.message_timeout_s.to_string(),
                MutabilityEnumType::ReadOnly,
            ),
            (
                "OCPPCommCtrlr",
                "MessageAttempts",
                config.messaging.message_max_attempts.to_string(),
                MutabilityEnumType::ReadWrite,
            ),
            (
                "OCPPCommCtrlr",
                "WebSocketPingInterval",
                config.network.ping_interval_s.to_string(),
                MutabilityEnumType::ReadWrite,
            ),
            (
                "AlignedDataCtrlr",
                "Interval",
                config.metering.aligned_data_interval_s.to_string(),
                MutabilityEnumType::ReadWrite,
            ),
            (
                "SampledDataCtrlr",
                "TxUpdatedInterval",
                config.metering.sampled_data_interval_s.to_string(),
                MutabilityEnumType::ReadWrite,
            ),
            (
                "AuthCacheCtrlr",
                "LifeTime",
                config.auth.cache_lifetime_s.to_string(),
                MutabilityEnumType::ReadWrite,
            ),
            (
                "AuthCacheCtrlr",
                "Storage",
                config.auth.cache_max_bytes.to_string(),
                MutabilityEnumType::ReadOnly,
            ),
            (
                "SmartChargingCtrlr",
                "ProfileStackLevel",
                "8".to_string(),
                MutabilityEnumType::ReadOnly,
            ),
        ];

        let mut seeded = 0;
        for (component, variable, value, mutability) in seeds {
            let selector = VariableSelector::actual(component, variable);
            if self.repo.get_attribute(&selector).await?.is_some() {
                continue;
            }
            self.repo
                .upsert_attribute(&VariableAttribute {
                    selector,
                    value: Some(value),
                    mutability,
                    data_type: DataEnumType::Integer,
                    values_list: None,
                    unit: None,
                })
                .await?;
            seeded += 1;
        }

        if seeded > 0 {
            info!(seeded, "Seeded standard device model variables");
        }
        Ok(())
    }

    pub async fn get_variable_attribute(
        &self,
        selector: &VariableSelector,
    ) -> DomainResult<Option<VariableAttribute>> {
        self.repo.get_attribute(selector).await
    }

    /// Validate and store a value; notifies subscribers on success.
    pub async fn set_variable_attribute_value(
        &self,
        selector: &VariableSelector,
        value: &str,
        source: SetSource,
    ) -> DomainResult<Result<(), SetRejection>> {
        let Some(attribute) = self.repo.get_attribute(selector).await? else {
            return Ok(Err(SetRejection::UnknownVariable));
        };

        if source == SetSource::Csms && attribute.mutability == MutabilityEnumType::ReadOnly {
            return Ok(Err(SetRejection::ReadOnly));
        }

        if let Err(rejection) = validate_value(&attribute, value) {
            return Ok(Err(rejection));
        }

        self.repo.set_value(selector, value).await?;

        debug!(
            component = selector.component.as_str(),
            variable = selector.variable.as_str(),
            value,
            ?source,
            "Variable updated"
        );
        let _ = self.changes.send(VariableChange {
            component: selector.component.clone(),
            variable: selector.variable.clone(),
            value: value.to_string(),
            source,
        });
        Ok(Ok(()))
    }

    /// Full dump for GetBaseReport / GetReport.
    pub async fn get_device_model(&self) -> DomainResult<Vec<VariableAttribute>> {
        self.repo.list_all().await
    }

    /// Convenience: the integer Actual value of a standard variable.
    pub async fn integer_of(&self, component: &str, variable: &str) -> DomainResult<Option<i64>> {
        let selector = VariableSelector::actual(component, variable);
        Ok(self
            .repo
            .get_attribute(&selector)
            .await?
            .and_then(|a| a.value)
            .and_then(|v| v.parse().ok()))
    }

    // Monitors

    pub async fn set_monitoring_data(
        &self,
        monitor: &VariableMonitor,
        id: Option<i32>,
    ) -> DomainResult<i32> {
        self.repo.upsert_monitor(monitor, id).await
    }

    pub async fn get_monitoring_data(
        &self,
        criteria: &MonitorCriteria,
    ) -> DomainResult<Vec<VariableMonitor>> {
        self.repo.list_monitors(criteria).await
    }

    pub async fn clear_variable_monitor(&self, id: i32) -> DomainResult<bool> {
        self.repo.delete_monitor(id).await
    }
}

fn validate_value(attribute: &VariableAttribute, value: &str) -> Result<(), SetRejection> {
    match attribute.data_type {
        DataEnumType::String => Ok(()),
        DataEnumType::Integer => value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| SetRejection::InvalidValue(value.to_string())),
        DataEnumType::Decimal => value
            .parse::<f64>()
            .map(|_| ())
            .map_err(|_| SetRejection::InvalidValue(value.to_string())),
        DataEnumType::Boolean => match value {
            "true" | "false" => Ok(()),
            _ => Err(SetRejection::InvalidValue(value.to_string())),
        },
        DataEnumType::Datetime => DateTime::parse_from_rfc3339(value)
            .map(|_| ())
            .map_err(|_| SetRejection::InvalidValue(value.to_string())),
        DataEnumType::OptionList | DataEnumType::MemberList => {
            let allowed = attribute.values_list.as_deref().unwrap_or(&[]);
            if allowed.iter().any(|m| m == value) {
                Ok(())
            } else {
                Err(SetRejection::NotInValuesList(value.to_string()))
            }
        }
        DataEnumType::SequenceList => {
            let allowed = attribute.values_list.as_deref().unwrap_or(&[]);
            if allowed.is_empty() {
                return Ok(());
            }
            for member in value.split(',').map(str::trim) {
                if !allowed.iter().any(|m| m == member) {
                    return Err(SetRejection::NotInValuesList(member.to_string()));
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::repositories::SeaOrmDeviceModelRepository;
    use crate::infrastructure::database::{init_database, DatabaseConfig};

    async fn model() -> DeviceModel {
        let db = init_database(&DatabaseConfig::in_memory()).await.unwrap();
        DeviceModel::new(Arc::new(SeaOrmDeviceModelRepository::new(db)))
    }

    async fn model_with(attribute: VariableAttribute) -> DeviceModel {
        let model = model().await;
        model.repo.upsert_attribute(&attribute).await.unwrap();
        model
    }

    fn integer_attr(component: &str, variable: &str, value: &str) -> VariableAttribute {
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
    async fn seeding_does_not_clobber_existing_values() {
        let model =
            model_with(integer_attr("OCPPCommCtrlr", "HeartbeatInterval", "120")).await;
        model
            .seed_standard_variables(&StationConfig::default())
            .await
            .unwrap();
        assert_eq!(
            model.integer_of("OCPPCommCtrlr", "HeartbeatInterval").await.unwrap(),
            Some(120)
        );
        // Unseeded ones appear.
        assert!(model
            .integer_of("AlignedDataCtrlr", "Interval")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn type_mismatch_is_rejected() {
        let model = model_with(integer_attr("OCPPCommCtrlr", "HeartbeatInterval", "300")).await;
        let selector = VariableSelector::actual("OCPPCommCtrlr", "HeartbeatInterval");

        let verdict = model
            .set_variable_attribute_value(&selector, "fast", SetSource::Csms)
            .await
            .unwrap();
        assert!(matches!(verdict, Err(SetRejection::InvalidValue(_))));

        let verdict = model
            .set_variable_attribute_value(&selector, "60", SetSource::Csms)
            .await
            .unwrap();
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn read_only_binds_the_csms_but_not_internal_sets() {
        let mut attr = integer_attr("AuthCacheCtrlr", "Storage", "1048576");
        attr.mutability = MutabilityEnumType::ReadOnly;
        let model = model_with(attr).await;
        let selector = VariableSelector::actual("AuthCacheCtrlr", "Storage");

        let verdict = model
            .set_variable_attribute_value(&selector, "2048", SetSource::Csms)
            .await
            .unwrap();
        assert_eq!(verdict, Err(SetRejection::ReadOnly));

        let verdict = model
            .set_variable_attribute_value(&selector, "2048", SetSource::Internal)
            .await
            .unwrap();
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn option_list_membership_is_enforced() {
        let attr = VariableAttribute {
            selector: VariableSelector::actual("TxCtrlr", "TxStartPoint"),
            value: Some("PowerPathClosed".to_string()),
            mutability: MutabilityEnumType::ReadWrite,
            data_type: DataEnumType::OptionList,
            values_list: Some(vec![
                "EVConnected".to_string(),
                "Authorized".to_string(),
                "PowerPathClosed".to_string(),
            ]),
            unit: None,
        };
        let model = model_with(attr).await;
        let selector = VariableSelector::actual("TxCtrlr", "TxStartPoint");

        let verdict = model
            .set_variable_attribute_value(&selector, "OnTheMoon", SetSource::Csms)
            .await
            .unwrap();
        assert!(matches!(verdict, Err(SetRejection::NotInValuesList(_))));

        let verdict = model
            .set_variable_attribute_value(&selector, "Authorized", SetSource::Csms)
            .await
            .unwrap();
        assert!(verdict.is_ok());
    }

    #[tokio::test]
    async fn unknown_variable_is_reported() {
        let model = model().await;
        let selector = VariableSelector::actual("NoSuch", "Thing");
        let verdict = model
            .set_variable_attribute_value(&selector, "1", SetSource::Csms)
            .await
            .unwrap();
        assert_eq!(verdict, Err(SetRejection::UnknownVariable));
    }

    #[tokio::test]
    async fn successful_set_notifies_subscribers() {
        let model = model_with(integer_attr("OCPPCommCtrlr", "HeartbeatInterval", "300")).await;
        let mut changes = model.subscribe();

        let selector = VariableSelector::actual("OCPPCommCtrlr", "HeartbeatInterval");
        model
            .set_variable_attribute_value(&selector, "60", SetSource::Csms)
            .await
            .unwrap()
            .unwrap();

        let change = changes.recv().await.unwrap();
        assert_eq!(change.variable, "HeartbeatInterval");
        assert_eq!(change.value, "60");
        assert_eq!(change.source, SetSource::Csms);
    }
}
