//! Charging profile domain entity
//!
//! A stored profile keeps its schedule in the OCPP wire shape
//! (camelCase JSON) so the store column round-trips byte-identically
//! to what the CSMS installed.

use chrono::{DateTime, Utc};
use rust_ocpp::v2_0_1::enumerations::charging_profile_kind_enum_type::ChargingProfileKindEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_profile_purpose_enum_type::ChargingProfilePurposeEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_rate_unit_enum_type::ChargingRateUnitEnumType;
use rust_ocpp::v2_0_1::enumerations::recurrency_kind_enum_type::RecurrencyKindEnumType;
use serde::{Deserialize, Serialize};

use crate::support::errors::{DomainError, DomainResult};

/// An installed charging profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredChargingProfile {
    /// Profile ID from the OCPP ChargingProfile object.
    pub profile_id: i32,
    /// EVSE the profile applies to (0 = station-wide).
    pub evse_id: i32,
    /// Stack level (higher = higher priority).
    pub stack_level: i32,
    pub purpose: ChargingProfilePurposeEnumType,
    pub kind: ChargingProfileKindEnumType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recurrency_kind: Option<RecurrencyKindEnumType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<DateTime<Utc>>,
    /// Required for TxProfile; the transaction the limits belong to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    pub schedule: ChargingScheduleSpec,
    /// Install time; breaks stack-level ties (later install wins).
    pub installed_at: DateTime<Utc>,
}

/// One charging schedule in wire shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChargingScheduleSpec {
    pub charging_rate_unit: ChargingRateUnitEnumType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_schedule: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_charging_rate: Option<f64>,
    pub charging_schedule_period: Vec<SchedulePeriodSpec>,
}

/// One period within a schedule, offset-addressed from the anchor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePeriodSpec {
    pub start_period: i64,
    pub limit: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub number_phases: Option<i32>,
}

impl StoredChargingProfile {
    /// Structural checks applied before a profile is accepted:
    /// periods start at offset 0 and are strictly increasing, stack
    /// level is non-negative, TxProfile names its transaction, and
    /// Recurring profiles carry a recurrency kind plus startSchedule.
    pub fn validate(&self) -> DomainResult<()> {
        if self.stack_level < 0 {
            return Err(DomainError::Validation(format!(
                "profile {}: stackLevel must be >= 0",
                self.profile_id
            )));
        }

        let periods = &self.schedule.charging_schedule_period;
        if periods.is_empty() {
            return Err(DomainError::Validation(format!(
                "profile {}: schedule has no periods",
                self.profile_id
            )));
        }
        if periods[0].start_period != 0 {
            return Err(DomainError::Validation(format!(
                "profile {}: first period must start at 0",
                self.profile_id
            )));
        }
        for pair in periods.windows(2) {
            if pair[1].start_period <= pair[0].start_period {
                return Err(DomainError::Validation(format!(
                    "profile {}: period offsets must be strictly increasing",
                    self.profile_id
                )));
            }
        }

        if self.purpose == ChargingProfilePurposeEnumType::TxProfile
            && self.transaction_id.is_none()
        {
            return Err(DomainError::Validation(format!(
                "profile {}: TxProfile requires a transactionId",
                self.profile_id
            )));
        }

        if self.kind == ChargingProfileKindEnumType::Recurring {
            if self.recurrency_kind.is_none() {
                return Err(DomainError::Validation(format!(
                    "profile {}: Recurring profile requires a recurrencyKind",
                    self.profile_id
                )));
            }
            if self.schedule.start_schedule.is_none() {
                return Err(DomainError::Validation(format!(
                    "profile {}: Recurring profile requires a startSchedule",
                    self.profile_id
                )));
            }
        }

        Ok(())
    }

    /// Valid-from/valid-to window check (open bounds where absent).
    pub fn is_valid_at(&self, t: DateTime<Utc>) -> bool {
        if let Some(from) = self.valid_from {
            if t < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to {
            if t > to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(periods: Vec<SchedulePeriodSpec>) -> StoredChargingProfile {
        StoredChargingProfile {
            profile_id: 7,
            evse_id: 1,
            stack_level: 1,
            purpose: ChargingProfilePurposeEnumType::TxDefaultProfile,
            kind: ChargingProfileKindEnumType::Absolute,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
            schedule: ChargingScheduleSpec {
                charging_rate_unit: ChargingRateUnitEnumType::W,
                duration: None,
                start_schedule: None,
                min_charging_rate: None,
                charging_schedule_period: periods,
            },
            installed_at: Utc::now(),
        }
    }

    fn period(start: i64, limit: f64) -> SchedulePeriodSpec {
        SchedulePeriodSpec {
            start_period: start,
            limit,
            number_phases: None,
        }
    }

    #[test]
    fn valid_profile_passes() {
        let p = profile(vec![period(0, 11000.0), period(3600, 7400.0)]);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn first_period_must_start_at_zero() {
        let p = profile(vec![period(10, 11000.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn offsets_must_increase() {
        let p = profile(vec![period(0, 11000.0), period(0, 7400.0)]);
        assert!(p.validate().is_err());
    }

    #[test]
    fn tx_profile_requires_transaction_id() {
        let mut p = profile(vec![period(0, 16.0)]);
        p.purpose = ChargingProfilePurposeEnumType::TxProfile;
        assert!(p.validate().is_err());
        p.transaction_id = Some("txn-1".into());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn recurring_requires_kind_and_anchor() {
        let mut p = profile(vec![period(0, 16.0)]);
        p.kind = ChargingProfileKindEnumType::Recurring;
        assert!(p.validate().is_err());
        p.recurrency_kind = Some(RecurrencyKindEnumType::Daily);
        assert!(p.validate().is_err());
        p.schedule.start_schedule = Some(Utc::now());
        assert!(p.validate().is_ok());
    }

    #[test]
    fn validity_window_is_inclusive_with_open_bounds() {
        let now = Utc::now();
        let mut p = profile(vec![period(0, 16.0)]);
        assert!(p.is_valid_at(now));
        p.valid_from = Some(now + chrono::Duration::seconds(5));
        assert!(!p.is_valid_at(now));
        p.valid_from = Some(now);
        p.valid_to = Some(now);
        assert!(p.is_valid_at(now));
        assert!(!p.is_valid_at(now + chrono::Duration::seconds(1)));
    }

    #[test]
    fn schedule_json_is_wire_shaped() {
        let p = profile(vec![period(0, 11000.0)]);
        let json = serde_json::to_value(&p.schedule).unwrap();
        assert_eq!(json["chargingRateUnit"], "W");
        assert_eq!(json["chargingSchedulePeriod"][0]["startPeriod"], 0);
    }
}
