//! Smart charging composer
//!
//! Computes the composite charging schedule for a window and EVSE by
//! expanding every installed profile into absolute time segments,
//! taking at each instant the limit of the highest-stack-level valid
//! profile (later install wins a tie), and capping the result with
//! any valid ChargingStationMax profile. Instants covered by no
//! profile yield an explicit zero limit.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_ocpp::v2_0_1::enumerations::charging_profile_kind_enum_type::ChargingProfileKindEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_profile_purpose_enum_type::ChargingProfilePurposeEnumType;
use rust_ocpp::v2_0_1::enumerations::charging_rate_unit_enum_type::ChargingRateUnitEnumType;
use rust_ocpp::v2_0_1::enumerations::recurrency_kind_enum_type::RecurrencyKindEnumType;

use crate::domain::charging_profile::{SchedulePeriodSpec, StoredChargingProfile};

/// Line voltage assumed for A↔W conversion.
const VOLTS_PER_PHASE: f64 = 230.0;
/// Phase count assumed when a period does not state one.
const DEFAULT_NUMBER_PHASES: i32 = 3;

// ── Public types ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub evse_id: i32,
    /// Requested unit; defaults to Watts.
    pub unit: Option<ChargingRateUnitEnumType>,
}

/// An active transaction the Relative/Tx rules anchor to.
#[derive(Debug, Clone)]
pub struct ActiveTransactionRef {
    pub transaction_id: String,
    pub start_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeSchedule {
    pub start_schedule: DateTime<Utc>,
    pub duration_s: i64,
    pub rate_unit: ChargingRateUnitEnumType,
    pub periods: Vec<SchedulePeriodSpec>,
}

/// Convert a limit between A and W. Amp limits are per phase; watt
/// limits are total, so the phase count participates both ways.
pub fn convert_limit(
    limit: f64,
    number_phases: Option<i32>,
    from: &ChargingRateUnitEnumType,
    to: &ChargingRateUnitEnumType,
) -> f64 {
    let phases = number_phases.unwrap_or(DEFAULT_NUMBER_PHASES) as f64;
    match (from, to) {
        (ChargingRateUnitEnumType::A, ChargingRateUnitEnumType::W) => {
            limit * phases * VOLTS_PER_PHASE
        }
        (ChargingRateUnitEnumType::W, ChargingRateUnitEnumType::A) => {
            limit / (phases * VOLTS_PER_PHASE)
        }
        _ => limit,
    }
}

// ── Composer ───────────────────────────────────────────────────

pub struct SmartChargingComposer;

impl SmartChargingComposer {
    /// Compose the schedule for `request` from the profiles installed
    /// for its EVSE (station-wide rows included by the caller).
    pub fn composite_schedule(
        profiles: &[StoredChargingProfile],
        active_tx: Option<&ActiveTransactionRef>,
        request: &CompositeRequest,
    ) -> CompositeSchedule {
        let unit = request
            .unit
            .clone()
            .unwrap_or(ChargingRateUnitEnumType::W);

        let mut limiting: Vec<Segment> = Vec::new();
        let mut capping: Vec<Segment> = Vec::new();
        for profile in profiles {
            let segments = expand_profile(profile, active_tx, request);
            match profile.purpose {
                ChargingProfilePurposeEnumType::ChargingStationMaxProfile => {
                    capping.extend(segments)
                }
                _ => limiting.extend(segments),
            }
        }

        // Elementary intervals between all segment boundaries.
        let mut boundaries: Vec<DateTime<Utc>> = vec![request.start, request.end];
        for segment in limiting.iter().chain(capping.iter()) {
            if segment.start > request.start && segment.start < request.end {
                boundaries.push(segment.start);
            }
            if segment.end > request.start && segment.end < request.end {
                boundaries.push(segment.end);
            }
        }
        boundaries.sort_unstable();
        boundaries.dedup();

        let mut periods: Vec<SchedulePeriodSpec> = Vec::new();
        for window in boundaries.windows(2) {
            let from = window[0];
            // A segment covers the interval iff it covers its start
            // (boundaries cut at every segment edge).
            let winner = limiting
                .iter()
                .filter(|s| s.covers(from))
                .max_by(|a, b| {
                    a.stack_level
                        .cmp(&b.stack_level)
                        .then(a.installed_at.cmp(&b.installed_at))
                });

            let (mut limit, number_phases) = match winner {
                Some(segment) => (
                    convert_limit(segment.limit, segment.number_phases, &segment.unit, &unit),
                    segment.number_phases,
                ),
                None => (0.0, None),
            };

            // ChargingStationMax is an upper bound on whatever won.
            for cap in capping.iter().filter(|s| s.covers(from)) {
                let cap_limit = convert_limit(cap.limit, cap.number_phases, &cap.unit, &unit);
                if cap_limit < limit {
                    limit = cap_limit;
                }
            }

            let start_period = (from - request.start).num_seconds();
            match periods.last() {
                Some(last) if last.limit == limit && last.number_phases == number_phases => {}
                _ => periods.push(SchedulePeriodSpec {
                    start_period,
                    limit,
                    number_phases,
                }),
            }
        }

        if periods.is_empty() {
            periods.push(SchedulePeriodSpec {
                start_period: 0,
                limit: 0.0,
                number_phases: None,
            });
        }

        CompositeSchedule {
            start_schedule: request.start,
            duration_s: (request.end - request.start).num_seconds(),
            rate_unit: unit,
            periods,
        }
    }
}

// ── Segment expansion ──────────────────────────────────────────

#[derive(Debug, Clone)]
struct Segment {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: f64,
    unit: ChargingRateUnitEnumType,
    number_phases: Option<i32>,
    stack_level: i32,
    installed_at: DateTime<Utc>,
}

impl Segment {
    fn covers(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

/// Expand one profile into absolute segments intersected with the
/// request window and the profile's validity window.
fn expand_profile(
    profile: &StoredChargingProfile,
    active_tx: Option<&ActiveTransactionRef>,
    request: &CompositeRequest,
) -> Vec<Segment> {
    // Validity window, clipped onto the request window.
    let mut window_start = request.start;
    let mut window_end = request.end;
    if let Some(from) = profile.valid_from {
        window_start = window_start.max(from);
    }
    if let Some(to) = profile.valid_to {
        window_end = window_end.min(to);
    }
    if window_start >= window_end {
        return Vec::new();
    }

    // Tx profiles only bind while their transaction runs here.
    if profile.purpose == ChargingProfilePurposeEnumType::TxProfile {
        let bound = active_tx.map_or(false, |tx| {
            profile.transaction_id.as_deref() == Some(tx.transaction_id.as_str())
        });
        if !bound {
            return Vec::new();
        }
    }

    match profile.kind {
        ChargingProfileKindEnumType::Absolute => {
            let anchor = profile
                .schedule
                .start_schedule
                .or(profile.valid_from)
                .unwrap_or(request.start);
            expand_once(profile, anchor, window_start, window_end, profile.valid_to)
        }
        ChargingProfileKindEnumType::Relative => {
            let anchor = active_tx
                .map(|tx| tx.start_time)
                .unwrap_or(request.start);
            expand_once(profile, anchor, window_start, window_end, profile.valid_to)
        }
        ChargingProfileKindEnumType::Recurring => {
            let Some(anchor0) = profile.schedule.start_schedule else {
                return Vec::new();
            };
            let period = match profile.recurrency_kind {
                Some(RecurrencyKindEnumType::Weekly) => ChronoDuration::days(7),
                _ => ChronoDuration::days(1),
            };

            // First occurrence whose recurrence window can reach the
            // request window.
            let period_s = period.num_seconds();
            let offset = (window_start - anchor0).num_seconds();
            let k = if offset >= 0 {
                offset / period_s
            } else {
                // Before the first occurrence nothing applies.
                -((-offset + period_s - 1) / period_s)
            };

            let mut segments = Vec::new();
            let mut occurrence = anchor0 + ChronoDuration::seconds(k.max(0) * period_s);
            if anchor0 > window_end {
                return Vec::new();
            }
            while occurrence < window_end {
                if occurrence >= anchor0 {
                    // Within one occurrence the schedule runs at most
                    // to the next occurrence.
                    let recurrence_end = occurrence + period;
                    segments.extend(expand_once(
                        profile,
                        occurrence,
                        window_start,
                        window_end.min(recurrence_end),
                        Some(recurrence_end),
                    ));
                }
                occurrence = occurrence + period;
            }
            segments
        }
    }
}

/// Lay the schedule's periods out from `anchor`, clipping every
/// segment to `[clip_start, clip_end]`. A missing duration extends the
/// last period to `default_end` (valid_to or the recurrence window
/// end) or to the clip end.
fn expand_once(
    profile: &StoredChargingProfile,
    anchor: DateTime<Utc>,
    clip_start: DateTime<Utc>,
    clip_end: DateTime<Utc>,
    default_end: Option<DateTime<Utc>>,
) -> Vec<Segment> {
    let schedule = &profile.schedule;
    let schedule_end = match schedule.duration {
        Some(duration_s) => anchor + ChronoDuration::seconds(duration_s),
        None => default_end.unwrap_or(clip_end),
    };

    let periods = &schedule.charging_schedule_period;
    let mut segments = Vec::new();
    for (i, period) in periods.iter().enumerate() {
        let start = anchor + ChronoDuration::seconds(period.start_period);
        let end = match periods.get(i + 1) {
            Some(next) => anchor + ChronoDuration::seconds(next.start_period),
            None => schedule_end,
        };
        let start = start.max(clip_start);
        let end = end.min(schedule_end).min(clip_end);
        if start >= end {
            continue;
        }
        segments.push(Segment {
            start,
            end,
            limit: period.limit,
            unit: schedule.charging_rate_unit.clone(),
            number_phases: period.number_phases,
            stack_level: profile.stack_level,
            installed_at: profile.installed_at,
        });
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::charging_profile::ChargingScheduleSpec;
    use chrono::TimeZone;

    fn t(spec: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(spec).unwrap().with_timezone(&Utc)
    }

    fn profile(
        profile_id: i32,
        stack_level: i32,
        unit: ChargingRateUnitEnumType,
        periods: Vec<(i64, f64, Option<i32>)>,
    ) -> StoredChargingProfile {
        StoredChargingProfile {
            profile_id,
            evse_id: 1,
            stack_level,
            purpose: ChargingProfilePurposeEnumType::TxDefaultProfile,
            kind: ChargingProfileKindEnumType::Absolute,
            recurrency_kind: None,
            valid_from: None,
            valid_to: None,
            transaction_id: None,
            schedule: ChargingScheduleSpec {
                charging_rate_unit: unit,
                duration: None,
                start_schedule: None,
                min_charging_rate: None,
                charging_schedule_period: periods
                    .into_iter()
                    .map(|(start_period, limit, number_phases)| SchedulePeriodSpec {
                        start_period,
                        limit,
                        number_phases,
                    })
                    .collect(),
            },
            installed_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn request(start: &str, end: &str, unit: ChargingRateUnitEnumType) -> CompositeRequest {
        CompositeRequest {
            start: t(start),
            end: t(end),
            evse_id: 1,
            unit: Some(unit),
        }
    }

    #[test]
    fn empty_profile_set_yields_zero_period() {
        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T00:10:00Z",
            ChargingRateUnitEnumType::W,
        );
        let composite = SmartChargingComposer::composite_schedule(&[], None, &req);
        assert_eq!(composite.duration_s, 600);
        assert_eq!(composite.start_schedule, req.start);
        assert_eq!(
            composite.periods,
            vec![SchedulePeriodSpec {
                start_period: 0,
                limit: 0.0,
                number_phases: None
            }]
        );
    }

    #[test]
    fn highest_stack_level_wins_with_unit_conversion() {
        // A: stack 1, 2000 W. B: stack 2, 32 A on 3 phases.
        let a = profile(1, 1, ChargingRateUnitEnumType::W, vec![(0, 2000.0, None)]);
        let b = profile(2, 2, ChargingRateUnitEnumType::A, vec![(0, 32.0, Some(3))]);

        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T00:10:00Z",
            ChargingRateUnitEnumType::W,
        );
        let composite = SmartChargingComposer::composite_schedule(&[a, b], None, &req);

        assert_eq!(composite.periods.len(), 1);
        assert_eq!(composite.periods[0].start_period, 0);
        // 32 A · 3 phases · 230 V = 22080 W.
        assert_eq!(composite.periods[0].limit, 22080.0);
    }

    #[test]
    fn station_max_caps_the_winner() {
        let tx_default = profile(1, 3, ChargingRateUnitEnumType::A, vec![(0, 32.0, Some(3))]);
        let mut station_max =
            profile(2, 0, ChargingRateUnitEnumType::A, vec![(0, 16.0, Some(3))]);
        station_max.purpose = ChargingProfilePurposeEnumType::ChargingStationMaxProfile;

        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T01:00:00Z",
            ChargingRateUnitEnumType::A,
        );
        let composite =
            SmartChargingComposer::composite_schedule(&[tx_default, station_max], None, &req);
        assert_eq!(composite.periods.len(), 1);
        assert_eq!(composite.periods[0].limit, 16.0);
    }

    #[test]
    fn daily_recurring_crosses_midnight_contiguously() {
        // Started 2024-01-01T08:00Z: 32 A for 10 h, then 7 A for the
        // rest of each day.
        let mut p = profile(
            1,
            1,
            ChargingRateUnitEnumType::A,
            vec![(0, 32.0, None), (36_000, 7.0, None)],
        );
        p.kind = ChargingProfileKindEnumType::Recurring;
        p.recurrency_kind = Some(RecurrencyKindEnumType::Daily);
        p.schedule.start_schedule = Some(t("2024-01-01T08:00:00Z"));

        let req = request(
            "2024-01-02T07:55:00Z",
            "2024-01-02T08:05:00Z",
            ChargingRateUnitEnumType::A,
        );
        let composite = SmartChargingComposer::composite_schedule(&[p], None, &req);

        assert_eq!(
            composite.periods,
            vec![
                SchedulePeriodSpec {
                    start_period: 0,
                    limit: 7.0,
                    number_phases: None
                },
                SchedulePeriodSpec {
                    start_period: 300,
                    limit: 32.0,
                    number_phases: None
                },
            ]
        );
    }

    #[test]
    fn recurring_before_first_occurrence_is_uncovered() {
        let mut p = profile(1, 1, ChargingRateUnitEnumType::A, vec![(0, 32.0, None)]);
        p.kind = ChargingProfileKindEnumType::Recurring;
        p.recurrency_kind = Some(RecurrencyKindEnumType::Daily);
        p.schedule.start_schedule = Some(t("2024-06-01T08:00:00Z"));

        let req = request(
            "2024-01-02T07:00:00Z",
            "2024-01-02T09:00:00Z",
            ChargingRateUnitEnumType::A,
        );
        let composite = SmartChargingComposer::composite_schedule(&[p], None, &req);
        assert_eq!(composite.periods.len(), 1);
        assert_eq!(composite.periods[0].limit, 0.0);
    }

    #[test]
    fn tx_profile_requires_matching_active_transaction() {
        let mut p = profile(1, 5, ChargingRateUnitEnumType::A, vec![(0, 10.0, None)]);
        p.purpose = ChargingProfilePurposeEnumType::TxProfile;
        p.transaction_id = Some("txn-1".into());

        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T00:10:00Z",
            ChargingRateUnitEnumType::A,
        );

        let without = SmartChargingComposer::composite_schedule(
            std::slice::from_ref(&p),
            None,
            &req,
        );
        assert_eq!(without.periods[0].limit, 0.0);

        let other_tx = ActiveTransactionRef {
            transaction_id: "txn-2".into(),
            start_time: req.start,
        };
        let mismatched = SmartChargingComposer::composite_schedule(
            std::slice::from_ref(&p),
            Some(&other_tx),
            &req,
        );
        assert_eq!(mismatched.periods[0].limit, 0.0);

        let own_tx = ActiveTransactionRef {
            transaction_id: "txn-1".into(),
            start_time: req.start,
        };
        let bound =
            SmartChargingComposer::composite_schedule(&[p], Some(&own_tx), &req);
        assert_eq!(bound.periods[0].limit, 10.0);
    }

    #[test]
    fn relative_profile_anchors_at_transaction_start() {
        // 16 A for the first hour of the transaction, 8 A afterwards.
        let mut p = profile(
            1,
            1,
            ChargingRateUnitEnumType::A,
            vec![(0, 16.0, None), (3600, 8.0, None)],
        );
        p.kind = ChargingProfileKindEnumType::Relative;

        let tx = ActiveTransactionRef {
            transaction_id: "txn-1".into(),
            start_time: t("2025-01-01T00:30:00Z"),
        };
        let req = request(
            "2025-01-01T01:00:00Z",
            "2025-01-01T02:00:00Z",
            ChargingRateUnitEnumType::A,
        );
        let composite = SmartChargingComposer::composite_schedule(&[p], Some(&tx), &req);

        // Transaction minute 30-60 still at 16 A, then 8 A.
        assert_eq!(
            composite.periods,
            vec![
                SchedulePeriodSpec {
                    start_period: 0,
                    limit: 16.0,
                    number_phases: None
                },
                SchedulePeriodSpec {
                    start_period: 1800,
                    limit: 8.0,
                    number_phases: None
                },
            ]
        );
    }

    #[test]
    fn validity_window_excludes_profiles() {
        let mut p = profile(1, 1, ChargingRateUnitEnumType::A, vec![(0, 32.0, None)]);
        p.valid_to = Some(t("2024-12-31T00:00:00Z"));

        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T00:10:00Z",
            ChargingRateUnitEnumType::A,
        );
        let composite = SmartChargingComposer::composite_schedule(&[p], None, &req);
        assert_eq!(composite.periods[0].limit, 0.0);
    }

    #[test]
    fn equal_stack_tie_goes_to_latest_install() {
        let mut older = profile(1, 2, ChargingRateUnitEnumType::A, vec![(0, 10.0, None)]);
        older.installed_at = t("2024-01-01T00:00:00Z");
        let mut newer = profile(2, 2, ChargingRateUnitEnumType::A, vec![(0, 20.0, None)]);
        newer.installed_at = t("2024-06-01T00:00:00Z");

        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T00:10:00Z",
            ChargingRateUnitEnumType::A,
        );
        let composite = SmartChargingComposer::composite_schedule(&[older, newer], None, &req);
        assert_eq!(composite.periods[0].limit, 20.0);
    }

    #[test]
    fn bounded_duration_uncovers_the_tail() {
        let mut p = profile(1, 1, ChargingRateUnitEnumType::W, vec![(0, 11000.0, None)]);
        p.schedule.duration = Some(300);
        p.schedule.start_schedule = Some(t("2025-01-01T00:00:00Z"));

        let req = request(
            "2025-01-01T00:00:00Z",
            "2025-01-01T00:10:00Z",
            ChargingRateUnitEnumType::W,
        );
        let composite = SmartChargingComposer::composite_schedule(&[p], None, &req);
        assert_eq!(
            composite.periods,
            vec![
                SchedulePeriodSpec {
                    start_period: 0,
                    limit: 11000.0,
                    number_phases: None
                },
                SchedulePeriodSpec {
                    start_period: 300,
                    limit: 0.0,
                    number_phases: None
                },
            ]
        );
    }

    #[test]
    fn watts_convert_to_amps() {
        assert_eq!(
            convert_limit(
                22080.0,
                Some(3),
                &ChargingRateUnitEnumType::W,
                &ChargingRateUnitEnumType::A
            ),
            32.0
        );
        // Default phase count is 3.
        assert_eq!(
            convert_limit(
                6900.0,
                None,
                &ChargingRateUnitEnumType::W,
                &ChargingRateUnitEnumType::A
            ),
            10.0
        );
    }
}
