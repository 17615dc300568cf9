//! Timer wheel for the protocol task
//!
//! All timers live here as `(deadline, TimerId)` pairs; the protocol
//! loop sleeps until the earliest deadline and handles whatever is
//! due. Clock-aligned deadlines are computed in UTC so alignment
//! survives process suspension.

use chrono::{DateTime, Duration as ChronoDuration, DurationRound, Utc};
use std::time::Duration;
use tokio::time::Instant;

use super::events::TimerId;

#[derive(Default)]
pub struct TimerWheel {
    entries: Vec<(Instant, TimerId)>,
}

impl TimerWheel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer, replacing any pending entry with the same id.
    pub fn arm(&mut self, id: TimerId, after: Duration) {
        self.cancel(&id);
        self.entries.push((Instant::now() + after, id));
    }

    pub fn cancel(&mut self, id: &TimerId) {
        self.entries.retain(|(_, entry)| entry != id);
    }

    pub fn cancel_call_timeouts(&mut self) {
        self.entries
            .retain(|(_, entry)| !matches!(entry, TimerId::CallTimeout { .. }));
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.entries.iter().map(|(at, _)| *at).min()
    }

    /// Remove and return every timer due at `now`.
    pub fn pop_due(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due = Vec::new();
        self.entries.retain(|(at, id)| {
            if *at <= now {
                due.push(id.clone());
                false
            } else {
                true
            }
        });
        due
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Seconds until the next clock-aligned tick: deadlines sit at
/// `k * interval` from the UTC epoch, so ticks coincide across EVSEs
/// and across restarts.
pub fn until_next_aligned(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_s = interval.as_secs().max(1) as i64;
    let step = ChronoDuration::seconds(interval_s);
    // duration_trunc on a UTC timestamp floors onto the epoch grid.
    let floored = now.duration_trunc(step).unwrap_or(now);
    let next = floored + step;
    (next - now)
        .to_std()
        .unwrap_or_else(|_| Duration::from_secs(interval_s as u64))
}

/// Seconds until the next session-relative tick: deadlines sit at
/// `t0 + k * interval`, rounded onto whole UTC seconds.
pub fn until_next_session_tick(
    now: DateTime<Utc>,
    t0: DateTime<Utc>,
    interval: Duration,
) -> Duration {
    let interval_s = interval.as_secs().max(1) as i64;
    let elapsed = (now - t0).num_seconds().max(0);
    let k = elapsed / interval_s + 1;
    let next = t0 + ChronoDuration::seconds(k * interval_s);
    (next - now)
        .to_std()
        .unwrap_or_else(|_| Duration::from_secs(interval_s as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn arm_replaces_same_id() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerId::Heartbeat, Duration::from_secs(30));
        wheel.arm(TimerId::Heartbeat, Duration::from_secs(60));
        assert_eq!(wheel.entries.len(), 1);
    }

    #[test]
    fn distinct_call_timeouts_coexist() {
        let mut wheel = TimerWheel::new();
        wheel.arm(
            TimerId::CallTimeout {
                unique_id: "a".into(),
            },
            Duration::from_secs(30),
        );
        wheel.arm(
            TimerId::CallTimeout {
                unique_id: "b".into(),
            },
            Duration::from_secs(30),
        );
        assert_eq!(wheel.entries.len(), 2);

        wheel.cancel_call_timeouts();
        assert!(wheel.is_empty());
    }

    #[test]
    fn pop_due_removes_only_expired() {
        let mut wheel = TimerWheel::new();
        wheel.arm(TimerId::Heartbeat, Duration::from_secs(0));
        wheel.arm(TimerId::AlignedMeterValues, Duration::from_secs(3600));

        let due = wheel.pop_due(Instant::now() + Duration::from_millis(10));
        assert_eq!(due, vec![TimerId::Heartbeat]);
        assert_eq!(wheel.entries.len(), 1);
    }

    #[test]
    fn aligned_ticks_sit_on_the_epoch_grid() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 7).unwrap();
        let wait = until_next_aligned(now, Duration::from_secs(900));
        // Next quarter-hour boundary is 10:15:00, 893s away.
        assert_eq!(wait, Duration::from_secs(893));
    }

    #[test]
    fn aligned_tick_on_boundary_moves_to_next() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 15, 0).unwrap();
        let wait = until_next_aligned(now, Duration::from_secs(900));
        assert_eq!(wait, Duration::from_secs(900));
    }

    #[test]
    fn session_ticks_anchor_at_start_time() {
        let t0 = Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 42).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 10, 1, 0).unwrap();
        let wait = until_next_session_tick(now, t0, Duration::from_secs(60));
        // Next tick at 10:01:42.
        assert_eq!(wait, Duration::from_secs(42));
    }

    #[test]
    fn midnight_crossing_alignment_is_contiguous() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 23, 59, 30).unwrap();
        let wait = until_next_aligned(now, Duration::from_secs(900));
        assert_eq!(wait, Duration::from_secs(30));
    }
}
