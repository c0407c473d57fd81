// src/engine/timer.rs

use chrono::{DateTime, Duration, Utc};

use crate::engine::navigator::MODULE_SLOTS;

/// Countdown durations per module slot. The two verbal slots share one
/// duration, the two quantitative slots another.
#[derive(Debug, Clone, Copy)]
pub struct ModuleDurations {
    verbal: Duration,
    quant: Duration,
}

impl ModuleDurations {
    pub fn from_minutes(verbal: u32, quant: u32) -> Self {
        Self {
            verbal: Duration::minutes(i64::from(verbal)),
            quant: Duration::minutes(i64::from(quant)),
        }
    }

    pub fn for_slot(&self, slot: usize) -> Duration {
        debug_assert!(slot < MODULE_SLOTS);
        if slot < 2 { self.verbal } else { self.quant }
    }
}

/// One countdown per module. Time is injected at every call site, so
/// expiry is a deterministic function of the start instant rather than
/// a background tick that has to be cancelled.
///
/// Stopping is a real stop, not a hide: a stopped timer can never
/// report expiry again, which is what keeps the forced module finish a
/// one-shot transition.
#[derive(Debug, Clone)]
pub struct ModuleTimer {
    duration: Duration,
    started_at: Option<DateTime<Utc>>,
}

impl ModuleTimer {
    pub fn new() -> Self {
        Self {
            duration: Duration::zero(),
            started_at: None,
        }
    }

    /// Arm the countdown for a freshly entered module.
    pub fn start(&mut self, duration: Duration, now: DateTime<Utc>) {
        self.duration = duration;
        self.started_at = Some(now);
    }

    pub fn stop(&mut self) {
        self.started_at = None;
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Remaining time, clamped at zero. A stopped timer reads as zero.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        match self.started_at {
            Some(started) => {
                let left = self.duration - (now - started);
                if left < Duration::zero() {
                    Duration::zero()
                } else {
                    left
                }
            }
            None => Duration::zero(),
        }
    }

    /// True only while running: a stopped timer cannot expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.is_running() && self.remaining(now) == Duration::zero()
    }

    /// `MM:SS` for the rendered pane.
    pub fn display(&self, now: DateTime<Utc>) -> String {
        let secs = self.remaining(now).num_seconds();
        format!("{:02}:{:02}", secs / 60, secs % 60)
    }
}

impl Default for ModuleTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn counts_down_and_clamps_at_zero() {
        let mut timer = ModuleTimer::new();
        timer.start(Duration::minutes(32), at(0));

        assert_eq!(timer.remaining(at(0)), Duration::minutes(32));
        assert_eq!(timer.display(at(95)), "30:25");
        assert_eq!(timer.remaining(at(32 * 60 + 50)), Duration::zero());
        assert!(timer.is_expired(at(32 * 60)));
    }

    #[test]
    fn stopped_timer_never_expires() {
        let mut timer = ModuleTimer::new();
        timer.start(Duration::minutes(1), at(0));
        assert!(timer.is_expired(at(120)));

        timer.stop();
        assert!(!timer.is_expired(at(120)));
        assert_eq!(timer.display(at(120)), "00:00");
    }

    #[test]
    fn durations_split_by_section() {
        let d = ModuleDurations::from_minutes(32, 35);
        assert_eq!(d.for_slot(0), Duration::minutes(32));
        assert_eq!(d.for_slot(1), Duration::minutes(32));
        assert_eq!(d.for_slot(2), Duration::minutes(35));
        assert_eq!(d.for_slot(3), Duration::minutes(35));
    }
}
