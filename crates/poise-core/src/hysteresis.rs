//! Dwell-time trigger for automatic capture.
//!
//! A capture fires only after `Perfect` has held for the whole dwell
//! threshold without interruption, and at most once until re-armed.

use crate::types::AlignmentStatus;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HysteresisState {
    pub current_status: AlignmentStatus,
    /// Contiguous time spent in `Perfect`.
    pub dwell_ms: u64,
    /// Cleared once the trigger fires.
    pub armed: bool,
}

impl Default for HysteresisState {
    fn default() -> Self {
        Self {
            current_status: AlignmentStatus::Initializing,
            dwell_ms: 0,
            armed: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// Status is not `Perfect`; dwell was reset.
    Waiting,
    /// `Perfect` is holding but the threshold is not reached yet.
    Dwelling { dwell_ms: u64, remaining_ms: u64 },
    /// Threshold reached on this tick. Emitted once per arming.
    Fired,
    /// Already fired; no further automatic capture.
    Latched,
}

pub struct HysteresisTrigger {
    state: HysteresisState,
    tick_ms: u64,
    threshold_ms: u64,
}

impl HysteresisTrigger {
    /// `tick` is the sampling interval credited per `Perfect` observation.
    pub fn new(tick: Duration, threshold: Duration) -> Self {
        Self {
            state: HysteresisState::default(),
            tick_ms: tick.as_millis() as u64,
            threshold_ms: threshold.as_millis() as u64,
        }
    }

    pub fn state(&self) -> &HysteresisState {
        &self.state
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// Feed one evaluated status.
    pub fn observe(&mut self, status: AlignmentStatus) -> TriggerEvent {
        self.state.current_status = status;

        if status != AlignmentStatus::Perfect {
            self.state.dwell_ms = 0;
            return if self.state.armed {
                TriggerEvent::Waiting
            } else {
                TriggerEvent::Latched
            };
        }

        if !self.state.armed {
            return TriggerEvent::Latched;
        }

        self.state.dwell_ms += self.tick_ms;
        if self.state.dwell_ms >= self.threshold_ms {
            self.state.armed = false;
            tracing::debug!(dwell_ms = self.state.dwell_ms, "auto-capture trigger fired");
            TriggerEvent::Fired
        } else {
            TriggerEvent::Dwelling {
                dwell_ms: self.state.dwell_ms,
                remaining_ms: self.threshold_ms - self.state.dwell_ms,
            }
        }
    }

    /// Re-arm for a retake.
    pub fn reset(&mut self) {
        self.state = HysteresisState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use AlignmentStatus::{OffCenter, Perfect};

    fn trigger() -> HysteresisTrigger {
        HysteresisTrigger::new(Duration::from_millis(100), Duration::from_millis(2000))
    }

    fn fire_count(trigger: &mut HysteresisTrigger, statuses: &[AlignmentStatus]) -> usize {
        statuses
            .iter()
            .filter(|&&s| trigger.observe(s) == TriggerEvent::Fired)
            .count()
    }

    #[test]
    fn test_interrupted_run_does_not_fire() {
        let mut t = trigger();
        let seq = [Perfect, Perfect, OffCenter, Perfect, Perfect, Perfect];
        assert_eq!(fire_count(&mut t, &seq), 0);
        assert_eq!(t.state().dwell_ms, 300);
        assert!(t.state().armed);
    }

    #[test]
    fn test_twenty_contiguous_perfect_fires_once() {
        let mut t = trigger();
        for i in 0..19 {
            assert!(matches!(t.observe(Perfect), TriggerEvent::Dwelling { .. }), "tick {i}");
        }
        assert_eq!(t.observe(Perfect), TriggerEvent::Fired);
        assert!(!t.state().armed);
    }

    #[test]
    fn test_latch_prevents_second_fire() {
        let mut t = trigger();
        assert_eq!(fire_count(&mut t, &[Perfect; 20]), 1);
        assert_eq!(fire_count(&mut t, &[Perfect; 100]), 0);
        // An interruption does not re-arm either.
        assert_eq!(fire_count(&mut t, &[OffCenter]), 0);
        assert_eq!(fire_count(&mut t, &[Perfect; 40]), 0);
    }

    #[test]
    fn test_dwell_resets_on_any_non_perfect() {
        let mut t = trigger();
        fire_count(&mut t, &[Perfect; 15]);
        assert_eq!(t.state().dwell_ms, 1500);
        t.observe(AlignmentStatus::Tilted);
        assert_eq!(t.state().dwell_ms, 0);
        assert_eq!(t.state().current_status, AlignmentStatus::Tilted);
        // A full fresh run is needed after the interruption.
        assert_eq!(fire_count(&mut t, &[Perfect; 19]), 0);
        assert_eq!(fire_count(&mut t, &[Perfect]), 1);
    }

    #[test]
    fn test_reset_rearms() {
        let mut t = trigger();
        fire_count(&mut t, &[Perfect; 20]);
        t.reset();
        assert_eq!(t.state(), &HysteresisState::default());
        assert_eq!(fire_count(&mut t, &[Perfect; 20]), 1);
    }

    #[test]
    fn test_dwelling_reports_remaining() {
        let mut t = trigger();
        assert_eq!(
            t.observe(Perfect),
            TriggerEvent::Dwelling { dwell_ms: 100, remaining_ms: 1900 }
        );
    }
}
