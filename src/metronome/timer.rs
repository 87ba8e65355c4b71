// Timers - Single-shot timer slots driving the beat and progression callbacks
// A slot is re-armed after every firing so each interval can differ from the last.

use std::time::{Duration, Instant};
use thiserror::Error;

/// Independent single-shot timers used by the scheduler
/// Ordering is the tie-break when two slots are due at the same instant:
/// a tempo step lands before the beat that shares its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TimerSlot {
    /// Seconds-based tempo progression
    Progression,
    /// Next metronome beat
    Beat,
}

impl TimerSlot {
    pub const ALL: [TimerSlot; 2] = [TimerSlot::Progression, TimerSlot::Beat];

    fn index(self) -> usize {
        match self {
            TimerSlot::Progression => 0,
            TimerSlot::Beat => 1,
        }
    }
}

/// Timer facility failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerError {
    #[error("Cannot arm {slot:?} timer: {reason}")]
    ArmFailed { slot: TimerSlot, reason: String },
}

/// Single-shot timer facility
///
/// Arming a slot that is already armed replaces its deadline. Firing is the
/// host's job: it waits for [`next_due`](TimerFacility::next_due) and then
/// hands the slot to the scheduler, which disarms it before running the callback.
pub trait TimerFacility {
    /// Arms `slot` to fire once after `delay`
    fn arm(&mut self, slot: TimerSlot, delay: Duration) -> Result<(), TimerError>;

    /// Disarms `slot`; a no-op when it is not armed
    fn cancel(&mut self, slot: TimerSlot);

    /// Time left before `slot` fires, None when not armed
    fn remaining(&self, slot: TimerSlot) -> Option<Duration>;

    /// Earliest armed slot and the time left before it fires
    fn next_due(&self) -> Option<(TimerSlot, Duration)>;

    fn is_armed(&self, slot: TimerSlot) -> bool {
        self.remaining(slot).is_some()
    }

    /// Replaces the pending deadline of `slot`
    fn reschedule(&mut self, slot: TimerSlot, delay: Duration) -> Result<(), TimerError> {
        self.cancel(slot);
        self.arm(slot, delay)
    }
}

/// Virtual-time timer for deterministic simulation
/// Time only moves when the host calls [`advance`](ManualTimer::advance) or
/// [`advance_by`](ManualTimer::advance_by).
#[derive(Debug, Clone, Default)]
pub struct ManualTimer {
    now: Duration,
    deadlines: [Option<Duration>; 2],
    fail_next_arm: Option<String>,
    armed_count: u64,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Number of successful `arm` calls so far
    pub fn armed_count(&self) -> u64 {
        self.armed_count
    }

    /// Deadline of `slot` on the virtual clock
    pub fn deadline(&self, slot: TimerSlot) -> Option<Duration> {
        self.deadlines[slot.index()]
    }

    /// Makes the next `arm` call fail with `reason`
    pub fn fail_next_arm(&mut self, reason: impl Into<String>) {
        self.fail_next_arm = Some(reason.into());
    }

    /// Jumps to the earliest deadline and returns the slot that is now due
    /// The slot stays armed until the scheduler fires it.
    pub fn advance(&mut self) -> Option<TimerSlot> {
        let (slot, wait) = self.next_due()?;
        self.now += wait;
        Some(slot)
    }

    /// Moves virtual time forward without firing anything
    pub fn advance_by(&mut self, elapsed: Duration) {
        self.now += elapsed;
    }
}

impl TimerFacility for ManualTimer {
    fn arm(&mut self, slot: TimerSlot, delay: Duration) -> Result<(), TimerError> {
        if let Some(reason) = self.fail_next_arm.take() {
            return Err(TimerError::ArmFailed { slot, reason });
        }
        self.deadlines[slot.index()] = Some(self.now + delay);
        self.armed_count += 1;
        Ok(())
    }

    fn cancel(&mut self, slot: TimerSlot) {
        self.deadlines[slot.index()] = None;
    }

    fn remaining(&self, slot: TimerSlot) -> Option<Duration> {
        self.deadlines[slot.index()].map(|deadline| deadline.saturating_sub(self.now))
    }

    fn next_due(&self) -> Option<(TimerSlot, Duration)> {
        TimerSlot::ALL
            .into_iter()
            .filter_map(|slot| self.deadlines[slot.index()].map(|deadline| (deadline, slot)))
            .min()
            .map(|(deadline, slot)| (slot, deadline.saturating_sub(self.now)))
    }
}

/// Wall-clock timer backed by [`Instant`] deadlines
/// Used by the runtime thread, which sleeps until the next deadline.
#[derive(Debug, Clone, Default)]
pub struct DeadlineTimer {
    deadlines: [Option<Instant>; 2],
}

impl DeadlineTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absolute deadline of `slot`
    pub fn deadline(&self, slot: TimerSlot) -> Option<Instant> {
        self.deadlines[slot.index()]
    }
}

impl TimerFacility for DeadlineTimer {
    fn arm(&mut self, slot: TimerSlot, delay: Duration) -> Result<(), TimerError> {
        let deadline = Instant::now()
            .checked_add(delay)
            .ok_or_else(|| TimerError::ArmFailed {
                slot,
                reason: format!("delay of {:?} overflows the clock", delay),
            })?;
        self.deadlines[slot.index()] = Some(deadline);
        Ok(())
    }

    fn cancel(&mut self, slot: TimerSlot) {
        self.deadlines[slot.index()] = None;
    }

    fn remaining(&self, slot: TimerSlot) -> Option<Duration> {
        self.deadlines[slot.index()]
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    fn next_due(&self) -> Option<(TimerSlot, Duration)> {
        let now = Instant::now();
        TimerSlot::ALL
            .into_iter()
            .filter_map(|slot| self.deadlines[slot.index()].map(|deadline| (deadline, slot)))
            .min()
            .map(|(deadline, slot)| (slot, deadline.saturating_duration_since(now)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_timer_fires_in_deadline_order() {
        let mut timer = ManualTimer::new();
        timer.arm(TimerSlot::Beat, Duration::from_millis(500)).unwrap();
        timer
            .arm(TimerSlot::Progression, Duration::from_millis(200))
            .unwrap();

        assert_eq!(timer.advance(), Some(TimerSlot::Progression));
        assert_eq!(timer.now(), Duration::from_millis(200));
        timer.cancel(TimerSlot::Progression);

        assert_eq!(
            timer.remaining(TimerSlot::Beat),
            Some(Duration::from_millis(300))
        );
        assert_eq!(timer.advance(), Some(TimerSlot::Beat));
        assert_eq!(timer.now(), Duration::from_millis(500));
        timer.cancel(TimerSlot::Beat);

        assert_eq!(timer.advance(), None);
    }

    #[test]
    fn test_manual_timer_tie_break() {
        let mut timer = ManualTimer::new();
        timer.arm(TimerSlot::Beat, Duration::from_secs(1)).unwrap();
        timer.arm(TimerSlot::Progression, Duration::from_secs(1)).unwrap();
        assert_eq!(timer.advance(), Some(TimerSlot::Progression));
    }

    #[test]
    fn test_rearm_replaces_deadline() {
        let mut timer = ManualTimer::new();
        timer.arm(TimerSlot::Beat, Duration::from_secs(1)).unwrap();
        timer.advance_by(Duration::from_millis(400));
        timer
            .reschedule(TimerSlot::Beat, Duration::from_millis(100))
            .unwrap();
        assert_eq!(
            timer.deadline(TimerSlot::Beat),
            Some(Duration::from_millis(500))
        );
        assert_eq!(timer.armed_count(), 2);
    }

    #[test]
    fn test_cancel_unarmed_slot_is_noop() {
        let mut timer = ManualTimer::new();
        timer.cancel(TimerSlot::Beat);
        assert!(!timer.is_armed(TimerSlot::Beat));
        assert_eq!(timer.next_due(), None);
    }

    #[test]
    fn test_manual_timer_injected_failure() {
        let mut timer = ManualTimer::new();
        timer.fail_next_arm("no timer available");
        let err = timer.arm(TimerSlot::Beat, Duration::ZERO).unwrap_err();
        assert_eq!(
            err,
            TimerError::ArmFailed {
                slot: TimerSlot::Beat,
                reason: "no timer available".to_string()
            }
        );
        // Only the next arm fails
        assert!(timer.arm(TimerSlot::Beat, Duration::ZERO).is_ok());
    }

    #[test]
    fn test_deadline_timer() {
        let mut timer = DeadlineTimer::new();
        assert_eq!(timer.next_due(), None);

        timer.arm(TimerSlot::Beat, Duration::from_secs(60)).unwrap();
        timer.arm(TimerSlot::Progression, Duration::ZERO).unwrap();

        let (slot, wait) = timer.next_due().unwrap();
        assert_eq!(slot, TimerSlot::Progression);
        assert_eq!(wait, Duration::ZERO);

        let remaining = timer.remaining(TimerSlot::Beat).unwrap();
        assert!(remaining <= Duration::from_secs(60));
        assert!(remaining > Duration::from_secs(50));

        timer.cancel(TimerSlot::Progression);
        assert_eq!(timer.next_due().map(|(slot, _)| slot), Some(TimerSlot::Beat));
    }

    #[test]
    fn test_deadline_timer_overflow_is_an_error() {
        let mut timer = DeadlineTimer::new();
        assert!(timer.arm(TimerSlot::Beat, Duration::MAX).is_err());
        assert!(!timer.is_armed(TimerSlot::Beat));
    }
}
