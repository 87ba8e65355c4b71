// Tempo progression - Gradual BPM change from a start tempo towards a target
// Used per measure by the scheduler, or per tick of the progression timer.

use super::settings::{ProgressionInterval, ProgressionPlan};
use std::time::Duration;

/// Direction of a progression, fixed when the progression is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionDirection {
    Increasing,
    Decreasing,
    /// Start equals target, nothing to do
    Flat,
}

/// Tempo progression planner
/// Steps the current tempo towards the target without ever overshooting it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TempoProgression {
    start_bpm: u32,
    target_bpm: u32,
    current_bpm: u32,
    increment: u32,
    direction: ProgressionDirection,
}

impl TempoProgression {
    /// Creates a progression positioned at `start_bpm`
    /// A zero increment is treated as 1 so the progression always terminates.
    pub fn new(start_bpm: u32, target_bpm: u32, increment: u32) -> Self {
        let direction = if target_bpm > start_bpm {
            ProgressionDirection::Increasing
        } else if target_bpm < start_bpm {
            ProgressionDirection::Decreasing
        } else {
            ProgressionDirection::Flat
        };

        Self {
            start_bpm,
            target_bpm,
            current_bpm: start_bpm,
            increment: increment.max(1),
            direction,
        }
    }

    pub fn from_plan(plan: &ProgressionPlan) -> Self {
        Self::new(plan.start_bpm, plan.target_bpm, plan.bpm_increment)
    }

    pub fn start_bpm(&self) -> u32 {
        self.start_bpm
    }

    pub fn target_bpm(&self) -> u32 {
        self.target_bpm
    }

    pub fn current_bpm(&self) -> u32 {
        self.current_bpm
    }

    pub fn increment(&self) -> u32 {
        self.increment
    }

    pub fn direction(&self) -> ProgressionDirection {
        self.direction
    }

    /// True once the current tempo equals the target
    pub fn is_complete(&self) -> bool {
        self.current_bpm == self.target_bpm
    }

    /// Moves back to the start tempo
    pub fn reset(&mut self) {
        self.current_bpm = self.start_bpm;
    }

    /// Moves the progression to an externally chosen tempo
    /// Clamped to the start..=target span so the direction stays meaningful.
    pub fn set_current_bpm(&mut self, bpm: u32) {
        let low = self.start_bpm.min(self.target_bpm);
        let high = self.start_bpm.max(self.target_bpm);
        self.current_bpm = bpm.clamp(low, high);
    }

    /// Takes one step towards the target
    /// Returns the new tempo, or None when already at the target.
    pub fn step(&mut self) -> Option<u32> {
        if self.is_complete() {
            return None;
        }

        let next = match self.direction {
            ProgressionDirection::Increasing => self
                .current_bpm
                .saturating_add(self.increment)
                .min(self.target_bpm),
            ProgressionDirection::Decreasing => self
                .current_bpm
                .saturating_sub(self.increment)
                .max(self.target_bpm),
            ProgressionDirection::Flat => return None,
        };

        self.current_bpm = next;
        Some(next)
    }

    /// Whether enough measures have been played at the current tempo
    pub fn is_due(&self, measures_played: u32, interval_measures: u32) -> bool {
        measures_played >= interval_measures
    }

    /// Measure-based progression, called on every measure boundary
    /// Steps only when `measures_played` reached the interval; the caller
    /// resets its measure counter whenever [`is_due`](Self::is_due) holds.
    pub fn maybe_advance(&mut self, measures_played: u32, interval_measures: u32) -> Option<u32> {
        if !self.is_due(measures_played, interval_measures) {
            return None;
        }
        self.step()
    }

    /// Progress from start to target in percent (0-100)
    pub fn progress_percentage(&self) -> f64 {
        let span = self.start_bpm.abs_diff(self.target_bpm);
        if span == 0 {
            return 100.0;
        }
        let remaining = self.current_bpm.abs_diff(self.target_bpm);
        100.0 * (span - remaining) as f64 / span as f64
    }

    /// Steps still needed to reach the target
    pub fn remaining_steps(&self) -> u32 {
        self.current_bpm
            .abs_diff(self.target_bpm)
            .div_ceil(self.increment)
    }

    /// Steps needed to go from start to target
    pub fn total_steps(&self) -> u32 {
        self.start_bpm
            .abs_diff(self.target_bpm)
            .div_ceil(self.increment)
    }

    /// Time left until the target is reached, for display in seconds mode
    pub fn remaining_time(&self, step_interval: Duration) -> Duration {
        step_interval * self.remaining_steps()
    }

    /// Time the whole progression takes, for display in seconds mode
    pub fn total_time(&self, step_interval: Duration) -> Duration {
        step_interval * self.total_steps()
    }

    /// Human readable summary, e.g. "100 to 130 BPM (rising), +5 BPM every 30 s, about 180 s in total"
    pub fn description(&self, interval: ProgressionInterval) -> String {
        let (direction, sign) = match self.direction {
            ProgressionDirection::Increasing => ("rising", '+'),
            ProgressionDirection::Decreasing => ("falling", '-'),
            ProgressionDirection::Flat => return format!("steady at {} BPM", self.target_bpm),
        };

        let total = match interval {
            ProgressionInterval::Measures(n) => format!("{} measures", self.total_steps() * n),
            ProgressionInterval::Seconds(n) => format!(
                "{} s",
                self.total_time(Duration::from_secs(u64::from(n))).as_secs()
            ),
        };

        format!(
            "{} to {} BPM ({}), {}{} BPM {}, about {} in total",
            self.start_bpm, self.target_bpm, direction, sign, self.increment, interval, total
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_to_completion(progression: &mut TempoProgression) -> Vec<u32> {
        let mut steps = Vec::new();
        while let Some(bpm) = progression.step() {
            steps.push(bpm);
            assert!(steps.len() < 1000, "progression did not terminate");
        }
        steps
    }

    #[test]
    fn test_increasing_progression() {
        let mut progression = TempoProgression::new(100, 130, 5);
        assert_eq!(progression.direction(), ProgressionDirection::Increasing);

        let steps = run_to_completion(&mut progression);
        assert_eq!(steps, vec![105, 110, 115, 120, 125, 130]);
        assert!(progression.is_complete());
        assert_eq!(progression.step(), None);
    }

    #[test]
    fn test_decreasing_progression() {
        let mut progression = TempoProgression::new(130, 100, 5);
        assert_eq!(progression.direction(), ProgressionDirection::Decreasing);

        let steps = run_to_completion(&mut progression);
        assert_eq!(steps.len(), 6);
        assert!(steps.windows(2).all(|w| w[1] <= w[0]));
        assert_eq!(steps.last(), Some(&100));
    }

    #[test]
    fn test_last_step_is_clamped() {
        let mut progression = TempoProgression::new(100, 112, 5);
        assert_eq!(run_to_completion(&mut progression), vec![105, 110, 112]);

        let mut progression = TempoProgression::new(112, 100, 5);
        assert_eq!(run_to_completion(&mut progression), vec![107, 102, 100]);
    }

    #[test]
    fn test_flat_progression() {
        let mut progression = TempoProgression::new(120, 120, 5);
        assert_eq!(progression.direction(), ProgressionDirection::Flat);
        assert!(progression.is_complete());
        assert_eq!(progression.step(), None);
        assert_eq!(progression.progress_percentage(), 100.0);
        assert_eq!(progression.total_time(Duration::from_secs(30)), Duration::ZERO);
    }

    #[test]
    fn test_maybe_advance_waits_for_interval() {
        let mut progression = TempoProgression::new(100, 130, 5);

        assert_eq!(progression.maybe_advance(1, 4), None);
        assert_eq!(progression.maybe_advance(3, 4), None);
        assert_eq!(progression.current_bpm(), 100);

        assert!(progression.is_due(4, 4));
        assert_eq!(progression.maybe_advance(4, 4), Some(105));
        assert_eq!(progression.maybe_advance(7, 4), Some(110));
    }

    #[test]
    fn test_progress_percentage() {
        let mut progression = TempoProgression::new(100, 140, 10);
        assert_eq!(progression.progress_percentage(), 0.0);
        progression.step();
        assert_eq!(progression.progress_percentage(), 25.0);
        progression.step();
        progression.step();
        progression.step();
        assert_eq!(progression.progress_percentage(), 100.0);

        progression.reset();
        assert_eq!(progression.current_bpm(), 100);
        assert_eq!(progression.progress_percentage(), 0.0);
    }

    #[test]
    fn test_remaining_and_total_time() {
        let mut progression = TempoProgression::new(100, 130, 7);
        let interval = Duration::from_secs(30);

        // ceil(30 / 7) = 5 steps
        assert_eq!(progression.total_time(interval), Duration::from_secs(150));
        assert_eq!(progression.remaining_time(interval), Duration::from_secs(150));

        progression.step();
        progression.step();
        // ceil(16 / 7) = 3 steps
        assert_eq!(progression.remaining_time(interval), Duration::from_secs(90));
        assert_eq!(progression.total_time(interval), Duration::from_secs(150));
    }

    #[test]
    fn test_set_current_bpm_is_clamped() {
        let mut progression = TempoProgression::new(100, 130, 5);
        progression.set_current_bpm(118);
        assert_eq!(progression.step(), Some(123));

        progression.set_current_bpm(200);
        assert!(progression.is_complete());

        progression.set_current_bpm(20);
        assert_eq!(progression.current_bpm(), 100);
    }

    #[test]
    fn test_zero_increment_still_terminates() {
        let mut progression = TempoProgression::new(100, 103, 0);
        assert_eq!(progression.increment(), 1);
        assert_eq!(run_to_completion(&mut progression), vec![101, 102, 103]);
    }

    #[test]
    fn test_description() {
        let progression = TempoProgression::new(100, 130, 5);
        assert_eq!(
            progression.description(ProgressionInterval::Seconds(30)),
            "100 to 130 BPM (rising), +5 BPM every 30 s, about 180 s in total"
        );

        let progression = TempoProgression::new(130, 100, 10);
        assert_eq!(
            progression.description(ProgressionInterval::Measures(2)),
            "130 to 100 BPM (falling), -10 BPM every 2 measures, about 6 measures in total"
        );
    }
}
