//! Fuzzing tests for settings validation and the beat scheduler
//!
//! Random settings must either be rejected by validation or run without
//! breaking the transport invariants.

use practice_metronome::metronome::sound::{SoundError, SoundHandle, SoundPlayer};
use practice_metronome::metronome::{MAX_BPM, MIN_BPM};
use practice_metronome::{
    AccentPattern, BeatScheduler, ManualTimer, MetronomeSettings, ProgressionIntervalKind,
    TargetPolicy, TimeSignature, TimerFacility, TimerSlot,
};
use rand::Rng;
use std::collections::BTreeSet;

struct NullPlayer;

impl SoundPlayer for NullPlayer {
    fn load(&mut self, id: &str) -> Result<SoundHandle, SoundError> {
        Ok(SoundHandle::new(id, 0))
    }

    fn play(&mut self, _sound: &SoundHandle) -> Result<(), SoundError> {
        Ok(())
    }
}

fn random_settings(rng: &mut impl Rng) -> MetronomeSettings {
    let positions: BTreeSet<usize> = (0..rng.gen_range(0..6))
        .map(|_| rng.gen_range(0..16))
        .collect();

    MetronomeSettings {
        bpm: rng.gen_range(0..=400),
        time_signature: TimeSignature {
            numerator: rng.gen_range(0..=16),
            denominator: rng.gen_range(0..=16),
        },
        measures_count: rng.gen_range(0..=8),
        repetition_count: rng.gen_range(0..=4),
        accent_enabled: rng.gen_bool(0.8),
        accent_pattern: AccentPattern::ALL[rng.gen_range(0..AccentPattern::ALL.len())],
        custom_accent_positions: rng.gen_bool(0.7).then_some(positions),
        progression_enabled: rng.gen_bool(0.5),
        target_bpm: rng.gen_bool(0.9).then(|| rng.gen_range(0..=400)),
        bpm_increment: rng.gen_range(0..=20),
        progression_interval: if rng.gen_bool(0.5) {
            ProgressionIntervalKind::Measures
        } else {
            ProgressionIntervalKind::Seconds
        },
        progression_interval_value: rng.gen_range(0..=10),
        target_policy: if rng.gen_bool(0.5) {
            TargetPolicy::Hold
        } else {
            TargetPolicy::Stop
        },
        ..Default::default()
    }
}

/// Random settings never panic and valid ones keep every counter in range
#[test]
fn fuzz_random_settings() {
    let mut rng = rand::thread_rng();
    let mut accepted = 0;

    for _ in 0..500 {
        let settings = random_settings(&mut rng);
        let Ok(config) = settings.validate() else {
            let mut scheduler = BeatScheduler::new(ManualTimer::new(), NullPlayer);
            assert!(scheduler.apply_settings(&settings).is_err());
            assert_eq!(scheduler.config().bpm, 120);
            continue;
        };
        accepted += 1;

        let mut scheduler =
            BeatScheduler::with_settings(&settings, ManualTimer::new(), NullPlayer).unwrap();
        assert_eq!(scheduler.accent_pattern().len(), config.beats_per_measure());
        scheduler.start().unwrap();

        let (low, high) = config.progression.map_or((config.bpm, config.bpm), |plan| {
            (
                plan.start_bpm.min(plan.target_bpm),
                plan.start_bpm.max(plan.target_bpm),
            )
        });

        for _ in 0..300 {
            if scheduler.advance().unwrap().is_none() {
                break;
            }
            assert!(scheduler.current_beat() < config.beats_per_measure());
            assert!(scheduler.current_measure() < config.measures_count);
            assert!((low..=high).contains(&scheduler.current_bpm()));
            assert!((MIN_BPM..=MAX_BPM).contains(&scheduler.current_bpm()));
            if config.repetition_count > 0 {
                assert!(scheduler.completed_repetitions() <= config.repetition_count);
            }
        }

        scheduler.stop();
        assert!(!scheduler.is_playing());
    }

    // The generator produces enough valid settings to exercise the engine
    assert!(accepted > 0);
}

/// Random tempo changes and stop/start calls between beats
#[test]
fn fuzz_live_commands() {
    let mut rng = rand::thread_rng();
    let mut scheduler = BeatScheduler::new(ManualTimer::new(), NullPlayer);
    scheduler.start().unwrap();

    for _ in 0..5000 {
        match rng.gen_range(0..10) {
            0 => {
                let bpm = rng.gen_range(0..=400);
                let accepted = scheduler.set_bpm(bpm).is_ok();
                assert_eq!(accepted, (MIN_BPM..=MAX_BPM).contains(&bpm));
            }
            1 => scheduler.stop(),
            2 => scheduler.start().unwrap(),
            _ => {
                let fired = scheduler.advance().unwrap();
                if scheduler.is_playing() {
                    assert!(fired.is_some());
                }
            }
        }

        assert!(scheduler.current_beat() < 4);
        if scheduler.is_playing() {
            assert!(scheduler.timer().is_armed(TimerSlot::Beat));
        }
    }
}
