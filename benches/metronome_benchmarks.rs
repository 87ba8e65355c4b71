use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use practice_metronome::metronome::accent;
use practice_metronome::{
    AccentPattern, BeatScheduler, ClickSynth, ManualTimer, MetronomeSettings,
    ProgressionIntervalKind, TempoProgression, TimeSignature,
};

/// Benchmark accent generation for every preset meter
fn bench_accent_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("accent_generation");

    for signature in TimeSignature::PRESETS {
        group.bench_with_input(
            BenchmarkId::from_parameter(signature.to_string()),
            &signature.beats_per_measure(),
            |b, &beats| {
                b.iter(|| {
                    for pattern in AccentPattern::ALL {
                        black_box(accent::generate(black_box(beats), pattern, &[0, 3, 5]).ok());
                    }
                });
            },
        );
    }
    group.finish();
}

/// Benchmark a full tempo progression walk
fn bench_progression(c: &mut Criterion) {
    c.bench_function("progression_40_to_300", |b| {
        b.iter(|| {
            let mut progression = TempoProgression::new(40, 300, black_box(1));
            while let Some(bpm) = progression.step() {
                black_box(bpm);
            }
        });
    });
}

/// Benchmark the beat callback path (must stay well under a millisecond)
fn bench_beat_callback(c: &mut Criterion) {
    let mut group = c.benchmark_group("beat_callback");

    for beats in [64usize, 1024] {
        let settings = MetronomeSettings {
            time_signature: TimeSignature::seven_eight(),
            ..Default::default()
        }
        .with_progression(300, 1, ProgressionIntervalKind::Measures, 1);

        group.bench_with_input(BenchmarkId::from_parameter(beats), &beats, |b, &beats| {
            b.iter(|| {
                let mut scheduler = BeatScheduler::with_settings(
                    &settings,
                    ManualTimer::new(),
                    ClickSynth::new(48000.0),
                )
                .ok()?;
                scheduler.start().ok()?;
                for _ in 0..beats {
                    black_box(scheduler.advance().ok()?);
                }
                Some(())
            });
        });
    }
    group.finish();
}

/// Benchmark click rendering into an audio buffer
fn bench_click_rendering(c: &mut Criterion) {
    use practice_metronome::metronome::sound::SoundPlayer;

    let buffer_size = 512;
    let mut synth = ClickSynth::new(48000.0);
    let click = synth.load("metronome-click-accent").ok();

    c.bench_function("click_render_512", |b| {
        let mut buffer = vec![0.0f32; buffer_size];
        b.iter(|| {
            if let Some(click) = &click {
                let _ = synth.play(click);
            }
            synth.process_buffer(&mut buffer);
            black_box(&buffer);
        });
    });
}

criterion_group!(
    benches,
    bench_accent_generation,
    bench_progression,
    bench_beat_callback,
    bench_click_rendering
);
criterion_main!(benches);
