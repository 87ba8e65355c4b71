// Metronome demo - Plays a practice session on the console or renders it to WAV
// Run with: cargo run --bin metronome_demo -- --bpm 100 --target 130 --every-seconds 10

use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use hound::{SampleFormat, WavSpec, WavWriter};
use practice_metronome::metronome::sound::{SoundError, SoundHandle, SoundPlayer};
use practice_metronome::{
    AccentPattern, BeatScheduler, ClickSound, ClickSynth, FileSettingsStore, ManualTimer,
    MetronomeRuntime, MetronomeSettings, PracticeItemId, ProgressionIntervalKind, SettingsStore,
    StoreFormat, TargetPolicy, TempoProgression, TimeSignature, TimerFacility, TransportEvent,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

const SAMPLE_RATE: u32 = 48000;

#[derive(Parser, Debug)]
#[command(name = "metronome_demo", about = "Practice metronome demo")]
struct Args {
    /// Tempo in beats per minute
    #[arg(short, long)]
    bpm: Option<u32>,

    /// Time signature, e.g. 4/4 or 6/8
    #[arg(short, long)]
    time_signature: Option<TimeSignature>,

    /// Measures per repetition
    #[arg(short, long)]
    measures: Option<u32>,

    /// Repetitions before stopping, 0 plays forever
    #[arg(short, long)]
    repetitions: Option<u32>,

    /// Accent pattern: standard, offbeat or custom
    #[arg(long)]
    accent: Option<String>,

    /// Comma separated accented beats for the custom pattern, e.g. 0,3
    #[arg(long, value_delimiter = ',')]
    accents: Vec<usize>,

    /// Click sound: click, wood, digital or beep
    #[arg(long)]
    sound: Option<String>,

    /// Target tempo; enables tempo progression
    #[arg(long)]
    target: Option<u32>,

    /// BPM change per progression step
    #[arg(long, default_value_t = 5)]
    increment: u32,

    /// Step the tempo every N measures
    #[arg(long, conflicts_with = "every_seconds")]
    every_measures: Option<u32>,

    /// Step the tempo every N seconds
    #[arg(long)]
    every_seconds: Option<u32>,

    /// Stop once the target tempo has been held for one interval
    #[arg(long)]
    stop_at_target: bool,

    /// Practice item whose stored settings are loaded first
    #[arg(long)]
    item: Option<PracticeItemId>,

    /// Settings directory (defaults to the platform data directory)
    #[arg(long)]
    store_dir: Option<PathBuf>,

    /// Store settings as JSON instead of RON
    #[arg(long)]
    json: bool,

    /// Save the resulting settings back to the practice item
    #[arg(long, requires = "item")]
    save: bool,

    /// Render the session to a WAV file instead of playing it
    #[arg(short = 'w', long)]
    render: Option<PathBuf>,

    /// Maximum session length in seconds
    #[arg(short, long, default_value_t = 30)]
    seconds: u64,
}

/// Prints clicks instead of playing them
struct ConsolePlayer;

impl SoundPlayer for ConsolePlayer {
    fn load(&mut self, id: &str) -> Result<SoundHandle, SoundError> {
        ClickSound::from_sound_id(id)
            .map(|_| SoundHandle::new(id, 0))
            .ok_or_else(|| SoundError::NotFound(id.to_string()))
    }

    fn play(&mut self, _sound: &SoundHandle) -> Result<(), SoundError> {
        Ok(())
    }
}

fn parse_accent(name: &str) -> Result<AccentPattern, String> {
    match name.to_lowercase().as_str() {
        "standard" => Ok(AccentPattern::Standard),
        "offbeat" | "off-beat" => Ok(AccentPattern::OffBeat),
        "custom" => Ok(AccentPattern::Custom),
        other => Err(format!("Unknown accent pattern: {}", other)),
    }
}

fn parse_sound(name: &str) -> Result<ClickSound, String> {
    ClickSound::ALL
        .into_iter()
        .find(|sound| sound.to_string().eq_ignore_ascii_case(name))
        .ok_or_else(|| format!("Unknown click sound: {}", name))
}

/// Stored settings of the practice item, overridden by the command line
fn build_settings(
    args: &Args,
    store: Option<&FileSettingsStore>,
) -> Result<MetronomeSettings, Box<dyn std::error::Error>> {
    let mut settings = match (store, args.item) {
        (Some(store), Some(item)) => store.load_or_default(item)?,
        _ => MetronomeSettings::default(),
    };

    if let Some(bpm) = args.bpm {
        settings.bpm = bpm;
    }
    if let Some(time_signature) = args.time_signature {
        settings.time_signature = time_signature;
    }
    if let Some(measures) = args.measures {
        settings.measures_count = measures;
    }
    if let Some(repetitions) = args.repetitions {
        settings.repetition_count = repetitions;
    }
    if let Some(accent) = &args.accent {
        settings.accent_pattern = parse_accent(accent)?;
    }
    if !args.accents.is_empty() {
        settings.accent_pattern = AccentPattern::Custom;
        settings.custom_accent_positions = Some(BTreeSet::from_iter(args.accents.iter().copied()));
    }
    if let Some(sound) = &args.sound {
        settings.set_click_sound(parse_sound(sound)?);
    }
    if let Some(target) = args.target {
        let (kind, value) = match (args.every_seconds, args.every_measures) {
            (Some(seconds), _) => (ProgressionIntervalKind::Seconds, seconds),
            (None, Some(measures)) => (ProgressionIntervalKind::Measures, measures),
            (None, None) => (ProgressionIntervalKind::Measures, 4),
        };
        settings = settings.with_progression(target, args.increment, kind, value);
    }
    if args.stop_at_target {
        settings.target_policy = TargetPolicy::Stop;
    }

    Ok(settings)
}

fn describe(event: &TransportEvent) -> String {
    match event {
        TransportEvent::Started { bpm } => format!("▶️  Started at {} BPM", bpm),
        TransportEvent::Beat {
            beat,
            measure,
            accented,
        } => {
            let mark = if *accented { "TICK" } else { "tock" };
            format!("   {} (measure {}, beat {})", mark, measure + 1, beat + 1)
        }
        TransportEvent::BpmChanged {
            bpm,
            progress_percentage,
        } => format!("⏩ {} BPM ({:.0}% of progression)", bpm, progress_percentage),
        TransportEvent::RepetitionCompleted { completed } => {
            format!("🔁 Repetition {} completed", completed)
        }
        TransportEvent::Stopped { reason } => format!("⏹️  Stopped ({:?})", reason),
    }
}

/// Real-time session on the scheduling thread
fn play(settings: &MetronomeSettings, limit: Duration) -> Result<(), Box<dyn std::error::Error>> {
    let handle = MetronomeRuntime::new(ConsolePlayer)
        .with_settings(settings)?
        .spawn()?;
    handle.start()?;

    let deadline = Instant::now() + limit;
    loop {
        let wait = deadline.saturating_duration_since(Instant::now());
        match handle.events().recv_timeout(wait) {
            Ok(event) => {
                println!("{}", describe(&event));
                if matches!(event, TransportEvent::Stopped { .. }) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                println!("\n⏱️  Time limit reached");
                break;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    let snapshot = handle.snapshot();
    handle.shutdown();
    println!(
        "   - Final tempo: {} BPM, {} repetitions completed",
        snapshot.current_bpm, snapshot.completed_repetitions
    );
    Ok(())
}

/// Offline session on virtual time, clicks mixed into a mono WAV file
fn render(
    settings: &MetronomeSettings,
    path: &Path,
    limit: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let synth = ClickSynth::new(SAMPLE_RATE as f32);
    let mut scheduler = BeatScheduler::with_settings(settings, ManualTimer::new(), synth)?;
    scheduler.add_listener(|event: &TransportEvent| {
        if !matches!(event, TransportEvent::Beat { .. }) {
            println!("{}", describe(event));
        }
    });

    let spec = WavSpec {
        channels: 1,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    let mut written: u64 = 0;
    let to_samples = |time: Duration| (time.as_secs_f64() * f64::from(SAMPLE_RATE)).round() as u64;

    scheduler.start()?;
    while scheduler.is_playing() {
        let Some((_, wait)) = scheduler.timer().next_due() else {
            break;
        };
        let due = scheduler.now() + wait;
        if due > limit {
            break;
        }

        while written < to_samples(due) {
            let sample = scheduler.player_mut().process_sample();
            writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
            written += 1;
        }
        scheduler.advance()?;
    }
    scheduler.stop();

    // Let the last click ring out
    let tail = written + to_samples(Duration::from_millis(200));
    while written < tail {
        let sample = scheduler.player_mut().process_sample();
        writer.write_sample((sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16)?;
        written += 1;
    }
    writer.finalize()?;

    println!(
        "\n💾 Rendered {} clicks ({:.1} s) to {}",
        scheduler.player().played(),
        written as f64 / f64::from(SAMPLE_RATE),
        path.display()
    );
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    println!("🎵 Practice Metronome - Demo");
    println!("============================");

    let format = if args.json {
        StoreFormat::Json
    } else {
        StoreFormat::Ron
    };
    let mut store = match (&args.store_dir, args.item) {
        (Some(dir), _) => Some(FileSettingsStore::new(dir, format)),
        (None, Some(_)) => Some(FileSettingsStore::default_location()?.with_format(format)),
        (None, None) => None,
    };

    let settings = build_settings(&args, store.as_ref())?;
    // Validate up front so a bad setting is reported before anything plays
    let config = settings.validate()?;

    println!("   - Tempo: {} BPM in {}", config.bpm, config.time_signature);
    println!(
        "   - Loop: {} measures, {} repetitions",
        config.measures_count,
        if config.repetition_count == 0 {
            "endless".to_string()
        } else {
            config.repetition_count.to_string()
        }
    );
    if let Some(plan) = &config.progression {
        let progression = TempoProgression::from_plan(plan);
        println!("   - Progression: {}", progression.description(plan.interval));
    }

    if let (true, Some(store), Some(item)) = (args.save, store.as_mut(), args.item) {
        store.save(item, &settings)?;
        println!("💾 Saved settings to {}", store.path_for(item).display());
    }

    let limit = Duration::from_secs(args.seconds);
    match &args.render {
        Some(path) => render(&settings, path, limit),
        None => play(&settings, limit),
    }
}
