// Metronome engine - Beat scheduling, accent patterns and tempo progression
// Everything the practice UI drives through start/stop/apply_settings lives here.

pub mod accent;
pub mod progression;
pub mod runtime;
pub mod scheduler;
pub mod settings;
pub mod sound;
pub mod store;
pub mod timer;
pub mod transport;

pub use accent::{default_pattern_for_meter, generate};
pub use progression::{ProgressionDirection, TempoProgression};
pub use runtime::{MetronomeHandle, MetronomeRuntime};
pub use scheduler::BeatScheduler;
pub use settings::{
    AccentPattern, ClickSound, MetronomeConfig, MetronomeSettings, ProgressionInterval,
    ProgressionIntervalKind, ProgressionPlan, TargetPolicy, TimeSignature, DEFAULT_BPM, MAX_BPM,
    MIN_BPM,
};
pub use sound::{ClickSynth, SoundError, SoundHandle, SoundPlayer};
pub use store::{
    FileSettingsStore, MemorySettingsStore, PracticeItemId, SettingsStore, StoreError, StoreFormat,
};
pub use timer::{DeadlineTimer, ManualTimer, TimerError, TimerFacility, TimerSlot};
pub use transport::{
    ChannelListener, SharedTransportState, StopReason, TransportEvent, TransportListener,
    TransportSnapshot, TransportState,
};

use thiserror::Error;

/// Invalid metronome configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("BPM {bpm} is outside the supported range {min}..={max}")]
    BpmOutOfRange { bpm: u32, min: u32, max: u32 },

    #[error("Target BPM {target_bpm} is outside the supported range {min}..={max}")]
    TargetBpmOutOfRange { target_bpm: u32, min: u32, max: u32 },

    #[error("Tempo progression is enabled but no target BPM is set")]
    MissingTargetBpm,

    #[error("BPM increment must be at least 1")]
    ZeroBpmIncrement,

    #[error("Progression interval must be at least 1")]
    ZeroProgressionInterval,

    #[error("Measure count must be at least 1")]
    ZeroMeasuresCount,

    #[error("A measure needs at least one beat")]
    ZeroBeatsPerMeasure,

    #[error("Invalid time signature {numerator}/{denominator}")]
    InvalidTimeSignature { numerator: u8, denominator: u8 },

    #[error("Cannot parse time signature: {0}")]
    UnparsableTimeSignature(String),
}

/// Errors surfaced by the metronome engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetronomeError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Timer failure: {0}")]
    Timer(#[from] TimerError),

    #[error("Cannot start metronome thread: {0}")]
    Spawn(String),

    #[error("Metronome engine thread is no longer running")]
    EngineGone,
}

pub type MetronomeResult<T> = Result<T, MetronomeError>;
