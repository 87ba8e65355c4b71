// Practice Metronome - Library exports for the demo, tests and benchmarks

pub mod metronome;

// Re-export commonly used types for convenience
pub use metronome::{
    AccentPattern, BeatScheduler, ClickSound, ClickSynth, ConfigError, DeadlineTimer,
    FileSettingsStore, ManualTimer, MemorySettingsStore, MetronomeConfig, MetronomeError,
    MetronomeHandle, MetronomeResult, MetronomeRuntime, MetronomeSettings, PracticeItemId,
    ProgressionIntervalKind, SettingsStore, StopReason, StoreFormat, TargetPolicy,
    TempoProgression, TimeSignature, TimerFacility, TimerSlot, TransportEvent, TransportSnapshot,
};
