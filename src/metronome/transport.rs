// Transport - Live playback state of the metronome and how the UI observes it
// TransportState is owned and mutated by the scheduler only; everything else
// sees snapshots, events, or the shared atomics.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Runtime transport counters
/// Created fresh on every start, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportState {
    pub is_playing: bool,
    pub current_bpm: u32,
    /// Zero-based beat within the measure
    pub current_beat: usize,
    /// Zero-based measure within the loop
    pub current_measure: u32,
    pub completed_repetitions: u32,
    pub measures_at_current_bpm: u32,
    pub elapsed_at_current_bpm: Duration,
    /// 0-100, 100 when no progression is configured
    pub progress_percentage: f64,
    pub beats_played: u64,
    /// Interval the pending beat was armed with
    pub beat_interval: Duration,
}

impl TransportState {
    /// Stopped state at `bpm` with all counters at zero
    pub fn new(bpm: u32) -> Self {
        Self {
            is_playing: false,
            current_bpm: bpm,
            current_beat: 0,
            current_measure: 0,
            completed_repetitions: 0,
            measures_at_current_bpm: 0,
            elapsed_at_current_bpm: Duration::ZERO,
            progress_percentage: 100.0,
            beats_played: 0,
            beat_interval: beat_interval(bpm),
        }
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        TransportSnapshot {
            is_playing: self.is_playing,
            current_bpm: self.current_bpm,
            current_beat: self.current_beat,
            current_measure: self.current_measure,
            completed_repetitions: self.completed_repetitions,
            measures_at_current_bpm: self.measures_at_current_bpm,
            elapsed_at_current_bpm: self.elapsed_at_current_bpm,
            progress_percentage: self.progress_percentage,
            beats_played: self.beats_played,
        }
    }
}

/// Interval between two beats at `bpm`
pub fn beat_interval(bpm: u32) -> Duration {
    Duration::from_secs_f64(60.0 / f64::from(bpm.max(1)))
}

/// Read-only copy of the transport state for UI binding
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportSnapshot {
    pub is_playing: bool,
    pub current_bpm: u32,
    pub current_beat: usize,
    pub current_measure: u32,
    pub completed_repetitions: u32,
    pub measures_at_current_bpm: u32,
    pub elapsed_at_current_bpm: Duration,
    pub progress_percentage: f64,
    pub beats_played: u64,
}

impl Default for TransportSnapshot {
    fn default() -> Self {
        TransportState::new(super::settings::DEFAULT_BPM).snapshot()
    }
}

/// Why the transport stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// stop() was called
    Requested,
    /// The configured number of repetitions has been played
    RepetitionsCompleted,
    /// Progression target held for one interval under the Stop policy
    TargetReached,
    /// Stopped to apply new settings, restarted right after
    Reconfigured,
    /// The timer facility could not be armed
    TimerFailure(String),
}

/// Transport change notification
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Started {
        bpm: u32,
    },
    /// A beat was played; `beat` and `measure` are the position that sounded
    Beat {
        beat: usize,
        measure: u32,
        accented: bool,
    },
    BpmChanged {
        bpm: u32,
        progress_percentage: f64,
    },
    RepetitionCompleted {
        completed: u32,
    },
    Stopped {
        reason: StopReason,
    },
}

/// Receives transport events on the scheduling thread
/// Implementations must return quickly; the next beat waits on them.
pub trait TransportListener: Send {
    fn on_event(&mut self, event: &TransportEvent);
}

impl<F> TransportListener for F
where
    F: FnMut(&TransportEvent) + Send,
{
    fn on_event(&mut self, event: &TransportEvent) {
        self(event)
    }
}

/// Forwards events into a channel, dropping them when it is full or closed
#[derive(Debug, Clone)]
pub struct ChannelListener(pub crossbeam_channel::Sender<TransportEvent>);

impl TransportListener for ChannelListener {
    fn on_event(&mut self, event: &TransportEvent) {
        // A dropped receiver only means nobody is watching anymore
        let _ = self.0.try_send(event.clone());
    }
}

/// Shared transport state
/// Lock-free mirror of the live counters, readable from any thread
#[derive(Debug, Default)]
pub struct SharedTransportState {
    playing: AtomicBool,
    bpm: AtomicU32,
    beat: AtomicU32,
    measure: AtomicU32,
    completed_repetitions: AtomicU32,
    measures_at_current_bpm: AtomicU32,
    elapsed_at_current_bpm_micros: AtomicU64,
    progress_bits: AtomicU64,
    beats_played: AtomicU64,
}

impl SharedTransportState {
    pub fn new() -> Arc<Self> {
        let shared = Arc::new(Self::default());
        shared.publish(&TransportState::new(super::settings::DEFAULT_BPM));
        shared
    }

    /// Copies the live state into the atomics
    pub fn publish(&self, state: &TransportState) {
        self.bpm.store(state.current_bpm, Ordering::Relaxed);
        self.beat.store(state.current_beat as u32, Ordering::Relaxed);
        self.measure.store(state.current_measure, Ordering::Relaxed);
        self.completed_repetitions
            .store(state.completed_repetitions, Ordering::Relaxed);
        self.measures_at_current_bpm
            .store(state.measures_at_current_bpm, Ordering::Relaxed);
        self.elapsed_at_current_bpm_micros.store(
            state.elapsed_at_current_bpm.as_micros() as u64,
            Ordering::Relaxed,
        );
        self.progress_bits
            .store(state.progress_percentage.to_bits(), Ordering::Relaxed);
        self.beats_played
            .store(state.beats_played, Ordering::Relaxed);
        // Playing flag last so a reader that sees it also sees the counters
        self.playing.store(state.is_playing, Ordering::Release);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Acquire)
    }

    pub fn current_bpm(&self) -> u32 {
        self.bpm.load(Ordering::Relaxed)
    }

    pub fn current_beat(&self) -> usize {
        self.beat.load(Ordering::Relaxed) as usize
    }

    pub fn current_measure(&self) -> u32 {
        self.measure.load(Ordering::Relaxed)
    }

    pub fn progress_percentage(&self) -> f64 {
        f64::from_bits(self.progress_bits.load(Ordering::Relaxed))
    }

    pub fn snapshot(&self) -> TransportSnapshot {
        let is_playing = self.is_playing();
        TransportSnapshot {
            is_playing,
            current_bpm: self.current_bpm(),
            current_beat: self.current_beat(),
            current_measure: self.current_measure(),
            completed_repetitions: self.completed_repetitions.load(Ordering::Relaxed),
            measures_at_current_bpm: self.measures_at_current_bpm.load(Ordering::Relaxed),
            elapsed_at_current_bpm: Duration::from_micros(
                self.elapsed_at_current_bpm_micros.load(Ordering::Relaxed),
            ),
            progress_percentage: self.progress_percentage(),
            beats_played: self.beats_played.load(Ordering::Relaxed),
        }
    }
}
