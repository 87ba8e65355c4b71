// Beat scheduler - The metronome state machine
// Plays one beat per timer firing, advances beat/measure/repetition counters,
// applies tempo progression, and re-arms a single-shot timer with an interval
// derived from the tempo at that moment.

use super::accent;
use super::progression::TempoProgression;
use super::settings::{
    MAX_BPM, MIN_BPM, MetronomeConfig, MetronomeSettings, ProgressionInterval, TargetPolicy,
};
use super::sound::{SoundHandle, SoundPlayer};
use super::timer::{ManualTimer, TimerError, TimerFacility, TimerSlot};
use super::transport::{
    SharedTransportState, StopReason, TransportEvent, TransportListener, TransportSnapshot,
    TransportState, beat_interval,
};
use super::{ConfigError, MetronomeError, MetronomeResult};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;

/// Metronome engine core
///
/// Single-threaded and `&mut self` driven: the host waits for the timer and
/// calls [`fire`](BeatScheduler::fire) with the due slot. Every callback runs
/// to completion before the next one is armed, so beats never overlap.
pub struct BeatScheduler<T: TimerFacility, P: SoundPlayer> {
    config: MetronomeConfig,
    accent_pattern: Vec<bool>,
    state: TransportState,
    progression: Option<TempoProgression>,
    timer: T,
    player: P,
    click_sound: Option<SoundHandle>,
    accent_sound: Option<SoundHandle>,
    shared: Arc<SharedTransportState>,
    listeners: Vec<Box<dyn TransportListener>>,
}

impl<T: TimerFacility, P: SoundPlayer> BeatScheduler<T, P> {
    /// Create a stopped scheduler with default settings (120 BPM, 4/4)
    pub fn new(timer: T, player: P) -> Self {
        let config = MetronomeConfig::default();
        // The default meter always has beats, the fallback is never used
        let accent_pattern = accent::generate(
            config.beats_per_measure(),
            config.accent_pattern,
            config.custom_positions(),
        )
        .unwrap_or_else(|_| vec![true]);
        let state = TransportState::new(config.bpm);
        let shared = SharedTransportState::new();
        shared.publish(&state);

        Self {
            config,
            accent_pattern,
            state,
            progression: None,
            timer,
            player,
            click_sound: None,
            accent_sound: None,
            shared,
            listeners: Vec::new(),
        }
    }

    /// Create a stopped scheduler configured from `settings`
    pub fn with_settings(settings: &MetronomeSettings, timer: T, player: P) -> MetronomeResult<Self> {
        let mut scheduler = Self::new(timer, player);
        scheduler.apply_settings(settings)?;
        Ok(scheduler)
    }

    /// Get the active configuration
    pub fn config(&self) -> &MetronomeConfig {
        &self.config
    }

    /// Accent flag of every beat in the measure
    pub fn accent_pattern(&self) -> &[bool] {
        &self.accent_pattern
    }

    /// Get the live transport state
    pub fn state(&self) -> &TransportState {
        &self.state
    }

    /// Copy of the transport state
    pub fn snapshot(&self) -> TransportSnapshot {
        self.state.snapshot()
    }

    /// Check if the metronome is playing
    pub fn is_playing(&self) -> bool {
        self.state.is_playing
    }

    /// Get the live tempo
    pub fn current_bpm(&self) -> u32 {
        self.state.current_bpm
    }

    /// Get the beat that plays next (0-based)
    pub fn current_beat(&self) -> usize {
        self.state.current_beat
    }

    /// Get the current measure (0-based)
    pub fn current_measure(&self) -> u32 {
        self.state.current_measure
    }

    /// Get the number of finished repetitions
    pub fn completed_repetitions(&self) -> u32 {
        self.state.completed_repetitions
    }

    /// Get the progression progress in percent
    pub fn progress_percentage(&self) -> f64 {
        self.state.progress_percentage
    }

    /// Active tempo progression, if one is configured
    pub fn progression(&self) -> Option<&TempoProgression> {
        self.progression.as_ref()
    }

    /// Time left before a seconds-based progression reaches its target
    pub fn progression_remaining_time(&self) -> Option<Duration> {
        let (progression, seconds) = self.seconds_progression()?;
        Some(progression.remaining_time(seconds))
    }

    /// Duration of the whole seconds-based progression
    pub fn progression_total_time(&self) -> Option<Duration> {
        let (progression, seconds) = self.seconds_progression()?;
        Some(progression.total_time(seconds))
    }

    fn seconds_progression(&self) -> Option<(&TempoProgression, Duration)> {
        let plan = self.config.progression.as_ref()?;
        match plan.interval {
            ProgressionInterval::Seconds(seconds) => Some((
                self.progression.as_ref()?,
                Duration::from_secs(u64::from(seconds)),
            )),
            ProgressionInterval::Measures(_) => None,
        }
    }

    /// Lock-free state mirror for other threads
    pub fn shared_state(&self) -> Arc<SharedTransportState> {
        Arc::clone(&self.shared)
    }

    /// Get the timer facility
    pub fn timer(&self) -> &T {
        &self.timer
    }

    /// Get the timer facility mutably
    pub fn timer_mut(&mut self) -> &mut T {
        &mut self.timer
    }

    /// Get the sound player
    pub fn player(&self) -> &P {
        &self.player
    }

    /// Get the sound player mutably
    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    /// Registers an observer; events are delivered synchronously on the scheduling thread
    pub fn add_listener(&mut self, listener: impl TransportListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Start playback with fresh counters
    /// The first beat is armed to fire immediately. No-op when already playing.
    pub fn start(&mut self) -> MetronomeResult<()> {
        if self.state.is_playing {
            return Ok(());
        }

        self.accent_pattern = accent::generate(
            self.config.beats_per_measure(),
            self.config.accent_pattern,
            self.config.custom_positions(),
        )?;

        self.state = TransportState::new(self.config.bpm);
        self.progression = self.config.progression.as_ref().map(TempoProgression::from_plan);
        if let Some(progression) = &self.progression {
            self.state.current_bpm = progression.start_bpm();
            self.state.progress_percentage = progression.progress_percentage();
        }

        self.load_sounds();
        self.state.is_playing = true;

        if let Err(err) = self.timer.arm(TimerSlot::Beat, Duration::ZERO) {
            return Err(self.fail_timer(err));
        }
        if let Some(seconds) = self.progression_timer_interval() {
            if let Err(err) = self.timer.arm(TimerSlot::Progression, seconds) {
                return Err(self.fail_timer(err));
            }
        }

        info!(
            "Metronome started at {} BPM in {} ({} measures, {} repetitions)",
            self.state.current_bpm,
            self.config.time_signature,
            self.config.measures_count,
            self.config.repetition_count
        );
        self.publish();
        self.notify(TransportEvent::Started {
            bpm: self.state.current_bpm,
        });
        Ok(())
    }

    /// Stop playback and cancel every pending timer
    /// Safe from any state, including from inside a beat callback.
    pub fn stop(&mut self) {
        self.stop_with(StopReason::Requested);
    }

    fn stop_with(&mut self, reason: StopReason) {
        if !self.state.is_playing {
            return;
        }

        for slot in TimerSlot::ALL {
            self.timer.cancel(slot);
        }
        self.state.is_playing = false;

        info!("Metronome stopped ({:?})", reason);
        self.publish();
        self.notify(TransportEvent::Stopped { reason });
    }

    /// Validate and apply new settings
    /// On error the previous configuration stays in place. When playing, the
    /// engine restarts so the new settings apply from the next beat on.
    pub fn apply_settings(&mut self, settings: &MetronomeSettings) -> MetronomeResult<()> {
        let config = settings.validate().inspect_err(|err| {
            warn!("Rejected metronome settings: {}", err);
        })?;
        self.apply_config(config)
    }

    /// Apply an already validated configuration
    pub fn apply_config(&mut self, config: MetronomeConfig) -> MetronomeResult<()> {
        let accent_pattern = accent::generate(
            config.beats_per_measure(),
            config.accent_pattern,
            config.custom_positions(),
        )
        .inspect_err(|err| warn!("Rejected metronome configuration: {}", err))?;

        let was_playing = self.state.is_playing;
        if was_playing {
            self.stop_with(StopReason::Reconfigured);
        }

        debug!(
            "Applying metronome configuration: {} BPM, {}, accents {:?}",
            config.bpm, config.time_signature, accent_pattern
        );
        self.progression = config.progression.as_ref().map(TempoProgression::from_plan);
        self.accent_pattern = accent_pattern;
        self.config = config;

        if was_playing {
            self.start()
        } else {
            self.reset_state();
            Ok(())
        }
    }

    /// Stopped state for the current configuration
    fn reset_state(&mut self) {
        self.state = TransportState::new(self.config.bpm);
        if let Some(progression) = &self.progression {
            self.state.current_bpm = progression.current_bpm();
            self.state.progress_percentage = progression.progress_percentage();
        }
        self.publish();
    }

    /// Push a tempo change from outside the beat loop
    ///
    /// Beat and measure positions are untouched; only the wait before the
    /// pending beat changes, keeping the time already elapsed since the last
    /// beat. While stopped this sets the tempo the next start uses.
    pub fn set_bpm(&mut self, bpm: u32) -> MetronomeResult<()> {
        if !(MIN_BPM..=MAX_BPM).contains(&bpm) {
            return Err(ConfigError::BpmOutOfRange {
                bpm,
                min: MIN_BPM,
                max: MAX_BPM,
            }
            .into());
        }

        if !self.state.is_playing {
            self.config.bpm = bpm;
            if let Some(plan) = self.config.progression.as_mut() {
                plan.start_bpm = bpm;
            }
            self.progression = self.config.progression.as_ref().map(TempoProgression::from_plan);
            self.reset_state();
            return Ok(());
        }

        // A running progression keeps the live tempo inside its span
        let bpm = match self.progression.as_mut() {
            Some(progression) => {
                progression.set_current_bpm(bpm);
                progression.current_bpm()
            }
            None => bpm,
        };
        self.change_bpm(bpm)?;

        // Moving back from the target under Hold resumes a stalled seconds progression
        if self.state.is_playing && !self.timer.is_armed(TimerSlot::Progression) {
            if let Some(seconds) = self.progression_timer_interval() {
                if let Err(err) = self.timer.arm(TimerSlot::Progression, seconds) {
                    return Err(self.fail_timer(err));
                }
            }
        }
        Ok(())
    }

    /// Timer callback entry point
    /// Disarms `slot` and runs its callback. Stale firings after a stop are ignored.
    pub fn fire(&mut self, slot: TimerSlot) -> MetronomeResult<()> {
        self.timer.cancel(slot);
        if !self.state.is_playing {
            return Ok(());
        }

        match slot {
            TimerSlot::Beat => {
                if self.state.beats_played > 0 {
                    self.state.elapsed_at_current_bpm += self.state.beat_interval;
                }
                self.play_beat();
                if self.state.is_playing {
                    self.arm_next_beat()?;
                }
                Ok(())
            }
            TimerSlot::Progression => self.progression_tick(),
        }
    }

    /// Play the current beat and advance the counters
    /// Does not arm the next beat; that is [`fire`](Self::fire)'s job.
    pub fn play_beat(&mut self) {
        if !self.state.is_playing {
            return;
        }

        let beat = self.state.current_beat;
        let measure = self.state.current_measure;
        let accented =
            self.config.accent_enabled && self.accent_pattern.get(beat).copied().unwrap_or(false);

        self.play_click(accented);
        self.state.beats_played += 1;
        self.notify(TransportEvent::Beat {
            beat,
            measure,
            accented,
        });

        self.state.current_beat = (beat + 1) % self.accent_pattern.len().max(1);
        if self.state.current_beat == 0 {
            self.complete_measure();
        }

        self.publish();
    }

    fn complete_measure(&mut self) {
        self.state.current_measure = (self.state.current_measure + 1) % self.config.measures_count;
        self.state.measures_at_current_bpm += 1;

        if let Some(ProgressionInterval::Measures(interval)) =
            self.config.progression.as_ref().map(|plan| plan.interval)
        {
            self.measure_progression(interval);
            if !self.state.is_playing {
                return;
            }
        }

        if self.state.current_measure == 0 && self.config.repetition_count > 0 {
            self.state.completed_repetitions += 1;
            self.notify(TransportEvent::RepetitionCompleted {
                completed: self.state.completed_repetitions,
            });
            if self.state.completed_repetitions >= self.config.repetition_count {
                self.stop_with(StopReason::RepetitionsCompleted);
            }
        }
    }

    fn measure_progression(&mut self, interval: u32) {
        let Some(progression) = self.progression.as_mut() else {
            return;
        };

        let played = self.state.measures_at_current_bpm;
        if !progression.is_due(played, interval) {
            return;
        }
        self.state.measures_at_current_bpm = 0;

        match progression.maybe_advance(played, interval) {
            Some(bpm) => {
                // The beat timer is disarmed during a beat, so nothing is rescheduled here
                if let Err(err) = self.change_bpm(bpm) {
                    warn!("Tempo step to {} BPM failed: {}", bpm, err);
                }
            }
            None => {
                if self.target_policy() == TargetPolicy::Stop {
                    self.stop_with(StopReason::TargetReached);
                }
            }
        }
    }

    fn progression_tick(&mut self) -> MetronomeResult<()> {
        let Some(progression) = self.progression.as_mut() else {
            return Ok(());
        };

        match progression.step() {
            Some(bpm) => self.change_bpm(bpm)?,
            None => {
                if self.target_policy() == TargetPolicy::Stop {
                    self.stop_with(StopReason::TargetReached);
                    return Ok(());
                }
            }
        }

        if self.state.is_playing {
            if let Some(seconds) = self.progression_timer_interval() {
                if let Err(err) = self.timer.arm(TimerSlot::Progression, seconds) {
                    return Err(self.fail_timer(err));
                }
            }
        }
        Ok(())
    }

    /// Interval of the progression timer, None when it should not run
    /// Under Hold it stops once the target is reached; under Stop it runs
    /// one more interval so the target tempo is heard before stopping.
    fn progression_timer_interval(&self) -> Option<Duration> {
        let plan = self.config.progression.as_ref()?;
        let progression = self.progression.as_ref()?;
        let ProgressionInterval::Seconds(seconds) = plan.interval else {
            return None;
        };
        if progression.is_complete() && plan.target_policy == TargetPolicy::Hold {
            return None;
        }
        Some(Duration::from_secs(u64::from(seconds)))
    }

    fn target_policy(&self) -> TargetPolicy {
        self.config
            .progression
            .as_ref()
            .map_or(TargetPolicy::Hold, |plan| plan.target_policy)
    }

    /// Switch the live tempo, resetting the per-tempo counters
    /// If a beat is pending, its deadline moves so that the time since the
    /// last beat plus the new wait equals one beat at the new tempo.
    fn change_bpm(&mut self, bpm: u32) -> MetronomeResult<()> {
        let previous = self.state.current_bpm;
        self.state.current_bpm = bpm;
        self.state.measures_at_current_bpm = 0;
        self.state.elapsed_at_current_bpm = Duration::ZERO;
        if let Some(progression) = &self.progression {
            self.state.progress_percentage = progression.progress_percentage();
        }

        if let Some(remaining) = self.timer.remaining(TimerSlot::Beat) {
            let elapsed = self.state.beat_interval.saturating_sub(remaining);
            let interval = beat_interval(bpm);
            self.state.beat_interval = interval;
            if let Err(err) = self
                .timer
                .reschedule(TimerSlot::Beat, interval.saturating_sub(elapsed))
            {
                return Err(self.fail_timer(err));
            }
        }

        debug!(
            "Tempo {} -> {} BPM ({:.0}% of progression)",
            previous, bpm, self.state.progress_percentage
        );
        self.publish();
        self.notify(TransportEvent::BpmChanged {
            bpm,
            progress_percentage: self.state.progress_percentage,
        });
        Ok(())
    }

    fn arm_next_beat(&mut self) -> MetronomeResult<()> {
        let interval = beat_interval(self.state.current_bpm);
        self.state.beat_interval = interval;
        self.timer
            .arm(TimerSlot::Beat, interval)
            .map_err(|err| self.fail_timer(err))
    }

    /// A timer that cannot be armed ends the session
    fn fail_timer(&mut self, err: TimerError) -> MetronomeError {
        error!("Metronome timer failure: {}", err);
        self.stop_with(StopReason::TimerFailure(err.to_string()));
        MetronomeError::Timer(err)
    }

    fn load_sounds(&mut self) {
        self.click_sound = load_sound(&mut self.player, &self.config.click_sound_id);
        self.accent_sound = load_sound(&mut self.player, &self.config.accent_sound_id);
    }

    fn play_click(&mut self, accented: bool) {
        let sound = if accented {
            &self.accent_sound
        } else {
            &self.click_sound
        };

        match sound {
            Some(sound) => {
                if let Err(err) = self.player.play(sound) {
                    warn!("Metronome click failed, beat is silent: {}", err);
                }
            }
            None => debug!("No sound loaded, silent beat"),
        }
    }

    fn publish(&self) {
        self.shared.publish(&self.state);
    }

    fn notify(&mut self, event: TransportEvent) {
        for listener in &mut self.listeners {
            listener.on_event(&event);
        }
    }
}

fn load_sound<P: SoundPlayer>(player: &mut P, id: &str) -> Option<SoundHandle> {
    player
        .load(id)
        .inspect_err(|err| warn!("Cannot load metronome sound {}: {}", id, err))
        .ok()
}

impl<P: SoundPlayer> BeatScheduler<ManualTimer, P> {
    /// Jump virtual time to the next due timer and fire it
    /// Returns the slot that fired, None once nothing is armed.
    pub fn advance(&mut self) -> MetronomeResult<Option<TimerSlot>> {
        let Some(slot) = self.timer.advance() else {
            return Ok(None);
        };
        self.fire(slot)?;
        Ok(Some(slot))
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.timer.now()
    }
}
