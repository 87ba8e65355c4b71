// Sounds - Click playback collaborator of the scheduler
// Pre-generates short click samples so triggering a beat never allocates.

use super::settings::ClickSound;
use hound::{SampleFormat, WavReader};
use std::collections::HashMap;
use std::f32::consts::PI;
use std::path::Path;
use thiserror::Error;

/// Sound asset failure
/// Never stops the transport; the scheduler logs it and beats silently.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SoundError {
    #[error("Sound not found: {0}")]
    NotFound(String),

    #[error("Sound {id} could not be decoded: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Playback of {id} failed: {reason}")]
    PlaybackFailed { id: String, reason: String },
}

/// Loaded, playable sound
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SoundHandle {
    id: String,
    slot: usize,
}

impl SoundHandle {
    pub fn new(id: impl Into<String>, slot: usize) -> Self {
        Self {
            id: id.into(),
            slot,
        }
    }

    /// Id the sound was loaded from
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Player-specific index
    pub fn slot(&self) -> usize {
        self.slot
    }
}

/// Resolves sound ids and plays them, fire-and-forget
pub trait SoundPlayer {
    fn load(&mut self, id: &str) -> Result<SoundHandle, SoundError>;

    /// Starts playback and returns immediately
    fn play(&mut self, sound: &SoundHandle) -> Result<(), SoundError>;
}

impl<P: SoundPlayer + ?Sized> SoundPlayer for Box<P> {
    fn load(&mut self, id: &str) -> Result<SoundHandle, SoundError> {
        (**self).load(id)
    }

    fn play(&mut self, sound: &SoundHandle) -> Result<(), SoundError> {
        (**self).play(sound)
    }
}

/// Synthesis parameters of one click
#[derive(Debug, Clone, Copy, PartialEq)]
struct ClickVoicing {
    frequency: f32,
    amplitude: f32,
    duration_ms: f32,
    decay: f32,
}

impl ClickVoicing {
    fn for_preset(sound: ClickSound, accent: bool) -> Self {
        let (frequency, amplitude, duration_ms, decay) = match (sound, accent) {
            (ClickSound::Click, false) => (800.0, 0.4, 10.0, 8.0),
            (ClickSound::Click, true) => (1200.0, 0.6, 10.0, 8.0),
            (ClickSound::Wood, false) => (500.0, 0.45, 15.0, 12.0),
            (ClickSound::Wood, true) => (700.0, 0.65, 15.0, 12.0),
            (ClickSound::Digital, false) => (1000.0, 0.35, 8.0, 4.0),
            (ClickSound::Digital, true) => (1500.0, 0.55, 8.0, 4.0),
            (ClickSound::Beep, false) => (440.0, 0.35, 40.0, 3.0),
            (ClickSound::Beep, true) => (880.0, 0.55, 40.0, 3.0),
        };
        Self {
            frequency,
            amplitude,
            duration_ms,
            decay,
        }
    }

    /// Sine burst with an exponential decay envelope
    fn render(&self, sample_rate: f32) -> Vec<f32> {
        let num_samples = ((self.duration_ms / 1000.0) * sample_rate) as usize;
        let phase_increment = 2.0 * PI * self.frequency / sample_rate;

        (0..num_samples)
            .map(|i| {
                let t = i as f32 / num_samples as f32;
                let envelope = (-t * self.decay).exp();
                (i as f32 * phase_increment).sin() * envelope * self.amplitude
            })
            .collect()
    }
}

/// Active click playback state
#[derive(Debug, Clone, Copy)]
struct ClickPlayback {
    slot: usize,
    position: usize,
}

/// In-memory click bank with a single playback voice
/// Knows every [`ClickSound`] preset id; other ids can be registered with
/// decoded samples. A new click cuts off the one still ringing.
#[derive(Debug, Clone)]
pub struct ClickSynth {
    sample_rate: f32,
    ids: HashMap<String, usize>,
    samples: Vec<Vec<f32>>,
    current: Option<ClickPlayback>,
    volume: f32,
    played: u64,
}

impl ClickSynth {
    pub fn new(sample_rate: f32) -> Self {
        let mut synth = Self {
            sample_rate,
            ids: HashMap::new(),
            samples: Vec::new(),
            current: None,
            volume: 1.0,
            played: 0,
        };

        for sound in ClickSound::ALL {
            let regular = ClickVoicing::for_preset(sound, false).render(sample_rate);
            let accent = ClickVoicing::for_preset(sound, true).render(sample_rate);
            synth.register(sound.filename(), regular);
            synth.register(&sound.accent_filename(), accent);
        }

        synth
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Adds (or replaces) a sound under `id`
    pub fn register(&mut self, id: &str, samples: Vec<f32>) {
        match self.ids.get(id) {
            Some(&slot) => self.samples[slot] = samples,
            None => {
                self.ids.insert(id.to_string(), self.samples.len());
                self.samples.push(samples);
            }
        }
    }

    /// Registers a click decoded from a WAV file, mixed down to mono
    /// The file is not resampled; a rate mismatch only shifts the pitch.
    pub fn register_wav(&mut self, id: &str, path: &Path) -> Result<(), SoundError> {
        let corrupt = |reason: String| SoundError::Corrupt {
            id: id.to_string(),
            reason,
        };

        let reader = WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(_) => SoundError::NotFound(path.display().to_string()),
            other => corrupt(other.to_string()),
        })?;
        let spec = reader.spec();
        if spec.sample_rate as f32 != self.sample_rate {
            log::warn!(
                "Click {} is {} Hz, playing at {} Hz",
                id,
                spec.sample_rate,
                self.sample_rate
            );
        }

        let interleaved: Vec<f32> = match spec.sample_format {
            SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| corrupt(e.to_string()))?,
            SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|sample| sample.map(|s| s as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| corrupt(e.to_string()))?
            }
        };

        let channels = usize::from(spec.channels.max(1));
        let mono: Vec<f32> = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect();
        if mono.is_empty() {
            return Err(corrupt("no samples".to_string()));
        }

        self.register(id, mono);
        Ok(())
    }

    /// Samples of a loaded sound
    pub fn samples(&self, sound: &SoundHandle) -> Option<&[f32]> {
        self.samples.get(sound.slot()).map(Vec::as_slice)
    }

    /// Set output volume (0.0 to 1.0)
    pub fn set_volume(&mut self, volume: f32) {
        self.volume = volume.clamp(0.0, 1.0);
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    /// Number of clicks triggered so far
    pub fn played(&self) -> u64 {
        self.played
    }

    pub fn is_sounding(&self) -> bool {
        self.current.is_some()
    }

    /// Process one sample of output (0.0 when silent)
    pub fn process_sample(&mut self) -> f32 {
        let Some(playback) = self.current.as_mut() else {
            return 0.0;
        };

        match self.samples[playback.slot].get(playback.position) {
            Some(&sample) => {
                playback.position += 1;
                sample * self.volume
            }
            None => {
                self.current = None;
                0.0
            }
        }
    }

    /// Fills `output` with click audio
    pub fn process_buffer(&mut self, output: &mut [f32]) {
        for sample in output.iter_mut() {
            *sample = self.process_sample();
        }
    }

    /// Stops the ringing click
    pub fn reset(&mut self) {
        self.current = None;
    }
}

impl SoundPlayer for ClickSynth {
    fn load(&mut self, id: &str) -> Result<SoundHandle, SoundError> {
        let slot = *self
            .ids
            .get(id)
            .ok_or_else(|| SoundError::NotFound(id.to_string()))?;
        if self.samples[slot].is_empty() {
            return Err(SoundError::Corrupt {
                id: id.to_string(),
                reason: "no samples".to_string(),
            });
        }
        Ok(SoundHandle::new(id, slot))
    }

    fn play(&mut self, sound: &SoundHandle) -> Result<(), SoundError> {
        if sound.slot() >= self.samples.len() {
            return Err(SoundError::PlaybackFailed {
                id: sound.id().to_string(),
                reason: "handle does not belong to this player".to_string(),
            });
        }
        self.current = Some(ClickPlayback {
            slot: sound.slot(),
            position: 0,
        });
        self.played += 1;
        Ok(())
    }
}
