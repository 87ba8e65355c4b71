// Metronome settings - Persisted configuration record and its validated form
// MetronomeSettings is what the UI edits and the store persists; MetronomeConfig
// is what the scheduler runs on.

use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Lowest tempo the engine accepts
pub const MIN_BPM: u32 = 40;
/// Highest tempo the engine accepts
pub const MAX_BPM: u32 = 300;
/// Tempo used for new settings
pub const DEFAULT_BPM: u32 = 120;

/// Time signature (numerator/denominator)
/// Example: 6/8 time = TimeSignature { numerator: 6, denominator: 8 }
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per measure
    pub denominator: u8, // Note value (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Meters offered by the practice UI
    pub const PRESETS: [TimeSignature; 8] = [
        Self::const_new(2, 4),
        Self::const_new(3, 4),
        Self::const_new(4, 4),
        Self::const_new(5, 4),
        Self::const_new(6, 8),
        Self::const_new(7, 8),
        Self::const_new(9, 8),
        Self::const_new(12, 8),
    ];

    const fn const_new(numerator: u8, denominator: u8) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Creates a checked time signature
    pub fn new(numerator: u8, denominator: u8) -> Result<Self, ConfigError> {
        let signature = Self::const_new(numerator, denominator);
        signature.validate()?;
        Ok(signature)
    }

    pub fn two_four() -> Self {
        Self::const_new(2, 4)
    }

    pub fn three_four() -> Self {
        Self::const_new(3, 4)
    }

    pub fn four_four() -> Self {
        Self::const_new(4, 4)
    }

    pub fn five_four() -> Self {
        Self::const_new(5, 4)
    }

    pub fn six_eight() -> Self {
        Self::const_new(6, 8)
    }

    pub fn seven_eight() -> Self {
        Self::const_new(7, 8)
    }

    pub fn nine_eight() -> Self {
        Self::const_new(9, 8)
    }

    pub fn twelve_eight() -> Self {
        Self::const_new(12, 8)
    }

    /// Number of beats per measure
    pub fn beats_per_measure(&self) -> usize {
        self.numerator as usize
    }

    /// Checks a signature that may have come from a hand-edited or corrupted file
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.numerator == 0 || !self.denominator.is_power_of_two() {
            return Err(ConfigError::InvalidTimeSignature {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        Ok(())
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

impl FromStr for TimeSignature {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numerator, denominator) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| ConfigError::UnparsableTimeSignature(s.to_string()))?;
        let numerator = numerator
            .trim()
            .parse::<u8>()
            .map_err(|_| ConfigError::UnparsableTimeSignature(s.to_string()))?;
        let denominator = denominator
            .trim()
            .parse::<u8>()
            .map_err(|_| ConfigError::UnparsableTimeSignature(s.to_string()))?;
        Self::new(numerator, denominator)
    }
}

/// Which beats of a measure carry an accent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AccentPattern {
    /// First beat of the measure only
    #[default]
    Standard,
    /// Every odd-indexed beat (the "and" of a two-beat feel)
    OffBeat,
    /// User-chosen beat positions
    Custom,
}

impl AccentPattern {
    pub const ALL: [AccentPattern; 3] = [Self::Standard, Self::OffBeat, Self::Custom];

    pub fn display_name(&self) -> &'static str {
        match self {
            AccentPattern::Standard => "Standard",
            AccentPattern::OffBeat => "Off-beat",
            AccentPattern::Custom => "Custom",
        }
    }
}

/// Built-in click sound sets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ClickSound {
    #[default]
    Click,
    Wood,
    Digital,
    Beep,
}

impl ClickSound {
    pub const ALL: [ClickSound; 4] = [Self::Click, Self::Wood, Self::Digital, Self::Beep];

    /// Asset name of the regular click
    pub fn filename(&self) -> &'static str {
        match self {
            ClickSound::Click => "metronome-click",
            ClickSound::Wood => "metronome-wood",
            ClickSound::Digital => "metronome-digital",
            ClickSound::Beep => "metronome-beep",
        }
    }

    /// Asset name of the accented click
    pub fn accent_filename(&self) -> String {
        format!("{}-accent", self.filename())
    }

    /// Resolves a sound id (regular or accent) back to its preset
    pub fn from_sound_id(id: &str) -> Option<Self> {
        let base = id.strip_suffix("-accent").unwrap_or(id);
        Self::ALL.into_iter().find(|sound| sound.filename() == base)
    }
}

impl fmt::Display for ClickSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClickSound::Click => "Click",
            ClickSound::Wood => "Wood",
            ClickSound::Digital => "Digital",
            ClickSound::Beep => "Beep",
        };
        f.write_str(name)
    }
}

/// Unit of the tempo progression interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ProgressionIntervalKind {
    #[default]
    Measures,
    Seconds,
}

/// What the engine does once a progression reaches its target tempo
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TargetPolicy {
    /// Keep looping at the target tempo (repetition count still applies)
    #[default]
    Hold,
    /// Stop after the target tempo has been held for one progression interval
    Stop,
}

/// Persisted metronome configuration of one practice item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetronomeSettings {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    /// Length of the loop used for repetition accounting
    pub measures_count: u32,
    /// Number of loops before auto-stop, 0 = infinite
    pub repetition_count: u32,
    pub accent_enabled: bool,
    pub accent_pattern: AccentPattern,
    /// Zero-based beat indices, only read when `accent_pattern` is Custom
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_accent_positions: Option<BTreeSet<usize>>,
    pub click_sound_id: String,
    pub accent_sound_id: String,

    // Tempo progression
    pub progression_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_bpm: Option<u32>,
    pub bpm_increment: u32,
    pub progression_interval: ProgressionIntervalKind,
    pub progression_interval_value: u32,
    pub target_policy: TargetPolicy,
}

impl Default for MetronomeSettings {
    fn default() -> Self {
        let sound = ClickSound::default();
        Self {
            bpm: DEFAULT_BPM,
            time_signature: TimeSignature::default(),
            measures_count: 4,
            repetition_count: 0,
            accent_enabled: true,
            accent_pattern: AccentPattern::Standard,
            custom_accent_positions: None,
            click_sound_id: sound.filename().to_string(),
            accent_sound_id: sound.accent_filename(),
            progression_enabled: false,
            target_bpm: None,
            bpm_increment: 5,
            progression_interval: ProgressionIntervalKind::Measures,
            progression_interval_value: 4,
            target_policy: TargetPolicy::Hold,
        }
    }
}

impl MetronomeSettings {
    /// Selects both sound ids from a preset
    pub fn set_click_sound(&mut self, sound: ClickSound) {
        self.click_sound_id = sound.filename().to_string();
        self.accent_sound_id = sound.accent_filename();
    }

    /// Builder-style variant of [`set_click_sound`](Self::set_click_sound)
    pub fn with_click_sound(mut self, sound: ClickSound) -> Self {
        self.set_click_sound(sound);
        self
    }

    /// Enables a progression from `bpm` towards `target_bpm`
    pub fn with_progression(
        mut self,
        target_bpm: u32,
        bpm_increment: u32,
        interval: ProgressionIntervalKind,
        interval_value: u32,
    ) -> Self {
        self.progression_enabled = true;
        self.target_bpm = Some(target_bpm);
        self.bpm_increment = bpm_increment;
        self.progression_interval = interval;
        self.progression_interval_value = interval_value;
        self
    }

    /// Checks every field and produces the configuration the scheduler runs on
    pub fn validate(&self) -> Result<MetronomeConfig, ConfigError> {
        check_bpm(self.bpm)?;
        self.time_signature.validate()?;
        if self.measures_count == 0 {
            return Err(ConfigError::ZeroMeasuresCount);
        }

        let progression = if self.progression_enabled {
            let target_bpm = self.target_bpm.ok_or(ConfigError::MissingTargetBpm)?;
            check_bpm(target_bpm).map_err(|_| ConfigError::TargetBpmOutOfRange {
                target_bpm,
                min: MIN_BPM,
                max: MAX_BPM,
            })?;
            if self.bpm_increment == 0 {
                return Err(ConfigError::ZeroBpmIncrement);
            }
            if self.progression_interval_value == 0 {
                return Err(ConfigError::ZeroProgressionInterval);
            }
            let interval = match self.progression_interval {
                ProgressionIntervalKind::Measures => {
                    ProgressionInterval::Measures(self.progression_interval_value)
                }
                ProgressionIntervalKind::Seconds => {
                    ProgressionInterval::Seconds(self.progression_interval_value)
                }
            };
            Some(ProgressionPlan {
                start_bpm: self.bpm,
                target_bpm,
                bpm_increment: self.bpm_increment,
                interval,
                target_policy: self.target_policy,
            })
        } else {
            None
        };

        // Positions are only meaningful for the custom pattern
        let custom_accent_positions = match self.accent_pattern {
            AccentPattern::Custom => self
                .custom_accent_positions
                .as_ref()
                .map(|positions| positions.iter().copied().collect()),
            _ => None,
        };

        Ok(MetronomeConfig {
            bpm: self.bpm,
            time_signature: self.time_signature,
            measures_count: self.measures_count,
            repetition_count: self.repetition_count,
            accent_enabled: self.accent_enabled,
            accent_pattern: self.accent_pattern,
            custom_accent_positions,
            click_sound_id: self.click_sound_id.clone(),
            accent_sound_id: self.accent_sound_id.clone(),
            progression,
        })
    }
}

fn check_bpm(bpm: u32) -> Result<(), ConfigError> {
    if (MIN_BPM..=MAX_BPM).contains(&bpm) {
        Ok(())
    } else {
        Err(ConfigError::BpmOutOfRange {
            bpm,
            min: MIN_BPM,
            max: MAX_BPM,
        })
    }
}

/// Progression interval with its unit attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressionInterval {
    Measures(u32),
    Seconds(u32),
}

impl fmt::Display for ProgressionInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressionInterval::Measures(1) => write!(f, "every measure"),
            ProgressionInterval::Measures(n) => write!(f, "every {} measures", n),
            ProgressionInterval::Seconds(n) => write!(f, "every {} s", n),
        }
    }
}

/// Validated tempo progression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressionPlan {
    pub start_bpm: u32,
    pub target_bpm: u32,
    pub bpm_increment: u32,
    pub interval: ProgressionInterval,
    pub target_policy: TargetPolicy,
}

/// Configuration the scheduler runs on, produced by [`MetronomeSettings::validate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetronomeConfig {
    pub bpm: u32,
    pub time_signature: TimeSignature,
    pub measures_count: u32,
    pub repetition_count: u32,
    pub accent_enabled: bool,
    pub accent_pattern: AccentPattern,
    pub custom_accent_positions: Option<Vec<usize>>,
    pub click_sound_id: String,
    pub accent_sound_id: String,
    pub progression: Option<ProgressionPlan>,
}

impl Default for MetronomeConfig {
    fn default() -> Self {
        let defaults = MetronomeSettings::default();
        Self {
            bpm: defaults.bpm,
            time_signature: defaults.time_signature,
            measures_count: defaults.measures_count,
            repetition_count: defaults.repetition_count,
            accent_enabled: defaults.accent_enabled,
            accent_pattern: defaults.accent_pattern,
            custom_accent_positions: None,
            click_sound_id: defaults.click_sound_id,
            accent_sound_id: defaults.accent_sound_id,
            progression: None,
        }
    }
}

impl MetronomeConfig {
    pub fn beats_per_measure(&self) -> usize {
        self.time_signature.beats_per_measure()
    }

    /// Custom positions as a slice, empty when absent
    pub fn custom_positions(&self) -> &[usize] {
        self.custom_accent_positions.as_deref().unwrap_or(&[])
    }
}
