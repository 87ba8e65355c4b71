// Accent patterns - Which beats of a measure get the accent click
// Pure functions of their inputs, recomputed whenever the meter or pattern changes.

use super::settings::AccentPattern;
use super::ConfigError;

/// Generates one accent flag per beat of the measure
///
/// * `Standard` - beat 0 only
/// * `OffBeat` - every odd-indexed beat, beat 0 is never accented
/// * `Custom` - exactly the listed positions; positions past the end of the
///   measure are ignored and an empty list means no accents at all
///
/// Fails with [`ConfigError::ZeroBeatsPerMeasure`] for an empty measure.
pub fn generate(
    beats_per_measure: usize,
    pattern: AccentPattern,
    custom_positions: &[usize],
) -> Result<Vec<bool>, ConfigError> {
    if beats_per_measure == 0 {
        return Err(ConfigError::ZeroBeatsPerMeasure);
    }

    let accents = match pattern {
        AccentPattern::Standard => (0..beats_per_measure).map(|beat| beat == 0).collect(),
        AccentPattern::OffBeat => (0..beats_per_measure).map(|beat| beat % 2 == 1).collect(),
        AccentPattern::Custom => {
            let mut accents = vec![false; beats_per_measure];
            for &position in custom_positions {
                if let Some(flag) = accents.get_mut(position) {
                    *flag = true;
                }
            }
            accents
        }
    };

    Ok(accents)
}

/// Conventional accent positions for a meter, used as a starting suggestion
/// for the custom pattern editor
///
/// Compound meters accent every third beat, 5 and 7 are grouped 3+2 and
/// 3+2+2. Any other meter gets a single downbeat accent.
pub fn default_pattern_for_meter(beats_per_measure: usize) -> Vec<bool> {
    let positions: &[usize] = match beats_per_measure {
        0 => &[],
        2..=4 => &[0],
        5 | 6 => &[0, 3],
        7 => &[0, 3, 5],
        9 => &[0, 3, 6],
        12 => &[0, 3, 6, 9],
        _ => &[0],
    };

    let mut accents = vec![false; beats_per_measure];
    for &position in positions {
        accents[position] = true;
    }
    accents
}

/// Accent positions of a flag sequence, handy for seeding custom patterns
pub fn accent_positions(accents: &[bool]) -> Vec<usize> {
    accents
        .iter()
        .enumerate()
        .filter_map(|(beat, &accented)| accented.then_some(beat))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_pattern() {
        assert_eq!(
            generate(4, AccentPattern::Standard, &[]).unwrap(),
            vec![true, false, false, false]
        );
        assert_eq!(generate(1, AccentPattern::Standard, &[]).unwrap(), vec![true]);
    }

    #[test]
    fn test_offbeat_pattern() {
        assert_eq!(
            generate(4, AccentPattern::OffBeat, &[]).unwrap(),
            vec![false, true, false, true]
        );
        // Odd meters follow the same odd-index rule
        assert_eq!(
            generate(5, AccentPattern::OffBeat, &[]).unwrap(),
            vec![false, true, false, true, false]
        );
    }

    #[test]
    fn test_custom_pattern() {
        assert_eq!(
            generate(4, AccentPattern::Custom, &[0, 2]).unwrap(),
            vec![true, false, true, false]
        );
        assert_eq!(
            generate(4, AccentPattern::Custom, &[]).unwrap(),
            vec![false; 4]
        );
        // Out of range positions are dropped, duplicates are harmless
        assert_eq!(
            generate(3, AccentPattern::Custom, &[2, 2, 3, 99]).unwrap(),
            vec![false, false, true]
        );
    }

    #[test]
    fn test_standard_ignores_custom_positions() {
        assert_eq!(
            generate(3, AccentPattern::Standard, &[1, 2]).unwrap(),
            vec![true, false, false]
        );
    }

    #[test]
    fn test_empty_measure_is_an_error() {
        for pattern in AccentPattern::ALL {
            assert_eq!(
                generate(0, pattern, &[0]),
                Err(ConfigError::ZeroBeatsPerMeasure)
            );
        }
    }

    #[test]
    fn test_generate_is_deterministic() {
        for beats in 1..=12 {
            for pattern in AccentPattern::ALL {
                let first = generate(beats, pattern, &[1, 4, 7]).unwrap();
                let second = generate(beats, pattern, &[1, 4, 7]).unwrap();
                assert_eq!(first, second);
                assert_eq!(first.len(), beats);
            }
        }
    }

    #[test]
    fn test_default_patterns() {
        assert_eq!(accent_positions(&default_pattern_for_meter(4)), vec![0]);
        assert_eq!(accent_positions(&default_pattern_for_meter(5)), vec![0, 3]);
        assert_eq!(accent_positions(&default_pattern_for_meter(6)), vec![0, 3]);
        assert_eq!(accent_positions(&default_pattern_for_meter(7)), vec![0, 3, 5]);
        assert_eq!(accent_positions(&default_pattern_for_meter(9)), vec![0, 3, 6]);
        assert_eq!(
            accent_positions(&default_pattern_for_meter(12)),
            vec![0, 3, 6, 9]
        );
    }

    #[test]
    fn test_default_pattern_fallback() {
        assert_eq!(default_pattern_for_meter(1), vec![true]);
        assert_eq!(accent_positions(&default_pattern_for_meter(11)), vec![0]);
        assert_eq!(default_pattern_for_meter(11).len(), 11);
        assert!(default_pattern_for_meter(0).is_empty());
    }
}
