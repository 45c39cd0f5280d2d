//! Pitch resolution: turns a score note's `(tuning, pitch)` pair into a
//! frequency in Hz (SPEC_FULL.md §4.17). Supplemented from
//! `original_source/src/JsonInterpreter.h`'s pitch-handling conventions,
//! since the distilled score grammar names the three tuning systems but
//! not their resolution rule.

use crate::error::{RenderError, Result};
use serde::Deserialize;

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(tag = "system")]
pub enum Tuning {
    /// The pitch value *is* the frequency, in Hz.
    #[serde(rename = "freq")]
    Freq,
    /// `NN` equal divisions of the octave; pitch is a signed step count
    /// from `key`.
    #[serde(rename = "edo")]
    Edo { divisions: u32 },
    /// A rational ratio `num/den` relative to `key`.
    #[serde(rename = "just")]
    Just,
}

#[derive(Clone, Copy, Debug)]
pub enum Pitch {
    Freq(f64),
    Edo(i64),
    Just { num: i64, den: i64 },
}

/// Parses the score grammar's `notes.tuning` tag (`"freq"`, `"edo12"`,
/// `"edo19"`, `"edo31"`, `"just"`, ...) into a `Tuning`.
pub fn parse_tuning_tag(tag: &str) -> Result<Tuning> {
    match tag {
        "freq" => Ok(Tuning::Freq),
        "just" => Ok(Tuning::Just),
        other => {
            let divisions = other
                .strip_prefix("edo")
                .and_then(|n| n.parse::<u32>().ok())
                .ok_or_else(|| RenderError::invalid("notes.tuning", format!("unrecognised tuning tag '{other}'")))?;
            Ok(Tuning::Edo { divisions })
        }
    }
}

/// Parses one `notes.values` entry's raw pitch value against the tuning
/// system already resolved for its part.
pub fn parse_pitch(tuning: Tuning, raw: &serde_json::Value) -> Result<Pitch> {
    match tuning {
        Tuning::Freq => raw
            .as_f64()
            .map(Pitch::Freq)
            .ok_or_else(|| RenderError::invalid("notes.values[].pitch", "freq tuning needs a numeric pitch")),
        Tuning::Edo { .. } => raw
            .as_i64()
            .map(Pitch::Edo)
            .ok_or_else(|| RenderError::invalid("notes.values[].pitch", "edo tuning needs an integer step count")),
        Tuning::Just => match raw {
            serde_json::Value::Array(pair) if pair.len() == 2 => {
                let num = pair[0]
                    .as_i64()
                    .ok_or_else(|| RenderError::invalid("notes.values[].pitch", "just ratio numerator must be an integer"))?;
                let den = pair[1]
                    .as_i64()
                    .ok_or_else(|| RenderError::invalid("notes.values[].pitch", "just ratio denominator must be an integer"))?;
                Ok(Pitch::Just { num, den })
            }
            serde_json::Value::Number(n) => {
                let ratio = n.as_f64().ok_or_else(|| RenderError::invalid("notes.values[].pitch", "just ratio must be numeric"))?;
                let den = 1_000_000i64;
                Ok(Pitch::Just { num: (ratio * den as f64).round() as i64, den })
            }
            _ => Err(RenderError::invalid("notes.values[].pitch", "just tuning needs a [num, den] pair or a decimal ratio")),
        },
    }
}

/// Resolves `pitch` under `tuning` against the score's `key` (the
/// reference frequency in Hz, `meta.key`).
pub fn resolve(tuning: Tuning, pitch: Pitch, key_hz: f64) -> Result<f64> {
    match (tuning, pitch) {
        (Tuning::Freq, Pitch::Freq(hz)) => Ok(hz),
        (Tuning::Edo { divisions }, Pitch::Edo(step)) => {
            if divisions == 0 {
                return Err(RenderError::invalid("notes.tuning", "edo divisions must be nonzero"));
            }
            Ok(key_hz * 2f64.powf(step as f64 / divisions as f64))
        }
        (Tuning::Just, Pitch::Just { num, den }) => {
            if den == 0 {
                return Err(RenderError::invalid("notes.tuning", "just intonation denominator must be nonzero"));
            }
            Ok(key_hz * (num as f64 / den as f64))
        }
        _ => Err(RenderError::invalid("notes.tuning", "pitch value shape does not match the declared tuning system")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freq_tuning_passes_through() {
        let hz = resolve(Tuning::Freq, Pitch::Freq(440.0), 220.0).unwrap();
        assert_eq!(hz, 440.0);
    }

    #[test]
    fn edo12_one_octave_up_doubles_frequency() {
        let hz = resolve(Tuning::Edo { divisions: 12 }, Pitch::Edo(12), 220.0).unwrap();
        assert!((hz - 440.0).abs() < 1e-9);
    }

    #[test]
    fn edo12_a_fifth_up_is_about_1_5x() {
        let hz = resolve(Tuning::Edo { divisions: 12 }, Pitch::Edo(7), 220.0).unwrap();
        assert!((hz - 329.63).abs() < 0.1);
    }

    #[test]
    fn just_perfect_fifth_is_exactly_three_halves() {
        let hz = resolve(Tuning::Just, Pitch::Just { num: 3, den: 2 }, 200.0).unwrap();
        assert!((hz - 300.0).abs() < 1e-9);
    }

    #[test]
    fn mismatched_pitch_shape_is_an_error() {
        assert!(resolve(Tuning::Freq, Pitch::Edo(3), 200.0).is_err());
    }

    #[test]
    fn parses_edo_tag_divisions() {
        match parse_tuning_tag("edo31").unwrap() {
            Tuning::Edo { divisions } => assert_eq!(divisions, 31),
            _ => panic!("expected Edo"),
        }
    }

    #[test]
    fn parses_pitch_shapes_per_tuning() {
        let just = parse_pitch(Tuning::Just, &serde_json::json!([3, 2])).unwrap();
        match just {
            Pitch::Just { num, den } => assert_eq!((num, den), (3, 2)),
            _ => panic!("expected Just"),
        }
        let edo = parse_pitch(Tuning::Edo { divisions: 12 }, &serde_json::json!(7)).unwrap();
        matches!(edo, Pitch::Edo(7));
    }
}
