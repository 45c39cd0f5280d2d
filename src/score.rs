//! The JSON score schema (spec.md §6) and its loader. Grounded on the
//! teacher's `src/inp/arg_parse.rs::load_score_from_file`, which reads a
//! whole score file and hands it to `serde_json` in one shot; generalized
//! here to the richer nested grammar this renderer actually needs instead
//! of the teacher's flat `DruidicScore`.

use crate::error::{RenderError, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Score {
    pub meta: Meta,
    #[serde(default)]
    pub mixer: Mixer,
    pub parts: HashMap<String, Part>,
}

#[derive(Debug, Deserialize)]
pub struct Meta {
    pub name: Option<String>,
    pub tempo: f64,
    pub key: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct Mixer {
    pub volume: Option<f32>,
    #[serde(default)]
    pub fx: Vec<Fx>,
    #[serde(default)]
    pub busses: Vec<Bus>,
}

#[derive(Debug, Deserialize)]
pub struct Bus {
    pub name: String,
    #[serde(default)]
    pub fx: Vec<Fx>,
    pub volume: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct Output {
    pub path: Vec<PathSegment>,
    pub volume: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Name(String),
    Index(i64),
}

#[derive(Debug, Deserialize)]
pub struct Part {
    pub duplication: Option<u32>,
    pub instrument: Instrument,
    pub volume: Option<f32>,
    #[serde(default)]
    pub outputs: Vec<Output>,
    #[serde(default)]
    pub fx: Vec<Fx>,
    pub notes: Notes,
}

/// Either a bare instrument-name shorthand (`"sine"`) or a fully
/// parameterized object (`{"type": "pwmage", "chorus_cents": 6.0}`).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Instrument {
    Named(String),
    Detailed(InstrumentSpec),
}

impl Instrument {
    pub fn kind(&self) -> &str {
        match self {
            Instrument::Named(name) => name.as_str(),
            Instrument::Detailed(spec) => spec.kind.as_str(),
        }
    }

    pub fn params(&self) -> Option<&serde_json::Value> {
        match self {
            Instrument::Named(_) => None,
            Instrument::Detailed(spec) => Some(&spec.params),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InstrumentSpec {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct Notes {
    pub tuning: String,
    #[serde(default = "default_timing")]
    pub timing: String,
    pub minduration: Option<f64>,
    #[serde(default)]
    pub db: bool,
    pub dur: Option<f64>,
    pub transpose: Option<f64>,
    pub values: Vec<NoteEntry>,
}

fn default_timing() -> String {
    "absolute".to_string()
}

/// One `[pitch, beat|(beat_rel, art), amp?]` triple from `notes.values`.
/// Kept as raw JSON values since the second element's shape depends on
/// `notes.timing` and is resolved by the interpreter, not at parse time.
#[derive(Debug, Deserialize)]
#[serde(try_from = "Vec<serde_json::Value>")]
pub struct NoteEntry {
    pub pitch: serde_json::Value,
    pub time: TimeSpec,
    pub amp: Option<f32>,
}

#[derive(Debug, Clone, Copy)]
pub enum TimeSpec {
    Beat(f64),
    Relative { beat_rel: f64, art: f64 },
}

impl TryFrom<Vec<serde_json::Value>> for NoteEntry {
    type Error = String;

    fn try_from(raw: Vec<serde_json::Value>) -> std::result::Result<Self, String> {
        if raw.len() < 2 {
            return Err("note entry needs at least [pitch, time]".to_string());
        }
        let pitch = raw[0].clone();
        let time = match &raw[1] {
            serde_json::Value::Array(pair) if pair.len() == 2 => TimeSpec::Relative {
                beat_rel: pair[0].as_f64().ok_or("beat_rel must be a number")?,
                art: pair[1].as_f64().ok_or("art must be a number")?,
            },
            serde_json::Value::Number(n) => {
                TimeSpec::Beat(n.as_f64().ok_or("time must be a number")?)
            }
            _ => return Err("note time must be a number or a [beat_rel, art] pair".to_string()),
        };
        let amp = raw.get(2).and_then(|v| v.as_f64()).map(|v| v as f32);
        Ok(NoteEntry { pitch, time, amp })
    }
}

/// An effect-chain entry: `{"bqlopass": {...params...}}`-style single-key
/// objects, kept as a tag plus its raw parameter object so each effect's
/// own module can deserialize only the fields it understands.
#[derive(Debug, Deserialize)]
#[serde(try_from = "HashMap<String, serde_json::Value>")]
pub struct Fx {
    pub kind: String,
    pub params: serde_json::Value,
}

impl TryFrom<HashMap<String, serde_json::Value>> for Fx {
    type Error = String;

    fn try_from(mut map: HashMap<String, serde_json::Value>) -> std::result::Result<Self, String> {
        if map.len() != 1 {
            return Err(format!("fx entry must have exactly one key, got {}", map.len()));
        }
        let kind = map.keys().next().cloned().ok_or("empty fx entry")?;
        let params = map.remove(&kind).unwrap();
        Ok(Fx { kind, params })
    }
}

pub fn load_score_from_file(path: &str) -> Result<Score> {
    let text = fs::read_to_string(path)?;
    parse_score(&text)
}

pub fn parse_score(text: &str) -> Result<Score> {
    let score: Score = serde_json::from_str(text)?;
    if score.meta.tempo <= 0.0 {
        return Err(RenderError::invalid("meta.tempo", "tempo must be positive"));
    }
    if score.meta.key <= 0.0 {
        return Err(RenderError::invalid("meta.key", "key must be a positive frequency in Hz"));
    }
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
    {
      "meta": { "tempo": 120, "key": 220 },
      "mixer": { "volume": 0.8 },
      "parts": {
        "lead": {
          "instrument": "sine",
          "notes": {
            "tuning": "freq",
            "values": [ [440, 0, 1.0], [440, [1.0, 0.5]] ]
          }
        }
      }
    }
    "#;

    #[test]
    fn parses_a_minimal_score() {
        let score = parse_score(MINIMAL).unwrap();
        assert_eq!(score.meta.tempo, 120.0);
        let lead = score.parts.get("lead").unwrap();
        assert_eq!(lead.instrument.kind(), "sine");
        assert_eq!(lead.notes.values.len(), 2);
    }

    #[test]
    fn absolute_beat_and_relative_pair_both_parse() {
        let score = parse_score(MINIMAL).unwrap();
        let lead = score.parts.get("lead").unwrap();
        match lead.notes.values[0].time {
            TimeSpec::Beat(b) => assert_eq!(b, 0.0),
            _ => panic!("expected an absolute beat"),
        }
        match lead.notes.values[1].time {
            TimeSpec::Relative { beat_rel, art } => {
                assert_eq!(beat_rel, 1.0);
                assert_eq!(art, 0.5);
            }
            _ => panic!("expected a relative (beat_rel, art) pair"),
        }
    }

    #[test]
    fn detailed_instrument_object_parses() {
        let json = r#"
        {
          "meta": { "tempo": 90, "key": 110 },
          "parts": {
            "pad": {
              "instrument": { "type": "pwmage", "chorus_cents": 6.0 },
              "notes": { "tuning": "freq", "values": [] }
            }
          }
        }
        "#;
        let score = parse_score(json).unwrap();
        let pad = score.parts.get("pad").unwrap();
        assert_eq!(pad.instrument.kind(), "pwmage");
        assert!(pad.instrument.params().is_some());
    }

    #[test]
    fn zero_tempo_is_rejected() {
        let json = r#"{"meta": {"tempo": 0, "key": 220}, "parts": {}}"#;
        assert!(parse_score(json).is_err());
    }

    #[test]
    fn fx_entry_requires_a_single_key() {
        let bad: HashMap<String, serde_json::Value> =
            [("bqlopass".to_string(), serde_json::json!({})), ("fader".to_string(), serde_json::json!({}))]
                .into_iter()
                .collect();
        assert!(Fx::try_from(bad).is_err());
    }
}
