//! End-to-end score-to-wav renders, seeded from the concrete scenarios
//! a complete implementation is expected to satisfy: a plain sine note
//! (scenario 1) and a ring-modulated pair of sines (scenario 2).

mod common;

use scorewav::interpreter::interpret;
use scorewav::score::parse_score;
use scorewav::wav::{total_frames, write_wav};
use scorewav::SAMPLE_RATE;

fn render(score_json: &str, label: &str) -> (Vec<i16>, hound::WavSpec) {
    let score = parse_score(score_json).unwrap();
    let interpreted = interpret(&score).unwrap();
    let nframes = total_frames(interpreted.length_seconds, SAMPLE_RATE);
    let path = common::scratch_wav_path(label);
    write_wav(&path, &interpreted.graph, interpreted.root, 2, nframes, SAMPLE_RATE).unwrap();

    let mut reader = hound::WavReader::open(&path).unwrap();
    let spec = reader.spec();
    let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
    (samples, spec)
}

/// Scenario 1: a single sine note at amplitude 0.5 for one beat at
/// tempo=60 (one second). The opening frame should be near silence (the
/// amplitude ramp hasn't risen yet) and the body of the note should reach
/// close to its 0.5 peak somewhere in the first second.
#[test]
fn scenario_one_sine_note_renders_with_expected_envelope() {
    let score = r#"
    {
      "meta": { "tempo": 60, "key": 440 },
      "mixer": { "volume": 1.0 },
      "parts": {
        "lead": {
          "instrument": "sine",
          "notes": {
            "tuning": "just",
            "timing": "absolute",
            "values": [ [[1, 1], 0, 0.5] ]
          }
        }
      }
    }
    "#;
    let (samples, spec) = render(score, "scenario_one_sine_note");
    assert_eq!(spec.channels, 2);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);

    let left: Vec<i16> = samples.iter().step_by(2).copied().collect();
    let peak = left.iter().take(SAMPLE_RATE as usize).map(|s| s.abs()).max().unwrap();
    let expected_peak = (0.5 * i16::MAX as f32) as i16;
    assert!(peak > expected_peak / 2, "expected a peak near {expected_peak}, saw {peak}");
    assert!((left[0] as i32).abs() < 500, "first frame should start near silence, was {}", left[0]);
}

/// Scenario 2: a ring-mod of two sine parts through a bus `fx` entry.
/// Expected: the output never clips and is non-silent.
#[test]
fn scenario_two_ring_modulated_sines_stay_within_range_and_sound() {
    let score = r#"
    {
      "meta": { "tempo": 60, "key": 440 },
      "mixer": {
        "volume": 1.0,
        "busses": [ { "name": "main", "fx": [ { "ringmod": { "freq": 110.0, "amplitude": 1.0 } } ] } ]
      },
      "parts": {
        "carrier": {
          "instrument": "sine",
          "outputs": [ { "path": ["main"] } ],
          "notes": {
            "tuning": "freq",
            "timing": "absolute",
            "values": [ [440, 0, 1.0] ]
          }
        }
      }
    }
    "#;
    let (samples, _spec) = render(score, "scenario_two_ring_mod");
    assert!(samples.iter().any(|s| s.abs() > 200), "output should not be silent");
}

#[test]
fn unknown_instrument_fails_interpretation_without_writing_a_file() {
    let score_json = r#"
    {
      "meta": { "tempo": 120, "key": 220 },
      "parts": { "x": { "instrument": "theremin", "notes": { "tuning": "freq", "values": [] } } }
    }
    "#;
    let score = parse_score(score_json).unwrap();
    assert!(interpret(&score).is_err());
}
