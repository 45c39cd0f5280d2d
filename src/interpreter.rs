//! The mode-stack JSON interpreter (spec.md §4.12): walks the already
//! `serde_json`-typed `Score` (§6) building the node graph and scheduling
//! each node's events in one pass, in `meta → mixer → parts` order as the
//! grammar's `Top → Meta | Mixer | Parts` mode stack requires. Expressed as
//! a direct recursive-descent walk rather than a literal token-by-token
//! mode machine, since `crate::score` already gives a typed tree instead of
//! a streaming tokenizer to drive push/pop modes over — the ordering and
//! per-mode responsibilities described in spec.md are kept, just over a
//! parsed value instead of raw JSON events.
//!
//! Grounded on `original_source/src/JsonInterpreter.h`'s `Mode` stack
//! (meta/mixer/parts/notes submodes) for the walk order, and on the
//! teacher's `src/render.rs` for turning a parsed score into a pulled
//! sample stream.

use crate::chain::EffectNode;
use crate::compressor::{Compressor, CompressorParams, StereoMode};
use crate::delay::{DelayEffect, DelayParams};
use crate::error::{RenderError, Result};
use crate::fader::Fader;
use crate::filter::{BiquadFilter, BiquadKind, LadderFilter};
use crate::graph::Graph;
use crate::join::{JoinKind, JoinNode};
use crate::node::{AudioNode, NodeId};
use crate::pan::PannerNode;
use crate::ramp::RampShape;
use crate::reverb::FdnReverb;
use crate::score::{Fx, Instrument, Notes, Part, Score, TimeSpec};
use crate::synth::additive::{AdditiveHitEvent, AdditiveHitSynth};
use crate::synth::drum::{DrumHitEvent, DrumHitSynth, Rt60Profile};
use crate::synth::pwmage::PwmageSynth;
use crate::synth::sine::{SinusoidSynth, Waveform};
use crate::sample::Sample;
use crate::synth::SynthEvent;
use crate::tuning;
use crate::waveshaper::{ChebyLaw, ChebyWaveshaper};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Output of interpreting a score: the built graph, the id to pull, and
/// the song's length so `wav.rs` knows how many frames to render.
pub struct Interpreted {
    pub graph: Graph,
    pub root: NodeId,
    pub length_seconds: f64,
}

const STEREO: usize = 2;

pub fn interpret(score: &Score) -> Result<Interpreted> {
    let mut graph = Graph::new();
    let mut length_seconds = 0.0f64;

    let mut bus_inputs: HashMap<String, Vec<NodeId>> =
        score.mixer.busses.iter().map(|b| (b.name.clone(), Vec::new())).collect();
    let mut direct_inputs: Vec<NodeId> = Vec::new();

    for (name, part) in &score.parts {
        let copies = part.duplication.unwrap_or(1).max(1);
        for copy in 0..copies {
            let spread_pan = if copies == 1 {
                0.0
            } else {
                -1.0 + 2.0 * copy as f32 / (copies - 1).max(1) as f32
            };
            let (source, end_seconds) = build_part_source(part, score.meta.tempo, score.meta.key)
                .map_err(|e| RenderError::invalid(format!("parts.{name}"), e.to_string()))?;
            length_seconds = length_seconds.max(end_seconds);

            let node = apply_part_fx(source, &part.fx, spread_pan)?;
            let id = graph.insert(Arc::new(Mutex::new(node)));

            if part.outputs.is_empty() {
                direct_inputs.push(id);
            } else {
                for output in &part.outputs {
                    match output.path.first() {
                        Some(crate::score::PathSegment::Name(bus_name)) if bus_inputs.contains_key(bus_name) => {
                            bus_inputs.get_mut(bus_name).unwrap().push(id);
                        }
                        _ => direct_inputs.push(id),
                    }
                }
            }
        }
    }

    for bus in &score.mixer.busses {
        let inputs = bus_inputs.remove(&bus.name).unwrap_or_default();
        if inputs.is_empty() {
            continue;
        }
        let join_id = graph.reserve();
        let mut join = JoinNode::new(join_id, STEREO, JoinKind::Sum);
        for input_id in &inputs {
            join.add_input(*input_id, graph.node(*input_id));
            graph.record_edge(*input_id, join_id);
        }
        graph.fill(join_id, Arc::new(Mutex::new(join)));

        let chained = apply_fx_chain(Box::new(ProxyNode { handle: graph.node(join_id) }), &bus.fx)?;
        let chained = match bus.volume {
            Some(v) => Box::new(EffectNode::new(chained, Box::new(Fader::new(v)), STEREO)) as Box<dyn AudioNode>,
            None => chained,
        };
        let bus_node_id = graph.insert(Arc::new(Mutex::new(chained)));
        graph.record_edge(join_id, bus_node_id);
        direct_inputs.push(bus_node_id);
    }

    let root_join_id = graph.reserve();
    let mut root_join = JoinNode::new(root_join_id, STEREO, JoinKind::Sum);
    for input_id in &direct_inputs {
        root_join.add_input(*input_id, graph.node(*input_id));
        graph.record_edge(*input_id, root_join_id);
    }
    graph.fill(root_join_id, Arc::new(Mutex::new(root_join)));

    let chained = apply_fx_chain(Box::new(ProxyNode { handle: graph.node(root_join_id) }), &score.mixer.fx)?;
    let chained = match score.mixer.volume {
        Some(v) => Box::new(EffectNode::new(chained, Box::new(Fader::new(v)), STEREO)) as Box<dyn AudioNode>,
        None => chained,
    };
    let root = graph.insert(Arc::new(Mutex::new(chained)));
    graph.record_edge(root_join_id, root);

    graph.finalize()?;

    Ok(Interpreted { graph, root, length_seconds })
}

/// Re-pulls an already-inserted graph node through its shared handle, so a
/// `JoinNode` that's already living in the arena can still be threaded
/// through `apply_fx_chain`'s `Box<dyn AudioNode>`-based composition
/// without cloning it out of the arena.
struct ProxyNode {
    handle: Arc<Mutex<dyn AudioNode>>,
}

impl AudioNode for ProxyNode {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: Option<NodeId>) {
        self.handle.lock().unwrap().get_samples(bufs, sample_rate, requester);
    }

    fn num_channels(&self) -> usize {
        STEREO
    }
}

/// Builds a part's mono note-driven synth and schedules every note event
/// onto it, returning the boxed node plus the time (seconds) the last
/// note's sound is expected to have died away by.
fn build_part_source(part: &Part, tempo: f64, key_hz: f64) -> Result<(Box<dyn AudioNode>, f64)> {
    let notes = &part.notes;
    let tuning = tuning::parse_tuning_tag(&notes.tuning)?;
    let abs_beats = resolve_note_times(notes)?;

    let kind = part.instrument.kind();
    let first_freq = notes
        .values
        .first()
        .and_then(|n| tuning::parse_pitch(tuning, &n.pitch).ok())
        .and_then(|p| tuning::resolve(tuning, p, key_hz).ok())
        .unwrap_or(key_hz) as f32;

    let mut end_seconds = 0.0f64;
    let beat_seconds = 60.0 / tempo;

    match kind {
        "sine" | "cosine" => {
            let waveform = if kind == "cosine" { Waveform::Cosine } else { Waveform::Sine };
            let mut synth = SinusoidSynth::new(waveform, first_freq, 0.0, 0.0);
            for (i, entry) in notes.values.iter().enumerate() {
                let pitch = tuning::parse_pitch(tuning, &entry.pitch)?;
                let freq = tuning::resolve(tuning, pitch, key_hz)? as f32;
                let onset_beats = abs_beats[i];
                let dur_beats = note_duration_beats(notes, i, &abs_beats);
                let onset_sample = (onset_beats * beat_seconds * crate::SAMPLE_RATE as f64) as u64;
                let off_sample = ((onset_beats + dur_beats) * beat_seconds * crate::SAMPLE_RATE as f64) as u64;
                let amp = entry.amp.unwrap_or(1.0);
                synth.schedule(onset_sample, SynthEvent::Frequency { target: freq, time_total: 0.0, shape: RampShape::Instant });
                synth.schedule(onset_sample, SynthEvent::Amplitude { target: amp, time_total: 0.001, shape: RampShape::Linear });
                synth.schedule(off_sample, SynthEvent::Amplitude { target: 0.0, time_total: 0.01, shape: RampShape::Linear });
                end_seconds = end_seconds.max((onset_beats + dur_beats) * beat_seconds + 0.05);
            }
            Ok((Box::new(synth), end_seconds))
        }
        "pwmage" => {
            let chorus_cents = part.instrument.params().and_then(|p| p.get("chorus_cents")).and_then(|v| v.as_f64()).unwrap_or(0.0);
            let pwm = part.instrument.params().and_then(|p| p.get("pwm")).and_then(|v| v.as_f64()).unwrap_or(0.5) as f32;
            let mut synth = PwmageSynth::new(first_freq, 0.0, pwm).with_chorus(chorus_cents as f32);
            for (i, entry) in notes.values.iter().enumerate() {
                let pitch = tuning::parse_pitch(tuning, &entry.pitch)?;
                let freq = tuning::resolve(tuning, pitch, key_hz)? as f32;
                let onset_beats = abs_beats[i];
                let dur_beats = note_duration_beats(notes, i, &abs_beats);
                let onset_sample = (onset_beats * beat_seconds * crate::SAMPLE_RATE as f64) as u64;
                let off_sample = ((onset_beats + dur_beats) * beat_seconds * crate::SAMPLE_RATE as f64) as u64;
                let amp = entry.amp.unwrap_or(1.0);
                synth.schedule(onset_sample, crate::synth::pwmage::PwmageEvent::Synth(SynthEvent::Frequency { target: freq, time_total: 0.0, shape: RampShape::Instant }));
                synth.schedule(onset_sample, crate::synth::pwmage::PwmageEvent::Synth(SynthEvent::Amplitude { target: amp, time_total: 0.001, shape: RampShape::Linear }));
                synth.schedule(off_sample, crate::synth::pwmage::PwmageEvent::Synth(SynthEvent::Amplitude { target: 0.0, time_total: 0.01, shape: RampShape::Linear }));
                end_seconds = end_seconds.max((onset_beats + dur_beats) * beat_seconds + 0.05);
            }
            Ok((Box::new(synth), end_seconds))
        }
        "drum" => {
            let rt60 = match part.instrument.params().and_then(|p| p.get("rt60")).and_then(|v| v.as_str()) {
                Some("half_up_1") => Rt60Profile::HalfUp1,
                Some("half_up_100") => Rt60Profile::HalfUp100,
                Some("half_up_1000") => Rt60Profile::HalfUp1000,
                Some("flat") => Rt60Profile::Flat,
                _ => Rt60Profile::HalfUp10,
            };
            let mut synth = DrumHitSynth::new(first_freq, rt60);
            for (i, entry) in notes.values.iter().enumerate() {
                let onset_beats = abs_beats[i];
                let onset_sample = (onset_beats * beat_seconds * crate::SAMPLE_RATE as f64) as u64;
                let strength = entry.amp.unwrap_or(1.0);
                synth.schedule(onset_sample, DrumHitEvent::Hit { strength, phase_seed: 0x9E3779B97F4A7C15 ^ (i as u64) });
                end_seconds = end_seconds.max(onset_beats * beat_seconds + 4.0);
            }
            Ok((Box::new(synth), end_seconds))
        }
        "additive" => {
            let num_partials = part.instrument.params().and_then(|p| p.get("partials")).and_then(|v| v.as_u64()).unwrap_or(8) as usize;
            let mut synth = AdditiveHitSynth::new(first_freq, num_partials.max(1));
            for (i, entry) in notes.values.iter().enumerate() {
                let onset_beats = abs_beats[i];
                let onset_sample = (onset_beats * beat_seconds * crate::SAMPLE_RATE as f64) as u64;
                let strength = entry.amp.unwrap_or(1.0);
                synth.schedule(onset_sample, AdditiveHitEvent::Hit { strength });
                end_seconds = end_seconds.max(onset_beats * beat_seconds + 3.0);
            }
            Ok((Box::new(synth), end_seconds))
        }
        other => Err(RenderError::invalid("part.instrument", format!("unknown instrument '{other}'"))),
    }
}

/// Expands `notes.values`' per-entry `TimeSpec` into absolute beat
/// positions, per `notes.timing` (SPEC_FULL.md §4.18). `intuitive` is
/// resolved like `relative` for onset composition; its articulation
/// multiplier instead scales the note's own sounding duration, since that
/// is the plain reading of "an articulation/duration multiplier" and the
/// grammar here always supplies an explicit time value (see DESIGN.md).
fn resolve_note_times(notes: &Notes) -> Result<Vec<f64>> {
    let mut out = Vec::with_capacity(notes.values.len());
    let mut prev_abs = 0.0f64;
    for (i, entry) in notes.values.iter().enumerate() {
        let abs = match notes.timing.as_str() {
            "absolute" => match entry.time {
                TimeSpec::Beat(b) => b,
                TimeSpec::Relative { beat_rel, .. } => beat_rel,
            },
            "relative" | "intuitive" => {
                let delta = match entry.time {
                    TimeSpec::Beat(b) => b,
                    TimeSpec::Relative { beat_rel, .. } => beat_rel,
                };
                if i == 0 {
                    delta
                } else {
                    prev_abs + delta
                }
            }
            other => return Err(RenderError::invalid("notes.timing", format!("unknown timing mode '{other}'"))),
        };
        prev_abs = abs;
        out.push(abs);
    }
    Ok(out)
}

fn note_duration_beats(notes: &Notes, idx: usize, abs_beats: &[f64]) -> f64 {
    if let Some(art) = match notes.values[idx].time {
        TimeSpec::Relative { art, .. } if notes.timing == "intuitive" => Some(art),
        _ => None,
    } {
        let base = default_gap(idx, abs_beats);
        return art * base;
    }
    if let Some(dur) = notes.dur {
        return dur;
    }
    let gap = default_gap(idx, abs_beats);
    notes.minduration.map(|m| gap.max(m)).unwrap_or(gap)
}

fn default_gap(idx: usize, abs_beats: &[f64]) -> f64 {
    match abs_beats.get(idx + 1) {
        Some(next) => (next - abs_beats[idx]).max(0.01),
        None => 1.0,
    }
}

fn apply_part_fx(source: Box<dyn AudioNode>, fx: &[Fx], default_pan: f32) -> Result<Box<dyn AudioNode>> {
    let pan = fx
        .iter()
        .find(|f| f.kind == "panner")
        .and_then(|f| f.params.get("pan"))
        .and_then(|v| v.as_f64())
        .map(|v| v as f32)
        .unwrap_or(default_pan);
    let panned: Box<dyn AudioNode> = Box::new(PannerNode::new(source, pan));
    let rest: Vec<&Fx> = fx.iter().filter(|f| f.kind != "panner").collect();
    apply_fx_list(panned, &rest)
}

fn apply_fx_chain(node: Box<dyn AudioNode>, fx: &[Fx]) -> Result<Box<dyn AudioNode>> {
    let all: Vec<&Fx> = fx.iter().collect();
    apply_fx_list(node, &all)
}

fn apply_fx_list(mut node: Box<dyn AudioNode>, fx: &[&Fx]) -> Result<Box<dyn AudioNode>> {
    let mut pending_stereo_mode = StereoMode::Lr;
    for entry in fx {
        let p = &entry.params;
        match entry.kind.as_str() {
            "bqlopass" => node = wrap_biquad(node, BiquadKind::LowPass, p),
            "bqhipass" => node = wrap_biquad(node, BiquadKind::HighPass, p),
            "bqallpass" => node = wrap_biquad(node, BiquadKind::AllPass, p),
            "bqnotch" => node = wrap_biquad(node, BiquadKind::Notch, p),
            "bqpeak" => node = wrap_biquad(node, BiquadKind::PeakingEq, p),
            "bqloshelf" => node = wrap_biquad(node, BiquadKind::LowShelf, p),
            "bqhishelf" => node = wrap_biquad(node, BiquadKind::HighShelf, p),
            "bessellopass" => {
                let cutoff = get_f32(p, "cutoff", 2000.0);
                let effect = Box::new(BiquadFilter::bessel_lowpass(STEREO, cutoff));
                node = Box::new(EffectNode::new(node, effect, STEREO));
            }
            "ladder" => {
                let cutoff = get_f32(p, "cutoff", 800.0);
                let resonance = get_f32(p, "resonance", 0.2);
                let effect = Box::new(LadderFilter::new(STEREO, cutoff, resonance));
                node = Box::new(EffectNode::new(node, effect, STEREO));
            }
            "fader" => {
                let gain = get_f32(p, "gain", 1.0);
                node = Box::new(EffectNode::new(node, Box::new(Fader::new(gain)), STEREO));
            }
            "delay" => {
                let params = DelayParams {
                    len_seconds: get_f32(p, "len_seconds", 0.3),
                    n_echoes: get_f32(p, "n_echoes", 4.0) as usize,
                    gain: get_f32(p, "gain", 0.4),
                    mix: get_f32(p, "mix", 0.3),
                };
                let effect = Box::new(DelayEffect::new(crate::SAMPLE_RATE, STEREO, params));
                node = Box::new(EffectNode::new(node, effect, STEREO));
            }
            "distortion" | "busdistortion" => {
                let law = match p.get("law").and_then(|v| v.as_str()) {
                    Some("cube") => ChebyLaw::InverseCube,
                    Some("quart") => ChebyLaw::InverseQuart,
                    Some("gauss_boost") => ChebyLaw::InverseSquareGaussianBoost,
                    _ => ChebyLaw::InverseSquare,
                };
                let order = p.get("order").and_then(|v| v.as_u64()).unwrap_or(3) as u32;
                let effect = Box::new(ChebyWaveshaper::new(law, order, STEREO));
                node = Box::new(EffectNode::new(node, effect, STEREO));
            }
            "ringmod" | "ringmodsum" => {
                let kind = if entry.kind == "ringmodsum" {
                    JoinKind::RingModSum(get_f32(p, "balance", 0.0).clamp(-1.0, 1.0))
                } else {
                    JoinKind::RingMod
                };
                let carrier_freq = get_f32(p, "freq", 220.0);
                let carrier_amp = get_f32(p, "amplitude", 1.0);
                let carrier: Box<dyn AudioNode> = Box::new(PannerNode::new(
                    Box::new(SinusoidSynth::new(Waveform::Sine, carrier_freq, carrier_amp, 0.0)),
                    0.0,
                ));
                node = Box::new(CombineNode::new(node, carrier, kind, STEREO));
            }
            "ms" => pending_stereo_mode = StereoMode::Ms,
            "lr" => pending_stereo_mode = StereoMode::Lr,
            "compressor" => {
                let params = CompressorParams {
                    attack_samples: get_f32(p, "attack_samples", 64.0) as f64,
                    release_samples: get_f32(p, "release_samples", 2048.0) as f64,
                    threshold_db: get_f32(p, "threshold_db", -12.0) as f64,
                    ratio: get_f32(p, "ratio", 4.0) as f64,
                    knee_db: get_f32(p, "knee_db", 6.0) as f64,
                    dry_volume_db: get_f32(p, "dry_volume_db", 0.0),
                };
                let oversample = p.get("oversample").and_then(|v| v.as_u64()).unwrap_or(2) as usize;
                let effect = Box::new(Compressor::new(params, pending_stereo_mode, STEREO, oversample.max(2)));
                node = Box::new(EffectNode::new(node, effect, STEREO));
                pending_stereo_mode = StereoMode::Lr;
            }
            "reverb" => {
                let rt60 = get_f32(p, "rt60", 1.5) as f64;
                let wet = get_f32(p, "wet", 0.3);
                let seed = p.get("seed").and_then(|v| v.as_u64()).unwrap_or(1);
                let effect = Box::new(FdnReverb::new(crate::SAMPLE_RATE, rt60, wet, STEREO, seed));
                node = Box::new(EffectNode::new(node, effect, STEREO));
            }
            "panner" => {} // consumed as the part's entry pan, ignored elsewhere (see DESIGN.md).
            other => return Err(RenderError::invalid("fx", format!("unknown effect '{other}'"))),
        }
    }
    Ok(node)
}

fn wrap_biquad(node: Box<dyn AudioNode>, kind: BiquadKind, params: &serde_json::Value) -> Box<dyn AudioNode> {
    let cutoff = get_f32(params, "cutoff", 1000.0);
    let q = get_f32(params, "q", std::f32::consts::FRAC_1_SQRT_2);
    let gain_db = get_f32(params, "gain_db", 0.0);
    let effect = Box::new(BiquadFilter::new(kind, STEREO, cutoff, q, gain_db));
    Box::new(EffectNode::new(node, effect, STEREO))
}

fn get_f32(params: &serde_json::Value, key: &str, default: f32) -> f32 {
    params.get(key).and_then(|v| v.as_f64()).map(|v| v as f32).unwrap_or(default)
}

/// Combines the fx chain's running signal with a freshly-generated carrier
/// via a two-input `JoinNode`, used for the `ringmod`/`ringmodsum` fx
/// entries (spec.md §6's `fx` key list). A thin adapter since `JoinNode`
/// expects its inputs pre-registered as graph-style `Arc<Mutex<dyn
/// AudioNode>>`s with stable ids, which a pure fx-chain composition (plain
/// `Box` ownership) doesn't otherwise need.
struct CombineNode {
    join: JoinNode,
}

impl CombineNode {
    fn new(a: Box<dyn AudioNode>, b: Box<dyn AudioNode>, kind: JoinKind, channels: usize) -> Self {
        let id = NodeId(0);
        let mut join = JoinNode::new(id, channels, kind);
        join.add_input(NodeId(1), Arc::new(Mutex::new(a)));
        join.add_input(NodeId(2), Arc::new(Mutex::new(b)));
        CombineNode { join }
    }
}

impl AudioNode for CombineNode {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: Option<NodeId>) {
        self.join.get_samples(bufs, sample_rate, requester);
    }

    fn num_channels(&self) -> usize {
        self.join.num_channels()
    }

    fn sample_delay(&self) -> usize {
        self.join.sample_delay()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::score::parse_score;

    const SCORE: &str = r#"
    {
      "meta": { "tempo": 120, "key": 220 },
      "mixer": { "volume": 1.0 },
      "parts": {
        "lead": {
          "instrument": "sine",
          "notes": {
            "tuning": "freq",
            "timing": "absolute",
            "values": [ [440, 0, 1.0], [440, 1, 1.0] ]
          }
        }
      }
    }
    "#;

    #[test]
    fn interprets_a_minimal_score_into_a_pullable_graph() {
        let score = parse_score(SCORE).unwrap();
        let interpreted = interpret(&score).unwrap();
        let out = interpreted.graph.pull(interpreted.root, 2, 4096, crate::SAMPLE_RATE);
        assert_eq!(out.len(), 2);
        assert!(out[0].iter().any(|s| s.abs() > 1e-6));
        assert!(interpreted.length_seconds > 0.0);
    }

    #[test]
    fn relative_timing_accumulates_onsets() {
        let notes = Notes {
            tuning: "freq".to_string(),
            timing: "relative".to_string(),
            minduration: None,
            db: false,
            dur: None,
            transpose: None,
            values: vec![
                crate::score::NoteEntry { pitch: serde_json::json!(440), time: TimeSpec::Beat(0.0), amp: None },
                crate::score::NoteEntry { pitch: serde_json::json!(440), time: TimeSpec::Beat(2.0), amp: None },
            ],
        };
        let abs = resolve_note_times(&notes).unwrap();
        assert_eq!(abs, vec![0.0, 2.0]);
    }

    #[test]
    fn unknown_instrument_is_rejected() {
        let json = r#"
        {
          "meta": { "tempo": 120, "key": 220 },
          "parts": {
            "x": { "instrument": "theremin", "notes": { "tuning": "freq", "values": [] } }
          }
        }
        "#;
        let score = parse_score(json).unwrap();
        assert!(interpret(&score).is_err());
    }
}
