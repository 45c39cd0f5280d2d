//! Shared synth machinery: the phase accumulator and the three ramped
//! parameters (frequency, amplitude, phase) every oscillator-family synth
//! builds on (spec.md §4.6).
//!
//! Grounded on `original_source/src/Synth.h`'s `SynthWithCustomEvent`
//! (`Increment`/`GetSynthSamples`), generalized from that file's template
//! subclass-hook pattern to a plain Rust trait object the way the teacher's
//! `src/envelope.rs` exposes a small reusable generator core.

pub mod additive;
pub mod drum;
pub mod pwmage;
pub mod sine;

use crate::control::{ControlObject, EventMap, SampleIndex};
use crate::ramp::{Ramp, RampShape};
use crate::sample::Sample;

#[derive(Clone, Copy, Debug)]
pub enum SynthEvent {
    Frequency { target: f32, time_total: f64, shape: RampShape },
    Amplitude { target: f32, time_total: f64, shape: RampShape },
    /// Absolute phase offset in cycles (wrapped to `[0,1)`).
    Phase { target: f32, time_total: f64, shape: RampShape },
}

/// Phase accumulator plus frequency/amplitude/phase ramps, shared by every
/// concrete oscillator. `phase` is the running accumulator in cycles
/// (`[0,1)`); `phase_offset` is a separately ramped static offset applied
/// on top of it, matching the original's two-term instantaneous phase.
pub struct SynthBase {
    pub frequency: f32,
    pub amplitude: f32,
    pub phase: f64,
    pub phase_offset: f64,
    delta_phase_cached: f64,
    pub frequency_ramp: Ramp,
    pub amplitude_ramp: Ramp,
    pub phase_ramp: Ramp,
    pub control: ControlObject<SynthEvent>,
}

impl SynthBase {
    pub fn new(frequency: f32, amplitude: f32, phase: f64) -> Self {
        SynthBase {
            frequency,
            amplitude,
            phase,
            phase_offset: 0.0,
            delta_phase_cached: 0.0,
            frequency_ramp: Ramp::instant(frequency),
            amplitude_ramp: Ramp::instant(amplitude),
            phase_ramp: Ramp::instant(0.0),
            control: ControlObject::new(),
        }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: SynthEvent) {
        self.control.schedule(at, event);
    }

    fn apply_event(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::Frequency { target, time_total, shape } => {
                self.frequency_ramp = Ramp::new(target, time_total, shape);
            }
            SynthEvent::Amplitude { target, time_total, shape } => {
                self.amplitude_ramp = Ramp::new(target, time_total, shape);
            }
            SynthEvent::Phase { target, time_total, shape } => {
                self.phase_ramp = Ramp::new(target, time_total, shape);
            }
        }
    }

    fn increment(&mut self, dt: f64) {
        let prev_freq = self.frequency;
        let new_freq = self.frequency_ramp.step(self.frequency, dt);
        self.frequency = new_freq;
        if (new_freq - prev_freq).abs() > f32::EPSILON || self.delta_phase_cached == 0.0 {
            self.delta_phase_cached = new_freq as f64 * dt;
        }

        let next_phase = self.phase + self.delta_phase_cached;
        self.phase = next_phase - next_phase.floor();

        self.amplitude = self.amplitude_ramp.step(self.amplitude, dt);

        let new_offset = self.phase_ramp.step(self.phase_offset as f32, dt) as f64;
        self.phase_offset = new_offset - new_offset.floor();
    }

    /// `phase_offset + phase`, wrapped to `[0,1)`. The value a waveform
    /// generator reads each sample.
    pub fn instantaneous_phase(&self) -> f64 {
        let p = self.phase_offset + self.phase;
        p - p.floor()
    }

    /// Runs the per-sample event/increment loop of spec.md §4.3 over
    /// `out`, calling `gen` once per sample after the phase accumulator has
    /// advanced to produce that sample's raw waveform value.
    pub fn generate(
        &mut self,
        sample_rate: u32,
        out: &mut [Sample],
        mut gen: impl FnMut(&mut Self, f64, f32) -> Sample,
    ) {
        let nframes = out.len();
        let dt = 1.0 / sample_rate as f64;
        let start = self.control.current_sample;

        let mut map = std::mem::replace(&mut self.control.map, EventMap::new());
        let mut events = map.keys_in_range(start, start + nframes as SampleIndex);
        let mut key_idx = 0usize;

        for (i, slot) in out.iter_mut().enumerate() {
            let now = start + i as SampleIndex;
            while key_idx < events.len() && events[key_idx] == now {
                if let Some(due) = map.take_at(now) {
                    for ev in due {
                        self.apply_event(ev);
                    }
                }
                key_idx += 1;
            }
            self.increment(dt);
            let phase = self.instantaneous_phase();
            let amp = self.amplitude;
            *slot = gen(self, phase, amp);
        }

        self.control.map = map;
        self.control.current_sample += nframes as SampleIndex;
    }
}

/// Copies `bufs[0]` into every other channel. Mono synths produce a single
/// channel of raw samples and rely on this to satisfy a stereo downstream
/// request, mirroring the original's `bCopyFirstChannel` flag.
pub fn copy_first_channel(bufs: &mut [&mut [Sample]]) {
    if bufs.len() < 2 {
        return;
    }
    let (first, rest) = bufs.split_at_mut(1);
    let src = &first[0];
    for ch in rest {
        ch.copy_from_slice(src);
    }
}
