//! Sine/cosine oscillator (spec.md §4.6). Grounded on
//! `original_source/src/SineSynth.h`'s `SinusoidSynth<bSine>`; the original
//! evaluates a 5th-order minimax polynomial approximation of sine
//! (`FastSin.h`) for speed, which this offline renderer has no need of —
//! `f64::sin` is both simpler and more accurate, a deliberate simplification
//! noted in `DESIGN.md`.

use super::{copy_first_channel, SynthBase, SynthEvent};
use crate::control::SampleIndex;
use crate::node::{AudioNode, NodeId};
use crate::sample::Sample;
use std::f64::consts::TAU;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Cosine,
}

pub struct SinusoidSynth {
    base: SynthBase,
    waveform: Waveform,
}

impl SinusoidSynth {
    pub fn new(waveform: Waveform, frequency: f32, amplitude: f32, phase: f32) -> Self {
        SinusoidSynth {
            base: SynthBase::new(frequency, amplitude, phase as f64),
            waveform,
        }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: SynthEvent) {
        self.base.schedule(at, event);
    }
}

impl AudioNode for SinusoidSynth {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, _requester: Option<NodeId>) {
        if bufs.is_empty() {
            return;
        }
        let waveform = self.waveform;
        let nframes = bufs[0].len();
        let mut raw = vec![0.0 as Sample; nframes];
        self.base.generate(sample_rate, &mut raw, |_base, phase, amp| {
            let angle = phase * TAU;
            let v = match waveform {
                Waveform::Sine => angle.sin(),
                Waveform::Cosine => angle.cos(),
            };
            amp * v as Sample
        });
        bufs[0].copy_from_slice(&raw);
        copy_first_channel(bufs);
    }

    fn num_channels(&self) -> usize {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ramp::RampShape;

    #[test]
    fn produces_amplitude_scaled_sine() {
        let mut synth = SinusoidSynth::new(Waveform::Sine, 1000.0, 0.5, 0.0);
        let mut buf = vec![0.0f32; 32];
        {
            let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
            synth.get_samples(&mut slices, 44_100, None);
        }
        assert!(buf.iter().all(|s| s.abs() <= 0.5 + 1e-6));
        assert!(buf.iter().any(|s| s.abs() > 1e-6));
    }

    #[test]
    fn frequency_ramp_event_changes_pitch_mid_buffer() {
        let mut synth = SinusoidSynth::new(Waveform::Sine, 100.0, 1.0, 0.0);
        synth.schedule(10, SynthEvent::Frequency { target: 5000.0, time_total: 0.0, shape: RampShape::Instant });
        let mut buf = vec![0.0f32; 40];
        let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
        synth.get_samples(&mut slices, 44_100, None);
        assert_eq!(synth_frequency(&synth), 5000.0);
    }

    fn synth_frequency(s: &SinusoidSynth) -> f32 {
        s.base.frequency
    }
}
