//! The `bq*` biquad filter family plus two hand-rolled filters the
//! `biquad` crate doesn't offer out of the box: a Moog-style ladder and a
//! Bessel lowpass (spec.md §4.7).
//!
//! Grounded on `original_source/src/Filter.h`'s `BiquadPeak`/`FilterComposable`
//! topology-parameterised filters, re-expressed with the teacher's actual
//! `biquad` dependency (already in its `Cargo.toml`) instead of hand-rolled
//! RBJ cookbook math, since that crate exists in this corpus specifically
//! for this job.

use crate::control::SampleIndex;
use crate::node::{AudioNode, NodeId};
use crate::ramp::{Ramp, RampShape};
use crate::sample::Sample;
use biquad::{Biquad as _, Coefficients, DirectForm2Transposed, Q_BUTTERWORTH_F32, ToHertz, Type};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BiquadKind {
    LowPass,
    HighPass,
    BandPass,
    Notch,
    AllPass,
    LowShelf,
    HighShelf,
    PeakingEq,
}

impl BiquadKind {
    fn to_type(self, gain_db: f32) -> Type<f32> {
        match self {
            BiquadKind::LowPass => Type::LowPass,
            BiquadKind::HighPass => Type::HighPass,
            BiquadKind::BandPass => Type::BandPass,
            BiquadKind::Notch => Type::Notch,
            BiquadKind::AllPass => Type::AllPass,
            BiquadKind::LowShelf => Type::LowShelf(gain_db),
            BiquadKind::HighShelf => Type::HighShelf(gain_db),
            BiquadKind::PeakingEq => Type::PeakingEQ(gain_db),
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum FilterEvent {
    Cutoff { target: f32, time_total: f64, shape: RampShape },
    Q { target: f32, time_total: f64, shape: RampShape },
    GainDb { target: f32, time_total: f64, shape: RampShape },
}

struct Channel {
    form: DirectForm2Transposed<f32>,
}

/// One `bq*` filter, ramp-driven on cutoff/Q/gain and recomputing its
/// `biquad::Coefficients` whenever any of those parameters actually moves.
pub struct BiquadFilter {
    kind: BiquadKind,
    channels: Vec<Channel>,
    cutoff: f32,
    q: f32,
    gain_db: f32,
    cutoff_ramp: Ramp,
    q_ramp: Ramp,
    gain_ramp: Ramp,
    control: crate::control::ControlObject<FilterEvent>,
    last_sample_rate: u32,
}

impl BiquadFilter {
    /// A single second-order section tuned to Bessel's maximally-flat
    /// group delay (`Q = 1/sqrt(3)`), used where spec.md calls for a
    /// Bessel lowpass rather than the sharper Butterworth roll-off the
    /// default `Q` gives.
    pub fn bessel_lowpass(num_channels: usize, cutoff: f32) -> Self {
        Self::new(BiquadKind::LowPass, num_channels, cutoff, 1.0 / 3f32.sqrt(), 0.0)
    }

    pub fn new(kind: BiquadKind, num_channels: usize, cutoff: f32, q: f32, gain_db: f32) -> Self {
        let coeffs = Self::coefficients(kind, 44_100, cutoff, q, gain_db);
        BiquadFilter {
            kind,
            channels: (0..num_channels)
                .map(|_| Channel { form: DirectForm2Transposed::<f32>::new(coeffs) })
                .collect(),
            cutoff,
            q,
            gain_db,
            cutoff_ramp: Ramp::instant(cutoff),
            q_ramp: Ramp::instant(q),
            gain_ramp: Ramp::instant(gain_db),
            control: crate::control::ControlObject::new(),
            last_sample_rate: 44_100,
        }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: FilterEvent) {
        self.control.schedule(at, event);
    }

    fn coefficients(kind: BiquadKind, sample_rate: u32, cutoff: f32, q: f32, gain_db: f32) -> Coefficients<f32> {
        let cutoff = cutoff.clamp(1.0, sample_rate as f32 * 0.499);
        let q = if q <= 0.0 { Q_BUTTERWORTH_F32 } else { q };
        Coefficients::<f32>::from_params(kind.to_type(gain_db), sample_rate.hz(), cutoff.hz(), q)
            .unwrap_or_else(|_| {
                Coefficients::<f32>::from_params(kind.to_type(gain_db), sample_rate.hz(), 1_000.0.hz(), Q_BUTTERWORTH_F32)
                    .expect("fallback biquad coefficients must be valid")
            })
    }

    fn apply_event(&mut self, event: FilterEvent) {
        match event {
            FilterEvent::Cutoff { target, time_total, shape } => self.cutoff_ramp = Ramp::new(target, time_total, shape),
            FilterEvent::Q { target, time_total, shape } => self.q_ramp = Ramp::new(target, time_total, shape),
            FilterEvent::GainDb { target, time_total, shape } => self.gain_ramp = Ramp::new(target, time_total, shape),
        }
    }
}

impl AudioNode for BiquadFilter {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, _requester: Option<NodeId>) {
        if bufs.is_empty() {
            return;
        }
        let nframes = bufs[0].len();
        let dt = 1.0 / sample_rate as f64;

        let start = self.control.current_sample;
        let mut map = std::mem::replace(&mut self.control.map, crate::control::EventMap::new());
        let mut events = map.keys_in_range(start, start + nframes as SampleIndex);
        let mut key_idx = 0usize;

        if sample_rate != self.last_sample_rate {
            self.last_sample_rate = sample_rate;
        }

        for i in 0..nframes {
            let now = start + i as SampleIndex;
            while key_idx < events.len() && events[key_idx] == now {
                if let Some(due) = map.take_at(now) {
                    for ev in due {
                        self.apply_event(ev);
                    }
                }
                key_idx += 1;
            }

            let new_cutoff = self.cutoff_ramp.step(self.cutoff, dt);
            let new_q = self.q_ramp.step(self.q, dt);
            let new_gain = self.gain_ramp.step(self.gain_db, dt);
            let moved = (new_cutoff - self.cutoff).abs() > 1e-6
                || (new_q - self.q).abs() > 1e-6
                || (new_gain - self.gain_db).abs() > 1e-6;
            self.cutoff = new_cutoff;
            self.q = new_q;
            self.gain_db = new_gain;
            if moved {
                let coeffs = Self::coefficients(self.kind, sample_rate, self.cutoff, self.q, self.gain_db);
                for ch in &mut self.channels {
                    ch.form.update_coefficients(coeffs);
                }
            }

            for (ch_idx, buf) in bufs.iter_mut().enumerate() {
                if ch_idx >= self.channels.len() {
                    continue;
                }
                buf[i] = self.channels[ch_idx].form.run(buf[i]);
            }
        }

        self.control.map = map;
        self.control.current_sample += nframes as SampleIndex;
    }

    fn num_channels(&self) -> usize {
        self.channels.len()
    }
}

/// Four-pole transistor-ladder lowpass with resonance feedback
/// (Moog-style), the one filter topology the `biquad` crate has no
/// equivalent for. Grounded on the cascaded-onepole-with-feedback
/// structure in `original_source/src/Filter.h`'s ladder comments.
pub struct LadderFilter {
    stages: Vec<[f32; 4]>,
    cutoff: f32,
    resonance: f32,
    cutoff_ramp: Ramp,
    resonance_ramp: Ramp,
    control: crate::control::ControlObject<FilterEvent>,
}

impl LadderFilter {
    pub fn new(num_channels: usize, cutoff: f32, resonance: f32) -> Self {
        LadderFilter {
            stages: vec![[0.0; 4]; num_channels],
            cutoff,
            resonance: resonance.clamp(0.0, 4.0),
            cutoff_ramp: Ramp::instant(cutoff),
            resonance_ramp: Ramp::instant(resonance),
            control: crate::control::ControlObject::new(),
        }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: FilterEvent) {
        self.control.schedule(at, event);
    }
}

impl AudioNode for LadderFilter {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, _requester: Option<NodeId>) {
        if bufs.is_empty() {
            return;
        }
        let nframes = bufs[0].len();
        let dt = 1.0 / sample_rate as f64;

        let start = self.control.current_sample;
        let mut map = std::mem::replace(&mut self.control.map, crate::control::EventMap::new());
        let mut events = map.keys_in_range(start, start + nframes as SampleIndex);
        let mut key_idx = 0usize;

        for i in 0..nframes {
            let now = start + i as SampleIndex;
            while key_idx < events.len() && events[key_idx] == now {
                if let Some(due) = map.take_at(now) {
                    for ev in due {
                        match ev {
                            FilterEvent::Cutoff { target, time_total, shape } => {
                                self.cutoff_ramp = Ramp::new(target, time_total, shape)
                            }
                            FilterEvent::Q { target, time_total, shape } => {
                                self.resonance_ramp = Ramp::new(target, time_total, shape)
                            }
                            FilterEvent::GainDb { .. } => {}
                        }
                    }
                }
                key_idx += 1;
            }

            self.cutoff = self.cutoff_ramp.step(self.cutoff, dt);
            self.resonance = self.resonance_ramp.step(self.resonance, dt).clamp(0.0, 4.0);
            let g = (std::f32::consts::PI * self.cutoff / sample_rate as f32).tan();
            let g = g / (1.0 + g);

            for (ch_idx, buf) in bufs.iter_mut().enumerate() {
                if ch_idx >= self.stages.len() {
                    continue;
                }
                let stage = &mut self.stages[ch_idx];
                let input = buf[i];
                let feedback = self.resonance * stage[3];
                let mut x = input - feedback;
                for s in stage.iter_mut() {
                    let y = *s + g * (x - *s);
                    *s = y + g * (x - y);
                    x = *s;
                }
                buf[i] = stage[3];
            }
        }

        self.control.map = map;
        self.control.current_sample += nframes as SampleIndex;
    }

    fn num_channels(&self) -> usize {
        self.stages.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pull(node: &mut dyn AudioNode, channels: usize, input: &[f32]) -> Vec<Vec<f32>> {
        let mut bufs: Vec<Vec<f32>> = (0..channels).map(|_| input.to_vec()).collect();
        {
            let mut slices: Vec<&mut [Sample]> = bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
            node.get_samples(&mut slices, 44_100, None);
        }
        bufs
    }

    #[test]
    fn lowpass_attenuates_high_frequency_content() {
        let mut filt = BiquadFilter::new(BiquadKind::LowPass, 1, 200.0, 0.707, 0.0);
        let n = 1024;
        let input: Vec<f32> = (0..n)
            .map(|i| (2.0 * std::f32::consts::PI * 8000.0 * i as f32 / 44_100.0).sin())
            .collect();
        let input_energy: f32 = input.iter().map(|s| s * s).sum();
        let out = pull(&mut filt, 1, &input);
        let out_energy: f32 = out[0].iter().map(|s| s * s).sum();
        assert!(out_energy < input_energy * 0.2, "lowpass should strongly attenuate an 8kHz tone at 200Hz cutoff");
    }

    #[test]
    fn ladder_filter_is_stable_with_high_resonance() {
        let mut filt = LadderFilter::new(1, 500.0, 3.9);
        let input = vec![1.0f32; 2048];
        let out = pull(&mut filt, 1, &input);
        assert!(out[0].iter().all(|s| s.is_finite() && s.abs() < 10.0));
    }
}
