//! ADAA (antiderivative-antialiasing) compressor (spec.md §4.10).
//!
//! Grounded directly on `original_source/src/Compressor.h`'s
//! `GainComputer`: a closed-form three-region antiderivative `U(x)` (flat
//! below the knee, an erf-based knee blend, a power law above it) whose
//! finite difference gives the antialiased gain reduction
//! `Compute(x) = (U(x)-U(x_prev))/(x-x_prev)`, falling back to `G(avg)-1`
//! when `x` hasn't moved enough for the finite difference to be numerically
//! safe. `erf` isn't in `std` and none of the example repos carry an
//! erf-providing crate, so it's approximated here with the standard
//! Abramowitz & Stegun 7.1.26 rational fit (|error| < 1.5e-7), the same
//! spirit as the original's other hand-rolled numeric approximations
//! (`FastSin.h`).

use crate::control::SampleIndex;
use crate::node::{AudioNode, NodeId};
use crate::oversample::Oversampler;
use crate::ramp::{Ramp, RampShape};
use crate::sample::Sample;
use std::f64::consts::PI;

/// Abramowitz & Stegun 7.1.26.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StereoMode {
    /// Unlinked: left and right compressed independently with the same
    /// settings.
    Lr,
    /// Mid-only.
    M,
    /// Mid and side compressed with separate settings.
    Ms,
}

#[derive(Clone, Copy, Debug)]
pub struct CompressorParams {
    pub attack_samples: f64,
    pub release_samples: f64,
    pub threshold_db: f64,
    pub ratio: f64,
    pub knee_db: f64,
    pub dry_volume_db: f32,
}

impl Default for CompressorParams {
    fn default() -> Self {
        CompressorParams {
            attack_samples: 64.0,
            release_samples: 2048.0,
            threshold_db: -12.0,
            ratio: 4.0,
            knee_db: 6.0,
            dry_volume_db: 0.0,
        }
    }
}

/// The closed-form gain-reduction curve and its ADAA1 derivative, per
/// `original_source/src/Compressor.h::GainComputer`.
struct GainComputer {
    t_k1: f64,
    t_k2: f64,
    erfarg_scale: f64,
    erfarg_offset: f64,
    u_c_exp: f64,
    u_k_erfscale: f64,
    u_c_powscale: f64,
    u_knee_offset: f64,
    u_comp_offset: f64,
    w_c_powscale: f64,
    w_c_exp: f64,
    w_k_powscale: f64,
    w_k_powarg_scale: f64,
    w_k_powarg_offset: f64,
    xm1: f64,
    um1: f64,
}

impl GainComputer {
    fn new(threshold_db: f64, ratio: f64, knee_db: f64) -> Self {
        let mut gc = GainComputer {
            t_k1: 0.0,
            t_k2: 0.0,
            erfarg_scale: 0.0,
            erfarg_offset: 0.0,
            u_c_exp: 0.0,
            u_k_erfscale: 0.0,
            u_c_powscale: 0.0,
            u_knee_offset: 0.0,
            u_comp_offset: 0.0,
            w_c_powscale: 0.0,
            w_c_exp: 0.0,
            w_k_powscale: 0.0,
            w_k_powarg_scale: 0.0,
            w_k_powarg_offset: 0.0,
            xm1: 0.0,
            um1: 0.0,
        };
        gc.set_params(threshold_db, ratio, knee_db);
        gc
    }

    fn set_params(&mut self, threshold_db: f64, ratio: f64, knee_db: f64) {
        let t = threshold_db;
        let r = if ratio > 1.1 { ratio } else { 1.1 };
        let k = if knee_db > 0.1 { knee_db } else { 0.1 };
        let t_over_20 = t * 0.05;
        let k_over_40 = k * 0.025;
        let mut tmk = t_over_20 - k_over_40;
        self.t_k1 = 10f64.powf(tmk);
        self.t_k2 = 10f64.powf(t_over_20 + k_over_40);

        let b = 0.5 * (1.0 - r) / (r * k);
        tmk *= 20.0;
        let mut c = b * tmk;
        let d = c * tmk;
        c += c;
        c = 1.0 - c;

        let b40 = 40.0 * b;
        let mb80inv = -1.0 / (b40 + b40);
        let u_b = (10f64.ln() * mb80inv).sqrt();

        self.u_k_erfscale = -10f64.powf(d * 0.05) * PI.sqrt() * u_b * 10f64.powf(c * c * mb80inv);
        self.erfarg_scale = u_b * b40;
        self.erfarg_offset = u_b * c;

        self.w_c_powscale = 10f64.powf(t * (r - 1.0) / (20.0 * r));
        self.u_c_powscale = r * self.w_c_powscale;
        self.u_c_exp = 1.0 / r;

        self.u_knee_offset = self.t_k1 - self.u_k(self.t_k1);
        self.u_comp_offset = self.u_k(self.t_k2) - self.u_c(self.t_k2) + self.u_knee_offset;

        self.w_c_exp = self.u_c_exp - 1.0;
        self.w_k_powscale = 10f64.powf(d * 0.05);
        self.w_k_powarg_scale = 20.0 * b;
        self.w_k_powarg_offset = c - 1.0;
    }

    fn u_k(&self, x: f64) -> f64 {
        self.u_k_erfscale * erf(self.erfarg_scale * x.log10() + self.erfarg_offset)
    }

    fn u_c(&self, x: f64) -> f64 {
        self.u_c_powscale * x.powf(self.u_c_exp)
    }

    fn u(&self, x: f64) -> f64 {
        if x <= self.t_k1 {
            0.0
        } else if x <= self.t_k2 {
            self.u_k(x) - x + self.u_knee_offset
        } else {
            self.u_c(x) - x + self.u_comp_offset
        }
    }

    fn w_k(&self, x: f64) -> f64 {
        let log10x = x.log10();
        self.w_k_powscale * x.powf(self.w_k_powarg_scale * log10x + self.w_k_powarg_offset)
    }

    fn w_c(&self, x: f64) -> f64 {
        self.w_c_powscale * x.powf(self.w_c_exp)
    }

    fn g(&self, x_in: f64) -> f64 {
        let x = x_in.abs();
        if x <= self.t_k1 {
            1.0
        } else if x <= self.t_k2 {
            self.w_k(x)
        } else {
            self.w_c(x)
        }
    }

    /// ADAA1 gain reduction (linear, subtract 1.0 for dB-style "reduction
    /// below unity", added here to match the direct multiplicative gain
    /// the original's call sites expect).
    fn compute(&mut self, x: f64) -> f64 {
        const TOL: f64 = 0.0001;
        let u = if x < 0.0 { -self.u(x.abs()) } else { self.u(x.abs()) };
        let dx = x - self.xm1;
        let du = u - self.um1;
        self.xm1 = x;
        self.um1 = u;
        if dx.abs() < TOL {
            self.g(0.5 * (x + self.xm1)) - 1.0
        } else {
            du / dx
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub enum CompressorEvent {
    Threshold { target: f32, time_total: f64, shape: RampShape },
    Ratio { target: f32, time_total: f64, shape: RampShape },
    Knee { target: f32, time_total: f64, shape: RampShape },
}

struct ChannelState {
    gc: GainComputer,
    envelope: f64,
}

/// ADAA-antialiased feed-forward compressor, oversampled to keep the
/// nonlinear gain curve from folding high-frequency content back down
/// (spec.md §4.10).
pub struct Compressor {
    params: CompressorParams,
    stereo_mode: StereoMode,
    channels: Vec<ChannelState>,
    oversampler: Oversampler,
    threshold_ramp: Ramp,
    ratio_ramp: Ramp,
    knee_ramp: Ramp,
    control: crate::control::ControlObject<CompressorEvent>,
}

impl Compressor {
    pub fn new(params: CompressorParams, stereo_mode: StereoMode, num_channels: usize, oversample_factor: usize) -> Self {
        let threshold = params.threshold_db as f32;
        let ratio = params.ratio as f32;
        let knee = params.knee_db as f32;
        Compressor {
            channels: (0..num_channels)
                .map(|_| ChannelState {
                    gc: GainComputer::new(params.threshold_db, params.ratio, params.knee_db),
                    envelope: 0.0,
                })
                .collect(),
            oversampler: Oversampler::new(oversample_factor),
            threshold_ramp: Ramp::instant(threshold),
            ratio_ramp: Ramp::instant(ratio),
            knee_ramp: Ramp::instant(knee),
            control: crate::control::ControlObject::new(),
            params,
            stereo_mode,
        }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: CompressorEvent) {
        self.control.schedule(at, event);
    }

    fn attack_coeff(&self, sample_rate: u32) -> f64 {
        let samples = self.params.attack_samples.max(1.0) * (sample_rate as f64 / 44_100.0);
        (-1.0 / samples).exp()
    }

    fn release_coeff(&self, sample_rate: u32) -> f64 {
        let samples = self.params.release_samples.max(1.0) * (sample_rate as f64 / 44_100.0);
        (-1.0 / samples).exp()
    }
}

impl AudioNode for Compressor {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, _requester: Option<NodeId>) {
        if bufs.is_empty() {
            return;
        }
        let nframes = bufs[0].len();
        let dry_gain = 10f32.powf(self.params.dry_volume_db / 20.0);

        let start = self.control.current_sample;
        let mut map = std::mem::replace(&mut self.control.map, crate::control::EventMap::new());
        let mut events = map.keys_in_range(start, start + nframes as SampleIndex);
        let mut key_idx = 0usize;
        let dt = 1.0 / sample_rate as f64;

        let mut threshold_track = vec![0.0f64; nframes];
        let mut ratio_track = vec![0.0f64; nframes];
        let mut knee_track = vec![0.0f64; nframes];
        let mut params_moved = vec![false; nframes];

        for i in 0..nframes {
            let now = start + i as SampleIndex;
            while key_idx < events.len() && events[key_idx] == now {
                if let Some(due) = map.take_at(now) {
                    for ev in due {
                        match ev {
                            CompressorEvent::Threshold { target, time_total, shape } => {
                                self.threshold_ramp = Ramp::new(target, time_total, shape)
                            }
                            CompressorEvent::Ratio { target, time_total, shape } => {
                                self.ratio_ramp = Ramp::new(target, time_total, shape)
                            }
                            CompressorEvent::Knee { target, time_total, shape } => {
                                self.knee_ramp = Ramp::new(target, time_total, shape)
                            }
                        }
                    }
                    params_moved[i] = true;
                }
                key_idx += 1;
            }
            let t = self.threshold_ramp.step(self.params.threshold_db as f32, dt);
            let r = self.ratio_ramp.step(self.params.ratio as f32, dt);
            let k = self.knee_ramp.step(self.params.knee_db as f32, dt);
            if (t - self.params.threshold_db as f32).abs() > 1e-6
                || (r - self.params.ratio as f32).abs() > 1e-6
                || (k - self.params.knee_db as f32).abs() > 1e-6
            {
                params_moved[i] = true;
            }
            self.params.threshold_db = t as f64;
            self.params.ratio = r as f64;
            self.params.knee_db = k as f64;
            threshold_track[i] = self.params.threshold_db;
            ratio_track[i] = self.params.ratio;
            knee_track[i] = self.params.knee_db;
        }
        self.control.map = map;
        self.control.current_sample += nframes as SampleIndex;

        let attack = self.attack_coeff(sample_rate);
        let release = self.release_coeff(sample_rate);

        let dry: Vec<Vec<Sample>> = bufs.iter().map(|b| b.to_vec()).collect();
        for i in 0..nframes {
            if params_moved[i] {
                for ch in self.channels.iter_mut() {
                    ch.gc.set_params(threshold_track[i], ratio_track[i], knee_track[i]);
                }
            }
        }

        let stereo_encoded = matches!(self.stereo_mode, StereoMode::M | StereoMode::Ms) && bufs.len() >= 2;
        if stereo_encoded {
            // Mid/side conversion happens inside the compressor (spec.md
            // §4.10): encode, compress each rail with its own envelope
            // state, decode back to L/R before the dry mix.
            let mut mid: Vec<Sample> = (0..nframes).map(|i| 0.5 * (bufs[0][i] + bufs[1][i])).collect();
            let mut side: Vec<Sample> = (0..nframes).map(|i| 0.5 * (bufs[0][i] - bufs[1][i])).collect();

            {
                let ch = &mut self.channels[0];
                self.oversampler.process(&mut mid, sample_rate, |s, _sr| {
                    let x = s as f64;
                    let reduction = ch.gc.compute(x);
                    let target = reduction.clamp(-1.0, 1.0);
                    let coeff = if target < ch.envelope { attack } else { release };
                    ch.envelope = coeff * ch.envelope + (1.0 - coeff) * target;
                    (x * (1.0 + ch.envelope)) as Sample
                });
            }

            if matches!(self.stereo_mode, StereoMode::Ms) {
                let ch = &mut self.channels[1];
                self.oversampler.process(&mut side, sample_rate, |s, _sr| {
                    let x = s as f64;
                    let reduction = ch.gc.compute(x);
                    let target = reduction.clamp(-1.0, 1.0);
                    let coeff = if target < ch.envelope { attack } else { release };
                    ch.envelope = coeff * ch.envelope + (1.0 - coeff) * target;
                    (x * (1.0 + ch.envelope)) as Sample
                });
            }

            for i in 0..nframes {
                bufs[0][i] = mid[i] + side[i];
                bufs[1][i] = mid[i] - side[i];
            }
            for (ch_idx, buf) in bufs.iter_mut().enumerate().take(2) {
                for (i, s) in buf.iter_mut().enumerate() {
                    *s += dry[ch_idx][i] * dry_gain;
                }
            }
        }

        let start_ch = if stereo_encoded { 2 } else { 0 };
        for (ch_idx, buf) in bufs.iter_mut().enumerate().skip(start_ch) {
            if ch_idx >= self.channels.len() {
                continue;
            }
            let ch = &mut self.channels[ch_idx];
            self.oversampler.process(buf, sample_rate, |s, _sr| {
                let x = s as f64;
                let reduction = ch.gc.compute(x);
                let target = reduction.clamp(-1.0, 1.0);
                let coeff = if target < ch.envelope { attack } else { release };
                ch.envelope = coeff * ch.envelope + (1.0 - coeff) * target;
                (x * (1.0 + ch.envelope)) as Sample
            });
            for (i, s) in buf.iter_mut().enumerate() {
                *s += dry[ch_idx][i] * dry_gain;
            }
        }
    }

    fn num_channels(&self) -> usize {
        self.channels.len()
    }

    fn sample_delay(&self) -> usize {
        // Spec-pinned constant (spec.md §4.10), independent of the chosen
        // oversample factor, so a join aligning a compressed peer input
        // against an uncompressed one always compensates by the same
        // amount regardless of the compressor's internal settings.
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loud_signal_is_attenuated_relative_to_quiet_signal() {
        let mut comp = Compressor::new(
            CompressorParams { dry_volume_db: -120.0, ..Default::default() },
            StereoMode::Lr,
            1,
            2,
        );
        let mut loud = vec![0.9f32; 2048];
        {
            let mut slices: Vec<&mut [Sample]> = vec![loud.as_mut_slice()];
            comp.get_samples(&mut slices, 44_100, None);
        }
        let tail_rms = (loud[1500..].iter().map(|s| s * s).sum::<f32>() / 548.0).sqrt();
        assert!(tail_rms < 0.9, "a signal well above threshold should be gain-reduced: rms {tail_rms}");
    }

    #[test]
    fn quiet_signal_passes_through_near_unity() {
        let mut comp = Compressor::new(
            CompressorParams { threshold_db: 0.0, dry_volume_db: -120.0, ..Default::default() },
            StereoMode::Lr,
            1,
            2,
        );
        let mut quiet = vec![0.01f32; 512];
        {
            let mut slices: Vec<&mut [Sample]> = vec![quiet.as_mut_slice()];
            comp.get_samples(&mut slices, 44_100, None);
        }
        assert!((quiet[400] - 0.01).abs() < 0.005);
    }

    #[test]
    fn mid_side_mode_compresses_the_common_signal_and_leaves_a_silent_side_untouched() {
        let mut comp = Compressor::new(
            CompressorParams { dry_volume_db: -120.0, ..Default::default() },
            StereoMode::Ms,
            2,
            2,
        );
        let mut left = vec![0.9f32; 2048];
        let mut right = vec![0.9f32; 2048];
        {
            let mut slices: Vec<&mut [Sample]> = vec![left.as_mut_slice(), right.as_mut_slice()];
            comp.get_samples(&mut slices, 44_100, None);
        }
        let tail_rms = (left[1500..].iter().map(|s| s * s).sum::<f32>() / 548.0).sqrt();
        assert!(tail_rms < 0.9, "a mono-identical L/R pair should be gain-reduced via the mid rail: rms {tail_rms}");
        assert!((left[1800] - right[1800]).abs() < 1e-5, "identical L/R with zero side should stay identical");
    }

    #[test]
    fn sample_delay_is_the_spec_pinned_constant_regardless_of_oversample_factor() {
        let comp2 = Compressor::new(CompressorParams::default(), StereoMode::Lr, 1, 2);
        let comp8 = Compressor::new(CompressorParams::default(), StereoMode::Lr, 1, 8);
        assert_eq!(comp2.sample_delay(), 256);
        assert_eq!(comp8.sample_delay(), 256);
    }

    #[test]
    fn erf_matches_known_values() {
        assert!((erf(0.0)).abs() < 1e-9);
        assert!((erf(1.0) - 0.8427).abs() < 1e-3);
        assert!((erf(-1.0) + 0.8427).abs() < 1e-3);
    }
}
