//! Equal-power panner (spec.md §4.13). Grounded on the teacher's own
//! `left_scaling_factor`/`right_scaling_factor` (kept verbatim) wired up as
//! an `AudioNode` instead of a bare pair of free functions.

use crate::control::SampleIndex;
use crate::node::{AudioNode, NodeId};
use crate::ramp::{Ramp, RampShape};
use crate::sample::Sample;

pub fn left_scaling_factor(pan: f64) -> f64 {
    let pi_over_four = std::f64::consts::PI / 4.0;
    let theta = (pan + 1.0) * pi_over_four;
    (theta.cos() * 0.5 + 0.5).sqrt()
}

pub fn right_scaling_factor(pan: f64) -> f64 {
    let pi_over_four = std::f64::consts::PI / 4.0;
    let theta = (pan + 1.0) * pi_over_four;
    (theta.sin() * 0.5 + 0.5).sqrt()
}

#[derive(Clone, Copy, Debug)]
pub struct PanEvent {
    pub target: f32,
    pub time_total: f64,
    pub shape: RampShape,
}

/// Takes a mono upstream signal and spreads it across an arbitrary output
/// channel count using an equal-power law for channels 0/1 (left/right);
/// additional channels beyond stereo pass the signal through unattenuated,
/// matching the original's stereo-only panning law with no opinion about
/// surround busses.
pub struct Panner {
    pan: f32,
    pan_ramp: Ramp,
    control: crate::control::ControlObject<PanEvent>,
}

impl Panner {
    pub fn new(pan: f32) -> Self {
        Panner {
            pan,
            pan_ramp: Ramp::instant(pan),
            control: crate::control::ControlObject::new(),
        }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: PanEvent) {
        self.control.schedule(at, event);
    }

    /// Applies the panning law to a mono input buffer already fetched from
    /// upstream, writing the result into `bufs`. Kept as a free method
    /// (rather than baked into `get_samples`) so a future stereo source can
    /// reuse the same law on an already-decorrelated pair.
    pub fn apply(&mut self, input: &[Sample], bufs: &mut [&mut [Sample]], sample_rate: u32) {
        let nframes = input.len();
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
                        self.pan_ramp = Ramp::new(ev.target, ev.time_total, ev.shape);
                    }
                }
                key_idx += 1;
            }
            self.pan = self.pan_ramp.step(self.pan, dt);
            let (l, r) = (left_scaling_factor(self.pan as f64), right_scaling_factor(self.pan as f64));
            for (ch_idx, buf) in bufs.iter_mut().enumerate() {
                buf[i] = match ch_idx {
                    0 => input[i] * l as Sample,
                    1 => input[i] * r as Sample,
                    _ => input[i],
                };
            }
        }

        self.control.map = map;
        self.control.current_sample += nframes as SampleIndex;
    }
}

/// Wraps a mono upstream node and pulls+pans it in one `get_samples` call.
pub struct PannerNode {
    source: Box<dyn AudioNode>,
    panner: Panner,
    scratch: Vec<Sample>,
}

impl PannerNode {
    pub fn new(source: Box<dyn AudioNode>, pan: f32) -> Self {
        PannerNode { source, panner: Panner::new(pan), scratch: Vec::new() }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: PanEvent) {
        self.panner.schedule(at, event);
    }
}

impl AudioNode for PannerNode {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: Option<NodeId>) {
        let nframes = bufs.first().map(|b| b.len()).unwrap_or(0);
        self.scratch.clear();
        self.scratch.resize(nframes, 0.0);
        let mut mono = [self.scratch.as_mut_slice()];
        self.source.get_samples(&mut mono, sample_rate, requester);
        self.panner.apply(&self.scratch, bufs, sample_rate);
    }

    fn num_channels(&self) -> usize {
        2
    }

    fn sample_delay(&self) -> usize {
        self.source.sample_delay()
    }
}

/// `FanOutQueue`-backed ring used for simple per-channel delay lines
/// (kept from the teacher, generalized from a fixed stereo pair to an
/// arbitrary-length line reused by `crate::delay`).
pub struct AudioChannel {
    buffer: Vec<Sample>,
    buffer_position: usize,
}

impl AudioChannel {
    pub fn new(max_delay_samples: usize) -> Self {
        AudioChannel {
            buffer: vec![0.0; max_delay_samples.max(1)],
            buffer_position: 0,
        }
    }

    pub fn process_sample(&mut self, input_sample: Sample) -> Sample {
        let output_sample = self.buffer[self.buffer_position];
        self.buffer[self.buffer_position] = input_sample;
        self.buffer_position = (self.buffer_position + 1) % self.buffer.len();
        output_sample
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_pan_is_equal_power() {
        let (l, r) = (left_scaling_factor(0.0), right_scaling_factor(0.0));
        assert!((l - r).abs() < 1e-9);
        assert!((l * l + r * r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hard_left_silences_the_right_channel() {
        assert!(right_scaling_factor(-1.0) < 1e-6);
    }

    #[test]
    fn apply_spreads_mono_into_stereo() {
        let mut panner = Panner::new(0.0);
        let input = vec![1.0f32; 4];
        let mut l = vec![0.0f32; 4];
        let mut r = vec![0.0f32; 4];
        {
            let mut bufs: Vec<&mut [Sample]> = vec![l.as_mut_slice(), r.as_mut_slice()];
            panner.apply(&input, &mut bufs, 44_100);
        }
        assert!((l[0] - r[0]).abs() < 1e-6);
    }
}
