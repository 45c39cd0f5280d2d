//! Discrete echo/delay effect (spec.md §4.14). Grounded on the teacher's
//! `src/analysis/delay.rs::DelayParams`/`gain`, generalized from an
//! offline per-replica gain table into a real-time feedback delay line an
//! `AudioNode` can pull through one sample at a time.

use crate::node::{AudioNode, NodeId};
use crate::sample::Sample;

#[derive(Copy, Clone, Debug)]
pub struct DelayParams {
    pub len_seconds: f32,
    pub n_echoes: usize,
    pub gain: f32,
    pub mix: f32,
}

pub fn is_passthrough(params: &DelayParams) -> bool {
    params.mix == 0.0 || params.len_seconds == 0.0 || params.gain == 0.0 || params.n_echoes == 0
}

/// Amplitude of the `replica`-th echo, `replica` 0-indexed where 0 is the
/// dry signal (gain 1, always passed through).
pub fn gain(replica: usize, params: &DelayParams) -> f32 {
    if replica == 0 || is_passthrough(params) {
        return 1.0;
    }
    params.mix * params.gain.powi(replica as i32)
}

struct Line {
    buf: Vec<Sample>,
    pos: usize,
}

impl Line {
    fn new(len: usize) -> Self {
        Line { buf: vec![0.0; len.max(1)], pos: 0 }
    }

    fn process(&mut self, input: Sample, feedback_gain: f32) -> Sample {
        let delayed = self.buf[self.pos];
        self.buf[self.pos] = input + delayed * feedback_gain;
        self.pos = (self.pos + 1) % self.buf.len();
        delayed
    }
}

/// Feedback delay line: `n_echoes` discrete repeats decaying by `gain` per
/// repeat, dry/wet blended by `mix`.
pub struct DelayEffect {
    lines: Vec<Line>,
    params: DelayParams,
}

impl DelayEffect {
    pub fn new(sample_rate: u32, num_channels: usize, params: DelayParams) -> Self {
        let len = ((params.len_seconds.max(0.001)) * sample_rate as f32) as usize;
        DelayEffect {
            lines: (0..num_channels).map(|_| Line::new(len)).collect(),
            params,
        }
    }
}

impl AudioNode for DelayEffect {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], _sample_rate: u32, _requester: Option<NodeId>) {
        if is_passthrough(&self.params) {
            return;
        }
        let nframes = bufs.first().map(|b| b.len()).unwrap_or(0);
        let feedback = self.params.gain.clamp(0.0, 0.999);
        for (ch_idx, buf) in bufs.iter_mut().enumerate() {
            if ch_idx >= self.lines.len() {
                continue;
            }
            let line = &mut self.lines[ch_idx];
            for i in 0..nframes {
                let dry = buf[i];
                let echo = line.process(dry, feedback);
                buf[i] = dry + echo * self.params.mix;
            }
        }
    }

    fn num_channels(&self) -> usize {
        self.lines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_params_leave_signal_untouched() {
        let params = DelayParams { mix: 0.0, len_seconds: 0.5, gain: 0.5, n_echoes: 3 };
        let mut fx = DelayEffect::new(44_100, 1, params);
        let mut buf = vec![1.0f32; 16];
        let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
        fx.get_samples(&mut slices, 44_100, None);
        assert!(buf.iter().all(|s| *s == 1.0));
    }

    #[test]
    fn gain_decays_per_replica() {
        let params = DelayParams { mix: 0.5, len_seconds: 0.1, gain: 0.5, n_echoes: 4 };
        assert_eq!(gain(0, &params), 1.0);
        assert!(gain(1, &params) > gain(2, &params));
        assert!(gain(2, &params) > gain(3, &params));
    }

    #[test]
    fn impulse_produces_a_delayed_echo() {
        let params = DelayParams { mix: 0.8, len_seconds: 0.001, gain: 0.5, n_echoes: 4 };
        let mut fx = DelayEffect::new(44_100, 1, params);
        let delay_samples = (0.001 * 44_100.0) as usize;
        let mut buf = vec![0.0f32; delay_samples * 3];
        buf[0] = 1.0;
        let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
        fx.get_samples(&mut slices, 44_100, None);
        assert!(buf[delay_samples] > 0.0, "echo should appear one delay-length later");
    }
}
