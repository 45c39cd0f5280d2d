//! The feedback delay network itself: N delay lines mixed through an
//! orthonormal feedback matrix, decay gains tuned so each line's RT60
//! matches the requested reverb time.

use crate::node::{AudioNode, NodeId};
use crate::sample::Sample;
use rand::distributions::{Distribution, Standard};
use rand::rngs::StdRng;
use rand::SeedableRng;

const NUM_LINES: usize = 8;

/// Gram-Schmidt orthonormalization of `NUM_LINES` random Gaussian vectors,
/// the same construction as `original_source/src/FDNVerb.h`'s
/// `GenRandomOrthonormalBasis`, seeded for reproducible renders.
fn random_orthonormal_basis(seed: u64) -> [[f64; NUM_LINES]; NUM_LINES] {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = |rng: &mut StdRng| -> f64 {
        // Box-Muller, avoiding a dependency on `rand_distr` for a single
        // Gaussian draw.
        let u1: f64 = Standard.sample(rng);
        let u2: f64 = Standard.sample(rng);
        let u1 = u1.max(1e-12);
        (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
    };

    let mut basis = [[0.0f64; NUM_LINES]; NUM_LINES];
    for i in 0..NUM_LINES {
        loop {
            let mut sumsq = 0.0;
            for j in 0..NUM_LINES {
                let v = normal(&mut rng);
                basis[i][j] = v;
                sumsq += v * v;
            }
            if sumsq < 1e-8 {
                continue;
            }
            let mag_inv = 1.0 / sumsq.sqrt();
            for j in 0..NUM_LINES {
                basis[i][j] *= mag_inv;
            }

            if i > 0 {
                let mut u = basis[i];
                for k in 0..i {
                    let proj: f64 = (0..NUM_LINES).map(|j| u[j] * basis[i - 1 - k][j]).sum();
                    for j in 0..NUM_LINES {
                        u[j] -= proj * basis[i - 1 - k][j];
                    }
                }
                let sumsq: f64 = u.iter().map(|v| v * v).sum();
                if sumsq < 1e-8 {
                    continue;
                }
                let mag_inv = 1.0 / sumsq.sqrt();
                for j in 0..NUM_LINES {
                    basis[i][j] = u[j] * mag_inv;
                }
            }
            break;
        }
    }
    basis
}

/// Hadamard matrix of order `NUM_LINES` (8), used to spread a single input
/// evenly across every delay line with unit-gain orthogonal mixing.
fn hadamard_8() -> [[f64; NUM_LINES]; NUM_LINES] {
    let mut size = 1usize;
    let mut full = [[0.0f64; NUM_LINES]; NUM_LINES];
    full[0][0] = 1.0;
    while size < NUM_LINES {
        let mut next = [[0.0f64; NUM_LINES]; NUM_LINES];
        for i in 0..size {
            for j in 0..size {
                let v = full[i][j];
                next[i][j] = v;
                next[i][j + size] = v;
                next[i + size][j] = v;
                next[i + size][j + size] = -v;
            }
        }
        full = next;
        size *= 2;
    }
    let scale = 1.0 / (NUM_LINES as f64).sqrt();
    for row in full.iter_mut() {
        for v in row.iter_mut() {
            *v *= scale;
        }
    }
    full
}

struct DelayLine {
    buf: Vec<f64>,
    pos: usize,
}

impl DelayLine {
    fn new(len_samples: usize) -> Self {
        DelayLine { buf: vec![0.0; len_samples.max(1)], pos: 0 }
    }

    fn read(&self) -> f64 {
        self.buf[self.pos]
    }

    fn write_and_advance(&mut self, value: f64) {
        self.buf[self.pos] = value;
        self.pos = (self.pos + 1) % self.buf.len();
    }
}

/// Mono-in/stereo-out (or matched-channel) FDN reverb.
pub struct FdnReverb {
    diffusers: Vec<DelayLine>,
    diffuser_gain: f64,
    lines: Vec<DelayLine>,
    feedback: [[f64; NUM_LINES]; NUM_LINES],
    line_decay: [f64; NUM_LINES],
    wet_mix: f32,
    channels: usize,
}

impl FdnReverb {
    /// `rt60_seconds` is the time for the longest delay line to decay
    /// 60dB; `seed` reproduces the random feedback matrix deterministically
    /// across renders of the same score.
    pub fn new(sample_rate: u32, rt60_seconds: f64, wet_mix: f32, channels: usize, seed: u64) -> Self {
        let diffuser_lengths_ms = [4.7, 7.1, 11.3, 13.9, 17.2];
        let diffusers = diffuser_lengths_ms
            .iter()
            .map(|ms| DelayLine::new(((ms / 1000.0) * sample_rate as f64) as usize))
            .collect();

        let line_lengths_ms = [29.7, 37.1, 41.3, 43.7, 53.9, 59.3, 61.1, 67.7];
        let lines: Vec<DelayLine> = line_lengths_ms
            .iter()
            .map(|ms| DelayLine::new(((ms / 1000.0) * sample_rate as f64) as usize))
            .collect();

        let mut line_decay = [0.0; NUM_LINES];
        for (i, ms) in line_lengths_ms.iter().enumerate() {
            let delay_seconds = ms / 1000.0;
            line_decay[i] = (-3.0 * delay_seconds / rt60_seconds.max(0.01)).exp().min(0.999);
        }

        FdnReverb {
            diffusers,
            diffuser_gain: 0.6,
            lines,
            feedback: random_orthonormal_basis(seed),
            line_decay,
            wet_mix: wet_mix.clamp(0.0, 1.0),
            channels,
        }
    }

    fn diffuse(&mut self, mut x: f64) -> f64 {
        for d in &mut self.diffusers {
            let delayed = d.read();
            let out = -self.diffuser_gain * x + delayed;
            d.write_and_advance(x + self.diffuser_gain * out);
            x = out;
        }
        x
    }

    fn tank(&mut self, input: f64) -> f64 {
        let spread = hadamard_8();
        let outputs: Vec<f64> = self.lines.iter().map(|l| l.read()).collect();

        let mut mixed = [0.0f64; NUM_LINES];
        for i in 0..NUM_LINES {
            let mut acc = 0.0;
            for j in 0..NUM_LINES {
                acc += self.feedback[i][j] * outputs[j];
            }
            mixed[i] = acc;
        }

        for i in 0..NUM_LINES {
            let inject = input * spread[i][0];
            self.lines[i].write_and_advance(mixed[i] * self.line_decay[i] + inject);
        }

        outputs.iter().sum::<f64>() / NUM_LINES as f64
    }
}

impl AudioNode for FdnReverb {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], _sample_rate: u32, _requester: Option<NodeId>) {
        if bufs.is_empty() {
            return;
        }
        let nframes = bufs[0].len();
        for i in 0..nframes {
            let dry_mono: f64 = bufs.iter().map(|b| b[i] as f64).sum::<f64>() / bufs.len() as f64;
            let diffused = self.diffuse(dry_mono);
            let wet = self.tank(diffused);
            for buf in bufs.iter_mut() {
                let dry = buf[i];
                buf[i] = dry * (1.0 - self.wet_mix) + wet as Sample * self.wet_mix;
            }
        }
    }

    fn num_channels(&self) -> usize {
        self.channels
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_produces_a_decaying_tail() {
        let mut rv = FdnReverb::new(44_100, 1.5, 1.0, 1, 42);
        let mut buf = vec![0.0f32; 44_100];
        buf[0] = 1.0;
        let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
        rv.get_samples(&mut slices, 44_100, None);
        let early: f32 = buf[1000..5000].iter().map(|s| s.abs()).sum();
        let late: f32 = buf[40_000..44_100].iter().map(|s| s.abs()).sum();
        assert!(early > 0.0, "reverb tank should be excited by the impulse");
        assert!(late < early, "tail should have decayed toward the end of a 1.5s RT60 render");
    }

    #[test]
    fn feedback_matrix_is_orthonormal() {
        let basis = random_orthonormal_basis(7);
        for i in 0..NUM_LINES {
            let norm: f64 = basis[i].iter().map(|v| v * v).sum();
            assert!((norm - 1.0).abs() < 1e-6, "row {i} not unit length: {norm}");
            for j in (i + 1)..NUM_LINES {
                let dot: f64 = (0..NUM_LINES).map(|k| basis[i][k] * basis[j][k]).sum();
                assert!(dot.abs() < 1e-6, "rows {i} and {j} not orthogonal: {dot}");
            }
        }
    }
}
