//! Frequency-domain checks the time-domain assertions in each module's
//! inline tests can't make on their own: ring-mod sideband placement
//! (scenario 2) and biquad peaking-filter magnitude response (scenario 3).
//! Bin-aligned test tones are used throughout so a rectangular-windowed
//! FFT has zero spectral leakage, keeping the assertions exact rather than
//! approximate.

use rustfft::{num_complex::Complex, FftPlanner};
use scorewav::filter::{BiquadFilter, BiquadKind};
use scorewav::join::{JoinKind, JoinNode};
use scorewav::node::{AudioNode, NodeId};
use scorewav::synth::sine::{SinusoidSynth, Waveform};
use std::sync::{Arc, Mutex};

const SR: u32 = 44_100;

/// Single-sided magnitude spectrum of a real signal, `n/2 + 1` bins wide,
/// normalized so a full-scale sine tone reads back as amplitude 1.0.
fn magnitude_spectrum(signal: &[f32]) -> Vec<f32> {
    let n = signal.len();
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buf: Vec<Complex<f32>> = signal.iter().map(|&s| Complex::new(s, 0.0)).collect();
    fft.process(&mut buf);
    buf[..n / 2 + 1].iter().map(|c| 2.0 * c.norm() / n as f32).collect()
}

fn bin_for_hz(hz: f32, n: usize, sample_rate: u32) -> usize {
    (hz * n as f32 / sample_rate as f32).round() as usize
}

/// Scenario 2: ring-modulating 440 Hz and 110 Hz sines should produce
/// sum/difference sidebands at 330 Hz and 550 Hz with (almost) no energy
/// left at either carrier frequency.
#[test]
fn ring_mod_places_energy_at_sum_and_difference_frequencies() {
    let n = SR as usize; // exactly 1 second -> 1 Hz wide bins, so all the
                         // frequencies below land on an exact bin.
    let a: Arc<Mutex<dyn AudioNode>> = Arc::new(Mutex::new(SinusoidSynth::new(Waveform::Sine, 440.0, 1.0, 0.0)));
    let b: Arc<Mutex<dyn AudioNode>> = Arc::new(Mutex::new(SinusoidSynth::new(Waveform::Sine, 110.0, 1.0, 0.0)));
    let mut join = JoinNode::new(NodeId(0), 1, JoinKind::RingMod);
    join.add_input(NodeId(1), a);
    join.add_input(NodeId(2), b);

    let mut buf = vec![0.0f32; n];
    {
        let mut slices: Vec<&mut [f32]> = vec![buf.as_mut_slice()];
        join.get_samples(&mut slices, SR, None);
    }

    let peak = buf.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
    assert!(peak <= 1.05, "ring-mod output peak {peak} exceeds expected headroom");

    let spectrum = magnitude_spectrum(&buf);
    let mag_330 = spectrum[bin_for_hz(330.0, n, SR)];
    let mag_550 = spectrum[bin_for_hz(550.0, n, SR)];
    let mag_440 = spectrum[bin_for_hz(440.0, n, SR)];

    assert!(mag_330 > 0.3, "expected a sideband near 330 Hz, got {mag_330}");
    assert!(mag_550 > 0.3, "expected a sideband near 550 Hz, got {mag_550}");

    let floor = mag_330.max(mag_550).max(1e-9);
    let db_down = 20.0 * (mag_440 / floor).log10();
    assert!(db_down < -40.0, "440 Hz carrier only {db_down} dB down from the sidebands, expected < -40 dB");
}

/// Scenario 3: a peaking EQ boosts its center frequency by its configured
/// gain and leaves a frequency far outside its bandwidth roughly
/// untouched.
#[test]
fn peaking_filter_boosts_center_frequency_by_configured_gain() {
    let n = 4096usize;
    // Bin-aligned stand-ins for "1000 Hz" and "5000 Hz" so the FFT reads an
    // exact magnitude with no window leakage.
    let center_bin = bin_for_hz(1000.0, n, SR);
    let far_bin = bin_for_hz(5000.0, n, SR);
    let center_hz = center_bin as f32 * SR as f32 / n as f32;
    let far_hz = far_bin as f32 * SR as f32 / n as f32;

    for (test_hz, bin, expected_db, tolerance_db) in
        [(center_hz, center_bin, 12.0, 1.0), (far_hz, far_bin, 0.0, 1.5)]
    {
        let mut filt = BiquadFilter::new(BiquadKind::PeakingEq, 1, 1000.0, 2.0, 12.0);
        let input: Vec<f32> =
            (0..n).map(|i| (2.0 * std::f32::consts::PI * test_hz * i as f32 / SR as f32).sin()).collect();
        let mut out = input.clone();
        {
            let mut slices: Vec<&mut [f32]> = vec![out.as_mut_slice()];
            filt.get_samples(&mut slices, SR, None);
        }

        let in_mag = magnitude_spectrum(&input)[bin];
        let out_mag = magnitude_spectrum(&out)[bin];
        let gain_db = 20.0 * (out_mag / in_mag).log10();
        assert!(
            (gain_db - expected_db).abs() < tolerance_db,
            "at {test_hz} Hz expected {expected_db} dB +/- {tolerance_db}, measured {gain_db} dB"
        );
    }
}
