//! Plain gain-ramp node (spec.md §4.15): the simplest possible
//! `AudioNode`, wrapping a single `Ramp` around upstream's output.
//! Grounded on `original_source/src/Fader.h`'s one-parameter ramped gain.

use crate::control::SampleIndex;
use crate::node::{AudioNode, NodeId};
use crate::ramp::{Ramp, RampShape};
use crate::sample::Sample;

#[derive(Clone, Copy, Debug)]
pub struct FaderEvent {
    pub target: f32,
    pub time_total: f64,
    pub shape: RampShape,
}

pub struct Fader {
    gain: f32,
    gain_ramp: Ramp,
    control: crate::control::ControlObject<FaderEvent>,
}

impl Fader {
    pub fn new(gain: f32) -> Self {
        Fader { gain, gain_ramp: Ramp::instant(gain), control: crate::control::ControlObject::new() }
    }

    pub fn schedule(&mut self, at: SampleIndex, event: FaderEvent) {
        self.control.schedule(at, event);
    }
}

impl AudioNode for Fader {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, _requester: Option<NodeId>) {
        let nframes = bufs.first().map(|b| b.len()).unwrap_or(0);
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
                        self.gain_ramp = Ramp::new(ev.target, ev.time_total, ev.shape);
                    }
                }
                key_idx += 1;
            }
            self.gain = self.gain_ramp.step(self.gain, dt);
            for buf in bufs.iter_mut() {
                buf[i] *= self.gain;
            }
        }

        self.control.map = map;
        self.control.current_sample += nframes as SampleIndex;
    }

    fn num_channels(&self) -> usize {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_gain_silences_input() {
        let mut fader = Fader::new(0.0);
        let mut buf = vec![1.0f32; 8];
        let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
        fader.get_samples(&mut slices, 44_100, None);
        assert!(buf.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn unity_gain_passes_through() {
        let mut fader = Fader::new(1.0);
        let mut buf = vec![0.5f32; 8];
        let mut slices: Vec<&mut [Sample]> = vec![buf.as_mut_slice()];
        fader.get_samples(&mut slices, 44_100, None);
        assert!(buf.iter().all(|s| (*s - 0.5).abs() < 1e-6));
    }
}
