//! Composes an upstream source with an in-place effect (spec.md §4.12's
//! per-part fx chains). Several processors in this crate — the biquad and
//! ladder filters, the compressor, the waveshaper, the delay, the reverb —
//! read and overwrite the buffer they're handed rather than pulling an
//! upstream themselves, the same "processor with no source of its own"
//! shape the teacher's `src/mix.rs` gives its per-stem effect stages.
//! `EffectNode` is the generic glue: pull `source`, then run `effect` over
//! exactly what came back.

use crate::node::{AudioNode, NodeId};
use crate::sample::Sample;

pub struct EffectNode {
    source: Box<dyn AudioNode>,
    effect: Box<dyn AudioNode>,
    channels: usize,
}

impl EffectNode {
    pub fn new(source: Box<dyn AudioNode>, effect: Box<dyn AudioNode>, channels: usize) -> Self {
        EffectNode { source, effect, channels }
    }
}

impl AudioNode for EffectNode {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: Option<NodeId>) {
        self.source.get_samples(bufs, sample_rate, requester);
        self.effect.get_samples(bufs, sample_rate, requester);
    }

    fn num_channels(&self) -> usize {
        self.channels
    }

    fn sample_delay(&self) -> usize {
        self.source.sample_delay() + self.effect.sample_delay()
    }
}
