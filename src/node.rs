//! The `AudioNode` trait and the pull protocol (spec.md §4.1), plus the
//! node arena that replaces the original's strong/weak shared-pointer
//! graph with stable indices (spec.md §9 "Ownership cycles").

use crate::sample::Sample;

/// Stable handle into a `Graph`'s node arena. Cheap to copy, forbids
/// dangling-reference bugs that a raw index into a `Vec` that might shrink
/// would allow, since nodes are never removed once added (graphs are
/// built once at load time and never mutated during render).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

/// Every processing unit in the graph implements this. `get_samples` must
/// either fill every channel buffer with exactly `bufs[0].len()` samples,
/// or leave the buffers untouched — downstream joins treat an untouched
/// buffer as silence (spec.md §4.1).
pub trait AudioNode: Send + Sync {
    /// Fill `bufs` (one slice per channel, all the same length) with the
    /// next `bufs[i].len()` samples. `requester` identifies the pulling
    /// node so fan-out nodes can track per-consumer read cursors.
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: Option<NodeId>);

    /// Channel count this node is willing to produce.
    fn num_channels(&self) -> usize;

    /// Intrinsic latency in samples (oversamplers, ADAA, compressor
    /// lookahead) that joins must compensate for when aligning peer
    /// inputs.
    fn sample_delay(&self) -> usize {
        0
    }

    /// Fired when this node is wired into a join as an input.
    fn on_added_as_input(&mut self, _downstream: NodeId) {}

    /// Fired when this node is unwired from a join.
    fn on_removed_from_input(&mut self, _downstream: NodeId) {}
}

/// Lets a `Box<dyn AudioNode>` built up through chained composition (e.g.
/// `chain::EffectNode`, `interpreter`'s fx folds) be dropped straight into
/// a `Graph` node slot, which stores `Arc<Mutex<dyn AudioNode>>`.
impl AudioNode for Box<dyn AudioNode> {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: Option<NodeId>) {
        (**self).get_samples(bufs, sample_rate, requester)
    }

    fn num_channels(&self) -> usize {
        (**self).num_channels()
    }

    fn sample_delay(&self) -> usize {
        (**self).sample_delay()
    }

    fn on_added_as_input(&mut self, downstream: NodeId) {
        (**self).on_added_as_input(downstream)
    }

    fn on_removed_from_input(&mut self, downstream: NodeId) {
        (**self).on_removed_from_input(downstream)
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;

    /// A node that emits a single impulse (1.0) at its very first sample,
    /// then silence. Used across join/fanout tests to verify delay
    /// alignment (spec.md §8's impulse-alignment invariant).
    pub struct Impulse {
        channels: usize,
        fired: bool,
        delay: usize,
    }

    impl Impulse {
        pub fn new(channels: usize, delay: usize) -> Self {
            Impulse { channels, fired: false, delay }
        }
    }

    impl AudioNode for Impulse {
        fn get_samples(&mut self, bufs: &mut [&mut [Sample]], _sample_rate: u32, _requester: Option<NodeId>) {
            for (i, buf) in bufs.iter_mut().enumerate() {
                if i >= self.channels {
                    continue;
                }
                for (idx, s) in buf.iter_mut().enumerate() {
                    *s = if !self.fired && idx == 0 { 1.0 } else { 0.0 };
                }
            }
            self.fired = true;
        }

        fn num_channels(&self) -> usize {
            self.channels
        }

        fn sample_delay(&self) -> usize {
            self.delay
        }
    }

    /// A node that emits a fixed constant value forever, for simple sum
    /// tests.
    pub struct Constant {
        channels: usize,
        value: Sample,
    }

    impl Constant {
        pub fn new(channels: usize, value: Sample) -> Self {
            Constant { channels, value }
        }
    }

    impl AudioNode for Constant {
        fn get_samples(&mut self, bufs: &mut [&mut [Sample]], _sample_rate: u32, _requester: Option<NodeId>) {
            for buf in bufs.iter_mut().take(self.channels) {
                buf.iter_mut().for_each(|s| *s = self.value);
            }
        }

        fn num_channels(&self) -> usize {
            self.channels
        }
    }
}
