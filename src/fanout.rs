//! `FanOutQueue` / `AudioMult`: lets a single producer node feed more than
//! one consumer without re-running its (possibly stateful) `get_samples`
//! once per consumer (spec.md §4.5).
//!
//! Grounded on the teacher's `src/pan.rs::AudioChannel`, which keeps a
//! growable ring buffer and a read cursor for exactly this "write once,
//! read many times, at different paces" shape.

use crate::node::{AudioNode, NodeId};
use crate::sample::Sample;
use std::collections::HashMap;
use std::sync::Mutex;

/// Wraps a single producer and serves its output to any number of
/// consumers, each identified by the `requester` passed to `get_samples`.
/// Consumers may pull at different times; the shared ring only drops
/// samples once every registered consumer has read past them.
pub struct FanOutQueue {
    source: Box<dyn AudioNode>,
    channels: usize,
    ring: Vec<Vec<Sample>>,
    /// Absolute sample index of `ring[_][0]`.
    ring_base: u64,
    /// Absolute sample index each consumer has read up to.
    cursors: Mutex<HashMap<NodeId, u64>>,
    produced: u64,
}

impl FanOutQueue {
    pub fn new(source: Box<dyn AudioNode>) -> Self {
        let channels = source.num_channels();
        FanOutQueue {
            source,
            channels,
            ring: vec![Vec::new(); channels],
            ring_base: 0,
            cursors: Mutex::new(HashMap::new()),
            produced: 0,
        }
    }

    /// Registers a consumer so its cursor starts at the current write head
    /// rather than at zero (a consumer added mid-render shouldn't replay
    /// history it never asked for).
    pub fn register_consumer(&self, id: NodeId) {
        self.cursors.lock().unwrap().entry(id).or_insert(self.produced);
    }

    fn min_cursor(&self) -> u64 {
        let cursors = self.cursors.lock().unwrap();
        cursors.values().copied().min().unwrap_or(self.produced)
    }

    /// Pulls enough fresh samples from the source to satisfy `upto`,
    /// doubling the ring's capacity whenever it would otherwise overrun.
    fn ensure_produced(&mut self, upto: u64, sample_rate: u32) {
        if upto <= self.produced {
            return;
        }
        let needed = (upto - self.produced) as usize;
        let mut tmp: Vec<Vec<Sample>> = vec![vec![0.0; needed]; self.channels];
        {
            let mut slices: Vec<&mut [Sample]> = tmp.iter_mut().map(|c| c.as_mut_slice()).collect();
            self.source.get_samples(&mut slices, sample_rate, None);
        }

        let min_read = self.min_cursor();
        let drop_count = (min_read.saturating_sub(self.ring_base)) as usize;
        if drop_count > 0 {
            for ch in &mut self.ring {
                ch.drain(0..drop_count.min(ch.len()));
            }
            self.ring_base += drop_count as u64;
        }

        let required_capacity = (self.ring_base..upto).len();
        let mut cap = self.ring.first().map(|c| c.capacity()).unwrap_or(0).max(1);
        while cap < required_capacity {
            cap *= 2;
        }
        for ch in &mut self.ring {
            ch.reserve(cap.saturating_sub(ch.capacity()));
        }

        for (ch, chunk) in self.ring.iter_mut().zip(tmp.into_iter()) {
            ch.extend(chunk);
        }
        self.produced = upto;
    }

    /// Serves `bufs` to `requester` starting at that consumer's own cursor,
    /// pulling fresh samples from the source only when no cached samples
    /// cover the request yet.
    pub fn pull_for(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, requester: NodeId) {
        let nframes = bufs.first().map(|b| b.len()).unwrap_or(0);
        let start = {
            let mut cursors = self.cursors.lock().unwrap();
            *cursors.entry(requester).or_insert(self.produced)
        };
        let end = start + nframes as u64;
        self.ensure_produced(end, sample_rate);

        let offset = (start - self.ring_base) as usize;
        for (ch_idx, out) in bufs.iter_mut().enumerate() {
            if ch_idx >= self.channels {
                continue;
            }
            let src = &self.ring[ch_idx];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = src.get(offset + i).copied().unwrap_or(0.0);
            }
        }

        self.cursors.lock().unwrap().insert(requester, end);
    }
}

/// `AudioNode` facade over a `FanOutQueue` handed to a single consumer; the
/// queue itself is shared (via `Arc<Mutex<FanOutQueue>>` at the graph-wiring
/// layer) across every tap that reads the same underlying producer.
pub struct AudioMult {
    pub channels: usize,
}

impl AudioMult {
    pub fn new(channels: usize) -> Self {
        AudioMult { channels }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::Impulse;

    #[test]
    fn two_consumers_at_different_paces_both_see_the_impulse() {
        let mut q = FanOutQueue::new(Box::new(Impulse::new(1, 0)));
        q.register_consumer(NodeId(1));
        q.register_consumer(NodeId(2));

        let mut a = vec![0.0f32; 4];
        {
            let mut slices: Vec<&mut [Sample]> = vec![a.as_mut_slice()];
            q.pull_for(&mut slices, 44_100, NodeId(1));
        }
        assert_eq!(a[0], 1.0);

        // Consumer 2 lags behind, pulling in smaller chunks; it must still
        // see the impulse at its own absolute index 0 once it reads.
        let mut b = vec![0.0f32; 2];
        {
            let mut slices: Vec<&mut [Sample]> = vec![b.as_mut_slice()];
            q.pull_for(&mut slices, 44_100, NodeId(2));
        }
        assert_eq!(b[0], 1.0);
    }

    #[test]
    fn ring_drops_history_once_both_consumers_have_passed_it() {
        let mut q = FanOutQueue::new(Box::new(Impulse::new(1, 0)));
        q.register_consumer(NodeId(1));
        q.register_consumer(NodeId(2));

        // Both consumers read past the impulse; once the slower one (2)
        // catches up, the ring's base should have advanced past sample 0.
        for id in [NodeId(1), NodeId(2)] {
            for _ in 0..5 {
                let mut a = vec![0.0f32; 16];
                let mut slices: Vec<&mut [Sample]> = vec![a.as_mut_slice()];
                q.pull_for(&mut slices, 44_100, id);
            }
        }
        assert!(q.ring_base > 0, "ring_base should advance once the slowest consumer passes old data");
    }
}
