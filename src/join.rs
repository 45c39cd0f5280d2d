//! `JoinNode`: the only place multiple audio streams are combined into one
//! (spec.md §4.4). Grounded on `original_source/src/IAudioObject.h`'s
//! `AudioJoin`/`GetInputSamples`, which fetches every input concurrently via
//! `std::future` and then reduces pairwise; here `rayon` stands in for the
//! futures pool (teacher's `Cargo.toml` already carries it for exactly this
//! kind of per-buffer parallel fan-in, see `src/mix.rs`).

use crate::node::{AudioNode, NodeId};
use crate::sample::{Sample, SampleBuf};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum JoinKind {
    /// Elementwise sum of every input.
    Sum,
    /// Elementwise product of every input, folded in index order.
    RingMod,
    /// Mixes the full ring-modulated path against the full summed path,
    /// weighted by `balance in [-1, 1]`: `rm_amp = 0.5 - 0.5*balance`,
    /// `sum_amp = 0.5 + 0.5*balance` (spec.md §4.4). `balance = -1` is pure
    /// ring mod, `balance = 1` is a plain sum.
    RingModSum(f32),
}

struct JoinInput {
    id: NodeId,
    node: Arc<Mutex<dyn AudioNode>>,
    own_delay: usize,
    /// Per-channel compensation delay line, length `max_delay - own_delay`.
    delay_lines: Vec<VecDeque<Sample>>,
    scratch: SampleBuf,
}

/// Sums or ring-modulates an arbitrary number of inputs, aligning them so
/// that a sample emitted at the same logical instant by every input
/// (regardless of each input's own `sample_delay`) lands at the same output
/// index (spec.md §4.4's delay-compensation invariant).
pub struct JoinNode {
    id: NodeId,
    kind: JoinKind,
    channels: usize,
    inputs: Vec<JoinInput>,
    max_delay: usize,
}

impl JoinNode {
    pub fn new(id: NodeId, channels: usize, kind: JoinKind) -> Self {
        JoinNode {
            id,
            kind,
            channels,
            inputs: Vec::new(),
            max_delay: 0,
        }
    }

    pub fn kind(&self) -> JoinKind {
        self.kind
    }

    /// Wires in a new input and fires its `on_added_as_input` hook. Inputs
    /// are kept in the order they were added; reduction walks that same
    /// order, which is what makes the result deterministic regardless of
    /// how `rayon` schedules the concurrent fetch.
    pub fn add_input(&mut self, input_id: NodeId, node: Arc<Mutex<dyn AudioNode>>) {
        let own_delay = node.lock().unwrap().sample_delay();
        node.lock().unwrap().on_added_as_input(self.id);
        self.inputs.push(JoinInput {
            id: input_id,
            node,
            own_delay,
            delay_lines: Vec::new(),
            scratch: SampleBuf::new(self.channels, 0),
        });
        self.recompute_delay_lines();
    }

    pub fn remove_input(&mut self, input_id: NodeId) {
        if let Some(pos) = self.inputs.iter().position(|i| i.id == input_id) {
            let removed = self.inputs.remove(pos);
            removed.node.lock().unwrap().on_removed_from_input(self.id);
            self.recompute_delay_lines();
        }
    }

    fn recompute_delay_lines(&mut self) {
        self.max_delay = self.inputs.iter().map(|i| i.own_delay).max().unwrap_or(0);
        for input in &mut self.inputs {
            let comp = self.max_delay - input.own_delay;
            input.delay_lines = (0..self.channels)
                .map(|_| VecDeque::from(vec![0.0 as Sample; comp]))
                .collect();
        }
    }

    fn reduce_into(&self, fetched: &[SampleBuf], out: &mut [&mut [Sample]]) {
        let nframes = out.first().map(|b| b.len()).unwrap_or(0);
        match self.kind {
            JoinKind::Sum => {
                for ch in 0..self.channels {
                    for i in 0..nframes {
                        out[ch][i] = fetched.iter().map(|b| b.channel(ch)[i]).sum();
                    }
                }
            }
            JoinKind::RingMod => {
                for ch in 0..self.channels {
                    for i in 0..nframes {
                        out[ch][i] = fetched.iter().fold(1.0, |acc, b| acc * b.channel(ch)[i]);
                    }
                }
            }
            JoinKind::RingModSum(balance) => {
                let rm_amp = 0.5 - 0.5 * balance as f64;
                let sum_amp = 0.5 + 0.5 * balance as f64;
                for ch in 0..self.channels {
                    for i in 0..nframes {
                        let rm = fetched.iter().fold(1.0, |acc, b| acc * b.channel(ch)[i]);
                        let sum: Sample = fetched.iter().map(|b| b.channel(ch)[i]).sum();
                        out[ch][i] = (rm_amp * rm as f64 + sum_amp * sum as f64) as Sample;
                    }
                }
            }
        }
    }
}

impl AudioNode for JoinNode {
    fn get_samples(&mut self, bufs: &mut [&mut [Sample]], sample_rate: u32, _requester: Option<NodeId>) {
        if self.inputs.is_empty() {
            return;
        }
        let nframes = bufs.first().map(|b| b.len()).unwrap_or(0);
        let my_id = self.id;

        for input in &mut self.inputs {
            input.scratch.reinitialize(self.channels, nframes);
        }

        // Fetch every input concurrently; each input owns disjoint scratch
        // storage so this is a plain data-parallel map, no shared mutable
        // state to race on.
        rayon::scope(|scope| {
            for input in &mut self.inputs {
                let bufs_ptr = &mut input.scratch;
                let node = &input.node;
                scope.spawn(move |_| {
                    let mut slices = bufs_ptr.as_mut_slices();
                    node.lock().unwrap().get_samples(&mut slices, sample_rate, Some(my_id));
                });
            }
        });

        let mut aligned: Vec<SampleBuf> = Vec::with_capacity(self.inputs.len());
        for input in &mut self.inputs {
            let mut out = SampleBuf::new(self.channels, nframes);
            for ch in 0..self.channels {
                let dl = &mut input.delay_lines[ch];
                dl.extend(input.scratch.channel(ch).iter().copied());
                let out_ch = out.channel_mut(ch);
                for slot in out_ch.iter_mut() {
                    *slot = dl.pop_front().unwrap_or(0.0);
                }
            }
            aligned.push(out);
        }

        self.reduce_into(&aligned, bufs);
    }

    fn num_channels(&self) -> usize {
        self.channels
    }

    fn sample_delay(&self) -> usize {
        self.max_delay
    }
}
