//! Pooled sample storage: the `Sample` value and the channel-major
//! `SampleBuf`, plus a small free-list pool standing in for the bespoke
//! slab allocator spec.md places out of scope (§9 "Global allocator").

use crate::error::AudioFault;
use std::sync::Mutex;

/// A single audio sample. Nominal range is `[-1.0, 1.0]`; values outside
/// that range are valid during processing and only clip at the final
/// float -> int16 conversion (see `crate::wav`).
pub type Sample = f32;

/// A 2-D buffer, channel-major: `channels[ch][frame]`.
#[derive(Clone, Debug, Default)]
pub struct SampleBuf {
    channels: Vec<Vec<Sample>>,
    frames: usize,
}

impl SampleBuf {
    pub fn new(num_channels: usize, frames: usize) -> Self {
        SampleBuf {
            channels: vec![vec![0.0; frames]; num_channels],
            frames,
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    /// Re-initialise to the given dimensions. Zeroes content only when the
    /// dimensions actually change, matching the "optionally zeroes" lazy
    /// reinitialisation invariant in spec.md §3.
    pub fn reinitialize(&mut self, num_channels: usize, frames: usize) {
        if self.channels.len() != num_channels || self.frames != frames {
            self.channels = vec![vec![0.0; frames]; num_channels];
            self.frames = frames;
        } else {
            for ch in &mut self.channels {
                ch.iter_mut().for_each(|s| *s = 0.0);
            }
        }
    }

    pub fn channel(&self, ch: usize) -> &[Sample] {
        &self.channels[ch]
    }

    pub fn channel_mut(&mut self, ch: usize) -> &mut [Sample] {
        &mut self.channels[ch]
    }

    pub fn channels_mut(&mut self) -> &mut [Vec<Sample>] {
        &mut self.channels
    }

    pub fn channels(&self) -> &[Vec<Sample>] {
        &self.channels
    }

    pub fn fill_silence(&mut self) {
        for ch in &mut self.channels {
            ch.iter_mut().for_each(|s| *s = 0.0);
        }
    }

    /// View as a vector of mutable slice references, the shape
    /// `AudioNode::get_samples` writes into.
    pub fn as_mut_slices(&mut self) -> Vec<&mut [Sample]> {
        self.channels.iter_mut().map(|c| c.as_mut_slice()).collect()
    }

    pub fn as_slices(&self) -> Vec<&[Sample]> {
        self.channels.iter().map(|c| c.as_slice()).collect()
    }
}

/// Free-list pool of `SampleBuf`s keyed loosely by shape. Acquiring a buffer
/// that doesn't match the pool's held shape just resizes one in place —
/// the pool exists to avoid repeated heap churn in the pull loop, not to
/// enforce a fixed block size the way the original's slab allocator did.
#[derive(Default)]
pub struct SampleBufPool {
    free: Mutex<Vec<SampleBuf>>,
    cap: usize,
}

impl SampleBufPool {
    pub fn new(cap: usize) -> Self {
        SampleBufPool {
            free: Mutex::new(Vec::new()),
            cap,
        }
    }

    pub fn acquire(&self, num_channels: usize, frames: usize) -> Result<SampleBuf, AudioFault> {
        let mut free = self.free.lock().unwrap();
        if let Some(mut buf) = free.pop() {
            buf.reinitialize(num_channels, frames);
            Ok(buf)
        } else {
            Ok(SampleBuf::new(num_channels, frames))
        }
    }

    pub fn release(&self, buf: SampleBuf) {
        let mut free = self.free.lock().unwrap();
        if free.len() < self.cap {
            free.push(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reinitialize_preserves_shape_and_zeroes() {
        let mut buf = SampleBuf::new(2, 4);
        buf.channel_mut(0)[0] = 1.0;
        buf.reinitialize(2, 4);
        assert_eq!(buf.channel(0)[0], 0.0);
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.frames(), 4);
    }

    #[test]
    fn reinitialize_with_new_shape_reallocates() {
        let mut buf = SampleBuf::new(1, 4);
        buf.reinitialize(2, 8);
        assert_eq!(buf.num_channels(), 2);
        assert_eq!(buf.frames(), 8);
    }

    #[test]
    fn pool_round_trips_a_buffer() {
        let pool = SampleBufPool::new(4);
        let buf = pool.acquire(2, 16).unwrap();
        assert_eq!(buf.num_channels(), 2);
        pool.release(buf);
        let buf2 = pool.acquire(2, 16).unwrap();
        assert_eq!(buf2.frames(), 16);
    }
}
