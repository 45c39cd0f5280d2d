//! WAV container writer (spec.md §6): 16-bit PCM, triangular-PDF dithered,
//! chunk-sized pulls from the root of an already-`interpret`ed graph.
//!
//! Grounded on the teacher's `src/render.rs::samples_f32` for the
//! `hound::WavWriter` setup, generalized from its mono float-sample dump to
//! multichannel 16-bit PCM with dither, which `samples_f32` never needed
//! since the teacher normalized and wrote float WAVs.

use crate::error::Result;
use crate::graph::Graph;
use crate::node::NodeId;
use crate::sample::Sample;
use rand::Rng;

/// `16384 / size_of::<Sample>()`: the pull loop's chunk size in frames, per
/// spec.md §6's "rounded up to the nearest sample-buffer chunk (16384
/// bytes)".
pub const CHUNK_FRAMES: usize = 16384 / std::mem::size_of::<Sample>();

/// Total frame count for a song of `length_seconds`: `ceil(length*sr) + sr`
/// of tail room for decaying reverbs/ramps, rounded up to a whole chunk.
pub fn total_frames(length_seconds: f64, sample_rate: u32) -> usize {
    let body = (length_seconds * sample_rate as f64).ceil() as usize + sample_rate as usize;
    let chunks = (body + CHUNK_FRAMES - 1) / CHUNK_FRAMES;
    chunks * CHUNK_FRAMES
}

/// Renders `nframes` samples from `root` (in `CHUNK_FRAMES`-sized pulls) and
/// writes them to `path` as a 16-bit PCM WAV at `sample_rate`.
pub fn write_wav(
    path: &str,
    graph: &Graph,
    root: NodeId,
    num_channels: usize,
    nframes: usize,
    sample_rate: u32,
) -> Result<()> {
    let spec = hound::WavSpec {
        channels: num_channels as u16,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let mut rng = rand::thread_rng();

    let mut remaining = nframes;
    while remaining > 0 {
        let this_chunk = remaining.min(CHUNK_FRAMES);
        let bufs = graph.pull(root, num_channels, this_chunk, sample_rate);
        for frame in 0..this_chunk {
            for ch in &bufs {
                let dither = (rng.gen::<f32>() - rng.gen::<f32>()) / i16::MAX as f32;
                let sample = (ch[frame] + dither).clamp(-1.0, 1.0);
                writer.write_sample((sample * i16::MAX as f32).round() as i16)?;
            }
        }
        remaining -= this_chunk;
    }

    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::test_support::Constant;
    use std::sync::{Arc, Mutex};

    #[test]
    fn total_frames_rounds_up_to_a_whole_chunk() {
        let n = total_frames(0.01, 44_100);
        assert_eq!(n % CHUNK_FRAMES, 0);
        assert!(n >= 44_100);
    }

    #[test]
    fn writes_a_readable_wav_file() {
        let mut graph = Graph::new();
        let root = graph.insert(Arc::new(Mutex::new(Constant::new(2, 0.25))));
        let path = std::env::temp_dir().join("scorewav_test_writes_a_readable_wav_file.wav");
        let path_str = path.to_str().unwrap().to_string();
        write_wav(&path_str, &graph, root, 2, CHUNK_FRAMES, 44_100).unwrap();

        let mut reader = hound::WavReader::open(&path_str).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().bits_per_sample, 16);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), CHUNK_FRAMES * 2);
        assert!(samples.iter().all(|s| (*s as i32 - 8192).abs() < 200));

        std::fs::remove_file(&path_str).ok();
    }
}
