//! Error types for score loading and rendering.
//!
//! Audio-path failures (channel mismatch, pool exhaustion, delay overflow)
//! never escape `AudioNode::get_samples` — they are logged and recovered as
//! silence (spec.md §7). Only parse/score/IO errors reach `main`.

use std::fmt;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to parse score JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid score at {path}: {rule}")]
    InvalidScore { rule: String, path: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("wav encoding error: {0}")]
    Wav(#[from] hound::Error),
}

impl RenderError {
    pub fn invalid(path: impl Into<String>, rule: impl Into<String>) -> Self {
        RenderError::InvalidScore {
            rule: rule.into(),
            path: path.into(),
        }
    }
}

/// Non-fatal audio-path faults. These are recovered locally (the node emits
/// silence and still advances its sample counter) and are only surfaced via
/// `log::warn!`, never returned to a caller across the node boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFault {
    ChannelMismatch { expected: usize, got: usize },
    AllocationFailure,
    DelayOverflow { requested: usize, available: usize },
}

impl fmt::Display for AudioFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioFault::ChannelMismatch { expected, got } => {
                write!(f, "channel mismatch: expected {expected}, got {got}")
            }
            AudioFault::AllocationFailure => write!(f, "sample buffer pool exhausted"),
            AudioFault::DelayOverflow { requested, available } => {
                write!(f, "delay line overflow: requested {requested}, had {available}")
            }
        }
    }
}
