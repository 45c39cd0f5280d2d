//! Feedback Delay Network reverb (spec.md §4.11): a short diffuser chain
//! feeding an echo tank whose feedback matrix is a random orthonormal
//! basis, Hadamard-spread for even energy distribution across lines.
//!
//! Grounded on `original_source/src/FDNVerb.h`'s `GenRandomOrthonormalBasis`
//! (Gram-Schmidt over Gaussian vectors) and its Hadamard-matrix feedback
//! topology.

pub mod fdn;

pub use fdn::FdnReverb;
