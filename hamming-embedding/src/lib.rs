//! # Hamming Embedding
//!
//! This crate turns 128-dimensional SIFT descriptors into the two forms used when matching
//! a query image against a visual-word index:
//!
//! * [`root_sift`] converts a raw SIFT descriptor into a byte-quantized RootSIFT descriptor.
//!   Every descriptor is normalized this way before it is assigned to a visual word.
//! * [`HammingEmbedding`] projects a normalized descriptor with a shared 64×128 matrix and
//!   thresholds the result against per-word medians to produce a 64-bit [`Signature`].
//!
//! A coarse visual word only tells us that two descriptors fell in the same cell of the
//! vocabulary. The signature refines that assignment: two descriptors in the same cell whose
//! signatures are within a small Hamming distance of each other are likely to be true matches.
//! Since the thresholds are computed per word, the binary code is calibrated to the local
//! distribution of descriptors inside each cell.
//!
//! ```
//! use hamming_embedding::{root_sift, DESCRIPTOR_DIMENSIONS};
//!
//! let raw = [7u8; DESCRIPTOR_DIMENSIONS];
//! let normalized = root_sift(&raw).unwrap();
//! assert!(normalized.iter().all(|&v| v == 45));
//! ```

mod root_sift;
mod signature;

pub use root_sift::*;
pub use signature::*;

use bitarray::BitArray;

/// The dimensionality of a SIFT descriptor.
pub const DESCRIPTOR_DIMENSIONS: usize = 128;

/// The number of bits in a [`Signature`].
pub const SIGNATURE_BITS: usize = 64;

/// A byte-quantized SIFT descriptor.
pub type Descriptor = [u8; DESCRIPTOR_DIMENSIONS];

/// A 64-bit binary signature.
///
/// Bit `k` is stored in bit `k % 8` of byte `k / 8`, which is the layout of a `u64` written
/// with [`u64::to_le_bytes`].
pub type Signature = BitArray<8>;

/// Creates a [`Signature`] from the integer representation used in assignment files.
pub fn signature_from_code(code: u64) -> Signature {
    BitArray::new(code.to_le_bytes())
}

/// Retrieves the integer representation of a [`Signature`].
pub fn signature_code(signature: &Signature) -> u64 {
    u64::from_le_bytes(*signature.bytes())
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("visual word {word} is out of range for an embedding of {words} words")]
    WordOutOfRange { word: usize, words: usize },
    #[error("expected a {expected_rows}x{expected_columns} {what} but got {rows}x{columns}")]
    Dimensions {
        what: &'static str,
        expected_rows: usize,
        expected_columns: usize,
        rows: usize,
        columns: usize,
    },
}
