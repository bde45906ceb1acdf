//! Type aliases and shared types for training, encoding and decoding.

/// Represents a token identifier in the vocabulary.
///
/// IDs `0..=255` are the raw byte values. Learned merges are numbered
/// sequentially from 256; special tokens sit above the merge range.
pub type Token = usize;

/// Number of base tokens, one per byte value.
pub const BASE_VOCAB_SIZE: usize = 256;

/// Position of a token in the training arena.
pub(crate) type TextIdx = usize;

/// Weighted frequency count for token pairs during training.
pub(crate) type TokenFreq = usize;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (0 = first merge, 1 = second merge).
pub(crate) type MergeOrder = usize;

/// A sequence of raw bytes.
pub(crate) type ByteSeq = Vec<u8>;

/// A pair of adjacent tokens.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TokenPair(pub Token, pub Token);
