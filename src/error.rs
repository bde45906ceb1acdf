//! Error types for segmentation, training, encoding, decoding and model files.

use std::{io, path::PathBuf, string::FromUtf8Error};

use indicatif::style::TemplateError;
use thiserror::Error;

use crate::types::Token;

/// Errors raised while cutting text into chunks.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// No pattern alternative matched at `offset`; the pattern is not exhaustive.
    #[error("no pattern alternative matches input at byte offset {offset}")]
    SegmentationImpossible { offset: usize },
    /// Regex engine failed during matching (e.g. backtracking limit exceeded).
    #[error("regex match failed: {0}")]
    RegexMatch(String),
}

/// Errors that can occur during text encoding.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error(transparent)]
    Segment(#[from] SegmentError),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(TemplateError),
}

/// Errors that can occur during token decoding.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Token ID not found in vocabulary.
    #[error("unknown token id: {0}")]
    UnknownToken(Token),
    /// Decoded bytes are not valid UTF-8.
    #[error("invalid UTF-8 in decoded bytes: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(TemplateError),
}

/// Errors in an ordered merge list.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// A rule refers to an ID that does not exist yet at its rank.
    #[error("merge {rank} ({left}, {right}) refers to a token not defined before id {new_id}")]
    ForwardReference {
        rank: usize,
        left: Token,
        right: Token,
        new_id: Token,
    },
    /// The same pair was learned twice.
    #[error("merge {rank} repeats pair ({left}, {right})")]
    DuplicatePair { rank: usize, left: Token, right: Token },
}

impl MergeError {
    /// Position of the offending rule in the merge list.
    pub fn rank(&self) -> usize {
        match self {
            Self::ForwardReference { rank, .. } | Self::DuplicatePair { rank, .. } => *rank,
        }
    }
}

/// Errors that can occur when processing special tokens.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SpecialTokenError {
    /// Token ID already exists in vocabulary.
    #[error("token already exists: {0}")]
    IllegalToken(Token),
    /// Two special strings were given the same ID.
    #[error("special token id {0} assigned twice")]
    DuplicateToken(Token),
    /// Special strings must be non-empty and fit on a single line.
    #[error("invalid special token string: {0:?}")]
    InvalidName(String),
}

/// Errors that can occur when initializing a tokenizer.
#[derive(Debug, Error)]
pub enum TokenizerInitError {
    /// The regex pattern failed to compile.
    #[error("invalid split pattern: {0}")]
    InvalidPattern(#[from] fancy_regex::Error),
    /// The merge list is not a valid rank-ordered rule set.
    #[error(transparent)]
    InvalidMerge(#[from] MergeError),
    /// A special token ID collides with an existing vocabulary entry.
    #[error(transparent)]
    InvalidSpecialToken(#[from] SpecialTokenError),
}

/// Errors that can occur during training.
#[derive(Debug, Error)]
pub enum TrainError {
    /// The target vocabulary leaves no room for merges.
    #[error("vocab_size must exceed 256, got {0}")]
    VocabTooSmall(usize),
    #[error(transparent)]
    Segment(#[from] SegmentError),
    #[error(transparent)]
    Init(#[from] TokenizerInitError),
    /// Progress bar template string was invalid.
    #[error("template parsing failed: {0}")]
    ProgressBarSetup(TemplateError),
}

/// A model file that does not follow the expected layout.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("model file not found: {0}")]
    MissingFile(PathBuf),
    #[error("model file is empty")]
    MissingHeader,
    #[error("unsupported model header: {0:?}")]
    UnsupportedVersion(String),
    #[error("model file has no pattern line")]
    MissingPattern,
    #[error("line {line}: {message}")]
    Malformed { line: usize, message: String },
    #[error("model file truncated: expected {expected} special token lines, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("line {line}: {source}")]
    InvalidMerge { line: usize, source: MergeError },
    #[error("stored pattern does not compile: {0}")]
    InvalidPattern(fancy_regex::Error),
    /// The pattern spans several lines and cannot be written as one record.
    #[error("split pattern contains a line break and cannot be stored")]
    MultilinePattern,
    #[error(transparent)]
    InvalidSpecialToken(#[from] SpecialTokenError),
}

/// Errors from saving or loading a model.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model file i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Format(#[from] FormatError),
}
