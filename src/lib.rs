//! Regex-guided byte pair encoding for Hindi text.
//!
//! Text is cut into chunks by a script-aware split pattern, every chunk is
//! expanded to its UTF-8 bytes, and learned merge rules are applied within
//! each chunk. Decoding concatenates the byte expansion of every token, so
//! `decode(encode(s)) == s` for any string.
//!
//! ```no_run
//! use hindi_tokenizer::{TrainerConfig, Tokenizer};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let corpus = ["भारत एक विशाल देश है।", "भारत की राजधानी नई दिल्ली है।"];
//! let tokenizer = Tokenizer::train(&corpus, &TrainerConfig::new(300))?;
//! let ids = tokenizer.encode("भारत देश")?;
//! assert_eq!(tokenizer.decode(&ids)?, "भारत देश");
//! tokenizer.save("hindi.model")?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]

use std::path::Path;

mod decoder;
mod encoder;
pub mod error;
mod expander;
mod progress;
mod segmenter;
mod store;
mod tokenizer;
mod trainer;
mod types;
mod vocab;

#[cfg(feature = "python")]
mod python;

pub use error::{
    DecodeError, EncodeError, FormatError, MergeError, ModelError, SegmentError,
    SpecialTokenError, TokenizerInitError, TrainError,
};
pub use segmenter::{Chunks, HINDI_PATTERN, Segmenter};
pub use tokenizer::Tokenizer;
pub use trainer::TrainerConfig;
pub use types::{BASE_VOCAB_SIZE, Token, TokenPair};

/// Trains a tokenizer with the built-in Hindi pattern and default settings.
///
/// # Errors
///
/// Returns [`TrainError::VocabTooSmall`] when `vocab_size <= 256`.
pub fn train<S>(corpus: &[S], vocab_size: usize) -> Result<Tokenizer, TrainError>
where
    S: AsRef<str> + Sync,
{
    Tokenizer::train(corpus, &TrainerConfig::new(vocab_size))
}

/// Encodes `text` with `model`.
///
/// # Errors
///
/// Fails only if the model's pattern leaves part of `text` unmatched.
pub fn encode(model: &Tokenizer, text: &str) -> Result<Vec<Token>, EncodeError> {
    model.encode(text)
}

/// Decodes `ids` with `model`.
///
/// # Errors
///
/// Fails on an ID outside the vocabulary or on bytes that are not UTF-8.
pub fn decode(model: &Tokenizer, ids: &[Token]) -> Result<String, DecodeError> {
    model.decode(ids)
}

/// Writes `model` to `path`.
///
/// # Errors
///
/// Returns [`ModelError::Io`] on filesystem failure.
pub fn save(model: &Tokenizer, path: impl AsRef<Path>) -> Result<(), ModelError> {
    model.save(path)
}

/// Reads a model written by [`save`].
///
/// # Errors
///
/// Returns [`ModelError::Format`] when the file is absent, truncated or
/// structurally invalid, and [`ModelError::Io`] on other filesystem failures.
pub fn load(path: impl AsRef<Path>) -> Result<Tokenizer, ModelError> {
    Tokenizer::load(path)
}
