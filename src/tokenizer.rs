//! The trained model and its encoding pipeline:
//! 1. Regex pattern matching to split text into chunks.
//! 2. UTF-8 byte conversion for each chunk.
//! 3. BPE merge application on byte sequences.
//!
//! A [`Tokenizer`] is immutable once built and is `Send + Sync`, so one
//! instance can serve any number of threads. Batch variants parallelize
//! over texts via Rayon.

use std::{collections::HashMap, path::Path};

use fancy_regex::Regex;
use indicatif::ParallelProgressIterator;
use rayon::prelude::*;

use crate::{
    decoder,
    encoder::apply_merges,
    error::{DecodeError, EncodeError, ModelError, SegmentError, TokenizerInitError, TrainError},
    expander::expand,
    progress::progress_bar,
    segmenter::{HINDI_PATTERN, Segmenter},
    store,
    trainer::{TrainerConfig, learn_merges},
    types::{Token, TokenPair},
    vocab::Vocabulary,
};

/// A trained BPE model: split pattern, merge rules and special tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    segmenter: Segmenter,
    vocab: Vocabulary,
    /// Special token string -> ID, for `encode_with_special`.
    special_ids: HashMap<String, Token>,
    /// Escaped alternation of all special strings, longest first.
    special_pattern: Option<Regex>,
}

impl Tokenizer {
    /// Creates a tokenizer from a split pattern and merge rules in learning order.
    ///
    /// Rule `i` produces token `256 + i`.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidPattern`] if the regex `pattern` fails
    /// to compile, or [`TokenizerInitError::InvalidMerge`] if a rule refers to an
    /// ID not yet defined at its rank or repeats an earlier pair.
    pub fn new(
        pattern: &str,
        merges: impl IntoIterator<Item = (Token, Token)>,
    ) -> Result<Self, TokenizerInitError> {
        let segmenter = Segmenter::new(pattern)?;
        let vocab = Vocabulary::from_merges(merges)?;

        Ok(Self::from_parts(segmenter, vocab))
    }

    /// Assembles a tokenizer without special tokens from validated parts.
    pub(crate) fn from_parts(segmenter: Segmenter, vocab: Vocabulary) -> Self {
        Self {
            segmenter,
            vocab,
            special_ids: HashMap::new(),
            special_pattern: None,
        }
    }

    /// Same as [`Tokenizer::new`] with the built-in Hindi split pattern.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidMerge`] for an invalid merge list.
    pub fn with_default_pattern(
        merges: impl IntoIterator<Item = (Token, Token)>,
    ) -> Result<Self, TokenizerInitError> {
        Self::new(HINDI_PATTERN, merges)
    }

    /// Registers special tokens, replacing any already present.
    ///
    /// IDs must lie above the merge range and be unique.
    ///
    /// # Errors
    ///
    /// Returns [`TokenizerInitError::InvalidSpecialToken`] if an ID overlaps the
    /// byte/merge range or is used twice, or a string is empty or multi-line.
    pub fn with_special_tokens(
        mut self,
        special_tokens: HashMap<String, Token>,
    ) -> Result<Self, TokenizerInitError> {
        self.vocab
            .set_special_tokens(special_tokens.iter().map(|(s, &id)| (s.clone(), id)))?;

        self.special_pattern = if special_tokens.is_empty() {
            None
        } else {
            // longest first so a special string never shadows a longer one it prefixes
            let mut names: Vec<&str> = special_tokens.keys().map(String::as_str).collect();
            names.sort_unstable_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            let pattern = names
                .iter()
                .map(|s| fancy_regex::escape(s))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&pattern)?)
        };
        self.special_ids = special_tokens;

        Ok(self)
    }

    /// Trains a tokenizer with the built-in Hindi split pattern.
    ///
    /// # Errors
    ///
    /// See [`Tokenizer::train_with_pattern`].
    pub fn train<S>(corpus: &[S], config: &TrainerConfig) -> Result<Self, TrainError>
    where
        S: AsRef<str> + Sync,
    {
        Self::train_with_pattern(corpus, HINDI_PATTERN, config)
    }

    /// Trains a tokenizer on `corpus` using `pattern` for pre-tokenization.
    ///
    /// # Errors
    ///
    /// Returns [`TrainError::VocabTooSmall`] when `config.vocab_size <= 256`,
    /// [`TrainError::Init`] for an invalid pattern, or a segmentation error
    /// if the pattern does not cover some text.
    pub fn train_with_pattern<S>(
        corpus: &[S],
        pattern: &str,
        config: &TrainerConfig,
    ) -> Result<Self, TrainError>
    where
        S: AsRef<str> + Sync,
    {
        let segmenter = Segmenter::new(pattern).map_err(TokenizerInitError::from)?;
        let merges = learn_merges(&segmenter, corpus, config)?;
        let vocab = Vocabulary::from_merges(merges).map_err(TokenizerInitError::from)?;

        Ok(Self::from_parts(segmenter, vocab))
    }

    /// Reads a model written by [`Tokenizer::save`].
    ///
    /// # Errors
    ///
    /// See [`crate::load`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelError> {
        store::load(path.as_ref())
    }

    /// Writes the model to `path`, replacing any existing file.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] if the file cannot be written.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        store::save(self, path.as_ref())
    }

    /// Writes a human-readable vocabulary listing to `path`.
    ///
    /// Pieces that are not valid UTF-8 on their own are rendered lossily, so
    /// the listing is for inspection only and cannot be loaded back.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Io`] if the file cannot be written.
    pub fn save_vocab(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        store::save_vocab(self, path.as_ref())
    }

    /// Encodes text: regex split -> bytes -> BPE.
    ///
    /// Special token strings are treated as ordinary text.
    ///
    /// # Errors
    ///
    /// Returns [`EncodeError::Segment`] if the pattern leaves part of `text`
    /// unmatched or the regex engine fails.
    pub fn encode(&self, text: &str) -> Result<Vec<Token>, EncodeError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        // pre-allocate: on average, BPE compresses text by 30-40%
        let mut all_tokens = Vec::with_capacity(text.len() / 3);
        for chunk in self.segmenter.chunks(text) {
            all_tokens.extend(self.encode_chunk(chunk?));
        }

        Ok(all_tokens)
    }

    /// Encodes text, emitting registered special tokens as single IDs.
    ///
    /// The text between special tokens goes through [`Tokenizer::encode`].
    ///
    /// # Errors
    ///
    /// Same as [`Tokenizer::encode`].
    pub fn encode_with_special(&self, text: &str) -> Result<Vec<Token>, EncodeError> {
        let Some(special_pattern) = &self.special_pattern else {
            return self.encode(text);
        };

        let mut all_tokens = Vec::with_capacity(text.len() / 3);
        let mut segment_start = 0;

        for mat in special_pattern.find_iter(text) {
            let mat = mat.map_err(|e| SegmentError::RegexMatch(e.to_string()))?;
            if mat.start() > segment_start {
                all_tokens.extend(self.encode(&text[segment_start..mat.start()])?);
            }
            if let Some(&id) = self.special_ids.get(mat.as_str()) {
                all_tokens.push(id);
            }
            segment_start = mat.end();
        }
        if segment_start < text.len() {
            all_tokens.extend(self.encode(&text[segment_start..])?);
        }

        Ok(all_tokens)
    }

    /// Encodes many texts in parallel, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns the first encoding failure, or [`EncodeError::ProgressBarSetup`]
    /// if the progress bar template fails to compile.
    pub fn encode_batch<S>(&self, texts: &[S], show_progress: bool) -> Result<Vec<Vec<Token>>, EncodeError>
    where
        S: AsRef<str> + Sync,
    {
        let pb = progress_bar(texts.len() as u64, "Encoding texts", show_progress)
            .map_err(EncodeError::ProgressBarSetup)?;

        texts
            .par_iter()
            .progress_with(pb)
            .map(|text| self.encode(text.as_ref()))
            .collect()
    }

    /// Decodes token IDs back into text.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] with the first ID outside the
    /// vocabulary, or [`DecodeError::InvalidUtf8`] if the bytes are not valid
    /// UTF-8.
    pub fn decode(&self, tokens: &[Token]) -> Result<String, DecodeError> {
        decoder::decode(&self.vocab, tokens)
    }

    /// Decodes token IDs into raw bytes without UTF-8 validation.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::UnknownToken`] with the first unknown ID.
    pub fn decode_bytes(&self, tokens: &[Token]) -> Result<Vec<u8>, DecodeError> {
        decoder::decode_bytes(&self.vocab, tokens)
    }

    /// Decodes many token sequences in parallel, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns the first decoding failure, or [`DecodeError::ProgressBarSetup`]
    /// if the progress bar template fails to compile.
    pub fn decode_batch<T>(&self, token_seqs: &[T], show_progress: bool) -> Result<Vec<String>, DecodeError>
    where
        T: AsRef<[Token]> + Sync,
    {
        let pb = progress_bar(token_seqs.len() as u64, "Decoding tokens", show_progress)
            .map_err(DecodeError::ProgressBarSetup)?;

        token_seqs
            .par_iter()
            .progress_with(pb)
            .map(|tokens| self.decode(tokens.as_ref()))
            .collect()
    }

    /// Byte expansion of one token, or `None` for an unknown ID.
    pub fn token_bytes(&self, token: Token) -> Option<&[u8]> {
        self.vocab.token_bytes(token)
    }

    /// Size of the ID range: one past the highest byte, merge or special ID.
    ///
    /// Decoding any ID at or above this fails.
    pub fn vocab_size(&self) -> usize {
        self.vocab.len()
    }

    /// Merge rules in learning order; rule `i` created token `256 + i`.
    pub fn merges(&self) -> &[TokenPair] {
        self.vocab.merges()
    }

    /// The split pattern as originally given.
    pub fn pattern(&self) -> &str {
        self.segmenter.pattern()
    }

    /// Registered special tokens, keyed by ID.
    pub fn special_tokens(&self) -> &HashMap<Token, String> {
        self.vocab.special_tokens()
    }

    /// Encodes one chunk produced by the segmenter.
    #[inline]
    fn encode_chunk(&self, chunk: &str) -> Vec<Token> {
        apply_merges(&self.vocab, expand(chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SpecialTokenError;

    fn make_tokenizer(merges: Vec<(Token, Token)>, pat: &str) -> Tokenizer {
        Tokenizer::new(pat, merges).expect("pattern and merges are valid")
    }

    #[test]
    fn test_encode_no_merges() {
        let tok = make_tokenizer(vec![], r"\S+|\s+");
        let result = tok.encode("ab cd").expect("text should be encodable");
        assert_eq!(result, vec![97, 98, 32, 99, 100]);
    }

    #[test]
    fn test_encode_with_merges() {
        let tok = make_tokenizer(vec![(97, 98)], r"\S+|\s+");
        let result = tok.encode("ab cd").expect("text should be encodable");
        assert_eq!(result, vec![256, 32, 99, 100]);
    }

    #[test]
    fn test_merges_do_not_cross_chunks() {
        // (98, 32) exists but "b" and " " are separate chunks
        let tok = make_tokenizer(vec![(98, 32)], r"\S+|\s+");
        assert_eq!(tok.encode("ab c").expect("encodable"), vec![97, 98, 32, 99]);
    }

    #[test]
    fn test_encode_batch_parallel() {
        let tok = make_tokenizer(vec![(97, 98)], r"\S+");
        let results = tok
            .encode_batch(&["ab", "cd", "ab"], false)
            .expect("texts should be batch-encodable");
        assert_eq!(results, vec![vec![256], vec![99, 100], vec![256]]);
    }

    #[test]
    fn test_empty_text() {
        let tok = Tokenizer::with_default_pattern([]).expect("no merges");
        assert_eq!(tok.encode("").expect("encodable"), Vec::<Token>::new());
        assert_eq!(tok.decode(&[]).expect("decodable"), "");
    }

    #[test]
    fn test_single_byte_chunk() {
        let tok = make_tokenizer(vec![(97, 98)], r".");
        let result = tok.encode("ab").expect("text should be encodable");
        assert_eq!(result, vec![97, 98]);
    }

    #[test]
    fn test_unicode_bytes() {
        // 'न' is U+0928, encoded as [0xE0, 0xA4, 0xA8] in UTF-8
        let tok = make_tokenizer(vec![(0xE0, 0xA4), (256, 0xA8)], r"\S+");
        assert_eq!(tok.encode("न").expect("encodable"), vec![257]);
        assert_eq!(tok.token_bytes(257), Some("न".as_bytes()));
    }

    #[test]
    fn test_segmentation_gap_fails_encode() {
        let tok = make_tokenizer(vec![], r"[a-z]+");
        let result = tok.encode("ab cd");
        assert!(matches!(
            result,
            Err(EncodeError::Segment(SegmentError::SegmentationImpossible { offset: 2 }))
        ));
    }

    #[test]
    fn test_decode_batch() {
        let tok = make_tokenizer(vec![(97, 98)], r"\S+");
        let seqs = vec![vec![256], vec![99, 100]];
        let decoded = tok
            .decode_batch(&seqs, false)
            .expect("token sequences should be batch-decodable");
        assert_eq!(decoded, vec!["ab", "cd"]);
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let tok = make_tokenizer(vec![(97, 98), (256, 99)], HINDI_PATTERN);
        let original = "abc def नमस्ते।";
        let encoded = tok.encode(original).expect("text should be encodable");
        assert_eq!(tok.decode(&encoded).expect("decodable"), original);
    }

    #[test]
    fn test_decode_unknown_token_errors() {
        let tok = make_tokenizer(vec![(97, 98)], r"\S+");
        let result = tok.decode(&[97, 9999]);
        assert!(matches!(result, Err(DecodeError::UnknownToken(9999))));
    }

    #[test]
    fn test_vocab_size() {
        let tok = make_tokenizer(vec![(97, 98), (256, 99)], r"\S+");
        assert_eq!(tok.vocab_size(), 258);
    }

    #[test]
    fn test_vocab_size_covers_sparse_special_ids() {
        let special = HashMap::from([(String::from("<|end|>"), 100_000)]);
        let tok = make_tokenizer(vec![(97, 98)], HINDI_PATTERN)
            .with_special_tokens(special)
            .expect("special tokens are valid");

        assert_eq!(tok.vocab_size(), 100_001);
        assert_eq!(tok.decode(&[100_000]).expect("decodable"), "<|end|>");
        let past_end = tok.vocab_size();
        assert!(matches!(
            tok.decode(&[past_end]),
            Err(DecodeError::UnknownToken(id)) if id == past_end
        ));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let result = Tokenizer::new(r"(unclosed", []);
        assert!(matches!(result, Err(TokenizerInitError::InvalidPattern(_))));
    }

    #[test]
    fn test_special_token_id_overlap_rejected() {
        let special = HashMap::from([(String::from("<|bad|>"), 256)]);
        let result = make_tokenizer(vec![(97, 98)], r"\S+").with_special_tokens(special);
        assert!(matches!(
            result,
            Err(TokenizerInitError::InvalidSpecialToken(SpecialTokenError::IllegalToken(256)))
        ));
    }

    #[test]
    fn test_encode_with_special() {
        let special = HashMap::from([
            (String::from("<|end|>"), 1000),
            (String::from("<|end|>x"), 1001),
        ]);
        let tok = make_tokenizer(vec![(97, 98)], HINDI_PATTERN)
            .with_special_tokens(special)
            .expect("special tokens are valid");

        let ids = tok.encode_with_special("ab<|end|>xab<|end|>").expect("encodable");
        assert_eq!(ids, vec![256, 1001, 256, 1000]);
        assert_eq!(tok.decode(&ids).expect("decodable"), "ab<|end|>xab<|end|>");
    }

    #[test]
    fn test_plain_encode_ignores_special_tokens() {
        let special = HashMap::from([(String::from("<|end|>"), 1000)]);
        let tok = make_tokenizer(vec![], HINDI_PATTERN)
            .with_special_tokens(special)
            .expect("special tokens are valid");

        let ids = tok.encode("<|end|>").expect("encodable");
        assert!(!ids.contains(&1000));
        assert_eq!(tok.decode(&ids).expect("decodable"), "<|end|>");
    }

    #[test]
    fn test_train_learns_repeated_pair() {
        let corpus = ["aa"; 10];
        let tok = Tokenizer::train(&corpus, &TrainerConfig::new(257)).expect("training succeeds");
        assert_eq!(tok.merges(), &[TokenPair(97, 97)]);
        assert_eq!(tok.encode("aaaa").expect("encodable"), vec![256, 256]);
        assert_eq!(tok.decode(&[256, 256]).expect("decodable"), "aaaa");
    }

    #[test]
    fn test_tokenizer_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Tokenizer>();
    }
}
