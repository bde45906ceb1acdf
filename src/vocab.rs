//! Vocabulary: merge ranks plus the flat token -> bytes table.

use std::collections::HashMap;

use crate::{
    error::{MergeError, SpecialTokenError},
    types::{BASE_VOCAB_SIZE, ByteSeq, MergeOrder, Token, TokenPair},
};

/// Token <-> byte sequence mapping derived from an ordered merge list.
///
/// - `table[0..256]`: base vocabulary (single bytes)
/// - `table[256..]`: merged tokens, in learning order
///
/// Special tokens live beside the table, keyed by ID.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Merge rules in learning order; rule `i` creates token `256 + i`.
    merges: Vec<TokenPair>,

    /// Maps token pairs to (merged_token, merge_order).
    ranks: HashMap<TokenPair, (Token, MergeOrder)>,

    /// Expansion of every non-special token.
    table: Vec<ByteSeq>,

    /// Special token ID -> literal string.
    special_tokens: HashMap<Token, String>,
}

impl Vocabulary {
    /// Builds the vocabulary from merge rules given in learning order.
    ///
    /// # Errors
    ///
    /// Returns [`MergeError::ForwardReference`] if a rule uses a token that is
    /// not defined before its own ID, or [`MergeError::DuplicatePair`] if a
    /// pair appears twice.
    pub fn from_merges(
        merges: impl IntoIterator<Item = (Token, Token)>,
    ) -> Result<Self, MergeError> {
        let mut table: Vec<ByteSeq> = (0..=u8::MAX).map(|b| vec![b]).collect();
        let mut ranks = HashMap::new();
        let mut rules = Vec::new();

        for (rank, (left, right)) in merges.into_iter().enumerate() {
            let pair = TokenPair(left, right);
            let new_id = BASE_VOCAB_SIZE + rank;

            let (Some(left), Some(right)) = (table.get(pair.0), table.get(pair.1)) else {
                return Err(MergeError::ForwardReference {
                    rank,
                    left: pair.0,
                    right: pair.1,
                    new_id,
                });
            };

            let mut merged = Vec::with_capacity(left.len() + right.len());
            merged.extend_from_slice(left);
            merged.extend_from_slice(right);

            if ranks.insert(pair, (new_id, rank)).is_some() {
                return Err(MergeError::DuplicatePair {
                    rank,
                    left: pair.0,
                    right: pair.1,
                });
            }
            table.push(merged);
            rules.push(pair);
        }

        Ok(Self {
            merges: rules,
            ranks,
            table,
            special_tokens: HashMap::new(),
        })
    }

    /// Installs special tokens, replacing any previously registered ones.
    ///
    /// # Errors
    ///
    /// Fails if an ID overlaps the byte/merge range, two strings share an ID,
    /// or a string is empty or spans several lines.
    pub(crate) fn set_special_tokens(
        &mut self,
        special_tokens: impl IntoIterator<Item = (String, Token)>,
    ) -> Result<(), SpecialTokenError> {
        let mut by_id = HashMap::new();
        for (name, id) in special_tokens {
            if name.is_empty() || name.contains(['\n', '\r']) {
                return Err(SpecialTokenError::InvalidName(name));
            }
            if id < self.table.len() {
                return Err(SpecialTokenError::IllegalToken(id));
            }
            if by_id.insert(id, name).is_some() {
                return Err(SpecialTokenError::DuplicateToken(id));
            }
        }
        self.special_tokens = by_id;
        Ok(())
    }

    /// Looks up the merged token and rank for a pair.
    #[inline]
    pub(crate) fn merge_for(&self, pair: TokenPair) -> Option<(Token, MergeOrder)> {
        self.ranks.get(&pair).copied()
    }

    /// Byte expansion of a token, special or not.
    #[inline]
    pub fn token_bytes(&self, token: Token) -> Option<&[u8]> {
        self.table
            .get(token)
            .map(Vec::as_slice)
            .or_else(|| self.special_tokens.get(&token).map(String::as_bytes))
    }

    /// Merge rules in learning order.
    pub fn merges(&self) -> &[TokenPair] {
        &self.merges
    }

    /// Registered special tokens, keyed by ID.
    pub fn special_tokens(&self) -> &HashMap<Token, String> {
        &self.special_tokens
    }

    /// One past the highest defined ID.
    ///
    /// Special IDs may leave gaps above the merge range; IDs in a gap are
    /// inside the range but have no expansion.
    pub fn len(&self) -> usize {
        self.special_tokens
            .keys()
            .map(|&id| id + 1)
            .fold(self.table.len(), usize::max)
    }
}
