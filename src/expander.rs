//! Byte expansion: the base alphabet merges operate over.

use crate::types::Token;

/// Converts a chunk into its UTF-8 bytes, one base token per byte.
#[inline]
pub(crate) fn expand(chunk: &str) -> Vec<Token> {
    chunk.bytes().map(Token::from).collect()
}
