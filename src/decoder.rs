//! Token IDs back to bytes and text.

use crate::{error::DecodeError, types::{ByteSeq, Token}, vocab::Vocabulary};

/// Concatenates the byte expansion of every token, in input order.
///
/// # Errors
///
/// Returns [`DecodeError::UnknownToken`] with the first ID that is neither a
/// byte, a merge nor a registered special token.
pub(crate) fn decode_bytes(vocab: &Vocabulary, tokens: &[Token]) -> Result<ByteSeq, DecodeError> {
    let mut result = Vec::with_capacity(tokens.len() * 2);
    for &token in tokens {
        let bytes = vocab
            .token_bytes(token)
            .ok_or(DecodeError::UnknownToken(token))?;
        result.extend_from_slice(bytes);
    }
    Ok(result)
}

/// Decodes tokens into a `String`.
///
/// # Errors
///
/// Fails on unknown IDs, and with [`DecodeError::InvalidUtf8`] when the
/// sequence splits a multi-byte character (e.g. a slice of an encoding cut
/// mid-character). No replacement characters are substituted.
pub(crate) fn decode(vocab: &Vocabulary, tokens: &[Token]) -> Result<String, DecodeError> {
    let bytes = decode_bytes(vocab, tokens)?;
    Ok(String::from_utf8(bytes)?)
}
