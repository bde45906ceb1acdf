//! Model persistence.
//!
//! A model is stored as UTF-8 text, one record per line:
//!
//! ```text
//! hindi-tokenizer v1
//! <split pattern>
//! <number of special tokens N>
//! <special token string> <id>      (N lines)
//! <left id> <right id>             (one line per merge, in learning order)
//! ```
//!
//! Merged IDs are not stored; loading reassigns `256 + i` to line `i` of the
//! merge section, which reproduces the IDs the model was trained with.
//!
//! Files headed `minbpe v1` share this layout and load as well. Their
//! patterns are usually written with Python `re` escapes, which
//! [`Segmenter::new`] accepts.

use std::{
    collections::HashMap,
    fs::File,
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
};

use log::{debug, warn};

use crate::{
    error::{FormatError, ModelError, TokenizerInitError},
    segmenter::Segmenter,
    tokenizer::Tokenizer,
    types::{BASE_VOCAB_SIZE, Token},
    vocab::Vocabulary,
};

const HEADER: &str = "hindi-tokenizer v1";
const HEADER_PREFIX: &str = "hindi-tokenizer ";
/// Headers of other writers of the same layout.
const COMPATIBLE_HEADERS: &[&str] = &["minbpe v1"];

/// Writes `model` to `path`, replacing any existing file.
pub(crate) fn save(model: &Tokenizer, path: &Path) -> Result<(), ModelError> {
    let pattern = model.pattern();
    if pattern.contains(['\n', '\r']) {
        return Err(FormatError::MultilinePattern.into());
    }

    let mut writer = BufWriter::new(File::create(path)?);

    writeln!(writer, "{HEADER}")?;
    writeln!(writer, "{pattern}")?;

    let mut special: Vec<(&Token, &String)> = model.special_tokens().iter().collect();
    special.sort_unstable_by_key(|(id, _)| **id);
    writeln!(writer, "{}", special.len())?;
    for (id, name) in special {
        writeln!(writer, "{name} {id}")?;
    }

    for pair in model.merges() {
        writeln!(writer, "{} {}", pair.0, pair.1)?;
    }
    writer.flush()?;

    debug!(
        "saved model with {} merges to {}",
        model.merges().len(),
        path.display()
    );
    Ok(())
}

/// Reads a model written by [`save`].
pub(crate) fn load(path: &Path) -> Result<Tokenizer, ModelError> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(FormatError::MissingFile(path.to_path_buf()).into());
        }
        Err(e) => return Err(e.into()),
    };

    let mut lines = BufReader::new(file).lines().enumerate();
    let mut next_line = || -> Result<Option<(usize, String)>, io::Error> {
        lines
            .next()
            .map(|(i, line)| line.map(|l| (i + 1, l.trim_end_matches('\r').to_owned())))
            .transpose()
    };

    let (_, header) = next_line()?.ok_or(FormatError::MissingHeader)?;
    if COMPATIBLE_HEADERS.contains(&header.as_str()) {
        debug!("reading {header:?} model from {}", path.display());
    } else if header != HEADER {
        if header.starts_with(HEADER_PREFIX) {
            return Err(FormatError::UnsupportedVersion(header).into());
        }
        return Err(FormatError::Malformed {
            line: 1,
            message: format!("expected header {HEADER:?}, found {header:?}"),
        }
        .into());
    }

    let (_, pattern) = next_line()?.ok_or(FormatError::MissingPattern)?;
    let segmenter = Segmenter::new(&pattern).map_err(FormatError::InvalidPattern)?;

    let (count_line, count) = next_line()?.ok_or(FormatError::Truncated {
        expected: 1,
        found: 0,
    })?;
    let expected: usize = count.trim().parse().map_err(|_| FormatError::Malformed {
        line: count_line,
        message: format!("expected special token count, found {count:?}"),
    })?;

    let mut special_tokens: HashMap<String, Token> = HashMap::with_capacity(expected);
    for found in 0..expected {
        let (line, record) = next_line()?.ok_or(FormatError::Truncated { expected, found })?;
        let (name, id) = parse_special(&record).ok_or_else(|| FormatError::Malformed {
            line,
            message: format!("expected `<string> <id>`, found {record:?}"),
        })?;
        if special_tokens.insert(name.to_owned(), id).is_some() {
            return Err(FormatError::Malformed {
                line,
                message: format!("special token {name:?} listed twice"),
            }
            .into());
        }
    }

    let first_merge_line = count_line + expected + 1;
    let mut merges: Vec<(Token, Token)> = Vec::new();
    let mut blank_lines = 0;
    while let Some((line, record)) = next_line()? {
        if record.trim().is_empty() {
            blank_lines += 1;
            continue;
        }
        if blank_lines > 0 {
            return Err(FormatError::Malformed {
                line,
                message: "merge record after a blank line".to_owned(),
            }
            .into());
        }
        let pair = parse_merge(&record).ok_or_else(|| FormatError::Malformed {
            line,
            message: format!("expected `<left id> <right id>`, found {record:?}"),
        })?;
        merges.push(pair);
    }
    if blank_lines > 0 {
        warn!(
            "ignored {blank_lines} trailing blank line(s) in {}",
            path.display()
        );
    }

    let vocab = Vocabulary::from_merges(merges).map_err(|source| FormatError::InvalidMerge {
        line: first_merge_line + source.rank(),
        source,
    })?;

    let model = Tokenizer::from_parts(segmenter, vocab);
    let model = if special_tokens.is_empty() {
        model
    } else {
        model.with_special_tokens(special_tokens).map_err(|e| match e {
            TokenizerInitError::InvalidSpecialToken(e) => FormatError::InvalidSpecialToken(e),
            TokenizerInitError::InvalidPattern(e) => FormatError::InvalidPattern(e),
            TokenizerInitError::InvalidMerge(source) => FormatError::InvalidMerge {
                line: first_merge_line,
                source,
            },
        })?
    };

    debug!(
        "loaded model with {} merges and {} special tokens from {}",
        model.merges().len(),
        model.special_tokens().len(),
        path.display()
    );
    Ok(model)
}

/// Writes a human-readable listing of every token to `path`.
///
/// Base tokens appear as `[piece] id`, merged tokens as
/// `[left][right] -> [piece] id`.
pub(crate) fn save_vocab(model: &Tokenizer, path: &Path) -> Result<(), ModelError> {
    let mut writer = BufWriter::new(File::create(path)?);

    for id in 0..BASE_VOCAB_SIZE {
        let piece = model.token_bytes(id).map(render_piece).unwrap_or_default();
        writeln!(writer, "[{piece}] {id}")?;
    }

    for (rank, pair) in model.merges().iter().enumerate() {
        let id = BASE_VOCAB_SIZE + rank;
        let render = |t: Token| model.token_bytes(t).map(render_piece).unwrap_or_default();
        writeln!(
            writer,
            "[{}][{}] -> [{}] {id}",
            render(pair.0),
            render(pair.1),
            render(id)
        )?;
    }

    let mut special: Vec<(&Token, &String)> = model.special_tokens().iter().collect();
    special.sort_unstable_by_key(|(id, _)| **id);
    for (id, name) in special {
        writeln!(writer, "[{name}] {id}")?;
    }

    writer.flush()?;
    Ok(())
}

/// `<string> <id>`; the string may itself contain spaces.
fn parse_special(record: &str) -> Option<(&str, Token)> {
    let (name, id) = record.rsplit_once(' ')?;
    if name.is_empty() {
        return None;
    }
    Some((name, id.parse().ok()?))
}

fn parse_merge(record: &str) -> Option<(Token, Token)> {
    let mut parts = record.split_whitespace();
    let left = parts.next()?.parse().ok()?;
    let right = parts.next()?.parse().ok()?;
    parts.next().is_none().then_some((left, right))
}

/// Lossy UTF-8 with control characters escaped, so one token stays on one line.
fn render_piece(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .chars()
        .map(|c| {
            if c.is_control() {
                format!("\\u{{{:04x}}}", u32::from(c))
            } else {
                c.to_string()
            }
        })
        .collect()
}
