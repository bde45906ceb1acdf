//! Pre-tokenization: cutting text into chunks before byte pair merging.
//!
//! Merges never cross a chunk boundary, which keeps whitespace, punctuation,
//! scripts and digit runs from fusing into one another. Chunks are produced
//! lazily and always tile the input: a gap between two matches is reported
//! as [`SegmentError::SegmentationImpossible`] instead of being skipped.
//!
//! Patterns run on the linear-time `regex` engine whenever they can. The
//! usual `\s+(?!\S)|\s+` whitespace tail is matched as one group there and
//! its lookahead is applied to the match afterwards. Anything else that needs
//! lookaround or backreferences falls back to `fancy_regex`.

use std::borrow::Cow;

use fancy_regex::Matches;
use log::debug;

use crate::error::SegmentError;

/// Default split pattern for Hindi mixed with Latin text, digits and punctuation.
///
/// Alternatives are tried in order and the first one that matches wins. The
/// trailing `\S` makes the pattern exhaustive, so every input segments.
pub const HINDI_PATTERN: &str = r#"(?i:[sdmt]|ll|ve|re)|\s?[\x{0900}-\x{0963}\x{097A}-\x{097F}]+|[\x{0966}-\x{096F}]{1,3}|[\d]{1,3}|\s?[a-zA-Z]+|[।.,!?;:"'(){}\[\]-\x{0964}\x{0965}]|[^\s\w\x{0900}-\x{097F}]|\s*[\r\n]|\s+(?!\S)|\s+|\S"#;

/// Whitespace run that gives back its last character when a word follows.
const LOOKAHEAD_SPACE: &str = r"\s+(?!\S)";
/// Group standing in for `\s+(?!\S)|\s+` on the linear engine.
const SPACE_GROUP: &str = "space_run";

/// Regex engine a pattern was compiled for.
#[derive(Debug, Clone)]
enum Engine {
    /// `regex` crate; `trims_space` is set when [`SPACE_GROUP`] is present.
    Linear {
        regex: regex::Regex,
        trims_space: bool,
    },
    /// `fancy_regex`, for patterns the linear engine cannot express.
    Backtracking(fancy_regex::Regex),
}

/// Compiled split pattern.
#[derive(Debug, Clone)]
pub struct Segmenter {
    /// Pattern as given by the caller; this is what gets persisted.
    source: String,
    engine: Engine,
}

impl Segmenter {
    /// Compiles `pattern`, accepting Python `re` style escapes as well.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error if the pattern is invalid.
    pub fn new(pattern: &str) -> Result<Self, fancy_regex::Error> {
        let translated = translate_python_syntax(pattern);
        let (linear, trims_space) = match without_space_lookahead(&translated) {
            Some(rewritten) => (Cow::Owned(rewritten), true),
            None => (Cow::Borrowed(&*translated), false),
        };

        let engine = match regex::Regex::new(&linear) {
            Ok(regex) => Engine::Linear { regex, trims_space },
            Err(e) => {
                debug!("split pattern needs the backtracking engine: {e}");
                Engine::Backtracking(fancy_regex::Regex::new(&translated)?)
            }
        };
        Ok(Self {
            source: pattern.to_owned(),
            engine,
        })
    }

    /// The pattern string this segmenter was built from.
    pub fn pattern(&self) -> &str {
        &self.source
    }

    /// Lazily splits `text` into chunks.
    ///
    /// Calling this again on the same text restarts from the beginning.
    pub fn chunks<'r, 't>(&'r self, text: &'t str) -> Chunks<'r, 't> {
        let source = match &self.engine {
            Engine::Linear { regex, trims_space } => Source::Linear {
                regex,
                trims_space: *trims_space,
            },
            Engine::Backtracking(regex) => Source::Backtracking(regex.find_iter(text)),
        };
        Chunks {
            source,
            text,
            pos: 0,
            done: false,
        }
    }

    /// Collects all chunks of `text`.
    ///
    /// # Errors
    ///
    /// Fails if the pattern leaves part of the text unmatched or the regex
    /// engine gives up.
    pub fn split<'t>(&self, text: &'t str) -> Result<Vec<&'t str>, SegmentError> {
        self.chunks(text).collect()
    }

    #[cfg(test)]
    fn is_linear(&self) -> bool {
        matches!(self.engine, Engine::Linear { .. })
    }
}

impl Default for Segmenter {
    // The built-in pattern is a compile-time constant covered by tests.
    #[allow(clippy::expect_used)]
    fn default() -> Self {
        Self::new(HINDI_PATTERN).expect("built-in pattern compiles")
    }
}

enum Source<'r, 't> {
    Linear {
        regex: &'r regex::Regex,
        trims_space: bool,
    },
    Backtracking(Matches<'r, 't>),
}

/// Iterator over the chunks of one text.
pub struct Chunks<'r, 't> {
    source: Source<'r, 't>,
    text: &'t str,
    /// End of the last chunk handed out.
    pos: usize,
    done: bool,
}

impl<'t> Chunks<'_, 't> {
    fn gap(&mut self) -> Option<Result<&'t str, SegmentError>> {
        self.done = true;
        Some(Err(SegmentError::SegmentationImpossible { offset: self.pos }))
    }

    fn emit(&mut self, end: usize) -> Option<Result<&'t str, SegmentError>> {
        let chunk = &self.text[self.pos..end];
        self.pos = end;
        Some(Ok(chunk))
    }

    fn next_linear(
        &mut self,
        regex: &regex::Regex,
        trims_space: bool,
    ) -> Option<Result<&'t str, SegmentError>> {
        if self.pos == self.text.len() {
            self.done = true;
            return None;
        }

        if !trims_space {
            return match regex.find_at(self.text, self.pos) {
                Some(m) if m.start() == self.pos && m.end() > m.start() => self.emit(m.end()),
                _ => self.gap(),
            };
        }

        let Some(caps) = regex.captures_at(self.text, self.pos) else {
            return self.gap();
        };
        let Some(m) = caps.get(0) else {
            return self.gap();
        };
        if m.start() != self.pos || m.end() == m.start() {
            return self.gap();
        }
        let end = if caps.name(SPACE_GROUP).is_some() {
            space_run_end(self.text, m.start(), m.end())
        } else {
            m.end()
        };
        self.emit(end)
    }

    fn next_backtracking(&mut self) -> Option<Result<&'t str, SegmentError>> {
        let Source::Backtracking(matches) = &mut self.source else {
            return None;
        };
        loop {
            match matches.next() {
                Some(Ok(m)) => {
                    if m.start() != self.pos {
                        return self.gap();
                    }
                    // no alternative in a sane pattern matches empty, but skip if one does
                    if m.end() == m.start() {
                        continue;
                    }
                    return self.emit(m.end());
                }
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(SegmentError::RegexMatch(e.to_string())));
                }
                None => {
                    if self.pos < self.text.len() {
                        return self.gap();
                    }
                    self.done = true;
                    return None;
                }
            }
        }
    }
}

impl<'t> Iterator for Chunks<'_, 't> {
    type Item = Result<&'t str, SegmentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.source {
            Source::Linear { regex, trims_space } => self.next_linear(regex, trims_space),
            Source::Backtracking(_) => self.next_backtracking(),
        }
    }
}

/// End of a whitespace run matched by `\s+(?!\S)|\s+`.
///
/// A run of two or more characters followed by a non-space stops one
/// character early, so the last space can lead the next word.
fn space_run_end(text: &str, start: usize, end: usize) -> usize {
    let before_word = text[end..].chars().next().is_some_and(|c| !c.is_whitespace());
    match text[start..end].char_indices().next_back() {
        Some((last, _)) if before_word && last > 0 => start + last,
        _ => end,
    }
}

/// Replaces a top-level `\s+(?!\S)|\s+` pair of alternatives with a named
/// group the linear engine accepts. `None` when the pattern has no such pair.
fn without_space_lookahead(pattern: &str) -> Option<String> {
    let alternatives = top_level_alternatives(pattern);
    let at = alternatives
        .windows(2)
        .position(|pair| pair[0] == LOOKAHEAD_SPACE && pair[1] == r"\s+")?;

    let group = format!(r"(?P<{SPACE_GROUP}>\s+)");
    let mut rewritten = alternatives[..at].to_vec();
    rewritten.push(&group);
    rewritten.extend_from_slice(&alternatives[at + 2..]);
    Some(rewritten.join("|"))
}

/// Splits `pattern` on `|` outside groups and character classes.
fn top_level_alternatives(pattern: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_class = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in pattern.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' => in_class = true,
            ']' if in_class => in_class = false,
            '(' if !in_class => depth += 1,
            ')' if !in_class => depth = depth.saturating_sub(1),
            '|' if !in_class && depth == 0 => {
                parts.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&pattern[start..]);
    parts
}

/// Rewrites Python `re` syntax the Rust regex engine does not accept.
///
/// - `\uXXXX` becomes `\x{XXXX}`
/// - an unescaped `[` inside a character class becomes `\[`
/// - `\"` and `\'` lose their backslash
///
/// Patterns already in Rust syntax come back borrowed and unchanged.
pub(crate) fn translate_python_syntax(pattern: &str) -> Cow<'_, str> {
    let needs_rewrite = pattern.contains("\\u") || pattern.contains("\\\"") || pattern.contains("\\'");
    if !needs_rewrite && !has_bare_bracket_in_class(pattern) {
        return Cow::Borrowed(pattern);
    }

    let chars: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(pattern.len() + 16);
    let mut in_class = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && i + 1 < chars.len() {
            let next = chars[i + 1];
            if next == 'u' && i + 6 <= chars.len() && chars[i + 2..i + 6].iter().all(char::is_ascii_hexdigit) {
                out.push_str("\\x{");
                out.extend(&chars[i + 2..i + 6]);
                out.push('}');
                i += 6;
                continue;
            }
            if next == '"' || next == '\'' {
                out.push(next);
            } else {
                out.push(c);
                out.push(next);
            }
            i += 2;
            continue;
        }

        match c {
            '[' if in_class => out.push_str("\\["),
            '[' => {
                in_class = true;
                out.push(c);
                // a leading `^` or `]` belongs to the class body
                if chars.get(i + 1) == Some(&'^') {
                    out.push('^');
                    i += 1;
                }
                if chars.get(i + 1) == Some(&']') {
                    out.push_str("\\]");
                    i += 1;
                }
            }
            ']' if in_class => {
                in_class = false;
                out.push(c);
            }
            _ => out.push(c),
        }
        i += 1;
    }

    Cow::Owned(out)
}

/// Whether some character class contains an unescaped `[`.
fn has_bare_bracket_in_class(pattern: &str) -> bool {
    let mut in_class = false;
    let mut escaped = false;
    for c in pattern.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '[' if in_class => return true,
            '[' => in_class = true,
            ']' => in_class = false,
            _ => {}
        }
    }
    false
}
