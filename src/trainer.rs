//! BPE training with incremental pair counts.
//!
//! Follows Algorithm 2 of "Byte Pair Encoding is Suboptimal for Language
//! Model Pretraining" (https://aclanthology.org/2023.findings-acl.38.pdf):
//! pair frequencies and positions are patched around every merged position
//! instead of being recounted each round.
//!
//! The corpus is segmented first and identical chunks are deduplicated into
//! weighted words. All words share one index-linked arena; links never cross
//! a word boundary, so neither do merges.
//!
//! Time complexity: O(N log V) vs O(NV) for naive implementation.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap, HashSet},
    ops::ControlFlow,
};

use log::{debug, info};
use rayon::prelude::*;

use crate::{
    error::{SegmentError, TrainError},
    expander::expand,
    progress::progress_bar,
    segmenter::Segmenter,
    types::{BASE_VOCAB_SIZE, TextIdx, Token, TokenFreq, TokenPair},
};

/// Training parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainerConfig {
    /// Target vocabulary size, byte tokens included. Must exceed 256.
    pub vocab_size: usize,
    /// Training stops once the best pair occurs fewer times than this.
    pub min_pair_freq: usize,
    /// Draw a progress bar while learning merges.
    pub show_progress: bool,
}

impl TrainerConfig {
    pub fn new(vocab_size: usize) -> Self {
        Self {
            vocab_size,
            min_pair_freq: 2,
            show_progress: false,
        }
    }

    pub fn min_pair_freq(mut self, min_pair_freq: usize) -> Self {
        self.min_pair_freq = min_pair_freq;
        self
    }

    pub fn show_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }
}

/// Learns up to `vocab_size - 256` merge rules from `corpus`.
///
/// Ties between equally frequent pairs go to the lexicographically smallest
/// `(left, right)` pair, so the result does not depend on corpus order or
/// hashing.
///
/// # Errors
///
/// Returns [`TrainError::VocabTooSmall`] when `vocab_size <= 256`, and
/// segmentation or progress bar failures otherwise.
pub(crate) fn learn_merges<S>(
    segmenter: &Segmenter,
    corpus: &[S],
    config: &TrainerConfig,
) -> Result<Vec<(Token, Token)>, TrainError>
where
    S: AsRef<str> + Sync,
{
    if config.vocab_size <= BASE_VOCAB_SIZE {
        return Err(TrainError::VocabTooSmall(config.vocab_size));
    }
    let num_merges = config.vocab_size - BASE_VOCAB_SIZE;

    let chunk_counts = count_chunks(segmenter, corpus)?;
    let total: TokenFreq = chunk_counts.values().sum();
    info!(
        "training {num_merges} merges over {} unique chunks ({total} total) from {} texts",
        chunk_counts.len(),
        corpus.len()
    );

    // sorted so the arena layout is reproducible run to run
    let mut words: Vec<(String, TokenFreq)> = chunk_counts.into_iter().collect();
    words.sort_unstable();
    let words: Vec<(Vec<Token>, TokenFreq)> = words
        .into_iter()
        .map(|(chunk, weight)| (expand(&chunk), weight))
        .filter(|(tokens, _)| tokens.len() > 1)
        .collect();

    let mut trainer = BPETrainer::new(&words, BASE_VOCAB_SIZE);

    let pb = progress_bar(num_merges as u64, "Learning merges", config.show_progress)
        .map_err(TrainError::ProgressBarSetup)?;
    for _ in 0..num_merges {
        if trainer.merge_step(config.min_pair_freq).is_none() {
            info!(
                "stopping early after {} merges: no pair occurs {} or more times",
                trainer.merge_history.len(),
                config.min_pair_freq
            );
            break;
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!(
        "learned {} merges, vocabulary size {}",
        trainer.merge_history.len(),
        BASE_VOCAB_SIZE + trainer.merge_history.len()
    );

    Ok(trainer.merges())
}

/// Segments every text in parallel and counts identical chunks.
fn count_chunks<S>(segmenter: &Segmenter, corpus: &[S]) -> Result<HashMap<String, TokenFreq>, SegmentError>
where
    S: AsRef<str> + Sync,
{
    corpus
        .par_iter()
        .map(|text| {
            let mut counts: HashMap<String, TokenFreq> = HashMap::new();
            for chunk in segmenter.chunks(text.as_ref()) {
                *counts.entry(chunk?.to_owned()).or_insert(0) += 1;
            }
            Ok::<_, SegmentError>(counts)
        })
        .try_reduce(HashMap::new, |mut acc, counts| {
            for (chunk, n) in counts {
                *acc.entry(chunk).or_insert(0) += n;
            }
            Ok(acc)
        })
}

/// Node in the doubly-linked training arena.
#[derive(Debug)]
struct Node {
    token: Token,
    /// How many times this node's word occurs in the corpus.
    weight: TokenFreq,
    /// Neighbours within the same word; `None` at word boundaries.
    prev_idx: Option<TextIdx>,
    next_idx: Option<TextIdx>,
}

/// Item in the max heap for tracking most frequent token pairs.
///
/// The heap may contain stale entries after merges, so frequencies
/// must be validated against `pair_freqs` before use.
#[derive(Debug, PartialEq, Eq)]
struct HeapItem {
    freq: TokenFreq,
    pair: TokenPair,
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Highest frequency first; among equal frequencies the smallest pair.
impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.freq
            .cmp(&other.freq)
            .then_with(|| other.pair.cmp(&self.pair))
    }
}

/// BPE training state.
///
/// Uses a *Vec-as-arena* linked list: nodes sit in a `Vec<Option<Node>>`
/// with stable indices, deletion is O(1) by writing `None`, and traversal
/// follows index links stored in each node.
#[derive(Debug, Default)]
struct BPETrainer {
    nodes: Vec<Option<Node>>,

    /// Max heap of (frequency, pair); may hold stale entries.
    heap: BinaryHeap<HeapItem>,

    /// pair -> arena indices of the pair's left token. Source of truth for positions.
    pair_positions: HashMap<TokenPair, HashSet<TextIdx>>,

    /// pair -> weighted frequency. Source of truth for counts.
    pair_freqs: HashMap<TokenPair, TokenFreq>,

    /// Next available merge token ID.
    next_tok: Token,

    merge_history: Vec<TokenPair>,
}

impl BPETrainer {
    /// Lays out `words` in one arena and counts their initial pairs.
    fn new(words: &[(Vec<Token>, TokenFreq)], next_tok: Token) -> Self {
        let mut nodes = Vec::with_capacity(words.iter().map(|(w, _)| w.len()).sum());

        for (tokens, weight) in words {
            let start = nodes.len();
            let n = tokens.len();
            if n == 0 {
                continue;
            }
            for (i, &token) in tokens.iter().enumerate() {
                nodes.push(Some(Node {
                    token,
                    weight: *weight,
                    prev_idx: (i > 0).then(|| start + i - 1),
                    next_idx: (i + 1 < n).then(|| start + i + 1),
                }));
            }
        }

        let mut trainer = BPETrainer {
            nodes,
            next_tok,
            ..Default::default()
        };
        trainer.build_initial_pairs();
        trainer
    }

    /// Performs one merge of the most frequent pair.
    ///
    /// Returns the merged pair, its new ID and its frequency, or `None` when
    /// no pair reaches `min_freq`.
    fn merge_step(&mut self, min_freq: TokenFreq) -> Option<(TokenPair, Token, TokenFreq)> {
        let best = self.get_max_pair()?;
        if best.freq < min_freq.max(1) {
            self.heap.push(best);
            return None;
        }
        let merge_pair = best.pair;

        // Positions are visited left to right so overlapping occurrences
        // (e.g. "aaa") merge the way a left-to-right scan would.
        let mut positions: Vec<TextIdx> = self
            .pair_positions
            .get(&merge_pair)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        positions.sort_unstable();

        let new_tok_id = self.next_tok;
        self.next_tok += 1;

        for &pos in &positions {
            let (idx1, idx2) = match self.get_merge_idxs(merge_pair, pos) {
                ControlFlow::Continue(idxs) => idxs,
                ControlFlow::Break(()) => continue,
            };

            let cur_prev_idx = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx);
            let new_next_idx = self.nodes[idx2].as_ref().and_then(|n| n.next_idx);

            self.remove_neighbours(merge_pair, idx1, idx2);
            self.merge_pair_in_list(new_next_idx, new_tok_id, idx1, idx2);
            self.add_neighbours(new_tok_id, idx1, cur_prev_idx, new_next_idx);
        }

        debug!(
            "merge {}: ({}, {}) -> {} (freq {})",
            self.merge_history.len(),
            merge_pair.0,
            merge_pair.1,
            new_tok_id,
            best.freq
        );
        self.merge_history.push(merge_pair);

        self.pair_freqs.remove(&merge_pair);
        self.pair_positions.remove(&merge_pair);

        Some((merge_pair, new_tok_id, best.freq))
    }

    /// Learned rules in order, as `(left, right)` pairs.
    fn merges(&self) -> Vec<(Token, Token)> {
        self.merge_history.iter().map(|p| (p.0, p.1)).collect()
    }

    /// Current token sequence of every word.
    ///
    /// Merging keeps the left node, so every word still starts at a live
    /// node without a predecessor.
    #[cfg(test)]
    fn words(&self) -> Vec<Vec<Token>> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.as_ref().is_some_and(|n| n.prev_idx.is_none()))
            .map(|(head, _)| {
                let mut word = Vec::new();
                let mut current = Some(head);
                while let Some(idx) = current {
                    let Some(node) = &self.nodes[idx] else { break };
                    word.push(node.token);
                    current = node.next_idx;
                }
                word
            })
            .collect()
    }

    /// Records every adjacent pair once and seeds the heap. O(N).
    fn build_initial_pairs(&mut self) {
        for idx in 0..self.nodes.len() {
            if let Some(node) = &self.nodes[idx]
                && let Some(next_idx) = node.next_idx
                && let Some(next_node) = &self.nodes[next_idx]
            {
                let pair = TokenPair(node.token, next_node.token);
                *self.pair_freqs.entry(pair).or_insert(0) += node.weight;
                self.pair_positions.entry(pair).or_default().insert(idx);
            }
        }

        for (&pair, &freq) in &self.pair_freqs {
            self.heap.push(HeapItem { freq, pair });
        }
    }

    /// Pops the most frequent live pair.
    ///
    /// An entry whose count has since dropped is pushed back with the current
    /// count; one whose count has grown is dropped, as a fresher entry exists.
    fn get_max_pair(&mut self) -> Option<HeapItem> {
        while let Some(entry) = self.heap.pop() {
            match self.pair_freqs.get(&entry.pair) {
                Some(&freq) if freq == entry.freq && freq > 0 => return Some(entry),
                Some(&freq) if freq > 0 && freq < entry.freq => {
                    self.heap.push(HeapItem {
                        freq,
                        pair: entry.pair,
                    });
                }
                _ => {}
            }
        }
        None
    }

    /// Drops one occurrence of `pair` at `idx` from the bookkeeping.
    /// The linked list itself is not modified.
    fn remove_pair_at(&mut self, idx: TextIdx, pair: TokenPair, weight: TokenFreq) {
        if let Some(freq) = self.pair_freqs.get_mut(&pair) {
            *freq = freq.saturating_sub(weight);
        }
        if let Some(pos_set) = self.pair_positions.get_mut(&pair) {
            pos_set.remove(&idx);
        }
    }

    /// Records one occurrence of `pair` at `idx` and queues its new count.
    /// The linked list itself is not modified.
    fn add_pair_at(&mut self, idx: TextIdx, pair: TokenPair, weight: TokenFreq) {
        self.pair_positions.entry(pair).or_default().insert(idx);
        let freq = self.pair_freqs.entry(pair).or_insert(0);
        *freq += weight;
        self.heap.push(HeapItem { freq: *freq, pair });
    }

    /// Tracks the pairs the merged token forms with its new neighbours.
    fn add_neighbours(
        &mut self,
        new_tok_id: Token,
        idx1: TextIdx,
        cur_prev_idx: Option<TextIdx>,
        new_next_idx: Option<TextIdx>,
    ) {
        let Some(weight) = self.nodes[idx1].as_ref().map(|n| n.weight) else {
            return;
        };

        if let Some(prev_idx) = cur_prev_idx
            && let Some(prev_node) = &self.nodes[prev_idx]
        {
            let new_pair = TokenPair(prev_node.token, new_tok_id);
            self.add_pair_at(prev_idx, new_pair, weight);
        }

        if let Some(next_idx) = new_next_idx
            && let Some(next_node) = &self.nodes[next_idx]
        {
            let new_pair = TokenPair(new_tok_id, next_node.token);
            self.add_pair_at(idx1, new_pair, weight);
        }
    }

    /// Rewrites `idx1` to the merged token and unlinks `idx2`.
    fn merge_pair_in_list(
        &mut self,
        next_idx: Option<TextIdx>,
        tok_id: Token,
        idx1: TextIdx,
        idx2: TextIdx,
    ) {
        if let Some(node) = &mut self.nodes[idx1] {
            node.token = tok_id;
            node.next_idx = next_idx;
        }

        if let Some(new_right_idx) = next_idx
            && let Some(new_right_node) = &mut self.nodes[new_right_idx]
        {
            new_right_node.prev_idx = Some(idx1);
        }

        self.nodes[idx2] = None;
    }

    /// Un-tracks the pairs the two merged tokens formed with their outer neighbours.
    fn remove_neighbours(&mut self, merge_pair: TokenPair, idx1: TextIdx, idx2: TextIdx) {
        let Some(weight) = self.nodes[idx1].as_ref().map(|n| n.weight) else {
            return;
        };

        if let Some(prev_idx) = self.nodes[idx1].as_ref().and_then(|n| n.prev_idx)
            && let Some(prev_node) = &self.nodes[prev_idx]
        {
            let old_pair = TokenPair(prev_node.token, merge_pair.0);
            self.remove_pair_at(prev_idx, old_pair, weight);
        }

        if let Some(next_idx) = self.nodes[idx2].as_ref().and_then(|n| n.next_idx)
            && let Some(next_node) = &self.nodes[next_idx]
        {
            let old_pair = TokenPair(merge_pair.1, next_node.token);
            self.remove_pair_at(idx2, old_pair, weight);
        }
    }

    /// Checks that `pair` still starts at `pos` and returns both node indices.
    fn get_merge_idxs(&self, pair: TokenPair, pos: TextIdx) -> ControlFlow<(), (TextIdx, TextIdx)> {
        let Some(node1) = &self.nodes[pos] else {
            // consumed by an earlier merge in this round
            return ControlFlow::Break(());
        };
        let Some(idx2) = node1.next_idx else {
            return ControlFlow::Break(());
        };
        match &self.nodes[idx2] {
            Some(node2) if node1.token == pair.0 && node2.token == pair.1 => {
                ControlFlow::Continue((pos, idx2))
            }
            _ => ControlFlow::Break(()),
        }
    }
}
