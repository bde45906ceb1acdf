//! Merge application at encode time.
//!
//! Within one chunk, the pair learned earliest is merged first, every
//! non-overlapping occurrence left to right, until no known pair remains.
//! This is the same evolution a word goes through during training, which is
//! what makes decoding an exact inverse.
//!
//! Instead of rescanning the sequence once per rank, candidates sit in a
//! min-heap keyed by (merge order, position). A merged token always has a
//! higher rank than the pair that produced it, so pairs created by a merge
//! never jump ahead of pending lower-rank candidates. The working sequence is
//! a linked list over the input slots, the same layout the trainer uses.

use std::{cmp::Ordering, collections::BinaryHeap};

use crate::{
    types::{MergeOrder, Token, TokenPair},
    vocab::Vocabulary,
};

/// Item in the priority queue for merge ordering.
///
/// Candidates are ordered by merge_order (earliest first) with position
/// as a tiebreaker, so equal-rank occurrences are taken left to right.
#[derive(Debug, PartialEq, Eq)]
struct MergeCandidate {
    merge_order: MergeOrder,
    pair: TokenPair,
    /// Index of the pair's left token in the working sequence.
    position: usize,
}

impl PartialOrd for MergeCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MergeCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed (other vs self) to get min-heap behavior from BinaryHeap.
        other
            .merge_order
            .cmp(&self.merge_order)
            .then_with(|| other.position.cmp(&self.position))
    }
}

/// Token in the working sequence, linked to its live neighbours.
#[derive(Debug, Clone, Copy)]
struct Symbol {
    token: Token,
    prev_idx: Option<usize>,
    next_idx: Option<usize>,
}

/// Applies the vocabulary's merge rules to one chunk's byte tokens.
///
/// The output has the same or fewer tokens than the input.
///
/// # Time Complexity
///
/// O(N log N) where N is the input sequence length: each merge pops one
/// candidate and pushes at most two, and neighbours are found through links.
pub(crate) fn apply_merges(vocab: &Vocabulary, tokens: Vec<Token>) -> Vec<Token> {
    let n = tokens.len();
    if n <= 1 {
        return tokens;
    }

    let mut heap = BinaryHeap::with_capacity(n);
    for (i, window) in tokens.windows(2).enumerate() {
        push_candidate(vocab, &mut heap, TokenPair(window[0], window[1]), i);
    }

    // None marks a symbol consumed by an earlier merge
    let mut symbols: Vec<Option<Symbol>> = tokens
        .into_iter()
        .enumerate()
        .map(|(i, token)| {
            Some(Symbol {
                token,
                prev_idx: i.checked_sub(1),
                next_idx: (i + 1 < n).then_some(i + 1),
            })
        })
        .collect();

    while let Some(candidate) = heap.pop() {
        let pos = candidate.position;

        let Some(left) = symbols.get(pos).copied().flatten() else {
            continue;
        };
        let Some(right_idx) = left.next_idx else {
            continue;
        };
        let Some(right) = symbols[right_idx] else {
            continue;
        };

        // stale candidate: one side was merged away since it was queued
        if candidate.pair != TokenPair(left.token, right.token) {
            continue;
        }
        let Some((merged, _)) = vocab.merge_for(candidate.pair) else {
            continue;
        };

        symbols[pos] = Some(Symbol {
            token: merged,
            prev_idx: left.prev_idx,
            next_idx: right.next_idx,
        });
        symbols[right_idx] = None;

        if let Some(next_idx) = right.next_idx
            && let Some(next) = &mut symbols[next_idx]
        {
            next.prev_idx = Some(pos);
            let pair = TokenPair(merged, next.token);
            push_candidate(vocab, &mut heap, pair, pos);
        }
        if let Some(prev_idx) = left.prev_idx
            && let Some(prev) = symbols[prev_idx]
        {
            push_candidate(vocab, &mut heap, TokenPair(prev.token, merged), prev_idx);
        }
    }

    symbols.into_iter().flatten().map(|s| s.token).collect()
}

/// Queues `pair` at `position` if a merge rule exists for it.
#[inline]
fn push_candidate(
    vocab: &Vocabulary,
    heap: &mut BinaryHeap<MergeCandidate>,
    pair: TokenPair,
    position: usize,
) {
    if let Some((_, merge_order)) = vocab.merge_for(pair) {
        heap.push(MergeCandidate {
            merge_order,
            pair,
            position,
        });
    }
}
