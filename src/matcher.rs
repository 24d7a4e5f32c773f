//! Per-position match finding.
//!
//! Every position is searched independently against the read-only
//! [`WindowIndex`]: the chain is walked nearest first and only a strictly
//! longer match replaces the current best, so ties resolve to the smallest
//! offset no matter which lane ran the search.

use crate::format::{MAX_MATCH, MIN_MATCH, WINDOW_SIZE};
use crate::index::WindowIndex;
use crate::scan;

/// Best back-reference found for one input position.
///
/// `length == 0` is the literal marker: no match of at least `MIN_MATCH`
/// bytes exists in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchCandidate {
    pub offset: u16,
    pub length: u16,
}

impl MatchCandidate {
    pub const LITERAL: MatchCandidate = MatchCandidate {
        offset: 0,
        length: 0,
    };

    /// Whether this candidate is long enough to become a copy token.
    #[inline]
    pub fn is_match(&self) -> bool {
        self.length as usize >= MIN_MATCH
    }

    /// Input bytes consumed if this candidate is accepted at its position.
    #[inline]
    pub fn consumed(&self) -> usize {
        if self.is_match() {
            self.length as usize
        } else {
            1
        }
    }
}

/// Chain-walk limit. `None` walks the whole window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchDepth(pub Option<usize>);

impl SearchDepth {
    #[inline]
    pub(crate) fn max_links(self) -> usize {
        self.0.unwrap_or(usize::MAX)
    }
}

/// Length of the common prefix of `a` and `b`, 8 bytes per step.
#[inline]
pub(crate) fn common_prefix(a: &[u8], b: &[u8]) -> usize {
    let max_len = a.len().min(b.len());
    let mut i = 0;
    while i + 8 <= max_len {
        let wa = u64::from_le_bytes(a[i..i + 8].try_into().unwrap_or([0; 8]));
        let wb = u64::from_le_bytes(b[i..i + 8].try_into().unwrap_or([0; 8]));
        let diff = wa ^ wb;
        if diff != 0 {
            return i + (diff.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }
    while i < max_len && a[i] == b[i] {
        i += 1;
    }
    i
}

/// Find the best match at `pos`.
pub fn find_match(
    input: &[u8],
    index: &WindowIndex,
    pos: usize,
    depth: SearchDepth,
) -> MatchCandidate {
    if pos >= index.len() {
        // Fewer than MIN_MATCH bytes remain.
        return MatchCandidate::LITERAL;
    }

    let limit = (input.len() - pos).min(MAX_MATCH);
    let target = &input[pos..pos + limit];
    let mut best_offset = 0usize;
    let mut best_length = 0usize;

    for candidate in index.chain(pos).take(depth.max_links()) {
        let offset = pos - candidate;
        if offset > WINDOW_SIZE {
            break;
        }
        // The source may run into `target` itself (offset < length); the
        // decoder copies byte by byte, so overlapping matches are valid.
        let length = common_prefix(&input[candidate..], target);
        if length > best_length {
            best_length = length;
            best_offset = offset;
            if length == limit {
                break;
            }
        }
    }

    if best_length >= MIN_MATCH {
        MatchCandidate {
            offset: best_offset as u16,
            length: best_length as u16,
        }
    } else {
        MatchCandidate::LITERAL
    }
}

/// Find the best match for every position of `input`, using up to
/// `threads` lanes. Each lane fills only its own slice of the result.
pub fn find_matches(
    input: &[u8],
    index: &WindowIndex,
    threads: usize,
    depth: SearchDepth,
) -> Vec<MatchCandidate> {
    let mut candidates = vec![MatchCandidate::LITERAL; input.len()];
    scan::par_chunks_mut(&mut candidates, threads, |start, chunk| {
        for (i, slot) in chunk.iter_mut().enumerate() {
            *slot = find_match(input, index, start + i, depth);
        }
    });
    candidates
}
