//! Window index: hash chains over the whole input, built once.
//!
//! `prev[p]` is the nearest earlier position whose 3-byte prefix falls in
//! the same hash bucket as `p`, or [`NO_LINK`] when there is none within
//! [`WINDOW_SIZE`]. Walking `prev` from any position visits every earlier
//! in-window candidate nearest first, so each position's match search only
//! reads the index and never depends on another position's result.
//!
//! The parallel build cuts the input into chunks. Each lane links its chunk
//! against a local head table and returns its tail table; a scan over the
//! tail tables gives each chunk the bucket heads that precede it, and a
//! second parallel pass patches the chunk's first occurrences.

use crate::format::{MIN_MATCH, WINDOW_SIZE};
use crate::scan;

/// Hash table size for bucket heads (power of 2).
pub(crate) const HASH_SIZE: usize = 1 << 15; // 32768
pub(crate) const HASH_MASK: usize = HASH_SIZE - 1;

/// Chain terminator.
pub const NO_LINK: u32 = u32::MAX;

/// Placeholder for a chunk's first occurrence of a bucket during the
/// parallel build. Never a real position: inputs are capped at `i32::MAX`.
const PENDING: u32 = u32::MAX - 1;

/// Compute a hash for 3 bytes at the given position.
///
/// Caller guarantees `pos + 2 < data.len()`.
#[inline(always)]
pub(crate) fn hash3(data: &[u8], pos: usize) -> usize {
    let h = (data[pos] as usize) << 10 ^ (data[pos + 1] as usize) << 5 ^ (data[pos + 2] as usize);
    h & HASH_MASK
}

/// Immutable hash-chain index over one input buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowIndex {
    prev: Vec<u32>,
}

impl WindowIndex {
    /// Build the index using up to `threads` lanes.
    pub fn build(input: &[u8], threads: usize) -> Self {
        let linked = linkable_len(input.len());
        let lanes = scan::lane_count(linked, threads);
        if lanes <= 1 {
            return Self::build_sequential(input);
        }
        Self {
            prev: build_parallel(input, linked, lanes),
        }
    }

    /// Single-lane reference build.
    pub fn build_sequential(input: &[u8]) -> Self {
        let linked = linkable_len(input.len());
        let mut prev = vec![NO_LINK; linked];
        let mut head = vec![NO_LINK; HASH_SIZE];
        for (p, slot) in prev.iter_mut().enumerate() {
            let h = hash3(input, p);
            *slot = link_within_window(head[h], p);
            head[h] = p as u32;
        }
        Self { prev }
    }

    /// Number of positions that carry a chain (those with at least
    /// `MIN_MATCH` bytes remaining).
    pub fn len(&self) -> usize {
        self.prev.len()
    }

    /// True when the input was too short for any match.
    pub fn is_empty(&self) -> bool {
        self.prev.is_empty()
    }

    /// Nearest earlier candidate for `pos`, if any.
    #[inline]
    pub fn link(&self, pos: usize) -> Option<usize> {
        match self.prev.get(pos) {
            Some(&q) if q != NO_LINK => Some(q as usize),
            _ => None,
        }
    }

    /// Candidates for `pos`, nearest first. Stops at the end of the chain;
    /// the caller enforces the window relative to `pos`.
    pub fn chain(&self, pos: usize) -> Chain<'_> {
        Chain {
            index: self,
            next: self.link(pos),
        }
    }

    /// Raw links for device upload.
    pub fn links(&self) -> &[u32] {
        &self.prev
    }
}

/// Iterator over a position's candidate chain.
pub struct Chain<'a> {
    index: &'a WindowIndex,
    next: Option<usize>,
}

impl Iterator for Chain<'_> {
    type Item = usize;

    #[inline]
    fn next(&mut self) -> Option<usize> {
        let cur = self.next?;
        self.next = self.index.link(cur);
        Some(cur)
    }
}

fn linkable_len(input_len: usize) -> usize {
    input_len.saturating_sub(MIN_MATCH - 1)
}

#[inline(always)]
fn link_within_window(candidate: u32, pos: usize) -> u32 {
    if candidate != NO_LINK && pos - candidate as usize <= WINDOW_SIZE {
        candidate
    } else {
        NO_LINK
    }
}

fn build_parallel(input: &[u8], linked: usize, lanes: usize) -> Vec<u32> {
    let chunk = scan::chunk_len(linked, lanes, 1);
    let mut prev = vec![NO_LINK; linked];

    // Pass 1: link each chunk locally, marking first occurrences.
    let tails: Vec<Vec<u32>> = std::thread::scope(|scope| {
        let handles: Vec<_> = prev
            .chunks_mut(chunk)
            .enumerate()
            .map(|(i, part)| {
                scope.spawn(move || {
                    let base = i * chunk;
                    let mut head = vec![NO_LINK; HASH_SIZE];
                    for (j, slot) in part.iter_mut().enumerate() {
                        let p = base + j;
                        let h = hash3(input, p);
                        *slot = if head[h] == NO_LINK {
                            PENDING
                        } else {
                            link_within_window(head[h], p)
                        };
                        head[h] = p as u32;
                    }
                    head
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(t) => t,
                Err(payload) => std::panic::resume_unwind(payload),
            })
            .collect()
    });

    // Scan the tail tables: incoming[k] holds the last position of every
    // bucket before chunk k.
    let mut incoming = Vec::with_capacity(tails.len());
    let mut carry = vec![NO_LINK; HASH_SIZE];
    for tail in &tails {
        incoming.push(carry.clone());
        for (c, &t) in carry.iter_mut().zip(tail) {
            if t != NO_LINK {
                *c = t;
            }
        }
    }

    // Pass 2: patch first occurrences from the preceding chunks.
    std::thread::scope(|scope| {
        for ((i, part), heads) in prev.chunks_mut(chunk).enumerate().zip(&incoming) {
            scope.spawn(move || {
                let base = i * chunk;
                for (j, slot) in part.iter_mut().enumerate() {
                    if *slot == PENDING {
                        let p = base + j;
                        *slot = link_within_window(heads[hash3(input, p)], p);
                    }
                }
            });
        }
    });

    prev
}
