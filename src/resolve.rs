//! Greedy match resolution.
//!
//! Turns per-position candidates into the token stream a sequential greedy
//! LZSS encoder produces: at each resolved position take the candidate if it
//! is a match, otherwise emit a literal, then advance by what was consumed.
//!
//! The walk from position 0 is a linked list (`next = pos + consumed`). To
//! spread it across lanes, every chunk first walks speculatively from its own
//! start. A stitch pass then hands each chunk its true entry position and
//! re-walks only until the true path lands on a speculative token start;
//! from there the two paths are identical.

use crate::format::{Token, MAX_MATCH, WINDOW_SIZE};
use crate::matcher::MatchCandidate;
use crate::scan;
use crate::{LzssError, LzssResult};

/// Walk `[from, end)` greedily. Returns the token starts and the first
/// position at or past `end`.
fn walk(candidates: &[MatchCandidate], from: usize, end: usize) -> (Vec<usize>, usize) {
    let mut starts = Vec::new();
    let mut pos = from;
    while pos < end {
        starts.push(pos);
        pos += candidates[pos].consumed();
    }
    (starts, pos)
}

/// Token start positions, computed by one sequential walk.
pub fn token_starts_sequential(candidates: &[MatchCandidate]) -> Vec<usize> {
    walk(candidates, 0, candidates.len()).0
}

/// Token start positions, computed by speculative chunk walks plus a stitch.
/// Identical to [`token_starts_sequential`].
pub fn token_starts(candidates: &[MatchCandidate], threads: usize) -> Vec<usize> {
    let n = candidates.len();
    let lanes = scan::lane_count(n, threads);
    if lanes <= 1 {
        return token_starts_sequential(candidates);
    }

    let chunk = scan::chunk_len(n, lanes, 1);
    let speculative = scan::par_map_ranges(n, lanes, 1, |range| {
        walk(candidates, range.start, range.end)
    });

    let mut starts = Vec::with_capacity(n / 2);
    let mut entry = 0usize;
    for (k, (spec_starts, spec_exit)) in speculative.into_iter().enumerate() {
        let end = ((k + 1) * chunk).min(n);
        if entry >= end {
            // A copy from an earlier chunk covers this whole chunk.
            continue;
        }
        let mut pos = entry;
        loop {
            if let Ok(i) = spec_starts.binary_search(&pos) {
                starts.extend_from_slice(&spec_starts[i..]);
                entry = spec_exit;
                break;
            }
            starts.push(pos);
            pos += candidates[pos].consumed();
            if pos >= end {
                entry = pos;
                break;
            }
        }
    }
    starts
}

/// Build the token at a resolved position, re-checking the candidate against
/// the window and the end of input.
#[inline]
fn token_at(input: &[u8], candidate: MatchCandidate, pos: usize) -> LzssResult<Token> {
    if !candidate.is_match() {
        return Ok(Token::Literal(input[pos]));
    }
    let offset = candidate.offset as usize;
    let length = candidate.length as usize;
    if offset == 0 || offset > WINDOW_SIZE || offset > pos || length > MAX_MATCH
        || pos + length > input.len()
    {
        return Err(LzssError::WindowConstraintViolation {
            position: pos,
            offset,
            length,
        });
    }
    Ok(Token::Copy {
        offset: candidate.offset,
        length: candidate.length,
    })
}

/// Resolve candidates into the greedy token stream with one lane.
pub fn resolve_sequential(input: &[u8], candidates: &[MatchCandidate]) -> LzssResult<Vec<Token>> {
    if candidates.len() != input.len() {
        return Err(LzssError::InvalidInput);
    }
    token_starts_sequential(candidates)
        .into_iter()
        .map(|pos| token_at(input, candidates[pos], pos))
        .collect()
}

/// Resolve candidates into the greedy token stream using up to `threads`
/// lanes.
pub fn resolve(
    input: &[u8],
    candidates: &[MatchCandidate],
    threads: usize,
) -> LzssResult<Vec<Token>> {
    if candidates.len() != input.len() {
        return Err(LzssError::InvalidInput);
    }
    let starts = token_starts(candidates, threads);
    let lanes = scan::lane_count(starts.len(), threads);
    let parts = scan::par_map_ranges(starts.len(), lanes, 1, |range| {
        starts[range]
            .iter()
            .map(|&pos| token_at(input, candidates[pos], pos))
            .collect::<LzssResult<Vec<Token>>>()
    });

    let mut tokens = Vec::with_capacity(starts.len());
    for part in parts {
        tokens.extend(part?);
    }
    Ok(tokens)
}
