//! Parallel decoder.
//!
//! Decoding runs as a small state machine:
//!
//! ```text
//! ScanningTokens -> ResolvingPositions -> MaterializingBytes -> Done
//!        \                  \                      \
//!         +------------------+----------------------+--> Failed(reason)
//! ```
//!
//! 1. **ScanningTokens**: one pass over the control bytes finds every token
//!    boundary. Only flags and payload sizes are needed, never output bytes.
//! 2. **ResolvingPositions**: an exclusive scan over token output lengths
//!    gives each token its output position; copies are checked against it.
//! 3. **MaterializingBytes**: literals are written in parallel. Each copy is
//!    assigned a dependency level, one more than the highest level among the
//!    tokens its source range reads (excluding itself). Levels run in order,
//!    tokens within a level in parallel; a self-overlapping copy is copied
//!    byte by byte by its own lane.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::format::{Token, COPY_SIZE, GROUP_SIZE, WINDOW_SIZE};
use crate::scan;
use crate::{CorruptKind, LzssError, LzssResult};

/// Levels with fewer output bytes than this run on the calling thread.
const MIN_LEVEL_BYTES_PER_LANE: usize = 64 * 1024;

/// Where a decode currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeState {
    ScanningTokens,
    ResolvingPositions,
    MaterializingBytes,
    Done,
    Failed(LzssError),
}

/// Step-by-step decoder over one compressed buffer.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    threads: usize,
    state: DecodeState,
    tokens: Vec<Token>,
    positions: Vec<usize>,
    output_len: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a [u8], threads: usize) -> Self {
        Self {
            input,
            threads: threads.max(1),
            state: DecodeState::ScanningTokens,
            tokens: Vec::new(),
            positions: Vec::new(),
            output_len: 0,
        }
    }

    pub fn state(&self) -> &DecodeState {
        &self.state
    }

    /// Tokens found by [`scan_tokens`](Self::scan_tokens).
    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Output position of every token, after
    /// [`resolve_positions`](Self::resolve_positions).
    pub fn positions(&self) -> &[usize] {
        &self.positions
    }

    /// Decoded length, after [`resolve_positions`](Self::resolve_positions).
    pub fn output_len(&self) -> usize {
        self.output_len
    }

    fn fail(&mut self, e: LzssError) -> LzssError {
        self.state = DecodeState::Failed(e.clone());
        e
    }

    fn expect_state(&self, expected: DecodeState) -> LzssResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(LzssError::InvalidInput)
        }
    }

    /// Find every token boundary in the stream.
    pub fn scan_tokens(&mut self) -> LzssResult<()> {
        self.expect_state(DecodeState::ScanningTokens)?;
        match scan_stream(self.input) {
            Ok(tokens) => {
                self.tokens = tokens;
                self.state = DecodeState::ResolvingPositions;
                Ok(())
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Assign output positions and validate every back-reference.
    /// Returns the decoded length.
    pub fn resolve_positions(&mut self) -> LzssResult<usize> {
        self.expect_state(DecodeState::ResolvingPositions)?;
        let (positions, total) =
            scan::exclusive_scan_by(&self.tokens, self.threads, Token::output_len);
        if let Err(e) = validate_references(&self.tokens, &positions, self.threads) {
            return Err(self.fail(e));
        }
        self.positions = positions;
        self.output_len = total;
        self.state = DecodeState::MaterializingBytes;
        Ok(total)
    }

    /// Write the decoded bytes into `output` on CPU lanes.
    pub fn materialize(&mut self, output: &mut [u8]) -> LzssResult<usize> {
        let threads = self.threads;
        self.materialize_with(output, |tokens, positions, out| {
            if threads <= 1 {
                materialize_sequential(tokens, positions, out);
            } else {
                materialize_levels(tokens, positions, out, threads);
            }
            Ok(())
        })
    }

    /// Write the decoded bytes with a caller-supplied materializer (used by
    /// device backends). The capacity check happens before `f` runs.
    pub fn materialize_with<F>(&mut self, output: &mut [u8], f: F) -> LzssResult<usize>
    where
        F: FnOnce(&[Token], &[usize], &mut [u8]) -> LzssResult<()>,
    {
        self.expect_state(DecodeState::MaterializingBytes)?;
        let total = self.output_len;
        if total > output.len() {
            return Err(self.fail(LzssError::BufferTooSmall {
                needed: total,
                capacity: output.len(),
            }));
        }
        if let Err(e) = f(&self.tokens, &self.positions, &mut output[..total]) {
            return Err(self.fail(e));
        }
        self.state = DecodeState::Done;
        Ok(total)
    }
}

/// Split the stream into tokens.
fn scan_stream(input: &[u8]) -> LzssResult<Vec<Token>> {
    let corrupt = |kind| Err(LzssError::CorruptStream(kind));
    let mut tokens = Vec::with_capacity(input.len() / 2);
    let mut i = 0;

    while i < input.len() {
        let ctrl_at = i;
        let ctrl = input[i];
        i += 1;
        if i == input.len() {
            return corrupt(CorruptKind::EmptyGroup { at: ctrl_at });
        }
        for k in 0..GROUP_SIZE {
            if i == input.len() {
                // Unused slots of the final group must be flagged literal.
                if ctrl >> k != 0 {
                    return corrupt(CorruptKind::TrailingFlags { at: ctrl_at });
                }
                break;
            }
            if ctrl & (1 << k) != 0 {
                if i + COPY_SIZE > input.len() {
                    return corrupt(CorruptKind::TruncatedPayload { at: i });
                }
                tokens.push(Token::read_copy(&input[i..i + COPY_SIZE]));
                i += COPY_SIZE;
            } else {
                tokens.push(Token::Literal(input[i]));
                i += 1;
            }
        }
    }

    Ok(tokens)
}

#[inline]
fn check_reference(token: &Token, position: usize) -> LzssResult<()> {
    if let Token::Copy { offset, .. } = *token {
        let offset = offset as usize;
        if offset == 0 || offset > WINDOW_SIZE {
            return Err(LzssError::CorruptStream(
                CorruptKind::OffsetBeyondWindow { position, offset },
            ));
        }
        if offset > position {
            return Err(LzssError::CorruptStream(
                CorruptKind::InvalidBackReference { position, offset },
            ));
        }
    }
    Ok(())
}

/// Check every copy against its resolved position; reports the first bad
/// token in stream order.
fn validate_references(tokens: &[Token], positions: &[usize], threads: usize) -> LzssResult<()> {
    let lanes = scan::lane_count(tokens.len(), threads);
    let results = scan::par_map_ranges(tokens.len(), lanes, 1, |range| {
        tokens[range.clone()]
            .iter()
            .zip(&positions[range])
            .try_for_each(|(t, &p)| check_reference(t, p))
    });
    results.into_iter().collect()
}

/// Single-lane materialization in token order.
pub(crate) fn materialize_sequential(tokens: &[Token], positions: &[usize], out: &mut [u8]) {
    for (token, &p) in tokens.iter().zip(positions) {
        match *token {
            Token::Literal(b) => out[p] = b,
            Token::Copy { offset, length } => {
                let src = p - offset as usize;
                let length = length as usize;
                if offset as usize >= length {
                    out.copy_within(src..src + length, p);
                } else {
                    for j in 0..length {
                        out[p + j] = out[src + j];
                    }
                }
            }
        }
    }
}

/// Range-max tree over token levels.
struct MaxTree {
    size: usize,
    data: Vec<u32>,
}

impl MaxTree {
    fn new(n: usize) -> Self {
        let size = n.next_power_of_two();
        Self {
            size,
            data: vec![0; 2 * size],
        }
    }

    fn set(&mut self, i: usize, v: u32) {
        let mut i = i + self.size;
        self.data[i] = v;
        while i > 1 {
            i /= 2;
            self.data[i] = self.data[2 * i].max(self.data[2 * i + 1]);
        }
    }

    /// Max over `lo..=hi`.
    fn max(&self, lo: usize, hi: usize) -> u32 {
        let mut l = lo + self.size;
        let mut r = hi + self.size + 1;
        let mut best = 0;
        while l < r {
            if l & 1 == 1 {
                best = best.max(self.data[l]);
                l += 1;
            }
            if r & 1 == 1 {
                r -= 1;
                best = best.max(self.data[r]);
            }
            l /= 2;
            r /= 2;
        }
        best
    }
}

/// Index of the token whose output range contains byte `x`.
#[inline]
pub(crate) fn token_containing(positions: &[usize], x: usize) -> usize {
    positions.partition_point(|&p| p <= x) - 1
}

/// Dependency level of every token: literals are 0, a copy is one more than
/// the highest level among the earlier tokens its source range overlaps.
pub(crate) fn dependency_levels(tokens: &[Token], positions: &[usize]) -> Vec<u32> {
    let mut levels = vec![0u32; tokens.len()];
    let mut tree = MaxTree::new(tokens.len());
    for (t, token) in tokens.iter().enumerate() {
        if let Token::Copy { offset, length } = *token {
            let p = positions[t];
            let src_start = p - offset as usize;
            // Bytes at or past `p` belong to this token itself.
            let src_end = (src_start + length as usize).min(p);
            let first = token_containing(positions, src_start);
            let last = token_containing(positions, src_end - 1);
            let level = tree.max(first, last) + 1;
            levels[t] = level;
            tree.set(t, level);
        }
    }
    levels
}

#[inline]
fn store_token(cells: &[AtomicU8], token: &Token, p: usize) {
    match *token {
        Token::Literal(b) => cells[p].store(b, Ordering::Relaxed),
        Token::Copy { offset, length } => {
            let src = p - offset as usize;
            for j in 0..length as usize {
                let b = cells[src + j].load(Ordering::Relaxed);
                cells[p + j].store(b, Ordering::Relaxed);
            }
        }
    }
}

/// Level-by-level parallel materialization.
///
/// Every token in a level reads only bytes written by lower levels (or by
/// itself, in order) and writes only its own output range. The scoped-thread
/// join at the end of each level orders it before the next.
pub(crate) fn materialize_levels(
    tokens: &[Token],
    positions: &[usize],
    out: &mut [u8],
    threads: usize,
) {
    let levels = dependency_levels(tokens, positions);
    let max_level = levels.iter().copied().max().unwrap_or(0) as usize;

    // Counting sort of token indices by level.
    let mut starts = vec![0usize; max_level + 2];
    for &l in &levels {
        starts[l as usize + 1] += 1;
    }
    for l in 1..starts.len() {
        starts[l] += starts[l - 1];
    }
    let mut order = vec![0usize; tokens.len()];
    let mut fill = starts.clone();
    for (t, &l) in levels.iter().enumerate() {
        order[fill[l as usize]] = t;
        fill[l as usize] += 1;
    }

    // SAFETY: AtomicU8 has the same size, alignment and bit validity as u8,
    // and `out` is exclusively borrowed for the lifetime of `cells`.
    let cells: &[AtomicU8] = unsafe { &*(out as *mut [u8] as *const [AtomicU8]) };

    for level in 0..=max_level {
        let members = &order[starts[level]..starts[level + 1]];
        let bytes: usize = members.iter().map(|&t| tokens[t].output_len()).sum();
        let lanes = threads.min(bytes / MIN_LEVEL_BYTES_PER_LANE).max(1);
        if lanes <= 1 {
            for &t in members {
                store_token(cells, &tokens[t], positions[t]);
            }
            continue;
        }
        scan::par_map_ranges(members.len(), lanes, 1, |range| {
            for &t in &members[range] {
                store_token(cells, &tokens[t], positions[t]);
            }
        });
    }
}

/// Decode `input` into `output`, returning the decoded length.
pub fn decode_into(input: &[u8], output: &mut [u8], threads: usize) -> LzssResult<usize> {
    let mut decoder = Decoder::new(input, threads);
    decoder.scan_tokens()?;
    decoder.resolve_positions()?;
    decoder.materialize(output)
}

/// Decode `input` into a buffer sized from the token scan.
pub fn decode(input: &[u8], threads: usize) -> LzssResult<Vec<u8>> {
    let mut decoder = Decoder::new(input, threads);
    decoder.scan_tokens()?;
    let len = decoder.resolve_positions()?;
    let mut output = vec![0u8; len];
    decoder.materialize(&mut output)?;
    Ok(output)
}
