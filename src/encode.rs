//! Bitstream encoder.
//!
//! The byte position of every token is known up front: an exclusive scan
//! over payload sizes, plus one control byte per group started so far. The
//! total is checked against the output capacity before anything is written.
//! Tokens are then split into 8-token-aligned chunks, each owning a disjoint
//! range of the output, and serialized in parallel.
//!
//! Copies are checked against the window and the length byte first, so a
//! stream this encoder writes always decodes back to the same tokens.

use crate::format::{control_byte, Token, GROUP_SIZE, MAX_MATCH, MIN_MATCH, WINDOW_SIZE};
use crate::scan;
use crate::{LzssError, LzssResult};

/// Serialize whole groups of `tokens` into `out`, which must be exactly
/// their encoded size.
fn write_groups(tokens: &[Token], out: &mut [u8]) {
    let mut pos = 0;
    for group in tokens.chunks(GROUP_SIZE) {
        out[pos] = control_byte(group);
        pos += 1;
        for token in group {
            pos += token.write_payload(&mut out[pos..]);
        }
    }
    debug_assert_eq!(pos, out.len());
}

fn copy_fits(token: Token, position: usize) -> bool {
    match token {
        Token::Literal(_) => true,
        Token::Copy { offset, length } => {
            (1..=WINDOW_SIZE.min(position)).contains(&(offset as usize))
                && (MIN_MATCH..=MAX_MATCH).contains(&(length as usize))
        }
    }
}

/// Reject the first copy whose offset leaves the window (or the output
/// written so far) or whose length the payload byte cannot carry.
fn check_copies(tokens: &[Token], threads: usize) -> LzssResult<()> {
    let (positions, _) = scan::exclusive_scan_by(tokens, threads, Token::output_len);
    let lanes = scan::lane_count(tokens.len(), threads);
    let first_bad = scan::par_map_ranges(tokens.len(), lanes, 1, |range| {
        range.into_iter().find(|&t| !copy_fits(tokens[t], positions[t]))
    });
    match first_bad.into_iter().flatten().next() {
        Some(t) => match tokens[t] {
            Token::Copy { offset, length } => Err(LzssError::WindowConstraintViolation {
                position: positions[t],
                offset: offset as usize,
                length: length as usize,
            }),
            Token::Literal(_) => Ok(()),
        },
        None => Ok(()),
    }
}

/// Encode `tokens` into `output`, returning the number of bytes written.
///
/// Fails without touching `output` with
/// [`LzssError::WindowConstraintViolation`] for a copy the format cannot
/// carry, or [`LzssError::BufferTooSmall`] when the stream does not fit.
pub fn encode_tokens(tokens: &[Token], output: &mut [u8], threads: usize) -> LzssResult<usize> {
    check_copies(tokens, threads)?;
    let (payload_offsets, payload_total) = scan::exclusive_scan_by(tokens, threads, Token::payload_len);
    let total = tokens.len().div_ceil(GROUP_SIZE) + payload_total;
    if total > output.len() {
        return Err(LzssError::BufferTooSmall {
            needed: total,
            capacity: output.len(),
        });
    }
    if tokens.is_empty() {
        return Ok(0);
    }

    // Byte position of the control byte that opens the group holding token t.
    let group_start = |t: usize| t / GROUP_SIZE + payload_offsets[t];

    let lanes = scan::lane_count(tokens.len(), threads);
    let out = &mut output[..total];
    if lanes <= 1 {
        write_groups(tokens, out);
        return Ok(total);
    }

    let chunk = scan::chunk_len(tokens.len(), lanes, GROUP_SIZE);
    let mut pieces = Vec::with_capacity(lanes);
    let mut rest = out;
    let mut consumed = 0;
    for (c, part) in tokens.chunks(chunk).enumerate() {
        let next = (c + 1) * chunk;
        let end = if next < tokens.len() {
            group_start(next)
        } else {
            total
        };
        let (head, tail) = rest.split_at_mut(end - consumed);
        pieces.push((part, head));
        rest = tail;
        consumed = end;
    }

    std::thread::scope(|scope| {
        for (part, piece) in pieces {
            scope.spawn(move || write_groups(part, piece));
        }
    });

    Ok(total)
}

/// Encode `tokens` into a freshly allocated buffer.
pub fn encode_tokens_to_vec(tokens: &[Token], threads: usize) -> LzssResult<Vec<u8>> {
    let mut output = vec![0u8; crate::format::encoded_len(tokens)];
    let written = encode_tokens(tokens, &mut output, threads)?;
    output.truncate(written);
    Ok(output)
}
