//! Wire format shared by the encoder and decoder.
//!
//! The stream is a sequence of groups. Each group starts with one control
//! byte whose bits (LSB first) flag up to 8 following tokens:
//! set = copy, clear = literal. Unused bits of the last group are zero.
//!
//! ```text
//! [ctrl][tok0][tok1]...[tok7][ctrl][tok8]...
//! literal: [byte]
//! copy:    [offset: u16 LE][length - MIN_MATCH: u8]
//! ```
//!
//! There is no header. The decoder stops when the input is exhausted.

/// Sliding window size. Copy offsets are in `1..=WINDOW_SIZE`.
pub const WINDOW_SIZE: usize = 4096;

/// Shortest match worth a copy token.
pub const MIN_MATCH: usize = 3;

/// Longest match a copy token can carry (length byte stores `len - MIN_MATCH`).
pub const MAX_MATCH: usize = MIN_MATCH + u8::MAX as usize;

/// Tokens described by one control byte.
pub const GROUP_SIZE: usize = 8;

/// Payload size of a literal token.
pub const LITERAL_SIZE: usize = 1;

/// Payload size of a copy token: offset (2) + length (1).
pub const COPY_SIZE: usize = 3;

/// One decision in the compressed representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Literal(u8),
    Copy { offset: u16, length: u16 },
}

impl Token {
    /// Number of output bytes this token produces.
    #[inline]
    pub fn output_len(&self) -> usize {
        match *self {
            Token::Literal(_) => 1,
            Token::Copy { length, .. } => length as usize,
        }
    }

    /// Number of payload bytes this token occupies in the stream.
    #[inline]
    pub fn payload_len(&self) -> usize {
        match self {
            Token::Literal(_) => LITERAL_SIZE,
            Token::Copy { .. } => COPY_SIZE,
        }
    }

    #[inline]
    pub fn is_copy(&self) -> bool {
        matches!(self, Token::Copy { .. })
    }

    /// Write this token's payload into `buf`, returning the bytes written.
    ///
    /// `buf` must hold at least [`payload_len()`](Self::payload_len) bytes.
    #[inline]
    pub(crate) fn write_payload(&self, buf: &mut [u8]) -> usize {
        match *self {
            Token::Literal(b) => {
                buf[0] = b;
                LITERAL_SIZE
            }
            Token::Copy { offset, length } => {
                buf[0..2].copy_from_slice(&offset.to_le_bytes());
                buf[2] = (length as usize - MIN_MATCH) as u8;
                COPY_SIZE
            }
        }
    }

    /// Parse a copy payload. Caller guarantees `buf.len() >= COPY_SIZE`.
    #[inline]
    pub(crate) fn read_copy(buf: &[u8]) -> Token {
        Token::Copy {
            offset: u16::from_le_bytes([buf[0], buf[1]]),
            length: buf[2] as u16 + MIN_MATCH as u16,
        }
    }
}

/// Build the control byte for up to 8 tokens.
#[inline]
pub(crate) fn control_byte(tokens: &[Token]) -> u8 {
    debug_assert!(tokens.len() <= GROUP_SIZE);
    tokens
        .iter()
        .enumerate()
        .fold(0u8, |ctrl, (k, t)| if t.is_copy() { ctrl | 1 << k } else { ctrl })
}

/// Exact encoded size of a token stream.
pub fn encoded_len(tokens: &[Token]) -> usize {
    tokens.len().div_ceil(GROUP_SIZE) + tokens.iter().map(Token::payload_len).sum::<usize>()
}

/// Worst-case compressed size for `input_len` bytes: all literals, one
/// control byte per 8 of them.
pub fn compress_bound(input_len: usize) -> usize {
    input_len + input_len.div_ceil(GROUP_SIZE)
}
