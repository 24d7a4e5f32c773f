//! Data-parallel LZSS compression.
//!
//! The classic sequential sliding-window coder is split into independent
//! phases: a window index, a per-position match finder, a greedy resolver,
//! and a bitstream encoder. Decoding scans token boundaries, resolves output
//! positions with a prefix scan, then materializes bytes in dependency order.
//! The parallel phases run on scoped CPU threads, or on a wgpu compute device
//! with the `webgpu` feature.

pub mod decode;
pub mod encode;
pub mod format;
pub mod index;
pub mod matcher;
pub mod pipeline;
pub mod resolve;
pub mod scan;

#[cfg(feature = "webgpu")]
pub mod webgpu;

pub mod ffi;

#[cfg(test)]
mod validation;

pub use pipeline::{
    compress, compress_to_buf, compress_with_options, compress_with_stats, decompress,
    decompress_to_buf, decompress_with_options, Backend, CompressOptions, CompressStats,
    DecompressOptions,
};

use thiserror::Error;

/// Why a compressed stream was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CorruptKind {
    /// A copy refers to bytes before the start of the output.
    #[error("back-reference at output {position} reaches {offset} bytes back")]
    InvalidBackReference { position: usize, offset: usize },
    /// A copy offset is zero or larger than the window.
    #[error("offset {offset} at output {position} outside window")]
    OffsetBeyondWindow { position: usize, offset: usize },
    /// A control byte with no token after it.
    #[error("control byte at {at} has no tokens")]
    EmptyGroup { at: usize },
    /// Copy flags set for tokens past the end of the stream.
    #[error("control byte at {at} flags tokens past end of stream")]
    TrailingFlags { at: usize },
    /// The stream ends in the middle of a copy payload.
    #[error("copy payload truncated at {at}")]
    TruncatedPayload { at: usize },
}

/// Error types for compress and decompress calls.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum LzssError {
    /// Input buffer is invalid (null, negative length, or too long).
    #[error("invalid input")]
    InvalidInput,
    /// Output buffer is too small to hold the result.
    #[error("output buffer too small: need {needed} bytes, have {capacity}")]
    BufferTooSmall { needed: usize, capacity: usize },
    /// Compressed data is malformed.
    #[error("corrupt stream: {0}")]
    CorruptStream(CorruptKind),
    /// The encoder produced a copy that breaks the window invariant.
    #[error("window constraint violated at {position} (offset {offset}, length {length})")]
    WindowConstraintViolation {
        position: usize,
        offset: usize,
        length: usize,
    },
    /// The requested backend is not available.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

pub type LzssResult<T> = Result<T, LzssError>;
