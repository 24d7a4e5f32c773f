//! Compression entry points.
//!
//! Compression runs four phases, each data-parallel over its own axis:
//!
//! | Phase   | Work                                     | Backend      |
//! |---------|------------------------------------------|--------------|
//! | index   | hash chains over the whole input         | CPU          |
//! | match   | best candidate for every position        | CPU or GPU   |
//! | resolve | greedy walk, speculative chunk stitching | CPU          |
//! | encode  | token offsets by prefix scan, serialize  | CPU          |
//!
//! Decompression scans token boundaries, resolves output positions, then
//! materializes bytes by dependency level (CPU) or pointer jumping (GPU).
//!
//! The compressed stream carries no header: see [`crate::format`].

use std::time::{Duration, Instant};

use crate::decode::Decoder;
use crate::encode::encode_tokens;
use crate::format::{encoded_len, Token};
use crate::index::WindowIndex;
use crate::matcher::{self, MatchCandidate, SearchDepth};
use crate::resolve;
use crate::scan::resolve_thread_count;
use crate::{LzssError, LzssResult};

/// Compute backend for the device-amenable phases (match finding and
/// decode materialization).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Backend {
    /// Scoped CPU threads (always available).
    #[default]
    Cpu,
    /// WebGPU backend via wgpu (requires `webgpu` feature).
    #[cfg(feature = "webgpu")]
    WebGpu,
}

/// Options controlling compression.
#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Where match finding runs.
    pub backend: Backend,
    /// Number of threads to use. 0 = auto (use all available cores),
    /// 1 = single-threaded.
    pub threads: usize,
    /// Chain links visited per position. The default walks the whole window.
    pub search_depth: SearchDepth,
    /// Print per-stage wall-clock times to stderr.
    pub profiling: bool,
    /// WebGPU engine handle, required when `backend` is `Backend::WebGpu`.
    #[cfg(feature = "webgpu")]
    pub webgpu_engine: Option<std::sync::Arc<crate::webgpu::WebGpuEngine>>,
}

impl Default for CompressOptions {
    fn default() -> Self {
        CompressOptions {
            backend: Backend::Cpu,
            threads: 0,
            search_depth: SearchDepth::default(),
            profiling: false,
            #[cfg(feature = "webgpu")]
            webgpu_engine: None,
        }
    }
}

/// Options controlling decompression.
#[derive(Debug, Clone, Default)]
pub struct DecompressOptions {
    /// Where materialization runs.
    pub backend: Backend,
    /// Number of threads. 0 = auto.
    pub threads: usize,
    /// Print per-stage wall-clock times to stderr.
    pub profiling: bool,
    /// WebGPU engine handle, required when `backend` is `Backend::WebGpu`.
    #[cfg(feature = "webgpu")]
    pub webgpu_engine: Option<std::sync::Arc<crate::webgpu::WebGpuEngine>>,
}

/// What one compression call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompressStats {
    pub input_len: usize,
    pub output_len: usize,
    pub literals: usize,
    pub copies: usize,
    pub index_time: Duration,
    pub match_time: Duration,
    pub resolve_time: Duration,
    pub encode_time: Duration,
}

impl CompressStats {
    /// Compressed size over original size (0.0 for empty input).
    pub fn ratio(&self) -> f64 {
        if self.input_len == 0 {
            0.0
        } else {
            self.output_len as f64 / self.input_len as f64
        }
    }

    /// Sum of all stage times.
    pub fn total_time(&self) -> Duration {
        self.index_time + self.match_time + self.resolve_time + self.encode_time
    }
}

/// Run one stage, reporting its wall-clock time when profiling.
fn timed<T>(profiling: bool, stage: &str, f: impl FnOnce() -> T) -> (T, Duration) {
    let t0 = Instant::now();
    let out = f();
    let elapsed = t0.elapsed();
    if profiling {
        let ms = elapsed.as_secs_f64() * 1000.0;
        eprintln!("[lzss] {stage}: {ms:.3} ms");
    }
    (out, elapsed)
}

fn check_input_len(input: &[u8]) -> LzssResult<()> {
    if input.len() > i32::MAX as usize {
        return Err(LzssError::InvalidInput);
    }
    Ok(())
}

/// Find candidates on the configured backend. GPU inputs outside the
/// device's useful range fall back to the CPU.
fn find_candidates(
    input: &[u8],
    index: &WindowIndex,
    options: &CompressOptions,
    threads: usize,
) -> LzssResult<Vec<MatchCandidate>> {
    #[cfg(feature = "webgpu")]
    {
        if let Backend::WebGpu = options.backend {
            let engine = options
                .webgpu_engine
                .as_ref()
                .ok_or(LzssError::Unsupported("WebGpu backend requires an engine"))?;
            if input.len() >= crate::webgpu::MIN_GPU_INPUT_SIZE
                && input.len() <= engine.max_dispatch_input_size()
            {
                return engine.find_matches(input, index, options.search_depth);
            }
        }
    }

    Ok(matcher::find_matches(
        input,
        index,
        threads,
        options.search_depth,
    ))
}

/// Index, match and resolve `input` into its token stream.
fn tokenize(
    input: &[u8],
    options: &CompressOptions,
    threads: usize,
    stats: &mut CompressStats,
) -> LzssResult<Vec<Token>> {
    let profiling = options.profiling;
    let (index, t) = timed(profiling, "index", || WindowIndex::build(input, threads));
    stats.index_time = t;

    let (candidates, t) = timed(profiling, "match", || {
        find_candidates(input, &index, options, threads)
    });
    stats.match_time = t;
    let candidates = candidates?;

    let (tokens, t) = timed(profiling, "resolve", || {
        resolve::resolve(input, &candidates, threads)
    });
    stats.resolve_time = t;
    let tokens = tokens?;

    stats.input_len = input.len();
    stats.copies = tokens.iter().filter(|t| t.is_copy()).count();
    stats.literals = tokens.len() - stats.copies;
    Ok(tokens)
}

/// Compress `input` with default options.
pub fn compress(input: &[u8]) -> LzssResult<Vec<u8>> {
    compress_with_options(input, &CompressOptions::default())
}

/// Compress `input` with explicit options.
///
/// The output is identical for every thread count and backend.
pub fn compress_with_options(input: &[u8], options: &CompressOptions) -> LzssResult<Vec<u8>> {
    compress_with_stats(input, options).map(|(output, _)| output)
}

/// Compress `input`, also returning token counts and per-stage times.
pub fn compress_with_stats(
    input: &[u8],
    options: &CompressOptions,
) -> LzssResult<(Vec<u8>, CompressStats)> {
    check_input_len(input)?;
    let threads = resolve_thread_count(options.threads);
    let mut stats = CompressStats::default();
    let tokens = tokenize(input, options, threads, &mut stats)?;

    let mut output = vec![0u8; encoded_len(&tokens)];
    let (written, t) = timed(options.profiling, "encode", || {
        encode_tokens(&tokens, &mut output, threads)
    });
    stats.encode_time = t;
    output.truncate(written?);
    stats.output_len = output.len();
    Ok((output, stats))
}

/// Compress `input` into a caller-supplied buffer, returning the number of
/// bytes written.
///
/// Fails with [`LzssError::BufferTooSmall`] before writing anything when the
/// stream does not fit. [`crate::format::compress_bound`] is always enough.
pub fn compress_to_buf(
    input: &[u8],
    output: &mut [u8],
    options: &CompressOptions,
) -> LzssResult<usize> {
    check_input_len(input)?;
    let threads = resolve_thread_count(options.threads);
    let mut stats = CompressStats::default();
    let tokens = tokenize(input, options, threads, &mut stats)?;
    let (written, _) = timed(options.profiling, "encode", || {
        encode_tokens(&tokens, output, threads)
    });
    written
}

/// Decompress `input` with default options.
pub fn decompress(input: &[u8]) -> LzssResult<Vec<u8>> {
    decompress_with_options(input, &DecompressOptions::default())
}

/// Scan tokens and resolve positions; returns the decoded length.
fn prepare(decoder: &mut Decoder<'_>, profiling: bool) -> LzssResult<usize> {
    timed(profiling, "scan", || decoder.scan_tokens()).0?;
    timed(profiling, "positions", || decoder.resolve_positions()).0
}

fn materialize(
    decoder: &mut Decoder<'_>,
    output: &mut [u8],
    options: &DecompressOptions,
    #[cfg_attr(not(feature = "webgpu"), allow(unused_variables))] threads: usize,
) -> LzssResult<usize> {
    #[cfg(feature = "webgpu")]
    {
        if let Backend::WebGpu = options.backend {
            let engine = options
                .webgpu_engine
                .as_ref()
                .ok_or(LzssError::Unsupported("WebGpu backend requires an engine"))?;
            let len = decoder.output_len();
            if len >= crate::webgpu::MIN_GPU_INPUT_SIZE && len <= engine.max_dispatch_input_size()
            {
                return timed(options.profiling, "materialize", || {
                    decoder.materialize_with(output, |tokens, positions, out| {
                        engine.materialize(tokens, positions, out, threads)
                    })
                })
                .0;
            }
        }
    }

    timed(options.profiling, "materialize", || decoder.materialize(output)).0
}

/// Decompress `input` with explicit options. The output is sized from the
/// token scan.
pub fn decompress_with_options(input: &[u8], options: &DecompressOptions) -> LzssResult<Vec<u8>> {
    check_input_len(input)?;
    let threads = resolve_thread_count(options.threads);
    let mut decoder = Decoder::new(input, threads);
    let len = prepare(&mut decoder, options.profiling)?;
    let mut output = vec![0u8; len];
    materialize(&mut decoder, &mut output, options, threads)?;
    Ok(output)
}

/// Decompress `input` into a caller-supplied buffer, returning the decoded
/// length.
///
/// Fails with [`LzssError::BufferTooSmall`] before writing anything when
/// the decoded data does not fit.
pub fn decompress_to_buf(
    input: &[u8],
    output: &mut [u8],
    options: &DecompressOptions,
) -> LzssResult<usize> {
    check_input_len(input)?;
    let threads = resolve_thread_count(options.threads);
    let mut decoder = Decoder::new(input, threads);
    prepare(&mut decoder, options.profiling)?;
    materialize(&mut decoder, output, options, threads)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::compress_bound;

    fn threads(n: usize) -> CompressOptions {
        CompressOptions {
            threads: n,
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_round_trip() {
        assert_eq!(compress(b"").unwrap(), Vec::<u8>::new());
        assert_eq!(decompress(b"").unwrap(), Vec::<u8>::new());
        let mut buf = [0u8; 4];
        assert_eq!(compress_to_buf(b"", &mut buf, &threads(1)), Ok(0));
        assert_eq!(
            decompress_to_buf(b"", &mut buf, &DecompressOptions::default()),
            Ok(0)
        );
    }

    #[test]
    fn test_round_trip_text() {
        let input = b"Sequential dependencies are expressed as prefix scans. \
            Sequential dependencies are expressed as prefix scans, again.";
        let compressed = compress(input).unwrap();
        assert!(compressed.len() < input.len());
        assert_eq!(decompress(&compressed).unwrap(), input.to_vec());
    }

    #[test]
    fn test_deterministic_across_threads() {
        let pattern = b"deterministic output for every lane count; ";
        let mut input: Vec<u8> = pattern.iter().copied().cycle().take(300_000).collect();
        for (i, b) in input.iter_mut().enumerate().step_by(97) {
            *b = (i % 251) as u8;
        }
        let reference = compress_with_options(&input, &threads(1)).unwrap();
        for n in [2, 3, 8] {
            assert_eq!(compress_with_options(&input, &threads(n)).unwrap(), reference);
        }
        for n in [1, 4] {
            let options = DecompressOptions {
                threads: n,
                ..Default::default()
            };
            assert_eq!(decompress_with_options(&reference, &options).unwrap(), input);
        }
    }

    #[test]
    fn test_compress_to_buf_too_small() {
        let input = b"abcdefghijklmnopqrstuvwxyz";
        let needed = compress(input).unwrap().len();
        let mut buf = vec![0x77u8; needed + 8];
        assert_eq!(
            compress_to_buf(input, &mut buf[..needed - 1], &threads(1)),
            Err(LzssError::BufferTooSmall {
                needed,
                capacity: needed - 1
            })
        );
        assert!(buf.iter().all(|&b| b == 0x77));
        assert_eq!(compress_to_buf(input, &mut buf, &threads(1)), Ok(needed));
    }

    #[test]
    fn test_decompress_to_buf_guard_bytes() {
        let input: Vec<u8> = b"guard ".iter().copied().cycle().take(600).collect();
        let compressed = compress(&input).unwrap();
        let mut buf = vec![0x33u8; 700];
        let err = decompress_to_buf(&compressed, &mut buf[..599], &DecompressOptions::default());
        assert_eq!(
            err,
            Err(LzssError::BufferTooSmall {
                needed: 600,
                capacity: 599
            })
        );
        assert!(buf.iter().all(|&b| b == 0x33));

        let n = decompress_to_buf(&compressed, &mut buf[..650], &DecompressOptions::default())
            .unwrap();
        assert_eq!(n, 600);
        assert_eq!(&buf[..600], &input[..]);
        assert!(buf[650..].iter().all(|&b| b == 0x33));
    }

    #[test]
    fn test_stats() {
        let input = b"abcabcabcX";
        let (output, stats) = compress_with_stats(input, &threads(1)).unwrap();
        assert_eq!(stats.input_len, 10);
        assert_eq!(stats.output_len, output.len());
        assert_eq!(stats.literals, 4);
        assert_eq!(stats.copies, 1);
        assert!((stats.ratio() - 0.8).abs() < 1e-9);
        assert_eq!(CompressStats::default().ratio(), 0.0);
    }

    #[test]
    fn test_search_depth_still_round_trips() {
        let input: Vec<u8> = (0..50_000u32)
            .map(|i| ((i * 7) % 13 + (i / 1000) % 5) as u8)
            .collect();
        let options = CompressOptions {
            search_depth: SearchDepth(Some(2)),
            ..Default::default()
        };
        let shallow = compress_with_options(&input, &options).unwrap();
        assert_eq!(decompress(&shallow).unwrap(), input);
    }

    #[test]
    fn test_bound_holds() {
        let input: Vec<u8> = (0..=255u8).collect();
        let compressed = compress(&input).unwrap();
        assert_eq!(compressed.len(), compress_bound(input.len()));
    }
}
