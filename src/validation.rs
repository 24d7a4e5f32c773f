//! Validation tests across the whole codec.
//!
//! These tests verify:
//! 1. **Round-trip correctness** on a broad set of vectors, at several
//!    thread counts
//! 2. **Phase equivalence**: every parallel phase matches its sequential
//!    reference
//! 3. **Format properties**: size bounds, window edge, determinism
//! 4. **Corruption handling**: damaged streams fail cleanly
#[cfg(test)]
mod tests {
    use crate::decode;
    use crate::encode;
    use crate::format::{compress_bound, Token, MAX_MATCH, WINDOW_SIZE};
    use crate::index::WindowIndex;
    use crate::matcher::{self, SearchDepth};
    use crate::pipeline::{self, CompressOptions, DecompressOptions};
    use crate::resolve;
    use crate::{CorruptKind, LzssError};

    // ---------------------------------------------------------------
    // Helper: generate diverse test vectors
    // ---------------------------------------------------------------

    /// Highly compressible: single byte repeated.
    fn data_all_zeros(n: usize) -> Vec<u8> {
        vec![0u8; n]
    }

    /// Incompressible: every byte value once.
    fn data_uniform() -> Vec<u8> {
        (0..=255u8).collect()
    }

    /// Repetitive text with structure.
    fn data_repeating_text() -> Vec<u8> {
        let pattern = b"the quick brown fox jumps over the lazy dog. ";
        pattern.iter().copied().cycle().take(100 * pattern.len()).collect()
    }

    /// Binary data with some structure (sawtooth).
    fn data_sawtooth(n: usize) -> Vec<u8> {
        (0..n).map(|i| (i % 256) as u8).collect()
    }

    /// Noise with a few long runs, large enough for several lanes.
    fn data_mixed(n: usize) -> Vec<u8> {
        let mut x = 0x2545_f491u32;
        let mut v = Vec::with_capacity(n + 1024);
        while v.len() < n {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            if x % 7 == 0 {
                let run = (x >> 8) as usize % 900;
                v.extend(std::iter::repeat((x >> 3) as u8).take(run));
            } else if x % 5 == 0 && v.len() > 5000 {
                // Re-copy an earlier slice from within the window.
                let back = (x >> 4) as usize % WINDOW_SIZE + 1;
                let len = (x >> 20) as usize % 300;
                let start = v.len() - back;
                for j in 0..len {
                    let b = v[start + j];
                    v.push(b);
                }
            } else {
                v.push((x >> 24) as u8);
            }
        }
        v.truncate(n);
        v
    }

    fn options(threads: usize) -> CompressOptions {
        CompressOptions {
            threads,
            ..Default::default()
        }
    }

    fn decompress_threads(input: &[u8], threads: usize) -> Vec<u8> {
        pipeline::decompress_with_options(
            input,
            &DecompressOptions {
                threads,
                ..Default::default()
            },
        )
        .unwrap()
    }

    // ---------------------------------------------------------------
    // 1. Round-trip validation
    // ---------------------------------------------------------------

    macro_rules! round_trip_test {
        ($name:ident, $data:expr) => {
            mod $name {
                use super::*;

                #[test]
                fn single_lane() {
                    let input = $data;
                    let compressed = pipeline::compress_with_options(&input, &options(1)).unwrap();
                    assert_eq!(decompress_threads(&compressed, 1), input);
                }

                #[test]
                fn many_lanes() {
                    let input = $data;
                    let compressed = pipeline::compress_with_options(&input, &options(6)).unwrap();
                    assert_eq!(decompress_threads(&compressed, 6), input);
                }
            }
        };
    }

    round_trip_test!(rt_zeros, data_all_zeros(100_000));
    round_trip_test!(rt_uniform, data_uniform());
    round_trip_test!(rt_text, data_repeating_text());
    round_trip_test!(rt_sawtooth, data_sawtooth(70_000));
    round_trip_test!(rt_mixed, data_mixed(400_000));
    round_trip_test!(rt_single_byte, vec![42u8]);
    round_trip_test!(rt_two_bytes, b"ab".to_vec());

    // ---------------------------------------------------------------
    // 2. Phase equivalence
    // ---------------------------------------------------------------

    mod equivalence {
        use super::*;

        #[test]
        fn parallel_index_matches_sequential() {
            let input = data_mixed(300_000);
            assert_eq!(
                WindowIndex::build(&input, 5),
                WindowIndex::build_sequential(&input)
            );
        }

        #[test]
        fn parallel_resolver_matches_sequential() {
            let input = data_mixed(300_000);
            let index = WindowIndex::build(&input, 4);
            let candidates = matcher::find_matches(&input, &index, 4, SearchDepth::default());
            assert_eq!(
                resolve::resolve(&input, &candidates, 7).unwrap(),
                resolve::resolve_sequential(&input, &candidates).unwrap()
            );
        }

        #[test]
        fn parallel_encoder_matches_sequential() {
            let input = data_mixed(300_000);
            let index = WindowIndex::build_sequential(&input);
            let candidates = matcher::find_matches(&input, &index, 1, SearchDepth::default());
            let tokens = resolve::resolve_sequential(&input, &candidates).unwrap();
            assert_eq!(
                encode::encode_tokens_to_vec(&tokens, 8).unwrap(),
                encode::encode_tokens_to_vec(&tokens, 1).unwrap()
            );
        }

        #[test]
        fn parallel_materializer_matches_sequential() {
            let compressed = pipeline::compress(&data_mixed(500_000)).unwrap();
            assert_eq!(
                decode::decode(&compressed, 8).unwrap(),
                decode::decode(&compressed, 1).unwrap()
            );
        }

        #[test]
        fn resolved_tokens_are_greedy() {
            // Every copy is the longest in-window match at its position.
            let input = data_repeating_text();
            let index = WindowIndex::build_sequential(&input);
            let candidates = matcher::find_matches(&input, &index, 1, SearchDepth::default());
            let tokens = resolve::resolve_sequential(&input, &candidates).unwrap();
            let mut pos = 0;
            for token in &tokens {
                let best = matcher::find_match(&input, &index, pos, SearchDepth::default());
                match *token {
                    Token::Literal(b) => {
                        assert!(!best.is_match());
                        assert_eq!(b, input[pos]);
                    }
                    Token::Copy { offset, length } => {
                        assert_eq!((offset, length), (best.offset, best.length));
                    }
                }
                pos += token.output_len();
            }
            assert_eq!(pos, input.len());
        }
    }

    // ---------------------------------------------------------------
    // 3. Format properties
    // ---------------------------------------------------------------

    mod properties {
        use super::*;

        #[test]
        fn empty_input() {
            assert!(pipeline::compress(&[]).unwrap().is_empty());
            assert!(pipeline::decompress(&[]).unwrap().is_empty());
        }

        #[test]
        fn incompressible_within_bound() {
            for input in [data_uniform(), data_sawtooth(256)] {
                let compressed = pipeline::compress(&input).unwrap();
                assert!(compressed.len() <= compress_bound(input.len()));
            }
        }

        #[test]
        fn repeated_pattern_shrinks() {
            let input: Vec<u8> = b"ABCD".iter().copied().cycle().take(40_000).collect();
            let compressed = pipeline::compress(&input).unwrap();
            assert!(compressed.len() * 50 < input.len(), "{}", compressed.len());
            assert_eq!(pipeline::decompress(&compressed).unwrap(), input);
        }

        #[test]
        fn long_run_uses_max_match() {
            let input = data_all_zeros(1 + 10 * MAX_MATCH);
            let index = WindowIndex::build_sequential(&input);
            let candidates = matcher::find_matches(&input, &index, 1, SearchDepth::default());
            let tokens = resolve::resolve_sequential(&input, &candidates).unwrap();
            assert_eq!(tokens.len(), 11);
            assert!(tokens[1..].iter().all(|t| *t
                == Token::Copy {
                    offset: 1,
                    length: MAX_MATCH as u16
                }));
        }

        #[test]
        fn match_at_window_edge() {
            let mut input = b"QRST".to_vec();
            input.extend((0..WINDOW_SIZE - 4).map(|i| (i % 26) as u8 + b'a'));
            input.extend_from_slice(b"QRST");
            let index = WindowIndex::build_sequential(&input);
            let candidates = matcher::find_matches(&input, &index, 1, SearchDepth::default());
            let tokens = resolve::resolve_sequential(&input, &candidates).unwrap();
            assert!(tokens.contains(&Token::Copy {
                offset: WINDOW_SIZE as u16,
                length: 4
            }));
            let compressed = pipeline::compress(&input).unwrap();
            assert_eq!(pipeline::decompress(&compressed).unwrap(), input);
        }

        #[test]
        fn never_beyond_window() {
            // Same prefix just past the window: must stay literal.
            let mut input = b"QRST".to_vec();
            input.extend((0..WINDOW_SIZE - 3).map(|i| (i % 26) as u8 + b'a'));
            input.extend_from_slice(b"QRST");
            let index = WindowIndex::build_sequential(&input);
            let candidates = matcher::find_matches(&input, &index, 1, SearchDepth::default());
            let tokens = resolve::resolve_sequential(&input, &candidates).unwrap();
            assert!(tokens.iter().all(|t| match *t {
                Token::Copy { offset, .. } => (offset as usize) <= WINDOW_SIZE,
                Token::Literal(_) => true,
            }));
            assert_eq!(*tokens.last().unwrap(), Token::Literal(b'T'));
        }

        #[test]
        fn deterministic_across_runs_and_threads() {
            let input = data_mixed(250_000);
            let first = pipeline::compress_with_options(&input, &options(3)).unwrap();
            assert_eq!(pipeline::compress_with_options(&input, &options(3)).unwrap(), first);
            assert_eq!(pipeline::compress_with_options(&input, &options(1)).unwrap(), first);
            assert_eq!(pipeline::compress_with_options(&input, &options(0)).unwrap(), first);
        }
    }

    // ---------------------------------------------------------------
    // 4. Corruption handling
    // ---------------------------------------------------------------

    mod corruption {
        use super::*;

        #[test]
        fn offset_past_output_start() {
            let mut compressed = pipeline::compress(&data_repeating_text()).unwrap();
            // Walk the leading literal groups to the first copy payload.
            let mut at = 0;
            let mut position = 0;
            let payload = 'groups: loop {
                let ctrl = compressed[at];
                at += 1;
                for k in 0..8 {
                    if (ctrl >> k) & 1 == 1 {
                        break 'groups at;
                    }
                    at += 1;
                    position += 1;
                }
            };
            compressed[payload..payload + 2].copy_from_slice(&(position as u16 + 1).to_le_bytes());
            assert_eq!(
                pipeline::decompress(&compressed),
                Err(LzssError::CorruptStream(
                    CorruptKind::InvalidBackReference {
                        position,
                        offset: position + 1
                    }
                ))
            );
        }

        #[test]
        fn truncation_is_detected_or_shorter() {
            let input = data_repeating_text();
            let compressed = pipeline::compress(&input).unwrap();
            for cut in 1..compressed.len().min(64) {
                match pipeline::decompress(&compressed[..compressed.len() - cut]) {
                    Ok(out) => assert!(out.len() < input.len()),
                    Err(LzssError::CorruptStream(_)) => {}
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }
        }

        #[test]
        fn garbage_never_panics() {
            let mut x = 7u32;
            for len in [1usize, 2, 3, 17, 255, 4096] {
                let garbage: Vec<u8> = (0..len)
                    .map(|_| {
                        x = x.wrapping_mul(1_103_515_245).wrapping_add(12345);
                        (x >> 16) as u8
                    })
                    .collect();
                let _ = pipeline::decompress(&garbage);
            }
        }
    }
}
