//! Round-trip and buffer-contract tests through the public API.

use lzss_gpu::format::compress_bound;
use lzss_gpu::{
    compress, compress_to_buf, compress_with_options, decompress, decompress_to_buf,
    decompress_with_options, CompressOptions, DecompressOptions, LzssError,
};
use proptest::prelude::*;
use rand::{rngs::StdRng, Rng, SeedableRng};

fn with_threads(threads: usize) -> (CompressOptions, DecompressOptions) {
    (
        CompressOptions {
            threads,
            ..Default::default()
        },
        DecompressOptions {
            threads,
            ..Default::default()
        },
    )
}

/// Random bytes from a small alphabet so matches are common.
fn low_entropy(rng: &mut StdRng, len: usize, alphabet: u8) -> Vec<u8> {
    (0..len).map(|_| rng.gen_range(0..alphabet)).collect()
}

#[test]
fn test_seeded_random_round_trip() {
    let mut rng = StdRng::seed_from_u64(0x1255);
    for &(len, alphabet) in &[(1usize, 255u8), (7, 2), (4097, 4), (65_536, 16), (300_000, 3)] {
        let input = low_entropy(&mut rng, len, alphabet);
        for threads in [1, 4] {
            let (c, d) = with_threads(threads);
            let compressed = compress_with_options(&input, &c).unwrap();
            assert!(compressed.len() <= compress_bound(input.len()));
            let output = decompress_with_options(&compressed, &d).unwrap();
            assert_eq!(output, input, "len {len}, threads {threads}");
        }
    }
}

#[test]
fn test_uniform_random_within_bound() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut input = vec![0u8; 200_000];
    rng.fill(&mut input[..]);
    let compressed = compress(&input).unwrap();
    assert!(compressed.len() <= compress_bound(input.len()));
    assert_eq!(decompress(&compressed).unwrap(), input);
}

#[test]
fn test_repeated_four_byte_pattern() {
    let input: Vec<u8> = b"WXYZ".repeat(10_000);
    let compressed = compress(&input).unwrap();
    assert!(
        compressed.len() * 50 < input.len(),
        "compressed to {} bytes",
        compressed.len()
    );
    assert_eq!(decompress(&compressed).unwrap(), input);
}

#[test]
fn test_deterministic_across_thread_counts() {
    let mut rng = StdRng::seed_from_u64(7);
    let input = low_entropy(&mut rng, 500_000, 8);
    let reference = compress_with_options(&input, &with_threads(1).0).unwrap();
    for threads in [2, 3, 8, 0] {
        assert_eq!(
            compress_with_options(&input, &with_threads(threads).0).unwrap(),
            reference,
            "threads {threads}"
        );
    }
}

#[test]
fn test_to_buf_exact_and_guarded() {
    let input = b"abracadabra, abracadabra, abracadabra".repeat(40);
    let mut buf = vec![0xEEu8; compress_bound(input.len()) + 16];
    let capacity = compress_bound(input.len());
    let n = compress_to_buf(&input, &mut buf[..capacity], &CompressOptions::default()).unwrap();
    assert!(buf[capacity..].iter().all(|&b| b == 0xEE));
    let compressed = buf[..n].to_vec();

    let mut out = vec![0x5Au8; input.len() + 8];
    let m =
        decompress_to_buf(&compressed, &mut out[..input.len()], &DecompressOptions::default())
            .unwrap();
    assert_eq!(m, input.len());
    assert_eq!(&out[..m], &input[..]);
    assert!(out[m..].iter().all(|&b| b == 0x5A));

    let mut short = vec![0x5Au8; input.len() - 1];
    assert!(matches!(
        decompress_to_buf(&compressed, &mut short, &DecompressOptions::default()),
        Err(LzssError::BufferTooSmall { .. })
    ));
    assert!(short.iter().all(|&b| b == 0x5A));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..6000)) {
        let compressed = compress(&data).unwrap();
        prop_assert!(compressed.len() <= compress_bound(data.len()));
        prop_assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn prop_round_trip_small_alphabet(
        data in proptest::collection::vec(0u8..3, 0..20_000),
        threads in 1usize..5,
    ) {
        let (c, d) = with_threads(threads);
        let compressed = compress_with_options(&data, &c).unwrap();
        prop_assert_eq!(decompress_with_options(&compressed, &d).unwrap(), data);
    }

    #[test]
    fn prop_decompress_never_panics(data in proptest::collection::vec(any::<u8>(), 0..2000)) {
        match decompress(&data) {
            Ok(_) | Err(LzssError::CorruptStream(_)) => {}
            Err(e) => prop_assert!(false, "unexpected error {e}"),
        }
    }
}
