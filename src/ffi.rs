//! C-callable FFI layer.
//!
//! Two raw-buffer entry points plus a sizing helper. `*output_length` is the
//! output capacity on entry and the number of bytes produced on exit; on
//! failure it receives the negative status code, which is also returned.

use std::slice;

use crate::pipeline;
use crate::LzssError;

// Status codes of the C API
const LZSS_OK: i32 = 0;
const LZSS_ERROR_BUFFER_TOO_SMALL: i32 = -1;
const LZSS_ERROR_INVALID_INPUT: i32 = -2;
const LZSS_ERROR_CORRUPT_STREAM: i32 = -3;
const LZSS_ERROR_WINDOW_CONSTRAINT: i32 = -4;
const LZSS_ERROR_UNSUPPORTED: i32 = -5;

/// Convert an [`LzssError`] to an FFI status code.
fn error_to_code(e: &LzssError) -> i32 {
    match e {
        LzssError::BufferTooSmall { .. } => LZSS_ERROR_BUFFER_TOO_SMALL,
        LzssError::InvalidInput => LZSS_ERROR_INVALID_INPUT,
        LzssError::CorruptStream(_) => LZSS_ERROR_CORRUPT_STREAM,
        LzssError::WindowConstraintViolation { .. } => LZSS_ERROR_WINDOW_CONSTRAINT,
        LzssError::Unsupported(_) => LZSS_ERROR_UNSUPPORTED,
    }
}

/// Validate the raw arguments, run `op` over the resulting slices and
/// report through `output_length`.
///
/// # Safety
///
/// See [`lzss_compress`].
unsafe fn run_buffers<F>(
    input: *const u8,
    input_length: i32,
    output: *mut u8,
    output_length: *mut i32,
    op: F,
) -> i32
where
    F: FnOnce(&[u8], &mut [u8]) -> Result<usize, LzssError>,
{
    if output_length.is_null() {
        return LZSS_ERROR_INVALID_INPUT;
    }
    let capacity = *output_length;
    if input.is_null() || output.is_null() || input_length < 0 || capacity < 0 {
        *output_length = LZSS_ERROR_INVALID_INPUT;
        return LZSS_ERROR_INVALID_INPUT;
    }

    if input_length == 0 {
        *output_length = 0;
        return LZSS_OK;
    }

    let input_slice = slice::from_raw_parts(input, input_length as usize);
    let output_slice = slice::from_raw_parts_mut(output, capacity as usize);

    // Capacity is an i32, so any length that fits also fits the status.
    match op(input_slice, output_slice) {
        Ok(written) => {
            *output_length = written as i32;
            LZSS_OK
        }
        Err(e) => {
            let code = error_to_code(&e);
            *output_length = code;
            code
        }
    }
}

/// Compress `input_length` bytes from `input` into `output`.
///
/// Returns 0 on success and sets `*output_length` to the compressed size.
/// On failure both the return value and `*output_length` hold a negative
/// status code. Nothing past the capacity is ever written, and a too-small
/// buffer is detected before any write.
///
/// # Safety
///
/// - `input` must point to at least `input_length` readable bytes.
/// - `output_length` must be a valid, writable pointer.
/// - `output` must point to at least `*output_length` writable bytes.
#[no_mangle]
pub unsafe extern "C" fn lzss_compress(
    input: *const u8,
    input_length: i32,
    output: *mut u8,
    output_length: *mut i32,
) -> i32 {
    run_buffers(input, input_length, output, output_length, |src, dst| {
        pipeline::compress_to_buf(src, dst, &pipeline::CompressOptions::default())
    })
}

/// Decompress a stream produced by [`lzss_compress`].
///
/// Same conventions as [`lzss_compress`]; `*output_length` receives the
/// decoded size.
///
/// # Safety
///
/// Same requirements as [`lzss_compress`].
#[no_mangle]
pub unsafe extern "C" fn lzss_decompress(
    input: *const u8,
    input_length: i32,
    output: *mut u8,
    output_length: *mut i32,
) -> i32 {
    run_buffers(input, input_length, output, output_length, |src, dst| {
        pipeline::decompress_to_buf(src, dst, &pipeline::DecompressOptions::default())
    })
}

/// Output capacity that always suffices for [`lzss_compress`], or
/// `LZSS_ERROR_INVALID_INPUT` for a negative length or an overflowing bound.
#[no_mangle]
pub extern "C" fn lzss_compress_bound(input_length: i32) -> i32 {
    if input_length < 0 {
        return LZSS_ERROR_INVALID_INPUT;
    }
    i32::try_from(crate::format::compress_bound(input_length as usize))
        .unwrap_or(LZSS_ERROR_INVALID_INPUT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let pattern = b"hello, world! this is a test of compression. ";
        pattern.iter().copied().cycle().take(50 * pattern.len()).collect()
    }

    #[test]
    fn test_compress_decompress_ffi() {
        let input = sample();
        let mut compressed = vec![0u8; lzss_compress_bound(input.len() as i32) as usize];
        let mut decompressed = vec![0u8; input.len()];
        unsafe {
            let mut comp_len = compressed.len() as i32;
            let rc = lzss_compress(
                input.as_ptr(),
                input.len() as i32,
                compressed.as_mut_ptr(),
                &mut comp_len,
            );
            assert_eq!(rc, LZSS_OK);
            assert!(comp_len > 0 && (comp_len as usize) < input.len());

            let mut decomp_len = decompressed.len() as i32;
            let rc = lzss_decompress(
                compressed.as_ptr(),
                comp_len,
                decompressed.as_mut_ptr(),
                &mut decomp_len,
            );
            assert_eq!(rc, LZSS_OK);
            assert_eq!(decomp_len as usize, input.len());
        }
        assert_eq!(decompressed, input);
    }

    #[test]
    fn test_null_and_negative_arguments() {
        let mut out = [0u8; 16];
        unsafe {
            let mut len = 16;
            assert_eq!(
                lzss_compress(std::ptr::null(), 4, out.as_mut_ptr(), &mut len),
                LZSS_ERROR_INVALID_INPUT
            );
            assert_eq!(len, LZSS_ERROR_INVALID_INPUT);

            let mut len = 16;
            assert_eq!(
                lzss_compress(b"abcd".as_ptr(), -1, out.as_mut_ptr(), &mut len),
                LZSS_ERROR_INVALID_INPUT
            );

            let mut len = 16;
            assert_eq!(
                lzss_decompress(b"abcd".as_ptr(), 4, std::ptr::null_mut(), &mut len),
                LZSS_ERROR_INVALID_INPUT
            );

            assert_eq!(
                lzss_compress(b"abcd".as_ptr(), 4, out.as_mut_ptr(), std::ptr::null_mut()),
                LZSS_ERROR_INVALID_INPUT
            );
        }
    }

    #[test]
    fn test_empty_input_ffi() {
        let mut out = [0xFFu8; 4];
        unsafe {
            let mut len = 4;
            assert_eq!(lzss_compress(b"".as_ptr(), 0, out.as_mut_ptr(), &mut len), LZSS_OK);
            assert_eq!(len, 0);
            let mut len = 4;
            assert_eq!(lzss_decompress(b"".as_ptr(), 0, out.as_mut_ptr(), &mut len), LZSS_OK);
            assert_eq!(len, 0);
        }
        assert_eq!(out, [0xFF; 4]);
    }

    #[test]
    fn test_buffer_too_small_ffi() {
        let input = sample();
        let mut compressed = vec![0u8; input.len()];
        let mut guarded = vec![0xABu8; input.len()];
        unsafe {
            let mut comp_len = compressed.len() as i32;
            assert_eq!(
                lzss_compress(
                    input.as_ptr(),
                    input.len() as i32,
                    compressed.as_mut_ptr(),
                    &mut comp_len
                ),
                LZSS_OK
            );

            let mut small = 10;
            let rc = lzss_decompress(
                compressed.as_ptr(),
                comp_len,
                guarded.as_mut_ptr(),
                &mut small,
            );
            assert_eq!(rc, LZSS_ERROR_BUFFER_TOO_SMALL);
            assert_eq!(small, LZSS_ERROR_BUFFER_TOO_SMALL);

            let mut tiny = 1;
            let rc = lzss_compress(
                input.as_ptr(),
                input.len() as i32,
                guarded.as_mut_ptr(),
                &mut tiny,
            );
            assert_eq!(rc, LZSS_ERROR_BUFFER_TOO_SMALL);
        }
        assert!(guarded.iter().all(|&b| b == 0xAB));
    }

    #[test]
    fn test_corrupt_stream_ffi() {
        // Copy at output 1 reaching 2 bytes back.
        let stream = [0b10u8, b'a', 2, 0, 0];
        let mut out = [0u8; 32];
        unsafe {
            let mut len = out.len() as i32;
            let rc = lzss_decompress(stream.as_ptr(), stream.len() as i32, out.as_mut_ptr(), &mut len);
            assert_eq!(rc, LZSS_ERROR_CORRUPT_STREAM);
            assert_eq!(len, LZSS_ERROR_CORRUPT_STREAM);
        }
    }

    #[test]
    fn test_compress_bound_ffi() {
        assert_eq!(lzss_compress_bound(0), 0);
        assert_eq!(lzss_compress_bound(1), 2);
        assert_eq!(lzss_compress_bound(8), 9);
        assert_eq!(lzss_compress_bound(9), 11);
        assert_eq!(lzss_compress_bound(-3), LZSS_ERROR_INVALID_INPUT);
        assert_eq!(lzss_compress_bound(i32::MAX), LZSS_ERROR_INVALID_INPUT);
    }

    #[test]
    fn test_error_codes_distinct() {
        let codes = [
            error_to_code(&LzssError::BufferTooSmall {
                needed: 1,
                capacity: 0,
            }),
            error_to_code(&LzssError::InvalidInput),
            error_to_code(&LzssError::CorruptStream(crate::CorruptKind::EmptyGroup {
                at: 0,
            })),
            error_to_code(&LzssError::WindowConstraintViolation {
                position: 0,
                offset: 0,
                length: 0,
            }),
            error_to_code(&LzssError::Unsupported("x")),
        ];
        assert_eq!(codes, [-1, -2, -3, -4, -5]);
    }
}
