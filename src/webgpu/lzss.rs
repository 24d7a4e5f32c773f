//! LZSS kernels: chain-walking match finding and pointer-jumping decode.

use super::*;
use crate::decode::token_containing;
use crate::format::{Token, MAX_MATCH, MIN_MATCH, WINDOW_SIZE};
use crate::index::{WindowIndex, NO_LINK};
use crate::matcher::{MatchCandidate, SearchDepth};
use crate::scan;

/// Uniform block for `find_matches` (must match `Params` in lzss_match.wgsl).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct MatchParams {
    input_len: u32,
    window: u32,
    min_match: u32,
    max_match: u32,
    search_depth: u32,
    dispatch_width: u32,
    linked_len: u32,
    _pad: u32,
}

// SAFETY: MatchParams is repr(C) with all-u32 fields, which are Pod/Zeroable.
unsafe impl bytemuck::Pod for MatchParams {}
unsafe impl bytemuck::Zeroable for MatchParams {}

/// Uniform block for `jump` and `gather` (must match lzss_decode.wgsl).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
struct DecodeParams {
    len: u32,
    dispatch_width: u32,
    _pad0: u32,
    _pad1: u32,
}

// SAFETY: DecodeParams is repr(C) with all-u32 fields, which are Pod/Zeroable.
unsafe impl bytemuck::Pod for DecodeParams {}
unsafe impl bytemuck::Zeroable for DecodeParams {}

/// Fill `chunk`, which covers output bytes `start..start + chunk.len()`,
/// with the source position of every byte.
fn fill_sources(tokens: &[Token], positions: &[usize], start: usize, chunk: &mut [u32]) {
    let end = start + chunk.len();
    let mut t = token_containing(positions, start);
    while t < tokens.len() && positions[t] < end {
        let p = positions[t];
        let lo = p.max(start);
        let hi = (p + tokens[t].output_len()).min(end);
        let back = match tokens[t] {
            Token::Literal(_) => 0,
            Token::Copy { offset, .. } => offset as usize,
        };
        for i in lo..hi {
            chunk[i - start] = (i - back) as u32;
        }
        t += 1;
    }
}

/// Fill `chunk` with the literal bytes that land in it; copy bytes stay 0.
fn fill_literals(tokens: &[Token], positions: &[usize], start: usize, chunk: &mut [u8]) {
    let end = start + chunk.len();
    let mut t = token_containing(positions, start);
    while t < tokens.len() && positions[t] < end {
        if let Token::Literal(b) = tokens[t] {
            if positions[t] >= start {
                chunk[positions[t] - start] = b;
            }
        }
        t += 1;
    }
}

/// Per-byte source map and literal seed bytes for the pointer-jumping
/// kernel, both built in parallel over output chunks.
pub(crate) fn source_map(
    tokens: &[Token],
    positions: &[usize],
    out_len: usize,
    threads: usize,
) -> (Vec<u32>, Vec<u8>) {
    let mut sources = vec![0u32; out_len];
    let mut literals = vec![0u8; out_len];
    if out_len == 0 {
        return (sources, literals);
    }
    scan::par_chunks_mut(&mut sources, threads, |start, chunk| {
        fill_sources(tokens, positions, start, chunk)
    });
    scan::par_chunks_mut(&mut literals, threads, |start, chunk| {
        fill_literals(tokens, positions, start, chunk)
    });
    (sources, literals)
}

/// Pointer-jumping rounds needed to resolve chains over `n` bytes.
pub(crate) fn jump_rounds(n: usize) -> u32 {
    if n <= 1 {
        0
    } else {
        usize::BITS - (n - 1).leading_zeros()
    }
}

impl WebGpuEngine {
    /// Find the best match for every position of `input` on the device.
    ///
    /// `index` must have been built over `input`. Results are identical to
    /// [`crate::matcher::find_matches`] with the same search depth.
    pub fn find_matches(
        &self,
        input: &[u8],
        index: &WindowIndex,
        depth: SearchDepth,
    ) -> LzssResult<Vec<MatchCandidate>> {
        if input.is_empty() {
            return Ok(Vec::new());
        }
        if input.len() > self.max_dispatch_input_size() {
            return Err(LzssError::Unsupported("input exceeds device dispatch limit"));
        }
        if index.len() != input.len().saturating_sub(MIN_MATCH - 1) {
            return Err(LzssError::InvalidInput);
        }

        let t0 = self.profiling.then(std::time::Instant::now);
        let input_len = input.len();
        let padded = Self::pad_input_bytes(input);
        // Zero-sized bindings are not allowed.
        let links: &[u32] = if index.is_empty() {
            &[NO_LINK]
        } else {
            index.links()
        };

        let workgroups = (input_len as u32).div_ceil(WORKGROUP_SIZE);
        let params = MatchParams {
            input_len: input_len as u32,
            window: WINDOW_SIZE as u32,
            min_match: MIN_MATCH as u32,
            max_match: MAX_MATCH as u32,
            search_depth: depth.0.map_or(u32::MAX, |d| d.min(u32::MAX as usize) as u32),
            dispatch_width: self.dispatch_width(workgroups),
            linked_len: index.len() as u32,
            _pad: 0,
        };
        let match_buf_size = (input_len * std::mem::size_of::<GpuCandidate>()) as u64;

        let input_buf =
            self.create_buffer_init("lzss_input", &padded, wgpu::BufferUsages::STORAGE);
        let prev_buf = self.create_buffer_init(
            "lzss_prev",
            bytemuck::cast_slice(links),
            wgpu::BufferUsages::STORAGE,
        );
        let params_buf = self.create_buffer_init(
            "lzss_match_params",
            bytemuck::bytes_of(&params),
            wgpu::BufferUsages::UNIFORM,
        );
        let match_buf = self.create_buffer(
            "lzss_matches",
            match_buf_size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let staging_buf = self.create_buffer(
            "lzss_matches_staging",
            match_buf_size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let pipeline = &self.match_pipelines().find;
        let bg_layout = pipeline.get_bind_group_layout(0);
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lzss_find_matches_bg"),
            layout: &bg_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: input_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: prev_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: match_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lzss_find_matches"),
            });
        self.record_dispatch(
            &mut encoder,
            pipeline,
            &bind_group,
            workgroups,
            "lzss_find_matches",
        )?;
        encoder.copy_buffer_to_buffer(&match_buf, 0, &staging_buf, 0, match_buf_size);
        self.queue.submit(Some(encoder.finish()));

        let raw = self.read_staging(&staging_buf)?;
        if let Some(t0) = t0 {
            let ms = t0.elapsed().as_secs_f64() * 1000.0;
            eprintln!("[lzss-gpu] find_matches: {ms:.3} ms");
        }

        let gpu: &[GpuCandidate] = bytemuck::cast_slice(&raw);
        Ok(gpu
            .iter()
            .map(|c| MatchCandidate {
                offset: c.offset as u16,
                length: c.length as u16,
            })
            .collect())
    }

    /// Write the decoded bytes for already validated `tokens` into `out`,
    /// which must be exactly the decoded length.
    pub fn materialize(
        &self,
        tokens: &[Token],
        positions: &[usize],
        out: &mut [u8],
        threads: usize,
    ) -> LzssResult<()> {
        let n = out.len();
        if n == 0 {
            return Ok(());
        }
        if n > self.max_dispatch_input_size() {
            return Err(LzssError::Unsupported("output exceeds device dispatch limit"));
        }

        let t0 = self.profiling.then(std::time::Instant::now);
        let (sources, literals) = source_map(tokens, positions, n, threads);
        let literals = Self::pad_input_bytes(&literals);
        let src_size = (n * std::mem::size_of::<u32>()) as u64;
        let words = n.div_ceil(4);
        let out_size = (words * 4) as u64;

        let src_a = self.create_buffer_init(
            "lzss_src_a",
            bytemuck::cast_slice(&sources),
            wgpu::BufferUsages::STORAGE,
        );
        let src_b = self.create_buffer("lzss_src_b", src_size, wgpu::BufferUsages::STORAGE);
        let literal_buf =
            self.create_buffer_init("lzss_literals", &literals, wgpu::BufferUsages::STORAGE);
        let out_buf = self.create_buffer(
            "lzss_output",
            out_size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        );
        let staging_buf = self.create_buffer(
            "lzss_output_staging",
            out_size,
            wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        );

        let jump_workgroups = (n as u32).div_ceil(WORKGROUP_SIZE);
        let jump_params = DecodeParams {
            len: n as u32,
            dispatch_width: self.dispatch_width(jump_workgroups),
            ..Default::default()
        };
        let gather_workgroups = (words as u32).div_ceil(WORKGROUP_SIZE);
        let gather_params = DecodeParams {
            len: n as u32,
            dispatch_width: self.dispatch_width(gather_workgroups),
            ..Default::default()
        };
        let jump_params_buf = self.create_buffer_init(
            "lzss_jump_params",
            bytemuck::bytes_of(&jump_params),
            wgpu::BufferUsages::UNIFORM,
        );
        let gather_params_buf = self.create_buffer_init(
            "lzss_gather_params",
            bytemuck::bytes_of(&gather_params),
            wgpu::BufferUsages::UNIFORM,
        );

        let pipelines = self.decode_pipelines();
        let jump_layout = pipelines.jump.get_bind_group_layout(0);
        let jump_bind = |from: &wgpu::Buffer, to: &wgpu::Buffer, label: &str| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &jump_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: from.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: to.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: jump_params_buf.as_entire_binding(),
                    },
                ],
            })
        };
        let a_to_b = jump_bind(&src_a, &src_b, "lzss_jump_ab_bg");
        let b_to_a = jump_bind(&src_b, &src_a, "lzss_jump_ba_bg");

        let rounds = jump_rounds(n);
        let roots = if rounds % 2 == 0 { &src_a } else { &src_b };
        let gather_layout = pipelines.gather.get_bind_group_layout(0);
        let gather_bg = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("lzss_gather_bg"),
            layout: &gather_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: roots.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: gather_params_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: literal_buf.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: out_buf.as_entire_binding(),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("lzss_materialize"),
            });
        for round in 0..rounds {
            let bind_group = if round % 2 == 0 { &a_to_b } else { &b_to_a };
            self.record_dispatch(
                &mut encoder,
                &pipelines.jump,
                bind_group,
                jump_workgroups,
                "lzss_jump",
            )?;
        }
        self.record_dispatch(
            &mut encoder,
            &pipelines.gather,
            &gather_bg,
            gather_workgroups,
            "lzss_gather",
        )?;
        encoder.copy_buffer_to_buffer(&out_buf, 0, &staging_buf, 0, out_size);
        self.queue.submit(Some(encoder.finish()));

        let data = self.read_staging(&staging_buf)?;
        out.copy_from_slice(&data[..n]);
        if let Some(t0) = t0 {
            let ms = t0.elapsed().as_secs_f64() * 1000.0;
            eprintln!("[lzss-gpu] materialize ({rounds} rounds): {ms:.3} ms");
        }
        Ok(())
    }
}
