//! WebGPU (wgpu) backend.
//!
//! Runs the two widest phases on a compute device: per-position match
//! finding over the window index, and decode materialization by pointer
//! jumping. The window index itself is built on the CPU and uploaded.
//!
//! # Feature Gate
//!
//! This module is only available when compiled with the `webgpu` feature:
//! ```bash
//! cargo build --features webgpu
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! # #[cfg(feature = "webgpu")]
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use lzss_gpu::index::WindowIndex;
//! use lzss_gpu::matcher::SearchDepth;
//! use lzss_gpu::webgpu::WebGpuEngine;
//!
//! let engine = WebGpuEngine::new()?;
//! println!("Using device: {}", engine.device_name());
//!
//! let input = b"hello world hello world";
//! let index = WindowIndex::build(input, 0);
//! let candidates = engine.find_matches(input, &index, SearchDepth::default())?;
//! # Ok(())
//! # }
//! ```

use crate::{LzssError, LzssResult};

use std::sync::OnceLock;

use wgpu::util::DeviceExt;

mod lzss;


/// Embedded WGSL kernel source: chain-walking match finder.
const LZSS_MATCH_KERNEL_SOURCE: &str = include_str!("../../kernels/lzss_match.wgsl");

/// Embedded WGSL kernel source: pointer-jumping decode.
const LZSS_DECODE_KERNEL_SOURCE: &str = include_str!("../../kernels/lzss_decode.wgsl");

/// Workgroup size shared by every kernel (must match `@workgroup_size`).
const WORKGROUP_SIZE: u32 = 64;

/// Minimum input size below which GPU overhead exceeds benefit.
pub const MIN_GPU_INPUT_SIZE: usize = 64 * 1024; // 64KB

/// Per-position match result, matching the WGSL `Candidate` layout.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct GpuCandidate {
    offset: u32,
    length: u32,
}

// SAFETY: GpuCandidate is repr(C) with all-u32 fields, which are Pod/Zeroable.
unsafe impl bytemuck::Pod for GpuCandidate {}
unsafe impl bytemuck::Zeroable for GpuCandidate {}

/// Information about a discovered WebGPU device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    /// Human-readable device name.
    pub name: String,
    /// Device vendor string.
    pub vendor: String,
    /// Whether this is a discrete or integrated GPU.
    pub is_gpu: bool,
    /// Maximum workgroup size.
    pub max_work_group_size: usize,
}

/// Probe all available WebGPU devices without creating an engine.
pub fn probe_devices() -> Vec<DeviceInfo> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    instance
        .enumerate_adapters(wgpu::Backends::all())
        .into_iter()
        .map(|adapter| {
            let info = adapter.get_info();
            let limits = adapter.limits();
            DeviceInfo {
                name: info.name.clone(),
                vendor: format!("{:?}", info.vendor),
                is_gpu: matches!(
                    info.device_type,
                    wgpu::DeviceType::DiscreteGpu | wgpu::DeviceType::IntegratedGpu
                ),
                max_work_group_size: limits.max_compute_workgroup_size_x as usize,
            }
        })
        .collect()
}

/// Match-finding pipeline (1 pipeline from lzss_match.wgsl).
struct MatchPipelines {
    find: wgpu::ComputePipeline,
}

/// Decode pipelines (2 pipelines from lzss_decode.wgsl).
struct DecodePipelines {
    jump: wgpu::ComputePipeline,
    gather: wgpu::ComputePipeline,
}

/// WebGPU compute engine.
///
/// Manages the wgpu device, queue, and lazily-compiled compute pipelines.
/// Create one engine up front and share it (behind an `Arc`) across calls.
pub struct WebGpuEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    lzss_match: OnceLock<MatchPipelines>,
    lzss_decode: OnceLock<DecodePipelines>,
    device_name: String,
    max_work_group_size: usize,
    /// Maximum workgroups per dispatch dimension (typically 65535).
    max_workgroups_per_dim: u32,
    is_cpu: bool,
    /// Largest storage buffer the device can bind, in bytes.
    max_buffer_size: u64,
    /// Print wall-clock timings of device work to stderr.
    profiling: bool,
}

impl std::fmt::Debug for WebGpuEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebGpuEngine")
            .field("device_name", &self.device_name)
            .field("max_work_group_size", &self.max_work_group_size)
            .finish_non_exhaustive()
    }
}

impl WebGpuEngine {
    /// Create a new engine, selecting the best available GPU device.
    pub fn new() -> LzssResult<Self> {
        Self::create(true, false)
    }

    /// Create a new engine with explicit GPU preference.
    pub fn with_device_preference(prefer_gpu: bool) -> LzssResult<Self> {
        Self::create(prefer_gpu, false)
    }

    /// Create a new engine that reports kernel timings to stderr.
    pub fn with_profiling(profiling: bool) -> LzssResult<Self> {
        Self::create(true, profiling)
    }

    fn create(prefer_gpu: bool, profiling: bool) -> LzssResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_pref = if prefer_gpu {
            wgpu::PowerPreference::HighPerformance
        } else {
            wgpu::PowerPreference::None
        };

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: power_pref,
            force_fallback_adapter: false,
            compatible_surface: None,
        }))
        .map_err(|_| LzssError::Unsupported("no WebGPU adapter"))?;

        let info = adapter.get_info();
        let device_name = info.name.clone();
        let is_cpu = matches!(info.device_type, wgpu::DeviceType::Cpu);

        // Software adapters are too slow for compute work when a GPU was asked for.
        if prefer_gpu && is_cpu {
            return Err(LzssError::Unsupported("only a software adapter is available"));
        }

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("lzss-webgpu"),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            trace: wgpu::Trace::Off,
        }))
        .map_err(|_| LzssError::Unsupported("WebGPU device request failed"))?;

        // Dispatch sizing must follow what the device granted, not the adapter.
        let limits = device.limits();
        let max_work_group_size = limits.max_compute_workgroup_size_x as usize;
        let max_workgroups_per_dim = limits.max_compute_workgroups_per_dimension;
        let max_buffer_size =
            u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);

        // Pipeline compilation is deferred to first use.
        Ok(WebGpuEngine {
            device,
            queue,
            lzss_match: OnceLock::new(),
            lzss_decode: OnceLock::new(),
            device_name,
            max_work_group_size,
            max_workgroups_per_dim,
            is_cpu,
            max_buffer_size,
            profiling,
        })
    }

    /// Return the name of the selected compute device.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Return the maximum work-group size for the device.
    pub fn max_work_group_size(&self) -> usize {
        self.max_work_group_size
    }

    /// Check if the selected device is a CPU (not a GPU or accelerator).
    pub fn is_cpu_device(&self) -> bool {
        self.is_cpu
    }

    /// Whether profiling is enabled on this engine.
    pub fn profiling(&self) -> bool {
        self.profiling
    }

    /// Largest input (compressed or decoded) one dispatch can cover.
    ///
    /// Bounded by the 2D workgroup dispatch limit and by the largest per-byte
    /// buffer: 8 bytes per position for match results, 4 bytes per output
    /// byte for the decode source map.
    pub fn max_dispatch_input_size(&self) -> usize {
        let dispatch_limit = {
            let max = self.max_workgroups_per_dim as usize;
            max * max * WORKGROUP_SIZE as usize
        };
        let buffer_limit = usize::try_from(
            self.max_buffer_size / std::mem::size_of::<GpuCandidate>() as u64,
        )
        .unwrap_or(usize::MAX);
        dispatch_limit.min(buffer_limit)
    }

    /// Compute the X dispatch width in invocations for 2D tiling.
    /// Kernels use `gid.x + gid.y * dispatch_width` to linearize.
    fn dispatch_width(&self, workgroups_x: u32) -> u32 {
        workgroups_x.min(self.max_workgroups_per_dim) * WORKGROUP_SIZE
    }

    fn create_buffer_init(
        &self,
        label: &str,
        data: &[u8],
        usage: wgpu::BufferUsages,
    ) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: data,
                usage,
            })
    }

    fn create_buffer(&self, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage,
            mapped_at_creation: false,
        })
    }

    /// Map a staging buffer that a submitted copy has filled and read it out.
    fn read_staging(&self, staging: &wgpu::Buffer) -> LzssResult<Vec<u8>> {
        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        rx.recv()
            .map_err(|_| LzssError::Unsupported("device lost during readback"))?
            .map_err(|_| LzssError::Unsupported("staging buffer map failed"))?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    /// Compute 2D tiling dimensions for a given workgroup count.
    fn tile_workgroups(&self, workgroups_x: u32) -> LzssResult<(u32, u32)> {
        let max = self.max_workgroups_per_dim;
        if workgroups_x <= max {
            Ok((workgroups_x, 1u32))
        } else {
            let wy = workgroups_x.div_ceil(max);
            if wy > max {
                return Err(LzssError::Unsupported("dispatch exceeds device limits"));
            }
            Ok((max, wy))
        }
    }

    /// Record a compute pass into an existing command encoder (no submit).
    fn record_dispatch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pipeline: &wgpu::ComputePipeline,
        bind_group: &wgpu::BindGroup,
        workgroups_x: u32,
        label: &str,
    ) -> LzssResult<()> {
        let (wx, wy) = self.tile_workgroups(workgroups_x)?;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(wx, wy, 1);
        Ok(())
    }

    /// Pad bytes to u32 alignment plus one spare word, for WGSL word reads.
    fn pad_input_bytes(input: &[u8]) -> Vec<u8> {
        let mut padded = input.to_vec();
        let target = ((input.len() + 3) & !3) + 4;
        padded.resize(target, 0);
        padded
    }

    /// Helper: create a compute pipeline for one entry point of a module.
    fn make_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        label: &str,
        entry: &str,
    ) -> wgpu::ComputePipeline {
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                cache: None,
            })
    }

    fn make_module(&self, label: &str, source: &str) -> wgpu::ShaderModule {
        self.device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            })
    }

    fn match_pipelines(&self) -> &MatchPipelines {
        self.lzss_match.get_or_init(|| {
            let t0 = std::time::Instant::now();
            let module = self.make_module("lzss_match", LZSS_MATCH_KERNEL_SOURCE);
            let group = MatchPipelines {
                find: self.make_pipeline(&module, "lzss_find_matches", "find_matches"),
            };
            if self.profiling {
                let ms = t0.elapsed().as_secs_f64() * 1000.0;
                eprintln!("[lzss-gpu] compile lzss_match.wgsl: {ms:.3} ms");
            }
            group
        })
    }

    fn decode_pipelines(&self) -> &DecodePipelines {
        self.lzss_decode.get_or_init(|| {
            let t0 = std::time::Instant::now();
            let module = self.make_module("lzss_decode", LZSS_DECODE_KERNEL_SOURCE);
            let group = DecodePipelines {
                jump: self.make_pipeline(&module, "lzss_jump", "jump"),
                gather: self.make_pipeline(&module, "lzss_gather", "gather"),
            };
            if self.profiling {
                let ms = t0.elapsed().as_secs_f64() * 1000.0;
                eprintln!("[lzss-gpu] compile lzss_decode.wgsl: {ms:.3} ms");
            }
            group
        })
    }
}
