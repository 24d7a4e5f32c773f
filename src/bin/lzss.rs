//! lzss – CLI for the data-parallel LZSS codec.
//!
//! Works similar to gzip:
//!   lzss file.txt          → compress to file.txt.lzss (removes original)
//!   lzss -d file.txt.lzss  → decompress to file.txt (removes original)
//!   lzss -c file.txt       → compress to stdout
//!   lzss -k file.txt       → keep original after compress
//!   lzss -b file.txt       → round-trip benchmark with integrity check
//!   cat file | lzss -c     → compress stdin to stdout
//!   cat file | lzss -dc    → decompress stdin to stdout
use std::env;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{self, ExitCode};
use std::time::Instant;

use lzss_gpu::pipeline::{self, CompressOptions, CompressStats, DecompressOptions};

fn usage() {
    eprintln!("lzss - data-parallel LZSS compression tool");
    eprintln!();
    eprintln!("Usage: lzss [OPTIONS] [FILE]...");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -d, --decompress   Decompress mode");
    eprintln!("  -c, --stdout       Write to stdout (don't remove original)");
    eprintln!("  -k, --keep         Keep original file");
    eprintln!("  -f, --force        Overwrite existing output files");
    eprintln!("  -b, --bench        Compress, decompress and verify; print timings");
    eprintln!("  -t, --threads N    Number of threads (0=auto, 1=single-threaded)");
    #[cfg(feature = "webgpu")]
    eprintln!("  --webgpu           Use GPU (WebGPU/wgpu) for match finding and decode");
    eprintln!("  -p, --profile      Print per-stage timings to stderr");
    eprintln!("  -q, --quiet        Suppress warnings");
    eprintln!("  -v, --verbose      Verbose output");
    eprintln!("  -h, --help         Show this help");
    eprintln!();
    eprintln!("If no FILE is given, reads from stdin and writes to stdout.");
    eprintln!("Compressed files use the .lzss extension.");
}

#[derive(Debug)]
struct Opts {
    decompress: bool,
    to_stdout: bool,
    keep: bool,
    force: bool,
    bench: bool,
    verbose: bool,
    quiet: bool,
    profiling: bool,
    webgpu: bool,
    threads: usize,
    files: Vec<String>,
}

fn parse_args() -> Opts {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut opts = Opts {
        decompress: false,
        to_stdout: false,
        keep: false,
        force: false,
        bench: false,
        verbose: false,
        quiet: false,
        profiling: false,
        webgpu: false,
        threads: 0,
        files: Vec::new(),
    };

    let mut i = 0;
    while i < args.len() {
        let arg = &args[i];
        match arg.as_str() {
            "-d" | "--decompress" => opts.decompress = true,
            "-c" | "--stdout" | "--to-stdout" => opts.to_stdout = true,
            "-k" | "--keep" => opts.keep = true,
            "-f" | "--force" => opts.force = true,
            "-b" | "--bench" => opts.bench = true,
            "-v" | "--verbose" => opts.verbose = true,
            "-q" | "--quiet" => opts.quiet = true,
            "-p" | "--profile" => opts.profiling = true,
            "--webgpu" => opts.webgpu = true,
            "-h" | "--help" => {
                usage();
                process::exit(0);
            }
            "-t" | "--threads" => {
                i += 1;
                if i >= args.len() {
                    eprintln!("lzss: missing argument for -t");
                    process::exit(1);
                }
                opts.threads = match args[i].parse::<usize>() {
                    Ok(n) => n,
                    Err(_) => {
                        eprintln!("lzss: invalid thread count '{}'", args[i]);
                        process::exit(1);
                    }
                };
            }
            // Combined short flags like -dc, -kv.
            s if s.starts_with('-') && !s.starts_with("--") && s.len() > 2 => {
                for ch in s[1..].chars() {
                    match ch {
                        'd' => opts.decompress = true,
                        'c' => opts.to_stdout = true,
                        'k' => opts.keep = true,
                        'f' => opts.force = true,
                        'b' => opts.bench = true,
                        'v' => opts.verbose = true,
                        'q' => opts.quiet = true,
                        'p' => opts.profiling = true,
                        _ => {
                            eprintln!("lzss: unknown flag '-{ch}'");
                            process::exit(1);
                        }
                    }
                }
            }
            _ => {
                opts.files.push(arg.clone());
            }
        }
        i += 1;
    }

    opts
}

fn compress_output_path(input: &str) -> PathBuf {
    PathBuf::from(format!("{input}.lzss"))
}

fn decompress_output_path(input: &str) -> Option<PathBuf> {
    let path = Path::new(input);
    match path.extension().and_then(|e| e.to_str()) {
        Some("lzss") => Some(path.with_extension("")),
        _ => None,
    }
}

/// Build compression and decompression options from CLI flags.
fn build_cli_options(opts: &Opts) -> (CompressOptions, DecompressOptions) {
    let compress = CompressOptions {
        threads: opts.threads,
        profiling: opts.profiling,
        ..Default::default()
    };
    let decompress = DecompressOptions {
        threads: opts.threads,
        profiling: opts.profiling,
        ..Default::default()
    };

    #[cfg(feature = "webgpu")]
    {
        if opts.webgpu {
            match lzss_gpu::webgpu::WebGpuEngine::with_profiling(opts.profiling) {
                Ok(engine) => {
                    if opts.verbose {
                        eprintln!("lzss: using WebGPU device: {}", engine.device_name());
                    }
                    let engine = std::sync::Arc::new(engine);
                    return (
                        CompressOptions {
                            backend: pipeline::Backend::WebGpu,
                            webgpu_engine: Some(engine.clone()),
                            ..compress
                        },
                        DecompressOptions {
                            backend: pipeline::Backend::WebGpu,
                            webgpu_engine: Some(engine),
                            ..decompress
                        },
                    );
                }
                Err(e) => {
                    if !opts.quiet {
                        eprintln!("lzss: warning: --webgpu requested but {e}, falling back to CPU");
                    }
                }
            }
        }
    }

    #[cfg(not(feature = "webgpu"))]
    {
        if opts.webgpu && !opts.quiet {
            eprintln!(
                "lzss: warning: --webgpu requires the webgpu feature \
                 (build with --features webgpu)"
            );
        }
    }

    (compress, decompress)
}

fn print_stats(name: &str, stats: &CompressStats) {
    let ms = |d: std::time::Duration| d.as_secs_f64() * 1000.0;
    eprintln!(
        "{name}: {:.1}% ({} → {} bytes, {} literals, {} copies)",
        stats.ratio() * 100.0,
        stats.input_len,
        stats.output_len,
        stats.literals,
        stats.copies
    );
    eprintln!(
        "{name}: index {:.3} ms, match {:.3} ms, resolve {:.3} ms, encode {:.3} ms",
        ms(stats.index_time),
        ms(stats.match_time),
        ms(stats.resolve_time),
        ms(stats.encode_time)
    );
}

fn write_output(opts: &Opts, out_path: &Path, data: &[u8]) -> Result<(), String> {
    let out_str = out_path.display().to_string();
    if out_path.exists() && !opts.force {
        return Err(format!("{out_str} already exists; use -f to overwrite"));
    }
    fs::write(out_path, data).map_err(|e| format!("{out_str}: {e}"))
}

fn process_compress(opts: &Opts, path: &str, options: &CompressOptions) -> Result<(), String> {
    let input = fs::read(path).map_err(|e| format!("{path}: {e}"))?;
    let (compressed, stats) =
        pipeline::compress_with_stats(&input, options).map_err(|e| format!("{path}: {e}"))?;
    if opts.verbose {
        print_stats(path, &stats);
    }

    if opts.to_stdout {
        io::stdout()
            .write_all(&compressed)
            .map_err(|e| format!("stdout: {e}"))?;
        return Ok(());
    }

    write_output(opts, &compress_output_path(path), &compressed)?;
    if !opts.keep {
        fs::remove_file(path).map_err(|e| format!("{path}: cannot remove: {e}"))?;
    }
    Ok(())
}

fn process_decompress(opts: &Opts, path: &str, options: &DecompressOptions) -> Result<(), String> {
    let out_path = if opts.to_stdout {
        None
    } else {
        Some(
            decompress_output_path(path)
                .ok_or_else(|| format!("{path}: unknown suffix -- ignored"))?,
        )
    };

    let input = fs::read(path).map_err(|e| format!("{path}: {e}"))?;
    let decompressed =
        pipeline::decompress_with_options(&input, options).map_err(|e| format!("{path}: {e}"))?;
    if opts.verbose {
        eprintln!("{path}: {} → {} bytes", input.len(), decompressed.len());
    }

    match out_path {
        None => io::stdout()
            .write_all(&decompressed)
            .map_err(|e| format!("stdout: {e}"))?,
        Some(out_path) => {
            write_output(opts, &out_path, &decompressed)?;
            if !opts.keep {
                fs::remove_file(path).map_err(|e| format!("{path}: cannot remove: {e}"))?;
            }
        }
    }
    Ok(())
}

/// Round trip `input`, timing both directions and verifying the result.
/// Returns whether the integrity check passed.
fn run_bench(
    name: &str,
    input: &[u8],
    compress_options: &CompressOptions,
    decompress_options: &DecompressOptions,
    verbose: bool,
) -> Result<bool, String> {
    let t0 = Instant::now();
    let (compressed, stats) = pipeline::compress_with_stats(input, compress_options)
        .map_err(|e| format!("{name}: {e}"))?;
    let compress_ms = t0.elapsed().as_secs_f64() * 1000.0;

    let t0 = Instant::now();
    let decompressed = pipeline::decompress_with_options(&compressed, decompress_options)
        .map_err(|e| format!("{name}: {e}"))?;
    let decompress_ms = t0.elapsed().as_secs_f64() * 1000.0;

    let passed = decompressed == input;
    println!("######################### {name} #########################");
    println!();
    println!("Compression time: {compress_ms:.3} ms");
    println!("Decompression time: {decompress_ms:.3} ms");
    println!(
        "Integrity check: {}",
        if passed { "PASSED" } else { "FAILED" }
    );
    println!("Original size: {} bytes", input.len());
    println!("Compressed size: {} bytes", compressed.len());
    println!("Compression ratio: {:.2}%", stats.ratio() * 100.0);
    if verbose {
        print_stats(name, &stats);
    }
    Ok(passed)
}

fn read_stdin() -> Result<Vec<u8>, String> {
    let mut input = Vec::new();
    io::stdin()
        .read_to_end(&mut input)
        .map_err(|e| format!("stdin: {e}"))?;
    Ok(input)
}

fn process_stdin_stdout(
    opts: &Opts,
    compress_options: &CompressOptions,
    decompress_options: &DecompressOptions,
) -> Result<(), String> {
    let input = read_stdin()?;
    let output = if opts.decompress {
        pipeline::decompress_with_options(&input, decompress_options)
    } else {
        pipeline::compress_with_options(&input, compress_options)
    }
    .map_err(|e| format!("stdin: {e}"))?;
    io::stdout()
        .write_all(&output)
        .map_err(|e| format!("stdout: {e}"))
}

fn run() -> Result<(), ()> {
    let opts = parse_args();
    let (compress_options, decompress_options) = build_cli_options(&opts);
    let mut had_error = false;

    if opts.bench {
        let inputs: Vec<(String, Result<Vec<u8>, String>)> = if opts.files.is_empty() {
            vec![("stdin".to_string(), read_stdin())]
        } else {
            opts.files
                .iter()
                .map(|p| (p.clone(), fs::read(p).map_err(|e| format!("{p}: {e}"))))
                .collect()
        };
        for (name, input) in inputs {
            let result = input.and_then(|data| {
                run_bench(
                    &name,
                    &data,
                    &compress_options,
                    &decompress_options,
                    opts.verbose,
                )
            });
            match result {
                Ok(true) => {}
                Ok(false) => had_error = true,
                Err(e) => {
                    eprintln!("lzss: {e}");
                    had_error = true;
                }
            }
        }
        return if had_error { Err(()) } else { Ok(()) };
    }

    if opts.files.is_empty() {
        if let Err(e) = process_stdin_stdout(&opts, &compress_options, &decompress_options) {
            eprintln!("lzss: {e}");
            return Err(());
        }
        return Ok(());
    }

    for path in &opts.files {
        let result = if path == "-" {
            process_stdin_stdout(&opts, &compress_options, &decompress_options)
        } else if opts.decompress {
            process_decompress(&opts, path, &decompress_options)
        } else {
            process_compress(&opts, path, &compress_options)
        };

        if let Err(e) = result {
            eprintln!("lzss: {e}");
            had_error = true;
        }
    }

    if had_error {
        Err(())
    } else {
        Ok(())
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(()) => ExitCode::FAILURE,
    }
}
