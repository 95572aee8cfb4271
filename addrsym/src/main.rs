//! # addrsym - Main Entry Point
//!
//! Symbolicates instruction addresses against the images of a running
//! process, printing one frame per address in input order.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};

use addrsym::cli::Args;
use addrsym::domain::Pid;
use addrsym::images::{BinaryImageCache, ImageSource};
use addrsym::platform::{PollingLoader, ProcMaps};
use addrsym::report::{NativeStackFrames, StackResolver};
use addrsym::symbolization::{DebugFileLookup, Symbolicator, SymbolicatorOptions};
use addrsym::utils::HexValue;

// Exit codes
const EXIT_SUCCESS: i32 = 0;
const EXIT_ERROR: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn main() {
    env_logger::init();
    std::process::exit(match run() {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => {
            let code = exit_code_for(&e);
            eprintln!("error: {e:#}");
            code
        }
    });
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.to_string().to_lowercase().contains("invalid address") {
        EXIT_USAGE
    } else {
        EXIT_ERROR
    }
}

fn run() -> Result<()> {
    let args = Args::parse();
    let pid = args.pid.map_or_else(Pid::current, Pid);

    let addresses = if args.addresses.is_empty() && !args.list_images {
        read_addresses(io::stdin().lock())?
    } else {
        parse_addresses(&args.addresses)?
    };

    let source: Arc<dyn ImageSource> = image_source(pid, args.dladdr);
    let cache = BinaryImageCache::new(source);
    cache.start();
    if cache.is_empty() {
        warn!("No images found for {pid}; every frame will be unresolved");
    }

    if args.list_images {
        for image in cache.snapshot().images() {
            println!("{image}");
        }
        if addresses.is_empty() {
            return Ok(());
        }
    }

    let symbolicator = Symbolicator::new(SymbolicatorOptions { demangle: !args.no_demangle });
    let resolver = StackResolver::new(&cache, &symbolicator);

    let report = if args.dladdr {
        resolve_with_dladdr(&resolver, &addresses)?
    } else {
        let lookup = DebugFileLookup::load(&cache.snapshot());
        info!("Loaded symbols for {} images", lookup.loaded_images());
        resolver.resolve_with_images(&addresses, &lookup)
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if args.json {
        serde_json::to_writer_pretty(&mut out, &report).context("Failed to write JSON")?;
        writeln!(out)?;
    } else {
        if !args.quiet {
            writeln!(out, "{pid}: {} frames", report.frames.len())?;
        }
        for (i, frame) in report.frames.iter().enumerate() {
            writeln!(out, "{}", frame.format(i))?;
        }
    }

    cache.stop();
    Ok(())
}

/// `/proc/<pid>/maps` for any process; `dl_iterate_phdr` for our own when using dladdr
fn image_source(pid: Pid, in_process: bool) -> Arc<dyn ImageSource> {
    if in_process {
        if let Some(source) = in_process_source() {
            return source;
        }
    }
    Arc::new(PollingLoader::new(ProcMaps::for_pid(pid)))
}

#[cfg(all(target_os = "linux", target_pointer_width = "64"))]
fn in_process_source() -> Option<Arc<dyn ImageSource>> {
    let source: Arc<dyn ImageSource> = Arc::new(PollingLoader::new(addrsym::platform::ProcessImages::new()));
    Some(source)
}

#[cfg(not(all(target_os = "linux", target_pointer_width = "64")))]
fn in_process_source() -> Option<Arc<dyn ImageSource>> {
    None
}

#[cfg(unix)]
fn resolve_with_dladdr(resolver: &StackResolver<'_>, addresses: &[u64]) -> Result<NativeStackFrames> {
    Ok(resolver.resolve_with_images(addresses, &addrsym::symbolization::DladdrLookup))
}

#[cfg(not(unix))]
fn resolve_with_dladdr(_resolver: &StackResolver<'_>, _addresses: &[u64]) -> Result<NativeStackFrames> {
    bail!("--dladdr is only available on unix platforms")
}

fn parse_addresses<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<u64>> {
    tokens
        .iter()
        .map(|token| {
            let token = token.as_ref();
            token.parse::<HexValue>().map(|hex| hex.0).with_context(|| format!("Invalid address: {token}"))
        })
        .collect()
}

fn read_addresses(input: impl BufRead) -> Result<Vec<u64>> {
    let mut tokens = Vec::new();
    for line in input.lines() {
        let line = line.context("Failed to read addresses from stdin")?;
        tokens.extend(line.split_whitespace().map(str::to_string));
    }
    if tokens.is_empty() {
        bail!("No addresses given");
    }
    parse_addresses(&tokens)
}
