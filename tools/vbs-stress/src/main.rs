//! Randomized workload driver for the virtual block store.
//!
//! Creates a set of files, then runs a seeded mix of writes, reads,
//! truncates, removes and re-creates against a scratch store. Every read
//! is checked against an in-memory shadow of each file's data region, and
//! the store's integrity walk runs periodically and at the end.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use vbs_store::{
    bootstrap_from_config, AllocatorKind, IndexKind, StoreConfig, StoreError, StoreService,
    StoreStats,
};

/// Randomized workload driver for the virtual block store.
#[derive(Debug, Parser)]
#[command(name = "vbs-stress", version, after_help = AFTER_HELP)]
struct Args {
    /// Number of distinct file names in play
    #[arg(long, default_value_t = 32, value_parser = clap::value_parser!(u32).range(1..))]
    files: u32,
    /// Random operations to run after the initial creates
    #[arg(long, default_value_t = 10_000)]
    ops: u64,
    /// Seed for the workload generator
    #[arg(long, default_value_t = 0x5EED)]
    seed: u64,
    /// Largest single write, and largest write offset
    #[arg(long, default_value_t = 4096, value_parser = parse_nonzero)]
    max_write: usize,
    /// Run the integrity walk every N operations (0 disables)
    #[arg(long, default_value_t = 500)]
    verify_every: u64,
    /// Store configuration file (JSON); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    allocator: Option<AllocatorArg>,
    #[arg(long, value_enum)]
    index: Option<IndexArg>,
    /// Store size in bytes
    #[arg(long)]
    capacity: Option<u64>,
    /// Store file; a scratch file is used when absent
    #[arg(long)]
    path: Option<PathBuf>,
    /// Flush after every mutation
    #[arg(long)]
    sync: bool,
    /// Print the report as JSON
    #[arg(long)]
    json: bool,
}

const AFTER_HELP: &str = "Without --path the store lives in a scratch directory removed on exit.\n\
                          Set RUST_LOG=vbs_store=debug for per-operation logging.";

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AllocatorArg {
    Bitmap,
    #[value(alias = "free_list")]
    FreeList,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IndexArg {
    Scan,
    Memory,
}

fn parse_nonzero(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("must be at least 1".to_owned()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

#[derive(Debug)]
struct StressConfig {
    files: u32,
    ops: u64,
    seed: u64,
    max_write: usize,
    verify_every: u64,
    json: bool,
    path: Option<PathBuf>,
    store: StoreConfig,
}

impl StressConfig {
    fn from_args(args: Args) -> Result<Self> {
        let mut store = match &args.config {
            Some(path) => StoreConfig::load(path)
                .with_context(|| format!("failed to load configuration {}", path.display()))?,
            None => StoreConfig {
                capacity: Some(16 * 1024 * 1024),
                sync: false,
                ..StoreConfig::default()
            },
        };
        if let Some(allocator) = args.allocator {
            store.allocator = match allocator {
                AllocatorArg::Bitmap => AllocatorKind::Bitmap,
                AllocatorArg::FreeList => AllocatorKind::FreeList,
            };
        }
        if let Some(index) = args.index {
            store.index = match index {
                IndexArg::Scan => IndexKind::Scan,
                IndexArg::Memory => IndexKind::Memory,
            };
        }
        if args.capacity.is_some() {
            store.capacity = args.capacity;
        }
        if args.sync {
            store.sync = true;
        }

        Ok(Self {
            files: args.files,
            ops: args.ops,
            seed: args.seed,
            max_write: args.max_write,
            verify_every: args.verify_every,
            json: args.json,
            path: args.path,
            store,
        })
    }
}

/// Contents of one file as the store should hold them.
#[derive(Debug, Default)]
struct Shadow {
    /// Whole data region, including bytes past `size`
    region: Vec<u8>,
    size: usize,
}

#[derive(Debug, Default, Serialize)]
struct OpCounts {
    create: u64,
    write: u64,
    read: u64,
    truncate: u64,
    remove: u64,
    out_of_space: u64,
}

#[derive(Debug, Serialize)]
struct StressReport {
    seed: u64,
    allocator: AllocatorKind,
    index: IndexKind,
    operations: u64,
    bytes_written: u64,
    bytes_read: u64,
    counts: OpCounts,
    live_files: usize,
    verifications: u64,
    stats: StoreStats,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let config = StressConfig::from_args(Args::parse())?;
    let report = stress(&config)?;

    if config.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn stress(config: &StressConfig) -> Result<StressReport> {
    // Keeps the scratch directory alive until the run ends.
    let scratch = tempfile::tempdir().context("failed to create scratch directory")?;
    let mut store_config = config.store.clone();
    store_config.path = config
        .path
        .clone()
        .unwrap_or_else(|| scratch.path().join("stress.db"));

    let mut store = bootstrap_from_config(&store_config)
        .with_context(|| format!("failed to open {}", store_config.path.display()))?;
    info!(
        path = %store_config.path.display(),
        allocator = ?store.allocator_kind(),
        seed = config.seed,
        "starting stress run"
    );

    if store.stats()?.file_count != 0 {
        bail!(
            "{} already holds files; the shadow model needs an empty store",
            store_config.path.display()
        );
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut shadows: BTreeMap<String, Shadow> = BTreeMap::new();
    let mut counts = OpCounts::default();
    let mut bytes_written = 0u64;
    let mut bytes_read = 0u64;
    let mut verifications = 0u64;

    for i in 0..config.files {
        let name = file_name(i);
        match store.open(&name, true) {
            Ok(_) => {
                shadows.insert(name, Shadow::default());
                counts.create += 1;
            }
            Err(StoreError::OutOfSpace { .. }) => counts.out_of_space += 1,
            Err(e) => return Err(e).with_context(|| format!("create {name}")),
        }
    }

    for op in 0..config.ops {
        let name = file_name(rng.gen_range(0..config.files));
        let roll = rng.gen_range(0..100u32);

        if !shadows.contains_key(&name) {
            match store.open(&name, true) {
                Ok(_) => {
                    shadows.insert(name, Shadow::default());
                    counts.create += 1;
                }
                Err(StoreError::OutOfSpace { .. }) => counts.out_of_space += 1,
                Err(e) => return Err(e).with_context(|| format!("op {op}: create {name}")),
            }
            continue;
        }
        let shadow = shadows
            .get_mut(&name)
            .with_context(|| format!("op {op}: no shadow for {name}"))?;

        store
            .open(&name, false)
            .with_context(|| format!("op {op}: open {name}"))?;

        match roll {
            0..=44 => {
                let len = rng.gen_range(1..=config.max_write);
                let offset = rng.gen_range(0..=config.max_write);
                let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
                match store.write(offset as u64, &data) {
                    Ok(n) => {
                        if shadow.region.is_empty() {
                            let capacity = store.get_permissions(&name)?.capacity;
                            shadow.region = vec![0; capacity as usize];
                        }
                        if n > 0 {
                            shadow.region[offset..offset + n].copy_from_slice(&data[..n]);
                            shadow.size = shadow.size.max(offset + n);
                        }
                        bytes_written += n as u64;
                        counts.write += 1;
                    }
                    Err(StoreError::OutOfSpace { .. }) => counts.out_of_space += 1,
                    Err(e) => return Err(e).with_context(|| format!("op {op}: write {name}")),
                }
            }
            45..=79 => {
                let offset = rng.gen_range(0..=shadow.size);
                let len = rng.gen_range(0..=config.max_write);
                let got = store
                    .read(offset as u64, len)
                    .with_context(|| format!("op {op}: read {name}"))?;
                let end = shadow.size.min(offset + len);
                let expected = shadow.region.get(offset..end).unwrap_or_default();
                if got != expected {
                    bail!(
                        "op {op}: read {name} at {offset}+{len} returned {} bytes, expected {}",
                        got.len(),
                        expected.len()
                    );
                }
                bytes_read += got.len() as u64;
                counts.read += 1;
            }
            80..=91 => {
                let new_size = rng.gen_range(0..=shadow.size);
                store
                    .truncate(new_size as u64)
                    .with_context(|| format!("op {op}: truncate {name}"))?;
                shadow.size = new_size;
                counts.truncate += 1;
            }
            _ => {
                store
                    .remove(&name)
                    .with_context(|| format!("op {op}: remove {name}"))?;
                shadows.remove(&name);
                counts.remove += 1;
            }
        }

        if config.verify_every > 0 && (op + 1) % config.verify_every == 0 {
            store
                .verify()
                .with_context(|| format!("integrity check failed after op {op}"))?;
            verifications += 1;
            debug!(op, live = shadows.len(), "integrity check passed");
        }
    }

    store.close();
    store.verify().context("final integrity check failed")?;
    verifications += 1;
    store.flush()?;

    let stats = store.stats()?;
    if counts.out_of_space > 0 {
        warn!(count = counts.out_of_space, "allocations failed for lack of space");
    }
    info!(ops = config.ops, live = shadows.len(), "stress run complete");

    Ok(StressReport {
        seed: config.seed,
        allocator: store.allocator_kind(),
        index: store.index_kind(),
        operations: config.ops,
        bytes_written,
        bytes_read,
        counts,
        live_files: shadows.len(),
        verifications,
        stats,
    })
}

fn file_name(i: u32) -> String {
    format!("stress-{i:04}")
}

fn print_report(report: &StressReport) {
    println!("vbs-stress");
    println!("seed: {}", report.seed);
    println!("allocator: {:?}", report.allocator);
    println!("index: {:?}", report.index);
    println!("operations: {}", report.operations);
    println!(
        "creates={} writes={} reads={} truncates={} removes={} out_of_space={}",
        report.counts.create,
        report.counts.write,
        report.counts.read,
        report.counts.truncate,
        report.counts.remove,
        report.counts.out_of_space
    );
    println!("bytes written: {}", report.bytes_written);
    println!("bytes read: {}", report.bytes_read);
    println!("live files: {}", report.live_files);
    println!("integrity checks: {}", report.verifications);
    println!(
        "space: {} of {} units free ({:.1}% used, {} free extents)",
        report.stats.free_units,
        report.stats.total_units,
        report.stats.used_percent(),
        report.stats.free_extents
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<StressConfig> {
        let args = Args::try_parse_from(std::iter::once("vbs-stress").chain(args.iter().copied()))?;
        StressConfig::from_args(args)
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.files, 32);
        assert_eq!(config.seed, 0x5EED);
        assert_eq!(config.store.capacity, Some(16 * 1024 * 1024));
        assert!(!config.store.sync);
        assert!(config.path.is_none());
    }

    #[test]
    fn test_store_overrides() {
        let config = parse(&[
            "--allocator",
            "free_list",
            "--index",
            "memory",
            "--capacity",
            "65536",
            "--sync",
        ])
        .unwrap();
        assert_eq!(config.store.allocator, AllocatorKind::FreeList);
        assert_eq!(config.store.index, IndexKind::Memory);
        assert_eq!(config.store.capacity, Some(65536));
        assert!(config.store.sync);
    }

    #[test]
    fn test_rejects_empty_workload() {
        assert!(parse(&["--files", "0"]).is_err());
        assert!(parse(&["--max-write", "0"]).is_err());
        assert!(parse(&["--allocator", "buddy"]).is_err());
    }

    #[test]
    fn test_short_run_verifies() {
        let config = parse(&["--files", "4", "--ops", "200", "--capacity", "262144"]).unwrap();
        let report = stress(&config).unwrap();
        assert_eq!(report.operations, 200);
        assert!(report.verifications >= 1);
    }
}
