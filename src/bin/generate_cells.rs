//! Cell pre-generator: fills a disk gateway with a square of cells.
//!
//! Usage: cargo run --release --bin generate_cells -- [OPTIONS]
//!
//! Options:
//!   --radius <N>      Cells in each direction from the origin (default: 8)
//!   --seed <SEED>     World seed (default: from config or 0x5eed)
//!   --out <DIR>       Output directory (default: "assets/cells")
//!   --config <FILE>   Engine config JSON (optional)
//!   --jobs <N>        Parallel generation threads (default: 4)
//!   --force           Regenerate cells that already exist on disk

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;

use orrery::core::EngineConfig;
use orrery::generation::CellGenerator;
use orrery::persist::{DiskGateway, PersistenceGateway, StoredCell};
use orrery::world::CellCoord;

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let radius = parse_arg::<i32>(&args, "--radius").unwrap_or(8).max(0);
    let out_dir = PathBuf::from(parse_arg::<String>(&args, "--out").unwrap_or_else(|| "assets/cells".to_string()));
    let jobs = parse_arg::<usize>(&args, "--jobs").unwrap_or(4).max(1);
    let force = args.iter().any(|a| a == "--force");

    let mut config = match parse_arg::<PathBuf>(&args, "--config") {
        Some(path) => match EngineConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load config {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };
    if let Some(seed) = parse_arg::<u64>(&args, "--seed") {
        config.generator.seed = seed;
    }
    if !config.generator.deterministic {
        log::warn!("Generator is non-deterministic; pre-generated cells will not match a fresh run");
    }

    if let Err(e) = rayon::ThreadPoolBuilder::new().num_threads(jobs).build_global() {
        log::warn!("Could not size the thread pool: {e}");
    }

    let gateway = match DiskGateway::open(&out_dir) {
        Ok(gateway) => gateway,
        Err(e) => {
            log::error!("Cannot open output directory {}: {e}", out_dir.display());
            return ExitCode::FAILURE;
        }
    };
    let generator = CellGenerator::new(config.generator.clone(), config.stream.grid_size);

    let cells: Vec<CellCoord> = (-radius..=radius)
        .flat_map(|x| (-radius..=radius).map(move |z| CellCoord::new(x, z)))
        .collect();
    let total = cells.len();

    println!("=== Orrery Cell Generator ===");
    println!("Cells:  {total} ({side} x {side})", side = 2 * radius + 1);
    println!("Seed:   {:#x}", config.generator.seed);
    println!("Grid:   {}", config.stream.grid_size);
    println!("Output: {}", out_dir.display());
    println!();

    let start = Instant::now();
    let done = AtomicUsize::new(0);
    let skipped = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let entities = AtomicUsize::new(0);

    cells.par_iter().for_each(|&cell| {
        let n = done.fetch_add(1, Ordering::Relaxed) + 1;
        if n % 100 == 0 {
            let rate = n as f64 / start.elapsed().as_secs_f64();
            eprintln!("  [{n}/{total}] {rate:.0} cells/sec");
        }

        if !force && gateway.exists(cell) {
            skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        let contents = generator.generate(cell);
        entities.fetch_add(contents.len(), Ordering::Relaxed);
        let saved = StoredCell::from_contents(&contents)
            .and_then(|stored| gateway.save(cell, &stored));
        if let Err(e) = saved {
            log::error!("Saving cell {cell} failed: {e}");
            failed.fetch_add(1, Ordering::Relaxed);
        }
    });

    let elapsed = start.elapsed();
    let failed = failed.into_inner();
    let skipped = skipped.into_inner();
    println!();
    println!(
        "Generated {} cells in {:.1}s ({} skipped, {} failed, {} entities)",
        total - skipped,
        elapsed.as_secs_f64(),
        skipped,
        failed,
        entities.into_inner()
    );

    if failed > 0 { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
