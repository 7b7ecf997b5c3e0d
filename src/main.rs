//! Orrery - headless streaming driver
//!
//! Flies an observer across the universe and logs what the streaming
//! scheduler does.
//!
//! Usage: cargo run --release -- [OPTIONS]
//!
//! Options:
//!   --config <FILE>     Engine config JSON
//!   --gateway <SPEC>    memory | disk:<DIR> | http:<URL> | layered:<DIR>[@<URL>] (default: memory)
//!   --frames <N>        Frames to simulate (default: 600)
//!   --speed <UNITS>     Observer speed in world units per second (default: 2000)

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use orrery::core::{logging, EngineConfig, Error, Result, Vec3};
use orrery::persist::{
    DiskGateway, HttpGateway, LayeredGateway, MemoryGateway, PersistenceGateway,
};
use orrery::persist::layered::DEFAULT_CACHE_CELLS;
use orrery::streaming::{LodPolicy, StreamingScheduler};

const FRAME_TIME: Duration = Duration::from_millis(16);

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames = parse_arg::<u32>(&args, "--frames").unwrap_or(600);
    let speed = parse_arg::<f32>(&args, "--speed").unwrap_or(2000.0);
    let gateway_spec = parse_arg::<String>(&args, "--gateway").unwrap_or_else(|| "memory".to_string());

    let config = match parse_arg::<PathBuf>(&args, "--config") {
        Some(path) => EngineConfig::load(&path)?,
        None => EngineConfig::default(),
    };
    let gateway = open_gateway(&gateway_spec)?;
    log::info!(
        "Streaming {frames} frames at {speed} units/s through the {} gateway",
        gateway.name()
    );

    let mut scheduler = StreamingScheduler::with_gateway(&config, gateway)?;
    let reader = scheduler.reader();
    let lod = LodPolicy::from_engine(&config);

    let start = Instant::now();
    let mut observer = Vec3::new(0.0, 0.0, 0.0);
    let step = speed * FRAME_TIME.as_secs_f32();

    for frame in 0..frames {
        // Gentle curve so the observer crosses cells on both axes
        let heading = frame as f32 * 0.002;
        observer += Vec3::new(heading.cos(), 0.0, heading.sin()) * step;

        scheduler.update(observer, Instant::now());

        let snapshot = reader.snapshot();
        let render = lod.render_set(&snapshot, observer, None);

        if frame % 60 == 0 {
            log::info!(
                "frame {frame}: cell {} | {} loaded, {} loading, {} queued | {} fine, {} coarse | world v{}",
                orrery::world::cell_of(observer, config.stream.grid_size),
                scheduler.loaded_cells().len(),
                scheduler.loading_cells().len(),
                scheduler.queued_cells().len(),
                render.fine_count(),
                render.coarse_count(),
                snapshot.version()
            );
        }
        std::thread::sleep(FRAME_TIME);
    }

    let stats = scheduler.stats();
    log::info!("Finished in {:.1}s: {stats:?}", start.elapsed().as_secs_f64());
    Ok(())
}

fn open_gateway(spec: &str) -> Result<Arc<dyn PersistenceGateway>> {
    let (kind, arg) = spec.split_once(':').unwrap_or((spec, ""));
    let gateway: Arc<dyn PersistenceGateway> = match kind {
        "memory" => Arc::new(MemoryGateway::new()),
        "disk" => Arc::new(DiskGateway::open(non_empty(arg, spec)?)?),
        "http" => Arc::new(HttpGateway::new(non_empty(arg, spec)?)),
        "layered" => {
            let (dir, url) = match arg.split_once('@') {
                Some((dir, url)) => (dir, Some(url)),
                None => (arg, None),
            };
            let mut layered = LayeredGateway::new(DEFAULT_CACHE_CELLS)
                .with_disk(DiskGateway::open(non_empty(dir, spec)?)?);
            if let Some(url) = url {
                layered = layered.with_durable(HttpGateway::new(url));
            }
            Arc::new(layered)
        }
        other => {
            return Err(Error::Config(format!("unknown gateway kind {other:?}")));
        }
    };
    Ok(gateway)
}

fn non_empty<'a>(value: &'a str, spec: &str) -> Result<&'a str> {
    if value.is_empty() {
        Err(Error::Config(format!("gateway {spec:?} needs an argument")))
    } else {
        Ok(value)
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
