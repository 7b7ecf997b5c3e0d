//! Reference persistence gateway
//!
//! Usage: orrery-gateway [OPTIONS]
//!
//! Options:
//!   --port <PORT>   Port to listen on (default: 7878)
//!   --data <DIR>    Directory for cell files (default: "gateway-data")
//!   --cache <N>     Cells kept in memory (default: 512)

use std::process::ExitCode;
use std::sync::Arc;

use orrery::persist::{DiskGateway, LayeredGateway};
use orrery::persist::layered::DEFAULT_CACHE_CELLS;
use orrery_gateway::{GatewayServer, DEFAULT_PORT};

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let args: Vec<String> = std::env::args().collect();
    let port = parse_arg::<u16>(&args, "--port").unwrap_or(DEFAULT_PORT);
    let data = parse_arg::<String>(&args, "--data").unwrap_or_else(|| "gateway-data".to_string());
    let cache = parse_arg::<usize>(&args, "--cache").unwrap_or(DEFAULT_CACHE_CELLS);

    let disk = match DiskGateway::open(&data) {
        Ok(disk) => disk,
        Err(e) => {
            log::error!("Cannot open data directory {data}: {e}");
            return ExitCode::FAILURE;
        }
    };
    match disk.stored_cells() {
        Ok(cells) => log::info!("{} cells on disk in {data}", cells.len()),
        Err(e) => log::warn!("Could not list {data}: {e}"),
    }
    let backend = Arc::new(LayeredGateway::new(cache).with_disk(disk));

    let _server = match GatewayServer::start(&format!("0.0.0.0:{port}"), backend) {
        Ok(server) => server,
        Err(e) => {
            log::error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    // Serve until the process is killed
    loop {
        std::thread::park();
    }
}

fn parse_arg<T: std::str::FromStr>(args: &[String], flag: &str) -> Option<T> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}
