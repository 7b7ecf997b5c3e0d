//! Reference persistence gateway for orrery.
//!
//! Serves the cell HTTP contract over any [`PersistenceGateway`]:
//! ```ignore
//! let backend = Arc::new(LayeredGateway::new(512).with_disk(DiskGateway::open("cells")?));
//! let server = GatewayServer::start("127.0.0.1:7878", backend)?;
//! ```
//!
//! [`PersistenceGateway`]: orrery::persist::PersistenceGateway

pub mod server;

pub use server::{GatewayServer, GatewayServerError};

/// Default gateway port
pub const DEFAULT_PORT: u16 = 7878;
