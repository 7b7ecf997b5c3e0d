//! Persistence gateway: contract, wire format and implementations

pub mod gateway;
pub mod protocol;
pub mod cache;
pub mod memory;
pub mod disk;
pub mod http;
pub mod layered;

pub use gateway::{FetchResult, GatewayError, NullGateway, PersistenceGateway};
pub use protocol::{
    FetchRequest, FetchResponse, SaveRequest, StoredCell, StoredEntity,
    DELETE_ALL_PATH, FETCH_PATH, SAVE_PATH,
};
pub use cache::CellCache;
pub use memory::MemoryGateway;
pub use disk::DiskGateway;
pub use http::HttpGateway;
pub use layered::LayeredGateway;
