//! Persistence gateway contract.
//!
//! The engine asks a gateway for previously generated cells before
//! generating them, and hands newly generated cells back for storage. A
//! fetch miss is not an error. Calls block; the loader only ever makes them
//! from its blocking pool.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::world::CellCoord;
use super::protocol::StoredCell;

/// Errors raised by gateway implementations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Invalid cell key: {0:?}")]
    InvalidKey(String),
}

/// Result of a batch fetch; `None` marks a miss
pub type FetchResult = HashMap<CellCoord, Option<StoredCell>>;

/// Cache-then-store access to persisted cell contents
pub trait PersistenceGateway: Send + Sync {
    /// Look up a batch of cells. Every requested cell appears in the result.
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError>;

    /// Persist one cell; best effort from the engine's point of view.
    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError>;

    /// Remove every persisted cell (administrative).
    fn delete_all(&self) -> Result<(), GatewayError>;

    /// Short name for logs
    fn name(&self) -> &'static str {
        "gateway"
    }
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for Arc<G> {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        (**self).fetch_batch(cells)
    }

    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError> {
        (**self).save(cell, stored)
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        (**self).delete_all()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

impl<G: PersistenceGateway + ?Sized> PersistenceGateway for Box<G> {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        (**self).fetch_batch(cells)
    }

    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError> {
        (**self).save(cell, stored)
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        (**self).delete_all()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Gateway that stores nothing; every fetch misses
#[derive(Clone, Copy, Debug, Default)]
pub struct NullGateway;

impl PersistenceGateway for NullGateway {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        Ok(cells.iter().map(|c| (*c, None)).collect())
    }

    fn save(&self, _cell: CellCoord, _stored: &StoredCell) -> Result<(), GatewayError> {
        Ok(())
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_gateway_always_misses() {
        let gateway = NullGateway;
        let cells = [CellCoord::new(0, 0), CellCoord::new(1, 2)];
        gateway.save(cells[0], &StoredCell::default()).unwrap();
        let result = gateway.fetch_batch(&cells).unwrap();
        assert_eq!(result.len(), 2);
        assert!(result.values().all(Option::is_none));
    }

    #[test]
    fn test_arc_forwarding() {
        let gateway: Arc<dyn PersistenceGateway> = Arc::new(NullGateway);
        assert_eq!(gateway.name(), "null");
        assert!(gateway.fetch_batch(&[CellCoord::new(5, 5)]).unwrap()[&CellCoord::new(5, 5)].is_none());
    }

    #[test]
    fn test_error_display() {
        let err = GatewayError::Status {
            status: 503,
            url: "http://localhost/get-sphere-data".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 from http://localhost/get-sphere-data");
    }
}
