//! HTTP client for a remote persistence service

use std::time::Duration;

use crate::world::CellCoord;
use super::gateway::{FetchResult, GatewayError, PersistenceGateway};
use super::protocol::{
    decode_fetch_response, FetchRequest, FetchResponse, SaveRequest, StoredCell,
    DELETE_ALL_PATH, FETCH_PATH, SAVE_PATH,
};

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Gateway speaking the sphere-data HTTP contract
pub struct HttpGateway {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpGateway {
    /// `base_url` like `http://localhost:7878`; a trailing slash is ignored
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { base_url, agent }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn map_error(url: &str, err: ureq::Error) -> GatewayError {
    match err {
        ureq::Error::Status(status, _) => GatewayError::Status {
            status,
            url: url.to_string(),
        },
        ureq::Error::Transport(t) => GatewayError::Http(t.to_string()),
    }
}

impl PersistenceGateway for HttpGateway {
    fn fetch_batch(&self, cells: &[CellCoord]) -> Result<FetchResult, GatewayError> {
        if cells.is_empty() {
            return Ok(FetchResult::new());
        }
        let url = self.url(FETCH_PATH);
        let response = self
            .agent
            .post(&url)
            .send_json(FetchRequest::new(cells))
            .map_err(|e| map_error(&url, e))?;
        let body: FetchResponse = response.into_json()?;
        decode_fetch_response(body, cells)
    }

    fn save(&self, cell: CellCoord, stored: &StoredCell) -> Result<(), GatewayError> {
        let url = self.url(SAVE_PATH);
        self.agent
            .post(&url)
            .send_json(SaveRequest::new(cell, stored))
            .map_err(|e| map_error(&url, e))?;
        Ok(())
    }

    fn delete_all(&self) -> Result<(), GatewayError> {
        let url = self.url(DELETE_ALL_PATH);
        self.agent
            .delete(&url)
            .call()
            .map_err(|e| map_error(&url, e))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
