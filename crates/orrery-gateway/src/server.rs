//! HTTP server for the cell persistence contract.
//! Runs on a background thread; each request is answered from the backend.

use std::io::{Cursor, Read};
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tiny_http::{Header, Method, Request, Response, Server};

use orrery::persist::protocol::encode_fetch_response;
use orrery::persist::{
    FetchRequest, PersistenceGateway, SaveRequest, DELETE_ALL_PATH, FETCH_PATH, SAVE_PATH,
};

#[derive(Debug, thiserror::Error)]
pub enum GatewayServerError {
    #[error("Failed to bind to {addr}: {error}")]
    Bind { addr: String, error: String },
}

/// Running gateway server; stops when dropped
pub struct GatewayServer {
    server: Arc<Server>,
    addr: Option<SocketAddr>,
    handle: Option<JoinHandle<()>>,
}

type HttpResponse = Response<Cursor<Vec<u8>>>;

impl GatewayServer {
    /// Bind `addr` (e.g. `127.0.0.1:0` for an OS-assigned port) and serve
    /// requests from `backend` on a background thread.
    pub fn start(
        addr: &str,
        backend: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, GatewayServerError> {
        let server = Server::http(addr).map_err(|e| GatewayServerError::Bind {
            addr: addr.to_string(),
            error: e.to_string(),
        })?;
        let server = Arc::new(server);
        let bound = server.server_addr().to_ip();
        log::info!(
            "Gateway listening on {} ({} backend)",
            bound.map_or_else(|| addr.to_string(), |a| a.to_string()),
            backend.name()
        );

        let worker = Arc::clone(&server);
        let handle = thread::Builder::new()
            .name("orrery-gateway".to_string())
            .spawn(move || Self::run(&worker, backend.as_ref()))
            .map_err(|e| GatewayServerError::Bind {
                addr: addr.to_string(),
                error: e.to_string(),
            })?;

        Ok(Self {
            server,
            addr: bound,
            handle: Some(handle),
        })
    }

    /// Bound address, if the server listens on IP
    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    /// Bound port (0 if unknown)
    pub fn actual_port(&self) -> u16 {
        self.addr.map_or(0, |a| a.port())
    }

    /// Base URL suitable for [`orrery::persist::HttpGateway`]
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.actual_port())
    }

    /// Stop accepting requests and wait for the server thread
    pub fn stop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Gateway server thread panicked");
            }
        }
    }

    fn run(server: &Server, backend: &dyn PersistenceGateway) {
        for request in server.incoming_requests() {
            let method = request.method().clone();
            let url = request.url().to_string();
            if let Err(e) = Self::handle_request(request, backend) {
                log::warn!("{method} {url}: failed to respond: {e}");
            }
        }
        log::debug!("Gateway server stopped");
    }

    fn handle_request(
        mut request: Request,
        backend: &dyn PersistenceGateway,
    ) -> std::io::Result<()> {
        let path = request.url().split('?').next().unwrap_or("").to_string();
        let response = match (request.method(), path.as_str()) {
            (&Method::Post, SAVE_PATH) => match read_body(&mut request) {
                Ok(body) => handle_save(&body, backend),
                Err(e) => error_response(400, &format!("unreadable body: {e}")),
            },
            (&Method::Post, FETCH_PATH) => match read_body(&mut request) {
                Ok(body) => handle_fetch(&body, backend),
                Err(e) => error_response(400, &format!("unreadable body: {e}")),
            },
            (&Method::Delete, DELETE_ALL_PATH) => match backend.delete_all() {
                Ok(()) => {
                    log::info!("Deleted all cells");
                    json_response(200, "{}".to_string())
                }
                Err(e) => error_response(500, &e.to_string()),
            },
            (_, SAVE_PATH | FETCH_PATH | DELETE_ALL_PATH) => {
                error_response(405, "method not allowed")
            }
            _ => error_response(404, "not found"),
        };
        request.respond(response)
    }
}

impl Drop for GatewayServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn read_body(request: &mut Request) -> std::io::Result<String> {
    let mut body = String::new();
    request.as_reader().read_to_string(&mut body)?;
    Ok(body)
}

fn handle_save(body: &str, backend: &dyn PersistenceGateway) -> HttpResponse {
    let parsed = serde_json::from_str::<SaveRequest>(body)
        .map_err(|e| e.to_string())
        .and_then(|req| req.into_parts().map_err(|e| e.to_string()));
    let (cell, stored) = match parsed {
        Ok(parts) => parts,
        Err(e) => return error_response(400, &e),
    };
    match backend.save(cell, &stored) {
        Ok(()) => {
            log::debug!("Saved cell {cell} ({} entities)", stored.entity_count());
            json_response(200, "{}".to_string())
        }
        Err(e) => error_response(500, &e.to_string()),
    }
}

fn handle_fetch(body: &str, backend: &dyn PersistenceGateway) -> HttpResponse {
    let parsed = serde_json::from_str::<FetchRequest>(body)
        .map_err(|e| e.to_string())
        .and_then(|req| req.cells().map_err(|e| e.to_string()));
    let cells = match parsed {
        Ok(cells) => cells,
        Err(e) => return error_response(400, &e),
    };
    let fetched = match backend.fetch_batch(&cells) {
        Ok(fetched) => fetched,
        Err(e) => return error_response(500, &e.to_string()),
    };
    let hits = fetched.values().filter(|v| v.is_some()).count();
    log::debug!("Fetched {hits}/{} cells", cells.len());

    match serde_json::to_string(&encode_fetch_response(&fetched)) {
        Ok(json) => json_response(200, json),
        Err(e) => error_response(500, &e.to_string()),
    }
}

fn json_response(status: u16, body: String) -> HttpResponse {
    let response = Response::from_string(body).with_status_code(status);
    match Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        Ok(header) => response.with_header(header),
        Err(()) => response,
    }
}

fn error_response(status: u16, message: &str) -> HttpResponse {
    if status >= 500 {
        log::error!("Gateway error {status}: {message}");
    } else {
        log::warn!("Rejected request ({status}): {message}");
    }
    json_response(status, serde_json::json!({ "error": message }).to_string())
}
