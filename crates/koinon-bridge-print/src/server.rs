// SPDX-License-Identifier: MIT
//
// Loopback HTTP endpoint layer.
//
// The bridge exposes a small JSON API on 127.0.0.1 for the kiosk's browser
// client. The surface is nine routes; a full HTTP framework is unnecessary
// overhead for a single-machine shim, so this implements HTTP/1.1 framing
// directly over tokio TCP: parse the request line and headers, read
// Content-Length body bytes, dispatch, write one JSON response, close.
//
// # Routes
//
//   GET  /health               liveness + version + default printer
//   GET  /api/printers         cached printer list
//   POST /api/printers/refresh re-enumerate and replace the cache
//   POST /api/print            raw ZPL
//   POST /api/print/image      base64 image onto a label preset
//   POST /api/print/text       plain text onto a label preset
//   POST /api/print/test       fixed test label
//   POST /api/print/batch      several ZPL labels in one call
//   GET  /api/label-sizes      the label preset table
//
// # Status policy
//
// Content-level problems (bad ZPL, oversized image, out-of-range copies)
// are 200 with `success: false` — the payload was understood and refused.
// Non-200 is reserved for transport-level problems: malformed JSON (400),
// unknown printer (404), unknown route (404), wrong method (405).
//
// # Trust boundary
//
// Loopback-only bind, CORS allow-list of local origins, no authentication:
// same machine, same user.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use koinon_bridge_core::error::{BridgeError, Result};
use koinon_bridge_core::{BridgeConfig, HealthSnapshot, PrintOutcome, LABEL_SIZES};

use crate::registry::PrinterRegistry;
use crate::{raster, zpl};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Ceiling on a request. The largest legitimate payload is a 5 MB image
/// base64-encoded (~6.7 MB) inside a JSON envelope.
const MAX_REQUEST_BYTES: usize = 16 * 1024 * 1024;

/// Version string reported by `/health`.
const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// Request DTOs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrintRequest {
    printer_name: Option<String>,
    zpl_content: String,
    copies: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    printer_name: Option<String>,
    base64_image: String,
    label_size: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextRequest {
    printer_name: Option<String>,
    text: String,
    label_size: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestRequest {
    printer_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest {
    printer_name: Option<String>,
    zpl_contents: Vec<String>,
}

// ---------------------------------------------------------------------------
// Minimal HTTP framing
// ---------------------------------------------------------------------------

/// A parsed inbound request.
#[derive(Debug)]
struct HttpRequest {
    method: String,
    path: String,
    origin: Option<String>,
    body: Vec<u8>,
}

/// Read one HTTP/1.1 request from the stream.
///
/// Reads until the header terminator, then exactly Content-Length body
/// bytes. Anything over `MAX_REQUEST_BYTES` or without a parsable request
/// line is an error.
async fn read_request(stream: &mut TcpStream) -> Result<HttpRequest> {
    let mut buf: Vec<u8> = Vec::with_capacity(4096);
    let mut chunk = [0u8; 8192];

    // Headers first.
    let header_end = loop {
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            break pos;
        }
        if buf.len() > MAX_REQUEST_BYTES {
            return Err(BridgeError::Server("request headers too large".into()));
        }
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| BridgeError::Server(format!("read: {e}")))?;
        if n == 0 {
            return Err(BridgeError::Server("connection closed mid-request".into()));
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let header_text = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = header_text.lines();
    let request_line = lines
        .next()
        .ok_or_else(|| BridgeError::Server("empty request".into()))?;
    let mut parts = request_line.split_whitespace();
    let method = parts
        .next()
        .ok_or_else(|| BridgeError::Server("missing method".into()))?
        .to_ascii_uppercase();
    let path = parts
        .next()
        .ok_or_else(|| BridgeError::Server("missing path".into()))?
        .to_string();

    let mut content_length = 0usize;
    let mut origin = None;
    for line in lines {
        if let Some((name, value)) = line.split_once(':') {
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => {
                    content_length = value.trim().parse().unwrap_or(0);
                }
                "origin" => origin = Some(value.trim().to_string()),
                _ => {}
            }
        }
    }

    if content_length > MAX_REQUEST_BYTES {
        return Err(BridgeError::Server(format!(
            "request body of {content_length} bytes exceeds the limit"
        )));
    }

    // Body: whatever arrived past the headers, then read the rest.
    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream
            .read(&mut chunk)
            .await
            .map_err(|e| BridgeError::Server(format!("read body: {e}")))?;
        if n == 0 {
            return Err(BridgeError::Server("connection closed mid-body".into()));
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Ok(HttpRequest {
        method,
        path,
        origin,
        body,
    })
}

/// Find the first occurrence of `needle` in `haystack`.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Write one JSON response and the CORS headers the origin earned.
async fn write_response(
    stream: &mut TcpStream,
    status: u16,
    body: &Value,
    cors_origin: Option<&str>,
) -> Result<()> {
    let body_bytes = serde_json::to_vec(body)?;
    let mut headers = format!(
        "HTTP/1.1 {status} {}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n",
        status_reason(status),
        body_bytes.len()
    );
    if let Some(origin) = cors_origin {
        headers.push_str(&format!(
            "Access-Control-Allow-Origin: {origin}\r\n\
             Access-Control-Allow-Methods: GET, POST, OPTIONS\r\n\
             Access-Control-Allow-Headers: Content-Type\r\n\
             Vary: Origin\r\n"
        ));
    }
    headers.push_str("\r\n");

    stream
        .write_all(headers.as_bytes())
        .await
        .map_err(|e| BridgeError::Server(format!("write headers: {e}")))?;
    stream
        .write_all(&body_bytes)
        .await
        .map_err(|e| BridgeError::Server(format!("write body: {e}")))?;
    stream
        .flush()
        .await
        .map_err(|e| BridgeError::Server(format!("flush: {e}")))?;
    Ok(())
}

fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

// ---------------------------------------------------------------------------
// BridgeServer
// ---------------------------------------------------------------------------

/// State shared across all connection-handling tasks.
struct SharedState {
    registry: Arc<PrinterRegistry>,
    config: BridgeConfig,
}

/// The loopback HTTP server.
pub struct BridgeServer {
    config: BridgeConfig,
    registry: Arc<PrinterRegistry>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    bound_addr: Option<SocketAddr>,
}

impl BridgeServer {
    /// Create a server. Call [`start`](Self::start) to bind and accept.
    pub fn new(config: BridgeConfig, registry: Arc<PrinterRegistry>) -> Self {
        Self {
            config,
            registry,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            bound_addr: None,
        }
    }

    /// The address the server is bound to (after a successful start).
    pub fn bound_addr(&self) -> Option<SocketAddr> {
        self.bound_addr
    }

    /// Bind 127.0.0.1 and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the port is already in use.
    pub async fn start(&mut self) -> Result<SocketAddr> {
        if self.task_handle.is_some() {
            debug!("bridge server already running");
            return self
                .bound_addr
                .ok_or_else(|| BridgeError::Server("running without a bound address".into()));
        }

        // Loopback only — the bridge must never be reachable from the LAN.
        let bind_addr: SocketAddr = ([127, 0, 0, 1], self.config.port).into();
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| BridgeError::Server(format!("bind {bind_addr}: {e}")))?;
        let bound = listener
            .local_addr()
            .map_err(|e| BridgeError::Server(format!("local_addr: {e}")))?;

        info!(addr = %bound, "print bridge listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let shared = Arc::new(SharedState {
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        });

        let handle = tokio::spawn(async move {
            Self::accept_loop(listener, shutdown, shared).await;
        });

        self.task_handle = Some(handle);
        self.bound_addr = Some(bound);
        Ok(bound)
    }

    /// Signal the accept loop to exit and await its completion.
    pub async fn stop(&mut self) -> Result<()> {
        let Some(handle) = self.task_handle.take() else {
            return Ok(());
        };
        info!("stopping print bridge");
        self.shutdown_signal.notify_one();
        handle
            .await
            .map_err(|e| BridgeError::Server(format!("task join: {e}")))?;
        self.bound_addr = None;
        Ok(())
    }

    async fn accept_loop(listener: TcpListener, shutdown: Arc<Notify>, shared: Arc<SharedState>) {
        loop {
            tokio::select! {
                _ = shutdown.notified() => {
                    debug!("accept loop received shutdown signal");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            let state = Arc::clone(&shared);
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, state).await {
                                    warn!(peer = %peer_addr, error = %e, "connection handler error");
                                }
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                        }
                    }
                }
            }
        }
    }
}

/// Handle one connection: read, dispatch, respond, close.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    state: Arc<SharedState>,
) -> Result<()> {
    let request_id = Uuid::new_v4();
    let request = read_request(&mut stream).await?;

    debug!(
        %request_id,
        peer = %peer_addr,
        method = %request.method,
        path = %request.path,
        body_bytes = request.body.len(),
        "request received"
    );

    // An origin not on the allow-list gets no CORS headers; the browser
    // enforces the rest.
    let cors_origin = request
        .origin
        .as_deref()
        .filter(|origin| state.config.origin_allowed(origin));
    if request.origin.is_some() && cors_origin.is_none() {
        warn!(%request_id, origin = ?request.origin, "request from disallowed origin");
    }

    // Preflight is answered for allowed origins without touching a route.
    if request.method == "OPTIONS" {
        return write_response(&mut stream, 204, &json!({}), cors_origin).await;
    }

    let (status, body) = dispatch(&request, &state).await;

    info!(
        %request_id,
        method = %request.method,
        path = %request.path,
        status,
        "request handled"
    );

    write_response(&mut stream, status, &body, cors_origin).await
}

// ---------------------------------------------------------------------------
// Route dispatch
// ---------------------------------------------------------------------------

async fn dispatch(request: &HttpRequest, state: &SharedState) -> (u16, Value) {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/health") => handle_health(state),
        ("GET", "/api/printers") => handle_printers(state),
        ("POST", "/api/printers/refresh") => handle_refresh(state).await,
        ("GET", "/api/label-sizes") => handle_label_sizes(),
        ("POST", "/api/print") => handle_print(&request.body, state).await,
        ("POST", "/api/print/image") => handle_print_image(&request.body, state).await,
        ("POST", "/api/print/text") => handle_print_text(&request.body, state).await,
        ("POST", "/api/print/test") => handle_print_test(&request.body, state).await,
        ("POST", "/api/print/batch") => handle_print_batch(&request.body, state).await,
        (method, path) => {
            if known_path(path) {
                (
                    405,
                    json!({ "success": false, "message": format!("{method} is not allowed for {path}") }),
                )
            } else {
                (
                    404,
                    json!({ "success": false, "message": format!("no such endpoint: {path}") }),
                )
            }
        }
    }
}

fn known_path(path: &str) -> bool {
    matches!(
        path,
        "/health"
            | "/api/printers"
            | "/api/printers/refresh"
            | "/api/label-sizes"
            | "/api/print"
            | "/api/print/image"
            | "/api/print/text"
            | "/api/print/test"
            | "/api/print/batch"
    )
}

/// Parse a JSON request body, mapping failure to a 400 response.
fn parse_body<T: for<'de> Deserialize<'de>>(body: &[u8]) -> std::result::Result<T, (u16, Value)> {
    serde_json::from_slice(body).map_err(|e| {
        (
            400,
            json!({ "success": false, "message": format!("malformed request body: {e}") }),
        )
    })
}

/// Map a printer-resolution failure to its transport-level response.
fn resolve_failure(e: BridgeError) -> (u16, Value) {
    (404, json!({ "success": false, "message": e.to_string() }))
}

fn outcome_response(outcome: PrintOutcome) -> (u16, Value) {
    // Content-level refusals and spooler failures are both 200; the body
    // carries the verdict.
    (
        200,
        json!({
            "success": outcome.success,
            "message": outcome.message,
            "printerName": outcome.printer_name,
        }),
    )
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

fn handle_health(state: &SharedState) -> (u16, Value) {
    let snapshot = HealthSnapshot {
        status: "healthy".into(),
        version: BRIDGE_VERSION.into(),
        default_printer: state
            .registry
            .resolve(None)
            .ok()
            .map(|printer| printer.name),
        timestamp: Utc::now(),
    };
    (200, serde_json::to_value(snapshot).unwrap_or_default())
}

fn handle_printers(state: &SharedState) -> (u16, Value) {
    let printers = state.registry.list();
    let count = printers.len();
    let zebra_count = printers.iter().filter(|p| p.is_zpl()).count();
    (
        200,
        json!({
            "printers": printers,
            "count": count,
            "zebraCount": zebra_count,
        }),
    )
}

async fn handle_refresh(state: &SharedState) -> (u16, Value) {
    // Enumeration talks to the OS spooler; keep it off the reactor.
    let registry = Arc::clone(&state.registry);
    let count = tokio::task::spawn_blocking(move || registry.refresh())
        .await
        .unwrap_or(0);
    (
        200,
        json!({
            "message": format!("printer list refreshed, {count} found"),
            "count": count,
        }),
    )
}

fn handle_label_sizes() -> (u16, Value) {
    (200, json!({ "labelSizes": LABEL_SIZES }))
}

async fn handle_print(body: &[u8], state: &SharedState) -> (u16, Value) {
    let request: PrintRequest = match parse_body(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let printer = match state.registry.resolve(request.printer_name.as_deref()) {
        Ok(p) => p,
        Err(e) => return resolve_failure(e),
    };
    let copies = request.copies.unwrap_or(1);
    let outcome = zpl::print(
        state.registry.spooler(),
        &printer,
        &request.zpl_content,
        copies,
    )
    .await;
    outcome_response(outcome)
}

async fn handle_print_image(body: &[u8], state: &SharedState) -> (u16, Value) {
    let request: ImageRequest = match parse_body(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let printer = match state.registry.resolve(request.printer_name.as_deref()) {
        Ok(p) => p,
        Err(e) => return resolve_failure(e),
    };
    let outcome = raster::print_image(
        state.registry.spooler(),
        &printer,
        &request.base64_image,
        request.label_size.as_deref(),
    )
    .await;
    outcome_response(outcome)
}

async fn handle_print_text(body: &[u8], state: &SharedState) -> (u16, Value) {
    let request: TextRequest = match parse_body(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let printer = match state.registry.resolve(request.printer_name.as_deref()) {
        Ok(p) => p,
        Err(e) => return resolve_failure(e),
    };
    let outcome = raster::print_text(
        state.registry.spooler(),
        &printer,
        &request.text,
        request.label_size.as_deref(),
    )
    .await;
    outcome_response(outcome)
}

async fn handle_print_test(body: &[u8], state: &SharedState) -> (u16, Value) {
    // An empty body means "test the default printer".
    let request: TestRequest = if body.is_empty() {
        TestRequest::default()
    } else {
        match parse_body(body) {
            Ok(r) => r,
            Err(response) => return response,
        }
    };
    let printer = match state.registry.resolve(request.printer_name.as_deref()) {
        Ok(p) => p,
        Err(e) => return resolve_failure(e),
    };
    let outcome = zpl::print(state.registry.spooler(), &printer, &zpl::test_label(), 1).await;
    outcome_response(outcome)
}

async fn handle_print_batch(body: &[u8], state: &SharedState) -> (u16, Value) {
    let request: BatchRequest = match parse_body(body) {
        Ok(r) => r,
        Err(response) => return response,
    };
    let printer = match state.registry.resolve(request.printer_name.as_deref()) {
        Ok(p) => p,
        Err(e) => return resolve_failure(e),
    };

    if request.zpl_contents.is_empty() {
        return (
            200,
            json!({
                "success": false,
                "message": "batch contains no labels",
                "printerName": printer.name,
                "labelCount": 0,
            }),
        );
    }

    // Validate the whole batch before sending anything: a batch of badges
    // with one bad label should print nothing rather than half a roll.
    for (index, content) in request.zpl_contents.iter().enumerate() {
        if let Err(message) = zpl::validate(content) {
            return (
                200,
                json!({
                    "success": false,
                    "message": format!("label {} of {}: {message}", index + 1, request.zpl_contents.len()),
                    "printerName": printer.name,
                    "labelCount": 0,
                }),
            );
        }
    }

    let mut sent = 0usize;
    for content in &request.zpl_contents {
        let outcome = zpl::print(state.registry.spooler(), &printer, content, 1).await;
        if !outcome.success {
            return (
                200,
                json!({
                    "success": false,
                    "message": format!("batch stopped after {sent} labels: {}", outcome.message),
                    "printerName": printer.name,
                    "labelCount": sent,
                }),
            );
        }
        sent += 1;
    }

    (
        200,
        json!({
            "success": true,
            "message": format!("{sent} labels sent to {}", printer.name),
            "printerName": printer.name,
            "labelCount": sent,
        }),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
