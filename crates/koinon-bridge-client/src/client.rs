// SPDX-License-Identifier: MIT

//! The bridge client.
//!
//! Speaks the loopback JSON API over raw TCP, mirroring the server's
//! one-request-per-connection framing. Payloads are validated locally
//! before any network traffic so the common mistakes (bad framing, zero
//! copies) fail instantly even when the bridge is down.

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, warn};

use koinon_bridge_core::{HealthSnapshot, PrintOutcome, PrinterInfo, DEFAULT_PORT};

use crate::error::{ClientError, Result};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// How long a positive health probe is trusted before re-probing. Check-in
/// bursts print several labels per family; one probe covers the burst.
const AVAILABILITY_TTL: Duration = Duration::from_secs(5);

/// Per-request wall-clock budget, connect included.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_ZPL_BYTES: usize = 100 * 1024;
const MIN_COPIES: u32 = 1;
const MAX_COPIES: u32 = 999;

// ---------------------------------------------------------------------------
// Response DTOs
// ---------------------------------------------------------------------------

/// `GET /api/printers` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterList {
    pub printers: Vec<PrinterInfo>,
    pub count: usize,
    pub zebra_count: usize,
}

/// `POST /api/print/batch` response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub success: bool,
    pub message: String,
    pub printer_name: Option<String>,
    pub label_count: usize,
}

/// One entry from `GET /api/label-sizes`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSizeInfo {
    pub name: String,
    pub width_inches: f32,
    pub height_inches: f32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LabelSizesResponse {
    label_sizes: Vec<LabelSizeInfo>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    count: usize,
}

// ---------------------------------------------------------------------------
// BridgeClient
// ---------------------------------------------------------------------------

/// Typed client for the print bridge.
///
/// Cheap to construct; holds no connection. Each call opens one TCP
/// connection, sends one request, and reads one response.
pub struct BridgeClient {
    port: u16,
    timeout: Duration,
    /// When the bridge last answered a health probe. `None` after any
    /// network failure, forcing the next availability check back onto
    /// the wire.
    last_seen: Mutex<Option<Instant>>,
}

impl Default for BridgeClient {
    fn default() -> Self {
        Self::new()
    }
}

impl BridgeClient {
    /// Client against the default bridge port.
    pub fn new() -> Self {
        Self::with_port(DEFAULT_PORT)
    }

    pub fn with_port(port: u16) -> Self {
        Self {
            port,
            timeout: DEFAULT_TIMEOUT,
            last_seen: Mutex::new(None),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    // -- availability -------------------------------------------------------

    /// Whether the bridge is up. A positive answer is cached briefly so a
    /// burst of label prints costs one probe, not one per label.
    pub async fn is_available(&self) -> bool {
        if let Some(seen) = *self.last_seen.lock().expect("availability lock") {
            if seen.elapsed() < AVAILABILITY_TTL {
                return true;
            }
        }
        match self.request("GET", "/health", None).await {
            Ok((200, _)) => {
                self.mark_available();
                true
            }
            Ok((status, _)) => {
                warn!(status, "bridge health probe returned non-200");
                false
            }
            Err(e) => {
                debug!(error = %e, "bridge health probe failed");
                false
            }
        }
    }

    async fn ensure_available(&self) -> Result<()> {
        if self.is_available().await {
            Ok(())
        } else {
            Err(ClientError::NotAvailable)
        }
    }

    fn mark_available(&self) {
        *self.last_seen.lock().expect("availability lock") = Some(Instant::now());
    }

    fn invalidate_availability(&self) {
        *self.last_seen.lock().expect("availability lock") = None;
    }

    // -- queries ------------------------------------------------------------

    pub async fn health(&self) -> Result<HealthSnapshot> {
        let (status, body) = self.request("GET", "/health", None).await?;
        expect_200(status, &body)?;
        parse(body)
    }

    pub async fn printers(&self) -> Result<PrinterList> {
        let (status, body) = self.request("GET", "/api/printers", None).await?;
        expect_200(status, &body)?;
        parse(body)
    }

    /// Ask the bridge to re-enumerate printers; returns the new count.
    pub async fn refresh_printers(&self) -> Result<usize> {
        let (status, body) = self
            .request("POST", "/api/printers/refresh", Some(json!({})))
            .await?;
        expect_200(status, &body)?;
        let response: RefreshResponse = parse(body)?;
        Ok(response.count)
    }

    pub async fn label_sizes(&self) -> Result<Vec<LabelSizeInfo>> {
        let (status, body) = self.request("GET", "/api/label-sizes", None).await?;
        expect_200(status, &body)?;
        let response: LabelSizesResponse = parse(body)?;
        Ok(response.label_sizes)
    }

    // -- printing -----------------------------------------------------------

    /// Print raw ZPL. `printer` of `None` routes to the bridge's default.
    pub async fn print(
        &self,
        printer: Option<&str>,
        zpl_content: &str,
        copies: u32,
    ) -> Result<PrintOutcome> {
        validate_zpl(zpl_content)?;
        if !(MIN_COPIES..=MAX_COPIES).contains(&copies) {
            return Err(ClientError::InvalidCopies(copies));
        }
        self.ensure_available().await?;

        let body = json!({
            "printerName": printer,
            "zplContent": zpl_content,
            "copies": copies,
        });
        let (status, body) = self.request("POST", "/api/print", Some(body)).await?;
        outcome_from(status, body)
    }

    /// Print a base64-encoded image onto a label preset.
    pub async fn print_image(
        &self,
        printer: Option<&str>,
        base64_image: &str,
        label_size: Option<&str>,
    ) -> Result<PrintOutcome> {
        if base64_image.trim().is_empty() {
            return Err(ClientError::InvalidImage("image payload is empty".into()));
        }
        self.ensure_available().await?;

        let body = json!({
            "printerName": printer,
            "base64Image": base64_image,
            "labelSize": label_size,
        });
        let (status, body) = self.request("POST", "/api/print/image", Some(body)).await?;
        outcome_from(status, body)
    }

    /// Print plain text onto a label preset.
    pub async fn print_text(
        &self,
        printer: Option<&str>,
        text: &str,
        label_size: Option<&str>,
    ) -> Result<PrintOutcome> {
        self.ensure_available().await?;

        let body = json!({
            "printerName": printer,
            "text": text,
            "labelSize": label_size,
        });
        let (status, body) = self.request("POST", "/api/print/text", Some(body)).await?;
        outcome_from(status, body)
    }

    /// Ask the bridge to print its built-in test label.
    pub async fn test_print(&self, printer: Option<&str>) -> Result<PrintOutcome> {
        self.ensure_available().await?;

        let body = json!({ "printerName": printer });
        let (status, body) = self.request("POST", "/api/print/test", Some(body)).await?;
        outcome_from(status, body)
    }

    /// Print several ZPL labels in one call. The bridge validates the whole
    /// batch before sending anything; so does the client.
    pub async fn batch_print(
        &self,
        printer: Option<&str>,
        zpl_contents: &[String],
    ) -> Result<BatchOutcome> {
        if zpl_contents.is_empty() {
            return Err(ClientError::InvalidZpl("batch contains no labels".into()));
        }
        for (index, content) in zpl_contents.iter().enumerate() {
            validate_zpl(content).map_err(|e| {
                ClientError::InvalidZpl(format!("label {} of {}: {e}", index + 1, zpl_contents.len()))
            })?;
        }
        self.ensure_available().await?;

        let body = json!({
            "printerName": printer,
            "zplContents": zpl_contents,
        });
        let (status, body) = self.request("POST", "/api/print/batch", Some(body)).await?;
        if status != 200 {
            return Err(ClientError::PrintFailed(message_of(&body)));
        }
        let outcome: BatchOutcome = parse(body)?;
        if !outcome.success {
            return Err(ClientError::PrintFailed(outcome.message));
        }
        Ok(outcome)
    }

    // -- transport ----------------------------------------------------------

    /// One HTTP/1.1 exchange. Any transport failure drops the availability
    /// cache so the next call re-probes instead of trusting a stale answer.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<(u16, Value)> {
        let addr: SocketAddr = ([127, 0, 0, 1], self.port).into();
        let body_text = body.map(|b| b.to_string()).unwrap_or_default();
        let request = format!(
            "{method} {path} HTTP/1.1\r\n\
             Host: 127.0.0.1\r\n\
             Content-Type: application/json\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n{body_text}",
            body_text.len()
        );

        let exchange = async {
            let mut stream = TcpStream::connect(addr).await?;
            stream.write_all(request.as_bytes()).await?;
            let mut response = Vec::new();
            stream.read_to_end(&mut response).await?;
            std::io::Result::Ok(response)
        };

        let response = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                self.invalidate_availability();
                return Err(ClientError::Network(e.to_string()));
            }
            Err(_) => {
                self.invalidate_availability();
                return Err(ClientError::Timeout);
            }
        };

        parse_response(&response)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Local framing and size checks. Content policy (the command deny-list)
/// stays on the bridge; the client only catches mistakes worth failing
/// fast on.
fn validate_zpl(content: &str) -> Result<()> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidZpl("content is empty".into()));
    }
    if content.len() > MAX_ZPL_BYTES {
        return Err(ClientError::InvalidZpl(format!(
            "content is {} bytes, the limit is {MAX_ZPL_BYTES}",
            content.len()
        )));
    }
    if !trimmed.starts_with("^XA") || !trimmed.ends_with("^XZ") {
        return Err(ClientError::InvalidZpl(
            "content must start with ^XA and end with ^XZ".into(),
        ));
    }
    Ok(())
}

fn parse_response(raw: &[u8]) -> Result<(u16, Value)> {
    let text = String::from_utf8_lossy(raw);
    let status: u16 = text
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| ClientError::InvalidResponse("missing status line".into()))?;
    let body_start = text
        .find("\r\n\r\n")
        .ok_or_else(|| ClientError::InvalidResponse("missing header terminator".into()))?;
    let body: Value = serde_json::from_str(text[body_start + 4..].trim())
        .map_err(|e| ClientError::InvalidResponse(format!("body is not JSON: {e}")))?;
    Ok((status, body))
}

fn parse<T: for<'de> Deserialize<'de>>(body: Value) -> Result<T> {
    serde_json::from_value(body)
        .map_err(|e| ClientError::InvalidResponse(format!("unexpected shape: {e}")))
}

fn expect_200(status: u16, body: &Value) -> Result<()> {
    if status == 200 {
        Ok(())
    } else {
        Err(ClientError::PrintFailed(message_of(body)))
    }
}

/// Map a print response to an outcome, turning refusals into typed errors.
fn outcome_from(status: u16, body: Value) -> Result<PrintOutcome> {
    if status != 200 {
        return Err(ClientError::PrintFailed(message_of(&body)));
    }
    let outcome: PrintOutcome = parse(body)?;
    if !outcome.success {
        return Err(ClientError::PrintFailed(outcome.message));
    }
    Ok(outcome)
}

fn message_of(body: &Value) -> String {
    body.get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::net::TcpListener;

    /// A scripted bridge: answers every request with the given JSON and
    /// counts how many connections it served.
    async fn scripted_bridge(response_body: Value) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_inner = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                hits_inner.fetch_add(1, Ordering::SeqCst);
                let body = response_body.to_string();
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                     Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                // Drain the request before answering so the client's write
                // never hits a closed socket.
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response.as_bytes()).await;
            }
        });

        (port, hits)
    }

    #[tokio::test]
    async fn bad_copies_fail_before_any_network_traffic() {
        // Port with nothing listening; a network attempt would surface as
        // a different error.
        let client = BridgeClient::with_port(1).with_timeout(Duration::from_millis(200));
        let err = client
            .print(None, "^XA^FDX^FS^XZ", 0)
            .await
            .expect_err("zero copies");
        assert_eq!(err.code(), "INVALID_COPIES");

        let err = client
            .print(None, "^XA^FDX^FS^XZ", 1000)
            .await
            .expect_err("too many copies");
        assert_eq!(err.code(), "INVALID_COPIES");
    }

    #[tokio::test]
    async fn bad_zpl_fails_before_any_network_traffic() {
        let client = BridgeClient::with_port(1).with_timeout(Duration::from_millis(200));
        let err = client
            .print(None, "no framing", 1)
            .await
            .expect_err("unframed content");
        assert_eq!(err.code(), "INVALID_ZPL");

        let err = client
            .batch_print(None, &["^XA^XZ".into(), "bad".into()])
            .await
            .expect_err("bad batch member");
        assert_eq!(err.code(), "INVALID_ZPL");
        assert!(err.to_string().contains("label 2 of 2"), "{err}");
    }

    #[tokio::test]
    async fn availability_is_cached_within_the_ttl() {
        let (port, hits) = scripted_bridge(json!({
            "status": "healthy", "version": "0.0.0", "timestamp": "2026-01-01T00:00:00Z",
        }))
        .await;
        let client = BridgeClient::with_port(port);

        assert!(client.is_available().await);
        assert!(client.is_available().await);
        assert!(client.is_available().await);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn down_bridge_reports_not_available() {
        let client = BridgeClient::with_port(1).with_timeout(Duration::from_millis(200));
        assert!(!client.is_available().await);

        let err = client
            .print(None, "^XA^FDX^FS^XZ", 1)
            .await
            .expect_err("bridge is down");
        assert_eq!(err.code(), "NOT_AVAILABLE");
    }

    #[tokio::test]
    async fn network_failure_invalidates_the_availability_cache() {
        // Serve exactly one health probe, then go away.
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.expect("accept");
            let body = json!({
                "status": "healthy", "version": "0.0.0",
                "timestamp": "2026-01-01T00:00:00Z",
            })
            .to_string();
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                 Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf).await;
            let _ = stream.write_all(response.as_bytes()).await;
            // Listener drops here; the port refuses from now on.
        });

        let client = BridgeClient::with_port(port).with_timeout(Duration::from_millis(500));
        assert!(client.is_available().await);

        // The cached answer lets the print attempt reach the wire, where it
        // fails and must take the cache down with it.
        let err = client
            .print(None, "^XA^FDX^FS^XZ", 1)
            .await
            .expect_err("bridge went away");
        assert!(
            matches!(err, ClientError::Network(_) | ClientError::Timeout),
            "{err}"
        );
        assert!(!client.is_available().await);
    }

    #[tokio::test]
    async fn successful_print_returns_the_outcome() {
        let (port, _) = scripted_bridge(json!({
            "success": true,
            "message": "1 label sent to Zebra ZD410",
            "printerName": "Zebra ZD410",
        }))
        .await;
        let client = BridgeClient::with_port(port);
        // The scripted bridge answers everything 200, health probe included.
        let outcome = client
            .print(Some("Zebra ZD410"), "^XA^FDX^FS^XZ", 1)
            .await
            .expect("print");
        assert!(outcome.success);
        assert_eq!(outcome.printer_name.as_deref(), Some("Zebra ZD410"));
    }

    #[tokio::test]
    async fn refused_print_surfaces_as_print_failed() {
        let (port, _) = scripted_bridge(json!({
            "success": false,
            "message": "forbidden ZPL command ~JR",
            "printerName": null,
        }))
        .await;
        let client = BridgeClient::with_port(port);
        let err = client
            .print(None, "^XA~JR^XZ", 1)
            .await
            .expect_err("refused");
        assert_eq!(err.code(), "PRINT_FAILED");
        assert!(err.to_string().contains("~JR"), "{err}");
    }
}
