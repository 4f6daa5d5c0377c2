// SPDX-License-Identifier: MIT

//! Typed client for the Koinon print bridge.
//!
//! For kiosk-adjacent Rust tooling that talks to the bridge the same way
//! the browser client does: loopback HTTP, JSON bodies, one request per
//! connection. Validates payloads locally and caches availability so a
//! burst of labels costs one health probe.
//!
//! ```no_run
//! use koinon_bridge_client::BridgeClient;
//!
//! # async fn example() -> Result<(), koinon_bridge_client::ClientError> {
//! let client = BridgeClient::new();
//! if client.is_available().await {
//!     client.print(None, "^XA^FO40,40^FDAlice^FS^XZ", 1).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;

pub use client::{BatchOutcome, BridgeClient, LabelSizeInfo, PrinterList};
pub use error::{ClientError, Result};
