// SPDX-License-Identifier: MIT
//
// Unified error types for the Koinon print bridge.

use thiserror::Error;

/// Top-level error type for all bridge operations.
///
/// Content-level problems with a print payload (bad framing, oversized,
/// deny-listed commands) are *not* errors — the transports report those as
/// a failed [`crate::types::PrintOutcome`] so they never escape the
/// transport boundary. This enum covers everything else.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Spooler / OS --
    #[error("printer enumeration failed: {0}")]
    Enumeration(String),

    #[error("printer not found: {0}")]
    PrinterNotFound(String),

    #[error("no printers installed")]
    NoPrinters,

    #[error("spooler operation failed: {0}")]
    Spooler(String),

    #[error("printing is not supported on this platform")]
    PlatformUnavailable,

    // -- Rendering --
    #[error("image processing failed: {0}")]
    Image(String),

    #[error("no usable font found for text rendering: {0}")]
    Font(String),

    // -- HTTP endpoint layer --
    #[error("print server error: {0}")]
    Server(String),

    // -- Config / persistence --
    #[error("configuration error: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;
