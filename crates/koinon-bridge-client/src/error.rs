// SPDX-License-Identifier: MIT

//! Client-side error taxonomy.
//!
//! Each variant carries a stable string code so the kiosk UI can branch on
//! failures (and show translated messages) without parsing English text.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The bridge did not answer a health probe.
    #[error("print bridge is not running")]
    NotAvailable,

    /// The bridge accepted the connection but did not answer in time.
    #[error("request to the print bridge timed out")]
    Timeout,

    /// A transport-level failure mid-request.
    #[error("network error talking to the print bridge: {0}")]
    Network(String),

    /// The payload failed local validation before any network traffic.
    #[error("invalid ZPL: {0}")]
    InvalidZpl(String),

    /// Copies outside the accepted range.
    #[error("copies must be between 1 and 999, got {0}")]
    InvalidCopies(u32),

    /// The image payload failed local validation.
    #[error("invalid image payload: {0}")]
    InvalidImage(String),

    /// The bridge understood the request and reported a failure.
    #[error("print failed: {0}")]
    PrintFailed(String),

    /// The bridge answered with something the client could not parse.
    #[error("unexpected response from the print bridge: {0}")]
    InvalidResponse(String),
}

impl ClientError {
    /// Stable machine-readable code for UI branching.
    pub fn code(&self) -> &'static str {
        match self {
            ClientError::NotAvailable => "NOT_AVAILABLE",
            ClientError::Timeout => "TIMEOUT",
            ClientError::Network(_) => "NETWORK_ERROR",
            ClientError::InvalidZpl(_) => "INVALID_ZPL",
            ClientError::InvalidCopies(_) => "INVALID_COPIES",
            ClientError::InvalidImage(_) => "INVALID_IMAGE",
            ClientError::PrintFailed(_) => "PRINT_FAILED",
            ClientError::InvalidResponse(_) => "INVALID_RESPONSE",
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ClientError::NotAvailable.code(), "NOT_AVAILABLE");
        assert_eq!(ClientError::Timeout.code(), "TIMEOUT");
        assert_eq!(ClientError::Network("x".into()).code(), "NETWORK_ERROR");
        assert_eq!(ClientError::InvalidZpl("x".into()).code(), "INVALID_ZPL");
        assert_eq!(ClientError::InvalidCopies(0).code(), "INVALID_COPIES");
        assert_eq!(ClientError::InvalidImage("x".into()).code(), "INVALID_IMAGE");
        assert_eq!(ClientError::PrintFailed("x".into()).code(), "PRINT_FAILED");
        assert_eq!(
            ClientError::InvalidResponse("x".into()).code(),
            "INVALID_RESPONSE"
        );
    }
}
