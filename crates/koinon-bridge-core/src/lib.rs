// SPDX-License-Identifier: MIT
//
// Koinon Print Bridge — core types, errors, and configuration shared across
// all crates.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BridgeConfig, DEFAULT_PORT};
pub use error::BridgeError;
pub use types::*;
