// SPDX-License-Identifier: MIT
//
// Non-Windows stub. The bridge only ships on Windows check-in stations;
// this keeps development builds and CI working elsewhere.

use koinon_bridge_core::error::{BridgeError, Result};
use tracing::warn;

use crate::traits::{RawPrinter, Spooler};

pub struct StubSpooler;

impl Spooler for StubSpooler {
    fn platform_name(&self) -> &'static str {
        "stub"
    }

    fn enumerate(&self) -> Result<Vec<RawPrinter>> {
        warn!("printer enumeration requested on unsupported platform");
        Ok(Vec::new())
    }

    fn submit_raw(&self, _printer: &str, _data: &[u8], _doc_name: &str) -> Result<()> {
        Err(BridgeError::PlatformUnavailable)
    }

    fn submit_bitmap(
        &self,
        _printer: &str,
        _width: u32,
        _height: u32,
        _pixels: &[u8],
        _doc_name: &str,
    ) -> Result<()> {
        Err(BridgeError::PlatformUnavailable)
    }
}
