// SPDX-License-Identifier: MIT
//
// Platform-agnostic spooler trait.
//
// All methods are blocking — winspool and GDI calls are synchronous and can
// stall on a wedged driver. Async callers must wrap them in
// `tokio::task::spawn_blocking`.

use koinon_bridge_core::error::Result;
use koinon_bridge_core::PrinterStatus;

/// One OS-registered printer as the spooler reports it, before the bridge
/// classifies its capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPrinter {
    /// Spooler key. All submission calls address printers by this name.
    pub name: String,
    /// Installed driver name, used alongside `name` for classification.
    pub driver: String,
    /// Spooler status collapsed to the bridge's categories.
    pub status: PrinterStatus,
    /// Whether the OS reports this printer as the system default.
    pub is_default: bool,
}

/// Low-level access to the operating system's print pipeline.
pub trait Spooler: Send + Sync {
    /// Human-readable backend name for logs ("winspool", "stub", "mock").
    fn platform_name(&self) -> &'static str;

    /// Enumerate installed printers.
    ///
    /// # Errors
    ///
    /// Returns an error only when the spooler subsystem itself is
    /// unreachable. Callers that want "no printers" rather than a failure
    /// should map the error to an empty list.
    fn enumerate(&self) -> Result<Vec<RawPrinter>>;

    /// Write raw command-language bytes (ZPL) straight to the named
    /// printer's queue, bypassing any driver rendering.
    fn submit_raw(&self, printer: &str, data: &[u8], doc_name: &str) -> Result<()>;

    /// Print a decoded bitmap through the OS print pipeline with zero
    /// margins. `pixels` is tightly packed RGB8, row-major, `width * 3`
    /// bytes per row.
    fn submit_bitmap(
        &self,
        printer: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        doc_name: &str,
    ) -> Result<()>;
}
