// SPDX-License-Identifier: MIT
//
// OS print-spooler bridge.
//
// Defines the `Spooler` trait that the rest of the bridge programs against,
// and dispatches to the platform backend: direct winspool/GDI access on
// Windows (the bridge's production platform), and a stub everywhere else so
// the workspace builds and tests on any OS. A recording mock is provided
// for transport and endpoint tests.

pub mod mock;
pub mod traits;

#[cfg(windows)]
pub mod windows;

#[cfg(not(windows))]
pub mod stub;

use std::sync::Arc;

pub use traits::{RawPrinter, Spooler};

/// The spooler implementation for the target operating system.
pub fn platform_spooler() -> Arc<dyn Spooler> {
    #[cfg(windows)]
    {
        Arc::new(windows::WindowsSpooler::new())
    }
    #[cfg(not(windows))]
    {
        Arc::new(stub::StubSpooler)
    }
}
