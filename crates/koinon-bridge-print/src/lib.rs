// SPDX-License-Identifier: MIT
//
// Koinon Bridge Print — printer registry, the ZPL and raster transports,
// and the loopback HTTP endpoint layer. This crate bridges between the
// core domain types in `koinon-bridge-core` and the OS spooler access in
// `koinon-bridge-spool`.

pub mod raster;
pub mod registry;
pub mod server;
pub mod zpl;

pub use registry::PrinterRegistry;
pub use server::BridgeServer;
