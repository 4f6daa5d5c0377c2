// SPDX-License-Identifier: MIT
//
// Printer registry: enumeration, capability classification, and an
// explicit-refresh cache.
//
// The cache is plain owned state with one mutator, `refresh()` — there is
// no TTL and no background invalidation. Callers see whatever the last
// enumeration produced until someone asks for a new one. Classification is
// a pure function over a static keyword table so it can be tested without
// touching any OS API.

use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use koinon_bridge_core::error::{BridgeError, Result};
use koinon_bridge_core::{PrinterCapability, PrinterInfo};
use koinon_bridge_spool::{RawPrinter, Spooler};

/// Name/driver substrings (lowercase) identifying ZPL-capable printers.
const ZPL_KEYWORDS: &[&str] = &[
    "zebra", "zdesigner", "zpl", "gk420", "gx420", "gx430", "zd410", "zd420", "zd500", "zt230",
    "zt410", "lp2844", "tlp2844",
];

/// Name/driver substrings (lowercase) identifying raster-capable printers.
const IMAGE_KEYWORDS: &[&str] = &[
    "dymo", "brother", "hp ", "hewlett", "laserjet", "officejet", "deskjet", "epson", "canon",
    "lexmark", "kyocera", "ricoh", "xerox", "oki",
];

/// Classify a printer's payload capability from its name and driver.
///
/// Case-insensitive substring match; ZPL keywords win over raster keywords
/// because some Zebra drivers embed a vendor word in their description.
pub fn classify(name: &str, driver: &str) -> PrinterCapability {
    let haystack = format!("{} {}", name, driver).to_ascii_lowercase();
    if ZPL_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return PrinterCapability::Zpl;
    }
    if IMAGE_KEYWORDS.iter().any(|kw| haystack.contains(kw)) {
        return PrinterCapability::Image;
    }
    PrinterCapability::Unknown
}

/// Cache of installed printers with explicit refresh.
pub struct PrinterRegistry {
    spooler: Arc<dyn Spooler>,
    /// Snapshot from the last enumeration. Replaced wholesale on refresh,
    /// never patched.
    cache: Mutex<Vec<PrinterInfo>>,
    /// Configured preferred printer; checked before the OS default when
    /// resolving an unnamed request.
    configured_default: Option<String>,
}

impl PrinterRegistry {
    /// Build the registry and run the initial enumeration.
    pub fn new(spooler: Arc<dyn Spooler>, configured_default: Option<String>) -> Self {
        let registry = Self {
            spooler,
            cache: Mutex::new(Vec::new()),
            configured_default,
        };
        registry.refresh();
        registry
    }

    /// Snapshot of the cached printer list.
    pub fn list(&self) -> Vec<PrinterInfo> {
        self.cache.lock().expect("printer cache lock").clone()
    }

    /// Re-enumerate installed printers, replacing the cache. Returns the
    /// new count.
    ///
    /// Enumeration failure (spooler subsystem unavailable) yields an empty
    /// cache rather than an error, so the kiosk can still report "no
    /// printers" instead of crashing.
    pub fn refresh(&self) -> usize {
        let printers = match self.spooler.enumerate() {
            Ok(raw) => raw.into_iter().map(to_info).collect::<Vec<_>>(),
            Err(e) => {
                warn!(error = %e, backend = self.spooler.platform_name(), "printer enumeration failed — caching empty list");
                Vec::new()
            }
        };
        let count = printers.len();
        let zpl = printers.iter().filter(|p| p.is_zpl()).count();
        info!(count, zpl, "printer cache refreshed");
        *self.cache.lock().expect("printer cache lock") = printers;
        count
    }

    /// Resolve the printer a job should go to.
    ///
    /// Order: the requested name, the configured default, the OS default,
    /// the first ZPL-capable printer.
    ///
    /// # Errors
    ///
    /// `PrinterNotFound` when a requested name is not installed;
    /// `NoPrinters` when nothing can be resolved.
    pub fn resolve(&self, requested: Option<&str>) -> Result<PrinterInfo> {
        let cache = self.cache.lock().expect("printer cache lock");

        if let Some(name) = requested {
            return cache
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
                .cloned()
                .ok_or_else(|| BridgeError::PrinterNotFound(name.to_string()));
        }

        if let Some(name) = self.configured_default.as_deref() {
            if let Some(printer) = cache.iter().find(|p| p.name.eq_ignore_ascii_case(name)) {
                return Ok(printer.clone());
            }
            warn!(
                configured = name,
                "configured default printer is not installed — falling back"
            );
        }

        if let Some(printer) = cache.iter().find(|p| p.is_default) {
            return Ok(printer.clone());
        }

        if let Some(printer) = cache.iter().find(|p| p.is_zpl()) {
            return Ok(printer.clone());
        }

        Err(BridgeError::NoPrinters)
    }

    /// Number of ZPL-capable printers in the cache.
    pub fn zpl_count(&self) -> usize {
        self.cache
            .lock()
            .expect("printer cache lock")
            .iter()
            .filter(|p| p.is_zpl())
            .count()
    }

    /// Shared handle to the underlying spooler backend.
    pub fn spooler(&self) -> Arc<dyn Spooler> {
        Arc::clone(&self.spooler)
    }
}

fn to_info(raw: RawPrinter) -> PrinterInfo {
    let capability = classify(&raw.name, &raw.driver);
    PrinterInfo {
        name: raw.name,
        status: raw.status,
        is_default: raw.is_default,
        capability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koinon_bridge_core::PrinterStatus;
    use koinon_bridge_spool::mock::MockSpooler;

    fn raw(name: &str, driver: &str, is_default: bool) -> RawPrinter {
        RawPrinter {
            name: name.into(),
            driver: driver.into(),
            status: PrinterStatus::Ready,
            is_default,
        }
    }

    #[test]
    fn classifies_zebra_by_name() {
        assert_eq!(classify("Zebra ZD410", ""), PrinterCapability::Zpl);
    }

    #[test]
    fn classifies_zdesigner_driver() {
        assert_eq!(
            classify("Front Desk Labels", "ZDesigner GK420d"),
            PrinterCapability::Zpl
        );
    }

    #[test]
    fn classifies_office_printer_as_image() {
        assert_eq!(
            classify("Office", "Brother HL-L2350DW series"),
            PrinterCapability::Image
        );
    }

    #[test]
    fn classification_is_case_insensitive() {
        assert_eq!(classify("ZEBRA zd620", ""), PrinterCapability::Zpl);
    }

    #[test]
    fn unmatched_printer_is_unknown() {
        assert_eq!(
            classify("Microsoft Print to PDF", "Microsoft Print To PDF"),
            PrinterCapability::Unknown
        );
    }

    #[test]
    fn refresh_replaces_cache_wholesale() {
        let mock = Arc::new(MockSpooler::new());
        mock.add_printer(raw("Zebra ZD410", "ZDesigner", true));
        let registry = PrinterRegistry::new(mock.clone(), None);
        assert_eq!(registry.list().len(), 1);

        mock.add_printer(raw("Brother HL", "Brother", false));
        // Cache unchanged until an explicit refresh.
        assert_eq!(registry.list().len(), 1);
        assert_eq!(registry.refresh(), 2);
        assert_eq!(registry.list().len(), 2);
    }

    #[test]
    fn enumeration_failure_yields_empty_list() {
        let mock = Arc::new(MockSpooler::new());
        mock.fail_enumeration();
        let registry = PrinterRegistry::new(mock, None);
        assert!(registry.list().is_empty());
        assert_eq!(registry.refresh(), 0);
    }

    #[test]
    fn resolve_prefers_requested_name() {
        let mock = Arc::new(MockSpooler::new());
        mock.add_printer(raw("Zebra A", "ZDesigner", true));
        mock.add_printer(raw("Zebra B", "ZDesigner", false));
        let registry = PrinterRegistry::new(mock, None);

        let printer = registry.resolve(Some("Zebra B")).unwrap();
        assert_eq!(printer.name, "Zebra B");
    }

    #[test]
    fn resolve_unknown_name_errors() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let registry = PrinterRegistry::new(mock, None);
        let result = registry.resolve(Some("Nope"));
        assert!(matches!(result, Err(BridgeError::PrinterNotFound(_))));
    }

    #[test]
    fn resolve_prefers_configured_default_over_os_default() {
        let mock = Arc::new(MockSpooler::new());
        mock.add_printer(raw("Office Brother", "Brother", true));
        mock.add_printer(raw("Zebra ZD410", "ZDesigner", false));
        let registry = PrinterRegistry::new(mock, Some("Zebra ZD410".into()));

        let printer = registry.resolve(None).unwrap();
        assert_eq!(printer.name, "Zebra ZD410");
    }

    #[test]
    fn resolve_falls_back_to_os_default() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let registry = PrinterRegistry::new(mock, None);
        let printer = registry.resolve(None).unwrap();
        assert_eq!(printer.name, "Zebra ZD410");
        assert!(printer.is_default);
    }

    #[test]
    fn resolve_falls_back_to_first_zpl_printer() {
        let mock = Arc::new(MockSpooler::new());
        mock.add_printer(raw("Office Brother", "Brother", false));
        mock.add_printer(raw("Zebra ZD410", "ZDesigner", false));
        let registry = PrinterRegistry::new(mock, None);

        let printer = registry.resolve(None).unwrap();
        assert_eq!(printer.name, "Zebra ZD410");
    }

    #[test]
    fn resolve_with_no_printers_errors() {
        let mock = Arc::new(MockSpooler::new());
        let registry = PrinterRegistry::new(mock, None);
        assert!(matches!(registry.resolve(None), Err(BridgeError::NoPrinters)));
    }
}
