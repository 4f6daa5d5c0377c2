// SPDX-License-Identifier: MIT
//
// Recording mock spooler for tests.
//
// Lives outside `#[cfg(test)]` because the transport and endpoint tests in
// other crates drive it. Records every submission so tests can assert both
// what was sent and — just as important — that nothing was sent when a
// payload is rejected.

use std::sync::Mutex;

use koinon_bridge_core::error::{BridgeError, Result};
use koinon_bridge_core::PrinterStatus;

use crate::traits::{RawPrinter, Spooler};

/// A recorded call to `submit_raw` or `submit_bitmap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Raw {
        printer: String,
        data: Vec<u8>,
        doc_name: String,
    },
    Bitmap {
        printer: String,
        width: u32,
        height: u32,
        doc_name: String,
    },
}

/// In-memory spooler that records submissions instead of printing.
pub struct MockSpooler {
    printers: Mutex<Vec<RawPrinter>>,
    submissions: Mutex<Vec<Submission>>,
    /// When set, all submissions fail with this message.
    fail_with: Mutex<Option<String>>,
    /// When true, `enumerate` errors (spooler subsystem down).
    enumeration_fails: Mutex<bool>,
}

impl Default for MockSpooler {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSpooler {
    /// An empty mock: no printers, all submissions succeed.
    pub fn new() -> Self {
        Self {
            printers: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            fail_with: Mutex::new(None),
            enumeration_fails: Mutex::new(false),
        }
    }

    /// A mock with one ready Zebra printer marked as the OS default —
    /// the common single-kiosk setup.
    pub fn with_default_zebra() -> Self {
        let mock = Self::new();
        mock.add_printer(RawPrinter {
            name: "Zebra ZD410".into(),
            driver: "ZDesigner ZD410-300dpi".into(),
            status: PrinterStatus::Ready,
            is_default: true,
        });
        mock
    }

    pub fn add_printer(&self, printer: RawPrinter) {
        self.printers.lock().expect("printer lock").push(printer);
    }

    /// Make every subsequent submission fail with `message`.
    pub fn fail_submissions(&self, message: &str) {
        *self.fail_with.lock().expect("fail lock") = Some(message.to_string());
    }

    /// Make `enumerate` return an error.
    pub fn fail_enumeration(&self) {
        *self.enumeration_fails.lock().expect("enum lock") = true;
    }

    /// Snapshot of everything submitted so far.
    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().expect("submission lock").clone()
    }

    /// Number of submissions so far.
    pub fn submission_count(&self) -> usize {
        self.submissions.lock().expect("submission lock").len()
    }

    fn check_failure(&self) -> Result<()> {
        if let Some(message) = self.fail_with.lock().expect("fail lock").clone() {
            return Err(BridgeError::Spooler(message));
        }
        Ok(())
    }
}

impl Spooler for MockSpooler {
    fn platform_name(&self) -> &'static str {
        "mock"
    }

    fn enumerate(&self) -> Result<Vec<RawPrinter>> {
        if *self.enumeration_fails.lock().expect("enum lock") {
            return Err(BridgeError::Enumeration("spooler subsystem down".into()));
        }
        Ok(self.printers.lock().expect("printer lock").clone())
    }

    fn submit_raw(&self, printer: &str, data: &[u8], doc_name: &str) -> Result<()> {
        self.check_failure()?;
        self.submissions
            .lock()
            .expect("submission lock")
            .push(Submission::Raw {
                printer: printer.to_string(),
                data: data.to_vec(),
                doc_name: doc_name.to_string(),
            });
        Ok(())
    }

    fn submit_bitmap(
        &self,
        printer: &str,
        width: u32,
        height: u32,
        _pixels: &[u8],
        doc_name: &str,
    ) -> Result<()> {
        self.check_failure()?;
        self.submissions
            .lock()
            .expect("submission lock")
            .push(Submission::Bitmap {
                printer: printer.to_string(),
                width,
                height,
                doc_name: doc_name.to_string(),
            });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_raw_submissions() {
        let mock = MockSpooler::with_default_zebra();
        mock.submit_raw("Zebra ZD410", b"^XA^XZ", "label").unwrap();

        let subs = mock.submissions();
        assert_eq!(subs.len(), 1);
        assert!(matches!(
            &subs[0],
            Submission::Raw { printer, .. } if printer == "Zebra ZD410"
        ));
    }

    #[test]
    fn injected_failure_is_reported() {
        let mock = MockSpooler::with_default_zebra();
        mock.fail_submissions("access denied");
        let result = mock.submit_raw("Zebra ZD410", b"^XA^XZ", "label");
        assert!(result.is_err());
        assert_eq!(mock.submission_count(), 0);
    }

    #[test]
    fn enumeration_failure_is_an_error() {
        let mock = MockSpooler::new();
        mock.fail_enumeration();
        assert!(mock.enumerate().is_err());
    }
}
