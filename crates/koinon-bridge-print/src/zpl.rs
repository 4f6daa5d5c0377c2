// SPDX-License-Identifier: MIT
//
// ZPL transport: payload sanitization and raw spooler submission.
//
// This module is the only sanitization boundary in the bridge. Every check
// reports a structured failure (`PrintOutcome { success: false }`) instead
// of an error — malformed content must never surface as an exception past
// the transport.

use std::sync::Arc;

use tracing::{info, warn};

use koinon_bridge_core::{PrintOutcome, PrinterInfo};
use koinon_bridge_spool::Spooler;

/// Hard ceiling on a single label payload. A check-in name tag is a few
/// hundred bytes; anything near this limit is garbage or abuse.
pub const MAX_ZPL_BYTES: usize = 100 * 1024;

/// Valid copies range for one submission.
pub const MIN_COPIES: u32 = 1;
pub const MAX_COPIES: u32 = 999;

/// ZPL label-start command: every payload must begin with it.
pub const START_FORMAT: &str = "^XA";

/// ZPL label-end command: every payload must end with it.
pub const END_FORMAT: &str = "^XZ";

/// Commands the bridge refuses to forward, with the reason reported back.
///
/// These write to printer flash, alter saved configuration, or reset the
/// device — none of which a label job ever needs.
const DENY_LIST: &[(&str, &str)] = &[
    ("~DY", "flash file download"),
    ("~DG", "flash graphic download"),
    ("~DF", "stored format download"),
    ("^ID", "stored image delete"),
    ("~EG", "flash erase"),
    ("^JU", "configuration save/restore"),
    ("~JR", "printer reset"),
    ("~JS", "sensor configuration change"),
];

/// Validate a ZPL payload. Returns the rejection message on failure.
pub fn validate(content: &str) -> Result<(), String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("ZPL content is empty".into());
    }
    if content.len() > MAX_ZPL_BYTES {
        return Err(format!(
            "ZPL content is {} bytes — the limit is {} bytes (100 KB)",
            content.len(),
            MAX_ZPL_BYTES
        ));
    }
    if !trimmed.starts_with(START_FORMAT) {
        return Err(format!("ZPL content must start with {START_FORMAT}"));
    }
    if !trimmed.ends_with(END_FORMAT) {
        return Err(format!("ZPL content must end with {END_FORMAT}"));
    }

    // Deny-list scan is case-insensitive and position-independent: a
    // dangerous command embedded mid-payload is as rejected as one at the
    // start.
    let upper = trimmed.to_ascii_uppercase();
    for (command, reason) in DENY_LIST {
        if upper.contains(command) {
            return Err(format!(
                "ZPL content contains blocked command {command} ({reason})"
            ));
        }
    }
    Ok(())
}

/// Validate a copies count. Returns the rejection message on failure.
pub fn validate_copies(copies: u32) -> Result<(), String> {
    if !(MIN_COPIES..=MAX_COPIES).contains(&copies) {
        return Err(format!(
            "copies must be between {MIN_COPIES} and {MAX_COPIES}, got {copies}"
        ));
    }
    Ok(())
}

/// Print a ZPL payload, once per requested copy.
///
/// Validation failures return a rejected outcome without contacting the
/// spooler. Spooler failures stop the copy loop and report how far it got.
pub async fn print(
    spooler: Arc<dyn Spooler>,
    printer: &PrinterInfo,
    content: &str,
    copies: u32,
) -> PrintOutcome {
    if let Err(message) = validate(content) {
        warn!(printer = %printer.name, %message, "ZPL payload rejected");
        return PrintOutcome::rejected(message);
    }
    if let Err(message) = validate_copies(copies) {
        warn!(printer = %printer.name, %message, "copies rejected");
        return PrintOutcome::rejected(message);
    }

    for copy in 1..=copies {
        if let Err(message) = submit(&spooler, &printer.name, content).await {
            warn!(
                printer = %printer.name,
                copy,
                copies,
                error = %message,
                "spooler rejected ZPL submission"
            );
            return PrintOutcome::failed(
                &printer.name,
                format!("Print failed on copy {copy} of {copies}: {message}"),
            );
        }
    }

    info!(printer = %printer.name, copies, bytes = content.len(), "ZPL job sent");
    PrintOutcome::ok(
        &printer.name,
        format!(
            "{copies} {} sent to {}",
            if copies == 1 { "label" } else { "labels" },
            printer.name
        ),
    )
}

/// One raw submission on the blocking pool.
async fn submit(spooler: &Arc<dyn Spooler>, printer: &str, content: &str) -> Result<(), String> {
    let spooler = Arc::clone(spooler);
    let printer = printer.to_string();
    let data = content.as_bytes().to_vec();
    tokio::task::spawn_blocking(move || spooler.submit_raw(&printer, &data, "Koinon label"))
        .await
        .map_err(|e| format!("print task panicked: {e}"))?
        .map_err(|e| e.to_string())
}

/// A small fixed label for the test-print endpoint.
pub fn test_label() -> String {
    format!(
        "{START_FORMAT}\
         ^CF0,40\
         ^FO40,40^FDKoinon Print Bridge^FS\
         ^CF0,28\
         ^FO40,100^FDTest label OK^FS\
         {END_FORMAT}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use koinon_bridge_core::{PrinterCapability, PrinterStatus};
    use koinon_bridge_spool::mock::MockSpooler;

    fn zebra() -> PrinterInfo {
        PrinterInfo {
            name: "Zebra ZD410".into(),
            status: PrinterStatus::Ready,
            is_default: true,
            capability: PrinterCapability::Zpl,
        }
    }

    #[test]
    fn accepts_wellformed_label() {
        assert!(validate("^XA^FO50,50^FDAlice^FS^XZ").is_ok());
    }

    #[test]
    fn accepts_trailing_newline() {
        assert!(validate("^XA^FDx^FS^XZ\n").is_ok());
    }

    #[test]
    fn rejects_empty_content() {
        assert!(validate("").is_err());
        assert!(validate("   \n").is_err());
    }

    #[test]
    fn rejects_missing_start_format() {
        let err = validate("^FO50,50^FDAlice^FS^XZ").unwrap_err();
        assert!(err.contains("^XA"));
    }

    #[test]
    fn rejects_missing_end_format() {
        let err = validate("^XA^FO50,50^FDAlice^FS").unwrap_err();
        assert!(err.contains("^XZ"));
    }

    #[test]
    fn rejects_oversized_content() {
        let mut content = String::from("^XA");
        content.push_str(&"^FDx^FS".repeat(20_000)); // ~140 KB
        content.push_str("^XZ");
        let err = validate(&content).unwrap_err();
        assert!(err.contains("100 KB"));
    }

    #[test]
    fn rejects_every_denylisted_command() {
        for (command, _) in DENY_LIST {
            let content = format!("^XA^FDx^FS{command}^XZ");
            let err = validate(&content).unwrap_err();
            assert!(err.contains(*command), "expected rejection for {command}");
        }
    }

    #[test]
    fn denylist_scan_is_case_insensitive() {
        let err = validate("^XA~jr^XZ").unwrap_err();
        assert!(err.contains("~JR"));
    }

    #[test]
    fn denylist_matches_mid_payload() {
        let err = validate("^XA^FDinnocent^FS~DY,stuff^FDmore^FS^XZ").unwrap_err();
        assert!(err.contains("~DY"));
    }

    #[test]
    fn copies_bounds() {
        assert!(validate_copies(1).is_ok());
        assert!(validate_copies(999).is_ok());
        assert!(validate_copies(0).is_err());
        assert!(validate_copies(1000).is_err());
    }

    #[test]
    fn test_label_passes_validation() {
        assert!(validate(&test_label()).is_ok());
    }

    #[tokio::test]
    async fn invalid_payload_never_reaches_spooler() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let outcome = print(mock.clone(), &zebra(), "^FDno framing", 1).await;
        assert!(!outcome.success);
        assert_eq!(mock.submission_count(), 0);
    }

    #[tokio::test]
    async fn copies_submit_one_job_each() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let outcome = print(mock.clone(), &zebra(), "^XA^FDAlice^FS^XZ", 3).await;
        assert!(outcome.success, "{}", outcome.message);
        assert_eq!(mock.submission_count(), 3);
        assert_eq!(outcome.printer_name.as_deref(), Some("Zebra ZD410"));
    }

    #[tokio::test]
    async fn spooler_failure_is_reported_not_raised() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        mock.fail_submissions("access denied");
        let outcome = print(mock, &zebra(), "^XA^FDAlice^FS^XZ", 2).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("copy 1 of 2"));
        assert_eq!(outcome.printer_name.as_deref(), Some("Zebra ZD410"));
    }
}
