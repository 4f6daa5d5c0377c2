// SPDX-License-Identifier: MIT
//
// Core domain types for the Koinon print bridge.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Label print resolution. Both Zebra thermal printers used at check-in
/// stations and the raster pipeline render at 300 dots per inch.
pub const LABEL_DPI: u32 = 300;

/// Spooler-reported state of a printer, collapsed into the categories the
/// kiosk UI distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterStatus {
    Ready,
    Paused,
    Error,
    PaperJam,
    PaperOut,
    ManualFeed,
    Unknown,
}

/// What kind of payload a printer can accept.
///
/// `Zpl` printers take raw Zebra Programming Language bytes via the spooler;
/// `Image` printers take a rendered bitmap through the OS print pipeline.
/// This tagged enum is the single canonical capability shape — there are no
/// parallel vendor boolean flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrinterCapability {
    Zpl,
    Image,
    Unknown,
}

/// Immutable snapshot of one installed printer.
///
/// Produced by the printer registry during enumeration and replaced
/// wholesale on refresh — never patched in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrinterInfo {
    /// OS-registered printer name (the spooler key).
    pub name: String,
    /// Collapsed spooler status.
    #[serde(rename = "statusCategory")]
    pub status: PrinterStatus,
    /// Whether the OS reports this printer as the system default.
    pub is_default: bool,
    /// Payload capability derived from name/driver classification.
    pub capability: PrinterCapability,
}

impl PrinterInfo {
    pub fn is_zpl(&self) -> bool {
        self.capability == PrinterCapability::Zpl
    }
}

/// Result of a single print submission. One per job; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrintOutcome {
    pub success: bool,
    pub message: String,
    /// The printer the job was (or would have been) routed to. `None` when
    /// the request failed before a printer was resolved.
    pub printer_name: Option<String>,
}

impl PrintOutcome {
    /// A successful submission to `printer`.
    pub fn ok(printer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            printer_name: Some(printer.into()),
        }
    }

    /// A failure that occurred before any printer was resolved.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            printer_name: None,
        }
    }

    /// A failure on a known printer (spooler error, driver fault).
    pub fn failed(printer: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            printer_name: Some(printer.into()),
        }
    }
}

/// Bridge liveness snapshot returned by `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthSnapshot {
    /// "healthy" | "unhealthy".
    pub status: String,
    /// Bridge version (crate version of the running binary).
    pub version: String,
    /// The printer a default-routed job would currently go to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_printer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A named label-stock preset.
///
/// The kiosk only ever prints onto one of five stocks, so sizes are a fixed
/// table rather than free-form dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelSize {
    pub name: &'static str,
    pub width_inches: f32,
    pub height_inches: f32,
}

/// Name of the preset used when a request names none (or an unknown one).
pub const DEFAULT_LABEL_SIZE: &str = "default";

/// All label-stock presets, in the order the admin UI lists them.
pub const LABEL_SIZES: &[LabelSize] = &[
    LabelSize {
        name: "default",
        width_inches: 2.25,
        height_inches: 1.25,
    },
    LabelSize {
        name: "small",
        width_inches: 1.125,
        height_inches: 3.5,
    },
    // Same stock as default; kept as a distinct name because saved kiosk
    // configurations reference it.
    LabelSize {
        name: "medium",
        width_inches: 2.25,
        height_inches: 1.25,
    },
    LabelSize {
        name: "large",
        width_inches: 4.0,
        height_inches: 6.0,
    },
    LabelSize {
        name: "badge",
        width_inches: 3.0,
        height_inches: 4.0,
    },
];

impl LabelSize {
    /// Look up a preset by name, falling back to the default stock.
    ///
    /// Unknown names are a configuration mistake, not a request error: the
    /// kiosk should still print something, so we warn and use `default`.
    pub fn resolve(name: Option<&str>) -> LabelSize {
        let requested = name.unwrap_or(DEFAULT_LABEL_SIZE);
        if let Some(size) = LABEL_SIZES
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(requested))
        {
            return *size;
        }
        tracing::warn!(
            requested,
            fallback = DEFAULT_LABEL_SIZE,
            "unknown label size — using default stock"
        );
        LABEL_SIZES[0]
    }

    /// Canvas width in pixels at the label DPI.
    pub fn width_px(&self) -> u32 {
        (self.width_inches * LABEL_DPI as f32).round() as u32
    }

    /// Canvas height in pixels at the label DPI.
    pub fn height_px(&self) -> u32 {
        (self.height_inches * LABEL_DPI as f32).round() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_known_size_by_name() {
        let size = LabelSize::resolve(Some("large"));
        assert_eq!(size.width_inches, 4.0);
        assert_eq!(size.height_inches, 6.0);
    }

    #[test]
    fn resolve_is_case_insensitive() {
        let size = LabelSize::resolve(Some("BADGE"));
        assert_eq!(size.name, "badge");
    }

    #[test]
    fn unknown_size_falls_back_to_default() {
        let size = LabelSize::resolve(Some("gigantic"));
        assert_eq!(size.name, "default");
        assert_eq!(size.width_inches, 2.25);
        assert_eq!(size.height_inches, 1.25);
    }

    #[test]
    fn missing_size_uses_default() {
        let size = LabelSize::resolve(None);
        assert_eq!(size.name, "default");
    }

    #[test]
    fn pixel_dimensions_at_300_dpi() {
        let size = LabelSize::resolve(Some("default"));
        assert_eq!(size.width_px(), 675); // 2.25in * 300dpi
        assert_eq!(size.height_px(), 375); // 1.25in * 300dpi
    }

    #[test]
    fn outcome_constructors() {
        let ok = PrintOutcome::ok("Zebra ZD410", "1 label sent");
        assert!(ok.success);
        assert_eq!(ok.printer_name.as_deref(), Some("Zebra ZD410"));

        let rejected = PrintOutcome::rejected("empty content");
        assert!(!rejected.success);
        assert!(rejected.printer_name.is_none());
    }

    #[test]
    fn printer_info_serializes_camel_case() {
        let info = PrinterInfo {
            name: "Zebra".into(),
            status: PrinterStatus::Ready,
            is_default: true,
            capability: PrinterCapability::Zpl,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["isDefault"], true);
        assert_eq!(json["statusCategory"], "Ready");
        assert_eq!(json["capability"], "Zpl");
    }
}
