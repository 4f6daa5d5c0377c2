// SPDX-License-Identifier: MIT
//
// Raster transport: base64 images and plain text rendered onto a label
// bitmap, then handed to the OS print pipeline.
//
// The canvas is always the exact pixel size of the resolved label preset at
// 300 DPI on a white background. Images are fitted preserving aspect ratio
// and centered; text is drawn center-aligned with the scale auto-shrunk
// until the longest line fits.

use std::path::Path;
use std::sync::Arc;

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::{imageops, DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use tracing::{debug, info, warn};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use koinon_bridge_core::error::{BridgeError, Result};
use koinon_bridge_core::{LabelSize, PrintOutcome, PrinterInfo};
use koinon_bridge_spool::Spooler;

/// Ceiling on the *decoded* image payload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Smallest text scale before we give up shrinking and clip.
const MIN_TEXT_SCALE: f32 = 12.0;

/// Fraction of the canvas kept clear around text.
const TEXT_INSET: f32 = 0.05;

/// Print a base64-encoded image onto the named label stock.
pub async fn print_image(
    spooler: Arc<dyn Spooler>,
    printer: &PrinterInfo,
    base64_image: &str,
    label_size: Option<&str>,
) -> PrintOutcome {
    let bytes = match decode_base64(base64_image) {
        Ok(bytes) => bytes,
        Err(message) => {
            warn!(printer = %printer.name, %message, "image payload rejected");
            return PrintOutcome::rejected(message);
        }
    };

    let decoded = match image::load_from_memory(&bytes) {
        Ok(img) => img,
        Err(e) => {
            warn!(printer = %printer.name, error = %e, "image payload undecodable");
            return PrintOutcome::rejected(format!("image could not be decoded: {e}"));
        }
    };

    let size = LabelSize::resolve(label_size);
    let canvas = compose_image(&decoded, size);
    submit(spooler, printer, canvas, "Koinon image label").await
}

/// Print plain text onto the named label stock.
pub async fn print_text(
    spooler: Arc<dyn Spooler>,
    printer: &PrinterInfo,
    text: &str,
    label_size: Option<&str>,
) -> PrintOutcome {
    if text.trim().is_empty() {
        return PrintOutcome::rejected("text is empty");
    }

    let font = match load_font() {
        Ok(font) => font,
        Err(e) => {
            warn!(printer = %printer.name, error = %e, "no font for text label");
            return PrintOutcome::failed(&printer.name, e.to_string());
        }
    };

    let size = LabelSize::resolve(label_size);
    let canvas = compose_text(text, &font, size);
    submit(spooler, printer, canvas, "Koinon text label").await
}

/// Decode a base64 image payload, tolerating a data-URL prefix, and
/// enforce the decoded-size ceiling.
pub fn decode_base64(payload: &str) -> std::result::Result<Vec<u8>, String> {
    let payload = payload.trim();
    if payload.is_empty() {
        return Err("image payload is empty".into());
    }
    // The kiosk sends canvas.toDataURL() output as-is.
    let encoded = match payload.split_once("base64,") {
        Some((_, rest)) => rest,
        None => payload,
    };

    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| format!("image payload is not valid base64: {e}"))?;

    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(format!(
            "image is {} bytes — the limit is {} bytes (5 MB)",
            bytes.len(),
            MAX_IMAGE_BYTES
        ));
    }
    Ok(bytes)
}

/// Fit an image onto a white label canvas, centered, aspect preserved.
fn compose_image(source: &DynamicImage, size: LabelSize) -> RgbImage {
    let (w, h) = (size.width_px(), size.height_px());
    let mut canvas = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));

    let fitted = source
        .resize(w, h, imageops::FilterType::Lanczos3)
        .to_rgb8();
    let x = (w.saturating_sub(fitted.width())) / 2;
    let y = (h.saturating_sub(fitted.height())) / 2;
    imageops::overlay(&mut canvas, &fitted, x as i64, y as i64);

    debug!(
        label = size.name,
        canvas_w = w,
        canvas_h = h,
        image_w = fitted.width(),
        image_h = fitted.height(),
        "composed image label"
    );
    canvas
}

/// Render text lines onto a white label canvas, center-aligned, shrinking
/// the scale until the block fits the inset bounds.
fn compose_text(text: &str, font: &FontVec, size: LabelSize) -> RgbImage {
    let (w, h) = (size.width_px(), size.height_px());
    let mut canvas = RgbImage::from_pixel(w, h, Rgb([255, 255, 255]));

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return canvas;
    }

    let max_w = w as f32 * (1.0 - 2.0 * TEXT_INSET);
    let max_h = h as f32 * (1.0 - 2.0 * TEXT_INSET);
    let scale = fit_scale(font, &lines, max_w, max_h);

    let line_height = line_height(font, scale);
    let block_height = line_height * lines.len() as f32;
    let mut y = (h as f32 - block_height) / 2.0;

    for line in &lines {
        let (line_w, _) = text_size(scale, font, line);
        let x = ((w as f32 - line_w as f32) / 2.0).max(0.0);
        draw_text_mut(
            &mut canvas,
            Rgb([0, 0, 0]),
            x as i32,
            y.max(0.0) as i32,
            scale,
            font,
            line,
        );
        y += line_height;
    }

    debug!(
        label = size.name,
        lines = lines.len(),
        scale = scale.y,
        "composed text label"
    );
    canvas
}

/// Largest uniform scale at which every line fits the bounds.
///
/// Starts from the per-line height budget and steps down 10% at a time;
/// floors at `MIN_TEXT_SCALE` so pathological input clips instead of
/// vanishing.
fn fit_scale(font: &FontVec, lines: &[&str], max_w: f32, max_h: f32) -> PxScale {
    let mut px = (max_h / lines.len() as f32).min(max_h * 0.5);

    while px > MIN_TEXT_SCALE {
        let scale = PxScale::from(px);
        let widest = lines
            .iter()
            .map(|line| text_size(scale, font, line).0 as f32)
            .fold(0.0, f32::max);
        let total_h = line_height(font, scale) * lines.len() as f32;
        if widest <= max_w && total_h <= max_h {
            return scale;
        }
        px *= 0.9;
    }
    PxScale::from(MIN_TEXT_SCALE)
}

/// Full line advance (ascent to descent plus gap) at a scale.
fn line_height(font: &FontVec, scale: PxScale) -> f32 {
    let scaled = font.as_scaled(scale);
    scaled.ascent() - scaled.descent() + scaled.line_gap()
}

/// Locate a usable system TTF for text labels.
///
/// The bridge ships no font of its own; check-in stations always have the
/// Windows core fonts, and dev machines have DejaVu or Liberation.
fn load_font() -> Result<FontVec> {
    const CANDIDATES: &[&str] = &[
        r"C:\Windows\Fonts\arial.ttf",
        r"C:\Windows\Fonts\segoeui.ttf",
        r"C:\Windows\Fonts\calibri.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
        "/usr/share/fonts/TTF/DejaVuSans.ttf",
        "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
        "/System/Library/Fonts/Supplemental/Arial.ttf",
    ];

    for candidate in CANDIDATES {
        if Path::new(candidate).exists() {
            let data = std::fs::read(candidate)?;
            match FontVec::try_from_vec(data) {
                Ok(font) => {
                    debug!(path = candidate, "loaded text font");
                    return Ok(font);
                }
                Err(e) => warn!(path = candidate, error = %e, "font file unusable"),
            }
        }
    }
    Err(BridgeError::Font(
        "no system font found in the known locations".into(),
    ))
}

/// Hand a finished canvas to the spooler on the blocking pool.
async fn submit(
    spooler: Arc<dyn Spooler>,
    printer: &PrinterInfo,
    canvas: RgbImage,
    doc_name: &'static str,
) -> PrintOutcome {
    let (width, height) = (canvas.width(), canvas.height());
    let pixels = canvas.into_raw();
    let name = printer.name.clone();

    let result = tokio::task::spawn_blocking(move || {
        spooler.submit_bitmap(&name, width, height, &pixels, doc_name)
    })
    .await;

    match result {
        Ok(Ok(())) => {
            info!(printer = %printer.name, width, height, "raster job sent");
            PrintOutcome::ok(&printer.name, format!("Label sent to {}", printer.name))
        }
        Ok(Err(e)) => {
            warn!(printer = %printer.name, error = %e, "raster submission failed");
            PrintOutcome::failed(&printer.name, e.to_string())
        }
        Err(e) => PrintOutcome::failed(&printer.name, format!("print task panicked: {e}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use koinon_bridge_core::{PrinterCapability, PrinterStatus};
    use koinon_bridge_spool::mock::{MockSpooler, Submission};
    use std::io::Cursor;

    fn brother() -> PrinterInfo {
        PrinterInfo {
            name: "Brother HL".into(),
            status: PrinterStatus::Ready,
            is_default: false,
            capability: PrinterCapability::Image,
        }
    }

    /// A tiny valid PNG, base64-encoded.
    fn tiny_png_base64() -> String {
        let img = RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        BASE64.encode(&bytes)
    }

    #[test]
    fn decode_strips_data_url_prefix() {
        let payload = format!("data:image/png;base64,{}", tiny_png_base64());
        let bytes = decode_base64(&payload).unwrap();
        assert!(image::load_from_memory(&bytes).is_ok());
    }

    #[test]
    fn decode_rejects_invalid_base64() {
        let err = decode_base64("!!! not base64 !!!").unwrap_err();
        assert!(err.contains("base64"));
    }

    #[test]
    fn decode_rejects_oversized_payload() {
        let blob = BASE64.encode(vec![0u8; MAX_IMAGE_BYTES + 1]);
        let err = decode_base64(&blob).unwrap_err();
        assert!(err.contains("5 MB"));
    }

    #[test]
    fn compose_fits_canvas_to_preset() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])));
        let canvas = compose_image(&img, LabelSize::resolve(Some("default")));
        assert_eq!(canvas.width(), 675);
        assert_eq!(canvas.height(), 375);
    }

    #[tokio::test]
    async fn oversized_image_never_reaches_spooler() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let blob = BASE64.encode(vec![0u8; MAX_IMAGE_BYTES + 1]);
        let outcome = print_image(mock.clone(), &brother(), &blob, None).await;
        assert!(!outcome.success);
        assert_eq!(mock.submission_count(), 0);
    }

    #[tokio::test]
    async fn valid_image_submits_one_bitmap() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let outcome = print_image(mock.clone(), &brother(), &tiny_png_base64(), Some("badge")).await;
        assert!(outcome.success, "{}", outcome.message);

        let subs = mock.submissions();
        assert_eq!(subs.len(), 1);
        assert!(matches!(
            &subs[0],
            Submission::Bitmap { width: 900, height: 1200, .. } // 3x4in at 300dpi
        ));
    }

    #[tokio::test]
    async fn unknown_label_size_falls_back_to_default() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let outcome =
            print_image(mock.clone(), &brother(), &tiny_png_base64(), Some("gigantic")).await;
        assert!(outcome.success);
        assert!(matches!(
            &mock.submissions()[0],
            Submission::Bitmap { width: 675, height: 375, .. }
        ));
    }

    #[tokio::test]
    async fn empty_text_is_rejected() {
        let mock = Arc::new(MockSpooler::with_default_zebra());
        let outcome = print_text(mock.clone(), &brother(), "   ", None).await;
        assert!(!outcome.success);
        assert_eq!(mock.submission_count(), 0);
    }

    #[test]
    fn text_rendering_fits_bounds() {
        // Needs a system font; skip quietly on bare containers.
        let Ok(font) = load_font() else { return };
        let size = LabelSize::resolve(Some("default"));
        let canvas = compose_text("Alice Example\nRoom 104", &font, size);
        assert_eq!(canvas.width(), size.width_px());
        assert_eq!(canvas.height(), size.height_px());
        // Something was actually drawn.
        assert!(canvas.pixels().any(|p| p.0 != [255, 255, 255]));
    }
}
