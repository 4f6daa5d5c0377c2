// SPDX-License-Identifier: MIT
//
// Windows spooler backend.
//
// Two submission paths mirror the two printer classes:
//   - raw: OpenPrinterW + StartDocPrinterW with the "RAW" datatype, which
//     hands ZPL bytes to the queue untouched by any driver,
//   - bitmap: a GDI printer DC with StretchDIBits, scaling the rendered
//     label to the full printable page (zero margins).
//
// There is no timeout on any of these calls; a hung driver blocks the
// calling thread, which is why the trait is documented blocking and the
// server wraps calls in spawn_blocking.

use koinon_bridge_core::error::{BridgeError, Result};
use koinon_bridge_core::PrinterStatus;
use tracing::{debug, info, warn};

use windows_sys::Win32::Graphics::Gdi::{
    CreateDCW, DeleteDC, EndDoc, EndPage, GetDeviceCaps, SetStretchBltMode, StartDocW, StartPage,
    StretchDIBits, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS, DOCINFOW, HALFTONE,
    HORZRES, SRCCOPY, VERTRES,
};
use windows_sys::Win32::Graphics::Printing::{
    ClosePrinter, EndDocPrinter, EndPagePrinter, EnumPrintersW, GetDefaultPrinterW, OpenPrinterW,
    StartDocPrinterW, StartPagePrinter, WritePrinter, DOC_INFO_1W, PRINTER_ENUM_CONNECTIONS,
    PRINTER_ENUM_LOCAL, PRINTER_INFO_2W, PRINTER_STATUS_ERROR, PRINTER_STATUS_MANUAL_FEED,
    PRINTER_STATUS_PAPER_JAM, PRINTER_STATUS_PAPER_OUT, PRINTER_STATUS_PAUSED,
};

use crate::traits::{RawPrinter, Spooler};

pub struct WindowsSpooler;

impl WindowsSpooler {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WindowsSpooler {
    fn default() -> Self {
        Self::new()
    }
}

impl Spooler for WindowsSpooler {
    fn platform_name(&self) -> &'static str {
        "winspool"
    }

    fn enumerate(&self) -> Result<Vec<RawPrinter>> {
        let default_name = default_printer_name();

        // First call sizes the buffer, second fills it.
        let flags = PRINTER_ENUM_LOCAL | PRINTER_ENUM_CONNECTIONS;
        let mut needed: u32 = 0;
        let mut returned: u32 = 0;
        unsafe {
            EnumPrintersW(
                flags,
                std::ptr::null(),
                2,
                std::ptr::null_mut(),
                0,
                &mut needed,
                &mut returned,
            );
        }
        if needed == 0 {
            debug!("EnumPrintersW reports no printers");
            return Ok(Vec::new());
        }

        let mut buf = vec![0u8; needed as usize];
        let ok = unsafe {
            EnumPrintersW(
                flags,
                std::ptr::null(),
                2,
                buf.as_mut_ptr(),
                needed,
                &mut needed,
                &mut returned,
            )
        };
        if ok == 0 {
            return Err(BridgeError::Enumeration(format!(
                "EnumPrintersW failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let mut printers = Vec::with_capacity(returned as usize);
        let entries = unsafe {
            std::slice::from_raw_parts(buf.as_ptr() as *const PRINTER_INFO_2W, returned as usize)
        };
        for entry in entries {
            let name = unsafe { from_wide_ptr(entry.pPrinterName) };
            if name.is_empty() {
                continue;
            }
            let driver = unsafe { from_wide_ptr(entry.pDriverName) };
            let is_default = default_name.as_deref() == Some(name.as_str());
            printers.push(RawPrinter {
                status: status_from_bits(entry.Status),
                is_default,
                name,
                driver,
            });
        }

        info!(count = printers.len(), "enumerated installed printers");
        Ok(printers)
    }

    fn submit_raw(&self, printer: &str, data: &[u8], doc_name: &str) -> Result<()> {
        let printer_w = wide(printer);
        let mut handle = std::ptr::null_mut();
        let ok =
            unsafe { OpenPrinterW(printer_w.as_ptr() as *mut u16, &mut handle, std::ptr::null()) };
        if ok == 0 {
            return Err(BridgeError::Spooler(format!(
                "OpenPrinterW('{printer}') failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        // Everything past this point must close the handle.
        let result = unsafe { raw_document(handle, data, doc_name) };
        unsafe { ClosePrinter(handle) };
        result?;

        info!(printer, bytes = data.len(), "raw job handed to spooler");
        Ok(())
    }

    fn submit_bitmap(
        &self,
        printer: &str,
        width: u32,
        height: u32,
        pixels: &[u8],
        doc_name: &str,
    ) -> Result<()> {
        if pixels.len() != (width as usize) * (height as usize) * 3 {
            return Err(BridgeError::Image(format!(
                "pixel buffer size {} does not match {width}x{height} RGB8",
                pixels.len()
            )));
        }

        let driver = wide("WINSPOOL");
        let printer_w = wide(printer);
        let hdc = unsafe {
            CreateDCW(
                driver.as_ptr(),
                printer_w.as_ptr(),
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        if hdc.is_null() {
            return Err(BridgeError::Spooler(format!(
                "CreateDCW('{printer}') failed: {}",
                std::io::Error::last_os_error()
            )));
        }

        let result = unsafe { bitmap_document(hdc, width, height, pixels, doc_name) };
        unsafe { DeleteDC(hdc) };
        result?;

        info!(printer, width, height, "bitmap job handed to print pipeline");
        Ok(())
    }
}

/// Run one RAW-datatype document on an open printer handle.
///
/// # Safety
///
/// `handle` must be a live handle from `OpenPrinterW`.
unsafe fn raw_document(
    handle: windows_sys::Win32::Foundation::HANDLE,
    data: &[u8],
    doc_name: &str,
) -> Result<()> {
    let doc_name_w = wide(doc_name);
    let datatype_w = wide("RAW");
    let doc_info = DOC_INFO_1W {
        pDocName: doc_name_w.as_ptr() as *mut u16,
        pOutputFile: std::ptr::null_mut(),
        pDatatype: datatype_w.as_ptr() as *mut u16,
    };

    if StartDocPrinterW(handle, 1, &doc_info as *const _ as *const u8) == 0 {
        return Err(BridgeError::Spooler(format!(
            "StartDocPrinterW failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    if StartPagePrinter(handle) == 0 {
        EndDocPrinter(handle);
        return Err(BridgeError::Spooler(format!(
            "StartPagePrinter failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let mut written: u32 = 0;
    let ok = WritePrinter(handle, data.as_ptr() as *const _, data.len() as u32, &mut written);
    EndPagePrinter(handle);
    EndDocPrinter(handle);

    if ok == 0 || written as usize != data.len() {
        return Err(BridgeError::Spooler(format!(
            "WritePrinter wrote {written} of {} bytes: {}",
            data.len(),
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Run one GDI document: the bitmap stretched to the full printable area.
///
/// # Safety
///
/// `hdc` must be a live printer DC from `CreateDCW`.
unsafe fn bitmap_document(
    hdc: windows_sys::Win32::Graphics::Gdi::HDC,
    width: u32,
    height: u32,
    pixels: &[u8],
    doc_name: &str,
) -> Result<()> {
    let doc_name_w = wide(doc_name);
    let doc_info = DOCINFOW {
        cbSize: std::mem::size_of::<DOCINFOW>() as i32,
        lpszDocName: doc_name_w.as_ptr(),
        lpszOutput: std::ptr::null(),
        lpszDatatype: std::ptr::null(),
        fwType: 0,
    };

    if StartDocW(hdc, &doc_info) <= 0 {
        return Err(BridgeError::Spooler(format!(
            "StartDocW failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    if StartPage(hdc) <= 0 {
        EndDoc(hdc);
        return Err(BridgeError::Spooler(format!(
            "StartPage failed: {}",
            std::io::Error::last_os_error()
        )));
    }

    let page_w = GetDeviceCaps(hdc, HORZRES);
    let page_h = GetDeviceCaps(hdc, VERTRES);
    debug!(page_w, page_h, "printable area in device pixels");

    // DIBs are bottom-up BGR with 4-byte-aligned rows.
    let row_stride = ((width as usize * 3) + 3) & !3;
    let mut dib = vec![0u8; row_stride * height as usize];
    for y in 0..height as usize {
        let src_row = &pixels[y * width as usize * 3..(y + 1) * width as usize * 3];
        let dst_row = &mut dib[(height as usize - 1 - y) * row_stride..];
        for x in 0..width as usize {
            dst_row[x * 3] = src_row[x * 3 + 2]; // B
            dst_row[x * 3 + 1] = src_row[x * 3 + 1]; // G
            dst_row[x * 3 + 2] = src_row[x * 3]; // R
        }
    }

    let mut bmi: BITMAPINFO = std::mem::zeroed();
    bmi.bmiHeader = BITMAPINFOHEADER {
        biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
        biWidth: width as i32,
        biHeight: height as i32,
        biPlanes: 1,
        biBitCount: 24,
        biCompression: BI_RGB as u32,
        biSizeImage: 0,
        biXPelsPerMeter: 0,
        biYPelsPerMeter: 0,
        biClrUsed: 0,
        biClrImportant: 0,
    };

    SetStretchBltMode(hdc, HALFTONE);
    let scanned = StretchDIBits(
        hdc,
        0,
        0,
        page_w,
        page_h,
        0,
        0,
        width as i32,
        height as i32,
        dib.as_ptr() as *const _,
        &bmi,
        DIB_RGB_COLORS,
        SRCCOPY,
    );

    EndPage(hdc);
    EndDoc(hdc);

    if scanned == 0 {
        return Err(BridgeError::Spooler(format!(
            "StretchDIBits failed: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Collapse the winspool status bitmask to the bridge's categories.
///
/// The first matching bit wins, checked in the order the kiosk cares about:
/// hard faults before soft states.
fn status_from_bits(bits: u32) -> PrinterStatus {
    if bits & PRINTER_STATUS_PAPER_JAM != 0 {
        PrinterStatus::PaperJam
    } else if bits & PRINTER_STATUS_PAPER_OUT != 0 {
        PrinterStatus::PaperOut
    } else if bits & PRINTER_STATUS_ERROR != 0 {
        PrinterStatus::Error
    } else if bits & PRINTER_STATUS_PAUSED != 0 {
        PrinterStatus::Paused
    } else if bits & PRINTER_STATUS_MANUAL_FEED != 0 {
        PrinterStatus::ManualFeed
    } else if bits == 0 {
        PrinterStatus::Ready
    } else {
        PrinterStatus::Unknown
    }
}

/// The OS default printer name, if one is configured.
fn default_printer_name() -> Option<String> {
    let mut len: u32 = 0;
    unsafe { GetDefaultPrinterW(std::ptr::null_mut(), &mut len) };
    if len == 0 {
        return None;
    }
    let mut buf = vec![0u16; len as usize];
    let ok = unsafe { GetDefaultPrinterW(buf.as_mut_ptr(), &mut len) };
    if ok == 0 {
        warn!("GetDefaultPrinterW failed: {}", std::io::Error::last_os_error());
        return None;
    }
    Some(String::from_utf16_lossy(
        &buf[..buf.iter().position(|&c| c == 0).unwrap_or(buf.len())],
    ))
}

/// NUL-terminated UTF-16 for Win32 calls.
fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(std::iter::once(0)).collect()
}

/// Read a NUL-terminated UTF-16 string from a Win32 pointer.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated UTF-16 string.
unsafe fn from_wide_ptr(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    let mut len = 0;
    while *ptr.add(len) != 0 {
        len += 1;
    }
    String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_status_is_ready() {
        assert_eq!(status_from_bits(0), PrinterStatus::Ready);
    }

    #[test]
    fn jam_outranks_paused() {
        let bits = PRINTER_STATUS_PAPER_JAM | PRINTER_STATUS_PAUSED;
        assert_eq!(status_from_bits(bits), PrinterStatus::PaperJam);
    }

    #[test]
    fn unrecognised_bits_are_unknown() {
        assert_eq!(status_from_bits(0x8000_0000), PrinterStatus::Unknown);
    }

    #[test]
    fn wide_is_nul_terminated() {
        let w = wide("ZPL");
        assert_eq!(w, vec![b'Z' as u16, b'P' as u16, b'L' as u16, 0]);
    }
}
