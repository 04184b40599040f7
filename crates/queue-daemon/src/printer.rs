//! Receipt printing.
//!
//! Printing is fire-and-forget: a ticket is issued whether or not paper comes
//! out.  The spool printer renders ESC/POS bytes for an 80mm thermal printer
//! and drops them in a directory the print service watches.

use queue_proto::receipt::PrintRecord;
use std::path::PathBuf;
use tracing::{debug, warn};

pub trait ReceiptPrinter: Send + Sync {
    /// Queue `record` for printing.  Must return immediately.
    fn print(&self, record: PrintRecord);
}

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;

fn align(data: &mut Vec<u8>, n: u8) {
    data.extend_from_slice(&[ESC, b'a', n]);
}

fn size(data: &mut Vec<u8>, n: u8) {
    data.extend_from_slice(&[GS, b'!', n]);
}

fn bold(data: &mut Vec<u8>, on: bool) {
    data.extend_from_slice(&[ESC, b'E', on as u8]);
}

fn line(data: &mut Vec<u8>, text: &str) {
    data.extend_from_slice(text.as_bytes());
    data.push(b'\n');
}

/// Native QR (GS ( k, model 2).
fn qr(data: &mut Vec<u8>, payload: &str) {
    let bytes = payload.as_bytes();
    let store_len = bytes.len() + 3;
    let (pl, ph) = ((store_len & 0xFF) as u8, ((store_len >> 8) & 0xFF) as u8);
    // model 2
    data.extend_from_slice(&[GS, b'(', b'k', 4, 0, 0x31, 0x41, 0x32, 0x00]);
    // module size 6
    data.extend_from_slice(&[GS, b'(', b'k', 3, 0, 0x31, 0x43, 0x06]);
    // error correction M
    data.extend_from_slice(&[GS, b'(', b'k', 3, 0, 0x31, 0x45, 0x31]);
    data.extend_from_slice(&[GS, b'(', b'k', pl, ph, 0x31, 0x50, 0x30]);
    data.extend_from_slice(bytes);
    data.extend_from_slice(&[GS, b'(', b'k', 3, 0, 0x31, 0x51, 0x30]);
}

/// ESC/POS job for one receipt.
pub fn render_escpos(header: &str, record: &PrintRecord) -> Vec<u8> {
    let mut data = Vec::with_capacity(256 + record.qr_image_data.len());
    data.extend_from_slice(&[ESC, b'@']);

    align(&mut data, 1);
    bold(&mut data, true);
    line(&mut data, header);
    bold(&mut data, false);
    line(&mut data, &format!("{}   {}", record.date, record.time));
    line(&mut data, "");

    line(&mut data, &record.service_name);
    size(&mut data, 0x33);
    line(&mut data, &record.headline());
    size(&mut data, 0);
    line(&mut data, "");

    qr(&mut data, &record.qr_image_data);
    line(&mut data, "");
    line(&mut data, "Pindai untuk melihat status antrian");
    line(&mut data, "Silakan menunggu panggilan");

    data.extend_from_slice(b"\n\n\n");
    data.extend_from_slice(&[GS, b'V', 0x00]);
    data
}

/// Writes each receipt as `<code><number>-<time>.bin` into `spool_dir`.
pub struct SpoolPrinter {
    spool_dir: PathBuf,
    header: String,
}

impl SpoolPrinter {
    pub fn new(spool_dir: impl Into<PathBuf>, header: impl Into<String>) -> Self {
        Self {
            spool_dir: spool_dir.into(),
            header: header.into(),
        }
    }
}

impl ReceiptPrinter for SpoolPrinter {
    fn print(&self, record: PrintRecord) {
        let dir = self.spool_dir.clone();
        let bytes = render_escpos(&self.header, &record);
        let name = format!(
            "{}-{}.bin",
            record.headline(),
            chrono::Utc::now().format("%Y%m%d%H%M%S%3f")
        );
        tokio::spawn(async move {
            if let Err(e) = tokio::fs::create_dir_all(&dir).await {
                warn!("Receipt spool {:?} unavailable: {}", dir, e);
                return;
            }
            let path = dir.join(name);
            match tokio::fs::write(&path, bytes).await {
                Ok(()) => debug!("Receipt spooled to {:?}", path),
                Err(e) => warn!("Failed to spool receipt {:?}: {}", path, e),
            }
        });
    }
}
