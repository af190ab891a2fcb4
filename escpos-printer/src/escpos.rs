//! ESC/POS command builder
//!
//! Provides a fluent API for building ESC/POS print data. Every method emits
//! the exact firmware command; layout decisions live in the encoder.

use crate::config::{Charset, CutMode};
use crate::encoding::{charset_preamble, encode_text};
use crate::markup::{Align, HriPosition, MonoBitmap, TextSize};

const ESC: u8 = 0x1B;
const GS: u8 = 0x1D;
const LF: u8 = 0x0A;

/// Largest raster band sent in one `GS v 0` command
pub const RASTER_BAND_ROWS: u32 = 128;

/// `GS k` function B symbology codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarcodeSystem {
    UpcA = 65,
    Ean13 = 67,
    Ean8 = 68,
    Code128 = 73,
}

/// ESC/POS command builder
///
/// Text goes through the configured code page; everything else is raw bytes.
pub struct EscPosBuilder {
    buf: Vec<u8>,
    charset: Charset,
}

impl EscPosBuilder {
    pub fn new(charset: Charset) -> Self {
        Self {
            buf: Vec::with_capacity(256),
            charset,
        }
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    // === Setup ===

    /// ESC @ followed by code page selection
    pub fn init(&mut self) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x40]);
        self.buf.extend_from_slice(charset_preamble(self.charset));
        self
    }

    // === Text Output ===

    /// Write text in the active code page
    pub fn text(&mut self, s: &str) -> &mut Self {
        self.buf.extend_from_slice(&encode_text(s, self.charset));
        self
    }

    /// Print the line buffer and advance one line
    pub fn newline(&mut self) -> &mut Self {
        self.buf.push(LF);
        self
    }

    /// One LF per line
    pub fn feed_lines(&mut self, lines: u32) -> &mut Self {
        self.buf.extend(std::iter::repeat_n(LF, lines as usize));
        self
    }

    /// ESC J n, split into steps of at most 255 dots
    pub fn feed_dots(&mut self, mut dots: u32) -> &mut Self {
        while dots > 0 {
            let step = dots.min(255);
            self.buf.extend_from_slice(&[ESC, 0x4A, step as u8]);
            dots -= step;
        }
        self
    }

    // === Alignment ===

    pub fn align(&mut self, align: Align) -> &mut Self {
        let n = match align {
            Align::Left => 0x00,
            Align::Center => 0x01,
            Align::Right => 0x02,
        };
        self.buf.extend_from_slice(&[ESC, 0x61, n]);
        self
    }

    // === Text Style ===

    /// ESC E n
    pub fn bold(&mut self, on: bool) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x45, on as u8]);
        self
    }

    /// ESC - n
    pub fn underline(&mut self, on: bool) -> &mut Self {
        self.buf.extend_from_slice(&[ESC, 0x2D, on as u8]);
        self
    }

    /// GS ! n
    pub fn size(&mut self, size: TextSize) -> &mut Self {
        let n = match size {
            TextSize::Normal => 0x00,
            TextSize::Big => 0x11,
            TextSize::Tall => 0x01,
            TextSize::Wide => 0x10,
        };
        self.buf.extend_from_slice(&[GS, 0x21, n]);
        self
    }

    // === Paper Control ===

    /// GS V m 0 (feed to cutter, then cut)
    pub fn cut(&mut self, mode: CutMode) -> &mut Self {
        match mode {
            CutMode::Full => self.buf.extend_from_slice(&[GS, 0x56, 0x41, 0x00]),
            CutMode::Partial => self.buf.extend_from_slice(&[GS, 0x56, 0x42, 0x00]),
            CutMode::None => {}
        }
        self
    }

    // === Cash Drawer ===

    /// Open cash drawer (pin 2)
    pub fn open_drawer(&mut self) -> &mut Self {
        // ESC p m t1 t2 - Generate pulse on pin m
        self.buf.extend_from_slice(&[ESC, 0x70, 0x00, 25, 250]);
        self
    }

    // === Raster Image ===

    /// GS v 0 in bands of at most [`RASTER_BAND_ROWS`] rows
    pub fn raster(&mut self, bitmap: &MonoBitmap) -> &mut Self {
        let mut row = 0;
        while row < bitmap.height() {
            let rows = (bitmap.height() - row).min(RASTER_BAND_ROWS);
            self.raster_band(bitmap, row, rows);
            row += rows;
        }
        self
    }

    /// GS v 0 for `rows` rows of `bitmap` starting at `first_row`
    pub fn raster_band(&mut self, bitmap: &MonoBitmap, first_row: u32, rows: u32) -> &mut Self {
        let x_bytes = bitmap.row_bytes();
        self.buf.extend_from_slice(&[GS, 0x76, 0x30, 0x00]);
        self.buf.push((x_bytes & 0xFF) as u8);
        self.buf.push((x_bytes >> 8) as u8);
        self.buf.push((rows & 0xFF) as u8);
        self.buf.push((rows >> 8) as u8);
        let start = (first_row * x_bytes) as usize;
        let end = ((first_row + rows) * x_bytes) as usize;
        self.buf.extend_from_slice(&bitmap.data()[start..end]);
        self
    }

    // === Barcode ===

    /// GS h n
    pub fn barcode_height(&mut self, dots: u8) -> &mut Self {
        self.buf.extend_from_slice(&[GS, 0x68, dots]);
        self
    }

    /// GS w n (2..=6)
    pub fn barcode_module_width(&mut self, n: u8) -> &mut Self {
        self.buf.extend_from_slice(&[GS, 0x77, n.clamp(2, 6)]);
        self
    }

    /// GS H n
    pub fn barcode_hri(&mut self, position: HriPosition) -> &mut Self {
        let n = match position {
            HriPosition::None => 0,
            HriPosition::Above => 1,
            HriPosition::Below => 2,
            HriPosition::Both => 3,
        };
        self.buf.extend_from_slice(&[GS, 0x48, n]);
        self
    }

    /// GS k m n d1..dn (function B)
    ///
    /// `data` must already be validated; it is at most 255 bytes.
    pub fn barcode(&mut self, system: BarcodeSystem, data: &[u8]) -> &mut Self {
        self.buf
            .extend_from_slice(&[GS, 0x6B, system as u8, data.len() as u8]);
        self.buf.extend_from_slice(data);
        self
    }

    // === QR Code ===

    /// Print a QR code with the native `GS ( k` sequence
    ///
    /// Size: 1-16 (module size in dots). Error correction level M.
    pub fn qr_code(&mut self, data: &[u8], size: u8) -> &mut Self {
        let size = size.clamp(1, 16);

        // Function 165: Select model (Model 2)
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x04, 0x00, 0x31, 0x41, 0x32, 0x00]);

        // Function 167: Set module size
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x43, size]);

        // Function 169: Set error correction (M)
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x45, 0x31]);

        // Function 180: Store data
        let len = data.len() + 3;
        let p_l = (len & 0xFF) as u8;
        let p_h = ((len >> 8) & 0xFF) as u8;
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, p_l, p_h, 0x31, 0x50, 0x30]);
        self.buf.extend_from_slice(data);

        // Function 181: Print
        self.buf
            .extend_from_slice(&[GS, 0x28, 0x6B, 0x03, 0x00, 0x31, 0x51, 0x30]);

        self
    }

    // === Raw Commands ===

    /// Write raw bytes directly
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    // === Build ===

    /// Take the accumulated bytes, leaving the builder empty
    pub fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    pub fn build(self) -> Vec<u8> {
        self.buf
    }
}

impl Default for EscPosBuilder {
    fn default() -> Self {
        Self::new(Charset::default())
    }
}
