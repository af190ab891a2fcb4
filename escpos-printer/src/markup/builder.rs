//! Append-only markup buffer
//!
//! Callers build a job piece by piece and flush it in one go with
//! [`MarkupBuilder::take`]. Nothing else resets the buffer.

use super::element::{Align, Barcode, Element, ImageRaster, MonoBitmap, QrCode};
use super::serialize::block_line;

#[derive(Debug, Default, Clone)]
pub struct MarkupBuilder {
    lines: Vec<String>,
}

impl MarkupBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append markup text
    ///
    /// Each call starts left aligned unless it carries its own tag; later
    /// lines of the same call keep the alignment in effect.
    pub fn text(&mut self, markup: &str) -> &mut Self {
        for (i, line) in markup.split('\n').enumerate() {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if i == 0 {
                self.lines.push(format!("[L]{}", line));
            } else {
                self.lines.push(line.to_string());
            }
        }
        self
    }

    /// Append an image, centered
    pub fn image(&mut self, bitmap: MonoBitmap) -> &mut Self {
        self.element(&Element::Image(ImageRaster {
            bitmap,
            align: Align::Center,
        }))
    }

    pub fn barcode(&mut self, barcode: Barcode) -> &mut Self {
        self.element(&Element::Barcode(barcode))
    }

    pub fn qr_code(&mut self, content: &str, module_size: u8) -> &mut Self {
        self.element(&Element::QrCode(QrCode {
            content: content.to_string(),
            module_size,
            align: Align::Center,
        }))
    }

    /// Append `lines` empty lines
    pub fn feed(&mut self, lines: u32) -> &mut Self {
        self.lines
            .extend((0..lines).map(|_| String::from("[L]")));
        self
    }

    fn element(&mut self, element: &Element) -> &mut Self {
        self.lines.push(block_line(element));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Current buffer content
    pub fn markup(&self) -> String {
        self.lines.join("\n")
    }

    /// Flush the buffer
    pub fn take(&mut self) -> String {
        let markup = self.markup();
        self.lines.clear();
        markup
    }
}
