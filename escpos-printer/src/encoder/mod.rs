//! Element to ESC/POS translation
//!
//! The encoder is a pure function of a [`PrinterConfig`] and an element
//! sequence. Output is split into segments (preamble, one per printed line or
//! block element, terminator) so the executor can stream them in order.

mod barcode;
mod qr;
mod raster;
mod text;

pub use barcode::{check_digit, validate_barcode};
pub use raster::decode_base64_image;
#[cfg(feature = "image")]
pub use raster::rasterize;

use tracing::debug;

use crate::config::PrinterConfig;
use crate::error::EncodingError;
use crate::escpos::EscPosBuilder;
use crate::markup::{Align, Element, TextRun};

/// Encoded job, ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedJob {
    segments: Vec<Vec<u8>>,
}

impl EncodedJob {
    pub fn segments(&self) -> &[Vec<u8>] {
        &self.segments
    }

    /// Total byte count
    pub fn len(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.iter().all(Vec::is_empty)
    }

    /// All segments joined
    pub fn to_bytes(&self) -> Vec<u8> {
        self.segments.concat()
    }

    pub fn into_segments(self) -> Vec<Vec<u8>> {
        self.segments
    }

    pub(crate) fn push(&mut self, segment: Vec<u8>) {
        if !segment.is_empty() {
            self.segments.push(segment);
        }
    }
}

/// Turns elements into printer commands for one configuration
pub struct CommandEncoder<'a> {
    config: &'a PrinterConfig,
}

impl<'a> CommandEncoder<'a> {
    pub fn new(config: &'a PrinterConfig) -> Result<Self, EncodingError> {
        if config.characters_per_line() == 0 {
            return Err(EncodingError::InvalidCharactersPerLine);
        }
        Ok(Self { config })
    }

    pub fn config(&self) -> &PrinterConfig {
        self.config
    }

    /// Encode with the configured trailing feed
    pub fn encode(&self, elements: &[Element]) -> Result<EncodedJob, EncodingError> {
        self.encode_with_feed(elements, self.config.extra_feed_lines())
    }

    /// Encode with an explicit trailing feed, in lines
    pub fn encode_with_feed(
        &self,
        elements: &[Element],
        feed_lines: f32,
    ) -> Result<EncodedJob, EncodingError> {
        let mut job = EncodedJob {
            segments: Vec::new(),
        };
        let mut b = EscPosBuilder::new(self.config.charset());

        b.init();
        job.push(b.take());

        let mut pending: Vec<&TextRun> = Vec::new();
        for element in elements {
            match element {
                Element::Text(run) => {
                    pending.push(run);
                    if run.line_end {
                        text::encode_line(&mut b, &pending, self.config);
                        pending.clear();
                        job.push(b.take());
                    }
                }
                other => {
                    if !pending.is_empty() {
                        text::encode_line(&mut b, &pending, self.config);
                        pending.clear();
                        job.push(b.take());
                    }
                    if let Element::Image(image) = other {
                        // One segment per band
                        raster::encode_raster(&mut b, image, self.config, |b| job.push(b.take()))?;
                    } else {
                        self.encode_block(&mut b, other)?;
                    }
                    job.push(b.take());
                }
            }
        }
        if !pending.is_empty() {
            text::encode_line(&mut b, &pending, self.config);
            job.push(b.take());
        }

        // Return the head to a neutral state
        b.align(Align::Left).newline();
        if feed_lines.is_finite() && feed_lines > 0.0 {
            b.feed_dots(self.config.lines_to_dots(feed_lines));
        }
        job.push(b.take());

        debug!(
            segments = job.segments.len(),
            bytes = job.len(),
            "Encoded print job"
        );
        Ok(job)
    }

    fn encode_block(&self, b: &mut EscPosBuilder, element: &Element) -> Result<(), EncodingError> {
        match element {
            Element::Image(image) => raster::encode_raster(b, image, self.config, |_| {}),
            Element::Barcode(barcode) => barcode::encode_barcode(b, barcode, self.config),
            Element::QrCode(qr) => qr::encode_qr(b, qr, self.config),
            Element::Feed { line_count } => {
                b.feed_lines(*line_count);
                Ok(())
            }
            Element::Text(run) => {
                text::encode_line(b, &[run], self.config);
                Ok(())
            }
        }
    }
}
