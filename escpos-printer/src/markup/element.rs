//! Typed elements produced by the markup parser

use std::fmt;
use std::str::FromStr;

use crate::error::EncodingError;

/// Horizontal alignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Align {
    #[default]
    Left,
    Center,
    Right,
}

impl Align {
    /// Line prefix tag
    pub fn tag(self) -> &'static str {
        match self {
            Self::Left => "[L]",
            Self::Center => "[C]",
            Self::Right => "[R]",
        }
    }
}

/// Character size selected with `GS !`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextSize {
    #[default]
    Normal,
    /// Double width and height
    Big,
    /// Double height only
    Tall,
    /// Double width only
    Wide,
}

impl TextSize {
    /// Horizontal scale factor
    pub fn width_scale(self) -> usize {
        match self {
            Self::Big | Self::Wide => 2,
            Self::Normal | Self::Tall => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Big => "big",
            Self::Tall => "tall",
            Self::Wide => "wide",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "normal" => Some(Self::Normal),
            "big" => Some(Self::Big),
            "tall" => Some(Self::Tall),
            "wide" => Some(Self::Wide),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextStyle {
    pub bold: bool,
    pub underline: bool,
    pub size: TextSize,
}

/// A run of text sharing one alignment and style
///
/// `line_end` is set on the last run of a printed line.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub content: String,
    pub align: Align,
    pub style: TextStyle,
    pub line_end: bool,
}

impl TextRun {
    /// A plain, single-run line
    pub fn line(content: impl Into<String>, align: Align) -> Self {
        Self {
            content: content.into(),
            align,
            style: TextStyle::default(),
            line_end: true,
        }
    }
}

/// Packed 1-bit-per-pixel bitmap, MSB first, rows padded to whole bytes
///
/// A set bit prints black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonoBitmap {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl MonoBitmap {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, EncodingError> {
        if width == 0 || height == 0 {
            return Err(EncodingError::InvalidImage(format!(
                "empty bitmap {}x{}",
                width, height
            )));
        }
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(EncodingError::InvalidImage(format!(
                "bitmap {}x{} is too large",
                width, height
            )));
        }
        let expected = width.div_ceil(8) as usize * height as usize;
        if data.len() != expected {
            return Err(EncodingError::InvalidImage(format!(
                "expected {} bytes of pixel data for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// Decode the `<img>` payload: `[w_lo, w_hi, h_lo, h_hi]` then packed rows, hex encoded
    pub fn from_hex(payload: &str) -> Result<Self, EncodingError> {
        let bytes = hex::decode(payload.trim())
            .map_err(|e| EncodingError::InvalidImage(format!("bad hex payload: {}", e)))?;
        if bytes.len() < 4 {
            return Err(EncodingError::InvalidImage(
                "payload shorter than its 4 byte header".to_string(),
            ));
        }
        let width = u16::from_le_bytes([bytes[0], bytes[1]]) as u32;
        let height = u16::from_le_bytes([bytes[2], bytes[3]]) as u32;
        Self::new(width, height, bytes[4..].to_vec())
    }

    /// Inverse of [`MonoBitmap::from_hex`]; lowercase hex
    pub fn to_hex(&self) -> String {
        let mut bytes = Vec::with_capacity(4 + self.data.len());
        bytes.extend_from_slice(&(self.width as u16).to_le_bytes());
        bytes.extend_from_slice(&(self.height as u16).to_le_bytes());
        bytes.extend_from_slice(&self.data);
        hex::encode(bytes)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Bytes per row
    pub fn row_bytes(&self) -> u32 {
        self.width.div_ceil(8)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageRaster {
    pub bitmap: MonoBitmap,
    pub align: Align,
}

/// Linear barcode symbologies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    Code128,
}

impl Symbology {
    /// Name used in the `type` attribute
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ean13 => "ean13",
            Self::Ean8 => "ean8",
            Self::UpcA => "upca",
            Self::Code128 => "128",
        }
    }
}

impl FromStr for Symbology {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ean13" | "ean-13" => Ok(Self::Ean13),
            "ean8" | "ean-8" => Ok(Self::Ean8),
            "upca" | "upc-a" => Ok(Self::UpcA),
            "128" | "code128" | "code-128" => Ok(Self::Code128),
            _ => Err(EncodingError::UnsupportedSymbology(s.to_string())),
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ean13 => "EAN13",
            Self::Ean8 => "EAN8",
            Self::UpcA => "UPCA",
            Self::Code128 => "CODE128",
        };
        f.write_str(name)
    }
}

/// Where the human readable digits go
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HriPosition {
    None,
    Above,
    #[default]
    Below,
    Both,
}

impl HriPosition {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Above => "above",
            Self::Below => "below",
            Self::Both => "both",
        }
    }

    pub(crate) fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "above" => Some(Self::Above),
            "below" => Some(Self::Below),
            "both" => Some(Self::Both),
            _ => None,
        }
    }
}

/// Default barcode height in millimetres
pub const DEFAULT_BARCODE_HEIGHT_MM: f32 = 10.0;

/// Default QR module size
pub const DEFAULT_QR_SIZE: u8 = 25;

#[derive(Debug, Clone, PartialEq)]
pub struct Barcode {
    pub symbology: Symbology,
    pub content: String,
    pub height_mm: f32,
    /// Target symbol width; `None` fits the printable area
    pub width_mm: Option<f32>,
    pub text_position: HriPosition,
    pub align: Align,
}

impl Barcode {
    pub fn new(symbology: Symbology, content: impl Into<String>) -> Self {
        Self {
            symbology,
            content: content.into(),
            height_mm: DEFAULT_BARCODE_HEIGHT_MM,
            width_mm: None,
            text_position: HriPosition::default(),
            align: Align::Center,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QrCode {
    pub content: String,
    /// Requested module size in dots; the encoder shrinks it to fit
    pub module_size: u8,
    pub align: Align,
}

/// One unit of printable content
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Text(TextRun),
    Image(ImageRaster),
    Barcode(Barcode),
    QrCode(QrCode),
    Feed { line_count: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_hex_descriptor() {
        // 10 px wide -> 2 bytes per row, 2 rows
        let bitmap = MonoBitmap::new(10, 2, vec![0xFF, 0xC0, 0x80, 0x00]).unwrap();
        let hex = bitmap.to_hex();
        assert!(hex.starts_with("0a000200"));
        assert_eq!(MonoBitmap::from_hex(&hex).unwrap(), bitmap);
    }

    #[test]
    fn test_bitmap_rejects_bad_payload() {
        assert!(MonoBitmap::from_hex("zz").is_err());
        assert!(MonoBitmap::from_hex("0a00").is_err());
        // header says 8x2, only one row of data
        assert!(MonoBitmap::from_hex("08000200ff").is_err());
        assert!(MonoBitmap::new(0, 1, vec![]).is_err());
    }

    #[test]
    fn test_symbology_names() {
        assert_eq!("EAN13".parse::<Symbology>().unwrap(), Symbology::Ean13);
        assert_eq!("upca".parse::<Symbology>().unwrap(), Symbology::UpcA);
        assert_eq!("CODE128".parse::<Symbology>().unwrap(), Symbology::Code128);
        assert_eq!("128".parse::<Symbology>().unwrap(), Symbology::Code128);
        assert!(matches!(
            "itf".parse::<Symbology>(),
            Err(EncodingError::UnsupportedSymbology(_))
        ));
    }

    #[test]
    fn test_text_size_scale() {
        assert_eq!(TextSize::Big.width_scale(), 2);
        assert_eq!(TextSize::Wide.width_scale(), 2);
        assert_eq!(TextSize::Tall.width_scale(), 1);
    }
}
