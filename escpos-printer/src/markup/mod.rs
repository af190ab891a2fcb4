//! Print markup
//!
//! ```text
//! [C]<font size='big'><b>RECEIPT</b></font>
//! [L]Coffee[R]2.50
//! [C]<barcode type='ean13' height='10'>590123412345</barcode>
//! [C]<qrcode size='6'>https://example.com</qrcode>
//! ```

mod builder;
mod element;
mod parser;
mod serialize;

pub use builder::MarkupBuilder;
pub use element::{
    Align, Barcode, DEFAULT_BARCODE_HEIGHT_MM, DEFAULT_QR_SIZE, Element, HriPosition, ImageRaster,
    MonoBitmap, QrCode, Symbology, TextRun, TextSize, TextStyle,
};
pub use parser::parse;
pub use serialize::serialize;
