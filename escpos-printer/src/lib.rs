//! # escpos-printer
//!
//! ESC/POS thermal receipt printing: markup in, printer bytes out.
//!
//! ## Scope
//!
//! - Markup parsing (`[L]`/`[C]`/`[R]`, `<b>`, `<u>`, `<font>`, `<img>`,
//!   `<barcode>`, `<qrcode>`) and canonical re-serialization
//! - ESC/POS command encoding with GBK or Windows-1252 text
//! - Bluetooth (RFCOMM), USB printer class and TCP 9100 transports
//! - One serialized job executor per printer
//!
//! ## Example
//!
//! ```ignore
//! use escpos_printer::{PrintJob, PrintJobExecutor, PrinterOptions};
//!
//! let printer = PrintJobExecutor::system();
//! printer.configure(&PrinterOptions::network("192.168.1.100")).await?;
//! printer.connect().await?;
//!
//! printer
//!     .print(PrintJob::new(
//!         "[C]<font size='big'><b>RECEIPT</b></font>\n\
//!          [L]Coffee[R]2.50\n\
//!          [C]<qrcode size='6'>https://example.com/r/42</qrcode>",
//!     ))
//!     .await?;
//! ```

pub mod config;
pub mod encoder;
pub mod encoding;
mod error;
pub mod escpos;
pub mod executor;
pub mod markup;
mod settings;
pub mod transport;

// Re-exports
pub use config::{
    Charset, CutMode, PaperSize, PrinterConfig, PrinterOptions, PrinterTarget, TransportKind,
    characters_per_line,
};
pub use encoder::{CommandEncoder, EncodedJob};
pub use error::{
    ConfigurationError, ConnectionError, EncodingError, ParserError, PrintError, PrintResult,
};
pub use escpos::EscPosBuilder;
pub use executor::{DirectPrintRequest, ExecutorState, JobHandle, PrintJob, PrintJobExecutor};
pub use markup::{Element, MarkupBuilder, parse, serialize};
pub use settings::ExecutorSettings;
pub use transport::{
    AccessBroker, MemoryTransportFactory, SystemTransportFactory, Transport, TransportFactory,
};
