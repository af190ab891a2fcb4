//! Error types for the printer library
//!
//! Input problems (configuration, markup, encoding) are reported before any
//! byte reaches a transport. Connection problems come from the transport
//! layer and always fault the owning executor.

use std::io;

use thiserror::Error;

use crate::executor::ExecutorState;

/// Bad or missing printer options, detected before any I/O
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// None of `address`, `vendorId`/`productId` or `host` was supplied
    #[error("Missing printer identity: provide address, vendorId/productId or host")]
    MissingIdentity,

    /// More than one transport identity was supplied without `transport`
    #[error("Ambiguous printer identity: {0}")]
    AmbiguousIdentity(String),

    /// Identity present but malformed
    #[error("Invalid printer identity: {0}")]
    InvalidIdentity(String),

    /// Options could not be decoded
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// An operation needed a configuration that was never supplied
    #[error("Printer is not configured")]
    NotConfigured,
}

/// Markup that cannot be turned into elements
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParserError {
    #[error("Invalid markup at `{fragment}`: {reason}")]
    InvalidMarkup { fragment: String, reason: String },
}

impl ParserError {
    pub(crate) fn invalid(fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMarkup {
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }
}

/// Elements that cannot be rendered as printer commands
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodingError {
    #[error("Invalid {symbology} barcode content `{content}`: {reason}")]
    InvalidBarcodeContent {
        symbology: String,
        content: String,
        reason: String,
    },

    #[error("Unsupported barcode symbology: {0}")]
    UnsupportedSymbology(String),

    #[error("Barcode `{content}` does not fit in {max_dots} dots")]
    BarcodeTooWide { content: String, max_dots: u16 },

    #[error("Image is {width} dots wide, printable area is {max_width} dots")]
    ImageTooWide { width: u32, max_width: u16 },

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("Invalid QR code content: {0}")]
    InvalidQrContent(String),

    #[error("QR code with {modules} modules does not fit in {max_dots} dots")]
    QrCodeTooLarge { modules: usize, max_dots: u16 },

    #[error("Characters per line must be greater than zero")]
    InvalidCharactersPerLine,
}

/// Transport level failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Pairing / device access was refused by the host
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Connect or write did not finish in time
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Device missing, unplugged or not bound
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Any other I/O error on the channel
    #[error("IO failure: {0}")]
    IoFailure(String),
}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(e.to_string()),
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::Timeout(e.to_string()),
            io::ErrorKind::NotFound
            | io::ErrorKind::NotConnected
            | io::ErrorKind::ConnectionRefused
            | io::ErrorKind::AddrNotAvailable => Self::DeviceUnavailable(e.to_string()),
            _ => Self::IoFailure(e.to_string()),
        }
    }
}

/// Printer error types
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrintError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Parser(#[from] ParserError),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A connect attempt is already running
    #[error("Connection attempt already in progress")]
    AlreadyInProgress,

    /// The executor is not in a state that accepts this operation
    #[error("Printer not ready (state: {0})")]
    NotReady(ExecutorState),

    /// The job was cancelled while queued
    #[error("Job cancelled before it started")]
    Cancelled,

    /// The worker task is gone
    #[error("Printer executor is closed")]
    ExecutorClosed,
}

impl PrintError {
    /// Input validation failures never change executor state
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Parser(_) | Self::Encoding(_)
        )
    }
}

/// Result type for printer operations
pub type PrintResult<T> = Result<T, PrintError>;
