//! Printer configuration
//!
//! Options arrive as a loose JSON-like map (the same keys the mobile bridge
//! used) and are frozen into an immutable [`PrinterConfig`]. Paper geometry is
//! never set directly: it is looked up from [`PAPER_PROFILES`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigurationError;

/// Default raw printing port
pub const DEFAULT_NETWORK_PORT: u16 = 9100;

/// Default TCP connect timeout in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default print head density
pub const DEFAULT_DPI: u16 = 203;

/// Font A cell width in dots
const FONT_A_WIDTH_DOTS: u16 = 12;

/// Paper roll width
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaperSize {
    Mm58,
    Mm80,
}

impl PaperSize {
    /// Map a millimetre value, falling back to 58mm for anything unknown
    pub fn from_mm(mm: u32) -> Self {
        match mm {
            58 => Self::Mm58,
            80 => Self::Mm80,
            other => {
                warn!(paper_size = other, "Unsupported paper size, using 58mm");
                Self::Mm58
            }
        }
    }

    pub fn mm(self) -> u32 {
        match self {
            Self::Mm58 => 58,
            Self::Mm80 => 80,
        }
    }
}

/// One row of the geometry table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperProfile {
    pub paper: PaperSize,
    pub dpi: u16,
    pub printable_mm: f32,
    pub printable_dots: u16,
    pub characters_per_line: usize,
}

/// Printable area per paper width and head density
pub const PAPER_PROFILES: [PaperProfile; 4] = [
    PaperProfile {
        paper: PaperSize::Mm58,
        dpi: 203,
        printable_mm: 48.0,
        printable_dots: 384,
        characters_per_line: (384 / FONT_A_WIDTH_DOTS) as usize,
    },
    PaperProfile {
        paper: PaperSize::Mm80,
        dpi: 203,
        printable_mm: 72.0,
        printable_dots: 576,
        characters_per_line: (576 / FONT_A_WIDTH_DOTS) as usize,
    },
    PaperProfile {
        paper: PaperSize::Mm58,
        dpi: 180,
        printable_mm: 48.0,
        printable_dots: 340,
        characters_per_line: (340 / FONT_A_WIDTH_DOTS) as usize,
    },
    PaperProfile {
        paper: PaperSize::Mm80,
        dpi: 180,
        printable_mm: 72.0,
        printable_dots: 510,
        characters_per_line: (510 / FONT_A_WIDTH_DOTS) as usize,
    },
];

/// Look up the profile for a paper width and density.
///
/// Unknown densities use the 203 dpi row.
pub fn paper_profile(paper: PaperSize, dpi: u16) -> PaperProfile {
    let dpi = if dpi == 180 || dpi == DEFAULT_DPI {
        dpi
    } else {
        warn!(dpi, "Unsupported dot density, using 203 dpi");
        DEFAULT_DPI
    };

    PAPER_PROFILES
        .iter()
        .copied()
        .find(|p| p.paper == paper && p.dpi == dpi)
        .unwrap_or(PAPER_PROFILES[0])
}

/// Characters per line for a paper width at the default density
pub fn characters_per_line(paper: PaperSize) -> usize {
    paper_profile(paper, DEFAULT_DPI).characters_per_line
}

/// What to do with the paper after a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "CutPaperTypeRepr", into = "u8")]
pub enum CutMode {
    #[default]
    Full,
    None,
    Partial,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CutPaperTypeRepr {
    Code(u8),
    Name(String),
}

impl TryFrom<CutPaperTypeRepr> for CutMode {
    type Error = String;

    fn try_from(value: CutPaperTypeRepr) -> Result<Self, Self::Error> {
        match value {
            CutPaperTypeRepr::Code(0) => Ok(Self::Full),
            CutPaperTypeRepr::Code(1) => Ok(Self::None),
            CutPaperTypeRepr::Code(2) => Ok(Self::Partial),
            CutPaperTypeRepr::Code(other) => Err(format!("unknown cutPaperType {}", other)),
            CutPaperTypeRepr::Name(name) => match name.to_ascii_lowercase().as_str() {
                "full" | "cut" | "cutenabled" => Ok(Self::Full),
                "none" | "nocut" | "cutdisabled" => Ok(Self::None),
                "partial" => Ok(Self::Partial),
                other => Err(format!("unknown cutPaperType '{}'", other)),
            },
        }
    }
}

impl From<CutMode> for u8 {
    fn from(mode: CutMode) -> Self {
        match mode {
            CutMode::Full => 0,
            CutMode::None => 1,
            CutMode::Partial => 2,
        }
    }
}

/// Printer code page used for text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Charset {
    /// Simplified Chinese (printer Chinese mode)
    #[default]
    Gbk,
    /// Western European, code table 16 (WPC1252)
    Windows1252,
}

/// Explicit transport selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[serde(alias = "bluetooth")]
    Radio,
    Usb,
    #[serde(alias = "tcp")]
    Network,
}

/// Identity of the physical printer a config points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrinterTarget {
    /// Bluetooth SPP device, by MAC address
    Radio { address: String },
    /// USB printer class device
    Usb { vendor_id: u16, product_id: u16 },
    /// Raw TCP printer
    Network {
        host: String,
        port: u16,
        connect_timeout: Duration,
    },
}

impl PrinterTarget {
    pub fn kind(&self) -> TransportKind {
        match self {
            Self::Radio { .. } => TransportKind::Radio,
            Self::Usb { .. } => TransportKind::Usb,
            Self::Network { .. } => TransportKind::Network,
        }
    }

    /// Whether both targets address the same device (timeouts ignored)
    pub fn same_device(&self, other: &PrinterTarget) -> bool {
        match (self, other) {
            (Self::Radio { address: a }, Self::Radio { address: b }) => a.eq_ignore_ascii_case(b),
            (
                Self::Usb {
                    vendor_id: v1,
                    product_id: p1,
                },
                Self::Usb {
                    vendor_id: v2,
                    product_id: p2,
                },
            ) => v1 == v2 && p1 == p2,
            (
                Self::Network {
                    host: h1, port: p1, ..
                },
                Self::Network {
                    host: h2, port: p2, ..
                },
            ) => h1 == h2 && p1 == p2,
            _ => false,
        }
    }
}

impl fmt::Display for PrinterTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio { address } => write!(f, "radio:{}", address),
            Self::Usb {
                vendor_id,
                product_id,
            } => write!(f, "usb:{:04x}:{:04x}", vendor_id, product_id),
            Self::Network { host, port, .. } => write!(f, "tcp:{}:{}", host, port),
        }
    }
}

/// Raw printer options as sent by the caller
///
/// ```ignore
/// {
///   "paperSize": 58,
///   "cutPaperType": 0,
///   "disconnectAfterPrint": true,
///   "feedAfterPrint": 0,
///   "isOpenCashDrawer": false,
///   "host": "192.168.1.100"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrinterOptions {
    pub paper_size: Option<u32>,
    pub dots_per_inch: Option<u16>,
    pub cut_paper_type: Option<CutMode>,
    pub disconnect_after_print: Option<bool>,
    pub feed_after_print: Option<f32>,
    pub is_open_cash_drawer: Option<bool>,
    pub charset: Option<Charset>,
    pub transport: Option<TransportKind>,

    #[serde(alias = "btAddress")]
    pub address: Option<String>,
    #[serde(alias = "usbVendorId")]
    pub vendor_id: Option<u16>,
    #[serde(alias = "usbProductId")]
    pub product_id: Option<u16>,
    #[serde(alias = "netIp")]
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_secs: Option<u64>,
}

impl PrinterOptions {
    /// Options for a network printer on the default port
    pub fn network(host: &str) -> Self {
        Self {
            host: Some(host.to_string()),
            ..Default::default()
        }
    }

    /// Options for a Bluetooth printer
    pub fn radio(address: &str) -> Self {
        Self {
            address: Some(address.to_string()),
            ..Default::default()
        }
    }

    /// Options for a USB printer
    pub fn usb(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id: Some(vendor_id),
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    fn resolve_target(&self) -> Result<PrinterTarget, ConfigurationError> {
        let has_radio = self.address.is_some();
        let has_usb = self.vendor_id.is_some() || self.product_id.is_some();
        let has_network = self.host.is_some();

        let kind = match self.transport {
            Some(kind) => kind,
            None => match (has_radio, has_usb, has_network) {
                (false, false, false) => return Err(ConfigurationError::MissingIdentity),
                (true, false, false) => TransportKind::Radio,
                (false, true, false) => TransportKind::Usb,
                (false, false, true) => TransportKind::Network,
                _ => {
                    return Err(ConfigurationError::AmbiguousIdentity(
                        "more than one of address, vendorId/productId, host".to_string(),
                    ));
                }
            },
        };

        match kind {
            TransportKind::Radio => {
                let address = self
                    .address
                    .as_deref()
                    .ok_or(ConfigurationError::MissingIdentity)?;
                if !is_valid_mac(address) {
                    return Err(ConfigurationError::InvalidIdentity(format!(
                        "Bluetooth address '{}' is not XX:XX:XX:XX:XX:XX",
                        address
                    )));
                }
                Ok(PrinterTarget::Radio {
                    address: address.to_ascii_uppercase(),
                })
            }
            TransportKind::Usb => match (self.vendor_id, self.product_id) {
                (Some(vendor_id), Some(product_id)) => Ok(PrinterTarget::Usb {
                    vendor_id,
                    product_id,
                }),
                (None, None) => Err(ConfigurationError::MissingIdentity),
                _ => Err(ConfigurationError::InvalidIdentity(
                    "vendorId and productId must be given together".to_string(),
                )),
            },
            TransportKind::Network => {
                let host = self
                    .host
                    .as_deref()
                    .map(str::trim)
                    .ok_or(ConfigurationError::MissingIdentity)?;
                if host.is_empty() {
                    return Err(ConfigurationError::InvalidIdentity(
                        "host is empty".to_string(),
                    ));
                }
                let port = self.port.unwrap_or(DEFAULT_NETWORK_PORT);
                if port == 0 {
                    return Err(ConfigurationError::InvalidIdentity(
                        "port must be non-zero".to_string(),
                    ));
                }
                let secs = self
                    .timeout_secs
                    .filter(|s| *s > 0)
                    .unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);
                Ok(PrinterTarget::Network {
                    host: host.to_string(),
                    port,
                    connect_timeout: Duration::from_secs(secs),
                })
            }
        }
    }
}

/// Immutable printer configuration
///
/// Built once per `configure` call; geometry comes from [`PAPER_PROFILES`].
#[derive(Debug, Clone, PartialEq)]
pub struct PrinterConfig {
    profile: PaperProfile,
    cut_mode: CutMode,
    open_cash_drawer: bool,
    disconnect_after_print: bool,
    extra_feed_lines: f32,
    charset: Charset,
    target: PrinterTarget,
}

impl PrinterConfig {
    /// Validate options and freeze them.
    ///
    /// The identity is checked before anything else so a bad target never
    /// reaches a transport.
    pub fn build(options: &PrinterOptions) -> Result<Self, ConfigurationError> {
        let target = options.resolve_target()?;

        let paper = PaperSize::from_mm(options.paper_size.unwrap_or(58));
        let profile = paper_profile(paper, options.dots_per_inch.unwrap_or(DEFAULT_DPI));

        let extra_feed_lines = options
            .feed_after_print
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(0.0);

        Ok(Self {
            profile,
            cut_mode: options.cut_paper_type.unwrap_or_default(),
            open_cash_drawer: options.is_open_cash_drawer.unwrap_or(true),
            disconnect_after_print: options.disconnect_after_print.unwrap_or(true),
            extra_feed_lines,
            charset: options.charset.unwrap_or_default(),
            target,
        })
    }

    /// Decode options from JSON and build
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        let options: PrinterOptions = serde_json::from_str(json)
            .map_err(|e| ConfigurationError::InvalidOptions(e.to_string()))?;
        Self::build(&options)
    }

    pub fn paper_size(&self) -> PaperSize {
        self.profile.paper
    }

    pub fn dots_per_inch(&self) -> u16 {
        self.profile.dpi
    }

    pub fn printable_width_mm(&self) -> f32 {
        self.profile.printable_mm
    }

    pub fn printable_width_dots(&self) -> u16 {
        self.profile.printable_dots
    }

    pub fn characters_per_line(&self) -> usize {
        self.profile.characters_per_line
    }

    pub fn cut_mode(&self) -> CutMode {
        self.cut_mode
    }

    pub fn open_cash_drawer(&self) -> bool {
        self.open_cash_drawer
    }

    pub fn disconnect_after_print(&self) -> bool {
        self.disconnect_after_print
    }

    pub fn extra_feed_lines(&self) -> f32 {
        self.extra_feed_lines
    }

    pub fn charset(&self) -> Charset {
        self.charset
    }

    pub fn target(&self) -> &PrinterTarget {
        &self.target
    }

    /// Convert millimetres to dots
    pub fn mm_to_dots(&self, mm: f32) -> u32 {
        (mm * self.profile.dpi as f32 / 25.4).round().max(0.0) as u32
    }

    /// Convert feed lines (1/6 inch each) to dots
    pub fn lines_to_dots(&self, lines: f32) -> u32 {
        (lines * self.profile.dpi as f32 / 6.0).round().max(0.0) as u32
    }
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    parts.len() == 6
        && parts
            .iter()
            .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}
