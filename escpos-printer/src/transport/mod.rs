//! Byte channels to the printer
//!
//! ```text
//!             ┌────────────────────┐
//!             │  Transport Trait   │
//!             └─────────┬──────────┘
//!                       │
//!     ┌──────────┬──────┴─────┬──────────────┐
//!     ▼          ▼            ▼              ▼
//! Network     Radio         Usb           Memory
//! (TCP 9100)  (RFCOMM SPP)  (usblp node)  (in process)
//! ```
//!
//! Radio and USB devices need host authorization first; that handshake goes
//! through an injected [`AccessBroker`].

mod broker;
mod connection;
mod memory;
mod network;
mod radio;
mod usb;

pub use broker::{AccessBroker, AccessDenied, AccessGrant, DeviceNodeBroker};
pub use connection::{Connection, ConnectionState};
pub use memory::{MemoryLink, MemoryTransport, MemoryTransportFactory};
pub use network::NetworkTransport;
pub use radio::RadioTransport;
pub use usb::UsbTransport;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::PrinterTarget;
use crate::error::ConnectionError;

/// A printer byte channel
///
/// `disconnect` is idempotent: calling it on a closed transport is a no-op.
#[async_trait]
pub trait Transport: Send {
    /// Open the channel
    async fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Send bytes, in order, completely
    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError>;

    /// Push buffered bytes down to the device
    async fn flush(&mut self) -> Result<(), ConnectionError> {
        Ok(())
    }

    /// Close the channel
    async fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Human readable endpoint, for logs
    fn describe(&self) -> String;
}

/// Builds a fresh transport for a target
///
/// Called on every connect so a handle is never reused after a fault.
pub trait TransportFactory: Send + Sync {
    fn create(&self, target: &PrinterTarget) -> Box<dyn Transport>;
}

/// Real hardware transports
pub struct SystemTransportFactory {
    broker: Arc<dyn AccessBroker>,
}

impl SystemTransportFactory {
    pub fn new(broker: Arc<dyn AccessBroker>) -> Self {
        Self { broker }
    }
}

impl Default for SystemTransportFactory {
    fn default() -> Self {
        Self::new(Arc::new(DeviceNodeBroker::default()))
    }
}

impl TransportFactory for SystemTransportFactory {
    fn create(&self, target: &PrinterTarget) -> Box<dyn Transport> {
        match target {
            PrinterTarget::Network {
                host,
                port,
                connect_timeout,
            } => Box::new(NetworkTransport::new(host, *port, *connect_timeout)),
            PrinterTarget::Radio { address } => {
                Box::new(RadioTransport::new(address, self.broker.clone()))
            }
            PrinterTarget::Usb {
                vendor_id,
                product_id,
            } => Box::new(UsbTransport::new(
                *vendor_id,
                *product_id,
                self.broker.clone(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_system_factory_picks_transport() {
        let factory = SystemTransportFactory::default();

        let net = factory.create(&PrinterTarget::Network {
            host: "192.168.1.100".to_string(),
            port: 9100,
            connect_timeout: Duration::from_secs(3),
        });
        assert_eq!(net.describe(), "tcp://192.168.1.100:9100");
        assert!(!net.is_connected());

        let radio = factory.create(&PrinterTarget::Radio {
            address: "00:11:22:33:44:55".to_string(),
        });
        assert_eq!(radio.describe(), "radio://00:11:22:33:44:55");

        let usb = factory.create(&PrinterTarget::Usb {
            vendor_id: 0x0416,
            product_id: 0x5011,
        });
        assert_eq!(usb.describe(), "usb://0416:5011");
    }
}
