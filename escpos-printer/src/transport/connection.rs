//! Connection lifecycle
//!
//! One [`Connection`] per executor. Every open discards the previous handle
//! and builds a new one from the factory; any transport error faults it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use super::{Transport, TransportFactory};
use crate::config::PrinterTarget;
use crate::error::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Faulted => "faulted",
        };
        f.write_str(s)
    }
}

pub struct Connection {
    factory: Arc<dyn TransportFactory>,
    transport: Option<Box<dyn Transport>>,
    target: Option<PrinterTarget>,
    state: ConnectionState,
    write_deadline: Duration,
}

impl Connection {
    pub fn new(factory: Arc<dyn TransportFactory>, write_deadline: Duration) -> Self {
        Self {
            factory,
            transport: None,
            target: None,
            state: ConnectionState::Disconnected,
            write_deadline,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Target of the current (or last faulted) connection
    pub fn target(&self) -> Option<&PrinterTarget> {
        self.target.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
            && self.transport.as_ref().is_some_and(|t| t.is_connected())
    }

    /// Open a fresh channel to `target`, closing any previous one first
    #[instrument(skip(self), fields(printer = %target))]
    pub async fn open(&mut self, target: &PrinterTarget) -> Result<(), ConnectionError> {
        self.close().await;

        self.state = ConnectionState::Connecting;
        self.target = Some(target.clone());
        let mut transport = self.factory.create(target);

        match transport.connect().await {
            Ok(()) => {
                info!(endpoint = %transport.describe(), "Printer connected");
                self.transport = Some(transport);
                self.state = ConnectionState::Connected;
                Ok(())
            }
            Err(e) => {
                warn!(endpoint = %transport.describe(), error = %e, "Printer connect failed");
                transport.disconnect().await;
                self.state = ConnectionState::Faulted;
                Err(e)
            }
        }
    }

    /// Write with the configured deadline
    pub async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let deadline = self.write_deadline;
        let result = match self.live_transport() {
            Ok(transport) => match tokio::time::timeout(deadline, transport.write(bytes)).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(format!(
                    "write of {} bytes did not finish within {:?}",
                    bytes.len(),
                    deadline
                ))),
            },
            Err(e) => Err(e),
        };
        self.check(result).await
    }

    /// Flush with the configured deadline
    pub async fn flush(&mut self) -> Result<(), ConnectionError> {
        let deadline = self.write_deadline;
        let result = match self.live_transport() {
            Ok(transport) => match tokio::time::timeout(deadline, transport.flush()).await {
                Ok(result) => result,
                Err(_) => Err(ConnectionError::Timeout(format!(
                    "flush did not finish within {:?}",
                    deadline
                ))),
            },
            Err(e) => Err(e),
        };
        self.check(result).await
    }

    /// Close the channel; safe to call repeatedly
    pub async fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.disconnect().await;
            info!(endpoint = %transport.describe(), "Printer disconnected");
        }
        self.target = None;
        self.state = ConnectionState::Disconnected;
    }

    fn live_transport(&mut self) -> Result<&mut Box<dyn Transport>, ConnectionError> {
        if self.state != ConnectionState::Connected {
            return Err(ConnectionError::DeviceUnavailable(format!(
                "connection is {}",
                self.state
            )));
        }
        self.transport
            .as_mut()
            .ok_or_else(|| ConnectionError::DeviceUnavailable("no open channel".to_string()))
    }

    async fn check(&mut self, result: Result<(), ConnectionError>) -> Result<(), ConnectionError> {
        if let Err(e) = &result {
            warn!(error = %e, "Printer channel faulted");
            if let Some(mut transport) = self.transport.take() {
                transport.disconnect().await;
            }
            self.state = ConnectionState::Faulted;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransportFactory;

    fn target() -> PrinterTarget {
        PrinterTarget::Network {
            host: "mem".to_string(),
            port: 9100,
            connect_timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_open_write_close() {
        let factory = MemoryTransportFactory::new();
        let link = factory.link();
        let mut conn = Connection::new(Arc::new(factory), Duration::from_secs(1));

        conn.open(&target()).await.unwrap();
        assert!(conn.is_connected());
        conn.write(b"abc").await.unwrap();
        assert_eq!(link.written(), b"abc");

        conn.close().await;
        conn.close().await;
        assert_eq!(conn.state(), ConnectionState::Disconnected);
        assert_eq!(link.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_reopen_rebuilds_handle() {
        let factory = MemoryTransportFactory::new();
        let link = factory.link();
        let mut conn = Connection::new(Arc::new(factory), Duration::from_secs(1));

        conn.open(&target()).await.unwrap();
        conn.open(&target()).await.unwrap();
        assert_eq!(link.created(), 2);
        assert_eq!(link.open_handles(), 1);
    }

    #[tokio::test]
    async fn test_write_error_faults() {
        let factory = MemoryTransportFactory::new();
        let link = factory.link();
        let mut conn = Connection::new(Arc::new(factory), Duration::from_secs(1));

        conn.open(&target()).await.unwrap();
        link.fail_writes(ConnectionError::IoFailure("broken pipe".to_string()));
        assert!(conn.write(b"x").await.is_err());
        assert_eq!(conn.state(), ConnectionState::Faulted);
        assert_eq!(link.open_handles(), 0);

        // Not connected any more
        link.clear_faults();
        assert!(matches!(
            conn.write(b"y").await,
            Err(ConnectionError::DeviceUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_write_deadline() {
        let factory = MemoryTransportFactory::new();
        let link = factory.link();
        let mut conn = Connection::new(Arc::new(factory), Duration::from_millis(20));

        conn.open(&target()).await.unwrap();
        link.set_write_delay(Duration::from_millis(500));
        assert!(matches!(
            conn.write(b"slow").await,
            Err(ConnectionError::Timeout(_))
        ));
        assert_eq!(conn.state(), ConnectionState::Faulted);
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let factory = MemoryTransportFactory::new();
        let link = factory.link();
        let mut conn = Connection::new(Arc::new(factory), Duration::from_secs(1));

        link.fail_next_connect(ConnectionError::PermissionDenied("not paired".to_string()));
        assert_eq!(
            conn.open(&target()).await,
            Err(ConnectionError::PermissionDenied("not paired".to_string()))
        );
        assert_eq!(conn.state(), ConnectionState::Faulted);

        conn.open(&target()).await.unwrap();
        assert_eq!(conn.state(), ConnectionState::Connected);
    }
}
