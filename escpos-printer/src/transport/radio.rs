//! Bluetooth printer over RFCOMM (Serial Port Profile)
//!
//! The broker resolves the MAC address to a bound serial node; the node is then
//! driven with `serialport`. All port I/O is blocking and runs on the blocking
//! pool.

use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serialport::SerialPort;
use tracing::{debug, info, instrument};

use super::{AccessBroker, Transport};
use crate::config::PrinterTarget;
use crate::error::ConnectionError;

/// SPP ignores the baud rate, but the tty layer still wants one
const BAUD_RATE: u32 = 115_200;

/// Per-call port timeout
const PORT_TIMEOUT: Duration = Duration::from_secs(10);

/// Bytes handed to the port per blocking write
const CHUNK_SIZE: usize = 4096;

/// Open tty, shared with the blocking task currently driving it
///
/// A write abandoned by its caller keeps running on the blocking pool; the
/// slot lets `disconnect` wait for it and close the handle afterwards.
type PortSlot = Arc<Mutex<Option<Box<dyn Write + Send>>>>;

struct SerialWriter(Box<dyn SerialPort>);

impl Write for SerialWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

fn lock(slot: &PortSlot) -> MutexGuard<'_, Option<Box<dyn Write + Send>>> {
    slot.lock().unwrap_or_else(|e| e.into_inner())
}

pub struct RadioTransport {
    address: String,
    broker: Arc<dyn AccessBroker>,
    port: PortSlot,
    connected: bool,
}

impl RadioTransport {
    pub fn new(address: &str, broker: Arc<dyn AccessBroker>) -> Self {
        Self {
            address: address.to_string(),
            broker,
            port: Arc::new(Mutex::new(None)),
            connected: false,
        }
    }

    fn live_port(&self) -> Result<PortSlot, ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::DeviceUnavailable(format!(
                "radio {} is not connected",
                self.address
            )));
        }
        Ok(self.port.clone())
    }

    /// Run `op` against the open port on the blocking pool
    async fn with_port<F>(&self, op: F) -> Result<(), ConnectionError>
    where
        F: FnOnce(&mut (dyn Write + Send)) -> io::Result<()> + Send + 'static,
    {
        let slot = self.live_port()?;
        tokio::task::spawn_blocking(move || -> Result<(), ConnectionError> {
            let mut guard = lock(&slot);
            let port = guard
                .as_mut()
                .ok_or_else(|| ConnectionError::DeviceUnavailable("port closed".to_string()))?;
            op(port.as_mut())?;
            Ok(())
        })
        .await
        .map_err(join_error)?
    }
}

fn map_serial_error(e: serialport::Error) -> ConnectionError {
    match e.kind() {
        serialport::ErrorKind::NoDevice => ConnectionError::DeviceUnavailable(e.to_string()),
        serialport::ErrorKind::Io(kind) => {
            ConnectionError::from(std::io::Error::new(kind, e.description))
        }
        _ => ConnectionError::IoFailure(e.to_string()),
    }
}

fn join_error(e: tokio::task::JoinError) -> ConnectionError {
    ConnectionError::IoFailure(format!("serial task failed: {}", e))
}

#[async_trait]
impl Transport for RadioTransport {
    #[instrument(skip(self), fields(address = %self.address))]
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.connected {
            return Ok(());
        }

        let target = PrinterTarget::Radio {
            address: self.address.clone(),
        };
        let grant = self.broker.request_access(&target).await?;
        let path = grant.device_path.to_string_lossy().into_owned();
        info!(path = %path, "Opening RFCOMM port");

        let port = tokio::task::spawn_blocking(move || {
            serialport::new(path, BAUD_RATE)
                .data_bits(serialport::DataBits::Eight)
                .parity(serialport::Parity::None)
                .stop_bits(serialport::StopBits::One)
                .flow_control(serialport::FlowControl::None)
                .timeout(PORT_TIMEOUT)
                .open()
        })
        .await
        .map_err(join_error)?
        .map_err(map_serial_error)?;

        *lock(&self.port) = Some(Box::new(SerialWriter(port)));
        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let data = bytes.to_vec();
        self.with_port(move |port| {
            data.chunks(CHUNK_SIZE)
                .try_for_each(|chunk| port.write_all(chunk))
        })
        .await?;
        debug!(len = bytes.len(), "Sent to radio printer");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        self.with_port(|port| port.flush()).await
    }

    async fn disconnect(&mut self) {
        if !std::mem::take(&mut self.connected) {
            return;
        }
        // Blocks until an in-flight write lets go of the port; the port
        // timeout bounds the wait. Dropping the handle closes the tty.
        let slot = self.port.clone();
        let closed = tokio::task::spawn_blocking(move || lock(&slot).take().is_some()).await;
        if matches!(closed, Ok(true)) {
            debug!(address = %self.address, "RFCOMM port closed");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn describe(&self) -> String {
        format!("radio://{}", self.address)
    }
}
