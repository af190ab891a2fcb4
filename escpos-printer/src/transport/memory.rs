//! In-process transport
//!
//! Records every byte instead of sending it. Faults and slow writes can be
//! injected through the shared [`MemoryLink`].

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::{Transport, TransportFactory};
use crate::config::PrinterTarget;
use crate::error::ConnectionError;

#[derive(Debug, Default)]
struct Recorder {
    writes: Vec<Vec<u8>>,
    targets: Vec<PrinterTarget>,
    connects: usize,
    disconnects: usize,
    open_handles: usize,
    fail_next_connect: Option<ConnectionError>,
    fail_writes: Option<ConnectionError>,
    write_delay: Option<Duration>,
    connect_delay: Option<Duration>,
}

/// Shared view of everything the memory transports did
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    inner: Arc<Mutex<Recorder>>,
}

impl MemoryLink {
    fn lock(&self) -> MutexGuard<'_, Recorder> {
        // A poisoned recorder only means a test thread panicked mid-write
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// All bytes written so far, concatenated
    pub fn written(&self) -> Vec<u8> {
        self.lock().writes.concat()
    }

    /// Individual write calls, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    pub fn disconnect_count(&self) -> usize {
        self.lock().disconnects
    }

    /// Transports currently connected
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// Transports built by the factory
    pub fn created(&self) -> usize {
        self.lock().targets.len()
    }

    /// Targets the factory was asked for, in order
    pub fn targets(&self) -> Vec<PrinterTarget> {
        self.lock().targets.clone()
    }

    /// Fail the next connect with `err`
    pub fn fail_next_connect(&self, err: ConnectionError) {
        self.lock().fail_next_connect = Some(err);
    }

    /// Fail every write with `err` until [`clear_faults`](Self::clear_faults)
    pub fn fail_writes(&self, err: ConnectionError) {
        self.lock().fail_writes = Some(err);
    }

    pub fn clear_faults(&self) {
        let mut rec = self.lock();
        rec.fail_next_connect = None;
        rec.fail_writes = None;
    }

    /// Hold every write for `delay` before recording it
    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = Some(delay);
    }

    /// Hold every connect for `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.lock().connect_delay = Some(delay);
    }

    /// Forget recorded bytes
    pub fn clear(&self) {
        self.lock().writes.clear();
    }
}

/// Transport writing into a [`MemoryLink`]
pub struct MemoryTransport {
    link: MemoryLink,
    label: String,
    connected: bool,
}

impl MemoryTransport {
    pub fn new(link: MemoryLink, label: impl Into<String>) -> Self {
        Self {
            link,
            label: label.into(),
            connected: false,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        let delay = self.link.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut rec = self.link.lock();
        if let Some(err) = rec.fail_next_connect.take() {
            return Err(err);
        }
        rec.connects += 1;
        if !self.connected {
            rec.open_handles += 1;
        }
        self.connected = true;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        if !self.connected {
            return Err(ConnectionError::DeviceUnavailable(
                "memory transport is closed".to_string(),
            ));
        }

        let delay = self.link.lock().write_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut rec = self.link.lock();
        if let Some(err) = &rec.fail_writes {
            return Err(err.clone());
        }
        rec.writes.push(bytes.to_vec());
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.connected {
            let mut rec = self.link.lock();
            rec.disconnects += 1;
            rec.open_handles = rec.open_handles.saturating_sub(1);
            self.connected = false;
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn describe(&self) -> String {
        format!("memory://{}", self.label)
    }
}

/// Factory handing out [`MemoryTransport`]s that share one link
#[derive(Debug, Clone, Default)]
pub struct MemoryTransportFactory {
    link: MemoryLink,
}

impl MemoryTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn link(&self) -> MemoryLink {
        self.link.clone()
    }
}

impl TransportFactory for MemoryTransportFactory {
    fn create(&self, target: &PrinterTarget) -> Box<dyn Transport> {
        self.link.lock().targets.push(target.clone());
        Box::new(MemoryTransport::new(self.link.clone(), target.to_string()))
    }
}
