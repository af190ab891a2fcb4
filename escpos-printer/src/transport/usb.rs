//! USB printer class device
//!
//! The kernel usblp driver exposes the printer as a character device; the
//! broker finds the node matching vendor/product id and checks write access.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use super::{AccessBroker, Transport};
use crate::config::PrinterTarget;
use crate::error::ConnectionError;

pub struct UsbTransport {
    vendor_id: u16,
    product_id: u16,
    broker: Arc<dyn AccessBroker>,
    file: Option<File>,
}

impl UsbTransport {
    pub fn new(vendor_id: u16, product_id: u16, broker: Arc<dyn AccessBroker>) -> Self {
        Self {
            vendor_id,
            product_id,
            broker,
            file: None,
        }
    }

    fn target(&self) -> PrinterTarget {
        PrinterTarget::Usb {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }
    }

    async fn grant(&self) -> Result<PathBuf, ConnectionError> {
        Ok(self.broker.request_access(&self.target()).await?.device_path)
    }

    fn file(&mut self) -> Result<&mut File, ConnectionError> {
        let describe = self.describe();
        self.file
            .as_mut()
            .ok_or_else(|| ConnectionError::DeviceUnavailable(format!("{} is not connected", describe)))
    }
}

async fn open_node(path: &Path) -> std::io::Result<File> {
    tokio::fs::OpenOptions::new().write(true).open(path).await
}

#[async_trait]
impl Transport for UsbTransport {
    #[instrument(skip(self), fields(device = %self.describe()))]
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.file.is_some() {
            return Ok(());
        }

        let path = self.grant().await?;
        let file = match open_node(&path).await {
            Ok(file) => file,
            // Node renumbered between grant and open (replug); ask once more
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %path.display(), "USB node vanished, requesting access again");
                let path = self.grant().await?;
                open_node(&path).await?
            }
            Err(e) => return Err(e.into()),
        };

        info!(path = %path.display(), "USB printer opened");
        self.file = Some(file);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let file = self.file()?;
        file.write_all(bytes).await?;
        debug!(len = bytes.len(), "Sent to USB printer");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        let file = self.file()?;
        file.flush().await?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut file) = self.file.take()
            && let Err(e) = file.flush().await
        {
            debug!(error = %e, "USB flush on close failed");
        }
    }

    fn is_connected(&self) -> bool {
        self.file.is_some()
    }

    fn describe(&self) -> String {
        format!("usb://{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{AccessDenied, AccessGrant};
    use std::sync::Mutex;

    /// Hands out paths from a list, one per request
    struct Scripted {
        paths: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl AccessBroker for Scripted {
        async fn request_access(
            &self,
            _target: &PrinterTarget,
        ) -> Result<AccessGrant, AccessDenied> {
            let mut paths = self.paths.lock().unwrap();
            if paths.is_empty() {
                return Err(AccessDenied::NotFound("unplugged".to_string()));
            }
            Ok(AccessGrant {
                device_path: paths.remove(0),
            })
        }
    }

    fn scratch_file(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("escpos-usb-{}-{}", name, uuid::Uuid::new_v4()));
        std::fs::write(&path, b"").unwrap();
        path
    }

    #[tokio::test]
    async fn test_regrant_after_vanished_node() {
        let live = scratch_file("lp1");
        let broker = Scripted {
            paths: Mutex::new(vec![PathBuf::from("/nonexistent/usb/lp0"), live.clone()]),
        };
        let mut t = UsbTransport::new(0x0416, 0x5011, Arc::new(broker));

        t.connect().await.unwrap();
        t.write(&[0x1B, 0x40]).await.unwrap();
        t.flush().await.unwrap();
        t.disconnect().await;
        assert!(!t.is_connected());

        assert_eq!(std::fs::read(&live).unwrap(), vec![0x1B, 0x40]);
        std::fs::remove_file(&live).ok();
    }

    #[tokio::test]
    async fn test_no_device() {
        let broker = Scripted {
            paths: Mutex::new(Vec::new()),
        };
        let mut t = UsbTransport::new(0x0416, 0x5011, Arc::new(broker));
        assert!(matches!(
            t.connect().await,
            Err(ConnectionError::DeviceUnavailable(_))
        ));
    }
}
