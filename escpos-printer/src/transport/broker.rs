//! Device access handshake
//!
//! Radio and USB printers only become usable after the host grants access
//! (pairing plus an RFCOMM binding, or a usblp node the process may write).
//! The broker turns that into a single request/response call.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::PrinterTarget;
use crate::error::ConnectionError;

/// Access was granted; the device node to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub device_path: PathBuf,
}

/// Access was not granted
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessDenied {
    /// The host refused (not paired, no permission)
    #[error("Access refused: {0}")]
    Refused(String),

    /// No device matches the target
    #[error("Device not found: {0}")]
    NotFound(String),
}

impl From<AccessDenied> for ConnectionError {
    fn from(e: AccessDenied) -> Self {
        match e {
            AccessDenied::Refused(reason) => Self::PermissionDenied(reason),
            AccessDenied::NotFound(reason) => Self::DeviceUnavailable(reason),
        }
    }
}

/// Asks the host for access to a device
#[async_trait]
pub trait AccessBroker: Send + Sync {
    async fn request_access(&self, target: &PrinterTarget) -> Result<AccessGrant, AccessDenied>;
}

/// Linux broker backed by device nodes
///
/// - Radio: the `/dev/rfcommN` node bound to the MAC in `/proc/net/rfcomm`
///   (`rfcomm bind` must have been run after pairing).
/// - USB: the `/dev/usb/lpN` node whose parent device in
///   `/sys/class/usbmisc/lpN` carries the vendor/product id.
///
/// A node the process cannot open for writing is refused.
#[derive(Debug, Clone)]
pub struct DeviceNodeBroker {
    rfcomm_table: PathBuf,
    rfcomm_dev_dir: PathBuf,
    usb_class_dir: PathBuf,
    usb_dev_dir: PathBuf,
}

impl Default for DeviceNodeBroker {
    fn default() -> Self {
        Self {
            rfcomm_table: PathBuf::from("/proc/net/rfcomm"),
            rfcomm_dev_dir: PathBuf::from("/dev"),
            usb_class_dir: PathBuf::from("/sys/class/usbmisc"),
            usb_dev_dir: PathBuf::from("/dev/usb"),
        }
    }
}

impl DeviceNodeBroker {
    /// Use alternative system roots
    pub fn with_roots(
        rfcomm_table: impl Into<PathBuf>,
        rfcomm_dev_dir: impl Into<PathBuf>,
        usb_class_dir: impl Into<PathBuf>,
        usb_dev_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            rfcomm_table: rfcomm_table.into(),
            rfcomm_dev_dir: rfcomm_dev_dir.into(),
            usb_class_dir: usb_class_dir.into(),
            usb_dev_dir: usb_dev_dir.into(),
        }
    }

    /// Find the RFCOMM node bound to `address`
    ///
    /// Table format: `rfcomm0: XX:XX:XX:XX:XX:XX channel N ...`
    async fn find_rfcomm(&self, address: &str) -> Result<PathBuf, AccessDenied> {
        let contents = tokio::fs::read_to_string(&self.rfcomm_table)
            .await
            .map_err(|e| {
                AccessDenied::Refused(format!(
                    "cannot read {}: {}",
                    self.rfcomm_table.display(),
                    e
                ))
            })?;

        let address = address.to_uppercase();
        contents
            .lines()
            .filter(|line| line.to_uppercase().contains(&address))
            .filter_map(|line| line.split(':').next())
            .map(|name| self.rfcomm_dev_dir.join(name.trim()))
            .next()
            .ok_or_else(|| {
                AccessDenied::Refused(format!(
                    "{} is not bound to an RFCOMM device (pair it and run `rfcomm bind`)",
                    address
                ))
            })
    }

    /// Find the usblp node whose USB device has the given ids
    async fn find_usblp(&self, vendor_id: u16, product_id: u16) -> Result<PathBuf, AccessDenied> {
        let mut entries = tokio::fs::read_dir(&self.usb_class_dir).await.map_err(|e| {
            AccessDenied::NotFound(format!(
                "cannot list {}: {}",
                self.usb_class_dir.display(),
                e
            ))
        })?;

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            if !name.starts_with("lp") {
                continue;
            }
            let usb_device = entry.path().join("device").join("..");
            let vendor = read_hex_id(&usb_device.join("idVendor")).await;
            let product = read_hex_id(&usb_device.join("idProduct")).await;
            debug!(node = name, ?vendor, ?product, "Inspecting usblp node");
            if vendor == Some(vendor_id) && product == Some(product_id) {
                return Ok(self.usb_dev_dir.join(name));
            }
        }

        Err(AccessDenied::NotFound(format!(
            "no usblp device with id {:04x}:{:04x}",
            vendor_id, product_id
        )))
    }
}

async fn read_hex_id(path: &Path) -> Option<u16> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    u16::from_str_radix(raw.trim(), 16).ok()
}

/// Refuse nodes this process cannot write
async fn check_writable(path: &Path) -> Result<(), AccessDenied> {
    match tokio::fs::OpenOptions::new().write(true).open(path).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => Err(AccessDenied::Refused(
            format!("no write permission on {}", path.display()),
        )),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(AccessDenied::NotFound(
            format!("{} does not exist", path.display()),
        )),
        Err(e) => Err(AccessDenied::Refused(format!(
            "cannot open {}: {}",
            path.display(),
            e
        ))),
    }
}

#[async_trait]
impl AccessBroker for DeviceNodeBroker {
    #[instrument(skip(self), fields(printer = %target))]
    async fn request_access(&self, target: &PrinterTarget) -> Result<AccessGrant, AccessDenied> {
        let device_path = match target {
            PrinterTarget::Radio { address } => self.find_rfcomm(address).await?,
            PrinterTarget::Usb {
                vendor_id,
                product_id,
            } => self.find_usblp(*vendor_id, *product_id).await?,
            PrinterTarget::Network { .. } => {
                return Err(AccessDenied::Refused(
                    "network printers need no device access".to_string(),
                ));
            }
        };

        check_writable(&device_path).await?;
        debug!(path = %device_path.display(), "Device access granted");
        Ok(AccessGrant { device_path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "escpos-broker-{}-{}",
            name,
            uuid::Uuid::new_v4()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_radio_grant_from_rfcomm_table() {
        let root = scratch_dir("radio");
        let table = root.join("rfcomm");
        std::fs::write(
            &table,
            "rfcomm0: 00:11:22:33:44:55 channel 1 clean\nrfcomm1: 86:67:7A:B9:31:2C channel 1 connected\n",
        )
        .unwrap();
        std::fs::write(root.join("rfcomm1"), b"").unwrap();

        let broker = DeviceNodeBroker::with_roots(&table, &root, root.join("none"), &root);
        let grant = broker
            .request_access(&PrinterTarget::Radio {
                address: "86:67:7a:b9:31:2c".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(grant.device_path, root.join("rfcomm1"));

        let denied = broker
            .request_access(&PrinterTarget::Radio {
                address: "AA:BB:CC:DD:EE:FF".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(denied, AccessDenied::Refused(_)));
        assert!(matches!(
            ConnectionError::from(denied),
            ConnectionError::PermissionDenied(_)
        ));

        std::fs::remove_dir_all(&root).ok();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_usb_grant_from_sysfs() {
        let root = scratch_dir("usb");
        let class_dir = root.join("usbmisc");
        let dev_dir = root.join("dev");
        let usb_device = root.join("devices").join("1-1");
        let interface = usb_device.join("1-1:1.0");
        std::fs::create_dir_all(&interface).unwrap();
        std::fs::create_dir_all(class_dir.join("lp0")).unwrap();
        std::fs::create_dir_all(&dev_dir).unwrap();
        std::fs::write(usb_device.join("idVendor"), "0416\n").unwrap();
        std::fs::write(usb_device.join("idProduct"), "5011\n").unwrap();
        std::os::unix::fs::symlink(&interface, class_dir.join("lp0").join("device")).unwrap();
        std::fs::write(dev_dir.join("lp0"), b"").unwrap();

        let broker = DeviceNodeBroker::with_roots(root.join("none"), &root, &class_dir, &dev_dir);
        let grant = broker
            .request_access(&PrinterTarget::Usb {
                vendor_id: 0x0416,
                product_id: 0x5011,
            })
            .await
            .unwrap();
        assert_eq!(grant.device_path, dev_dir.join("lp0"));

        let missing = broker
            .request_access(&PrinterTarget::Usb {
                vendor_id: 0x04b8,
                product_id: 0x0202,
            })
            .await
            .unwrap_err();
        assert!(matches!(missing, AccessDenied::NotFound(_)));

        std::fs::remove_dir_all(&root).ok();
    }
}
