//! Network printer (TCP port 9100)
//!
//! Most thermal printers accept raw ESC/POS on port 9100.

use std::future::Future;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::{debug, info, instrument};

use super::Transport;
use crate::error::ConnectionError;

pub struct NetworkTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(host: &str, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port,
            connect_timeout,
            stream: None,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    fn stream(&mut self) -> Result<&mut TcpStream, ConnectionError> {
        let endpoint = self.endpoint();
        self.stream
            .as_mut()
            .ok_or_else(|| ConnectionError::DeviceUnavailable(format!("{} is not connected", endpoint)))
    }
}

/// Await `dial`, giving up after `limit`
async fn connect_within<F>(
    endpoint: &str,
    limit: Duration,
    dial: F,
) -> Result<TcpStream, ConnectionError>
where
    F: Future<Output = io::Result<TcpStream>>,
{
    match tokio::time::timeout(limit, dial).await {
        Ok(stream) => Ok(stream?),
        Err(_) => Err(ConnectionError::Timeout(format!(
            "connect to {} took longer than {:?}",
            endpoint, limit
        ))),
    }
}

#[async_trait]
impl Transport for NetworkTransport {
    #[instrument(skip(self), fields(endpoint = %self.endpoint()))]
    async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.stream.is_some() {
            return Ok(());
        }

        info!("Connecting to printer");
        let stream = connect_within(
            &self.endpoint(),
            self.connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await?;

        // ESC/POS commands are small; don't let them sit in Nagle's buffer
        stream.set_nodelay(true)?;
        self.stream = Some(stream);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), ConnectionError> {
        let stream = self.stream()?;
        stream.write_all(bytes).await?;
        debug!(len = bytes.len(), "Sent to printer");
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        let stream = self.stream()?;
        stream.flush().await?;
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut stream) = self.stream.take()
            && let Err(e) = stream.shutdown().await
        {
            debug!(error = %e, "Socket shutdown failed");
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.endpoint())
    }
}
