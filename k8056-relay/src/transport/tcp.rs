//! Serial-over-TCP bridge transport.
//!
//! Many installations put the bus behind a network serial server that
//! forwards raw bytes from a TCP socket to the RS-232 line. Line settings
//! live on the bridge, so only the timeout from [`PortSettings`] applies
//! here.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time;

use super::{not_open, timed_out, write_bounded, PortSettings, Transport};
use crate::error::Result;
use crate::tracing::prelude::*;

pub struct TcpTransport {
    host: String,
    port: u16,
    settings: PortSettings,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    pub fn new(host: impl Into<String>, port: u16, settings: PortSettings) -> Self {
        Self {
            host: host.into(),
            port,
            settings,
            stream: None,
        }
    }

    fn describe(&self, what: &str) -> String {
        format!("{} {}:{}", what, self.host, self.port)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn open(&mut self) -> Result<()> {
        self.stream = None;

        let addr = (self.host.as_str(), self.port);
        let stream = time::timeout(self.settings.timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| timed_out(&self.describe("connect to")))??;

        if let Err(e) = stream.set_nodelay(true) {
            debug!("TCP_NODELAY: {}", e);
        }

        trace!(host = %self.host, port = self.port, "Bridge connected.");
        self.stream = Some(stream);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let what = self.describe("write to");
        let stream = self.stream.as_mut().ok_or_else(not_open)?;
        write_bounded(stream, data, self.settings.timeout, &what).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            let shutdown = time::timeout(self.settings.timeout, stream.shutdown()).await;
            trace!(host = %self.host, port = self.port, "Bridge disconnected.");
            match shutdown {
                Ok(result) => result?,
                Err(_) => return Err(timed_out(&self.describe("shutdown of")).into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_frames_reach_bridge() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let bridge = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            socket.read_to_end(&mut received).await.unwrap();
            received
        });

        let mut transport = TcpTransport::new("127.0.0.1", port, PortSettings::default());
        transport.open().await.unwrap();
        transport.write(&[13, 3, 83, 53, 104]).await.unwrap();
        transport.write(&[13, 3, 83, 53, 104]).await.unwrap();
        transport.close().await.unwrap();

        // read_to_end only returns once close() shut the socket down
        let received = bridge.await.unwrap();
        assert_eq!(received, [13, 3, 83, 53, 104, 13, 3, 83, 53, 104]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let settings = PortSettings {
            timeout: Duration::from_millis(500),
            ..PortSettings::default()
        };
        let mut transport = TcpTransport::new("127.0.0.1", port, settings);
        assert!(matches!(transport.open().await, Err(Error::Channel(_))));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_write_before_open() {
        let mut transport = TcpTransport::new("127.0.0.1", 1, PortSettings::default());
        assert!(matches!(
            transport.write(&[0]).await,
            Err(Error::Channel(e)) if e.kind() == std::io::ErrorKind::NotConnected
        ));
    }
}
