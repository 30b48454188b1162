//! Local serial port transport.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::time;
use tokio_serial::{DataBits, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use super::{not_open, timed_out, write_bounded, PortSettings, Transport};
use crate::error::Result;
use crate::tracing::prelude::*;

/// Serial device opened fresh for every bus session.
pub struct SerialTransport {
    path: String,
    settings: PortSettings,
    port: Option<SerialStream>,
}

impl SerialTransport {
    pub fn new(path: impl Into<String>, settings: PortSettings) -> Self {
        Self {
            path: path.into(),
            settings,
            port: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&mut self) -> Result<()> {
        // Drop any previous handle first so the device is not held twice.
        self.port = None;

        let port = tokio_serial::new(&self.path, self.settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(self.settings.timeout)
            .open_native_async()?;

        trace!(
            path = %self.path,
            baud = self.settings.baud_rate,
            "Serial port opened."
        );
        self.port = Some(port);
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port.as_mut().ok_or_else(not_open)?;
        let what = format!("write to {}", self.path);
        write_bounded(port, data, self.settings.timeout, &what).await?;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut port) = self.port.take() {
            // Make sure everything queued reaches the line before the
            // descriptor goes away.
            let flushed = time::timeout(self.settings.timeout, port.flush()).await;
            drop(port);
            trace!(path = %self.path, "Serial port closed.");
            match flushed {
                Ok(result) => result?,
                Err(_) => return Err(timed_out(&format!("flush of {}", self.path)).into()),
            }
        }
        Ok(())
    }
}
