//! Bus driver for a chain of K8056 relay cards.
//!
//! All cards share one half-duplex line and never acknowledge anything, so
//! the driver has two jobs: keep frames from different callers from
//! interleaving on the wire, and send every frame a configurable number of
//! extra times in the hope that at least one copy arrives intact.
//!
//! Each command runs as its own bus session. The session lock is taken, the
//! channel opened, the frame written `repeat + 1` times with a pause after
//! each write, and the channel closed again. The whole session is bounded by
//! a global timeout; the channel is closed and the lock released on every
//! exit path.

use bytes::BytesMut;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;
use tokio_util::codec::Encoder;

use crate::error::{Error, Result};
use crate::frame::{Frame, FrameCodec, Relay};
use crate::tracing::prelude::*;
use crate::transport::Transport;

/// Upper bound on one open/transmit/close session.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Timing parameters fixed for the lifetime of a driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriverConfig {
    /// Extra copies sent after the first
    pub repeat: u32,
    /// Pause after every copy, including the last
    pub wait: Duration,
    /// Bound on a whole bus session
    pub timeout: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            repeat: 0,
            wait: Duration::ZERO,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl DriverConfig {
    /// Time a burst spends writing and waiting, ignoring I/O latency.
    pub fn burst_duration(&self) -> Option<Duration> {
        self.wait.checked_mul(self.repeat.checked_add(1)?)
    }
}

/// Driver owning the bus transport.
///
/// The transport lives inside the session lock, so nothing can reach the
/// channel without holding it. Share the driver between tasks with an `Arc`.
pub struct Driver<T> {
    transport: Mutex<T>,
    config: DriverConfig,
}

/// Driver over a transport chosen at runtime.
pub type BusDriver = Driver<Box<dyn Transport>>;

impl<T: Transport> Driver<T> {
    pub fn new(transport: T, config: DriverConfig) -> Self {
        match config.burst_duration() {
            Some(burst) if burst < config.timeout => {}
            _ => warn!(
                repeat = config.repeat,
                wait = ?config.wait,
                timeout = ?config.timeout,
                "Repeat burst does not fit in the session timeout; every command will time out."
            ),
        }

        Self {
            transport: Mutex::new(transport),
            config,
        }
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Switch on `relay` (9 for all) of `card`.
    pub async fn activate(&self, card: u32, relay: u32) -> Result<()> {
        info!(card, relay, "Switching relay on.");
        let relay = Relay::new(relay)?;
        self.process(Frame::set(card, relay)).await
    }

    /// Switch off `relay` (9 for all) of `card`.
    pub async fn deactivate(&self, card: u32, relay: u32) -> Result<()> {
        info!(card, relay, "Switching relay off.");
        let relay = Relay::new(relay)?;
        self.process(Frame::clear(card, relay)).await
    }

    /// Clear all relays with a single emergency frame.
    ///
    /// The frame is addressed to card 1. Whether other cards on the chain
    /// react to it depends on the card firmware.
    pub async fn emergency_stop(&self) -> Result<()> {
        warn!("Emergency stop.");
        self.process(Frame::emergency_clear()).await
    }

    async fn process(&self, frame: Frame) -> Result<()> {
        let mut data = BytesMut::new();
        FrameCodec.encode(frame, &mut data)?;

        let mut transport = self.transport.lock().await;
        trace!(opcode = %frame.opcode, card = frame.card, "Bus session started.");

        let session = self.session(&mut *transport, &data);
        let outcome = time::timeout(self.config.timeout, session).await;
        match outcome {
            Ok(result) => {
                if let Err(e) = &result {
                    error!(
                        opcode = %frame.opcode,
                        card = frame.card,
                        error = %e,
                        "Bus session failed."
                    );
                }
                result
            }
            Err(_) => {
                error!(
                    opcode = %frame.opcode,
                    card = frame.card,
                    timeout = ?self.config.timeout,
                    "Bus session timed out."
                );
                self.close_after_timeout(&mut *transport).await;
                Err(Error::Timeout(self.config.timeout))
            }
        }
    }

    // The close gets its own bound so a stuck transport cannot hold the
    // session lock past it.
    async fn close_after_timeout(&self, transport: &mut T) {
        match time::timeout(self.config.timeout, transport.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Failed to close channel after timeout."),
            Err(_) => warn!(
                timeout = ?self.config.timeout,
                "Channel close did not finish after timeout; giving up on it."
            ),
        }
    }

    // Open, burst, close. A send error takes precedence over a close error.
    async fn session(&self, transport: &mut T, data: &[u8]) -> Result<()> {
        let sent = self.burst(transport, data).await;
        let closed = transport.close().await;
        sent.and(closed)
    }

    async fn burst(&self, transport: &mut T, data: &[u8]) -> Result<()> {
        transport.open().await?;

        for _ in 0..=self.config.repeat {
            debug!("Sending {}", hex::encode(data));
            transport.write(data).await?;
            time::sleep(self.config.wait).await;
        }

        Ok(())
    }
}
