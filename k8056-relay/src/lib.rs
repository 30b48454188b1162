//! Driver for Velleman K8056 relay cards.
//!
//! K8056 cards hang off a shared serial line and take fixed five-byte
//! commands. They never answer, so the [`driver`] serializes access to the
//! line, repeats every frame a configurable number of times, and bounds each
//! exchange with a timeout.

pub mod config;
pub mod driver;
pub mod error;
pub mod frame;
pub mod tracing;
pub mod transport;

pub use driver::{BusDriver, Driver, DriverConfig};
pub use error::{Error, Result};
