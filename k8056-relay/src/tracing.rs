//! Provide tracing, tailored to this program.
//!
//! Binaries call [`init`] once at startup to install a tracing subscriber.
//! The rest of the crate can include `use crate::tracing::prelude::*` for
//! convenient access to the `trace!()`, `debug!()`, `info!()`, `warn!()`, and
//! `error!()` macros.

use std::env;
use std::str::FromStr;
use time::OffsetDateTime;
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{format::Writer, time::FormatTime},
    prelude::*,
};

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Initialize logging.
///
/// Under systemd, events go to journald; otherwise to stdout, filtered by
/// RUST_LOG with `default_level` (e.g. "info") applied when RUST_LOG does
/// not say otherwise.
pub fn init(default_level: &str) {
    let level = parse_level(default_level);

    if env::var("JOURNAL_STREAM").is_ok() {
        match tracing_journald::layer() {
            Ok(layer) => {
                tracing_subscriber::registry()
                    .with(level.unwrap_or(LevelFilter::INFO))
                    .with(layer)
                    .init();
            }
            Err(e) => {
                use_stdout(level.unwrap_or(LevelFilter::INFO));
                error!("Failed to initialize journald logging ({e}), using stdout.");
            }
        }
    } else {
        use_stdout(level.unwrap_or(LevelFilter::INFO));
    }

    if level.is_none() {
        warn!("Unknown log level '{}', using info.", default_level);
    }
}

fn parse_level(level: &str) -> Option<LevelFilter> {
    LevelFilter::from_str(level).ok()
}

fn use_stdout(level: LevelFilter) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_timer(LocalTimer))
        .init();
}

// Timestamps in local time to the nearest second. Frames go out a few hundred
// milliseconds apart, which the debug output shows well enough.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or(OffsetDateTime::now_utc());
        let stamp = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| std::fmt::Error)?;
        write!(w, "{}", stamp)
    }
}
