//! Tracing subscriber setup for binaries and demos
//!
//! The library only emits `tracing` events; it never installs a subscriber
//! on its own. `RUST_LOG` overrides the default filter.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::{Error, Result};

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "modelsmith=info";

/// Install a global fmt subscriber; a no-op if one is already installed.
pub fn init() {
    let _ = try_init();
}

/// Install a global fmt subscriber.
///
/// # Errors
///
/// Returns [`Error::Other`] if a global subscriber is already set.
pub fn try_init() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .map_err(|e| Error::Other(format!("failed to install tracing subscriber: {e}")))
}
