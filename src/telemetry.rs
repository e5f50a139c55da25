//! Process-wide tracing setup.
//!
//! Library code only emits `tracing` events; the binary installs a subscriber
//! once through [`init_tracing`]. `RUST_LOG` overrides the default level.

use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing::warn;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

static INIT_GUARD: OnceLock<Result<(), InitError>> = OnceLock::new();

/// Errors emitted when configuring the tracing subscriber.
#[derive(Debug, Clone, thiserror::Error)]
pub enum InitError {
    #[error("tracing has already been initialised")]
    AlreadyInitialised,
    #[error("failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Ensures tracing has been initialised for the current process.
///
/// `verbose` lowers the default level from `info` to `debug`; an explicit
/// `RUST_LOG` always wins.
pub fn init_tracing(verbose: bool) {
    let result = INIT_GUARD.get_or_init(|| match install(verbose) {
        Ok(()) => Ok(()),
        Err(InitError::AlreadyInitialised) => Ok(()),
        Err(err) => Err(err),
    });

    if let Err(err) = result {
        warn!("failed to initialise tracing subscriber: {err}");
    }
}

fn install(verbose: bool) -> Result<(), InitError> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr);

    Registry::default()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| InitError::Install(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialisation_is_harmless() {
        init_tracing(false);
        init_tracing(true);
        assert!(INIT_GUARD.get().is_some());
    }
}
