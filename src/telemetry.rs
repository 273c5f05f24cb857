//! Logging setup.
//!
//! The library only emits `tracing` events; binaries install a subscriber
//! through [`init`].

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingSettings};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured filter. Calling this twice returns an
/// error from the second call instead of panicking.
pub fn init(settings: &LoggingSettings) -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.filter));

    let registry = tracing_subscriber::registry().with(filter);
    match settings.format {
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init(),
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init(),
    }
}
