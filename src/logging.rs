//! Tracing setup for the plugin process.
//!
//! Verbosity is controlled by `LOG_LEVEL`, the only environment variable
//! the core reads per the protocol spec; everything else is left to the
//! host process's own configuration.

use tracing_subscriber::EnvFilter;

pub fn init() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
