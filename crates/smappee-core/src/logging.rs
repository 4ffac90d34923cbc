//! Logging setup for binaries embedding the client.

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable consulted before `RUST_LOG`.
pub const LOG_ENV: &str = "SMAPPEE_LOG";

/// Install a global compact `tracing` subscriber.
///
/// The filter comes from `SMAPPEE_LOG`, then `RUST_LOG`, then `default_filter`
/// (for example `"smappee_core=info"`).
pub fn init_logging(default_filter: &str) -> Result<()> {
    tracing_subscriber::registry()
        .with(filter_from_env(default_filter)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .compact(),
        )
        .try_init()?;
    Ok(())
}

fn filter_from_env(default_filter: &str) -> Result<EnvFilter> {
    if let Ok(directives) = std::env::var(LOG_ENV) {
        return Ok(EnvFilter::try_new(directives)?);
    }
    Ok(EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default_filter))?)
}
