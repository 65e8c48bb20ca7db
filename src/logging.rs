//! Tracing setup.
//!
//! `RUST_LOG` takes precedence over the configured level:
//!
//! ```bash
//! RUST_LOG=spectral_mapper=trace spectral-mapper scan
//! ```

use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

use crate::config::MapperConfig;

/// Install a global fmt subscriber logging this crate at `level` and everything
/// else at `warn`.
pub fn init(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("spectral_mapper={level},warn")))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install tracing subscriber: {e}"))
}

/// [`init`] with the level from `config.application.log_level`.
pub fn init_from_config(config: &MapperConfig) -> Result<()> {
    init(&config.application.log_level)
}
