//! Configuration System using Figment
//!
//! Configuration is loaded from:
//! 1. `config/mapper.toml` (base configuration)
//! 2. Environment variables prefixed with `SPECTRAL_MAPPER_`, using `__` between
//!    nested keys
//!
//! Every section has defaults, so a missing file yields a usable 2x2 scan at
//! 500 ms exposure and 3000 ms integration.
//!
//! # Environment Variable Overrides
//!
//! ```text
//! SPECTRAL_MAPPER_APPLICATION__LOG_LEVEL=debug
//! SPECTRAL_MAPPER_GRID__WIDTH=20
//! SPECTRAL_MAPPER_TIMING__INTEGRATION_TIME_MS=5000
//! ```
//!
//! # Example
//!
//! ```no_run
//! use spectral_mapper::config::MapperConfig;
//!
//! let config = MapperConfig::load()?;
//! println!("Grid: {}x{}", config.grid.width, config.grid.height);
//! # Ok::<(), spectral_mapper::config::ConfigError>(())
//! ```

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::acquisition::{ShortIntegrationPolicy, TimingSpec};
use crate::measurement::DEFAULT_BACKGROUND_TITLE;
use crate::scan::{GridSpec, ScanOptions};

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/mapper.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "SPECTRAL_MAPPER_";

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    /// File or environment could not be parsed
    #[error("Configuration load error: {0}")]
    LoadError(#[from] figment::Error),
    /// Values parsed but are not usable
    #[error("Configuration validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Raster geometry
    pub grid: GridSpec,
    /// Exposure and integration times
    pub timing: TimingSpec,
    /// Acquisition behaviour
    pub acquisition: AcquisitionConfig,
    /// Simulated hardware used by the CLI
    pub simulation: SimulationConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Spectral Mapper".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Acquisition behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// What to do when integration is shorter than one exposure
    pub short_integration: ShortIntegrationPolicy,
    /// Title stored with acquired backgrounds
    pub background_title: String,
    /// Source name attached to published events
    pub source_name: String,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            short_integration: ShortIntegrationPolicy::Reject,
            background_title: DEFAULT_BACKGROUND_TITLE.to_string(),
            source_name: "spectral_mapper".to_string(),
        }
    }
}

/// Simulated hardware parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Usable detector pixels
    pub pixels: usize,
    /// X travel limit in micrometres
    pub x_max: f64,
    /// Y travel limit in micrometres
    pub y_max: f64,
    /// Delay per stage move in milliseconds
    pub move_delay_ms: u64,
    /// Uniform noise amplitude added to every pixel
    pub noise: f64,
    /// Sleep for the exposure duration on every capture
    pub realtime: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            pixels: 512,
            x_max: 25_000.0,
            y_max: 25_000.0,
            move_delay_ms: 0,
            noise: 0.0,
            realtime: false,
        }
    }
}

impl MapperConfig {
    /// Load from [`DEFAULT_CONFIG_PATH`] and the environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from a specific file path and the environment, then validate.
    ///
    /// A missing file is not an error; defaults and environment overrides apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::LoadError)?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    ///
    /// Checks:
    /// - Log level is valid (trace, debug, info, warn, error)
    /// - Grid dimensions and step are positive
    /// - Timing is positive with integration no shorter than exposure, unless the
    ///   single-exposure policy is selected
    /// - The simulated detector has at least one pixel
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.grid
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        self.timing
            .validate_for(self.acquisition.short_integration)
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        if self.simulation.pixels == 0 {
            return Err(ConfigError::ValidationError(
                "simulation.pixels must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Controller options described by this configuration.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            grid: self.grid,
            timing: self.timing,
            short_integration: self.acquisition.short_integration,
            source: self.acquisition.source_name.clone(),
            background_title: self.acquisition.background_title.clone(),
        }
    }
}
