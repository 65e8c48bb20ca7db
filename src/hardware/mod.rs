//! Hardware collaborator interfaces.
//!
//! The mapper never talks to a motor controller or spectrometer directly. It drives
//! them through the narrow capability traits below, so real drivers, simulators and
//! test doubles are interchangeable.
//!
//! - [`Stage`]: XY positioning with travel limits and a raster position generator
//! - [`Detector`]: spectrum capture with a configurable integration time
//! - [`Spectrometer`]: raw driver view; wrap it in [`TrimmedSpectrometer`] to get a
//!   [`Detector`]
//!
//! All traits are `Send + Sync` so a single device can be shared between the scan
//! task and whoever issues interrupts.

pub mod mock;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::scan::grid::{raster_positions, ScanDirection};

/// Leading spectrometer pixels that carry calibration artifacts rather than signal.
pub const CALIBRATION_PIXELS: usize = 2;

/// Absolute stage coordinate in native stage units (micrometres).
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePosition {
    /// X coordinate
    pub x: f64,
    /// Y coordinate
    pub y: f64,
}

impl StagePosition {
    /// Create a position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Column/row index of a raster cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridIndex {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
}

/// One entry of a raster: which cell, and where the stage has to be for it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapPosition {
    /// Grid cell
    pub index: GridIndex,
    /// Stage target for that cell
    pub position: StagePosition,
}

/// Maximum reachable coordinate on each axis.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TravelLimits {
    /// Maximum X coordinate
    pub x_max: f64,
    /// Maximum Y coordinate
    pub y_max: f64,
}

/// Motorized XY stage.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Current absolute position.
    async fn position(&self) -> Result<StagePosition>;

    /// Move to an absolute position, returning once the move is complete.
    async fn move_to(&self, position: StagePosition) -> Result<()>;

    /// Travel limits of the stage.
    fn travel_limits(&self) -> TravelLimits;

    /// Ordered targets for a `width` x `height` raster starting at the current position.
    ///
    /// One entry per cell, in visiting order. The default lays cells out row by row,
    /// reversing every other row for [`ScanDirection::Zigzag`].
    async fn map_positions(
        &self,
        width: u32,
        height: u32,
        step_distance: f64,
        direction: ScanDirection,
    ) -> Result<Vec<MapPosition>> {
        let origin = self.position().await?;
        Ok(raster_positions(
            origin,
            width,
            height,
            step_distance,
            direction,
        ))
    }
}

/// Spectrum detector as seen by the acquisition engine.
///
/// Spectra returned here are already stripped of calibration pixels.
#[async_trait]
pub trait Detector: Send + Sync {
    /// Set the duration of the next exposures.
    async fn set_integration_time_micros(&self, micros: u64) -> Result<()>;

    /// Capture one exposure and return its intensities.
    async fn intensities(&self) -> Result<Vec<f64>>;

    /// Wavelength axis matching [`Detector::intensities`].
    async fn wavelengths(&self) -> Result<Vec<f64>>;
}

/// Raw spectrometer driver, including calibration pixels.
#[async_trait]
pub trait Spectrometer: Send + Sync {
    /// Set the exposure duration.
    async fn set_integration_time_micros(&self, micros: u64) -> Result<()>;

    /// Capture one exposure, every pixel included.
    async fn raw_intensities(&self) -> Result<Vec<f64>>;

    /// Full wavelength axis, every pixel included.
    async fn raw_wavelengths(&self) -> Result<Vec<f64>>;
}

/// Adapts a [`Spectrometer`] into a [`Detector`] by dropping calibration pixels.
#[derive(Debug)]
pub struct TrimmedSpectrometer<S> {
    inner: S,
}

impl<S: Spectrometer> TrimmedSpectrometer<S> {
    /// Wrap a raw driver.
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// Access the wrapped driver.
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn trim(mut values: Vec<f64>) -> Vec<f64> {
    let skip = CALIBRATION_PIXELS.min(values.len());
    values.drain(..skip);
    values
}

#[async_trait]
impl<S: Spectrometer> Detector for TrimmedSpectrometer<S> {
    async fn set_integration_time_micros(&self, micros: u64) -> Result<()> {
        self.inner.set_integration_time_micros(micros).await
    }

    async fn intensities(&self) -> Result<Vec<f64>> {
        Ok(trim(self.inner.raw_intensities().await?))
    }

    async fn wavelengths(&self) -> Result<Vec<f64>> {
        Ok(trim(self.inner.raw_wavelengths().await?))
    }
}
