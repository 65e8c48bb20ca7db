//! Mock Hardware Implementations
//!
//! Provides simulated hardware devices for testing without physical hardware.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockStage` - Simulated XY stage with travel limits and optional motion delay
//! - `MockSpectrometer` - Simulated spectrometer whose signal scales with exposure time
//!
//! # Signal Model
//!
//! Every signal pixel of a `MockSpectrometer` reads `exposure_ms + noise`, so an
//! integrated spectrum sums to the total exposure time per pixel. Calibration pixels
//! read [`CALIBRATION_MARKER`] and are expected to be trimmed away.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{sleep, Duration};
use tracing::{debug, trace};

use super::{Spectrometer, Stage, StagePosition, TravelLimits, CALIBRATION_PIXELS};

/// Value reported by the simulated calibration pixels.
pub const CALIBRATION_MARKER: f64 = 65535.0;

// =============================================================================
// MockStage - Simulated XY Stage
// =============================================================================

/// Mock XY stage
///
/// Simulates a two-axis stage with:
/// - Fixed travel limits
/// - Optional per-move delay
/// - A log of every commanded target
///
/// # Example
///
/// ```rust,ignore
/// let stage = MockStage::new(TravelLimits { x_max: 25_000.0, y_max: 25_000.0 });
/// stage.move_to(StagePosition::new(10.0, 5.0)).await?;
/// assert_eq!(stage.position().await?, StagePosition::new(10.0, 5.0));
/// ```
#[derive(Debug)]
pub struct MockStage {
    position: Arc<RwLock<StagePosition>>,
    limits: TravelLimits,
    move_delay: Duration,
    moves: Arc<RwLock<Vec<StagePosition>>>,
}

impl MockStage {
    /// Create a stage at the origin
    pub fn new(limits: TravelLimits) -> Self {
        Self {
            position: Arc::new(RwLock::new(StagePosition::default())),
            limits,
            move_delay: Duration::ZERO,
            moves: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Start at `position` instead of the origin
    pub fn at(self, position: StagePosition) -> Self {
        Self {
            position: Arc::new(RwLock::new(position)),
            ..self
        }
    }

    /// Sleep this long on every move
    pub fn with_move_delay(mut self, delay: Duration) -> Self {
        self.move_delay = delay;
        self
    }

    /// Every target passed to `move_to`, in order
    pub async fn moves(&self) -> Vec<StagePosition> {
        self.moves.read().await.clone()
    }
}

impl Default for MockStage {
    fn default() -> Self {
        Self::new(TravelLimits {
            x_max: 25_000.0,
            y_max: 25_000.0,
        })
    }
}

#[async_trait]
impl Stage for MockStage {
    async fn position(&self) -> Result<StagePosition> {
        Ok(*self.position.read().await)
    }

    async fn move_to(&self, target: StagePosition) -> Result<()> {
        if target.x > self.limits.x_max || target.y > self.limits.y_max {
            bail!(
                "MockStage: target ({:.2}, {:.2}) outside travel limits",
                target.x,
                target.y
            );
        }

        if !self.move_delay.is_zero() {
            sleep(self.move_delay).await;
        }

        *self.position.write().await = target;
        self.moves.write().await.push(target);
        trace!(x = target.x, y = target.y, "MockStage: reached target");
        Ok(())
    }

    fn travel_limits(&self) -> TravelLimits {
        self.limits
    }
}

// =============================================================================
// MockSpectrometer - Simulated Spectrometer
// =============================================================================

/// Mock spectrometer
///
/// Simulates a raw spectrometer with:
/// - `signal_pixels` usable pixels behind [`CALIBRATION_PIXELS`] calibration pixels
/// - Intensity proportional to the configured exposure time
/// - Optional uniform noise
/// - Optional real-time exposures (sleeps for the exposure duration)
/// - Optional injected readout failure or truncated frame
/// - A history of every integration time it was given
#[derive(Debug)]
pub struct MockSpectrometer {
    signal_pixels: usize,
    integration_micros: Arc<RwLock<u64>>,
    history: Arc<RwLock<Vec<u64>>>,
    capture_count: Arc<RwLock<u32>>,
    noise: f64,
    realtime: bool,
    fail_at_capture: Option<u32>,
    short_at_capture: Option<u32>,
}

impl MockSpectrometer {
    /// Create a spectrometer with `signal_pixels` usable pixels
    pub fn new(signal_pixels: usize) -> Self {
        Self {
            signal_pixels,
            integration_micros: Arc::new(RwLock::new(100_000)),
            history: Arc::new(RwLock::new(Vec::new())),
            capture_count: Arc::new(RwLock::new(0)),
            noise: 0.0,
            realtime: false,
            fail_at_capture: None,
            short_at_capture: None,
        }
    }

    /// Add uniform noise in `[-amplitude, amplitude)` to every signal pixel
    pub fn with_noise(mut self, amplitude: f64) -> Self {
        self.noise = amplitude.abs();
        self
    }

    /// Sleep for the configured exposure on every capture
    pub fn realtime(mut self) -> Self {
        self.realtime = true;
        self
    }

    /// Fail the `capture`-th capture (1-based) with a driver error
    pub fn failing_at(mut self, capture: u32) -> Self {
        self.fail_at_capture = Some(capture);
        self
    }

    /// Drop the last pixel of the `capture`-th frame (1-based)
    pub fn short_frame_at(mut self, capture: u32) -> Self {
        self.short_at_capture = Some(capture);
        self
    }

    /// Every integration time set so far, in microseconds
    pub async fn integration_history(&self) -> Vec<u64> {
        self.history.read().await.clone()
    }

    /// Total number of captures
    pub async fn capture_count(&self) -> u32 {
        *self.capture_count.read().await
    }
}

impl Default for MockSpectrometer {
    fn default() -> Self {
        Self::new(512)
    }
}

#[async_trait]
impl Spectrometer for MockSpectrometer {
    async fn set_integration_time_micros(&self, micros: u64) -> Result<()> {
        if micros == 0 {
            bail!("MockSpectrometer: integration time must be positive");
        }
        *self.integration_micros.write().await = micros;
        self.history.write().await.push(micros);
        debug!(micros, "MockSpectrometer: integration time set");
        Ok(())
    }

    async fn raw_intensities(&self) -> Result<Vec<f64>> {
        let capture = {
            let mut count = self.capture_count.write().await;
            *count += 1;
            *count
        };
        if self.fail_at_capture == Some(capture) {
            bail!("MockSpectrometer: readout failed on capture #{}", capture);
        }

        let micros = *self.integration_micros.read().await;
        if self.realtime {
            sleep(Duration::from_micros(micros)).await;
        }

        let exposure_ms = micros as f64 / 1000.0;
        let mut pixels = CALIBRATION_PIXELS + self.signal_pixels;
        if self.short_at_capture == Some(capture) {
            pixels -= 1;
        }
        let mut rng = rand::thread_rng();
        let spectrum = (0..pixels)
            .map(|i| {
                if i < CALIBRATION_PIXELS {
                    CALIBRATION_MARKER
                } else if self.noise > 0.0 {
                    exposure_ms + rng.gen_range(-self.noise..self.noise)
                } else {
                    exposure_ms
                }
            })
            .collect();

        trace!(capture, micros, "MockSpectrometer: frame read out");
        Ok(spectrum)
    }

    async fn raw_wavelengths(&self) -> Result<Vec<f64>> {
        Ok((0..CALIBRATION_PIXELS + self.signal_pixels)
            .map(|i| 500.0 + 0.5 * i as f64)
            .collect())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
