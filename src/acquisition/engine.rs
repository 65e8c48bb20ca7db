//! Single-pixel acquire-and-integrate state machine.
//!
//! ```text
//!            ┌──────────────────────────────────────────┐
//!            ▼                                          │
//! Idle ─▶ Configuring ─▶ Exposing ─▶ Integrating ──(more exposures)
//!                                        │
//!                                        └──(schedule exhausted)──▶ Done
//! ```
//!
//! *Configuring* only talks to the detector when the exposure duration actually
//! changes, which in practice means the switch to the remainder exposure and the
//! switch back afterwards.
//!
//! Every frame must have the detector's pixel count. A frame of any other length
//! aborts the pixel with [`MapperError::FrameLength`] instead of being summed.

use tracing::{debug, trace};

use super::integrator::RollingIntegrator;
use super::planner::{ExposurePlanner, ExposureSchedule, TimingSpec};
use crate::error::{MapperError, MapperResult};
use crate::hardware::Detector;

/// Where the engine is within the current pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquisitionPhase {
    /// No pixel in progress
    Idle,
    /// Applying the next exposure duration
    Configuring,
    /// Waiting for the detector to return a spectrum
    Exposing,
    /// Adding the spectrum to the integrator
    Integrating,
    /// Last pixel finished
    Done,
}

/// Produces one integrated spectrum per call to [`AcquisitionEngine::acquire_pixel`].
#[derive(Debug)]
pub struct AcquisitionEngine {
    planner: ExposurePlanner,
    schedule: ExposureSchedule,
    integrator: RollingIntegrator,
    exposure_counter: usize,
    applied_exposure_ms: Option<u64>,
    frame_pixels: Option<usize>,
    phase: AcquisitionPhase,
}

impl AcquisitionEngine {
    /// Build an engine for `timing`.
    ///
    /// # Errors
    ///
    /// Propagates the planner's [`crate::MapperError::InvalidTiming`].
    pub fn new(planner: ExposurePlanner, timing: &TimingSpec) -> MapperResult<Self> {
        let schedule = planner.plan_timing(timing)?;
        Ok(Self {
            planner,
            integrator: RollingIntegrator::new(schedule.buffer_capacity()),
            schedule,
            exposure_counter: 0,
            applied_exposure_ms: None,
            frame_pixels: None,
            phase: AcquisitionPhase::Idle,
        })
    }

    /// Recompute the schedule and start over with an empty integrator.
    ///
    /// On error the previous schedule stays in effect.
    pub fn reconfigure(&mut self, timing: &TimingSpec) -> MapperResult<ExposureSchedule> {
        let schedule = self.planner.plan_timing(timing)?;
        self.schedule = schedule;
        self.integrator = RollingIntegrator::new(schedule.buffer_capacity());
        self.exposure_counter = 0;
        self.phase = AcquisitionPhase::Idle;
        debug!(
            full = schedule.full_exposure_count,
            remainder_ms = schedule.remainder_ms,
            has_remainder = schedule.has_remainder,
            per_pixel_ms = schedule.total_duration_ms(),
            "Exposure schedule updated"
        );
        Ok(schedule)
    }

    /// Pixel count every frame must have.
    ///
    /// Without this the first frame read fixes the count.
    pub fn expect_pixels(&mut self, pixels: usize) {
        self.frame_pixels = Some(pixels);
    }

    /// Active schedule.
    pub fn schedule(&self) -> &ExposureSchedule {
        &self.schedule
    }

    /// Current phase.
    pub fn phase(&self) -> AcquisitionPhase {
        self.phase
    }

    /// Exposures already integrated into the pixel in progress.
    pub fn exposures_taken(&self) -> usize {
        self.exposure_counter
    }

    /// Partial sum of the pixel in progress.
    pub fn live_spectrum(&self) -> Vec<f64> {
        self.integrator.reduce()
    }

    /// Put the detector on the regular exposure duration.
    pub async fn apply_exposure(&mut self, detector: &dyn Detector) -> MapperResult<()> {
        self.set_exposure(detector, self.schedule.exposure_ms).await
    }

    async fn set_exposure(&mut self, detector: &dyn Detector, exposure_ms: u64) -> MapperResult<()> {
        if self.applied_exposure_ms == Some(exposure_ms) {
            return Ok(());
        }
        detector
            .set_integration_time_micros(exposure_ms.saturating_mul(1000))
            .await?;
        self.applied_exposure_ms = Some(exposure_ms);
        trace!(exposure_ms, "Detector exposure applied");
        Ok(())
    }

    /// Run every exposure of the schedule and return their sum.
    ///
    /// A complete run pushes exactly `buffer_capacity` spectra, so the result never
    /// contains data from the previous pixel. If the detector fails mid-pixel the
    /// partial data is discarded and the error is returned.
    pub async fn acquire_pixel(&mut self, detector: &dyn Detector) -> MapperResult<Vec<f64>> {
        match self.run_exposures(detector).await {
            Ok(spectrum) => Ok(spectrum),
            Err(err) => {
                self.exposure_counter = 0;
                self.integrator.clear();
                self.applied_exposure_ms = None;
                self.phase = AcquisitionPhase::Idle;
                Err(err)
            }
        }
    }

    async fn run_exposures(&mut self, detector: &dyn Detector) -> MapperResult<Vec<f64>> {
        let total = self.schedule.total_exposures();
        self.exposure_counter = 0;

        while self.exposure_counter < total {
            self.phase = AcquisitionPhase::Configuring;
            let duration_ms = self.schedule.exposure_duration_ms(self.exposure_counter);
            self.set_exposure(detector, duration_ms).await?;

            self.phase = AcquisitionPhase::Exposing;
            let raw = detector.intensities().await?;
            let expected = *self.frame_pixels.get_or_insert(raw.len());
            if raw.len() != expected {
                return Err(MapperError::FrameLength {
                    expected,
                    actual: raw.len(),
                });
            }

            self.phase = AcquisitionPhase::Integrating;
            self.integrator.push(raw);
            self.exposure_counter += 1;
            trace!(
                exposure = self.exposure_counter,
                of = total,
                duration_ms,
                "Exposure integrated"
            );
        }

        // Leave the detector ready for the first exposure of the next pixel.
        self.apply_exposure(detector).await?;
        self.exposure_counter = 0;
        self.phase = AcquisitionPhase::Done;
        Ok(self.integrator.reduce())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::planner::ShortIntegrationPolicy;
    use crate::hardware::mock::MockSpectrometer;
    use crate::hardware::TrimmedSpectrometer;

    fn detector(pixels: usize) -> TrimmedSpectrometer<MockSpectrometer> {
        TrimmedSpectrometer::new(MockSpectrometer::new(pixels))
    }

    #[tokio::test]
    async fn test_exact_multiple_integration() {
        let detector = detector(8);
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(500, 3000)).unwrap();

        let spectrum = engine.acquire_pixel(&detector).await.unwrap();

        assert_eq!(spectrum.len(), 8);
        assert!(spectrum.iter().all(|&v| v == 3000.0));
        assert_eq!(detector.inner().capture_count().await, 6);
        assert_eq!(detector.inner().integration_history().await, vec![500_000]);
        assert_eq!(engine.phase(), AcquisitionPhase::Done);
        assert_eq!(engine.exposures_taken(), 0);
    }

    #[tokio::test]
    async fn test_remainder_exposure_is_taken_last() {
        let detector = detector(4);
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(500, 3010)).unwrap();

        let spectrum = engine.acquire_pixel(&detector).await.unwrap();

        assert!(spectrum.iter().all(|&v| (v - 3010.0).abs() < 1e-9));
        assert_eq!(detector.inner().capture_count().await, 7);
        assert_eq!(
            detector.inner().integration_history().await,
            vec![500_000, 10_000, 500_000]
        );
    }

    #[tokio::test]
    async fn test_schedule_reused_across_pixels() {
        let detector = detector(4);
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(100, 250)).unwrap();

        let first = engine.acquire_pixel(&detector).await.unwrap();
        let second = engine.acquire_pixel(&detector).await.unwrap();

        assert_eq!(first, second);
        assert!(first.iter().all(|&v| v == 250.0));
        assert_eq!(detector.inner().capture_count().await, 6);
    }

    #[tokio::test]
    async fn test_single_exposure_pixel() {
        let detector = detector(4);
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(200, 200)).unwrap();

        let spectrum = engine.acquire_pixel(&detector).await.unwrap();
        assert!(spectrum.iter().all(|&v| v == 200.0));
        assert_eq!(detector.inner().capture_count().await, 1);
    }

    #[tokio::test]
    async fn test_short_integration_collapses_under_lenient_policy() {
        let detector = detector(4);
        let planner = ExposurePlanner::new(ShortIntegrationPolicy::SingleExposure);
        let mut engine = AcquisitionEngine::new(planner, &TimingSpec::new(200, 50)).unwrap();

        let spectrum = engine.acquire_pixel(&detector).await.unwrap();
        assert!(spectrum.iter().all(|&v| v == 200.0));
        assert_eq!(detector.inner().capture_count().await, 1);
    }

    #[test]
    fn test_invalid_timing_propagates() {
        let result = AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(500, 100));
        assert!(matches!(result, Err(MapperError::InvalidTiming { .. })));
    }

    #[tokio::test]
    async fn test_reconfigure_keeps_previous_schedule_on_error() {
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(500, 3000)).unwrap();

        assert!(engine.reconfigure(&TimingSpec::new(0, 3000)).is_err());
        assert_eq!(engine.schedule().full_exposure_count, 6);

        let schedule = engine.reconfigure(&TimingSpec::new(100, 1050)).unwrap();
        assert_eq!(schedule.full_exposure_count, 10);
        assert!(schedule.has_remainder);
    }

    #[tokio::test]
    async fn test_detector_failure_resets_pixel() {
        let detector = TrimmedSpectrometer::new(MockSpectrometer::new(4).failing_at(2));
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(100, 300)).unwrap();

        let err = engine.acquire_pixel(&detector).await.unwrap_err();
        assert!(matches!(err, MapperError::Hardware(_)));
        assert_eq!(engine.phase(), AcquisitionPhase::Idle);
        assert!(engine.live_spectrum().is_empty());

        // The next pixel starts from scratch.
        let spectrum = engine.acquire_pixel(&detector).await.unwrap();
        assert!(spectrum.iter().all(|&v| v == 300.0));
    }

    #[tokio::test]
    async fn test_short_frame_aborts_pixel() {
        let detector = TrimmedSpectrometer::new(MockSpectrometer::new(4).short_frame_at(2));
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(100, 300)).unwrap();
        engine.expect_pixels(4);

        let err = engine.acquire_pixel(&detector).await.unwrap_err();
        assert!(matches!(
            err,
            MapperError::FrameLength {
                expected: 4,
                actual: 3
            }
        ));
        assert!(engine.live_spectrum().is_empty());

        let spectrum = engine.acquire_pixel(&detector).await.unwrap();
        assert_eq!(spectrum.len(), 4);
        assert!(spectrum.iter().all(|&v| v == 300.0));
    }

    #[tokio::test]
    async fn test_first_frame_fixes_pixel_count() {
        let detector = TrimmedSpectrometer::new(MockSpectrometer::new(6).short_frame_at(4));
        let mut engine =
            AcquisitionEngine::new(ExposurePlanner::default(), &TimingSpec::new(100, 300)).unwrap();

        assert_eq!(engine.acquire_pixel(&detector).await.unwrap().len(), 6);
        assert!(matches!(
            engine.acquire_pixel(&detector).await,
            Err(MapperError::FrameLength {
                expected: 6,
                actual: 5
            })
        ));
    }
}
