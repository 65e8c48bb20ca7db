//! Raster scan orchestration.
//!
//! [`ScanController`] owns the scan configuration, the acquisition engine and the
//! map being built. One task runs the scan loop; any other task may stop it through
//! [`ScanController::stop`] or an [`InterruptHandle`].
//!
//! # State Machine
//!
//! ```text
//! Idle ──begin()──▶ Scanning ──grid exhausted──▶ Completed ──▶ Idle
//!                      │
//!                      ├──stop()/interrupt──▶ Interrupted ──▶ Idle
//!                      └──driver error──────▶ Failed ──────▶ Idle
//! ```
//!
//! # Concurrency
//!
//! The only state shared with interrupting tasks is the [`RunState`]. It lives
//! behind a `std::sync::Mutex` that is held for a copy or a single transition,
//! never across an `.await`. A stop request moves `Scanning` to `Stopping`; only the
//! scan task itself returns to `Idle`, after its last event is out. The loop
//! re-reads the state after every pixel, so a stop request takes effect within one
//! pixel's integration time, and no new scan can start until the old one has left.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::acquisition::{
    AcquisitionEngine, ExposurePlanner, ExposureSchedule, ShortIntegrationPolicy, TimingSpec,
};
use crate::error::{Collaborator, MapperError, MapperResult};
use crate::events::{EventBus, EventSink, ScanEvent, ScanTermination};
use crate::hardware::{Detector, Stage, StagePosition};
use crate::measurement::{Background, DataPoint, ScanResult, DEFAULT_BACKGROUND_TITLE};
use crate::scan::grid::GridSpec;

/// Result of [`ScanController::begin`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeginOutcome {
    /// The scan ran and ended this way
    Finished(ScanTermination),
    /// Another scan was already running; nothing was done
    Busy,
}

/// Result of a stop request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// The running scan will stop at its next check
    Stopped,
    /// No scan was running
    NotRunning,
}

/// Lifecycle of the scan task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RunState {
    /// No scan task is running
    #[default]
    Idle,
    /// The scan loop is acquiring
    Scanning,
    /// A stop was requested; the loop has not exited yet
    Stopping,
}

fn lock_state(state: &Mutex<RunState>) -> MutexGuard<'_, RunState> {
    // The guarded value is a plain enum; a panic elsewhere cannot leave it torn.
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable handle that can stop a scan from any thread.
#[derive(Clone, Debug)]
pub struct InterruptHandle {
    state: Arc<Mutex<RunState>>,
}

impl InterruptHandle {
    /// Move a running scan to [`RunState::Stopping`].
    pub fn interrupt(&self) -> StopOutcome {
        let mut state = lock_state(&self.state);
        if *state == RunState::Scanning {
            *state = RunState::Stopping;
            StopOutcome::Stopped
        } else {
            StopOutcome::NotRunning
        }
    }
}

/// Construction parameters for a [`ScanController`].
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Initial grid
    pub grid: GridSpec,
    /// Initial timing
    pub timing: TimingSpec,
    /// Planner behaviour for integration shorter than exposure
    pub short_integration: ShortIntegrationPolicy,
    /// Name used as the source of published events
    pub source: String,
    /// Title given to acquired backgrounds
    pub background_title: String,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            grid: GridSpec::default(),
            timing: TimingSpec::default(),
            short_integration: ShortIntegrationPolicy::default(),
            source: "spectral_mapper".to_string(),
            background_title: DEFAULT_BACKGROUND_TITLE.to_string(),
        }
    }
}

/// Drives a stage and a detector through a raster scan.
pub struct ScanController {
    source: String,
    background_title: String,
    short_integration: ShortIntegrationPolicy,
    events: Arc<dyn EventSink>,
    state: Arc<Mutex<RunState>>,
    stage: RwLock<Option<Arc<dyn Stage>>>,
    detector: RwLock<Option<Arc<dyn Detector>>>,
    stage_origin: RwLock<Option<StagePosition>>,
    wavelengths: RwLock<Vec<f64>>,
    grid: RwLock<GridSpec>,
    timing: RwLock<TimingSpec>,
    engine: AsyncMutex<AcquisitionEngine>,
    result: RwLock<ScanResult>,
    background: RwLock<Option<Background>>,
}

impl std::fmt::Debug for ScanController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanController")
            .field("source", &self.source)
            .field("state", &self.run_state())
            .finish_non_exhaustive()
    }
}

impl ScanController {
    /// Create an idle controller with no hardware attached.
    ///
    /// # Errors
    ///
    /// [`MapperError::Configuration`] or [`MapperError::InvalidTiming`] if the
    /// initial grid or timing is invalid.
    pub fn new(events: Arc<dyn EventSink>, options: ScanOptions) -> MapperResult<Self> {
        options.grid.validate()?;
        options.timing.validate_for(options.short_integration)?;
        let engine = AcquisitionEngine::new(
            ExposurePlanner::new(options.short_integration),
            &options.timing,
        )?;

        Ok(Self {
            source: options.source,
            background_title: options.background_title,
            short_integration: options.short_integration,
            events,
            state: Arc::new(Mutex::new(RunState::Idle)),
            stage: RwLock::new(None),
            detector: RwLock::new(None),
            stage_origin: RwLock::new(None),
            wavelengths: RwLock::new(Vec::new()),
            grid: RwLock::new(options.grid),
            timing: RwLock::new(options.timing),
            engine: AsyncMutex::new(engine),
            result: RwLock::new(ScanResult::new()),
            background: RwLock::new(None),
        })
    }

    // =========================================================================
    // Hardware
    // =========================================================================

    /// Attach a stage and record its current position as the scan origin.
    pub async fn connect_stage(&self, stage: Arc<dyn Stage>) -> MapperResult<StagePosition> {
        *self.stage.write().await = Some(stage);
        self.reset_stage_position().await
    }

    /// Attach a detector and cache its wavelength axis.
    ///
    /// Every later frame must match the axis length. Rejected with
    /// [`MapperError::Busy`] while a scan runs.
    pub async fn connect_detector(&self, detector: Arc<dyn Detector>) -> MapperResult<()> {
        if self.is_acquiring() {
            return Err(MapperError::Busy);
        }
        let wavelengths = detector.wavelengths().await?;
        debug!(pixels = wavelengths.len(), "Detector connected");
        self.engine.lock().await.expect_pixels(wavelengths.len());
        *self.wavelengths.write().await = wavelengths;
        *self.detector.write().await = Some(detector);
        Ok(())
    }

    /// Re-read the stage position and use it as the scan origin.
    pub async fn reset_stage_position(&self) -> MapperResult<StagePosition> {
        let stage = self.stage().await?;
        let position = stage.position().await?;
        *self.stage_origin.write().await = Some(position);
        Ok(position)
    }

    /// Origin recorded by the last [`ScanController::reset_stage_position`].
    pub async fn stage_position(&self) -> Option<StagePosition> {
        *self.stage_origin.read().await
    }

    /// Wavelength axis of the connected detector.
    pub async fn wavelengths(&self) -> Vec<f64> {
        self.wavelengths.read().await.clone()
    }

    async fn stage(&self) -> MapperResult<Arc<dyn Stage>> {
        self.stage
            .read()
            .await
            .clone()
            .ok_or(MapperError::NotConnected(Collaborator::Stage))
    }

    async fn detector(&self) -> MapperResult<Arc<dyn Detector>> {
        self.detector
            .read()
            .await
            .clone()
            .ok_or(MapperError::NotConnected(Collaborator::Detector))
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Current grid.
    pub async fn grid(&self) -> GridSpec {
        *self.grid.read().await
    }

    /// Current timing.
    pub async fn timing(&self) -> TimingSpec {
        *self.timing.read().await
    }

    /// Exposure schedule derived from the current timing.
    pub async fn schedule(&self) -> ExposureSchedule {
        *self.engine.lock().await.schedule()
    }

    /// Replace the grid after validating it as a whole.
    ///
    /// With a stage connected the grid must also fit the stage travel from the
    /// recorded origin. On error the previous grid stays in effect.
    pub async fn configure_grid(&self, grid: GridSpec) -> MapperResult<()> {
        if self.is_acquiring() {
            return Err(MapperError::Busy);
        }

        let stage = self.stage.read().await.clone();
        match (stage, self.stage_position().await) {
            (Some(stage), Some(origin)) => grid.validate_travel(origin, stage.travel_limits())?,
            _ => grid.validate()?,
        }

        *self.grid.write().await = grid;
        debug!(
            width = grid.width,
            height = grid.height,
            step = grid.step,
            "Grid configured"
        );
        Ok(())
    }

    /// Replace the timing and rebuild the exposure schedule.
    ///
    /// On error the previous timing and schedule stay in effect.
    pub async fn configure_timing(&self, timing: TimingSpec) -> MapperResult<ExposureSchedule> {
        if self.is_acquiring() {
            return Err(MapperError::Busy);
        }
        timing.validate_for(self.short_integration)?;

        let schedule = self.engine.lock().await.reconfigure(&timing)?;
        *self.timing.write().await = timing;
        Ok(schedule)
    }

    // =========================================================================
    // Acquisition state
    // =========================================================================

    /// Snapshot of the scan lifecycle.
    pub fn run_state(&self) -> RunState {
        *lock_state(&self.state)
    }

    /// Returns true from `begin()` until the scan task has published its finished
    /// event, including while a stop request is pending.
    pub fn is_acquiring(&self) -> bool {
        self.run_state() != RunState::Idle
    }

    /// Handle for stopping scans from other tasks or threads.
    pub fn interrupt_handle(&self) -> InterruptHandle {
        InterruptHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Stop the running scan.
    ///
    /// The scan task notices at its next check, publishes the finished event and
    /// returns. Until then [`ScanController::begin`] keeps answering
    /// [`BeginOutcome::Busy`]. Stopping an idle or already stopping controller does
    /// nothing and returns [`StopOutcome::NotRunning`].
    pub fn stop(&self) -> StopOutcome {
        let outcome = self.interrupt_handle().interrupt();
        if outcome == StopOutcome::Stopped {
            info!(source = %self.source, "Map acquisition interrupted");
        }
        outcome
    }

    /// Stop the scan whenever an interrupt request appears on `bus`.
    pub fn listen_for_interrupts(&self, bus: &EventBus) -> JoinHandle<()> {
        let handle = self.interrupt_handle();
        let mut rx = bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        if matches!(envelope.event, ScanEvent::InterruptRequested) {
                            let outcome = handle.interrupt();
                            info!(from = %envelope.source, ?outcome, "Interrupt requested");
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Interrupt listener lagged behind the event bus");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    // =========================================================================
    // Results
    // =========================================================================

    /// Points acquired by the current or last scan.
    pub async fn scan_result(&self) -> ScanResult {
        self.result.read().await.clone()
    }

    /// Most recent background, if any.
    pub async fn background(&self) -> Option<Background> {
        self.background.read().await.clone()
    }

    /// Integrate one spectrum at the current position and store it as the background.
    ///
    /// # Errors
    ///
    /// [`MapperError::Busy`] while a scan runs, [`MapperError::NotConnected`]
    /// without a detector, or any detector failure.
    pub async fn acquire_background(&self) -> MapperResult<Background> {
        if self.is_acquiring() {
            return Err(MapperError::Busy);
        }
        let detector = self.detector().await?;

        let spectrum = {
            let mut engine = self.engine.lock().await;
            engine.acquire_pixel(detector.as_ref()).await?
        };

        let background = Background::titled(self.background_title.clone(), spectrum);
        *self.background.write().await = Some(background.clone());
        info!(pixels = background.spectrum.len(), "Background acquired");
        self.events.publish(
            &self.source,
            ScanEvent::BackgroundAcquired {
                background: background.clone(),
            },
        );
        Ok(background)
    }

    // =========================================================================
    // Scanning
    // =========================================================================

    /// Run a full scan on the calling task.
    ///
    /// Returns once the scan has completed, been interrupted or failed. Exactly one
    /// finished event is published for every call that gets past the busy check.
    ///
    /// # Errors
    ///
    /// Missing hardware and invalid geometry are reported before the scan starts.
    /// A hardware failure during the scan is returned after the finished event has
    /// been published with the points acquired so far.
    pub async fn begin(&self) -> MapperResult<BeginOutcome> {
        if self.is_acquiring() {
            return Ok(BeginOutcome::Busy);
        }

        let stage = self.stage().await?;
        let detector = self.detector().await?;
        let grid = self.grid().await;
        let origin = self.reset_stage_position().await?;
        grid.validate_travel(origin, stage.travel_limits())?;

        {
            let mut state = lock_state(&self.state);
            if *state != RunState::Idle {
                return Ok(BeginOutcome::Busy);
            }
            *state = RunState::Scanning;
        }

        info!(
            source = %self.source,
            width = grid.width,
            height = grid.height,
            direction = ?grid.direction,
            "Map acquisition started"
        );

        match self.run_scan(stage.as_ref(), detector.as_ref(), &grid).await {
            Ok(exhausted) => {
                let termination = if exhausted {
                    ScanTermination::Completed
                } else {
                    ScanTermination::Interrupted
                };
                self.finish(termination).await;
                Ok(BeginOutcome::Finished(termination))
            }
            Err(err) => {
                warn!(error = %err, "Map acquisition failed");
                self.finish(ScanTermination::Failed).await;
                Err(err)
            }
        }
    }

    /// Run [`ScanController::begin`] on a new Tokio task.
    pub fn spawn_scan(self: &Arc<Self>) -> JoinHandle<MapperResult<BeginOutcome>> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.begin().await })
    }

    /// Scan loop. Returns true if every grid point was acquired.
    async fn run_scan(
        &self,
        stage: &dyn Stage,
        detector: &dyn Detector,
        grid: &GridSpec,
    ) -> MapperResult<bool> {
        self.result.write().await.clear();

        let mut engine = self.engine.lock().await;
        engine.apply_exposure(detector).await?;

        let targets = stage
            .map_positions(
                grid.width,
                grid.height,
                grid.step_distance(),
                grid.direction,
            )
            .await?;
        if targets.len() < grid.point_count() {
            warn!(
                expected = grid.point_count(),
                provided = targets.len(),
                "Stage provided fewer positions than grid points"
            );
        }
        let total = grid.point_count().min(targets.len());

        if let Some(first) = targets.first() {
            stage.move_to(first.position).await?;
        }

        let mut counter = 0;
        let mut in_progress = self.run_state() == RunState::Scanning;
        while in_progress && counter < total {
            let target = targets[counter];
            let spectrum = engine.acquire_pixel(detector).await?;
            let point = DataPoint::new(target.index.x, target.index.y, spectrum);

            let snapshot = {
                let mut result = self.result.write().await;
                result.push(point.clone());
                result.clone()
            };
            debug!(
                x = point.x,
                y = point.y,
                acquired = snapshot.len(),
                of = total,
                "Point acquired"
            );
            self.events.publish(
                &self.source,
                ScanEvent::PointAcquired {
                    point,
                    result: snapshot,
                },
            );

            if let Some(next) = targets.get(counter + 1) {
                stage.move_to(next.position).await?;
            }
            counter += 1;
            in_progress = self.run_state() == RunState::Scanning;
        }

        Ok(counter >= total)
    }

    /// Return to `Idle` and publish the single finished event.
    ///
    /// The result is captured while the scan still owns the controller, so a scan
    /// started right after cannot clear it first.
    async fn finish(&self, termination: ScanTermination) {
        let result = self.scan_result().await;
        *lock_state(&self.state) = RunState::Idle;

        info!(
            source = %self.source,
            points = result.len(),
            ?termination,
            "Map acquisition done"
        );
        self.events.publish(
            &self.source,
            ScanEvent::ScanFinished {
                result,
                termination,
            },
        );
    }
}
