//! Spectrum acquisition and integration.
//!
//! - [`planner`]: splits an integration time into hardware exposures
//! - [`integrator`]: bounded buffer summing raw exposures
//! - [`engine`]: per-pixel state machine tying the two to a [`crate::hardware::Detector`]

pub mod engine;
pub mod integrator;
pub mod planner;

pub use engine::{AcquisitionEngine, AcquisitionPhase};
pub use integrator::RollingIntegrator;
pub use planner::{
    ExposurePlanner, ExposureSchedule, ShortIntegrationPolicy, TimingSpec, REMAINDER_THRESHOLD_MS,
};
