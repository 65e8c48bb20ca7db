//! Raster scanning: grid geometry and the scan controller.

pub mod controller;
pub mod grid;

pub use controller::{
    BeginOutcome, InterruptHandle, RunState, ScanController, ScanOptions, StopOutcome,
};
pub use grid::{raster_positions, GridSpec, ScanDirection, StepUnit};
