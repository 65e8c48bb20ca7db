//! Core library for spectral mapping.
//!
//! Drives a motorized XY stage and a spectrometer through a raster scan, turning a
//! requested integration time into hardware exposures and summing them into one
//! spectrum per grid point.
//!
//! - [`acquisition`]: exposure planning, integration buffer, per-pixel engine
//! - [`scan`]: grid geometry and the [`ScanController`]
//! - [`hardware`]: stage and detector traits plus simulated devices
//! - [`events`]: notifications published while scanning
//! - [`config`] and [`logging`]: ambient setup for binaries

pub mod acquisition;
pub mod config;
pub mod error;
pub mod events;
pub mod hardware;
pub mod logging;
pub mod measurement;
pub mod scan;

pub use error::{MapperError, MapperResult};
pub use events::{EventBus, EventSink, ScanEvent, ScanTermination};
pub use measurement::{Background, DataPoint, ScanResult};
pub use scan::{BeginOutcome, ScanController, ScanOptions, StopOutcome};
