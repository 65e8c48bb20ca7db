//! Acquired data: per-pixel spectra, the map being built, and the background.

pub mod datapoint;

pub use datapoint::{Background, DataPoint, ScanResult, DEFAULT_BACKGROUND_TITLE};
