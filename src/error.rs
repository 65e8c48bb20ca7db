//! Custom error types for the mapper.
//!
//! This module defines the primary error type, `MapperError`. Using the `thiserror`
//! crate, it gives every failure the acquisition core can produce a single,
//! consistent shape.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: A grid or timing change was rejected. Non-positive
//!   dimensions, integration shorter than exposure, or a grid that would drive the
//!   stage past its travel limits all land here. The previous configuration stays
//!   in effect.
//! - **`InvalidTiming`**: The exposure planner refused a timing pair. This is always
//!   propagated to the caller; acquisition never silently continues with a guessed
//!   exposure count.
//! - **`NotConnected`**: An operation needed the stage or the detector and none was
//!   attached.
//! - **`Busy`**: A reconfiguration or background capture was requested while a map
//!   is being acquired.
//! - **`FrameLength`**: A detector frame did not match the detector's wavelength
//!   axis. The pixel in progress is discarded rather than summed over a prefix.
//! - **`Hardware`**: Wraps `anyhow::Error` coming out of a collaborator driver. No
//!   retry is attempted here.
//!
//! Starting a scan twice or stopping an idle scan are not errors; see
//! [`crate::scan::BeginOutcome`] and [`crate::scan::StopOutcome`].

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the mapper error type.
pub type MapperResult<T> = std::result::Result<T, MapperError>;

/// Hardware collaborators the mapper drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    /// Motorized XY stage.
    Stage,
    /// Spectrometer or other spectrum detector.
    Detector,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collaborator::Stage => write!(f, "stage"),
            Collaborator::Detector => write!(f, "detector"),
        }
    }
}

/// Errors produced by the acquisition core.
#[derive(Error, Debug)]
pub enum MapperError {
    /// Rejected grid or timing; the previous configuration stays in effect
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// The exposure planner cannot schedule this timing pair
    #[error("Invalid timing: exposure {exposure_ms} ms, integration {integration_ms} ms")]
    InvalidTiming {
        /// Requested exposure duration
        exposure_ms: u64,
        /// Requested integration time
        integration_ms: u64,
    },

    /// The operation needs a collaborator that is not attached
    #[error("The {0} does not seem to be correctly connected")]
    NotConnected(Collaborator),

    /// A map acquisition owns the controller
    #[error("Map acquisition in progress")]
    Busy,

    /// The detector returned a frame whose pixel count differs from its wavelength axis
    #[error("Detector frame has {actual} pixels, expected {expected}")]
    FrameLength {
        /// Pixels on the wavelength axis
        expected: usize,
        /// Pixels in the returned frame
        actual: usize,
    },

    /// Failure reported by a collaborator driver
    #[error("Hardware error: {0}")]
    Hardware(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapperError::Configuration("width must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration validation error: width must be positive"
        );
    }

    #[test]
    fn test_not_connected_names_collaborator() {
        let err = MapperError::NotConnected(Collaborator::Stage);
        assert!(err.to_string().contains("stage"));
    }

    #[test]
    fn test_frame_length_display() {
        let err = MapperError::FrameLength {
            expected: 512,
            actual: 510,
        };
        assert_eq!(err.to_string(), "Detector frame has 510 pixels, expected 512");
    }

    #[test]
    fn test_hardware_error_from_anyhow() {
        let err: MapperError = anyhow::anyhow!("serial timeout").into();
        assert!(matches!(err, MapperError::Hardware(_)));
        assert!(err.to_string().contains("serial timeout"));
    }
}
