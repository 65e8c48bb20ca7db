//! Exposure planning.
//!
//! A requested integration time is split into a run of full-length exposures plus,
//! when the leftover is long enough to matter, one shorter remainder exposure.
//!
//! ```text
//! exposure = 500 ms, integration = 3010 ms
//!
//! | 500 | 500 | 500 | 500 | 500 | 500 |10|
//!  \_____________ 6 full ____________/  remainder
//! ```
//!
//! Leftovers of [`REMAINDER_THRESHOLD_MS`] or less are dropped.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{MapperError, MapperResult};

/// Remainders at or below this many milliseconds do not get their own exposure.
pub const REMAINDER_THRESHOLD_MS: u64 = 3;

/// Exposure and integration times requested by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSpec {
    /// Duration of one hardware exposure
    pub exposure_time_ms: u64,
    /// Total signal time integrated into each pixel
    pub integration_time_ms: u64,
}

impl Default for TimingSpec {
    fn default() -> Self {
        Self {
            exposure_time_ms: 500,
            integration_time_ms: 3000,
        }
    }
}

impl TimingSpec {
    /// Create a timing pair without validating it.
    pub fn new(exposure_time_ms: u64, integration_time_ms: u64) -> Self {
        Self {
            exposure_time_ms,
            integration_time_ms,
        }
    }

    /// Both times positive and integration no shorter than exposure.
    pub fn validate(&self) -> MapperResult<()> {
        self.validate_for(ShortIntegrationPolicy::Reject)
    }

    /// Like [`TimingSpec::validate`], but lets integration be shorter than exposure
    /// when the planner will collapse it to a single exposure.
    pub fn validate_for(&self, policy: ShortIntegrationPolicy) -> MapperResult<()> {
        if self.exposure_time_ms == 0 {
            return Err(MapperError::Configuration(
                "The exposure time cannot be a negative or null value".to_string(),
            ));
        }
        if self.integration_time_ms == 0 {
            return Err(MapperError::Configuration(
                "The integration time cannot be a negative or null value".to_string(),
            ));
        }
        if policy == ShortIntegrationPolicy::Reject
            && self.integration_time_ms < self.exposure_time_ms
        {
            return Err(MapperError::Configuration(
                "The integration time is necessarily greater or equal to the exposure time"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// What to do when the integration time is shorter than one exposure.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortIntegrationPolicy {
    /// Refuse with [`MapperError::InvalidTiming`]
    #[default]
    Reject,
    /// Take exactly one full exposure
    SingleExposure,
}

/// Exposure sequence for one pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureSchedule {
    /// Duration of each full exposure
    pub exposure_ms: u64,
    /// Number of full-length exposures
    pub full_exposure_count: u32,
    /// Leftover time after the full exposures
    pub remainder_ms: u64,
    /// Whether the leftover gets its own exposure
    pub has_remainder: bool,
}

impl ExposureSchedule {
    /// Schedule of exactly one full exposure.
    pub fn single(exposure_ms: u64) -> Self {
        Self {
            exposure_ms,
            full_exposure_count: 1,
            remainder_ms: 0,
            has_remainder: false,
        }
    }

    /// Exposures per pixel, remainder included.
    pub fn total_exposures(&self) -> usize {
        self.full_exposure_count as usize + usize::from(self.has_remainder)
    }

    /// Number of raw spectra the integrator must hold for one pixel.
    pub fn buffer_capacity(&self) -> usize {
        self.total_exposures()
    }

    /// Duration of the `index`-th exposure (0-based) of a pixel.
    pub fn exposure_duration_ms(&self, index: usize) -> u64 {
        if self.has_remainder && index >= self.full_exposure_count as usize {
            self.remainder_ms
        } else {
            self.exposure_ms
        }
    }

    /// Time actually spent exposing per pixel.
    pub fn total_duration_ms(&self) -> u64 {
        (0..self.total_exposures())
            .map(|i| self.exposure_duration_ms(i))
            .sum()
    }
}

/// Turns timing requests into exposure schedules.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExposurePlanner {
    policy: ShortIntegrationPolicy,
}

impl ExposurePlanner {
    /// Planner with the given short-integration policy.
    pub fn new(policy: ShortIntegrationPolicy) -> Self {
        Self { policy }
    }

    /// Active short-integration policy.
    pub fn policy(&self) -> ShortIntegrationPolicy {
        self.policy
    }

    /// Compute the schedule for a timing pair.
    ///
    /// # Errors
    ///
    /// [`MapperError::InvalidTiming`] if either time is zero, or if integration is
    /// shorter than exposure under [`ShortIntegrationPolicy::Reject`].
    pub fn plan(&self, exposure_ms: u64, integration_ms: u64) -> MapperResult<ExposureSchedule> {
        let invalid = MapperError::InvalidTiming {
            exposure_ms,
            integration_ms,
        };
        if exposure_ms == 0 || integration_ms == 0 {
            return Err(invalid);
        }

        if integration_ms < exposure_ms {
            return match self.policy {
                ShortIntegrationPolicy::Reject => Err(invalid),
                ShortIntegrationPolicy::SingleExposure => {
                    warn!(
                        exposure_ms,
                        integration_ms, "Integration shorter than exposure; taking one exposure"
                    );
                    Ok(ExposureSchedule::single(exposure_ms))
                }
            };
        }

        let full_exposure_count = u32::try_from(integration_ms / exposure_ms).map_err(|_| {
            MapperError::InvalidTiming {
                exposure_ms,
                integration_ms,
            }
        })?;
        let remainder_ms = integration_ms % exposure_ms;

        Ok(ExposureSchedule {
            exposure_ms,
            full_exposure_count,
            remainder_ms,
            has_remainder: remainder_ms > REMAINDER_THRESHOLD_MS,
        })
    }

    /// Shorthand for [`ExposurePlanner::plan`] on a [`TimingSpec`].
    pub fn plan_timing(&self, timing: &TimingSpec) -> MapperResult<ExposureSchedule> {
        self.plan(timing.exposure_time_ms, timing.integration_time_ms)
    }
}
