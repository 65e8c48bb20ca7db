//! Raster geometry: grid dimensions, step units, traversal order.

use serde::{Deserialize, Serialize};

use crate::error::{MapperError, MapperResult};
use crate::hardware::{GridIndex, MapPosition, StagePosition, TravelLimits};

/// Unit of [`GridSpec::step`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepUnit {
    /// Millimetres
    #[serde(rename = "mm")]
    #[default]
    Millimeter,
    /// Micrometres (native stage unit)
    #[serde(rename = "um")]
    Micrometer,
    /// Nanometres
    #[serde(rename = "nm")]
    Nanometer,
}

impl StepUnit {
    /// Native stage units per step unit.
    pub fn factor(self) -> f64 {
        match self {
            StepUnit::Millimeter => 1e3,
            StepUnit::Micrometer => 1.0,
            StepUnit::Nanometer => 1e-3,
        }
    }
}

/// Row traversal order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    /// Every row left to right
    #[default]
    Unidirectional,
    /// Alternate rows right to left
    Zigzag,
}

/// Geometry of a raster scan.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// Number of columns
    pub width: u32,
    /// Number of rows
    pub height: u32,
    /// Distance between neighbouring cells, in `step_unit`
    pub step: f64,
    /// Unit of `step`
    pub step_unit: StepUnit,
    /// Row traversal order
    pub direction: ScanDirection,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self {
            width: 2,
            height: 2,
            step: 1.0,
            step_unit: StepUnit::Millimeter,
            direction: ScanDirection::Unidirectional,
        }
    }
}

impl GridSpec {
    /// Total number of cells.
    pub fn point_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Step in native stage units.
    pub fn step_distance(&self) -> f64 {
        self.step * self.step_unit.factor()
    }

    /// Check the grid on its own: positive dimensions and a finite positive step.
    pub fn validate(&self) -> MapperResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(MapperError::Configuration(
                "Images will be mapped strictly with positive coordinates".to_string(),
            ));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(MapperError::Configuration(format!(
                "Step must be a positive distance, got {}",
                self.step
            )));
        }
        Ok(())
    }

    /// Check the grid fits inside the stage travel when started from `origin`.
    pub fn validate_travel(&self, origin: StagePosition, limits: TravelLimits) -> MapperResult<()> {
        self.validate()?;

        let step = self.step_distance();
        if self.width as f64 * step + origin.x > limits.x_max {
            return Err(MapperError::Configuration(
                "The stage does not allow such an important range of motion in width".to_string(),
            ));
        }
        if self.height as f64 * step + origin.y > limits.y_max {
            return Err(MapperError::Configuration(
                "The stage does not allow such an important range of motion in height".to_string(),
            ));
        }
        Ok(())
    }
}

/// Lay out a `width` x `height` raster starting at `origin`.
///
/// Rows are visited in increasing `y`. With [`ScanDirection::Zigzag`] odd rows run
/// from the last column back to the first.
pub fn raster_positions(
    origin: StagePosition,
    width: u32,
    height: u32,
    step_distance: f64,
    direction: ScanDirection,
) -> Vec<MapPosition> {
    let mut positions = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        let reversed = direction == ScanDirection::Zigzag && y % 2 == 1;
        for i in 0..width {
            let x = if reversed { width - 1 - i } else { i };
            positions.push(MapPosition {
                index: GridIndex { x, y },
                position: StagePosition {
                    x: origin.x + x as f64 * step_distance,
                    y: origin.y + y as f64 * step_distance,
                },
            });
        }
    }
    positions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indices(positions: &[MapPosition]) -> Vec<(u32, u32)> {
        positions.iter().map(|p| (p.index.x, p.index.y)).collect()
    }

    #[test]
    fn test_unidirectional_order() {
        let positions = raster_positions(
            StagePosition::default(),
            3,
            2,
            1.0,
            ScanDirection::Unidirectional,
        );
        assert_eq!(
            indices(&positions),
            vec![(0, 0), (1, 0), (2, 0), (0, 1), (1, 1), (2, 1)]
        );
    }

    #[test]
    fn test_zigzag_order() {
        let positions =
            raster_positions(StagePosition::default(), 3, 2, 1.0, ScanDirection::Zigzag);
        assert_eq!(
            indices(&positions),
            vec![(0, 0), (1, 0), (2, 0), (2, 1), (1, 1), (0, 1)]
        );
    }

    #[test]
    fn test_positions_offset_from_origin() {
        let positions = raster_positions(
            StagePosition::new(100.0, 50.0),
            2,
            2,
            10.0,
            ScanDirection::Unidirectional,
        );
        assert_eq!(positions[3].position, StagePosition::new(110.0, 60.0));
    }

    #[test]
    fn test_step_units() {
        let grid = GridSpec {
            step: 2.0,
            step_unit: StepUnit::Nanometer,
            ..GridSpec::default()
        };
        assert!((grid.step_distance() - 0.002).abs() < 1e-12);
        assert_eq!(GridSpec::default().step_distance(), 1000.0);
    }

    #[test]
    fn test_validate_rejects_non_positive() {
        let zero_width = GridSpec {
            width: 0,
            ..GridSpec::default()
        };
        assert!(matches!(
            zero_width.validate(),
            Err(MapperError::Configuration(_))
        ));

        let negative_step = GridSpec {
            step: -1.0,
            ..GridSpec::default()
        };
        assert!(negative_step.validate().is_err());
    }

    #[test]
    fn test_validate_travel_uses_each_axis_limit() {
        let limits = TravelLimits {
            x_max: 10_000.0,
            y_max: 3_000.0,
        };
        let wide = GridSpec {
            width: 8,
            height: 2,
            ..GridSpec::default()
        };
        assert!(wide.validate_travel(StagePosition::default(), limits).is_ok());

        let tall = GridSpec {
            width: 2,
            height: 4,
            ..GridSpec::default()
        };
        let err = tall
            .validate_travel(StagePosition::default(), limits)
            .unwrap_err();
        assert!(err.to_string().contains("height"));
    }

    #[test]
    fn test_step_unit_serde_names() {
        let unit: StepUnit = serde_json::from_str("\"um\"").unwrap();
        assert_eq!(unit, StepUnit::Micrometer);
        let direction: ScanDirection = serde_json::from_str("\"zigzag\"").unwrap();
        assert_eq!(direction, ScanDirection::Zigzag);
    }
}
