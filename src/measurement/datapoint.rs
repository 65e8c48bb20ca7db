//! Spectra acquired at grid cells and the background they are compared to.

use serde::{Deserialize, Serialize};

/// Title given to backgrounds unless configured otherwise.
pub const DEFAULT_BACKGROUND_TITLE: &str = "background";

/// One integrated spectrum at a grid cell.
///
/// `x` and `y` are grid indices, not stage coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Column index in the raster grid
    pub x: u32,
    /// Row index in the raster grid
    pub y: u32,
    /// Integrated intensities, one per (trimmed) wavelength
    pub spectrum: Vec<f64>,
}

impl DataPoint {
    /// Create a data point for grid cell `(x, y)`.
    pub fn new(x: u32, y: u32, spectrum: Vec<f64>) -> Self {
        Self { x, y, spectrum }
    }
}

/// Ordered collection of data points acquired by one scan.
///
/// Append-only while the scan runs; cleared when the next scan begins.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    points: Vec<DataPoint>,
}

impl ScanResult {
    /// Empty result.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, point: DataPoint) {
        self.points.push(point);
    }

    pub(crate) fn clear(&mut self) {
        self.points.clear();
    }

    /// Points in acquisition order.
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Number of acquired points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if nothing has been acquired yet.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over points in acquisition order.
    pub fn iter(&self) -> std::slice::Iter<'_, DataPoint> {
        self.points.iter()
    }

    /// Consume the result, returning the points.
    pub fn into_points(self) -> Vec<DataPoint> {
        self.points
    }
}

impl<'a> IntoIterator for &'a ScanResult {
    type Item = &'a DataPoint;
    type IntoIter = std::slice::Iter<'a, DataPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Most recent background capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Background {
    /// Label for the capture
    pub title: String,
    /// Integrated dark spectrum
    pub spectrum: Vec<f64>,
}

impl Background {
    /// Background with the default title.
    pub fn new(spectrum: Vec<f64>) -> Self {
        Self::titled(DEFAULT_BACKGROUND_TITLE, spectrum)
    }

    /// Background with an explicit title.
    pub fn titled(title: impl Into<String>, spectrum: Vec<f64>) -> Self {
        Self {
            title: title.into(),
            spectrum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_result_preserves_order() {
        let mut result = ScanResult::new();
        result.push(DataPoint::new(0, 0, vec![1.0]));
        result.push(DataPoint::new(1, 0, vec![2.0]));

        let xs: Vec<u32> = result.iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0, 1]);
        assert_eq!(result.len(), 2);

        result.clear();
        assert!(result.is_empty());
    }

    #[test]
    fn test_background_default_title() {
        let background = Background::new(vec![0.5, 0.5]);
        assert_eq!(background.title, "background");
    }
}
