//! Fixed-capacity accumulation buffer for raw exposures.

use ringbuf::{ring_buffer::RbBase, HeapRb, Rb};
use std::fmt;

/// Holds the most recent raw spectra of a pixel and sums them on demand.
///
/// Pushing into a full integrator evicts the oldest spectrum.
pub struct RollingIntegrator {
    buffer: HeapRb<Vec<f64>>,
}

impl RollingIntegrator {
    /// Integrator holding at most `capacity` spectra (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: HeapRb::new(capacity.max(1)),
        }
    }

    /// Append a raw spectrum, evicting the oldest one when full.
    pub fn push(&mut self, spectrum: Vec<f64>) {
        self.buffer.push_overwrite(spectrum);
    }

    /// Elementwise sum of the stored spectra; empty when nothing is stored.
    ///
    /// Spectra of differing length are summed over their common prefix.
    pub fn reduce(&self) -> Vec<f64> {
        let mut spectra = self.buffer.iter();
        let Some(first) = spectra.next() else {
            return Vec::new();
        };

        let mut sum = first.clone();
        for spectrum in spectra {
            sum.truncate(spectrum.len());
            for (acc, value) in sum.iter_mut().zip(spectrum) {
                *acc += value;
            }
        }
        sum
    }

    /// Number of stored spectra.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no spectrum is stored.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns true once `capacity` spectra are stored.
    pub fn is_full(&self) -> bool {
        self.buffer.is_full()
    }

    /// Maximum number of stored spectra.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Drop every stored spectrum.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl fmt::Debug for RollingIntegrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RollingIntegrator")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}
