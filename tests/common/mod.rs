//! Shared helpers for integration tests.
#![allow(dead_code)]

use spectral_mapper::events::{EventSink, ScanEvent};
use spectral_mapper::hardware::mock::{MockSpectrometer, MockStage};
use spectral_mapper::hardware::TrimmedSpectrometer;
use spectral_mapper::scan::InterruptHandle;
use spectral_mapper::{ScanController, ScanOptions};
use std::sync::{Arc, Mutex, OnceLock};

/// Event sink that keeps every event and can interrupt the scan after N points.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<(String, ScanEvent)>>,
    interrupt_after: Option<usize>,
    handle: OnceLock<InterruptHandle>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interrupt synchronously when the `points`-th point event is published.
    pub fn interrupting_after(points: usize) -> Self {
        Self {
            interrupt_after: Some(points),
            ..Self::default()
        }
    }

    pub fn arm(&self, handle: InterruptHandle) {
        let _ = self.handle.set(handle);
    }

    pub fn events(&self) -> Vec<(String, ScanEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events()
            .iter()
            .filter(|(_, event)| event.name() == name)
            .count()
    }
}

impl EventSink for RecordingSink {
    fn publish(&self, source: &str, event: ScanEvent) {
        let is_point = matches!(event, ScanEvent::PointAcquired { .. });
        let points_seen = {
            let mut events = self.events.lock().unwrap();
            events.push((source.to_string(), event));
            events
                .iter()
                .filter(|(_, e)| matches!(e, ScanEvent::PointAcquired { .. }))
                .count()
        };

        if is_point && self.interrupt_after == Some(points_seen) {
            if let Some(handle) = self.handle.get() {
                handle.interrupt();
            }
        }
    }
}

pub type SimDetector = TrimmedSpectrometer<MockSpectrometer>;

/// Controller wired to the given sink and simulated hardware.
pub async fn controller_with(
    sink: Arc<dyn EventSink>,
    options: ScanOptions,
    stage: Arc<MockStage>,
    detector: Arc<SimDetector>,
) -> ScanController {
    let controller = ScanController::new(sink, options).unwrap();
    controller.connect_stage(stage).await.unwrap();
    controller.connect_detector(detector).await.unwrap();
    controller
}

pub fn detector(pixels: usize) -> Arc<SimDetector> {
    Arc::new(TrimmedSpectrometer::new(MockSpectrometer::new(pixels)))
}
