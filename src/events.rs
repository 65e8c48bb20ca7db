//! Scan notifications.
//!
//! The controller reports progress through an injected [`EventSink`] instead of a
//! process-wide notification centre. [`EventBus`] is the stock sink: a Tokio
//! `broadcast` channel that any number of observers can subscribe to, and through
//! which an "Interrupt acquisition" request can be sent back to the controller.
//!
//! # Data Flow
//!
//! ```text
//! ScanController --publish--> EventBus --broadcast--> GUI / storage / logger
//!        ^                                   |
//!        +------ InterruptRequested ---------+
//! ```
//!
//! Publishing never blocks and never fails; an event without subscribers is dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::trace;

use crate::measurement::{Background, DataPoint, ScanResult};

/// Event name of [`ScanEvent::BackgroundAcquired`].
pub const BACKGROUND_ACQUIRED: &str = "Background acquired";
/// Event name of [`ScanEvent::PointAcquired`].
pub const POINT_ACQUIRED: &str = "Single acquisition done";
/// Event name of [`ScanEvent::ScanFinished`].
pub const SCAN_FINISHED: &str = "Map acquisition done or interrupted.";
/// Event name of [`ScanEvent::InterruptRequested`].
pub const INTERRUPT_ACQUISITION: &str = "Interrupt acquisition";

/// Default number of envelopes buffered per subscriber.
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// How a scan ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanTermination {
    /// Every grid point was acquired
    Completed,
    /// Stopped early by an interrupt
    Interrupted,
    /// A collaborator failed; the result holds what was acquired before the failure
    Failed,
}

/// Notifications exchanged with the scan controller.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A new background replaced the stored one
    BackgroundAcquired {
        /// The new background
        background: Background,
    },
    /// One grid point was acquired
    PointAcquired {
        /// The new point
        point: DataPoint,
        /// Every point acquired so far, the new one included
        result: ScanResult,
    },
    /// The scan left the `Scanning` state
    ScanFinished {
        /// Final scan result
        result: ScanResult,
        /// Why the scan ended
        termination: ScanTermination,
    },
    /// Request to stop the running scan
    InterruptRequested,
}

impl ScanEvent {
    /// Notification name of this event.
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::BackgroundAcquired { .. } => BACKGROUND_ACQUIRED,
            ScanEvent::PointAcquired { .. } => POINT_ACQUIRED,
            ScanEvent::ScanFinished { .. } => SCAN_FINISHED,
            ScanEvent::InterruptRequested => INTERRUPT_ACQUISITION,
        }
    }

    /// Flat JSON payload for observers that do not link against this crate.
    pub fn payload(&self) -> Value {
        match self {
            ScanEvent::BackgroundAcquired { background } => json!({
                "title": background.title,
                "spectrum": background.spectrum,
            }),
            ScanEvent::PointAcquired { point, result } => json!({
                "point_x": point.x,
                "point_y": point.y,
                "spectrum": point.spectrum,
                "spectra": result.points(),
            }),
            ScanEvent::ScanFinished {
                result,
                termination,
            } => json!({
                "spectra": result.points(),
                "termination": termination,
            }),
            ScanEvent::InterruptRequested => json!({}),
        }
    }
}

/// A published event with its origin.
#[derive(Clone, Debug, Serialize)]
pub struct EventEnvelope {
    /// Name of the publisher
    pub source: String,
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// The event itself
    pub event: ScanEvent,
}

/// Destination for scan notifications.
///
/// Implementations must return promptly; the scan loop calls `publish` inline.
pub trait EventSink: Send + Sync {
    /// Deliver `event`, published by `source`.
    fn publish(&self, source: &str, event: ScanEvent);
}

/// Broadcast-backed [`EventSink`].
#[derive(Clone, Debug)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Bus buffering up to `capacity` envelopes per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Receive every envelope published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    /// Ask whoever listens for interrupts to stop the running scan.
    pub fn request_interrupt(&self, source: &str) {
        self.publish(source, ScanEvent::InterruptRequested);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl EventSink for EventBus {
    fn publish(&self, source: &str, event: ScanEvent) {
        let name = event.name();
        let envelope = EventEnvelope {
            source: source.to_string(),
            timestamp: Utc::now(),
            event,
        };
        if self.sender.send(envelope).is_err() {
            trace!(event = name, "No subscribers for event");
        }
    }
}
