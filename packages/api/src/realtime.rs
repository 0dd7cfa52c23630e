//! Real-time job lifecycle events.

use queuectl_core::JobEvent;
use tokio::sync::broadcast;

use crate::Queuectl;

impl Queuectl {
    /// Subscribe to events from this facade and from the worker pools it started.
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_tx.subscribe()
    }
}

/// Format an event as one line of JSON, for log shipping or streaming.
pub fn format_event_line(event: &JobEvent) -> String {
    let json = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
    format!("{}\n", json)
}
