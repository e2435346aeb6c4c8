//! Structured events emitted on every (node, step) transition
//!
//! Sinks receive events from every node's worker thread concurrently, so
//! they must be `Sync`. Events for one node arrive in order.

use crate::record::RecordStatus;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// One status transition of a (node, step) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionEvent {
    pub at: DateTime<Utc>,
    pub node: String,
    pub step: String,
    pub status: RecordStatus,
    /// Try number the transition belongs to (0 before the first try)
    pub attempt: u32,
    pub error: Option<String>,
    /// Set when a retry has been scheduled after this transition
    pub retry_in: Option<Duration>,
}

impl ProvisionEvent {
    pub fn new(node: &str, step: &str, status: RecordStatus, attempt: u32) -> Self {
        Self {
            at: Utc::now(),
            node: node.to_string(),
            step: step.to_string(),
            status,
            attempt,
            error: None,
            retry_in: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_retry_in(mut self, delay: Duration) -> Self {
        self.retry_in = Some(delay);
        self
    }
}

/// Receiver of provisioning events
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &ProvisionEvent);
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn emit(&self, event: &ProvisionEvent) {
        (**self).emit(event);
    }
}

/// Discards events
pub struct NoEvents;

impl EventSink for NoEvents {
    fn emit(&self, _event: &ProvisionEvent) {}
}

/// Forwards events to the `log` facade
pub struct LogEvents;

impl EventSink for LogEvents {
    fn emit(&self, event: &ProvisionEvent) {
        match (event.status, &event.error) {
            (RecordStatus::Failed, Some(error)) => log::error!(
                "[{}] {} failed after {} attempt(s): {}",
                event.node,
                event.step,
                event.attempt,
                error
            ),
            (_, Some(error)) => match event.retry_in {
                Some(delay) => log::warn!(
                    "[{}] {} attempt {} failed: {} (retrying in {:?})",
                    event.node,
                    event.step,
                    event.attempt,
                    error,
                    delay
                ),
                None => log::warn!("[{}] {} {}: {}", event.node, event.step, event.status, error),
            },
            (RecordStatus::Running, None) => log::debug!(
                "[{}] {} attempt {}",
                event.node,
                event.step,
                event.attempt
            ),
            (status, None) => log::info!("[{}] {} {}", event.node, event.step, status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<ProvisionEvent>>);

    impl EventSink for Collect {
        fn emit(&self, event: &ProvisionEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    #[test]
    fn test_shared_sink_receives_events() {
        let sink = Arc::new(Collect(Mutex::new(Vec::new())));
        let shared: Box<dyn EventSink> = Box::new(Arc::clone(&sink));

        shared.emit(&ProvisionEvent::new("head", "install", RecordStatus::Running, 1));
        NoEvents.emit(&ProvisionEvent::new("head", "install", RecordStatus::Failed, 1));

        let seen = sink.0.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].step, "install");
    }

    #[test]
    fn test_event_serializes() {
        let event = ProvisionEvent::new("compute2", "exchange-keys", RecordStatus::Running, 2)
            .with_error("exit 255")
            .with_retry_in(Duration::from_secs(4));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["attempt"], 2);
        assert_eq!(json["error"], "exit 255");
        assert_eq!(json["retry_in"]["secs"], 4);
    }
}
