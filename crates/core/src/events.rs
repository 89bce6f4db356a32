//! The outbound event stream. Every state change the kernel performs
//! produces one [`Event`], tagged with a monotonic `event_number` assigned
//! before persistence so consumers observe a total order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The fixed catalog of event types the core emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    WorldInit,
    Action,
    ArtifactRead,
    ArtifactDeleted,
    InvokeSuccess,
    InvokeFailure,
    Thinking,
    ThinkingFailed,
    KernelQuery,
    MintSubmission,
    MintCancellation,
    MintAuctionResolved,
    AgentFrozen,
    AgentUnfrozen,
    LibraryInstalled,
    QuotaSet,
    WriteArtifactSuccess,
    EditArtifactSuccess,
    DeleteArtifactSuccess,
}

/// A structured event record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub event_number: u64,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
}

impl Event {
    pub fn new(event_type: EventType, event_number: u64, payload: Value) -> Self {
        Self {
            event_type,
            event_number,
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// External collaborator: something that durably records events. The core
/// never assumes a particular storage format — file-based logging and its
/// rotation are a host concern.
pub trait EventLogger: Send + Sync {
    fn log(&self, event: Event);
}

/// Reference implementation: discards every event. Useful for hosts/tests
/// that don't care about observability.
#[derive(Debug, Default)]
pub struct NullEventLogger;

impl EventLogger for NullEventLogger {
    fn log(&self, _event: Event) {}
}

/// Reference implementation: pushes events onto an unbounded channel for a
/// host task to drain (e.g. into a rotating file, as the real deployment
/// does outside this crate's scope).
#[derive(Debug, Clone)]
pub struct ChannelEventLogger {
    sender: tokio::sync::mpsc::UnboundedSender<Event>,
}

impl ChannelEventLogger {
    pub fn new() -> (Self, tokio::sync::mpsc::UnboundedReceiver<Event>) {
        let (sender, receiver) = tokio::sync::mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventLogger for ChannelEventLogger {
    fn log(&self, event: Event) {
        // A closed receiver just means the host stopped draining; losing
        // observability events is preferable to panicking the kernel.
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_logger_delivers_events_in_order() {
        let (logger, mut rx) = ChannelEventLogger::new();
        logger.log(Event::new(EventType::Action, 1, serde_json::json!({"a": 1})));
        logger.log(Event::new(EventType::Action, 2, serde_json::json!({"a": 2})));
        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        assert_eq!(first.event_number, 1);
        assert_eq!(second.event_number, 2);
    }
}
