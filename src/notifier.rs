//! Progress Notifier
//!
//! Fans pipeline progress out to any number of passive observers. Delivery
//! is best-effort: an observer that fails once is disconnected and never
//! retried. Emitting with no observers attached is a no-op.
//!
//! ## Events
//!
//! | Event | Data |
//! |-------|------|
//! | `analysis_started` | target, analysis type |
//! | `step_started` / `step_completed` | step, message, details |
//! | `file_started` / `file_completed` | file path |
//! | `vulnerability_found` | message, vulnerability |
//! | `analysis_completed` | summary |
//! | `analysis_failed` | error |

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::debug;

use crate::types::{Result, ScoutError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AnalysisStarted,
    StepStarted,
    StepCompleted,
    FileStarted,
    FileCompleted,
    VulnerabilityFound,
    AnalysisCompleted,
    AnalysisFailed,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AnalysisStarted => "analysis_started",
            Self::StepStarted => "step_started",
            Self::StepCompleted => "step_completed",
            Self::FileStarted => "file_started",
            Self::FileCompleted => "file_completed",
            Self::VulnerabilityFound => "vulnerability_found",
            Self::AnalysisCompleted => "analysis_completed",
            Self::AnalysisFailed => "analysis_failed",
        }
    }

    /// Terminal events close a session's stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AnalysisCompleted | Self::AnalysisFailed)
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub session_id: String,
    pub data: Value,
    /// RFC 3339
    pub timestamp: String,
}

impl ProgressEvent {
    pub fn new(session_id: impl Into<String>, kind: EventKind, data: Value) -> Self {
        Self {
            kind,
            session_id: session_id.into(),
            data,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// `data.<key>` as a string, if present
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

// =============================================================================
// Observers
// =============================================================================

/// Receives every emitted event. Returning an error disconnects the observer.
pub trait ProgressObserver: Send + Sync {
    fn notify(&self, event: &ProgressEvent) -> Result<()>;
}

/// Forwards events into an unbounded channel; fails once the receiver is gone
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender }
    }
}

impl ProgressObserver for ChannelObserver {
    fn notify(&self, event: &ProgressEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| ScoutError::pipeline("progress", "observer channel closed"))
    }
}

pub type ObserverId = u64;

// =============================================================================
// Notifier
// =============================================================================

pub struct ProgressNotifier {
    observers: DashMap<ObserverId, Arc<dyn ProgressObserver>>,
    next_id: AtomicU64,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier {
    pub fn new() -> Self {
        Self {
            observers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, observer: Arc<dyn ProgressObserver>) -> ObserverId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.insert(id, observer);
        id
    }

    pub fn unregister(&self, id: ObserverId) -> bool {
        self.observers.remove(&id).is_some()
    }

    /// Channel-backed observer; dropping the receiver disconnects it on the
    /// next emit
    pub fn subscribe(&self) -> (ObserverId, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.register(Arc::new(ChannelObserver::new(tx)));
        (id, rx)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn emit(&self, session_id: &str, kind: EventKind, data: Value) {
        if self.observers.is_empty() {
            return;
        }
        let event = ProgressEvent::new(session_id, kind, data);

        let failed: Vec<ObserverId> = self
            .observers
            .iter()
            .filter_map(|entry| match entry.value().notify(&event) {
                Ok(()) => None,
                Err(e) => {
                    debug!(observer = *entry.key(), error = %e, "Disconnecting progress observer");
                    Some(*entry.key())
                }
            })
            .collect();

        for id in failed {
            self.observers.remove(&id);
        }
    }
}

// =============================================================================
// Shared Instance
// =============================================================================

static NOTIFIER: RwLock<Option<Arc<ProgressNotifier>>> = RwLock::new(None);

/// The process-wide notifier, created empty on first use
pub fn notifier() -> Arc<ProgressNotifier> {
    {
        let slot = NOTIFIER.read().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = slot.as_ref() {
            return Arc::clone(existing);
        }
    }

    let mut slot = NOTIFIER.write().unwrap_or_else(|e| e.into_inner());
    Arc::clone(slot.get_or_insert_with(|| Arc::new(ProgressNotifier::new())))
}

pub fn install_notifier(notifier: ProgressNotifier) -> Arc<ProgressNotifier> {
    let notifier = Arc::new(notifier);
    let mut slot = NOTIFIER.write().unwrap_or_else(|e| e.into_inner());
    *slot = Some(Arc::clone(&notifier));
    notifier
}

pub fn reset_notifier() {
    let mut slot = NOTIFIER.write().unwrap_or_else(|e| e.into_inner());
    *slot = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recording(Mutex<Vec<EventKind>>);

    impl ProgressObserver for Recording {
        fn notify(&self, event: &ProgressEvent) -> Result<()> {
            self.0.lock().unwrap().push(event.kind);
            Ok(())
        }
    }

    struct Broken;

    impl ProgressObserver for Broken {
        fn notify(&self, _event: &ProgressEvent) -> Result<()> {
            Err(ScoutError::pipeline("progress", "socket closed"))
        }
    }

    #[test]
    fn test_emit_without_observers_is_noop() {
        let notifier = ProgressNotifier::new();
        notifier.emit("s1", EventKind::AnalysisStarted, json!({}));
        assert_eq!(notifier.observer_count(), 0);
    }

    #[test]
    fn test_failing_observer_is_removed_others_keep_receiving() {
        let notifier = ProgressNotifier::new();
        let recording = Arc::new(Recording(Mutex::new(Vec::new())));
        notifier.register(recording.clone());
        notifier.register(Arc::new(Broken));
        assert_eq!(notifier.observer_count(), 2);

        notifier.emit("s1", EventKind::StepStarted, json!({"step": "scan"}));
        assert_eq!(notifier.observer_count(), 1);

        notifier.emit("s1", EventKind::StepCompleted, json!({"step": "scan"}));
        assert_eq!(
            *recording.0.lock().unwrap(),
            vec![EventKind::StepStarted, EventKind::StepCompleted]
        );
    }

    #[tokio::test]
    async fn test_subscribe_receives_events_until_dropped() {
        let notifier = ProgressNotifier::new();
        let (_, mut rx) = notifier.subscribe();

        notifier.emit(
            "sess",
            EventKind::VulnerabilityFound,
            json!({"message": "Found high severity vulnerability"}),
        );
        let event = rx.recv().await.unwrap();
        assert_eq!(event.session_id, "sess");
        assert_eq!(event.field("message"), Some("Found high severity vulnerability"));

        drop(rx);
        notifier.emit("sess", EventKind::AnalysisCompleted, json!({}));
        assert_eq!(notifier.observer_count(), 0);
    }

    #[test]
    fn test_unregister() {
        let notifier = ProgressNotifier::new();
        let (id, _rx) = notifier.subscribe();
        assert!(notifier.unregister(id));
        assert!(!notifier.unregister(id));
    }

    #[test]
    fn test_event_serializes_type_name() {
        let event = ProgressEvent::new("s", EventKind::AnalysisFailed, json!({"error": "boom"}));
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "analysis_failed");
        assert!(EventKind::AnalysisFailed.is_terminal());
        assert!(!EventKind::FileStarted.is_terminal());
    }
}
