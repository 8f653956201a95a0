//! Broadcast of engine events for UI layers.

use std::collections::HashMap;

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Default broadcast channel capacity.
const DEFAULT_CAPACITY: usize = 256;

/// Something a UI may want to react to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// All preload fetches settled. Lists the resources that failed.
    PreloadComplete {
        /// Names of resources whose first fetch failed.
        failed: Vec<String>,
    },
    /// A check found the live file diverged from the snapshot.
    ChangesDetected {
        /// Number of divergent entries.
        count: usize,
    },
    /// A check could not be completed.
    CheckFailed {
        /// Backend error message.
        error: String,
    },
    /// A divergence was resolved.
    Reconciled {
        /// `restore_from_cache`, `restore_from_preset`, or `accept_external`.
        resolution: String,
    },
    /// Re-persisting the active preset failed. The live edit stands.
    PresetSyncFailed {
        /// Preset that could not be re-persisted.
        preset: String,
        /// Backend error message.
        error: String,
    },
    /// The active preset pointer moved.
    ActivePresetChanged {
        /// New active preset, `None` for the default configuration.
        active: Option<String>,
    },
}

impl SyncEvent {
    /// Wire tag of this event, as in its serialized `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PreloadComplete { .. } => "preload_complete",
            Self::ChangesDetected { .. } => "changes_detected",
            Self::CheckFailed { .. } => "check_failed",
            Self::Reconciled { .. } => "reconciled",
            Self::PresetSyncFailed { .. } => "preset_sync_failed",
            Self::ActivePresetChanged { .. } => "active_preset_changed",
        }
    }
}

/// Event fan-out to UI layers. Sending never blocks; slow receivers lag.
///
/// The latest event of each kind is retained so a view attached after
/// preload can render the current preload result and active preset without
/// waiting for the next change.
pub struct EventEmitter {
    tx: broadcast::Sender<SyncEvent>,
    latest: Mutex<HashMap<&'static str, SyncEvent>>,
}

impl EventEmitter {
    /// Create an emitter.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create an emitter whose receivers lag after `capacity` unread events.
    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            latest: Mutex::new(HashMap::new()),
        }
    }

    /// Publish to current subscribers and record it as the latest of its
    /// kind. Returns how many subscribers received it.
    pub fn emit(&self, event: SyncEvent) -> usize {
        let kind = event.kind();
        counter!("sync_events_total", "type" => kind).increment(1);
        let _ = self.latest.lock().insert(kind, event.clone());
        let delivered = self.tx.send(event).unwrap_or(0);
        trace!(kind, delivered, "sync event");
        delivered
    }

    /// Receive every event emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Most recent event of `kind`, if one was ever emitted.
    pub fn latest(&self, kind: &str) -> Option<SyncEvent> {
        self.latest.lock().get(kind).cloned()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emit_without_subscribers_still_records_latest() {
        let emitter = EventEmitter::new();
        assert_eq!(emitter.emit(SyncEvent::ChangesDetected { count: 1 }), 0);
        assert_eq!(
            emitter.latest("changes_detected"),
            Some(SyncEvent::ChangesDetected { count: 1 })
        );
        assert_eq!(emitter.latest("check_failed"), None);
    }

    #[test]
    fn latest_keeps_newest_per_kind() {
        let emitter = EventEmitter::new();
        let _ = emitter.emit(SyncEvent::ActivePresetChanged {
            active: Some("work".into()),
        });
        let _ = emitter.emit(SyncEvent::ChangesDetected { count: 3 });
        let _ = emitter.emit(SyncEvent::ActivePresetChanged { active: None });
        assert_eq!(
            emitter.latest("active_preset_changed"),
            Some(SyncEvent::ActivePresetChanged { active: None })
        );
        assert_eq!(
            emitter.latest("changes_detected"),
            Some(SyncEvent::ChangesDetected { count: 3 })
        );
    }

    #[tokio::test]
    async fn emit_and_receive() {
        let emitter = EventEmitter::new();
        let mut rx = emitter.subscribe();
        assert_eq!(emitter.emit(SyncEvent::CheckFailed { error: "x".into() }), 1);
        assert_eq!(rx.recv().await.unwrap(), SyncEvent::CheckFailed { error: "x".into() });
    }

    #[tokio::test]
    async fn slow_receiver_lags() {
        let emitter = EventEmitter::with_capacity(2);
        let mut rx = emitter.subscribe();
        for count in 0..3 {
            let _ = emitter.emit(SyncEvent::ChangesDetected { count });
        }
        assert!(matches!(
            rx.recv().await,
            Err(broadcast::error::RecvError::Lagged(1))
        ));
    }

    #[test]
    fn kind_matches_serialized_tag() {
        let events = [
            SyncEvent::PreloadComplete { failed: Vec::new() },
            SyncEvent::CheckFailed { error: "x".into() },
            SyncEvent::PresetSyncFailed {
                preset: "work".into(),
                error: "locked".into(),
            },
            SyncEvent::ActivePresetChanged { active: None },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.kind());
        }
    }
}
