//! Debounced comparison of the live configuration file against the snapshot.
//!
//! Every [`ChangeDetector::trigger`] restarts a single-shot timer. Only the
//! last trigger in a burst reaches the backend; callers of
//! [`ChangeDetector::check_changes`] whose trigger was coalesced into a later
//! one resolve when that later check completes.
//!
//! ```text
//! Idle ──trigger──▶ Debouncing ──timer──▶ Checking ──▶ Idle
//!                      ▲  │ trigger resets the timer
//!                      └──┘
//! ```
//!
//! A trigger that arrives while a check is running schedules a new
//! debounce. Checks themselves never overlap.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use omo_core::ConfigChange;
use omo_rpc::Backend;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::events::{EventEmitter, SyncEvent};

/// Where the detector is in its cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectorPhase {
    /// Nothing scheduled.
    #[default]
    Idle,
    /// Waiting for the debounce timer.
    Debouncing,
    /// A backend comparison is running or queued.
    Checking,
}

/// Observable detector state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectorState {
    /// Current phase.
    pub phase: DetectorPhase,
    /// Divergence reported by the last completed check.
    pub changes: Vec<ConfigChange>,
    /// Set when the last check could not be completed.
    pub error: Option<String>,
    /// The user closed the alert for the current divergence.
    pub dismissed: bool,
    /// When the last successful check finished.
    pub last_checked: Option<DateTime<Utc>>,
}

impl DetectorState {
    /// Whether the last diff was non-empty.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Whether the UI should show the divergence alert.
    pub fn should_alert(&self) -> bool {
        self.has_changes() && !self.dismissed
    }
}

/// Result of one debounced check.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Checked, no divergence.
    #[default]
    Clean,
    /// Checked, this many divergent entries.
    Diverged(usize),
    /// Could not check.
    Failed(String),
}

#[derive(Default)]
struct Slot {
    generation: u64,
    pending: Option<JoinHandle<()>>,
    checks: usize,
}

impl Slot {
    fn phase(&self) -> DetectorPhase {
        if self.checks > 0 {
            DetectorPhase::Checking
        } else if self.pending.is_some() {
            DetectorPhase::Debouncing
        } else {
            DetectorPhase::Idle
        }
    }
}

struct Inner {
    backend: Arc<dyn Backend>,
    debounce: Duration,
    state: watch::Sender<DetectorState>,
    slot: Mutex<Slot>,
    completed: watch::Sender<(u64, CheckOutcome)>,
    check_lock: tokio::sync::Mutex<()>,
    events: Arc<EventEmitter>,
}

/// Debounced change detector.
pub struct ChangeDetector {
    inner: Arc<Inner>,
}

impl ChangeDetector {
    /// Create an idle detector. Triggers must happen inside a tokio runtime.
    pub fn new(backend: Arc<dyn Backend>, debounce: Duration, events: Arc<EventEmitter>) -> Self {
        let (state, _) = watch::channel(DetectorState::default());
        let (completed, _) = watch::channel((0, CheckOutcome::Clean));
        Self {
            inner: Arc::new(Inner {
                backend,
                debounce,
                state,
                slot: Mutex::new(Slot::default()),
                completed,
                check_lock: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    /// Debounce interval.
    pub fn debounce(&self) -> Duration {
        self.inner.debounce
    }

    /// Restart the debounce timer without waiting for the check.
    pub fn trigger(&self) {
        let _ = self.schedule();
    }

    /// Restart the debounce timer and wait for the check that eventually
    /// runs.
    #[instrument(skip(self))]
    pub async fn check_changes(&self) -> CheckOutcome {
        let generation = self.schedule();
        let mut rx = self.inner.completed.subscribe();
        // Bound so the `watch::Ref` drops before `rx`.
        let outcome = match rx.wait_for(|(done, _)| *done >= generation).await {
            Ok(done) => done.1.clone(),
            Err(_) => CheckOutcome::Failed("change detector stopped".into()),
        };
        outcome
    }

    /// Current state.
    pub fn state(&self) -> DetectorState {
        self.inner.state.borrow().clone()
    }

    /// Divergence from the last completed check.
    pub fn changes(&self) -> Vec<ConfigChange> {
        self.inner.state.borrow().changes.clone()
    }

    /// Whether the last completed check found a divergence.
    pub fn has_changes(&self) -> bool {
        self.inner.state.borrow().has_changes()
    }

    /// Current phase.
    pub fn phase(&self) -> DetectorPhase {
        self.inner.slot.lock().phase()
    }

    /// Watch every state change.
    pub fn subscribe(&self) -> watch::Receiver<DetectorState> {
        self.inner.state.subscribe()
    }

    /// Close the alert for the current divergence.
    pub fn dismiss(&self) {
        self.inner.state.send_modify(|s| s.dismissed = true);
    }

    /// Record that the snapshot now matches the accepted configuration.
    pub(crate) fn mark_clean(&self) {
        self.inner.state.send_modify(|s| {
            s.changes.clear();
            s.error = None;
            s.dismissed = false;
        });
    }

    fn schedule(&self) -> u64 {
        let mut slot = self.inner.slot.lock();
        slot.generation += 1;
        let generation = slot.generation;
        if let Some(previous) = slot.pending.take() {
            debug!(generation, "debounce reset");
            previous.abort();
        }
        let inner = Arc::clone(&self.inner);
        slot.pending = Some(tokio::spawn(async move { inner.fire(generation).await }));
        self.inner.publish_phase(&slot);
        generation
    }
}

impl Drop for ChangeDetector {
    fn drop(&mut self) {
        if let Some(pending) = self.inner.slot.lock().pending.take() {
            pending.abort();
        }
    }
}

impl Inner {
    fn publish_phase(&self, slot: &Slot) {
        let phase = slot.phase();
        let _ = self.state.send_if_modified(|s| {
            let changed = s.phase != phase;
            s.phase = phase;
            changed
        });
    }

    async fn fire(self: Arc<Self>, generation: u64) {
        tokio::time::sleep(self.debounce).await;
        {
            let mut slot = self.slot.lock();
            if slot.generation != generation {
                return;
            }
            slot.pending = None;
            slot.checks += 1;
            self.publish_phase(&slot);
        }

        let outcome = {
            let _serial = self.check_lock.lock().await;
            self.check().await
        };

        self.completed.send_modify(|(done, last)| {
            if generation > *done {
                *done = generation;
                *last = outcome;
            }
        });
        let mut slot = self.slot.lock();
        slot.checks -= 1;
        self.publish_phase(&slot);
    }

    async fn compare(&self) -> omo_rpc::Result<Vec<ConfigChange>> {
        let created = self.backend.ensure_snapshot_exists().await?;
        if created {
            debug!("created initial snapshot");
        }
        self.backend.compare_with_snapshot().await
    }

    async fn check(&self) -> CheckOutcome {
        match self.compare().await {
            Ok(changes) => {
                let count = changes.len();
                self.state.send_modify(|s| {
                    if s.changes != changes {
                        s.dismissed = false;
                    }
                    s.changes = changes;
                    s.error = None;
                    s.last_checked = Some(Utc::now());
                });
                if count == 0 {
                    CheckOutcome::Clean
                } else {
                    debug!(count, "configuration diverged from snapshot");
                    let _ = self.events.emit(SyncEvent::ChangesDetected { count });
                    CheckOutcome::Diverged(count)
                }
            }
            Err(err) => {
                warn!(error = %err, "change check failed");
                let message = err.to_string();
                self.state.send_modify(|s| {
                    s.changes.clear();
                    s.error = Some(message.clone());
                });
                let _ = self.events.emit(SyncEvent::CheckFailed {
                    error: message.clone(),
                });
                CheckOutcome::Failed(message)
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
