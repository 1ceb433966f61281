//! Per-run progress channels and the registry pollers read from.
//!
//! Each run owns one unbounded mpsc channel. The controller holds the
//! [`ProgressSender`]; the registry keeps the receiving end keyed by run id so
//! the HTTP layer can drain whatever has been queued since the last poll.
//! Draining is non-blocking and destructive: an event is handed out at most
//! once.
//!
//! The registry is bounded two ways:
//! - entries untouched (created or drained) for longer than the TTL are evicted
//! - when full, creating a new entry evicts the least recently touched one

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::debug;

use super::models::{ProgressEvent, RunStage};
use crate::config::ServerConfig;

/// Producing end of a run's progress channel.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    run_id: String,
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressSender {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Queue an event. Delivery is best-effort: an evicted or dropped
    /// receiver silently discards it.
    pub fn emit(&self, event: ProgressEvent) {
        if self.tx.send(event).is_err() {
            debug!(run_id = %self.run_id, "Progress receiver gone, dropping event");
        }
    }

    pub fn send(&self, stage: RunStage, message: impl Into<String>) {
        self.emit(ProgressEvent::new(stage, message));
    }
}

/// Consuming end of a run's progress channel.
#[derive(Debug)]
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl ProgressReceiver {
    /// Take every event queued so far without waiting.
    pub fn drain(&mut self) -> Vec<ProgressEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event; `None` once every sender is dropped.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

/// Create a standalone progress channel for `run_id`.
pub fn channel(run_id: impl Into<String>) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        ProgressSender {
            run_id: run_id.into(),
            tx,
        },
        ProgressReceiver { rx },
    )
}

struct Entry {
    receiver: ProgressReceiver,
    last_activity: Instant,
}

/// Concurrency-safe run-id to progress-channel map with TTL and capacity
/// eviction.
pub struct ProgressRegistry {
    entries: Mutex<HashMap<String, Entry>>,
    ttl: Duration,
    capacity: usize,
}

impl ProgressRegistry {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(config.progress_ttl(), config.progress_capacity)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn evict_expired(&self, entries: &mut HashMap<String, Entry>, now: Instant) {
        let before = entries.len();
        entries.retain(|_, entry| now.duration_since(entry.last_activity) < self.ttl);
        let evicted = before - entries.len();
        if evicted > 0 {
            debug!(evicted, "Evicted expired progress channels");
        }
    }

    /// Register a fresh channel for `run_id`, replacing any previous one.
    pub fn create(&self, run_id: &str) -> ProgressSender {
        let (sender, receiver) = channel(run_id);
        let now = Instant::now();
        let mut entries = self.lock();
        self.evict_expired(&mut entries, now);

        if !entries.contains_key(run_id) && entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, entry)| entry.last_activity)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!(run_id = %oldest, "Progress registry full, evicting oldest channel");
                entries.remove(&oldest);
            }
        }

        entries.insert(
            run_id.to_string(),
            Entry {
                receiver,
                last_activity: now,
            },
        );
        sender
    }

    /// Drain every event queued for `run_id` since the last poll.
    /// Returns `None` for unknown or evicted ids.
    pub fn drain(&self, run_id: &str) -> Option<Vec<ProgressEvent>> {
        let now = Instant::now();
        let mut entries = self.lock();
        self.evict_expired(&mut entries, now);
        let entry = entries.get_mut(run_id)?;
        entry.last_activity = now;
        Some(entry.receiver.drain())
    }

    pub fn contains(&self, run_id: &str) -> bool {
        self.lock().contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
