//! Host -> renderer event relay.
//!
//! Listeners are kept per channel in registration order. Emission takes a
//! snapshot of the current listeners and calls them on the emitting thread,
//! so a listener added after an emission never sees it (no replay).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

use super::channels::{ChannelRegistry, EventChannel};

/// Callback invoked with the emitted arguments, in order. Returning `false`
/// removes it.
pub type Listener = Arc<dyn Fn(&[Value]) -> bool + Send + Sync>;

/// Handle for removing a single registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
pub struct ListenerId(u64);

impl ListenerId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

pub struct EventRelay {
    registry: Arc<ChannelRegistry>,
    listeners: Mutex<HashMap<EventChannel, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
}

impl EventRelay {
    pub fn new(registry: Arc<ChannelRegistry>) -> Self {
        Self {
            registry,
            listeners: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register `callback` on `name`.
    ///
    /// Unknown names are logged and ignored; the caller gets `None` rather
    /// than an error so a stale subscription cannot take it down.
    pub fn subscribe<F>(&self, name: &str, callback: F) -> Option<ListenerId>
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.subscribe_while(name, move |args| {
            callback(args);
            true
        })
    }

    /// Like `subscribe`, but the listener is removed the first time
    /// `callback` returns `false` (e.g. its webview went away).
    pub fn subscribe_while<F>(&self, name: &str, callback: F) -> Option<ListenerId>
    where
        F: Fn(&[Value]) -> bool + Send + Sync + 'static,
    {
        let Some(channel) = self.registry.event_channel(name) else {
            tracing::warn!("Invalid receive channel: {}", name);
            return None;
        };

        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener: Listener = Arc::new(callback);
        self.listeners
            .lock()
            .entry(channel)
            .or_default()
            .push((id, listener));
        tracing::debug!(channel = %channel, listener = id.0, "Listener registered");
        Some(id)
    }

    /// Remove one registration. Returns whether it existed.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        for entries in listeners.values_mut() {
            if let Some(pos) = entries.iter().position(|(entry_id, _)| *entry_id == id) {
                entries.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drop every listener on `name`. No-op for names that are not event channels.
    pub fn unsubscribe_all(&self, name: &str) {
        if let Some(channel) = self.registry.event_channel(name) {
            let removed = self
                .listeners
                .lock()
                .remove(&channel)
                .map_or(0, |entries| entries.len());
            tracing::debug!(channel = %channel, removed, "Listeners removed");
        }
    }

    pub fn listener_count(&self, name: &str) -> usize {
        let Some(channel) = self.registry.event_channel(name) else {
            return 0;
        };
        self.listeners
            .lock()
            .get(&channel)
            .map_or(0, |entries| entries.len())
    }

    /// Deliver `args` to every listener currently registered on `channel`.
    /// Returns how many listeners were called.
    pub fn emit(&self, channel: EventChannel, args: Vec<Value>) -> usize {
        if !self.registry.is_subscribable(channel.as_str()) {
            tracing::debug!(channel = %channel, "Dropping event for channel outside registry");
            return 0;
        }

        // Snapshot so listeners can (un)subscribe re-entrantly.
        let snapshot: Vec<(ListenerId, Listener)> = match self.listeners.lock().get(&channel) {
            Some(entries) => entries
                .iter()
                .map(|(id, l)| (*id, Arc::clone(l)))
                .collect(),
            None => return 0,
        };

        for (id, listener) in &snapshot {
            if !listener(&args) {
                tracing::debug!(channel = %channel, listener = id.0, "Listener gone, removing");
                self.unsubscribe(*id);
            }
        }
        snapshot.len()
    }

    /// Convenience for the common single-payload case.
    pub fn emit_value(&self, channel: EventChannel, payload: Value) -> usize {
        self.emit(channel, vec![payload])
    }
}
