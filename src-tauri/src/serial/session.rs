use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use super::SerialError;

/// Shared writer handle so `send_data` can write without holding the session lock.
pub type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Lifecycle of the single serial connection.
///
/// Serialized as `{"state": "connected"}` or
/// `{"state": "error", "reason": "..."}` for the renderer.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum SerialSessionState {
    Disconnected,
    Connecting,
    Connected,
    Error(String),
}

impl SerialSessionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, SerialSessionState::Connected)
    }

    /// The only edges the session may take.
    pub fn can_transition_to(&self, next: &SerialSessionState) -> bool {
        use SerialSessionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Error(_))
                | (Connected, Error(_))
                | (Error(_), Connecting)
                | (Connected, Disconnected)
                | (Error(_), Disconnected)
        )
    }
}

/// State plus the live link, shared between the manager and its reader thread.
pub struct SerialSession {
    state: SerialSessionState,
    port_name: Option<String>,
    writer: Option<SharedWriter>,
    /// Run flag of the current reader thread.
    running: Arc<AtomicBool>,
    reader_handle: Option<JoinHandle<()>>,
    /// Bumped on every attach so a stale reader can tell it no longer owns the link.
    generation: u64,
}

impl SerialSession {
    pub fn new() -> Self {
        Self {
            state: SerialSessionState::Disconnected,
            port_name: None,
            writer: None,
            running: Arc::new(AtomicBool::new(false)),
            reader_handle: None,
            generation: 0,
        }
    }

    pub fn state(&self) -> &SerialSessionState {
        &self.state
    }

    pub fn port_name(&self) -> Option<&str> {
        self.port_name.as_deref()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    pub fn writer(&self) -> Option<SharedWriter> {
        self.writer.as_ref().map(Arc::clone)
    }

    pub fn transition(&mut self, next: SerialSessionState) -> Result<(), SerialError> {
        if !self.state.can_transition_to(&next) {
            tracing::warn!("Refusing serial transition {:?} -> {:?}", self.state, next);
            return Err(SerialError::InvalidTransition {
                from: self.state.clone(),
                to: next,
            });
        }
        tracing::debug!("Serial state {:?} -> {:?}", self.state, next);
        self.state = next;
        Ok(())
    }

    /// Install a freshly opened link. Returns the new generation and the run
    /// flag the reader thread must poll.
    pub fn attach(&mut self, port_name: String, writer: Box<dyn Write + Send>) -> (u64, Arc<AtomicBool>) {
        self.generation += 1;
        self.port_name = Some(port_name);
        self.writer = Some(Arc::new(Mutex::new(writer)));
        self.running = Arc::new(AtomicBool::new(true));
        (self.generation, Arc::clone(&self.running))
    }

    pub fn set_reader_handle(&mut self, handle: JoinHandle<()>) {
        self.reader_handle = Some(handle);
    }

    /// Stop the reader and drop the writer. The caller joins the returned
    /// handle after releasing the session lock.
    pub fn detach(&mut self) -> Option<JoinHandle<()>> {
        self.running.store(false, Ordering::Release);
        self.writer = None;
        self.reader_handle.take()
    }

    /// Move into `Error(reason)` and release the link. Returns false when the
    /// current state cannot fail (nothing to report).
    pub fn fail(&mut self, reason: &str) -> bool {
        let next = SerialSessionState::Error(reason.to_string());
        if !self.state.can_transition_to(&next) {
            return false;
        }
        self.state = next;
        self.running.store(false, Ordering::Release);
        self.writer = None;
        true
    }
}

impl Default for SerialSession {
    fn default() -> Self {
        Self::new()
    }
}
