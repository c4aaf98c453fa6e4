//! In-memory port for exercising the serial session without hardware.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

use super::{PortConnector, SerialError, SerialLink};
use crate::config::SerialConfig;

pub struct MockConnector {
    open_error: Mutex<Option<String>>,
    write_error: Arc<Mutex<Option<io::ErrorKind>>>,
    inbound: Mutex<Option<Sender<Vec<u8>>>>,
    written: Arc<Mutex<Vec<u8>>>,
    opens: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            open_error: Mutex::new(None),
            write_error: Arc::new(Mutex::new(None)),
            inbound: Mutex::new(None),
            written: Arc::new(Mutex::new(Vec::new())),
            opens: AtomicUsize::new(0),
        })
    }

    /// Make subsequent opens fail with `reason`, or succeed again with `None`.
    pub fn fail_opens(&self, reason: Option<&str>) {
        *self.open_error.lock() = reason.map(str::to_string);
    }

    pub fn fail_writes(&self, kind: Option<io::ErrorKind>) {
        *self.write_error.lock() = kind;
    }

    /// Bytes arriving from the device.
    pub fn push_inbound(&self, bytes: &[u8]) {
        if let Some(tx) = self.inbound.lock().as_ref() {
            let _ = tx.send(bytes.to_vec());
        }
    }

    /// Simulate the device being unplugged: the reader sees EOF.
    pub fn unplug(&self) {
        self.inbound.lock().take();
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl PortConnector for MockConnector {
    fn open(&self, config: &SerialConfig) -> Result<SerialLink, SerialError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let port = config.port_name.clone().unwrap_or_else(|| "mock0".to_string());
        if let Some(reason) = self.open_error.lock().clone() {
            return Err(SerialError::Open { port, reason });
        }

        let (tx, rx) = unbounded();
        *self.inbound.lock() = Some(tx);
        Ok(SerialLink {
            reader: Box::new(ChannelReader {
                rx,
                pending: Vec::new(),
            }),
            writer: Box::new(SharedBuf {
                bytes: Arc::clone(&self.written),
                fail_with: Arc::clone(&self.write_error),
            }),
            port_name: port,
        })
    }
}

struct ChannelReader {
    rx: Receiver<Vec<u8>>,
    pending: Vec<u8>,
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pending.is_empty() {
            match self.rx.recv_timeout(Duration::from_millis(20)) {
                Ok(bytes) => self.pending = bytes,
                Err(RecvTimeoutError::Timeout) => {
                    return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"))
                }
                Err(RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.drain(..n);
        Ok(n)
    }
}

struct SharedBuf {
    bytes: Arc<Mutex<Vec<u8>>>,
    fail_with: Arc<Mutex<Option<io::ErrorKind>>>,
}

impl Write for SharedBuf {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(kind) = *self.fail_with.lock() {
            return Err(io::Error::new(kind, "device write failed"));
        }
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
