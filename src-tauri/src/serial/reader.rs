use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::session::SerialSession;
use super::{publish, report_failure, SerialEvent};
use crate::config::Framing;
use crate::ipc::events::EventRelay;

/// Everything the reader thread needs besides the port itself.
pub struct ReaderContext {
    pub session: Arc<Mutex<SerialSession>>,
    pub relay: Arc<EventRelay>,
    pub running: Arc<AtomicBool>,
    pub generation: u64,
    pub framing: Framing,
    pub max_line_bytes: usize,
    pub port_name: String,
}

/// Splits a byte stream into text frames.
pub struct Framer {
    framing: Framing,
    pending: Vec<u8>,
    /// A line that grows past this is flushed as-is.
    max_line_bytes: usize,
}

impl Framer {
    pub fn new(framing: Framing, max_line_bytes: usize) -> Self {
        Self {
            framing,
            pending: Vec::new(),
            max_line_bytes: max_line_bytes.max(1),
        }
    }

    /// Feed bytes, get back every frame they complete.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        match self.framing {
            Framing::Raw => {
                if bytes.is_empty() {
                    Vec::new()
                } else {
                    vec![String::from_utf8_lossy(bytes).into_owned()]
                }
            }
            Framing::Lines => {
                self.pending.extend_from_slice(bytes);
                let mut frames = Vec::new();
                while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
                    let mut line: Vec<u8> = self.pending.drain(..=pos).collect();
                    line.pop();
                    if line.last() == Some(&b'\r') {
                        line.pop();
                    }
                    if !line.is_empty() {
                        frames.push(String::from_utf8_lossy(&line).into_owned());
                    }
                }
                while self.pending.len() >= self.max_line_bytes {
                    tracing::warn!(
                        limit = self.max_line_bytes,
                        "Serial line exceeds limit without newline, flushing"
                    );
                    let chunk: Vec<u8> = self.pending.drain(..self.max_line_bytes).collect();
                    frames.push(String::from_utf8_lossy(&chunk).into_owned());
                }
                frames
            }
        }
    }
}

/// Spawn the reader thread for one link.
///
/// Reads until the run flag drops, the port hits EOF, or a read fails. Read
/// timeouts are expected (the port is opened with a short timeout so the
/// flag gets polled) and are not errors.
pub fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    ctx: ReaderContext,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name(format!("serial-reader-{}", ctx.port_name))
        .spawn(move || {
            let mut framer = Framer::new(ctx.framing, ctx.max_line_bytes);
            let mut buf = [0u8; 1024];

            while ctx.running.load(Ordering::Acquire) {
                match reader.read(&mut buf) {
                    Ok(0) => {
                        tracing::info!("Serial port {} closed by device", ctx.port_name);
                        if ctx.running.load(Ordering::Acquire) {
                            report_failure(
                                &ctx.session,
                                &ctx.relay,
                                Some(ctx.generation),
                                "Serial port closed",
                            );
                        }
                        break;
                    }
                    Ok(n) => {
                        for frame in framer.push(&buf[..n]) {
                            tracing::debug!(port = %ctx.port_name, bytes = frame.len(), "Serial data received");
                            publish(&ctx.relay, SerialEvent::DataReceived(frame));
                        }
                    }
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        if ctx.running.load(Ordering::Acquire) {
                            tracing::error!("Serial read error on {}: {}", ctx.port_name, e);
                            report_failure(
                                &ctx.session,
                                &ctx.relay,
                                Some(ctx.generation),
                                &format!("Read error: {}", e),
                            );
                        }
                        break;
                    }
                }
            }
            tracing::debug!("Serial reader for {} exiting", ctx.port_name);
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMIT: usize = 4096;

    #[test]
    fn lines_are_split_and_carriage_returns_stripped() {
        let mut framer = Framer::new(Framing::Lines, LIMIT);
        assert_eq!(framer.push(b"hello\r\nwor"), vec!["hello".to_string()]);
        assert_eq!(framer.push(b"ld\n"), vec!["world".to_string()]);
    }

    #[test]
    fn empty_lines_are_dropped() {
        let mut framer = Framer::new(Framing::Lines, LIMIT);
        assert_eq!(framer.push(b"\r\n\nT=21.5\n\n"), vec!["T=21.5".to_string()]);
    }

    #[test]
    fn several_lines_in_one_chunk_keep_order() {
        let mut framer = Framer::new(Framing::Lines, LIMIT);
        assert_eq!(
            framer.push(b"a\nb\nc\npartial"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert_eq!(framer.push(b"\n"), vec!["partial".to_string()]);
    }

    #[test]
    fn raw_framing_passes_chunks_through() {
        let mut framer = Framer::new(Framing::Raw, LIMIT);
        assert_eq!(framer.push(b"ab\r\ncd"), vec!["ab\r\ncd".to_string()]);
        assert!(framer.push(b"").is_empty());
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut framer = Framer::new(Framing::Lines, LIMIT);
        let frames = framer.push(&[0x66, 0xff, 0x6f, b'\n']);
        assert_eq!(frames, vec!["f\u{fffd}o".to_string()]);
    }

    #[test]
    fn runaway_line_is_flushed_at_the_limit() {
        let mut framer = Framer::new(Framing::Lines, 8);
        assert!(framer.push(b"abcde").is_empty());
        assert_eq!(framer.push(b"fghijk"), vec!["abcdefgh".to_string()]);
        assert_eq!(framer.pending, b"ijk".to_vec());
        assert_eq!(framer.push(b"\n"), vec!["ijk".to_string()]);
    }

    #[test]
    fn buffer_stays_bounded_without_newlines() {
        let mut framer = Framer::new(Framing::Lines, LIMIT);
        let chunk = [b'x'; 1024];
        let mut flushed = 0;
        for _ in 0..10_000 {
            flushed += framer.push(&chunk).len();
            assert!(framer.pending.len() < LIMIT);
        }
        assert_eq!(flushed, 10_000 * 1024 / LIMIT);
    }
}
