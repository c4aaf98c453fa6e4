pub mod reader;
pub mod session;

#[cfg(test)]
pub(crate) mod mock;

pub use session::{SerialSession, SerialSessionState};

use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use crate::config::SerialConfig;
use crate::error::IpcError;
use crate::ipc::channels::EventChannel;
use crate::ipc::events::EventRelay;
use reader::{spawn_reader_thread, ReaderContext};

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("Serial port is not connected")]
    NotConnected,

    #[error("No serial port found")]
    NoPortFound,

    #[error("Failed to open serial port {port}: {reason}")]
    Open { port: String, reason: String },

    #[error("Invalid serial state transition: {from:?} -> {to:?}")]
    InvalidTransition {
        from: SerialSessionState,
        to: SerialSessionState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialport error: {0}")]
    Port(#[from] serialport::Error),
}

impl From<SerialError> for IpcError {
    fn from(e: SerialError) -> Self {
        match e {
            SerialError::NotConnected => IpcError::NotConnected,
            other => IpcError::HostHandlerFailure(other.to_string()),
        }
    }
}

/// Acknowledgement for a completed write.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendAck {
    pub bytes_written: usize,
}

/// Everything the session pushes to the renderer.
#[derive(Debug, Clone, PartialEq)]
pub enum SerialEvent {
    DataReceived(String),
    StatusChanged(SerialSessionState),
    ErrorOccurred(String),
    DataSent(SendAck),
}

impl SerialEvent {
    pub fn channel(&self) -> EventChannel {
        match self {
            SerialEvent::DataReceived(_) => EventChannel::SerialDataReceived,
            SerialEvent::StatusChanged(_) => EventChannel::SerialPortStatus,
            SerialEvent::ErrorOccurred(_) => EventChannel::SerialPortError,
            SerialEvent::DataSent(_) => EventChannel::SerialDataSent,
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            SerialEvent::DataReceived(text) => Value::String(text.clone()),
            SerialEvent::StatusChanged(state) => {
                serde_json::to_value(state).unwrap_or(Value::Null)
            }
            SerialEvent::ErrorOccurred(reason) => Value::String(reason.clone()),
            SerialEvent::DataSent(ack) => serde_json::to_value(ack).unwrap_or(Value::Null),
        }
    }
}

pub(crate) fn publish(relay: &EventRelay, event: SerialEvent) {
    relay.emit_value(event.channel(), event.payload());
}

/// Settle the session into `Error(reason)` and tell the renderer.
///
/// With `Some(generation)`, a reader belonging to a replaced link is ignored.
pub(crate) fn report_failure(
    session: &Mutex<SerialSession>,
    relay: &EventRelay,
    generation: Option<u64>,
    reason: &str,
) {
    {
        let mut session = session.lock();
        if let Some(generation) = generation {
            if !session.is_current(generation) {
                return;
            }
        }
        if !session.fail(reason) {
            return;
        }
    }
    tracing::warn!("Serial session failed: {}", reason);
    publish(relay, SerialEvent::ErrorOccurred(reason.to_string()));
    publish(
        relay,
        SerialEvent::StatusChanged(SerialSessionState::Error(reason.to_string())),
    );
}

/// An opened port: reader half for the reader thread, writer half for `send_data`.
pub struct SerialLink {
    pub reader: Box<dyn Read + Send>,
    pub writer: Box<dyn Write + Send>,
    pub port_name: String,
}

/// Opens ports. Swapped out in tests.
pub trait PortConnector: Send + Sync {
    fn open(&self, config: &SerialConfig) -> Result<SerialLink, SerialError>;
}

/// Opens real devices through the `serialport` crate.
pub struct SystemPortConnector;

impl SystemPortConnector {
    fn detect_port() -> Result<String, SerialError> {
        let ports = serialport::available_ports()?;
        pick_port(&ports).ok_or(SerialError::NoPortFound)
    }
}

/// First USB port if there is one, otherwise the first port at all.
fn pick_port(ports: &[serialport::SerialPortInfo]) -> Option<String> {
    ports
        .iter()
        .find(|p| matches!(p.port_type, serialport::SerialPortType::UsbPort(_)))
        .or_else(|| ports.first())
        .map(|p| p.port_name.clone())
}

impl PortConnector for SystemPortConnector {
    fn open(&self, config: &SerialConfig) -> Result<SerialLink, SerialError> {
        let port_name = match &config.port_name {
            Some(name) => name.clone(),
            None => Self::detect_port()?,
        };

        let port = serialport::new(&port_name, config.baud_rate)
            .timeout(Duration::from_millis(config.read_timeout_ms))
            .open()
            .map_err(|e| SerialError::Open {
                port: port_name.clone(),
                reason: e.to_string(),
            })?;
        let reader = port.try_clone()?;

        Ok(SerialLink {
            reader: Box::new(reader),
            writer: Box::new(port),
            port_name,
        })
    }
}

/// Owns the one serial connection of the process.
///
/// Only this type changes `SerialSessionState`; the renderer sees it through
/// `status()` and `serial-port-status` events.
pub struct SerialManager {
    config: SerialConfig,
    connector: Arc<dyn PortConnector>,
    relay: Arc<EventRelay>,
    session: Arc<Mutex<SerialSession>>,
    /// Serializes reconnect/disconnect so two opens never interleave.
    connect_lock: Mutex<()>,
}

impl SerialManager {
    pub fn new(
        config: SerialConfig,
        connector: Arc<dyn PortConnector>,
        relay: Arc<EventRelay>,
    ) -> Self {
        Self {
            config,
            connector,
            relay,
            session: Arc::new(Mutex::new(SerialSession::new())),
            connect_lock: Mutex::new(()),
        }
    }

    /// Snapshot of the current state. No side effects.
    pub fn status(&self) -> SerialSessionState {
        self.session.lock().state().clone()
    }

    pub fn port_name(&self) -> Option<String> {
        self.session.lock().port_name().map(str::to_string)
    }

    /// (Re)open the port and settle into `Connected` or `Error`.
    pub fn reconnect(&self) -> Result<SerialSessionState, SerialError> {
        let _serialized = self.connect_lock.lock();

        if self.status().is_connected() {
            self.close_link(true);
        } else {
            // A failed link may still have a finished reader to reap.
            self.reap_reader();
        }

        self.session.lock().transition(SerialSessionState::Connecting)?;
        tracing::info!(
            "Opening serial port {} at {} baud",
            self.config.port_name.as_deref().unwrap_or("<auto>"),
            self.config.baud_rate
        );

        match self.connector.open(&self.config) {
            Ok(link) => self.attach_link(link),
            Err(e) => {
                tracing::error!("Serial open failed: {}", e);
                report_failure(&self.session, &self.relay, None, &e.to_string());
                Err(e)
            }
        }
    }

    fn attach_link(&self, link: SerialLink) -> Result<SerialSessionState, SerialError> {
        let SerialLink {
            reader,
            writer,
            port_name,
        } = link;

        let (generation, running) = {
            let mut session = self.session.lock();
            let armed = session.attach(port_name.clone(), writer);
            session.transition(SerialSessionState::Connected)?;
            armed
        };
        // Announce before the reader starts so a fast read failure cannot
        // produce an Error status ahead of Connected.
        publish(
            &self.relay,
            SerialEvent::StatusChanged(SerialSessionState::Connected),
        );

        let ctx = ReaderContext {
            session: Arc::clone(&self.session),
            relay: Arc::clone(&self.relay),
            running,
            generation,
            framing: self.config.framing,
            max_line_bytes: self.config.max_line_bytes,
            port_name: port_name.clone(),
        };
        match spawn_reader_thread(reader, ctx) {
            Ok(handle) => {
                self.session.lock().set_reader_handle(handle);
                tracing::info!("Serial port {} connected", port_name);
                Ok(self.status())
            }
            Err(e) => {
                report_failure(
                    &self.session,
                    &self.relay,
                    Some(generation),
                    &format!("Failed to start reader: {}", e),
                );
                Err(SerialError::Io(e))
            }
        }
    }

    /// Write `payload` to the device. Fails fast with `NotConnected` rather
    /// than queueing against a dead link.
    pub fn send_data(&self, payload: &[u8]) -> Result<SendAck, SerialError> {
        let (writer, generation) = {
            let session = self.session.lock();
            if !session.state().is_connected() {
                return Err(SerialError::NotConnected);
            }
            let writer = session.writer().ok_or(SerialError::NotConnected)?;
            (writer, session.generation())
        };

        let written = {
            let mut w = writer.lock();
            w.write_all(payload).and_then(|_| w.flush())
        };
        if let Err(e) = written {
            report_failure(
                &self.session,
                &self.relay,
                Some(generation),
                &format!("Write error: {}", e),
            );
            return Err(SerialError::Io(e));
        }

        let ack = SendAck {
            bytes_written: payload.len(),
        };
        tracing::debug!(bytes = ack.bytes_written, "Serial data sent");
        publish(&self.relay, SerialEvent::DataSent(ack.clone()));
        Ok(ack)
    }

    /// Close the port and settle into `Disconnected`.
    pub fn disconnect(&self) {
        let _serialized = self.connect_lock.lock();
        self.close_link(true);
    }

    fn close_link(&self, notify: bool) {
        let (handle, closed) = {
            let mut session = self.session.lock();
            let handle = session.detach();
            let closable = matches!(
                session.state(),
                SerialSessionState::Connected | SerialSessionState::Error(_)
            );
            let closed =
                closable && session.transition(SerialSessionState::Disconnected).is_ok();
            (handle, closed)
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
        if closed {
            tracing::info!("Serial port closed");
            if notify {
                publish(
                    &self.relay,
                    SerialEvent::StatusChanged(SerialSessionState::Disconnected),
                );
            }
        }
    }

    fn reap_reader(&self) {
        let handle = self.session.lock().detach();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for SerialManager {
    fn drop(&mut self) {
        self.close_link(false);
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockConnector;
    use super::*;
    use crate::ipc::channels::ChannelRegistry;
    use crossbeam_channel::{unbounded, Receiver};

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        manager: SerialManager,
        port: Arc<MockConnector>,
        relay: Arc<EventRelay>,
    }

    fn harness() -> Harness {
        let relay = Arc::new(EventRelay::new(Arc::new(ChannelRegistry::standard())));
        let port = MockConnector::new();
        let config = SerialConfig {
            port_name: Some("mock0".into()),
            ..SerialConfig::default()
        };
        let manager = SerialManager::new(
            config,
            Arc::clone(&port) as Arc<dyn PortConnector>,
            Arc::clone(&relay),
        );
        Harness {
            manager,
            port,
            relay,
        }
    }

    fn watch(relay: &EventRelay, name: &str) -> Receiver<Value> {
        let (tx, rx) = unbounded();
        relay.subscribe(name, move |args| {
            let _ = tx.send(args[0].clone());
        });
        rx
    }

    #[test]
    fn starts_disconnected() {
        let h = harness();
        assert_eq!(h.manager.status(), SerialSessionState::Disconnected);
        assert!(h.manager.port_name().is_none());
    }

    #[test]
    fn successful_reconnect_emits_one_connected_status() {
        let h = harness();
        let statuses = watch(&h.relay, "serial-port-status");

        let state = h.manager.reconnect().unwrap();
        assert_eq!(state, SerialSessionState::Connected);
        assert_eq!(h.manager.status(), SerialSessionState::Connected);
        assert_eq!(h.manager.port_name().as_deref(), Some("mock0"));

        let got: Vec<Value> = statuses.try_iter().collect();
        assert_eq!(got, vec![serde_json::json!({"state": "connected"})]);
    }

    #[test]
    fn send_while_disconnected_is_rejected_without_event() {
        let h = harness();
        let sent = watch(&h.relay, "serial-data-sent");

        let err = h.manager.send_data(b"x").unwrap_err();
        assert!(matches!(err, SerialError::NotConnected));
        assert_eq!(IpcError::from(err), IpcError::NotConnected);
        assert!(sent.try_recv().is_err());
        assert!(h.port.written().is_empty());
    }

    #[test]
    fn send_while_connected_writes_and_acks() {
        let h = harness();
        let sent = watch(&h.relay, "serial-data-sent");
        h.manager.reconnect().unwrap();

        let ack = h.manager.send_data(b"LED ON\n").unwrap();
        assert_eq!(ack, SendAck { bytes_written: 7 });
        assert_eq!(h.port.written(), b"LED ON\n".to_vec());
        assert_eq!(
            sent.recv_timeout(WAIT).unwrap(),
            serde_json::json!({"bytesWritten": 7})
        );
    }

    #[test]
    fn failed_open_settles_in_error_and_reports_it() {
        let h = harness();
        let statuses = watch(&h.relay, "serial-port-status");
        let errors = watch(&h.relay, "serial-port-error");
        h.port.fail_opens(Some("permission denied"));

        let err = h.manager.reconnect().unwrap_err();
        assert!(matches!(err, SerialError::Open { .. }));

        let reason = "Failed to open serial port mock0: permission denied".to_string();
        assert_eq!(h.manager.status(), SerialSessionState::Error(reason.clone()));
        assert_eq!(errors.try_recv().unwrap(), Value::String(reason.clone()));
        assert_eq!(
            statuses.try_recv().unwrap(),
            serde_json::json!({"state": "error", "reason": reason})
        );

        // Recoverable: the next reconnect goes Error -> Connecting -> Connected.
        h.port.fail_opens(None);
        assert_eq!(h.manager.reconnect().unwrap(), SerialSessionState::Connected);
        assert_eq!(h.port.open_count(), 2);
    }

    #[test]
    fn inbound_lines_are_pushed_as_events() {
        let h = harness();
        let data = watch(&h.relay, "serial-data-received");
        h.manager.reconnect().unwrap();

        h.port.push_inbound(b"temp=21.5\r\nhum");
        h.port.push_inbound(b"=40\n");

        assert_eq!(data.recv_timeout(WAIT).unwrap(), Value::from("temp=21.5"));
        assert_eq!(data.recv_timeout(WAIT).unwrap(), Value::from("hum=40"));
    }

    #[test]
    fn unplugged_device_moves_session_to_error() {
        let h = harness();
        let errors = watch(&h.relay, "serial-port-error");
        h.manager.reconnect().unwrap();

        h.port.unplug();
        assert_eq!(
            errors.recv_timeout(WAIT).unwrap(),
            Value::from("Serial port closed")
        );
        assert_eq!(
            h.manager.status(),
            SerialSessionState::Error("Serial port closed".into())
        );
        assert!(matches!(
            h.manager.send_data(b"x"),
            Err(SerialError::NotConnected)
        ));

        assert_eq!(h.manager.reconnect().unwrap(), SerialSessionState::Connected);
    }

    #[test]
    fn write_failure_moves_session_to_error() {
        let h = harness();
        h.manager.reconnect().unwrap();
        h.port.fail_writes(Some(std::io::ErrorKind::BrokenPipe));

        let err = h.manager.send_data(b"x").unwrap_err();
        assert!(matches!(err, SerialError::Io(_)));
        assert!(matches!(h.manager.status(), SerialSessionState::Error(_)));
    }

    #[test]
    fn reconnect_from_connected_cycles_through_disconnected() {
        let h = harness();
        h.manager.reconnect().unwrap();
        let statuses = watch(&h.relay, "serial-port-status");

        h.manager.reconnect().unwrap();
        let got: Vec<Value> = statuses.try_iter().collect();
        assert_eq!(
            got,
            vec![
                serde_json::json!({"state": "disconnected"}),
                serde_json::json!({"state": "connected"}),
            ]
        );

        // Data from the new link still flows.
        let data = watch(&h.relay, "serial-data-received");
        h.port.push_inbound(b"ok\n");
        assert_eq!(data.recv_timeout(WAIT).unwrap(), Value::from("ok"));
    }

    #[test]
    fn disconnect_closes_and_reports() {
        let h = harness();
        h.manager.reconnect().unwrap();
        let statuses = watch(&h.relay, "serial-port-status");

        h.manager.disconnect();
        assert_eq!(h.manager.status(), SerialSessionState::Disconnected);
        assert_eq!(
            statuses.try_recv().unwrap(),
            serde_json::json!({"state": "disconnected"})
        );

        // Closing an already closed session says nothing.
        h.manager.disconnect();
        assert!(statuses.try_recv().is_err());
    }

    #[test]
    fn status_query_has_no_side_effects() {
        let h = harness();
        let statuses = watch(&h.relay, "serial-port-status");
        for _ in 0..3 {
            assert_eq!(h.manager.status(), SerialSessionState::Disconnected);
        }
        assert!(statuses.try_recv().is_err());
        assert_eq!(h.port.open_count(), 0);
    }

    #[test]
    fn events_map_to_their_channels() {
        let ack = SendAck { bytes_written: 1 };
        assert_eq!(
            SerialEvent::DataReceived("x".into()).channel(),
            EventChannel::SerialDataReceived
        );
        assert_eq!(
            SerialEvent::StatusChanged(SerialSessionState::Connecting).channel(),
            EventChannel::SerialPortStatus
        );
        assert_eq!(
            SerialEvent::ErrorOccurred("x".into()).channel(),
            EventChannel::SerialPortError
        );
        assert_eq!(SerialEvent::DataSent(ack).channel(), EventChannel::SerialDataSent);
    }

    #[test]
    fn auto_detect_prefers_usb_then_first_port() {
        use serialport::{SerialPortInfo, SerialPortType, UsbPortInfo};

        let builtin = SerialPortInfo {
            port_name: "/dev/ttyS0".into(),
            port_type: SerialPortType::Unknown,
        };
        let usb = SerialPortInfo {
            port_name: "/dev/ttyUSB0".into(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid: 0x2341,
                pid: 0x0043,
                serial_number: None,
                manufacturer: Some("Arduino".into()),
                product: None,
            }),
        };

        assert_eq!(pick_port(&[builtin.clone(), usb]), Some("/dev/ttyUSB0".into()));
        assert_eq!(pick_port(&[builtin]), Some("/dev/ttyS0".into()));
        assert_eq!(pick_port(&[]), None);
    }
}
