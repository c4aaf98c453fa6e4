//! Channel names that may cross from the renderer into the host.
//!
//! The two sets are fixed when the registry is built and the registry exposes
//! no way to add or remove names afterwards. Everything else in the bridge asks
//! the registry before forwarding or registering anything.

use std::collections::HashMap;
use std::fmt;

/// Request/response channels. Renderer -> Host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(into = "&'static str")]
pub enum InvokeChannel {
    GetUsers,
    InsertUser,
    PostData,
    UpdateData,
    GetDataByFilters,
    DeleteData,
    InsertData,
    SerialSendData,
    SerialGetStatus,
    SerialReconnect,
}

impl InvokeChannel {
    pub const ALL: [InvokeChannel; 10] = [
        InvokeChannel::GetUsers,
        InvokeChannel::InsertUser,
        InvokeChannel::PostData,
        InvokeChannel::UpdateData,
        InvokeChannel::GetDataByFilters,
        InvokeChannel::DeleteData,
        InvokeChannel::InsertData,
        InvokeChannel::SerialSendData,
        InvokeChannel::SerialGetStatus,
        InvokeChannel::SerialReconnect,
    ];

    /// Wire name, case-sensitive.
    pub const fn as_str(self) -> &'static str {
        match self {
            InvokeChannel::GetUsers => "get-users",
            InvokeChannel::InsertUser => "insert-user",
            InvokeChannel::PostData => "post-data",
            InvokeChannel::UpdateData => "update-data",
            InvokeChannel::GetDataByFilters => "get-data-by-filters",
            InvokeChannel::DeleteData => "delete-data",
            InvokeChannel::InsertData => "insert-data",
            InvokeChannel::SerialSendData => "serial-send-data",
            InvokeChannel::SerialGetStatus => "serial-get-status",
            InvokeChannel::SerialReconnect => "serial-reconnect",
        }
    }
}

impl From<InvokeChannel> for &'static str {
    fn from(channel: InvokeChannel) -> Self {
        channel.as_str()
    }
}

impl fmt::Display for InvokeChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Push-only channels. Host -> Renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(into = "&'static str")]
pub enum EventChannel {
    /// Payload: inbound text from the serial device.
    SerialDataReceived,
    /// Payload: `SerialSessionState`.
    SerialPortStatus,
    /// Payload: error reason string.
    SerialPortError,
    /// Payload: `SendAck`.
    SerialDataSent,
    /// Payload: the record that was stored.
    DatabaseInsertSuccess,
}

impl EventChannel {
    pub const ALL: [EventChannel; 5] = [
        EventChannel::SerialDataReceived,
        EventChannel::SerialPortStatus,
        EventChannel::SerialPortError,
        EventChannel::SerialDataSent,
        EventChannel::DatabaseInsertSuccess,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            EventChannel::SerialDataReceived => "serial-data-received",
            EventChannel::SerialPortStatus => "serial-port-status",
            EventChannel::SerialPortError => "serial-port-error",
            EventChannel::SerialDataSent => "serial-data-sent",
            EventChannel::DatabaseInsertSuccess => "database-insert-success",
        }
    }
}

impl From<EventChannel> for &'static str {
    fn from(channel: EventChannel) -> Self {
        channel.as_str()
    }
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable whitelist of invocable and subscribable names.
///
/// Built once at startup and shared behind an `Arc`; the gateway and relay
/// receive it as a dependency instead of reading ambient state.
#[derive(Debug, Clone)]
pub struct ChannelRegistry {
    invoke: HashMap<&'static str, InvokeChannel>,
    events: HashMap<&'static str, EventChannel>,
}

impl ChannelRegistry {
    /// The full production surface.
    pub fn standard() -> Self {
        Self::with_channels(&InvokeChannel::ALL, &EventChannel::ALL)
    }

    /// A narrower surface, e.g. a build that ships without the remote client.
    pub fn with_channels(invoke: &[InvokeChannel], events: &[EventChannel]) -> Self {
        Self {
            invoke: invoke.iter().map(|c| (c.as_str(), *c)).collect(),
            events: events.iter().map(|c| (c.as_str(), *c)).collect(),
        }
    }

    pub fn is_invocable(&self, name: &str) -> bool {
        self.invoke.contains_key(name)
    }

    pub fn is_subscribable(&self, name: &str) -> bool {
        self.events.contains_key(name)
    }

    pub fn invoke_channel(&self, name: &str) -> Option<InvokeChannel> {
        self.invoke.get(name).copied()
    }

    pub fn event_channel(&self, name: &str) -> Option<EventChannel> {
        self.events.get(name).copied()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
