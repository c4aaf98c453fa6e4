use serde::ser::SerializeStruct;

/// Every way a renderer-initiated call can fail.
///
/// `RejectedChannel` is produced only at the gateway boundary. The other
/// variants come back from host handlers and reach the caller unmodified.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IpcError {
    #[error("Invalid channel: {0}")]
    RejectedChannel(String),

    #[error("Serial port is not connected")]
    NotConnected,

    #[error("{0}")]
    HostHandlerFailure(String),

    #[error("Request timed out: {0}")]
    TransportTimeout(String),

    #[error("Invalid arguments for '{channel}': {reason}")]
    InvalidArguments { channel: String, reason: String },

    #[error("No handler registered for '{0}'")]
    Unhandled(String),
}

impl IpcError {
    /// Stable discriminator sent to the renderer.
    pub fn kind(&self) -> &'static str {
        match self {
            IpcError::RejectedChannel(_) => "RejectedChannel",
            IpcError::NotConnected => "NotConnected",
            IpcError::HostHandlerFailure(_) => "HostHandlerFailure",
            IpcError::TransportTimeout(_) => "TransportTimeout",
            IpcError::InvalidArguments { .. } => "InvalidArguments",
            IpcError::Unhandled(_) => "Unhandled",
        }
    }
}

// Tauri commands need a serializable error; the renderer gets `{kind, message}`.
impl serde::Serialize for IpcError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("IpcError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

impl From<serde_json::Error> for IpcError {
    fn from(e: serde_json::Error) -> Self {
        IpcError::HostHandlerFailure(format!("JSON error: {}", e))
    }
}
