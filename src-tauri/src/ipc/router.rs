use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::channels::{EventChannel, InvokeChannel};
use super::events::EventRelay;
use super::gateway::HostHandler;
use super::payloads::HostRequest;
use crate::error::IpcError;
use crate::remote::RemoteDataClient;
use crate::serial::SerialManager;
use crate::store::UserStore;

/// The privileged side of every invocation channel.
pub struct HostRouter {
    serial: Arc<SerialManager>,
    remote: Arc<RemoteDataClient>,
    users: Arc<UserStore>,
    relay: Arc<EventRelay>,
}

impl HostRouter {
    pub fn new(
        serial: Arc<SerialManager>,
        remote: Arc<RemoteDataClient>,
        users: Arc<UserStore>,
        relay: Arc<EventRelay>,
    ) -> Self {
        Self {
            serial,
            remote,
            users,
            relay,
        }
    }

    /// Serial I/O blocks on the port; keep it off the async workers.
    async fn blocking<T, F>(&self, f: F) -> Result<T, IpcError>
    where
        F: FnOnce(&SerialManager) -> Result<T, crate::serial::SerialError> + Send + 'static,
        T: Send + 'static,
    {
        let serial = Arc::clone(&self.serial);
        tokio::task::spawn_blocking(move || f(&serial))
            .await
            .map_err(|e| IpcError::HostHandlerFailure(format!("Serial task failed: {}", e)))?
            .map_err(IpcError::from)
    }

    fn announce_insert(&self, record: &Value) {
        self.relay
            .emit_value(EventChannel::DatabaseInsertSuccess, record.clone());
    }
}

#[async_trait]
impl HostHandler for HostRouter {
    async fn handle(&self, channel: InvokeChannel, args: Vec<Value>) -> Result<Value, IpcError> {
        match HostRequest::decode(channel, args)? {
            HostRequest::GetUsers => Ok(Value::Array(self.users.all())),
            HostRequest::InsertUser(record) => {
                let stored = self.users.insert(record)?;
                self.announce_insert(&stored);
                Ok(stored)
            }
            HostRequest::PostData(request) => Ok(self.remote.upload(&request).await?),
            HostRequest::InsertData(request) => {
                let response = self.remote.upload(&request).await?;
                if response.get("success").and_then(Value::as_bool) == Some(true) {
                    self.announce_insert(&serde_json::to_value(&request)?);
                }
                Ok(response)
            }
            HostRequest::UpdateData(request) => Ok(self.remote.update(&request).await?),
            HostRequest::GetDataByFilters(request) => Ok(self.remote.query(&request).await?),
            HostRequest::DeleteData(request) => Ok(self.remote.delete(&request).await?),
            HostRequest::SerialSendData(payload) => {
                let bytes = payload.into_bytes();
                let ack = self.blocking(move |serial| serial.send_data(&bytes)).await?;
                Ok(serde_json::to_value(ack)?)
            }
            HostRequest::SerialGetStatus => Ok(serde_json::to_value(self.serial.status())?),
            HostRequest::SerialReconnect => {
                let state = self.blocking(|serial| serial.reconnect()).await?;
                Ok(serde_json::to_value(state)?)
            }
        }
    }
}
