//! Typed view of each invocation channel's arguments.
//!
//! The renderer sends an opaque argument list; `HostRequest::decode` turns it
//! into one variant per channel so host code never works on raw JSON.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::channels::InvokeChannel;
use crate::error::IpcError;
use crate::remote::{QueryRequest, UpdateRequest, UploadRequest};

/// `serial-send-data` accepts text or a byte array.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SerialPayload {
    Text(String),
    Bytes(Vec<u8>),
}

impl SerialPayload {
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            SerialPayload::Text(text) => text.into_bytes(),
            SerialPayload::Bytes(bytes) => bytes,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostRequest {
    GetUsers,
    InsertUser(Map<String, Value>),
    PostData(UploadRequest),
    UpdateData(UpdateRequest),
    GetDataByFilters(QueryRequest),
    DeleteData(QueryRequest),
    InsertData(UploadRequest),
    SerialSendData(SerialPayload),
    SerialGetStatus,
    SerialReconnect,
}

impl HostRequest {
    /// Decode `args` for `channel`. Extra trailing arguments are ignored.
    pub fn decode(channel: InvokeChannel, args: Vec<Value>) -> Result<Self, IpcError> {
        let request = match channel {
            InvokeChannel::GetUsers => HostRequest::GetUsers,
            InvokeChannel::InsertUser => HostRequest::InsertUser(first_arg(channel, args)?),
            InvokeChannel::PostData => HostRequest::PostData(first_arg(channel, args)?),
            InvokeChannel::UpdateData => HostRequest::UpdateData(first_arg(channel, args)?),
            InvokeChannel::GetDataByFilters => {
                HostRequest::GetDataByFilters(first_arg(channel, args)?)
            }
            InvokeChannel::DeleteData => HostRequest::DeleteData(first_arg(channel, args)?),
            InvokeChannel::InsertData => HostRequest::InsertData(first_arg(channel, args)?),
            InvokeChannel::SerialSendData => {
                HostRequest::SerialSendData(first_arg(channel, args)?)
            }
            InvokeChannel::SerialGetStatus => HostRequest::SerialGetStatus,
            InvokeChannel::SerialReconnect => HostRequest::SerialReconnect,
        };
        Ok(request)
    }
}

fn first_arg<T: DeserializeOwned>(channel: InvokeChannel, args: Vec<Value>) -> Result<T, IpcError> {
    let value = args
        .into_iter()
        .next()
        .ok_or_else(|| invalid(channel, "missing argument".to_string()))?;
    serde_json::from_value(value).map_err(|e| invalid(channel, e.to_string()))
}

fn invalid(channel: InvokeChannel, reason: String) -> IpcError {
    IpcError::InvalidArguments {
        channel: channel.as_str().to_string(),
        reason,
    }
}
