//! HTTP conduit to the remote inventory API.
//!
//! The bridge does not shape these payloads. It forwards them and turns the
//! server's answer into either the body or an `IpcError`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::{StatusCode, Url};
use serde::de::{Deserializer, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::config::RemoteConfig;
use crate::error::IpcError;

/// What to do with a write response that has no `success` field.
///
/// The existing server sometimes answers with a bare body; older clients read
/// that as success. Kept as an explicit choice instead of a silent default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingSuccessPolicy {
    /// Insert `success: true` and pass the body on.
    AssumeSuccess,
    /// Fail the call with `HostHandlerFailure`.
    Reject,
}

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Server error: {status} - {body}")]
    Server { status: u16, body: String },

    #[error("{0}")]
    Remote(String),

    #[error("Malformed server response: {0}")]
    Malformed(String),

    #[error("Invalid base URL {url}: {reason}")]
    BaseUrl { url: String, reason: String },
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RemoteError::Timeout(e.to_string())
        } else {
            RemoteError::Connection(e.to_string())
        }
    }
}

impl From<RemoteError> for IpcError {
    fn from(e: RemoteError) -> Self {
        match e {
            RemoteError::Timeout(msg) => IpcError::TransportTimeout(msg),
            other => IpcError::HostHandlerFailure(other.to_string()),
        }
    }
}

/// `{tableName, records}` as sent by `post-data` / `insert-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    #[serde(deserialize_with = "table_name")]
    pub table_name: String,
    pub records: Vec<Map<String, Value>>,
}

/// `{tableName, filters?}` for `get-data-by-filters` / `delete-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(deserialize_with = "table_name")]
    pub table_name: String,
    #[serde(default, deserialize_with = "scalar_filters")]
    pub filters: BTreeMap<String, String>,
}

/// `{tableName, filters?, values}` for `update-data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    #[serde(deserialize_with = "table_name")]
    pub table_name: String,
    #[serde(default, deserialize_with = "scalar_filters")]
    pub filters: BTreeMap<String, String>,
    pub values: Map<String, Value>,
}

/// Table names travel in the URL path, so only plain identifiers are accepted.
pub fn is_table_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn table_name<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let name = String::deserialize(deserializer)?;
    if is_table_name(&name) {
        Ok(name)
    } else {
        Err(D::Error::custom(format!("invalid table name `{}`", name)))
    }
}

/// Filter values arrive from JavaScript; numbers and booleans are sent as
/// their text form, nested values are refused.
fn scalar_filters<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default();
    raw.into_iter()
        .map(|(field, value)| {
            let text = match value {
                Value::String(text) => text,
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Null => String::new(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(D::Error::custom(format!(
                        "filter `{}` must be a string, number or boolean",
                        field
                    )))
                }
            };
            Ok((field, text))
        })
        .collect()
}

pub struct RemoteDataClient {
    http: reqwest::Client,
    base_url: Url,
    missing_success: MissingSuccessPolicy,
}

impl RemoteDataClient {
    pub fn new(config: &RemoteConfig) -> Result<Self, RemoteError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| RemoteError::Connection(e.to_string()))?;

        let base_url = Url::parse(&config.base_url).map_err(|e| RemoteError::BaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RemoteError::BaseUrl {
                url: config.base_url.clone(),
                reason: "not a hierarchical URL".to_string(),
            });
        }

        Ok(Self {
            http,
            base_url,
            missing_success: config.missing_success,
        })
    }

    /// Base URL plus `segments`, each percent-encoded as a single path segment.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::BaseUrl {
                url: self.base_url.to_string(),
                reason: "not a hierarchical URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// POST {base}/api/maui-data
    pub async fn upload(&self, request: &UploadRequest) -> Result<Value, RemoteError> {
        let url = self.endpoint(&["api", "maui-data"])?;
        tracing::debug!(table = %request.table_name, records = request.records.len(), "Uploading records");
        let response = self.http.post(url).json(request).send().await?;
        let (status, body) = read_response(response).await?;
        interpret_write(status, &body, self.missing_success)
    }

    /// GET {base}/api/maui-get/{table}?filters[field]=value
    pub async fn query(&self, request: &QueryRequest) -> Result<Value, RemoteError> {
        let url = self.endpoint(&["api", "maui-get", request.table_name.as_str()])?;
        let response = self
            .http
            .get(url)
            .query(&filter_pairs(&request.filters))
            .send()
            .await?;
        let (status, body) = read_response(response).await?;
        interpret_query(status, &body)
    }

    /// PUT {base}/api/maui-update/{table}?filters[field]=value
    pub async fn update(&self, request: &UpdateRequest) -> Result<Value, RemoteError> {
        let url = self.endpoint(&["api", "maui-update", request.table_name.as_str()])?;
        let response = self
            .http
            .put(url)
            .query(&filter_pairs(&request.filters))
            .json(&request.values)
            .send()
            .await?;
        let (status, body) = read_response(response).await?;
        interpret_write(status, &body, self.missing_success)
    }

    /// DELETE {base}/api/maui-delete/{table}?filters[field]=value
    pub async fn delete(&self, request: &QueryRequest) -> Result<Value, RemoteError> {
        let url = self.endpoint(&["api", "maui-delete", request.table_name.as_str()])?;
        let response = self
            .http
            .delete(url)
            .query(&filter_pairs(&request.filters))
            .send()
            .await?;
        let (status, body) = read_response(response).await?;
        interpret_write(status, &body, self.missing_success)
    }
}

async fn read_response(response: reqwest::Response) -> Result<(StatusCode, String), RemoteError> {
    let status = response.status();
    let body = response.text().await?;
    tracing::debug!(status = status.as_u16(), "Remote response: {}", body);
    Ok((status, body))
}

pub fn filter_pairs(filters: &BTreeMap<String, String>) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|(field, value)| (format!("filters[{}]", field), value.clone()))
        .collect()
}

fn parse_body(body: &str) -> Result<Value, RemoteError> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Resolve an upload/update/delete answer.
pub fn interpret_write(
    status: StatusCode,
    body: &str,
    policy: MissingSuccessPolicy,
) -> Result<Value, RemoteError> {
    if !status.is_success() {
        return Err(RemoteError::Server {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let value = parse_body(body)?;
    match value.get("success").cloned() {
        Some(Value::Bool(_)) => Ok(value),
        Some(other) => Err(RemoteError::Malformed(format!(
            "`success` is not a boolean: {}",
            other
        ))),
        None => match policy {
            MissingSuccessPolicy::AssumeSuccess => match value {
                Value::Object(mut object) => {
                    object.insert("success".to_string(), Value::Bool(true));
                    Ok(Value::Object(object))
                }
                other => Ok(json!({"success": true, "data": other})),
            },
            MissingSuccessPolicy::Reject => Err(RemoteError::Malformed(
                "response has no `success` field".to_string(),
            )),
        },
    }
}

/// Resolve a query answer: `{success: true, data}` passes, `{error}` fails.
pub fn interpret_query(status: StatusCode, body: &str) -> Result<Value, RemoteError> {
    if !status.is_success() {
        return Err(RemoteError::Server {
            status: status.as_u16(),
            body: body.to_string(),
        });
    }

    let value = parse_body(body)?;
    if value.get("success").and_then(Value::as_bool) == Some(true) {
        return Ok(value);
    }
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(RemoteError::Remote(error.to_string()));
    }
    Ok(json!({"success": false, "data": []}))
}
