//! The commands the webview may call. Everything else the renderer can
//! reach goes through `bridge_invoke` and the channel registry.

use serde_json::Value;
use tauri::ipc::Channel;
use tauri::State;

use super::renderer_log::{self, RendererLogLevel};
use super::AppState;
use crate::error::IpcError;

/// `window.api.invoke(channel, ...args)`
#[tauri::command]
pub async fn bridge_invoke(
    state: State<'_, AppState>,
    channel: String,
    args: Option<Vec<Value>>,
) -> Result<Value, IpcError> {
    state.gateway.invoke(&channel, args.unwrap_or_default()).await
}

/// `window.api.receive(channel, callback)`
///
/// Returns the listener id, or `None` when `channel` is not an event channel.
#[tauri::command]
pub fn bridge_receive(
    state: State<'_, AppState>,
    channel: String,
    on_event: Channel<Value>,
) -> Option<u64> {
    state
        .relay
        .subscribe_while(&channel, move |args| {
            match on_event.send(Value::Array(args.to_vec())) {
                Ok(()) => true,
                Err(e) => {
                    tracing::debug!("Webview channel closed, dropping listener: {}", e);
                    false
                }
            }
        })
        .map(|id| id.as_u64())
}

/// `window.api.removeAllListeners(channel)`
#[tauri::command]
pub fn bridge_remove_all_listeners(state: State<'_, AppState>, channel: String) {
    state.relay.unsubscribe_all(&channel);
}

/// `window.debugApi.log(...)` / `window.debugApi.error(...)`
#[tauri::command]
pub fn bridge_log(level: RendererLogLevel, args: Vec<Value>) {
    renderer_log::record(level, &args);
}
