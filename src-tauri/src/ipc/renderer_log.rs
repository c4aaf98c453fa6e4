//! `window.debugApi`: renderer diagnostics written into the host log.

use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RendererLogLevel {
    Log,
    Error,
}

/// Join console-style arguments with spaces. Strings go in unquoted,
/// anything else as compact JSON.
pub fn join_console_args(args: &[Value]) -> String {
    args.iter()
        .map(|arg| match arg {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn record(level: RendererLogLevel, args: &[Value]) {
    let message = join_console_args(args);
    match level {
        RendererLogLevel::Log => tracing::info!("[Renderer Debug]: {}", message),
        RendererLogLevel::Error => tracing::error!("[Renderer Debug]: {}", message),
    }
}
