use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::remote::MissingSuccessPolicy;

/// Bridge configuration, loaded from ~/.config/storage-bridge/config.json
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub serial: SerialConfig,
    pub remote: RemoteConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// `None` picks the first USB port the OS reports, else the first port.
    pub port_name: Option<String>,
    pub baud_rate: u32,
    /// Read timeout; also bounds how long closing the port waits for the reader.
    pub read_timeout_ms: u64,
    /// Open the port once at startup.
    pub auto_connect: bool,
    pub framing: Framing,
    /// Longest line buffered while waiting for `\n`.
    pub max_line_bytes: usize,
}

/// How inbound bytes are cut into `serial-data-received` payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Framing {
    /// One event per `\n`-terminated line, `\r` stripped.
    Lines,
    /// One event per read chunk.
    Raw,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub missing_success: MissingSuccessPolicy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Where `insert-user` records are persisted. `None` uses the data dir.
    pub path: Option<PathBuf>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: None,
            baud_rate: 9600,
            read_timeout_ms: 100,
            auto_connect: true,
            framing: Framing::Lines,
            max_line_bytes: 4096,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_secs: 30,
            missing_success: MissingSuccessPolicy::AssumeSuccess,
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("storage-bridge")
                .join("users.json")
        })
    }
}

impl BridgeConfig {
    /// Read `path`, falling back to defaults when it is missing or broken.
    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config: {}", e);
                }
            }
        }
        Self::default()
    }

    /// Load config, writing the defaults out on first run so there is a
    /// file to edit.
    pub fn load_or_init() -> Self {
        Self::load_or_init_at(&config_path())
    }

    pub fn load_or_init_at(path: &std::path::Path) -> Self {
        if path.exists() {
            return Self::load_from(path);
        }
        let config = Self::default();
        match config.save_to(path) {
            Ok(()) => tracing::info!("Wrote default config to {}", path.display()),
            Err(e) => tracing::warn!("Failed to write default config: {}", e),
        }
        config
    }

    pub fn save_to(&self, path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("storage-bridge")
        .join("config.json")
}
