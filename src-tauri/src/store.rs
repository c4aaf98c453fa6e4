use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::error::IpcError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<StoreError> for IpcError {
    fn from(e: StoreError) -> Self {
        IpcError::HostHandlerFailure(format!("User store: {}", e))
    }
}

/// Local records behind `get-users` / `insert-user`.
///
/// Records are opaque JSON objects. With a path, the whole list is rewritten
/// after every insert.
pub struct UserStore {
    path: Option<PathBuf>,
    users: Mutex<Vec<Value>>,
}

impl UserStore {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            users: Mutex::new(Vec::new()),
        }
    }

    /// Open the store at `path`, starting empty if the file is missing or unreadable.
    pub fn open(path: PathBuf) -> Self {
        let users = load_users(&path);
        tracing::info!("Loaded {} user record(s) from {:?}", users.len(), path);
        Self {
            path: Some(path),
            users: Mutex::new(users),
        }
    }

    pub fn all(&self) -> Vec<Value> {
        self.users.lock().clone()
    }

    /// Store `record`, assigning an `id` if it has none. Returns the stored record.
    pub fn insert(&self, mut record: Map<String, Value>) -> Result<Value, StoreError> {
        if !record.contains_key("id") {
            record.insert(
                "id".to_string(),
                Value::String(uuid::Uuid::new_v4().to_string()),
            );
        }
        let stored = Value::Object(record);

        let mut users = self.users.lock();
        users.push(stored.clone());
        if let Some(path) = &self.path {
            if let Err(e) = save_users(path, &users) {
                users.pop();
                return Err(e);
            }
        }
        Ok(stored)
    }
}

fn load_users(path: &Path) -> Vec<Value> {
    if !path.exists() {
        return Vec::new();
    }
    match std::fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str(&content) {
            Ok(users) => users,
            Err(e) => {
                tracing::warn!("Failed to parse user store {:?}: {}", path, e);
                Vec::new()
            }
        },
        Err(e) => {
            tracing::warn!("Failed to read user store {:?}: {}", path, e);
            Vec::new()
        }
    }
}

fn save_users(path: &Path, users: &[Value]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(users)?)?;
    Ok(())
}
