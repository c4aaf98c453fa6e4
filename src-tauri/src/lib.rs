pub mod config;
pub mod error;
pub mod ipc;
pub mod remote;
pub mod serial;
pub mod store;

pub use config::BridgeConfig;
pub use error::IpcError;
pub use ipc::AppState;

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use std::sync::Arc;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storage_bridge_lib=info".into()),
        )
        .init();

    tracing::info!("Starting storage bridge");

    let config = BridgeConfig::load_or_init();
    let state = match AppState::new(&config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("Failed to initialise bridge: {}", e);
            return;
        }
    };
    let serial = Arc::clone(&state.serial);
    let auto_connect = config.serial.auto_connect;

    tauri::Builder::default()
        .manage(state)
        .invoke_handler(tauri::generate_handler![
            ipc::commands::bridge_invoke,
            ipc::commands::bridge_receive,
            ipc::commands::bridge_remove_all_listeners,
            ipc::commands::bridge_log,
        ])
        .setup(move |_app| {
            if auto_connect {
                // Opening a port can block; don't hold up window creation.
                std::thread::Builder::new()
                    .name("serial-autoconnect".into())
                    .spawn(move || {
                        if let Err(e) = serial.reconnect() {
                            tracing::warn!("Serial auto-connect failed: {}", e);
                        }
                    })?;
            }
            tracing::info!("Bridge setup complete. Waiting for renderer.");
            Ok(())
        })
        .run(tauri::generate_context!())
        .expect("Failed to run storage bridge");
}
