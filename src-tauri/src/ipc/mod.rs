pub mod channels;
#[cfg(feature = "desktop")]
pub mod commands;
pub mod events;
pub mod gateway;
pub mod payloads;
pub mod renderer_log;
pub mod router;

use std::sync::Arc;

use crate::config::BridgeConfig;
use crate::remote::{RemoteDataClient, RemoteError};
use crate::serial::{PortConnector, SerialManager, SystemPortConnector};
use crate::store::UserStore;

use channels::ChannelRegistry;
use events::EventRelay;
use gateway::{CommandGateway, HostHandler};
use router::HostRouter;

/// Application-wide state managed by Tauri.
pub struct AppState {
    pub relay: Arc<EventRelay>,
    pub serial: Arc<SerialManager>,
    pub gateway: CommandGateway,
}

impl AppState {
    pub fn new(config: &BridgeConfig) -> Result<Self, RemoteError> {
        let users = UserStore::open(config.store.resolved_path());
        Self::with_parts(config, Arc::new(SystemPortConnector), users)
    }

    /// Assemble the bridge around a given port connector and user store.
    pub fn with_parts(
        config: &BridgeConfig,
        connector: Arc<dyn PortConnector>,
        users: UserStore,
    ) -> Result<Self, RemoteError> {
        let registry = Arc::new(ChannelRegistry::standard());
        let relay = Arc::new(EventRelay::new(Arc::clone(&registry)));
        let serial = Arc::new(SerialManager::new(
            config.serial.clone(),
            connector,
            Arc::clone(&relay),
        ));
        let remote = Arc::new(RemoteDataClient::new(&config.remote)?);

        let router: Arc<dyn HostHandler> = Arc::new(HostRouter::new(
            Arc::clone(&serial),
            remote,
            Arc::new(users),
            Arc::clone(&relay),
        ));
        let gateway = CommandGateway::new(Arc::clone(&registry)).with_handler_for_all(router);

        Ok(Self {
            relay,
            serial,
            gateway,
        })
    }
}
