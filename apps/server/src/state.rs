use std::sync::Arc;

use serde::Serialize;

use crate::admission::AdmissionController;
use crate::config::Config;
use crate::hub::Hub;
use crate::presence::PresenceBroadcaster;
use crate::registry::ConnectionRegistry;
use crate::relay::SignalRelay;
use crate::voice::{RoomStore, VoiceRoomCoordinator};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub admission: Arc<AdmissionController>,
    pub registry: Arc<ConnectionRegistry>,
    /// Outbound senders and voice room groups for every live connection.
    pub hub: Arc<Hub>,
    pub presence: PresenceBroadcaster,
    pub relay: SignalRelay,
    pub voice: VoiceRoomCoordinator,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayStatus {
    pub active_connections: usize,
    pub max_connections: usize,
    pub identified_users: usize,
    pub voice_rooms: usize,
    pub protocol_version: u8,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn RoomStore>) -> Self {
        let admission = AdmissionController::new(config.max_connections);
        let registry = Arc::new(ConnectionRegistry::new());
        let hub = Arc::new(Hub::new());

        Self {
            config: Arc::new(config),
            admission,
            presence: PresenceBroadcaster::new(hub.clone()),
            relay: SignalRelay::new(registry.clone(), hub.clone()),
            voice: VoiceRoomCoordinator::new(store, hub.clone()),
            registry,
            hub,
        }
    }

    pub fn status(&self) -> GatewayStatus {
        GatewayStatus {
            active_connections: self.admission.active(),
            max_connections: self.admission.ceiling(),
            identified_users: self.registry.len(),
            voice_rooms: self.hub.group_count(),
            protocol_version: shared_proto::signaling::PROTOCOL_VERSION,
        }
    }
}
