//! Point-to-point forwarding of WebRTC signaling. Fire-and-forget: a target
//! that is not connected simply never receives the signal.

use std::sync::Arc;

use shared_proto::events::ServerEvent;
use shared_proto::signaling::{IncomingSignal, OutgoingSignal};

use crate::error::{GatewayError, GatewayResult};
use crate::hub::Hub;
use crate::registry::ConnectionRegistry;

#[derive(Debug, Clone)]
pub struct SignalRelay {
    registry: Arc<ConnectionRegistry>,
    hub: Arc<Hub>,
}

impl SignalRelay {
    pub fn new(registry: Arc<ConnectionRegistry>, hub: Arc<Hub>) -> Self {
        Self { registry, hub }
    }

    /// Delivers the signal to the target's current connection. An
    /// unregistered target yields `UnknownTarget`, which callers drop.
    pub fn relay(&self, sender_user_id: &str, signal: OutgoingSignal) -> GatewayResult<()> {
        if signal.target_user_id.trim().is_empty() {
            return Err(GatewayError::InvalidRequest("targetUserId is required".into()));
        }

        let Some(target) = self.registry.resolve(&signal.target_user_id) else {
            tracing::warn!(
                component = "relay",
                target_user_id = %signal.target_user_id,
                "signal target not connected"
            );
            return Err(GatewayError::UnknownTarget(signal.target_user_id));
        };

        tracing::info!(
            component = "relay",
            signal_type = signal.signal_type.as_str(),
            sender_user_id,
            target_user_id = %signal.target_user_id,
            "relaying signal"
        );

        let event = ServerEvent::Signal(IncomingSignal {
            sender_user_id: sender_user_id.to_string(),
            signal_type: signal.signal_type,
            signal_data: signal.signal_data,
        });
        if !self.hub.send_to(target, &event) {
            tracing::debug!(component = "relay", %target, "target writer already closed");
        }
        Ok(())
    }
}
