//! Online/offline announcements.

use std::sync::Arc;

use shared_proto::events::ServerEvent;

use crate::hub::Hub;
use crate::session::ConnectionId;

#[derive(Debug, Clone)]
pub struct PresenceBroadcaster {
    hub: Arc<Hub>,
}

impl PresenceBroadcaster {
    pub fn new(hub: Arc<Hub>) -> Self {
        Self { hub }
    }

    /// Tells every other live connection that `user_id` came online.
    pub fn announce_online(&self, user_id: &str, subject: ConnectionId) -> usize {
        let sent = self
            .hub
            .broadcast_except(subject, &ServerEvent::UserOnline(user_id.to_string()));
        tracing::debug!(component = "presence", user_id, recipients = sent, "user online");
        sent
    }

    pub fn announce_offline(&self, user_id: &str, subject: ConnectionId) -> usize {
        let sent = self
            .hub
            .broadcast_except(subject, &ServerEvent::UserOffline(user_id.to_string()));
        tracing::debug!(component = "presence", user_id, recipients = sent, "user offline");
        sent
    }
}
