//! User → connection registry. One live mapping per user id.

use dashmap::DashMap;

use crate::session::ConnectionId;

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    by_user: DashMap<String, ConnectionId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps `user_id` to `conn_id`, returning the connection it superseded.
    pub fn bind(&self, user_id: &str, conn_id: ConnectionId) -> Option<ConnectionId> {
        self.by_user
            .insert(user_id.to_string(), conn_id)
            .filter(|previous| *previous != conn_id)
    }

    pub fn resolve(&self, user_id: &str) -> Option<ConnectionId> {
        self.by_user.get(user_id).map(|entry| *entry.value())
    }

    /// Removes the mapping only while it still points at `conn_id`; a stale
    /// session never evicts its successor.
    pub fn unbind(&self, user_id: &str, conn_id: ConnectionId) -> bool {
        self.by_user
            .remove_if(user_id, |_, current| *current == conn_id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }
}
