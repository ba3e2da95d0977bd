//! Outbound fan-out: every live connection's sender plus the transport-level
//! voice room groups.

use std::collections::HashSet;

use axum::extract::ws::Message;
use dashmap::DashMap;
use shared_proto::events::ServerEvent;
use tokio::sync::mpsc;

use crate::session::ConnectionId;

pub type Tx = mpsc::UnboundedSender<Message>;

#[derive(Debug, Default)]
pub struct Hub {
    peers: DashMap<ConnectionId, Tx>,
    /// Room name → member connections.
    groups: DashMap<String, HashSet<ConnectionId>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, conn_id: ConnectionId, tx: Tx) {
        self.peers.insert(conn_id, tx);
    }

    pub fn detach(&self, conn_id: ConnectionId) {
        self.peers.remove(&conn_id);
    }

    /// Queues an event for one connection. Returns false if the connection is
    /// gone or its writer has shut down.
    pub fn send_to(&self, conn_id: ConnectionId, event: &ServerEvent) -> bool {
        let Some(message) = encode(event) else {
            return false;
        };
        match self.peers.get(&conn_id) {
            Some(tx) => tx.send(message).is_ok(),
            None => false,
        }
    }

    /// Queues an event for every live connection except `except`.
    pub fn broadcast_except(&self, except: ConnectionId, event: &ServerEvent) -> usize {
        let Some(message) = encode(event) else {
            return 0;
        };
        let mut sent = 0;
        for peer in self.peers.iter() {
            if *peer.key() == except {
                continue;
            }
            if peer.value().send(message.clone()).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    pub fn join_group(&self, room: &str, conn_id: ConnectionId) {
        self.groups.entry(room.to_string()).or_default().insert(conn_id);
    }

    /// Removes the connection from the group, dropping the group once empty.
    pub fn leave_group(&self, room: &str, conn_id: ConnectionId) -> bool {
        let removed = match self.groups.get_mut(room) {
            Some(mut members) => members.remove(&conn_id),
            None => return false,
        };
        self.groups.remove_if(room, |_, members| members.is_empty());
        removed
    }

    /// Queues an event for the members of `room`, skipping `except`.
    pub fn broadcast_group(&self, room: &str, except: ConnectionId, event: &ServerEvent) -> usize {
        let members = self.group_members(room);
        if members.is_empty() {
            return 0;
        }
        let Some(message) = encode(event) else {
            return 0;
        };

        let mut sent = 0;
        for member in members.into_iter().filter(|member| *member != except) {
            if let Some(tx) = self.peers.get(&member) {
                if tx.send(message.clone()).is_ok() {
                    sent += 1;
                }
            }
        }
        sent
    }

    pub fn group_members(&self, room: &str) -> Vec<ConnectionId> {
        self.groups
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

fn encode(event: &ServerEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(text) => Some(Message::Text(text)),
        Err(e) => {
            tracing::error!(component = "hub", error = %e, "failed to serialize outbound event");
            None
        }
    }
}
