//! Per-connection lifecycle.
//!
//! A [`Session`] exists only for admitted connections. It is identified at
//! most once, moves in and out of voice rooms, and runs its terminal
//! transition exactly once when dropped.

use std::panic::AssertUnwindSafe;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use shared_proto::events::{ClientEvent, ServerEvent};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::admission::AdmissionPermit;
use crate::error::{GatewayError, GatewayResult};
use crate::hub::Tx;
use crate::state::AppState;
use crate::validation::check_user_id;

pub type ConnectionId = Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceMembership {
    pub room_id: String,
    /// Identity the room was joined under.
    pub user_id: String,
    pub username: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unidentified,
    Identified,
    InVoiceRoom,
}

/// One live transport session.
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    pub voice: Option<VoiceMembership>,
    pub connected_at: DateTime<Utc>,
}

impl Connection {
    pub fn new(id: ConnectionId) -> Self {
        Self {
            id,
            user_id: None,
            voice: None,
            connected_at: Utc::now(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        match (&self.user_id, &self.voice) {
            (None, _) => ConnectionState::Unidentified,
            (Some(_), None) => ConnectionState::Identified,
            (Some(_), Some(_)) => ConnectionState::InVoiceRoom,
        }
    }
}

pub struct Session {
    state: AppState,
    conn: Connection,
    /// Taken by the terminal transition.
    permit: Option<AdmissionPermit>,
}

impl Session {
    /// Admits a new connection and attaches its outbound queue. Refusal leaves
    /// no state behind.
    pub fn open(state: &AppState, tx: Tx) -> GatewayResult<Self> {
        let Some(permit) = state.admission.try_admit() else {
            warn!(
                component = "lifecycle",
                active = state.admission.active(),
                max = state.admission.ceiling(),
                "connection limit reached"
            );
            return Err(GatewayError::CapacityExceeded);
        };

        let conn = Connection::new(Uuid::new_v4());
        state.hub.attach(conn.id, tx);

        info!(
            component = "lifecycle",
            conn_id = %conn.id,
            active = state.admission.active(),
            "client connected"
        );

        Ok(Self {
            state: state.clone(),
            conn,
            permit: Some(permit),
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.conn.id
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Handles one inbound text frame. Failures, including panics, stay
    /// inside this event and are answered to the sender when possible.
    pub async fn handle_text(&mut self, raw: &str) {
        let (name, result) = match decode(raw) {
            Ok(event) => {
                let name = event.name().to_string();
                match AssertUnwindSafe(self.dispatch(event)).catch_unwind().await {
                    Ok(result) => (name, result),
                    Err(_) => {
                        error!(
                            component = "lifecycle",
                            conn_id = %self.conn.id,
                            event = %name,
                            "event handler panicked"
                        );
                        (name, Err(GatewayError::Internal))
                    }
                }
            }
            Err(failure) => failure,
        };

        if let Err(err) = result {
            self.report(&name, err);
        }
    }

    /// Answers the sender directly, outside any event.
    pub fn reply_error(&self, message: &str) {
        self.state
            .hub
            .send_to(self.conn.id, &ServerEvent::error(message));
    }

    async fn dispatch(&mut self, event: ClientEvent) -> GatewayResult<()> {
        match event {
            ClientEvent::Identify(user_id) => self.identify(user_id),
            ClientEvent::JoinVoiceRoom(request) => {
                self.require_identified("join_voice_room")?;
                let joined = self.state.voice.join(&mut self.conn, request).await?;
                self.state
                    .hub
                    .send_to(self.conn.id, &ServerEvent::VoiceRoomJoined(joined));
                Ok(())
            }
            ClientEvent::LeaveVoiceRoom(request) => {
                self.require_identified("leave_voice_room")?;
                self.state.voice.leave(&mut self.conn, request).await;
                Ok(())
            }
            ClientEvent::Signal(signal) => {
                let sender = self.require_identified("signal")?.to_string();
                self.state.relay.relay(&sender, signal)
            }
        }
    }

    fn identify(&mut self, user_id: String) -> GatewayResult<()> {
        check_user_id(&user_id)?;

        match self.conn.user_id.as_deref() {
            Some(current) if current == user_id => {
                self.state.registry.bind(&user_id, self.conn.id);
                debug!(component = "lifecycle", conn_id = %self.conn.id, user_id = %user_id, "repeated identify");
                return Ok(());
            }
            Some(current) => return Err(GatewayError::AlreadyIdentified(current.to_string())),
            None => {}
        }

        if let Some(previous) = self.state.registry.bind(&user_id, self.conn.id) {
            info!(
                component = "lifecycle",
                user_id = %user_id,
                superseded = %previous,
                "previous session superseded"
            );
        }
        self.conn.user_id = Some(user_id.clone());
        self.state.presence.announce_online(&user_id, self.conn.id);

        info!(
            component = "lifecycle",
            conn_id = %self.conn.id,
            user_id = %user_id,
            "user identified"
        );
        Ok(())
    }

    fn require_identified(&self, event: &'static str) -> GatewayResult<&str> {
        self.conn
            .user_id
            .as_deref()
            .ok_or(GatewayError::NotIdentified(event))
    }

    fn report(&self, event: &str, err: GatewayError) {
        match &err {
            GatewayError::UnknownTarget(_) => {}
            GatewayError::CollaboratorUnavailable(e) => {
                error!(component = "lifecycle", conn_id = %self.conn.id, event, error = %e, "room store failure");
            }
            other => {
                warn!(component = "lifecycle", conn_id = %self.conn.id, event, error = %other, "event rejected");
            }
        }

        if let Some(reply) = err.client_event(event) {
            self.state.hub.send_to(self.conn.id, &reply);
        }
    }

    /// Releases admission, unbinds the user if this is still their current
    /// session (announcing offline only then), and notifies the voice room.
    fn terminate(&mut self) {
        let Some(permit) = self.permit.take() else {
            return;
        };
        drop(permit);
        let final_state = self.conn.state();
        self.state.hub.detach(self.conn.id);

        if let Some(user_id) = self.conn.user_id.take() {
            if self.state.registry.unbind(&user_id, self.conn.id) {
                self.state.presence.announce_offline(&user_id, self.conn.id);
            } else {
                debug!(
                    component = "lifecycle",
                    conn_id = %self.conn.id,
                    user_id = %user_id,
                    "superseded session closed"
                );
            }
        }

        if let Some(membership) = self.conn.voice.take() {
            self.state.voice.abandon(self.conn.id, membership);
        }

        info!(
            component = "lifecycle",
            conn_id = %self.conn.id,
            state = ?final_state,
            active = self.state.admission.active(),
            lifetime_secs = (Utc::now() - self.conn.connected_at).num_seconds(),
            "client disconnected"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn decode(raw: &str) -> Result<ClientEvent, (String, GatewayResult<()>)> {
    let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        (
            "unknown".to_string(),
            Err(GatewayError::InvalidRequest(format!("malformed frame: {e}"))),
        )
    })?;

    let name = value
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("unknown")
        .to_string();

    serde_json::from_value(value).map_err(|e| {
        let message = format!("malformed {name} event: {e}");
        (name, Err(GatewayError::InvalidRequest(message)))
    })
}
