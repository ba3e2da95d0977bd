//! Voice room membership: password gate, transport groups and participant
//! bookkeeping in the room store.

use std::sync::Arc;

use chrono::Utc;
use shared_proto::events::ServerEvent;
use shared_proto::voice::{JoinVoiceRoom, LeaveVoiceRoom, VoiceMember, VoiceRoomJoined};

use super::store::RoomStore;
use crate::error::{GatewayError, GatewayResult};
use crate::hub::Hub;
use crate::session::{Connection, ConnectionId, VoiceMembership};
use crate::validation::VoiceRoomTarget;

pub const DEFAULT_USERNAME: &str = "User";

#[derive(Clone)]
pub struct VoiceRoomCoordinator {
    store: Arc<dyn RoomStore>,
    hub: Arc<Hub>,
}

impl VoiceRoomCoordinator {
    pub fn new(store: Arc<dyn RoomStore>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    pub async fn join(
        &self,
        conn: &mut Connection,
        request: JoinVoiceRoom,
    ) -> GatewayResult<VoiceRoomJoined> {
        VoiceRoomTarget::check(&request.room_id, &request.user_id)?;

        if let Some(current) = conn.voice.as_ref() {
            if current.room_id == request.room_id && current.user_id == request.user_id {
                tracing::debug!(
                    component = "voice",
                    conn_id = %conn.id,
                    room_id = %request.room_id,
                    "already in voice room"
                );
                return Ok(VoiceRoomJoined {
                    room_id: request.room_id,
                    success: true,
                });
            }
        }

        let room = self.store.find_room_by_name(&request.room_id).await?;
        if let Some(room) = room.as_ref().filter(|room| room.is_private()) {
            let accepted = self
                .store
                .verify_password(room, request.password.as_deref())
                .await?;
            if !accepted {
                tracing::info!(
                    component = "voice",
                    conn_id = %conn.id,
                    room_id = %request.room_id,
                    "wrong room password"
                );
                return Err(GatewayError::WrongPassword);
            }
        }

        // Persist before touching the group so a store failure leaves no
        // membership behind.
        if let Some(room) = room.as_ref() {
            self.store.add_participant(room, &request.user_id).await?;
        }

        // Same room under a new identity still retires the old participant.
        if let Some(previous) = conn.voice.take() {
            self.depart(conn.id, &previous, None);
            self.remove_participant(previous.room_id, previous.user_id).await;
        }

        let username = request
            .username
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_USERNAME.to_string());

        self.hub.join_group(&request.room_id, conn.id);
        conn.voice = Some(VoiceMembership {
            room_id: request.room_id.clone(),
            user_id: request.user_id.clone(),
            username: username.clone(),
        });

        let notified = self.hub.broadcast_group(
            &request.room_id,
            conn.id,
            &ServerEvent::UserJoinedVoice(VoiceMember {
                user_id: request.user_id.clone(),
                username: username.clone(),
                timestamp: Utc::now(),
            }),
        );

        tracing::info!(
            component = "voice",
            conn_id = %conn.id,
            room_id = %request.room_id,
            user_id = %request.user_id,
            username = %username,
            ad_hoc = room.is_none(),
            notified,
            "joined voice room"
        );

        Ok(VoiceRoomJoined {
            room_id: request.room_id,
            success: true,
        })
    }

    /// Leaves the connection's current room. Returns false when there was
    /// nothing to leave.
    pub async fn leave(&self, conn: &mut Connection, request: LeaveVoiceRoom) -> bool {
        let Some(membership) = conn.voice.take() else {
            tracing::debug!(
                component = "voice",
                conn_id = %conn.id,
                room_id = %request.room_id,
                "leave without current room"
            );
            return false;
        };

        let username = request.username.filter(|name| !name.trim().is_empty());
        self.depart(conn.id, &membership, username);
        self.remove_participant(membership.room_id, membership.user_id).await;
        true
    }

    /// Disconnect path: local state and notification now, store cleanup in
    /// the background.
    pub fn abandon(&self, conn_id: ConnectionId, membership: VoiceMembership) {
        self.depart(conn_id, &membership, None);

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator
                .remove_participant(membership.room_id, membership.user_id)
                .await;
        });
    }

    fn depart(&self, conn_id: ConnectionId, membership: &VoiceMembership, username: Option<String>) {
        self.hub.leave_group(&membership.room_id, conn_id);
        let notified = self.hub.broadcast_group(
            &membership.room_id,
            conn_id,
            &ServerEvent::UserLeftVoice(VoiceMember {
                user_id: membership.user_id.clone(),
                username: username.unwrap_or_else(|| membership.username.clone()),
                timestamp: Utc::now(),
            }),
        );

        tracing::info!(
            component = "voice",
            conn_id = %conn_id,
            room_id = %membership.room_id,
            user_id = %membership.user_id,
            notified,
            "left voice room"
        );
    }

    async fn remove_participant(&self, room_id: String, user_id: String) {
        match self.store.remove_participant(&room_id, &user_id).await {
            Ok(removed) => {
                tracing::debug!(component = "voice", room_id = %room_id, user_id = %user_id, removed, "participant removed");
            }
            Err(e) => {
                tracing::warn!(component = "voice", room_id = %room_id, user_id = %user_id, error = %e, "failed to remove participant");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::testing::{attach_peer, drain, Rx};
    use crate::voice::store::{MemoryRoomStore, StoreError, VoiceRoom};
    use async_trait::async_trait;

    struct Fixture {
        coordinator: VoiceRoomCoordinator,
        store: Arc<MemoryRoomStore>,
        hub: Arc<Hub>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryRoomStore::new());
        store.insert(VoiceRoom::private("ops", "secret123").expect("room"));
        store.insert(VoiceRoom::public("lobby"));
        let hub = Arc::new(Hub::new());
        Fixture {
            coordinator: VoiceRoomCoordinator::new(store.clone(), hub.clone()),
            store,
            hub,
        }
    }

    fn connect(hub: &Hub, user_id: &str) -> (Connection, Rx) {
        let (id, rx) = attach_peer(hub);
        let mut conn = Connection::new(id);
        conn.user_id = Some(user_id.to_string());
        (conn, rx)
    }

    fn join(room: &str, user: &str, password: Option<&str>) -> JoinVoiceRoom {
        JoinVoiceRoom {
            room_id: room.to_string(),
            user_id: user.to_string(),
            username: Some(user.to_uppercase()),
            password: password.map(str::to_string),
        }
    }

    fn leave(room: &str, user: &str) -> LeaveVoiceRoom {
        LeaveVoiceRoom {
            room_id: room.to_string(),
            user_id: user.to_string(),
            username: None,
        }
    }

    #[tokio::test]
    async fn correct_password_joins_and_adds_participant_once() {
        let f = fixture();
        let (mut bob, mut rx_bob) = connect(&f.hub, "bob");
        let (mut alice, _rx_alice) = connect(&f.hub, "alice");
        f.coordinator
            .join(&mut bob, join("ops", "bob", Some("secret123")))
            .await
            .expect("bob joins");

        let joined = f
            .coordinator
            .join(&mut alice, join("ops", "alice", Some("secret123")))
            .await
            .expect("alice joins");

        assert_eq!(
            joined,
            VoiceRoomJoined {
                room_id: "ops".into(),
                success: true
            }
        );
        assert_eq!(alice.voice.as_ref().map(|m| m.room_id.as_str()), Some("ops"));
        let participants = f.store.participants("ops").expect("room");
        assert_eq!(participants.iter().filter(|p| *p == "alice").count(), 1);

        let events = drain(&mut rx_bob);
        assert_eq!(events.len(), 1);
        match &events[0] {
            ServerEvent::UserJoinedVoice(member) => {
                assert_eq!(member.user_id, "alice");
                assert_eq!(member.username, "ALICE");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_password_has_no_side_effects() {
        let f = fixture();
        let (mut alice, _rx) = connect(&f.hub, "alice");

        let result = f
            .coordinator
            .join(&mut alice, join("ops", "alice", Some("wrong")))
            .await;

        assert!(matches!(result, Err(GatewayError::WrongPassword)));
        assert!(alice.voice.is_none());
        assert!(f.store.participants("ops").expect("room").is_empty());
        assert!(f.hub.group_members("ops").is_empty());
    }

    #[tokio::test]
    async fn missing_password_is_refused_for_private_room() {
        let f = fixture();
        let (mut alice, _rx) = connect(&f.hub, "alice");
        let result = f.coordinator.join(&mut alice, join("ops", "alice", None)).await;
        assert!(matches!(result, Err(GatewayError::WrongPassword)));
    }

    #[tokio::test]
    async fn unknown_room_is_ad_hoc() {
        let f = fixture();
        let (mut alice, _rx) = connect(&f.hub, "alice");

        f.coordinator
            .join(&mut alice, join("hangout", "alice", None))
            .await
            .expect("ad hoc join");

        assert_eq!(f.hub.group_members("hangout"), vec![alice.id]);
        assert!(f.store.participants("hangout").is_none());
    }

    #[tokio::test]
    async fn blank_ids_are_invalid() {
        let f = fixture();
        let (mut alice, _rx) = connect(&f.hub, "alice");
        let result = f.coordinator.join(&mut alice, join(" ", "alice", None)).await;
        assert!(matches!(result, Err(GatewayError::InvalidRequest(_))));
        assert!(alice.voice.is_none());
    }

    #[tokio::test]
    async fn second_leave_is_a_no_op() {
        let f = fixture();
        let (mut alice, _rx_alice) = connect(&f.hub, "alice");
        let (mut bob, mut rx_bob) = connect(&f.hub, "bob");
        f.coordinator
            .join(&mut bob, join("lobby", "bob", None))
            .await
            .expect("bob joins");
        f.coordinator
            .join(&mut alice, join("lobby", "alice", None))
            .await
            .expect("alice joins");
        drain(&mut rx_bob);

        assert!(f.coordinator.leave(&mut alice, leave("lobby", "alice")).await);
        assert!(!f.coordinator.leave(&mut alice, leave("lobby", "alice")).await);

        let events = drain(&mut rx_bob);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::UserLeftVoice(m) if m.user_id == "alice" && m.username == "ALICE"));
        assert!(alice.voice.is_none());
        let participants = f.store.participants("lobby").expect("room");
        assert!(!participants.contains("alice"));
        assert!(participants.contains("bob"));
    }

    #[tokio::test]
    async fn joining_another_room_leaves_the_first() {
        let f = fixture();
        let (mut alice, _rx_alice) = connect(&f.hub, "alice");
        let (mut bob, mut rx_bob) = connect(&f.hub, "bob");
        f.coordinator
            .join(&mut bob, join("lobby", "bob", None))
            .await
            .expect("bob joins");
        f.coordinator
            .join(&mut alice, join("lobby", "alice", None))
            .await
            .expect("alice joins lobby");
        drain(&mut rx_bob);

        f.coordinator
            .join(&mut alice, join("ops", "alice", Some("secret123")))
            .await
            .expect("alice moves to ops");

        assert_eq!(f.hub.group_members("lobby"), vec![bob.id]);
        assert!(matches!(drain(&mut rx_bob).as_slice(), [ServerEvent::UserLeftVoice(_)]));
        assert!(!f.store.participants("lobby").expect("room").contains("alice"));
    }

    #[tokio::test]
    async fn rejoining_the_same_room_is_idempotent() {
        let f = fixture();
        let (mut alice, _rx_alice) = connect(&f.hub, "alice");
        let (mut bob, mut rx_bob) = connect(&f.hub, "bob");
        f.coordinator
            .join(&mut bob, join("lobby", "bob", None))
            .await
            .expect("bob joins");
        for _ in 0..2 {
            let joined = f
                .coordinator
                .join(&mut alice, join("lobby", "alice", None))
                .await
                .expect("alice joins");
            assert!(joined.success);
        }

        let events = drain(&mut rx_bob);
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], ServerEvent::UserJoinedVoice(m) if m.user_id == "alice"));
        let mut members = f.hub.group_members("lobby");
        members.sort();
        let mut expected = vec![alice.id, bob.id];
        expected.sort();
        assert_eq!(members, expected);
    }

    #[tokio::test]
    async fn rejoining_under_a_new_identity_retires_the_old_one() {
        let f = fixture();
        let (mut conn, _rx) = connect(&f.hub, "alice");
        let (mut bob, mut rx_bob) = connect(&f.hub, "bob");
        f.coordinator
            .join(&mut bob, join("lobby", "bob", None))
            .await
            .expect("bob joins");
        f.coordinator
            .join(&mut conn, join("lobby", "alice", None))
            .await
            .expect("join as alice");
        drain(&mut rx_bob);

        f.coordinator
            .join(&mut conn, join("lobby", "alice-phone", None))
            .await
            .expect("join as alice-phone");

        let events = drain(&mut rx_bob);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ServerEvent::UserLeftVoice(m) if m.user_id == "alice"));
        assert!(matches!(&events[1], ServerEvent::UserJoinedVoice(m) if m.user_id == "alice-phone"));
        let participants = f.store.participants("lobby").expect("room");
        assert!(!participants.contains("alice"));
        assert!(participants.contains("alice-phone"));
        assert_eq!(conn.voice.as_ref().map(|m| m.user_id.as_str()), Some("alice-phone"));
        assert!(f.hub.group_members("lobby").contains(&conn.id));
    }

    #[tokio::test]
    async fn abandon_removes_participant_in_background() {
        let f = fixture();
        let (mut alice, _rx_alice) = connect(&f.hub, "alice");
        let (mut bob, mut rx_bob) = connect(&f.hub, "bob");
        f.coordinator
            .join(&mut bob, join("lobby", "bob", None))
            .await
            .expect("bob joins");
        f.coordinator
            .join(&mut alice, join("lobby", "alice", None))
            .await
            .expect("alice joins");
        drain(&mut rx_bob);

        let membership = alice.voice.take().expect("membership");
        f.coordinator.abandon(alice.id, membership);

        assert!(matches!(
            drain(&mut rx_bob).as_slice(),
            [ServerEvent::UserLeftVoice(m)] if m.user_id == "alice"
        ));
        for _ in 0..100 {
            if !f.store.participants("lobby").expect("room").contains("alice") {
                break;
            }
            tokio::task::yield_now().await;
        }
        let participants = f.store.participants("lobby").expect("room");
        assert!(!participants.contains("alice"));
        assert!(participants.contains("bob"));
    }

    struct DownStore;

    #[async_trait]
    impl RoomStore for DownStore {
        async fn find_room_by_name(&self, _name: &str) -> Result<Option<VoiceRoom>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn add_participant(&self, _room: &VoiceRoom, _user_id: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn remove_participant(&self, _room: &str, _user_id: &str) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }

        async fn seed_room(&self, _room: VoiceRoom) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn store_outage_surfaces_as_collaborator_error() {
        let hub = Arc::new(Hub::new());
        let coordinator = VoiceRoomCoordinator::new(Arc::new(DownStore), hub.clone());
        let (mut alice, _rx) = connect(&hub, "alice");

        let result = coordinator.join(&mut alice, join("lobby", "alice", None)).await;

        assert!(matches!(result, Err(GatewayError::CollaboratorUnavailable(_))));
        assert!(alice.voice.is_none());
        assert!(hub.group_members("lobby").is_empty());
    }

    #[tokio::test]
    async fn abandon_survives_store_outage() {
        let hub = Arc::new(Hub::new());
        let coordinator = VoiceRoomCoordinator::new(Arc::new(DownStore), hub.clone());
        let (alice, _rx_alice) = connect(&hub, "alice");
        let (bob, mut rx_bob) = connect(&hub, "bob");
        hub.join_group("lobby", alice.id);
        hub.join_group("lobby", bob.id);

        coordinator.abandon(
            alice.id,
            VoiceMembership {
                room_id: "lobby".into(),
                user_id: "alice".into(),
                username: "alice".into(),
            },
        );
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert!(matches!(
            drain(&mut rx_bob).as_slice(),
            [ServerEvent::UserLeftVoice(m)] if m.user_id == "alice"
        ));
        assert_eq!(hub.group_members("lobby"), vec![bob.id]);
    }

    #[tokio::test]
    async fn leave_survives_store_outage() {
        let hub = Arc::new(Hub::new());
        let coordinator = VoiceRoomCoordinator::new(Arc::new(DownStore), hub.clone());
        let (mut alice, _rx) = connect(&hub, "alice");
        hub.join_group("lobby", alice.id);
        alice.voice = Some(VoiceMembership {
            room_id: "lobby".into(),
            user_id: "alice".into(),
            username: "alice".into(),
        });

        assert!(coordinator.leave(&mut alice, leave("lobby", "alice")).await);
        assert!(alice.voice.is_none());
        assert!(hub.group_members("lobby").is_empty());
    }
}
