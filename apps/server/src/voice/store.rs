//! Voice room persistence seam. The gateway only reads a room's privacy flag
//! and asks the store to verify passwords and mutate participants.

use std::collections::BTreeSet;

use async_trait::async_trait;
use dashmap::DashMap;

use super::password;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored credential is unusable")]
    Credential,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceRoom {
    pub name: String,
    pub private: bool,
    /// Argon2 PHC string; only meaningful for private rooms.
    pub password_hash: Option<String>,
    pub participants: BTreeSet<String>,
}

impl VoiceRoom {
    pub fn public(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            private: false,
            password_hash: None,
            participants: BTreeSet::new(),
        }
    }

    pub fn private(name: impl Into<String>, password: &str) -> Result<Self, StoreError> {
        Ok(Self {
            name: name.into(),
            private: true,
            password_hash: Some(password::hash_password(password)?),
            participants: BTreeSet::new(),
        })
    }

    pub fn is_private(&self) -> bool {
        self.private
    }
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn find_room_by_name(&self, name: &str) -> Result<Option<VoiceRoom>, StoreError>;

    /// Checks a supplied password against the room's credential. A private
    /// room without a stored credential admits nobody.
    async fn verify_password(
        &self,
        room: &VoiceRoom,
        supplied: Option<&str>,
    ) -> Result<bool, StoreError> {
        let (Some(hash), Some(supplied)) = (room.password_hash.clone(), supplied) else {
            return Ok(false);
        };
        let supplied = supplied.to_string();
        tokio::task::spawn_blocking(move || password::verify_password(&supplied, &hash))
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }

    /// Adds the participant and persists the room in one step.
    async fn add_participant(&self, room: &VoiceRoom, user_id: &str) -> Result<(), StoreError>;

    /// Removes the participant and persists. Returns false when the room or
    /// the participant was not found.
    async fn remove_participant(&self, room_name: &str, user_id: &str) -> Result<bool, StoreError>;

    /// Creates the room or replaces its privacy and credential. Participants
    /// of an existing room are kept.
    async fn seed_room(&self, room: VoiceRoom) -> Result<(), StoreError>;
}

/// Configured room to create at startup. A password makes the room private.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSeed {
    pub name: String,
    pub password: Option<String>,
}

pub async fn seed_rooms(store: &dyn RoomStore, seeds: &[RoomSeed]) -> Result<usize, StoreError> {
    for seed in seeds {
        let room = match seed.password.as_deref() {
            Some(password) => VoiceRoom::private(seed.name.as_str(), password)?,
            None => VoiceRoom::public(seed.name.as_str()),
        };
        tracing::info!(
            component = "voice.store",
            room_id = %room.name,
            private = room.is_private(),
            "seeding voice room"
        );
        store.seed_room(room).await?;
    }
    Ok(seeds.len())
}

/// Process-local room store. Rooms must be seeded with [`MemoryRoomStore::insert`];
/// every other room name is treated as ad hoc.
#[derive(Debug, Default)]
pub struct MemoryRoomStore {
    rooms: DashMap<String, VoiceRoom>,
}

impl MemoryRoomStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, room: VoiceRoom) {
        self.rooms.insert(room.name.clone(), room);
    }

    #[cfg(test)]
    pub fn participants(&self, name: &str) -> Option<BTreeSet<String>> {
        self.rooms.get(name).map(|room| room.participants.clone())
    }
}

#[async_trait]
impl RoomStore for MemoryRoomStore {
    async fn find_room_by_name(&self, name: &str) -> Result<Option<VoiceRoom>, StoreError> {
        Ok(self.rooms.get(name).map(|room| room.value().clone()))
    }

    async fn add_participant(&self, room: &VoiceRoom, user_id: &str) -> Result<(), StoreError> {
        match self.rooms.get_mut(&room.name) {
            Some(mut stored) => {
                stored.participants.insert(user_id.to_string());
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!(
                "room {} disappeared before update",
                room.name
            ))),
        }
    }

    async fn remove_participant(&self, room_name: &str, user_id: &str) -> Result<bool, StoreError> {
        Ok(self
            .rooms
            .get_mut(room_name)
            .map(|mut stored| stored.participants.remove(user_id))
            .unwrap_or(false))
    }

    async fn seed_room(&self, mut room: VoiceRoom) -> Result<(), StoreError> {
        if let Some(existing) = self.rooms.get(&room.name) {
            room.participants = existing.participants.clone();
        }
        self.insert(room);
        Ok(())
    }
}
