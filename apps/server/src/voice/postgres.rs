use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};

use super::store::{RoomStore, StoreError, VoiceRoom};
use crate::error::StartupError;

#[derive(Debug, FromRow)]
struct VoiceRoomRow {
    name: String,
    is_private: bool,
    password_hash: Option<String>,
    participants: Vec<String>,
}

impl From<VoiceRoomRow> for VoiceRoom {
    fn from(row: VoiceRoomRow) -> Self {
        Self {
            name: row.name,
            private: row.is_private,
            password_hash: row.password_hash,
            participants: row.participants.into_iter().collect(),
        }
    }
}

/// Room store backed by the `voice_rooms` table.
#[derive(Debug, Clone)]
pub struct PgRoomStore {
    db: PgPool,
}

impl PgRoomStore {
    pub async fn connect(database_url: &str) -> Result<Self, StartupError> {
        let db = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&db).await?;
        tracing::info!(component = "voice.store", "postgres room store ready");
        Ok(Self { db })
    }
}

#[async_trait]
impl RoomStore for PgRoomStore {
    async fn find_room_by_name(&self, name: &str) -> Result<Option<VoiceRoom>, StoreError> {
        let row = sqlx::query_as::<_, VoiceRoomRow>(
            "SELECT name, is_private, password_hash, participants FROM voice_rooms WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.db)
        .await?;

        Ok(row.map(VoiceRoom::from))
    }

    async fn add_participant(&self, room: &VoiceRoom, user_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE voice_rooms
            SET participants = array_append(participants, $2), updated_at = NOW()
            WHERE name = $1 AND NOT ($2 = ANY(participants))
            "#,
        )
        .bind(&room.name)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    async fn remove_participant(&self, room_name: &str, user_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE voice_rooms
            SET participants = array_remove(participants, $2), updated_at = NOW()
            WHERE name = $1 AND $2 = ANY(participants)
            "#,
        )
        .bind(room_name)
        .bind(user_id)
        .execute(&self.db)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn seed_room(&self, room: VoiceRoom) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO voice_rooms (name, is_private, password_hash)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET is_private = EXCLUDED.is_private,
                password_hash = EXCLUDED.password_hash,
                updated_at = NOW()
            "#,
        )
        .bind(&room.name)
        .bind(room.private)
        .bind(&room.password_hash)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}
