pub mod coordinator;
pub mod password;
pub mod postgres;
pub mod store;

pub use coordinator::VoiceRoomCoordinator;
pub use postgres::PgRoomStore;
pub use store::{seed_rooms, MemoryRoomStore, RoomSeed, RoomStore};

#[cfg(test)]
pub use store::VoiceRoom;
