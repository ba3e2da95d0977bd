use std::io;

use shared_proto::events::{Notice, ServerEvent};

use crate::config::ConfigError;
use crate::voice::store::StoreError;

/// Failure of a single inbound event on a single connection.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Server is full. Try again in a few minutes.")]
    CapacityExceeded,
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Wrong room password")]
    WrongPassword,
    #[error("Room store unavailable: {0}")]
    CollaboratorUnavailable(#[from] StoreError),
    #[error("User {0} is not connected")]
    UnknownTarget(String),
    #[error("Identify before sending {0}")]
    NotIdentified(&'static str),
    #[error("Connection is already identified as {0}")]
    AlreadyIdentified(String),
    #[error("Internal server error")]
    Internal,
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl GatewayError {
    /// Event answered to the requester, if any. Store failures keep their
    /// details in the logs only.
    pub fn client_event(&self, event: &str) -> Option<ServerEvent> {
        let voice = event == "join_voice_room" || event == "leave_voice_room";
        let message = match self {
            GatewayError::UnknownTarget(_) => return None,
            GatewayError::CapacityExceeded => {
                return Some(ServerEvent::CapacityExceeded(Notice {
                    message: self.to_string(),
                }))
            }
            GatewayError::CollaboratorUnavailable(_) if voice => {
                "Could not process the voice room request".to_string()
            }
            GatewayError::CollaboratorUnavailable(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        Some(if voice {
            ServerEvent::voice_room_error(message)
        } else {
            ServerEvent::error(message)
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("room seeding failed: {0}")]
    Seed(#[from] StoreError),
}

#[cfg(unix)]
const EIO: i32 = 5;

/// I/O conditions the process survives: logged and absorbed, never fatal.
pub fn is_transient_io(err: &io::Error) -> bool {
    is_eio(err)
        || matches!(
            err.kind(),
            io::ErrorKind::BrokenPipe
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::Interrupted
                | io::ErrorKind::WouldBlock
                | io::ErrorKind::TimedOut
                | io::ErrorKind::StorageFull
        )
}

#[cfg(unix)]
fn is_eio(err: &io::Error) -> bool {
    err.raw_os_error() == Some(EIO)
}

#[cfg(not(unix))]
fn is_eio(_err: &io::Error) -> bool {
    false
}

/// First `io::Error` in an error's source chain.
pub fn io_cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> Option<&'a io::Error> {
    let mut current = Some(err);
    while let Some(err) = current {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return Some(io);
        }
        current = err.source();
    }
    None
}
