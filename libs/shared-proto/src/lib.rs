
pub mod signaling {
    use serde::{Deserialize, Serialize};

    pub const PROTOCOL_VERSION: u8 = 1;

    /// Kind of WebRTC negotiation step carried by a signal. Types the gateway
    /// does not know are kept verbatim in `Other` and relayed unchanged.
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "kebab-case")]
    pub enum SignalType {
        Offer,
        Answer,
        IceCandidate,
        #[serde(untagged)]
        Other(String),
    }

    impl SignalType {
        pub fn as_str(&self) -> &str {
            match self {
                SignalType::Offer => "offer",
                SignalType::Answer => "answer",
                SignalType::IceCandidate => "ice-candidate",
                SignalType::Other(raw) => raw,
            }
        }
    }

    /// Signal as sent by the originating client.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct OutgoingSignal {
        pub target_user_id: String,
        pub signal_type: SignalType,
        /// Opaque to the gateway (SDP, ICE candidate, ...).
        pub signal_data: serde_json::Value,
    }

    /// Signal as delivered to the target client.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct IncomingSignal {
        pub sender_user_id: String,
        pub signal_type: SignalType,
        pub signal_data: serde_json::Value,
    }
}

pub mod voice {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct JoinVoiceRoom {
        pub room_id: String,
        pub user_id: String,
        #[serde(default)]
        pub username: Option<String>,
        #[serde(default)]
        pub password: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct LeaveVoiceRoom {
        pub room_id: String,
        pub user_id: String,
        #[serde(default)]
        pub username: Option<String>,
    }

    /// Membership change seen by the other members of a room.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct VoiceMember {
        pub user_id: String,
        pub username: String,
        pub timestamp: DateTime<Utc>,
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct VoiceRoomJoined {
        pub room_id: String,
        pub success: bool,
    }
}

pub mod events {
    use serde::{Deserialize, Serialize};

    use crate::signaling::{IncomingSignal, OutgoingSignal};
    use crate::voice::{JoinVoiceRoom, LeaveVoiceRoom, VoiceMember, VoiceRoomJoined};

    /// Frames a client sends to the gateway.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "snake_case")]
    pub enum ClientEvent {
        Identify(String),
        JoinVoiceRoom(JoinVoiceRoom),
        LeaveVoiceRoom(LeaveVoiceRoom),
        Signal(OutgoingSignal),
    }

    impl ClientEvent {
        pub fn name(&self) -> &'static str {
            match self {
                ClientEvent::Identify(_) => "identify",
                ClientEvent::JoinVoiceRoom(_) => "join_voice_room",
                ClientEvent::LeaveVoiceRoom(_) => "leave_voice_room",
                ClientEvent::Signal(_) => "signal",
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct Notice {
        pub message: String,
    }

    /// Frames the gateway pushes to clients.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(tag = "type", content = "payload", rename_all = "snake_case")]
    pub enum ServerEvent {
        UserOnline(String),
        UserOffline(String),
        UserJoinedVoice(VoiceMember),
        UserLeftVoice(VoiceMember),
        VoiceRoomJoined(VoiceRoomJoined),
        VoiceRoomError(Notice),
        Signal(IncomingSignal),
        CapacityExceeded(Notice),
        Error(Notice),
    }

    impl ServerEvent {
        pub fn voice_room_error(message: impl Into<String>) -> Self {
            ServerEvent::VoiceRoomError(Notice {
                message: message.into(),
            })
        }

        pub fn error(message: impl Into<String>) -> Self {
            ServerEvent::Error(Notice {
                message: message.into(),
            })
        }
    }

}
