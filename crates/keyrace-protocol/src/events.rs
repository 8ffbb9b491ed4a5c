//! Events exchanged between browser clients and the server.
//!
//! Every frame is one JSON object shaped `{"event": "<name>", "data": {...}}`
//! (serde's adjacently tagged representation). Event names are snake_case;
//! payload fields are camelCase.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::{Difficulty, LobbySummary, PlayerId, RoomCode, RoomSnapshot};

// ---------------------------------------------------------------------------
// Client → server
// ---------------------------------------------------------------------------

/// Commands a client can send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateLobby(CreateLobby),
    JoinLobby(JoinLobby),
    StartGame(RoomRef),
    UpdateProgress(UpdateProgress),
    SetReady(SetReady),
    LeaveLobby(RoomRef),
    ListLobbies,
    ResumeSession(ResumeSession),
    Ping(Ping),
}

impl ClientEvent {
    /// Event name as it appears on the wire, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateLobby(_) => "create_lobby",
            Self::JoinLobby(_) => "join_lobby",
            Self::StartGame(_) => "start_game",
            Self::UpdateProgress(_) => "update_progress",
            Self::SetReady(_) => "set_ready",
            Self::LeaveLobby(_) => "leave_lobby",
            Self::ListLobbies => "list_lobbies",
            Self::ResumeSession(_) => "resume_session",
            Self::Ping(_) => "ping",
        }
    }
}

/// `create_lobby` payload.
///
/// `mode` stays a string and `max_players` any JSON number, so that an
/// unknown mode or a fractional or negative limit is reported as
/// `InvalidConfig` rather than as an undecodable frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLobby {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub theme: String,
    pub mode: String,
    pub max_players: f64,
    #[serde(default)]
    pub password: Option<String>,
}

/// `join_lobby` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinLobby {
    pub room_id: RoomCode,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub theme: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Payload naming just a room: `start_game`, `leave_lobby`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomRef {
    pub room_id: RoomCode,
}

/// `update_progress` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProgress {
    pub room_id: RoomCode,
    pub progress: f64,
    #[serde(default)]
    pub wpm: f64,
}

/// `set_ready` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetReady {
    pub room_id: RoomCode,
    pub ready: bool,
}

/// `resume_session` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeSession {
    pub token: String,
}

/// `ping` payload. The client's clock is echoed back for RTT estimates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ping {
    #[serde(default)]
    pub client_time: u64,
}

// ---------------------------------------------------------------------------
// Server → client
// ---------------------------------------------------------------------------

/// Events the server sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// First frame on every connection.
    Connected(Connected),
    /// To the creator of a new room.
    LobbyCreated(RoomSnapshot),
    /// Membership changed (join, leave, disconnect, resume).
    PlayerJoined(RoomSnapshot),
    /// To a player right after a successful join.
    JoinedSuccess(RoomSnapshot),
    /// Readiness or round bookkeeping changed.
    RoomUpdated(RoomSnapshot),
    GameStarting(RoundStart),
    OpponentProgress(ProgressUpdate),
    RoundFinished(RoundResult),
    LeftLobby(RoomRef),
    LobbyList(LobbyList),
    /// To a player whose `resume_session` succeeded.
    SessionResumed(RoomSnapshot),
    RoomClosed(RoomClosed),
    Pong(Pong),
    Error(ErrorPayload),
}

impl ServerEvent {
    /// Builds an `error` event.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            code,
            message: message.into(),
        })
    }

    /// The room snapshot carried by this event, if any.
    pub fn snapshot(&self) -> Option<&RoomSnapshot> {
        match self {
            Self::LobbyCreated(s)
            | Self::PlayerJoined(s)
            | Self::JoinedSuccess(s)
            | Self::RoomUpdated(s)
            | Self::SessionResumed(s) => Some(s),
            _ => None,
        }
    }
}

/// `connected` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connected {
    pub connection_id: PlayerId,
    /// Present when the server holds slots for dropped players; send it
    /// back in `resume_session` after reconnecting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    /// Server clock, unix milliseconds.
    pub server_time: u64,
}

/// `game_starting` payload, identical for every member of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundStart {
    pub round: u32,
    pub difficulty: Difficulty,
    pub text: String,
    /// Round length in seconds.
    pub time: u64,
    /// Unix milliseconds at which typing begins.
    pub start_timestamp: u64,
}

/// `opponent_progress` payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub connection_id: PlayerId,
    pub progress: f64,
    pub wpm: f64,
}

/// Why a round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    TimeUp,
    AllCompleted,
}

/// One line of the final standings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standing {
    pub rank: u32,
    pub connection_id: PlayerId,
    pub username: String,
    pub progress: f64,
    pub wpm: f64,
    pub completed: bool,
    /// Milliseconds from round start to 100%, for players who finished.
    pub completion_ms: Option<u64>,
}

/// `round_finished` payload. Standings are ordered by rank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub round: u32,
    pub reason: FinishReason,
    pub standings: Vec<Standing>,
}

/// `lobby_list` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyList {
    pub lobbies: Vec<LobbySummary>,
}

/// `room_closed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomClosed {
    pub room_id: RoomCode,
    pub reason: String,
}

/// `pong` payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pong {
    pub client_time: u64,
    pub server_time: u64,
}

/// Machine-readable error kinds carried in `error` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCode {
    InvalidConfig,
    RoomNotFound,
    RoomFull,
    RoomNotJoinable,
    WrongPassword,
    NotHost,
    NotEnoughPlayers,
    AlreadyInRoom,
    NotInRoom,
    InvalidProgress,
    RoundInProgress,
    MalformedMessage,
    SessionExpired,
    Internal,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// `error` payload. Sent only to the connection whose command failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub code: ErrorCode,
    pub message: String,
}
