//! Wire protocol: newline-delimited JSON frames over TCP.
//!
//! Every frame is a UTF-8 JSON object with a `type` tag followed by `\n`.
//! Unknown tags and missing fields fail to decode; the connection driver
//! answers those with a directed `error` frame and keeps the connection
//! open.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque player identifier, assigned by the server at connect.
pub type PlayerId = Uuid;

/// Frames a client may send.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// One attempt at the secret code. The server uppercases it.
    Guess { guess: String },
    /// Free-form chat, relayed to everyone.
    Chat { text: String },
    /// Ask the server to re-evaluate lobby admission right now.
    StartGame,
}

/// Frames the server may send.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// First frame on every connection.
    Welcome {
        player_id: PlayerId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Broadcast when a match begins.
    GameStart {
        game_id: Uuid,
        players: Vec<PlayerId>,
        code_length: usize,
        allowed_attempts: u32,
    },
    /// Directed to the player whose turn just started.
    YourTurn {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Broadcast after every non-terminal guess; carries the next actor.
    TurnChange { player_id: PlayerId },
    /// Broadcast after every accepted guess.
    GuessResult {
        player_id: PlayerId,
        guess: String,
        black_markers: usize,
        white_markers: usize,
        attempts: u32,
    },
    /// Broadcast when a match ends; reveals the secret.
    GameEnd {
        winner: Option<PlayerId>,
        secret_code: String,
        player_attempts: HashMap<PlayerId, u32>,
    },
    /// Chat relay.
    Chat { player_id: PlayerId, text: String },
    /// Directed to one offender; never broadcast.
    Error { message: String },
}
