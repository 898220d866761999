//! Core rules and protocol for the Code-Master guessing game.
//!
//! The server generates a secret code, players take turns guessing it, and
//! every guess is scored with black markers (right symbol, right position)
//! and white markers (right symbol, wrong position). This crate holds the
//! pure pieces: scoring, match state, configuration, and the wire frames.
//! All I/O lives in the server and client binaries.

pub mod config;
pub mod evaluator;
pub mod game;
pub mod protocol;

pub use config::GameConfig;
pub use evaluator::{evaluate, Marks};
pub use game::{generate_secret, GameError, GameState, GuessOutcome, Snapshot};
pub use protocol::{ClientFrame, PlayerId, ServerFrame};
