//! Authoritative server for the Code-Master guessing game.
//!
//! Layout mirrors the data flow: bytes become frames in [`connection`],
//! frames become events the [`coordinator`] serializes over the lobby and
//! the match, fan-out goes back through the [`registry`], and finished
//! matches land in the [`recorder`].

pub mod connection;
pub mod coordinator;
pub mod recorder;
pub mod registry;
