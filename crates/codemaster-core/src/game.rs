//! Match state: secret code, per-player attempts, winner, terminal flag.
//!
//! `GameState` is owned by a single writer (the server's coordinator) and
//! never shared, so it is plain synchronous code. Once the terminal flag is
//! set no further guess can change any field.

use std::collections::HashMap;

use rand::Rng;
use thiserror::Error;

use crate::config::GameConfig;
use crate::evaluator::{evaluate, Marks};
use crate::protocol::PlayerId;

/// Draw a fresh secret: uniform independent samples over the alphabet.
pub fn generate_secret<R: Rng>(config: &GameConfig, rng: &mut R) -> String {
    (0..config.code_length)
        .map(|_| config.alphabet[rng.gen_range(0..config.alphabet.len())])
        .collect()
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("the game is over or you are not a participant")]
    NotActive,

    #[error("the guess must be exactly {expected} symbols")]
    WrongLength { expected: usize },

    #[error("a game needs between {min} and {max} players, got {got}")]
    BadPlayerCount { min: usize, max: usize, got: usize },
}

/// What one accepted guess produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuessOutcome {
    /// the guess as evaluated (uppercased)
    pub guess: String,
    pub marks: Marks,
    /// the guesser's attempt count after this guess
    pub attempts: u32,
    pub is_winner: bool,
    /// true when this guess ended the match
    pub terminal: bool,
}

/// End-of-game view of the match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// revealed only once the match is over
    pub secret: Option<String>,
    pub attempts: HashMap<PlayerId, u32>,
    pub winner: Option<PlayerId>,
}

/// One active match.
#[derive(Debug)]
pub struct GameState {
    config: GameConfig,
    secret: String,
    /// attempt counts for everyone who started the match, leavers included
    attempts: HashMap<PlayerId, u32>,
    /// players still seated; only they count toward exhaustion
    participants: Vec<PlayerId>,
    winner: Option<PlayerId>,
    terminal: bool,
}

impl GameState {
    /// Start a match with the given participants and secret.
    ///
    /// Rejects participant counts outside the configured bounds. The secret
    /// is supplied by the caller so tests can pin it; production code feeds
    /// in [`generate_secret`] output.
    pub fn start(
        config: GameConfig,
        player_ids: &[PlayerId],
        secret: String,
    ) -> Result<Self, GameError> {
        if player_ids.len() < config.min_players || player_ids.len() > config.max_players {
            return Err(GameError::BadPlayerCount {
                min: config.min_players,
                max: config.max_players,
                got: player_ids.len(),
            });
        }

        Ok(Self {
            attempts: player_ids.iter().map(|id| (*id, 0)).collect(),
            participants: player_ids.to_vec(),
            secret,
            config,
            winner: None,
            terminal: false,
        })
    }

    /// Apply one guess from `player`.
    ///
    /// A wrong-length guess is a validation error and does not consume an
    /// attempt. A well-formed guess always increments the player's attempt
    /// count, winning or not.
    pub fn apply_guess(&mut self, player: PlayerId, guess: &str) -> Result<GuessOutcome, GameError> {
        if self.terminal || !self.participants.contains(&player) {
            return Err(GameError::NotActive);
        }

        let guess = guess.to_uppercase();
        let marks = evaluate(&self.secret, &guess).ok_or(GameError::WrongLength {
            expected: self.config.code_length,
        })?;

        let attempts = self
            .attempts
            .get_mut(&player)
            .ok_or(GameError::NotActive)?;
        *attempts += 1;
        let attempts = *attempts;

        if marks.black == self.config.code_length {
            self.winner = Some(player);
            self.terminal = true;
        } else if self.all_exhausted() {
            self.terminal = true;
        }

        Ok(GuessOutcome {
            guess,
            marks,
            attempts,
            is_winner: self.winner == Some(player),
            terminal: self.terminal,
        })
    }

    /// Remove a leaver from the seated set. Their attempt count stays in the
    /// match record, but they no longer hold up collective exhaustion.
    pub fn retire_player(&mut self, player: PlayerId) {
        self.participants.retain(|p| *p != player);
        if !self.terminal && !self.participants.is_empty() && self.all_exhausted() {
            self.terminal = true;
        }
    }

    /// End the match without a winner (lobby fell below the minimum).
    pub fn abort(&mut self) {
        self.terminal = true;
    }

    /// Current view of the match; the secret stays hidden until terminal.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            secret: self.terminal.then(|| self.secret.clone()),
            attempts: self.attempts.clone(),
            winner: self.winner,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    pub fn winner(&self) -> Option<PlayerId> {
        self.winner
    }

    pub fn attempts_of(&self, player: PlayerId) -> u32 {
        self.attempts.get(&player).copied().unwrap_or(0)
    }

    fn all_exhausted(&self) -> bool {
        self.participants
            .iter()
            .all(|p| self.attempts.get(p).copied().unwrap_or(0) >= self.config.allowed_attempts)
    }
}
