//! Client-side mirror of the server's announced game state.
//!
//! Interop depends on these flags flipping exactly as specified: a client
//! may only send a guess while a game is active and it holds the turn.
//! Either `your_turn` or `turn_change` may be observed first; both set the
//! turn flag consistently.

use codemaster_core::protocol::{PlayerId, ServerFrame};

/// Match parameters announced in `game_start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameInfo {
    pub code_length: usize,
    pub allowed_attempts: u32,
}

#[derive(Debug, Default)]
pub struct SessionModel {
    pub player_id: Option<PlayerId>,
    pub game_active: bool,
    pub is_my_turn: bool,
    pub game_info: Option<GameInfo>,
}

impl SessionModel {
    /// Fold one observed frame into the session.
    pub fn apply(&mut self, frame: &ServerFrame) {
        match frame {
            ServerFrame::Welcome { player_id, .. } => {
                self.player_id = Some(*player_id);
            }
            ServerFrame::GameStart {
                code_length,
                allowed_attempts,
                ..
            } => {
                self.game_active = true;
                self.is_my_turn = false;
                self.game_info = Some(GameInfo {
                    code_length: *code_length,
                    allowed_attempts: *allowed_attempts,
                });
            }
            ServerFrame::YourTurn { .. } => {
                self.is_my_turn = true;
            }
            ServerFrame::TurnChange { player_id } => {
                self.is_my_turn = Some(*player_id) == self.player_id;
            }
            ServerFrame::GameEnd { .. } => {
                self.game_active = false;
                self.is_my_turn = false;
            }
            ServerFrame::GuessResult { .. } | ServerFrame::Chat { .. } | ServerFrame::Error { .. } => {}
        }
    }

    /// Guessing is legal only mid-game on our own turn. Chat is always fine.
    pub fn can_guess(&self) -> bool {
        self.game_active && self.is_my_turn
    }
}
