//! Game coordinator: the single writer over lobby and match state.
//!
//! Every state-mutating event (join, leave, guess, chat, admission check)
//! funnels through one task consuming an event channel. Handlers only
//! enqueue outbound frames; they never touch a socket, so no event can
//! stall behind a slow client. When a bounded outbound queue overflows the
//! owning player is dropped, handled with the same rules as a disconnect.

use chrono::{DateTime, Utc};
use codemaster_core::config::GameConfig;
use codemaster_core::game::{generate_secret, GameState};
use codemaster_core::protocol::{ClientFrame, PlayerId, ServerFrame};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::recorder::{MatchRecord, MatchRecorder, PlayerEntry};
use crate::registry::{ConnectionRegistry, SendStatus};

const YOUR_TURN_PROMPT: &str = "Your turn! Enter a guess.";

/// Events funneled into the coordinator from connection drivers.
#[derive(Debug)]
pub enum Event {
    Connected {
        id: PlayerId,
        sender: mpsc::Sender<ServerFrame>,
    },
    Disconnected {
        id: PlayerId,
    },
    Frame {
        id: PlayerId,
        frame: ClientFrame,
    },
}

/// Where secret codes come from. A closure so tests can pin the code;
/// production uses a ChaCha20 generator seeded once from OS entropy.
pub type SecretSource = Box<dyn FnMut(&GameConfig) -> String + Send>;

struct ActiveGame {
    game_id: Uuid,
    started_at: DateTime<Utc>,
    state: GameState,
    /// turn queue, in admission order
    queue: Vec<PlayerId>,
    /// index of the player holding the turn
    current: usize,
}

pub struct GameCoordinator {
    config: GameConfig,
    registry: ConnectionRegistry,
    recorder: Box<dyn MatchRecorder + Send>,
    secrets: SecretSource,
    game: Option<ActiveGame>,
    /// players whose outbound queue overflowed during the current event
    pending_drops: Vec<PlayerId>,
}

impl GameCoordinator {
    pub fn new(config: GameConfig, recorder: Box<dyn MatchRecorder + Send>) -> Self {
        let mut rng = ChaCha20Rng::from_entropy();
        Self {
            config,
            registry: ConnectionRegistry::new(),
            recorder,
            secrets: Box::new(move |config| generate_secret(config, &mut rng)),
            game: None,
            pending_drops: Vec::new(),
        }
    }

    /// Replace the secret generator. Test seam.
    pub fn with_secret_source(mut self, secrets: SecretSource) -> Self {
        self.secrets = secrets;
        self
    }

    /// Consume events until every sender is gone.
    pub async fn run(mut self, mut events: mpsc::Receiver<Event>) {
        while let Some(event) = events.recv().await {
            self.handle(event);
        }
        info!("coordinator shutting down");
    }

    /// Apply one event. Synchronous on purpose: handlers only mutate state
    /// and enqueue frames.
    pub fn handle(&mut self, event: Event) {
        match event {
            Event::Connected { id, sender } => self.on_connected(id, sender),
            Event::Disconnected { id } => self.remove_player(id),
            Event::Frame { id, frame } => {
                if !self.registry.is_connected(id) {
                    return;
                }
                match frame {
                    ClientFrame::Guess { guess } => self.on_guess(id, guess),
                    ClientFrame::Chat { text } => self.on_chat(id, text),
                    ClientFrame::StartGame => self.check_admission(),
                }
            }
        }
        self.reap_overflowed();
    }

    fn on_connected(&mut self, id: PlayerId, sender: mpsc::Sender<ServerFrame>) {
        self.registry.attach(id, sender);
        info!("player {} connected", id);

        self.send_to(
            id,
            ServerFrame::Welcome {
                player_id: id,
                message: Some(format!("Welcome to Code-Master! Your id: {id}")),
            },
        );
        self.check_admission();
    }

    /// Evaluate the lobby admit condition; identical for joins, game ends,
    /// and explicit start_game requests.
    fn check_admission(&mut self) {
        if self.game.is_some() {
            return;
        }
        let waiting = self.registry.waiting().len();
        if waiting < self.config.min_players || waiting > self.config.max_players {
            return;
        }
        self.start_game();
    }

    fn start_game(&mut self) {
        let players: Vec<PlayerId> = self
            .registry
            .waiting()
            .iter()
            .take(self.config.max_players)
            .copied()
            .collect();

        let secret = (self.secrets)(&self.config);
        let state = match GameState::start(self.config.clone(), &players, secret) {
            Ok(state) => state,
            Err(e) => {
                error!("refusing to start game: {}", e);
                return;
            }
        };

        let game_id = Uuid::new_v4();
        self.registry.move_to_active(&players);
        self.game = Some(ActiveGame {
            game_id,
            started_at: Utc::now(),
            state,
            queue: players.clone(),
            current: 0,
        });

        info!("game {} started with {} players", game_id, players.len());

        self.fan_out(ServerFrame::GameStart {
            game_id,
            players: players.clone(),
            code_length: self.config.code_length,
            allowed_attempts: self.config.allowed_attempts,
        });
        self.send_to(
            players[0],
            ServerFrame::YourTurn {
                message: Some(YOUR_TURN_PROMPT.into()),
            },
        );
    }

    fn on_guess(&mut self, id: PlayerId, guess: String) {
        let current_actor = match &self.game {
            Some(game) => game.queue.get(game.current).copied(),
            None => {
                self.send_error(id, "No game is in progress");
                return;
            }
        };
        if current_actor != Some(id) {
            self.send_error(id, "It is not your turn");
            return;
        }

        let guess = guess.to_uppercase();
        if guess.chars().count() != self.config.code_length {
            let message = format!(
                "The guess must be exactly {} symbols",
                self.config.code_length
            );
            self.send_error(id, &message);
            return;
        }

        let result = match self.game.as_mut() {
            Some(game) => game.state.apply_guess(id, &guess),
            None => return,
        };
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                self.send_error(id, &e.to_string());
                return;
            }
        };

        self.fan_out(ServerFrame::GuessResult {
            player_id: id,
            guess: outcome.guess,
            black_markers: outcome.marks.black,
            white_markers: outcome.marks.white,
            attempts: outcome.attempts,
        });

        if outcome.terminal {
            self.finish_game();
        } else {
            self.advance_turn();
        }
    }

    fn advance_turn(&mut self) {
        let next = match self.game.as_mut() {
            Some(game) => {
                game.current = (game.current + 1) % game.queue.len();
                game.queue[game.current]
            }
            None => return,
        };
        self.announce_turn(next);
    }

    /// Broadcast first, then the directed nudge.
    fn announce_turn(&mut self, next: PlayerId) {
        self.fan_out(ServerFrame::TurnChange { player_id: next });
        self.send_to(
            next,
            ServerFrame::YourTurn {
                message: Some(YOUR_TURN_PROMPT.into()),
            },
        );
    }

    fn on_chat(&mut self, id: PlayerId, text: String) {
        self.fan_out(ServerFrame::Chat {
            player_id: id,
            text,
        });
    }

    /// Shared exit path for disconnects and outbound-queue overflow.
    fn remove_player(&mut self, id: PlayerId) {
        if !self.registry.is_connected(id) {
            return;
        }
        info!("player {} disconnected", id);
        self.registry.detach(id);

        enum AfterLeave {
            Untouched,
            Finish,
            Announce(PlayerId),
        }

        let action = match self.game.as_mut() {
            None => return,
            Some(game) => {
                let Some(idx) = game.queue.iter().position(|p| *p == id) else {
                    // a waiter left; the match is untouched
                    return;
                };
                game.queue.remove(idx);
                game.state.retire_player(id);

                if game.queue.len() < self.config.min_players {
                    game.state.abort();
                    AfterLeave::Finish
                } else if game.state.is_terminal() {
                    // the leaver was the last one holding up exhaustion
                    AfterLeave::Finish
                } else if idx < game.current {
                    game.current -= 1;
                    AfterLeave::Untouched
                } else if idx == game.current {
                    // the slot that was next now sits at the same index;
                    // wrap if the leaver held the tail
                    game.current %= game.queue.len();
                    AfterLeave::Announce(game.queue[game.current])
                } else {
                    AfterLeave::Untouched
                }
            }
        };

        match action {
            AfterLeave::Untouched => {}
            AfterLeave::Finish => self.finish_game(),
            AfterLeave::Announce(next) => self.announce_turn(next),
        }
    }

    fn finish_game(&mut self) {
        let Some(game) = self.game.take() else {
            return;
        };
        let snapshot = game.state.snapshot();
        let secret = snapshot.secret.unwrap_or_default();
        let ended_at = Utc::now();

        let record = MatchRecord {
            game_id: game.game_id,
            start_time: game.started_at,
            end_time: ended_at,
            secret_code: secret.clone(),
            winner: snapshot.winner,
            players: snapshot
                .attempts
                .iter()
                .map(|(id, attempts)| PlayerEntry {
                    id: *id,
                    attempts: *attempts,
                })
                .collect(),
        };
        match self.recorder.record(&record) {
            Ok(locator) => info!("game {} recorded at {}", game.game_id, locator),
            // the record is lost but the server keeps running
            Err(e) => error!("failed to record game {}: {}", game.game_id, e),
        }

        match snapshot.winner {
            Some(winner) => info!("game {} won by {}", game.game_id, winner),
            None => info!("game {} ended without a winner", game.game_id),
        }

        self.fan_out(ServerFrame::GameEnd {
            winner: snapshot.winner,
            secret_code: secret,
            player_attempts: snapshot.attempts,
        });

        // survivors rejoin the back of the waiting line in admission order
        let survivors: Vec<PlayerId> = self.registry.active().to_vec();
        self.registry.return_to_waiting(&survivors);

        self.check_admission();
    }

    fn send_to(&mut self, id: PlayerId, frame: ServerFrame) {
        if self.registry.send(id, frame) == SendStatus::Overflow {
            self.pending_drops.push(id);
        }
    }

    fn send_error(&mut self, id: PlayerId, message: &str) {
        self.send_to(
            id,
            ServerFrame::Error {
                message: message.to_string(),
            },
        );
    }

    fn fan_out(&mut self, frame: ServerFrame) {
        let overflowed = self.registry.broadcast(&frame, &[]);
        self.pending_drops.extend(overflowed);
    }

    /// Drop players whose outbound queue overflowed; treated exactly like a
    /// disconnect, which may in turn end the game and overflow others.
    fn reap_overflowed(&mut self) {
        while let Some(id) = self.pending_drops.pop() {
            if !self.registry.is_connected(id) {
                continue;
            }
            warn!("outbound queue overflow for {}, dropping connection", id);
            self.remove_player(id);
        }
    }
}
