//! Console command loop.
//!
//! Commands map straight to handlers in one table: `guess`, `chat`,
//! `start`, `status`, `help`, `exit`. Everything the server announces is
//! rendered by the reader task; stdin is read line by line here.

use std::sync::{Arc, Mutex};

use anyhow::Context;
use codemaster_core::protocol::{ClientFrame, PlayerId, ServerFrame};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::warn;

use crate::session::SessionModel;

const HELP: &str = "\
commands:
  guess <code>   submit a guess (only on your turn)
  chat <text>    say something to everyone
  start          ask the server to start a game now
  status         show your session state
  help           show this help
  exit           leave the game";

/// What a parsed command line asks for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Guess(String),
    Chat(String),
    Start,
    Status,
    Help,
    Exit,
    Empty,
    Unknown(String),
}

/// Split a line into keyword plus argument; case-insensitive keyword.
pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() {
        return Command::Empty;
    }
    let (keyword, rest) = match line.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (line, ""),
    };
    match keyword.to_lowercase().as_str() {
        "guess" => Command::Guess(rest.to_uppercase()),
        "chat" => Command::Chat(rest.to_string()),
        "start" => Command::Start,
        "status" => Command::Status,
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        other => Command::Unknown(other.to_string()),
    }
}

/// Turn a command into a frame to send, enforcing the turn guard locally.
pub fn frame_for(command: Command, session: &SessionModel) -> Result<Option<ClientFrame>, String> {
    match command {
        Command::Guess(guess) => {
            if guess.is_empty() {
                return Err("usage: guess <code>".into());
            }
            if !session.can_guess() {
                return Err("you cannot guess now: no active game or not your turn".into());
            }
            Ok(Some(ClientFrame::Guess { guess }))
        }
        Command::Chat(text) => {
            if text.is_empty() {
                return Err("usage: chat <text>".into());
            }
            Ok(Some(ClientFrame::Chat { text }))
        }
        Command::Start => Ok(Some(ClientFrame::StartGame)),
        Command::Status | Command::Help | Command::Exit | Command::Empty => Ok(None),
        Command::Unknown(keyword) => Err(format!("unknown command '{keyword}', try 'help'")),
    }
}

fn print_status(session: &SessionModel) {
    match session.player_id {
        Some(id) => println!("player id: {id}"),
        None => println!("player id: not assigned yet"),
    }
    if session.game_active {
        println!("game: in progress");
        if let Some(info) = session.game_info {
            println!(
                "  code length {}, allowed attempts {}",
                info.code_length, info.allowed_attempts
            );
        }
        println!(
            "  turn: {}",
            if session.is_my_turn { "yours" } else { "another player" }
        );
    } else {
        println!("game: waiting for players");
    }
}

fn render(frame: &ServerFrame, my_id: Option<PlayerId>) {
    match frame {
        ServerFrame::Welcome { message, .. } => {
            if let Some(message) = message {
                println!("{message}");
            }
        }
        ServerFrame::GameStart {
            players,
            code_length,
            allowed_attempts,
            ..
        } => {
            println!(
                "game started: {} players, code length {}, {} attempts each",
                players.len(),
                code_length,
                allowed_attempts
            );
        }
        ServerFrame::YourTurn { message } => {
            println!("{}", message.as_deref().unwrap_or("Your turn!"));
        }
        ServerFrame::TurnChange { player_id } => {
            if Some(*player_id) == my_id {
                println!("your turn");
            } else {
                println!("player {player_id} is up");
            }
        }
        ServerFrame::GuessResult {
            player_id,
            guess,
            black_markers,
            white_markers,
            attempts,
        } => {
            let who = if Some(*player_id) == my_id {
                "you".to_string()
            } else {
                format!("player {player_id}")
            };
            println!(
                "{who} guessed {guess}: {black_markers} black, {white_markers} white (attempt {attempts})"
            );
        }
        ServerFrame::GameEnd {
            winner,
            secret_code,
            ..
        } => match winner {
            Some(id) if Some(*id) == my_id => {
                println!("you won! the code was {secret_code}")
            }
            Some(id) => println!("player {id} won, the code was {secret_code}"),
            None => println!("no winner this time, the code was {secret_code}"),
        },
        ServerFrame::Chat { player_id, text } => {
            if Some(*player_id) == my_id {
                println!("you: {text}");
            } else {
                println!("player {player_id}: {text}");
            }
        }
        ServerFrame::Error { message } => {
            println!("server error: {message}");
        }
    }
}

/// Drive one connected session until exit or server close.
pub async fn run(stream: TcpStream) -> anyhow::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let session = Arc::new(Mutex::new(SessionModel::default()));

    let reader_session = session.clone();
    let mut reader = tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            match serde_json::from_str::<ServerFrame>(&line) {
                Ok(frame) => {
                    let my_id = {
                        let mut session =
                            reader_session.lock().unwrap_or_else(|e| e.into_inner());
                        session.apply(&frame);
                        session.player_id
                    };
                    render(&frame, my_id);
                }
                Err(e) => warn!("unreadable frame from server: {}", e),
            }
        }
        println!("server closed the connection");
    });

    println!("{HELP}");
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = &mut reader => break,
            line = stdin.next_line() => {
                let Some(line) = line.context("reading stdin")? else {
                    break;
                };
                let command = parse_command(&line);
                match command {
                    Command::Help => {
                        println!("{HELP}");
                        continue;
                    }
                    Command::Status => {
                        let session = session.lock().unwrap_or_else(|e| e.into_inner());
                        print_status(&session);
                        continue;
                    }
                    Command::Exit => break,
                    _ => {}
                }

                let frame = {
                    let session = session.lock().unwrap_or_else(|e| e.into_inner());
                    frame_for(command, &session)
                };
                match frame {
                    Ok(Some(frame)) => {
                        let mut payload = serde_json::to_vec(&frame)?;
                        payload.push(b'\n');
                        write_half
                            .write_all(&payload)
                            .await
                            .context("sending to server")?;
                    }
                    Ok(None) => {}
                    Err(message) => println!("{message}"),
                }
            }
        }
    }

    Ok(())
}
