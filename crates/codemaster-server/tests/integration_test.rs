//! End-to-end scenarios over a real TCP listener.
//!
//! Each test boots a server with a pinned secret code and an in-memory
//! recorder, then drives it with raw newline-delimited JSON like any
//! conforming client would.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use codemaster_core::config::GameConfig;
use codemaster_core::protocol::{PlayerId, ServerFrame};
use codemaster_server::connection;
use codemaster_server::coordinator::GameCoordinator;
use codemaster_server::recorder::{MatchRecord, MemoryRecorder};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use uuid::Uuid;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_server(config: GameConfig, secret: &str) -> (SocketAddr, Arc<Mutex<Vec<MatchRecord>>>) {
    let recorder = MemoryRecorder::new();
    let records = recorder.handle();

    let secret = secret.to_string();
    let coordinator = GameCoordinator::new(config, Box::new(recorder))
        .with_secret_source(Box::new(move |_| secret.clone()));

    let (events_tx, events_rx) = mpsc::channel(64);
    tokio::spawn(coordinator.run(events_rx));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            connection::spawn(stream, Uuid::new_v4(), events_tx.clone()).await;
        }
    });

    (addr, records)
}

struct TestClient {
    id: PlayerId,
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl TestClient {
    async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        let (read_half, write_half) = stream.into_split();
        let mut client = Self {
            id: Uuid::nil(),
            lines: BufReader::new(read_half).lines(),
            write: write_half,
        };
        match client.next_frame().await {
            ServerFrame::Welcome { player_id, .. } => client.id = player_id,
            other => panic!("expected welcome, got {other:?}"),
        }
        client
    }

    async fn send(&mut self, frame: serde_json::Value) {
        let mut line = frame.to_string();
        line.push('\n');
        self.write.write_all(line.as_bytes()).await.unwrap();
    }

    async fn next_frame(&mut self) -> ServerFrame {
        let line = timeout(RECV_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for a frame")
            .unwrap()
            .expect("connection closed while waiting for a frame");
        serde_json::from_str(&line).unwrap()
    }

    /// Skip frames until one matches; bails on anything unexpected after a
    /// bounded number of frames.
    async fn next_matching<T>(&mut self, pick: impl Fn(&ServerFrame) -> Option<T>) -> T {
        for _ in 0..32 {
            let frame = self.next_frame().await;
            if let Some(value) = pick(&frame) {
                return value;
            }
        }
        panic!("no matching frame within 32 frames");
    }

    async fn expect_game_start(&mut self) {
        self.next_matching(|f| matches!(f, ServerFrame::GameStart { .. }).then_some(()))
            .await;
    }

    async fn expect_your_turn(&mut self) {
        self.next_matching(|f| matches!(f, ServerFrame::YourTurn { .. }).then_some(()))
            .await;
    }
}

#[tokio::test]
async fn test_exact_win_broadcasts_result_and_end() {
    let (addr, records) = start_server(GameConfig::default(), "ABCD").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;
    c1.expect_your_turn().await;

    // lowercase on the wire; the server uppercases
    c1.send(json!({"type": "guess", "guess": "abcd"})).await;

    let winner_id = c1.id;
    for client in [&mut c1, &mut c2] {
        let result = client
            .next_matching(|f| match f {
                ServerFrame::GuessResult {
                    player_id,
                    guess,
                    black_markers,
                    white_markers,
                    attempts,
                } => Some((*player_id, guess.clone(), *black_markers, *white_markers, *attempts)),
                _ => None,
            })
            .await;
        assert_eq!(result, (winner_id, "ABCD".to_string(), 4, 0, 1));

        let (winner, secret) = client
            .next_matching(|f| match f {
                ServerFrame::GameEnd {
                    winner,
                    secret_code,
                    ..
                } => Some((*winner, secret_code.clone())),
                _ => None,
            })
            .await;
        assert_eq!(winner, Some(winner_id));
        assert_eq!(secret, "ABCD");
    }

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner, Some(winner_id));
    assert_eq!(records[0].secret_code, "ABCD");
}

#[tokio::test]
async fn test_duplicate_letter_white_counting() {
    let (addr, _records) = start_server(GameConfig::default(), "AABC").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;
    c1.expect_your_turn().await;

    c1.send(json!({"type": "guess", "guess": "ABAC"})).await;

    let (black, white) = c2
        .next_matching(|f| match f {
            ServerFrame::GuessResult {
                black_markers,
                white_markers,
                ..
            } => Some((*black_markers, *white_markers)),
            _ => None,
        })
        .await;
    assert_eq!((black, white), (2, 2));
}

#[tokio::test]
async fn test_wrong_length_guess_is_free() {
    let (addr, _records) = start_server(GameConfig::default(), "XYZW").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;
    c1.expect_your_turn().await;

    c1.send(json!({"type": "guess", "guess": "XY"})).await;
    let message = c1
        .next_matching(|f| match f {
            ServerFrame::Error { message } => Some(message.clone()),
            _ => None,
        })
        .await;
    assert!(message.contains('4'), "error should name the length: {message}");

    // the attempt was free: a follow-up well-formed guess is attempt 1
    c1.send(json!({"type": "guess", "guess": "AAAA"})).await;
    let attempts = c1
        .next_matching(|f| match f {
            ServerFrame::GuessResult { attempts, .. } => Some(*attempts),
            _ => None,
        })
        .await;
    assert_eq!(attempts, 1);
}

#[tokio::test]
async fn test_out_of_turn_guess_rejected() {
    let (addr, _records) = start_server(GameConfig::default(), "ABCD").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;
    c1.expect_your_turn().await;

    // c2 jumps the queue and is told off privately
    c2.send(json!({"type": "guess", "guess": "ABCD"})).await;
    let frame = c2.next_frame().await;
    assert!(matches!(frame, ServerFrame::Error { .. }), "got {frame:?}");

    // no guess_result was broadcast: c1's next frame after its own guess
    // is that guess's result, with c2 still at zero attempts
    c1.send(json!({"type": "guess", "guess": "AAAA"})).await;
    let frame = c1.next_frame().await;
    match frame {
        ServerFrame::GuessResult { player_id, .. } => assert_eq!(player_id, c1.id),
        other => panic!("expected guess_result, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exhaustion_without_winner() {
    let config = GameConfig {
        allowed_attempts: 2,
        ..Default::default()
    };
    let (addr, records) = start_server(config, "AAAA").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;
    c1.expect_your_turn().await;

    for round in 0..2 {
        if round > 0 {
            c1.expect_your_turn().await;
        }
        c1.send(json!({"type": "guess", "guess": "BBBB"})).await;
        c2.expect_your_turn().await;
        c2.send(json!({"type": "guess", "guess": "CCCC"})).await;
    }

    let (winner, secret, attempts) = c1
        .next_matching(|f| match f {
            ServerFrame::GameEnd {
                winner,
                secret_code,
                player_attempts,
            } => Some((*winner, secret_code.clone(), player_attempts.clone())),
            _ => None,
        })
        .await;
    assert_eq!(winner, None);
    assert_eq!(secret, "AAAA");
    assert_eq!(attempts.len(), 2);
    assert!(attempts.values().all(|n| *n == 2));

    let records = records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].winner, None);
}

#[tokio::test]
async fn test_disconnect_below_min_aborts_and_returns_survivor_to_lobby() {
    let (addr, records) = start_server(GameConfig::default(), "ABCD").await;
    let c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c2.expect_game_start().await;
    drop(c1);

    let (winner, secret) = c2
        .next_matching(|f| match f {
            ServerFrame::GameEnd {
                winner,
                secret_code,
                ..
            } => Some((*winner, secret_code.clone())),
            _ => None,
        })
        .await;
    assert_eq!(winner, None);
    assert_eq!(secret, "ABCD", "the secret is revealed even on abort");
    assert_eq!(records.lock().unwrap().len(), 1);

    // the survivor went back to waiting: one more join starts a new game
    let mut c3 = TestClient::connect(addr).await;
    c3.expect_game_start().await;
    c2.expect_game_start().await;
}

#[tokio::test]
async fn test_malformed_and_unknown_frames_answered_privately() {
    let (addr, _records) = start_server(GameConfig::default(), "ABCD").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;

    c2.send(json!({"type": "no_such_frame"})).await;
    let frame = c2.next_frame().await;
    assert!(matches!(frame, ServerFrame::Error { .. }), "got {frame:?}");

    // the connection stays usable afterwards
    c2.send(json!({"type": "chat", "text": "still here"})).await;
    let text = c1
        .next_matching(|f| match f {
            ServerFrame::Chat { text, .. } => Some(text.clone()),
            _ => None,
        })
        .await;
    assert_eq!(text, "still here");
}

#[tokio::test]
async fn test_chat_relayed_to_all_players() {
    let (addr, _records) = start_server(GameConfig::default(), "ABCD").await;
    let mut c1 = TestClient::connect(addr).await;
    let mut c2 = TestClient::connect(addr).await;

    c1.expect_game_start().await;
    c2.expect_game_start().await;

    c1.send(json!({"type": "chat", "text": "good luck"})).await;

    let from_id = c1.id;
    for client in [&mut c1, &mut c2] {
        let (from, text) = client
            .next_matching(|f| match f {
                ServerFrame::Chat { player_id, text } => Some((*player_id, text.clone())),
                _ => None,
            })
            .await;
        assert_eq!(from, from_id);
        assert_eq!(text, "good luck");
    }
}
