//! Per-connection I/O driver.
//!
//! One reader task and one writer task per socket. The reader turns
//! newline-delimited JSON into coordinator events; malformed lines are
//! answered with a directed `error` frame without bothering the
//! coordinator. The writer drains a bounded queue so a slow client backs
//! up only its own queue, never the broadcaster. When the coordinator
//! detaches a player the queue closes; the writer flushes whatever is
//! already queued and shuts the socket down.

use codemaster_core::protocol::{ClientFrame, PlayerId, ServerFrame};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::coordinator::Event;

/// Largest accepted inbound frame, terminator included.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Frames queued toward one client before it counts as stuck.
pub const OUTBOUND_QUEUE_DEPTH: usize = 64;

/// Wire a fresh connection into the coordinator and spawn its I/O tasks.
///
/// The `Connected` event is delivered before the reader starts, so the
/// coordinator always learns about a player before their first frame.
pub async fn spawn(stream: TcpStream, id: PlayerId, events: mpsc::Sender<Event>) {
    let (read_half, write_half) = stream.into_split();
    let (frames_tx, frames_rx) = mpsc::channel(OUTBOUND_QUEUE_DEPTH);

    // the reader only gets a weak handle: the registry's sender must stay
    // the sole strong one, so detaching a player closes the queue and the
    // writer can drain and hang up
    let weak_tx = frames_tx.downgrade();

    if events
        .send(Event::Connected {
            id,
            sender: frames_tx,
        })
        .await
        .is_err()
    {
        // coordinator already gone; nothing to drive
        return;
    }

    tokio::spawn(write_loop(write_half, frames_rx));
    tokio::spawn(read_loop(read_half, id, events, weak_tx));
}

async fn read_loop(
    read_half: OwnedReadHalf,
    id: PlayerId,
    events: mpsc::Sender<Event>,
    outbound: mpsc::WeakSender<ServerFrame>,
) {
    let mut reader = BufReader::new(read_half).take(MAX_FRAME_BYTES as u64);
    let mut buf = Vec::with_capacity(256);

    loop {
        buf.clear();
        reader.set_limit(MAX_FRAME_BYTES as u64);
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if !buf.ends_with(b"\n") && reader.limit() == 0 {
                    // a line this long cannot be resynchronized
                    warn!("oversized frame from {}, dropping connection", id);
                    break;
                }
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match serde_json::from_str::<ClientFrame>(line) {
                    Ok(frame) => {
                        if events.send(Event::Frame { id, frame }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        debug!("malformed frame from {}: {}", id, e);
                        if let Some(outbound) = outbound.upgrade() {
                            let _ = outbound.try_send(ServerFrame::Error {
                                message: format!("invalid message: {e}"),
                            });
                        }
                    }
                }
            }
            Err(e) => {
                debug!("read error from {}: {}", id, e);
                break;
            }
        }
    }

    let _ = events.send(Event::Disconnected { id }).await;
}

async fn write_loop(mut write_half: OwnedWriteHalf, mut frames: mpsc::Receiver<ServerFrame>) {
    // recv keeps yielding already-queued frames after the senders close,
    // which is exactly the drain-then-shutdown behavior we want
    while let Some(frame) = frames.recv().await {
        let mut payload = match serde_json::to_vec(&frame) {
            Ok(payload) => payload,
            Err(e) => {
                error!("unencodable outbound frame: {}", e);
                continue;
            }
        };
        payload.push(b'\n');
        if write_half.write_all(&payload).await.is_err() {
            break;
        }
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use uuid::Uuid;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (client, server)
    }

    #[tokio::test]
    async fn test_connected_arrives_before_first_frame() {
        let (mut client, server) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let id = Uuid::new_v4();

        client
            .write_all(b"{\"type\":\"start_game\"}\n")
            .await
            .unwrap();
        spawn(server, id, events_tx).await;

        match events_rx.recv().await.unwrap() {
            Event::Connected { id: got, .. } => assert_eq!(got, id),
            other => panic!("expected Connected, got {other:?}"),
        }
        match events_rx.recv().await.unwrap() {
            Event::Frame { frame, .. } => assert_eq!(frame, ClientFrame::StartGame),
            other => panic!("expected Frame, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_line_gets_error_and_connection_survives() {
        let (mut client, server) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        spawn(server, Uuid::new_v4(), events_tx).await;

        // keep the registry-side sender alive, as an attached player's is
        let _sender = match events_rx.recv().await.unwrap() {
            Event::Connected { sender, .. } => sender,
            other => panic!("expected Connected, got {other:?}"),
        };

        client.write_all(b"this is not json\n").await.unwrap();
        client
            .write_all(b"{\"type\":\"chat\",\"text\":\"hi\"}\n")
            .await
            .unwrap();

        // the bad line is answered on the wire, not surfaced as an event
        match events_rx.recv().await.unwrap() {
            Event::Frame { frame, .. } => {
                assert_eq!(frame, ClientFrame::Chat { text: "hi".into() })
            }
            other => panic!("expected Frame, got {other:?}"),
        }

        let mut lines = tokio::io::BufReader::new(client).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let frame: ServerFrame = serde_json::from_str(&line).unwrap();
        assert!(matches!(frame, ServerFrame::Error { .. }));
    }

    #[tokio::test]
    async fn test_eof_produces_disconnected() {
        let (client, server) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        spawn(server, id, events_tx).await;

        let _ = events_rx.recv().await; // Connected
        drop(client);

        match events_rx.recv().await.unwrap() {
            Event::Disconnected { id: got } => assert_eq!(got, id),
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_oversized_frame_drops_the_connection() {
        let (mut client, server) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        let id = Uuid::new_v4();
        spawn(server, id, events_tx).await;
        let _ = events_rx.recv().await; // Connected

        let huge = vec![b'x'; MAX_FRAME_BYTES + 1];
        client.write_all(&huge).await.unwrap();
        client.flush().await.unwrap();

        match events_rx.recv().await.unwrap() {
            Event::Disconnected { id: got } => assert_eq!(got, id),
            other => panic!("expected Disconnected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_writer_drains_queue_after_detach() {
        let (client, server) = connected_pair().await;
        let (events_tx, mut events_rx) = mpsc::channel(8);
        spawn(server, Uuid::new_v4(), events_tx).await;

        let sender = match events_rx.recv().await.unwrap() {
            Event::Connected { sender, .. } => sender,
            other => panic!("expected Connected, got {other:?}"),
        };

        for n in 0..3 {
            sender
                .send(ServerFrame::Chat {
                    player_id: Uuid::nil(),
                    text: format!("queued {n}"),
                })
                .await
                .unwrap();
        }
        drop(sender); // what detach does: close the queue

        let mut lines = tokio::io::BufReader::new(client).lines();
        for n in 0..3 {
            let line = lines.next_line().await.unwrap().unwrap();
            let frame: ServerFrame = serde_json::from_str(&line).unwrap();
            assert_eq!(
                frame,
                ServerFrame::Chat {
                    player_id: Uuid::nil(),
                    text: format!("queued {n}"),
                }
            );
        }
        // then the writer shuts the stream down
        assert_eq!(lines.next_line().await.unwrap(), None);
    }
}
