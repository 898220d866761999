//! Connection registry: outbound senders plus lobby bookkeeping.
//!
//! Keyed by player id. Mutated only from the coordinator task, so no locks.
//! `waiting` keeps insertion order because the turn queue of the next match
//! is built from it.

use std::collections::HashMap;

use codemaster_core::protocol::{PlayerId, ServerFrame};
use tokio::sync::mpsc;

/// Result of enqueueing a frame toward one player.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    Queued,
    /// Receiver unknown or already closed. A no-op, never an error.
    Gone,
    /// Bounded queue full: the client is too slow and must be dropped.
    Overflow,
}

pub struct ConnectionRegistry {
    senders: HashMap<PlayerId, mpsc::Sender<ServerFrame>>,
    waiting: Vec<PlayerId>,
    active: Vec<PlayerId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
            waiting: Vec::new(),
            active: Vec::new(),
        }
    }

    /// Register a fresh connection; the player starts out waiting.
    pub fn attach(&mut self, id: PlayerId, sender: mpsc::Sender<ServerFrame>) {
        self.senders.insert(id, sender);
        self.waiting.push(id);
    }

    /// Drop a connection from every set. Dropping the sender closes the
    /// outbound queue, which lets the writer task drain and exit.
    pub fn detach(&mut self, id: PlayerId) {
        self.senders.remove(&id);
        self.waiting.retain(|p| *p != id);
        self.active.retain(|p| *p != id);
    }

    pub fn is_connected(&self, id: PlayerId) -> bool {
        self.senders.contains_key(&id)
    }

    /// Enqueue one frame without blocking the coordinator.
    pub fn send(&self, id: PlayerId, frame: ServerFrame) -> SendStatus {
        let Some(sender) = self.senders.get(&id) else {
            return SendStatus::Gone;
        };
        match sender.try_send(frame) {
            Ok(()) => SendStatus::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => SendStatus::Overflow,
            Err(mpsc::error::TrySendError::Closed(_)) => SendStatus::Gone,
        }
    }

    /// Enqueue a frame to every known connection outside `exclude`.
    /// Returns the ids whose queues overflowed so the caller can drop them.
    pub fn broadcast(&self, frame: &ServerFrame, exclude: &[PlayerId]) -> Vec<PlayerId> {
        let mut overflowed = Vec::new();
        for id in self.senders.keys() {
            if exclude.contains(id) {
                continue;
            }
            if self.send(*id, frame.clone()) == SendStatus::Overflow {
                overflowed.push(*id);
            }
        }
        overflowed
    }

    /// Move the given waiters into the active set, keeping their order.
    pub fn move_to_active(&mut self, ids: &[PlayerId]) {
        for id in ids {
            if let Some(pos) = self.waiting.iter().position(|p| p == id) {
                self.waiting.remove(pos);
                self.active.push(*id);
            }
        }
    }

    /// Return match survivors to the back of the waiting line, in order.
    pub fn return_to_waiting(&mut self, ids: &[PlayerId]) {
        for id in ids {
            if let Some(pos) = self.active.iter().position(|p| p == id) {
                self.active.remove(pos);
                if self.senders.contains_key(id) {
                    self.waiting.push(*id);
                }
            }
        }
    }

    pub fn waiting(&self) -> &[PlayerId] {
        &self.waiting
    }

    pub fn active(&self) -> &[PlayerId] {
        &self.active
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
