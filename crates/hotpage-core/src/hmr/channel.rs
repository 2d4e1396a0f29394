//! Broadcast-only live update channel.
//!
//! Each connected client owns an unbounded queue; the socket task drains
//! it in FIFO order. Delivery is at-most-once: a client that is not
//! connected when a message goes out never sees it and relies on the
//! generation check at reconnect.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use super::protocol::HmrMessage;

pub type ClientId = u64;

/// A send to one client failed. Local to that client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("client {0} is gone")]
    ClientGone(ClientId),
}

/// Registry of connected clients plus the current build generation.
#[derive(Debug, Default)]
pub struct LiveChannel {
    clients: RwLock<HashMap<ClientId, UnboundedSender<HmrMessage>>>,
    next_id: AtomicU64,
    generation: AtomicU64,
    // Replayed to clients that connect while the build is broken.
    last_error: Mutex<Option<HmrMessage>>,
}

impl LiveChannel {
    #[must_use]
    pub fn new(generation: u64) -> Self {
        let channel = Self::default();
        channel.generation.store(generation, Ordering::SeqCst);
        channel
    }

    /// Register a client.
    ///
    /// The client immediately receives `connected`, then a stale `reload`
    /// when `last_generation` differs from the current generation, then the
    /// pending error if the latest build failed.
    pub fn connect(&self, last_generation: Option<u64>) -> (ClientId, UnboundedReceiver<HmrMessage>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = unbounded_channel();

        // Held until the client is registered: a generation bump plus
        // broadcast either lands before the check or reaches this client.
        let mut clients = self.clients.write();
        let generation = self.generation();
        let _ = tx.send(HmrMessage::Connected { generation });
        if let Some(seen) = last_generation {
            if seen != generation {
                tracing::debug!(client = id, seen, generation, "stale client, requesting reload");
                let _ = tx.send(HmrMessage::stale(generation));
            }
        }
        if let Some(error) = self.last_error.lock().clone() {
            let _ = tx.send(error);
        }
        clients.insert(id, tx);
        let count = clients.len();
        drop(clients);

        tracing::debug!(client = id, clients = count, "live client connected");
        (id, rx)
    }

    pub fn disconnect(&self, id: ClientId) {
        if self.clients.write().remove(&id).is_some() {
            tracing::debug!(client = id, "live client disconnected");
        }
    }

    /// Queue `message` for one client.
    pub fn send_to(&self, id: ClientId, message: HmrMessage) -> Result<(), BroadcastError> {
        let clients = self.clients.read();
        let tx = clients.get(&id).ok_or(BroadcastError::ClientGone(id))?;
        tx.send(message).map_err(|_| BroadcastError::ClientGone(id))
    }

    /// Queue `message` for every client. Returns how many received it.
    ///
    /// Clients whose queue is closed are dropped from the set.
    pub fn broadcast(&self, message: &HmrMessage) -> usize {
        let mut delivered = 0;
        let mut gone = Vec::new();
        {
            // Excludes `connect`, so a joining client either sees this
            // message or the state it leaves behind.
            let clients = self.clients.read();
            match message {
                HmrMessage::Error { .. } => *self.last_error.lock() = Some(message.clone()),
                HmrMessage::Update { .. } | HmrMessage::Reload { .. } => {
                    *self.last_error.lock() = None;
                }
                HmrMessage::Connected { .. } => {}
            }
            for (id, tx) in clients.iter() {
                if tx.send(message.clone()).is_ok() {
                    delivered += 1;
                } else {
                    tracing::debug!(client = *id, "dropping live client");
                    gone.push(*id);
                }
            }
        }
        if !gone.is_empty() {
            let mut clients = self.clients.write();
            for id in gone {
                clients.remove(&id);
            }
        }

        tracing::trace!(kind = message.kind(), delivered, "broadcast");
        delivered
    }

    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn set_generation(&self, generation: u64) {
        self.generation.store(generation, Ordering::SeqCst);
    }
}
