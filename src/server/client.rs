//! Per-client connection state: selected database, transaction queue, WATCH
//! set, pub/sub subscriptions, and the outbound frame channel.

use crate::resp::RespValue;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use tokio::sync::mpsc;

pub type ClientId = u64;

/// A queued command awaiting `EXEC`, stored as raw argument bytes so it can
/// be re-dispatched exactly as if it had arrived standalone.
#[derive(Debug, Clone)]
pub struct QueuedCommand {
    pub args: Vec<Bytes>,
}

/// Transaction state machine for `MULTI`/`EXEC`/`DISCARD`/`WATCH`.
#[derive(Debug, Default)]
pub struct TransactionState {
    pub queueing: bool,
    pub queue: Vec<QueuedCommand>,
    /// (db index, key) -> version observed at WATCH time.
    pub watched: HashMap<(usize, Bytes), u64>,
    /// Set once any watched key's version diverges; EXEC then returns a
    /// null array instead of running the queue.
    pub dirty: bool,
}

impl TransactionState {
    pub fn reset(&mut self) {
        self.queueing = false;
        self.queue.clear();
        self.watched.clear();
        self.dirty = false;
    }
}

/// Per-connection state shared between the read loop and the dispatcher.
pub struct ClientState {
    pub id: ClientId,
    pub peer_addr: String,
    pub name: String,
    pub db_index: usize,
    pub protocol: u8,
    pub transaction: TransactionState,
    pub subscriptions: HashSet<Bytes>,
    pub psubscriptions: HashSet<Bytes>,
    pub out_tx: mpsc::UnboundedSender<RespValue>,
    pub closing: bool,
    /// Set once this connection has issued `PSYNC` and become a replica
    /// link, so the connection loop can detach it from
    /// [`crate::replication::ReplicationState`] on disconnect.
    pub replica_link_id: Option<u64>,
}

impl ClientState {
    pub fn new(id: ClientId, peer_addr: String, out_tx: mpsc::UnboundedSender<RespValue>) -> Self {
        Self {
            id,
            peer_addr,
            name: String::new(),
            db_index: 0,
            protocol: 2,
            transaction: TransactionState::default(),
            subscriptions: HashSet::new(),
            psubscriptions: HashSet::new(),
            out_tx,
            closing: false,
            replica_link_id: None,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len() + self.psubscriptions.len()
    }

    pub fn send(&self, value: RespValue) {
        let _ = self.out_tx.send(value);
    }
}
