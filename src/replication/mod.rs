//! Replication: master-side write fan-out, replica role bookkeeping, and
//! the `REPLICAOF`/`SLAVEOF`/`PSYNC`/`REPLCONF` operator and protocol
//! commands.
//!
//! The master side is wired end to end: `PSYNC` (handled in
//! `dispatch::invoke`) sends a `FULLRESYNC` reply and an RDB snapshot, then
//! calls [`ReplicationState::attach_replica`] with the connection's own
//! outbound frame channel — the same channel `SUBSCRIBE` already pushes
//! frames through — so [`ReplicationState::propagate`] reaches it exactly
//! like a pub/sub message reaches a subscriber. Only full resync is
//! supported; there is no backlog for a partial (`CONTINUE`) resync after a
//! brief disconnect, so every `PSYNC` pays for a fresh snapshot transfer.
//!
//! The replica side — connecting out to a master and performing this same
//! handshake as the client — is not implemented. `ReplicationState` tracks
//! the role and offset that path would update, and `REPLICAOF`/`SLAVEOF`
//! correctly flips the role, but nothing here opens an outbound connection
//! or ingests a master's stream.

use crate::resp::{encode_command, RespValue};
use bytes::Bytes;
use parking_lot::RwLock;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Master,
    Replica { host: String, port: u16 },
}

struct ReplicaLink {
    id: u64,
    addr: String,
    tx: UnboundedSender<RespValue>,
}

pub struct ReplicationState {
    role: RwLock<Role>,
    replid: String,
    offset: AtomicU64,
    replicas: RwLock<Vec<ReplicaLink>>,
    next_replica_id: AtomicU64,
}

fn random_replid() -> String {
    let mut rng = rand::thread_rng();
    (0..40).map(|_| std::char::from_digit(rng.gen_range(0..16), 16).unwrap()).collect()
}

impl ReplicationState {
    pub fn new() -> Self {
        Self {
            role: RwLock::new(Role::Master),
            replid: random_replid(),
            offset: AtomicU64::new(0),
            replicas: RwLock::new(Vec::new()),
            next_replica_id: AtomicU64::new(1),
        }
    }

    pub fn replid(&self) -> &str {
        &self.replid
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Relaxed)
    }

    pub fn role(&self) -> Role {
        self.role.read().clone()
    }

    pub fn is_replica(&self) -> bool {
        matches!(*self.role.read(), Role::Replica { .. })
    }

    pub fn set_master(&self) {
        *self.role.write() = Role::Master;
    }

    pub fn set_replica_of(&self, host: String, port: u16) {
        *self.role.write() = Role::Replica { host, port };
    }

    /// Registers a freshly attached replica link, returning its id for
    /// later unregistration. `tx` is the same outbound-frame channel the
    /// connection's own command replies and pub/sub pushes travel over.
    pub fn attach_replica(&self, addr: String, tx: UnboundedSender<RespValue>) -> u64 {
        let id = self.next_replica_id.fetch_add(1, Ordering::Relaxed);
        self.replicas.write().push(ReplicaLink { id, addr, tx });
        id
    }

    pub fn detach_replica(&self, id: u64) {
        self.replicas.write().retain(|r| r.id != id);
    }

    pub fn connected_replicas(&self) -> usize {
        self.replicas.read().len()
    }

    /// Fans a write command out to every attached replica, selecting the
    /// target database first since each replica link may be pinned to a
    /// different `SELECT` than the one the client that issued the write
    /// was on. The replication offset advances by the wire size the
    /// command would occupy in the append-only log's framing, independent
    /// of the in-process `RespValue` frames actually pushed to replicas.
    pub fn propagate(&self, db_index: usize, args: &[Bytes]) {
        if args.is_empty() {
            return;
        }
        let select = encode_command(&[b"SELECT", db_index.to_string().as_bytes()]);
        let borrowed: Vec<&[u8]> = args.iter().map(|a| a.as_ref()).collect();
        let command = encode_command(&borrowed);
        self.offset.fetch_add((select.len() + command.len()) as u64, Ordering::Relaxed);

        let select_frame = RespValue::Array(vec![
            RespValue::BulkString(Bytes::from_static(b"SELECT")),
            RespValue::BulkString(Bytes::from(db_index.to_string())),
        ]);
        let command_frame = RespValue::Array(args.iter().cloned().map(RespValue::BulkString).collect());

        let mut dead = Vec::new();
        for link in self.replicas.read().iter() {
            if link.tx.send(select_frame.clone()).is_err() || link.tx.send(command_frame.clone()).is_err() {
                dead.push(link.id);
            }
        }
        if !dead.is_empty() {
            self.replicas.write().retain(|r| !dead.contains(&r.id));
        }
    }

    pub fn info_section(&self) -> String {
        match self.role() {
            Role::Master => format!(
                "role:master\r\nconnected_slaves:{}\r\nmaster_replid:{}\r\nmaster_repl_offset:{}\r\n",
                self.connected_replicas(),
                self.replid,
                self.offset(),
            ),
            Role::Replica { host, port } => format!(
                "role:slave\r\nmaster_host:{host}\r\nmaster_port:{port}\r\nmaster_link_status:down\r\nmaster_repl_offset:{}\r\n",
                self.offset(),
            ),
        }
    }

    #[cfg(test)]
    fn replica_addrs(&self) -> Vec<String> {
        self.replicas.read().iter().map(|r| r.addr.clone()).collect()
    }
}

impl Default for ReplicationState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn starts_as_master_with_no_replicas() {
        let repl = ReplicationState::new();
        assert_eq!(repl.role(), Role::Master);
        assert_eq!(repl.connected_replicas(), 0);
    }

    #[test]
    fn set_replica_of_changes_role() {
        let repl = ReplicationState::new();
        repl.set_replica_of("10.0.0.1".to_string(), 6380);
        assert!(repl.is_replica());
    }

    #[test]
    fn propagate_sends_select_and_command_to_each_replica() {
        let repl = ReplicationState::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        repl.attach_replica("127.0.0.1:1".to_string(), tx);
        repl.propagate(0, &[Bytes::from_static(b"SET"), Bytes::from_static(b"k"), Bytes::from_static(b"v")]);
        let select = rx.try_recv().unwrap();
        assert_eq!(
            select,
            RespValue::Array(vec![RespValue::BulkString(Bytes::from_static(b"SELECT")), RespValue::BulkString(Bytes::from_static(b"0"))])
        );
        let command = rx.try_recv().unwrap();
        assert_eq!(
            command,
            RespValue::Array(vec![
                RespValue::BulkString(Bytes::from_static(b"SET")),
                RespValue::BulkString(Bytes::from_static(b"k")),
                RespValue::BulkString(Bytes::from_static(b"v")),
            ])
        );
    }

    #[test]
    fn dead_replica_is_pruned_on_propagate() {
        let repl = ReplicationState::new();
        let (tx, rx) = mpsc::unbounded_channel();
        repl.attach_replica("127.0.0.1:1".to_string(), tx);
        drop(rx);
        repl.propagate(0, &[Bytes::from_static(b"PING")]);
        assert!(repl.replica_addrs().is_empty());
    }
}
