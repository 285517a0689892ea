//! Server core: per-connection state (`client`), pub/sub registry
//! (`pubsub`), the blocking-command waiter registry (`blocking`), stats
//! (`stats`), and the `Server` struct that ties them to a `Keyspace` and
//! drives the TCP accept loop.

pub mod blocking;
pub mod client;
pub mod pubsub;
pub mod stats;

use crate::cluster::ClusterState;
use crate::config::Options;
use crate::dispatch::{self, Context};
use crate::error::{RedisError, Result};
use crate::keyspace::Keyspace;
use crate::persistence::{aof, snapshot, AofWriter};
use crate::replication::ReplicationState;
use crate::resp::{encode_value, parse_slice, RespValue};
use bytes::{Buf, Bytes, BytesMut};
use client::ClientState;
use parking_lot::Mutex;
use pubsub::PubSub;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use stats::Stats;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::Instrument;

/// All shared state one running instance needs, independent of any single
/// connection.
pub struct Server {
    pub keyspace: Keyspace,
    pub pubsub: PubSub,
    pub blocking: blocking::BlockingManager,
    pub stats: Stats,
    pub aof: Mutex<Option<AofWriter>>,
    pub options: Options,
    pub cluster: ClusterState,
    pub replication: ReplicationState,
    pub start_time_ms: i64,
    next_client_id: AtomicU64,
}

impl Server {
    pub fn new(options: Options) -> Result<Self> {
        let keyspace = Keyspace::new(options.db_num);

        if options.rdb_enabled && Path::new(&options.rdb_filename).exists() {
            snapshot::load_from_file(&keyspace, Path::new(&options.rdb_filename))?;
            tracing::info!(file = %options.rdb_filename, "loaded snapshot");
        }

        let aof = if options.aof_enabled {
            if Path::new(&options.aof_filename).exists() {
                aof::replay(Path::new(&options.aof_filename), |db_index, args| {
                    let mut db = keyspace.db(db_index).write();
                    let _ = crate::dispatch::apply_replayed(&mut db, args);
                    Ok(())
                })?;
                tracing::info!(file = %options.aof_filename, "replayed append log");
            }
            Some(AofWriter::open(&options.aof_filename)?)
        } else {
            None
        };

        let cluster_node_id = options.cluster_node_id.clone().unwrap_or_else(|| format!("node-{}", std::process::id()));
        let cluster = ClusterState::new(cluster_node_id, options.addr.clone(), options.cluster_enabled);

        Ok(Self {
            keyspace,
            pubsub: PubSub::default(),
            blocking: blocking::BlockingManager::default(),
            stats: Stats::new(128, options.slowlog_threshold_us),
            aof: Mutex::new(aof),
            options,
            cluster,
            replication: ReplicationState::new(),
            start_time_ms: crate::keyspace::now_ms(),
            next_client_id: AtomicU64::new(1),
        })
    }

    fn context(&self) -> Context<'_> {
        Context {
            keyspace: &self.keyspace,
            pubsub: &self.pubsub,
            blocking: &self.blocking,
            stats: &self.stats,
            aof: &self.aof,
            options: &self.options,
            cluster: &self.cluster,
            replication: &self.replication,
            start_time_ms: self.start_time_ms,
        }
    }

    fn bind_addr(&self) -> String {
        if let Some(rest) = self.options.addr.strip_prefix(':') {
            format!("0.0.0.0:{rest}")
        } else {
            self.options.addr.clone()
        }
    }

    /// Runs the accept loop and background maintenance tasks until the
    /// process receives a shutdown signal. Never returns on success.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let addr = self.bind_addr();
        let listener = TcpListener::bind(&addr).await.map_err(RedisError::Io)?;
        tracing::info!(%addr, "listening");

        let sweeper = Arc::clone(&self);
        tokio::spawn(async move { sweeper.run_active_expire_cycle().await });

        loop {
            let (socket, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let _ = socket.set_nodelay(true);
            let server = Arc::clone(&self);
            tokio::spawn(async move { server.handle_connection(socket, peer.to_string()).await });
        }
    }

    async fn run_active_expire_cycle(self: Arc<Self>) {
        let mut interval = tokio::time::interval(Duration::from_millis(100));
        loop {
            interval.tick().await;
            for i in 0..self.keyspace.count() {
                self.keyspace.db(i).write().sweep_sample(20);
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, socket: TcpStream, peer_addr: String) {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        let span = tracing::info_span!("connection", client_id = id, peer = %peer_addr);
        self.stats.record_connection();

        async move {
            let (mut reader, mut writer) = socket.into_split();
            let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<RespValue>();
            let mut client = ClientState::new(id, peer_addr, out_tx);
            let mut buf = BytesMut::with_capacity(4096);
            let mut read_buf = [0u8; 4096];

            'connection: loop {
                tokio::select! {
                    frame = out_rx.recv() => {
                        match frame {
                            Some(value) => {
                                let mut out = Vec::new();
                                encode_value(&mut out, &value, client.protocol);
                                if writer.write_all(&out).await.is_err() {
                                    break 'connection;
                                }
                            }
                            None => break 'connection,
                        }
                    }
                    n = reader.read(&mut read_buf) => {
                        let n = match n {
                            Ok(0) | Err(_) => break 'connection,
                            Ok(n) => n,
                        };
                        buf.extend_from_slice(&read_buf[..n]);

                        loop {
                            match parse_slice(&buf) {
                                Ok((value, consumed)) => {
                                    buf.advance(consumed);
                                    let args = match frame_to_args(&value) {
                                        Some(a) if !a.is_empty() => a,
                                        _ => {
                                            let err = RespValue::Error(RedisError::Protocol("expected command array".to_string()).wire_message());
                                            let mut out = Vec::new();
                                            encode_value(&mut out, &err, client.protocol);
                                            if writer.write_all(&out).await.is_err() {
                                                break 'connection;
                                            }
                                            continue;
                                        }
                                    };

                                    let ctx = self.context();
                                    if let Some(reply) = dispatch::dispatch(&ctx, &mut client, args).await {
                                        let mut out = Vec::new();
                                        encode_value(&mut out, &reply, client.protocol);
                                        if writer.write_all(&out).await.is_err() {
                                            break 'connection;
                                        }
                                    }
                                    if client.closing {
                                        break 'connection;
                                    }
                                }
                                Err(RedisError::Incomplete) => break,
                                Err(e) => {
                                    let mut out = Vec::new();
                                    encode_value(&mut out, &RespValue::Error(e.wire_message()), client.protocol);
                                    let _ = writer.write_all(&out).await;
                                    break 'connection;
                                }
                            }
                        }
                    }
                }
            }

            self.pubsub.unsubscribe_all(id);
            if let Some(link_id) = client.replica_link_id {
                self.replication.detach_replica(link_id);
            }
        }
        .instrument(span)
        .await
    }
}

fn frame_to_args(value: &RespValue) -> Option<Vec<Bytes>> {
    match value {
        RespValue::Array(items) => items
            .iter()
            .map(|item| match item {
                RespValue::BulkString(b) => Some(b.clone()),
                RespValue::SimpleString(s) => Some(Bytes::from(s.clone())),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_addr_prefixes_wildcard_for_bare_port() {
        let mut options = Options::default();
        options.addr = ":6399".to_string();
        let server = Server::new(options).unwrap();
        assert_eq!(server.bind_addr(), "0.0.0.0:6399");
    }

    #[test]
    fn bind_addr_passes_through_explicit_host() {
        let mut options = Options::default();
        options.addr = "127.0.0.1:6399".to_string();
        let server = Server::new(options).unwrap();
        assert_eq!(server.bind_addr(), "127.0.0.1:6399");
    }

    #[test]
    fn frame_to_args_rejects_non_array() {
        assert!(frame_to_args(&RespValue::SimpleString("OK".to_string())).is_none());
    }

    #[test]
    fn frame_to_args_extracts_bulk_strings() {
        let value = RespValue::Array(vec![RespValue::BulkString(Bytes::from_static(b"GET")), RespValue::BulkString(Bytes::from_static(b"k"))]);
        let args = frame_to_args(&value).unwrap();
        assert_eq!(args, vec![Bytes::from_static(b"GET"), Bytes::from_static(b"k")]);
    }
}
