//! Command dispatch: the name → arity/write-flag table and the end-to-end
//! request pipeline — lookup, arity check, `MULTI` queue interception,
//! invocation, stats/slowlog recording, and append-log fan-out for writes.

pub mod admin;
pub mod blocking;
pub mod generic;
pub mod hashes;
pub mod lists;
pub mod pubsub;
pub mod sets;
pub mod strings;
pub mod zsets;

use crate::cluster::ClusterState;
use crate::config::Options;
use crate::error::{RedisError, Result};
use crate::keyspace::Keyspace;
use crate::persistence::AofWriter;
use crate::replication::ReplicationState;
use crate::resp::RespValue;
use crate::server::blocking::BlockingManager;
use crate::server::client::{ClientState, QueuedCommand};
use crate::server::pubsub::PubSub;
use crate::server::stats::Stats;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Instant;

/// Arity and write-classification for one command name.
///
/// `arity >= 0` means an exact argument count (command name included);
/// `arity < 0` means "at least `-arity`", the convention real Redis uses
/// for its own command table.
pub struct CommandSpec {
    pub arity: i32,
    pub is_write: bool,
}

macro_rules! table {
    ($(($name:expr, $arity:expr, $write:expr)),+ $(,)?) => {{
        let mut m = HashMap::new();
        $(m.insert($name, CommandSpec { arity: $arity, is_write: $write });)+
        m
    }};
}

static TABLE: OnceLock<HashMap<&'static str, CommandSpec>> = OnceLock::new();

pub fn command_table() -> &'static HashMap<&'static str, CommandSpec> {
    TABLE.get_or_init(|| {
        table![
            ("PING", -1, false), ("ECHO", 2, false), ("SELECT", 2, false), ("AUTH", -2, false),
            ("HELLO", -1, false), ("CLIENT", -2, false), ("COMMAND", -1, false), ("CONFIG", -2, false),
            ("INFO", -1, false), ("LASTSAVE", 1, false), ("SLOWLOG", -2, false),
            ("BGREWRITEAOF", 1, false), ("REPLICAOF", 3, false), ("SLAVEOF", 3, false), ("SHUTDOWN", -1, false),
            ("PSYNC", 3, false), ("REPLCONF", -1, false),

            ("MULTI", 1, false), ("EXEC", 1, false), ("DISCARD", 1, false),
            ("WATCH", -2, false), ("UNWATCH", 1, false),

            ("SUBSCRIBE", -2, false), ("UNSUBSCRIBE", -1, false),
            ("PSUBSCRIBE", -2, false), ("PUNSUBSCRIBE", -1, false),
            ("PUBLISH", 3, false), ("PUBSUB", -2, false),

            ("BLPOP", -3, false), ("BRPOP", -3, false), ("BLMOVE", 6, false),
            ("BRPOPLPUSH", 4, false), ("BZPOPMIN", -3, false), ("BZPOPMAX", -3, false),

            ("GET", 2, false), ("SET", -3, true), ("SETNX", 3, true), ("GETSET", 3, true),
            ("GETDEL", 2, true), ("MGET", -2, false), ("MSET", -3, true), ("MSETNX", -3, true),
            ("APPEND", 3, true), ("STRLEN", 2, false), ("SETRANGE", 4, true), ("GETRANGE", 4, false),
            ("INCR", 2, true), ("DECR", 2, true), ("INCRBY", 3, true), ("DECRBY", 3, true),
            ("INCRBYFLOAT", 3, true),

            ("LPUSH", -3, true), ("RPUSH", -3, true), ("LPUSHX", -3, true), ("RPUSHX", -3, true),
            ("LPOP", -2, true), ("RPOP", -2, true), ("LLEN", 2, false), ("LINDEX", 3, false),
            ("LSET", 4, true), ("LRANGE", 4, false), ("LTRIM", 4, true), ("LREM", 4, true),
            ("LINSERT", 5, true), ("RPOPLPUSH", 3, true), ("LMOVE", 5, true), ("LPOS", -3, false),

            ("SADD", -3, true), ("SREM", -3, true), ("SMEMBERS", 2, false), ("SCARD", 2, false),
            ("SISMEMBER", 3, false), ("SMISMEMBER", -3, false), ("SPOP", -2, true),
            ("SRANDMEMBER", -2, false), ("SMOVE", 4, true), ("SINTER", -2, false),
            ("SUNION", -2, false), ("SDIFF", -2, false), ("SINTERCARD", -3, false),
            ("SINTERSTORE", -3, true), ("SUNIONSTORE", -3, true), ("SDIFFSTORE", -3, true),

            ("ZADD", -4, true), ("ZREM", -3, true), ("ZSCORE", 3, false), ("ZMSCORE", -3, false),
            ("ZCARD", 2, false), ("ZINCRBY", 4, true), ("ZRANK", -3, false), ("ZREVRANK", -3, false),
            ("ZRANGE", -4, false), ("ZRANGEBYSCORE", -4, false), ("ZREVRANGEBYSCORE", -4, false),
            ("ZCOUNT", 4, false), ("ZREMRANGEBYRANK", 4, true), ("ZREMRANGEBYSCORE", 4, true),
            ("ZRANDMEMBER", -2, false), ("ZRANGESTORE", -5, true), ("ZDIFFSTORE", -4, true),

            ("HSET", -4, true), ("HSETNX", 4, true), ("HGET", 3, false), ("HMGET", -3, false),
            ("HDEL", -3, true), ("HEXISTS", 3, false), ("HLEN", 2, false), ("HSTRLEN", 3, false),
            ("HKEYS", 2, false), ("HVALS", 2, false), ("HGETALL", 2, false), ("HINCRBY", 4, true),
            ("HINCRBYFLOAT", 4, true), ("HRANDFIELD", -2, false),

            ("DEL", -2, true), ("UNLINK", -2, true), ("EXISTS", -2, false), ("TOUCH", -2, false), ("EXPIRE", -3, true),
            ("PEXPIRE", -3, true), ("EXPIREAT", -3, true), ("PEXPIREAT", -3, true), ("TTL", 2, false),
            ("PTTL", 2, false), ("PERSIST", 2, true), ("TYPE", 2, false), ("OBJECT", -3, false),
            ("RENAME", 3, true), ("RENAMENX", 3, true), ("KEYS", 2, false), ("SCAN", -2, false),
            ("RANDOMKEY", 1, false), ("DBSIZE", 1, false), ("FLUSHDB", -1, true), ("FLUSHALL", -1, true),
            ("COPY", -3, true), ("MOVE", 3, true), ("SWAPDB", 3, true),

            ("CLUSTER", -2, false),
        ]
    })
}

/// Shared handles the dispatcher needs beyond the keyspace: pub/sub
/// registry, blocking-command waiter registry, stats/slowlog, the append
/// log (behind a mutex since writes are serialized through it), and the
/// resolved startup options.
pub struct Context<'a> {
    pub keyspace: &'a Keyspace,
    pub pubsub: &'a PubSub,
    pub blocking: &'a BlockingManager,
    pub stats: &'a Stats,
    pub aof: &'a Mutex<Option<AofWriter>>,
    pub options: &'a Options,
    pub cluster: &'a ClusterState,
    pub replication: &'a ReplicationState,
    pub start_time_ms: i64,
}

fn check_arity(spec: &CommandSpec, name: &str, argc: usize) -> Result<()> {
    let argc = argc as i32;
    let ok = if spec.arity >= 0 { argc == spec.arity } else { argc >= -spec.arity };
    if ok {
        Ok(())
    } else {
        Err(RedisError::wrong_args(name))
    }
}

/// Runs the full pipeline for one already-parsed command: lookup, arity
/// check, invocation, stats recording, and append-log fan-out. Used both
/// for standalone commands and for each command replayed out of a queued
/// `MULTI` transaction.
async fn execute_one(ctx: &Context<'_>, client: &mut ClientState, name: &str, args: &[Bytes]) -> Result<RespValue> {
    let spec = command_table().get(name).ok_or_else(|| RedisError::unknown_command(name))?;
    check_arity(spec, name, args.len())?;

    if ctx.cluster.is_enabled() {
        if let Some(key) = crate::cluster::extract_key(name, args) {
            ctx.cluster.check_slot(key)?;
        }
    }

    let start = Instant::now();
    let result = invoke(ctx, client, name, args).await;
    ctx.stats.record_command(&name.to_ascii_lowercase(), start.elapsed());

    if spec.is_write && result.is_ok() {
        if let Some(writer) = ctx.aof.lock().as_mut() {
            let _ = writer.append(client.db_index, args);
        }
        ctx.replication.propagate(client.db_index, args);
    }
    result
}

async fn invoke(ctx: &Context<'_>, client: &mut ClientState, name: &str, args: &[Bytes]) -> Result<RespValue> {
    macro_rules! with_db {
        ($body:expr) => {{
            let mut db = ctx.keyspace.db(client.db_index).write();
            $body(&mut db, args)
        }};
    }

    match name {
        "PING" => Ok(admin::ping(args)),
        "ECHO" => admin::echo(args),
        "SELECT" => admin::select(client, args, ctx.keyspace.count()),
        "AUTH" => Ok(admin::auth(args)),
        "HELLO" => admin::hello(client, args),
        "CLIENT" => admin::client_cmd(client, args),
        "COMMAND" => Ok(admin::command_cmd(args)),
        "CONFIG" => config_dispatch(ctx, args),
        "INFO" => {
            let cluster_section = format!("cluster_enabled:{}\r\n", ctx.cluster.is_enabled() as u8);
            Ok(admin::info(ctx.options, ctx.stats, ctx.keyspace.count(), ctx.start_time_ms, &ctx.replication.info_section(), &cluster_section))
        }
        "LASTSAVE" => Ok(admin::lastsave()),
        "SLOWLOG" => admin::slowlog(ctx.stats, args),
        "BGREWRITEAOF" => {
            let path = ctx.aof.lock().as_ref().map(|w| w.path().to_path_buf());
            if let Some(path) = path {
                crate::persistence::aof::rewrite(ctx.keyspace, &path)?;
            }
            Ok(RespValue::SimpleString("Background append only file rewriting started".to_string()))
        }
        "REPLICAOF" | "SLAVEOF" => {
            let host = String::from_utf8_lossy(&args[1]);
            let port_arg = String::from_utf8_lossy(&args[2]);
            if host.eq_ignore_ascii_case("no") && port_arg.eq_ignore_ascii_case("one") {
                ctx.replication.set_master();
            } else {
                let port: u16 = port_arg.parse().map_err(|_| RedisError::not_integer())?;
                ctx.replication.set_replica_of(host.to_string(), port);
            }
            Ok(RespValue::SimpleString("OK".to_string()))
        }
        "SHUTDOWN" => {
            client.closing = true;
            Ok(RespValue::SimpleString("OK".to_string()))
        }
        "REPLCONF" => Ok(RespValue::SimpleString("OK".to_string())),
        "PSYNC" => {
            client.send(RespValue::SimpleString(format!("FULLRESYNC {} {}", ctx.replication.replid(), ctx.replication.offset())));
            let snapshot = crate::persistence::snapshot::dump(ctx.keyspace);
            client.send(RespValue::BulkString(Bytes::from(snapshot)));
            let id = ctx.replication.attach_replica(client.peer_addr.clone(), client.out_tx.clone());
            client.replica_link_id = Some(id);
            Ok(RespValue::Null)
        }

        "SUBSCRIBE" => {
            pubsub::subscribe(ctx.pubsub, client, args);
            Ok(RespValue::Null)
        }
        "UNSUBSCRIBE" => {
            pubsub::unsubscribe(ctx.pubsub, client, args);
            Ok(RespValue::Null)
        }
        "PSUBSCRIBE" => {
            pubsub::psubscribe(ctx.pubsub, client, args);
            Ok(RespValue::Null)
        }
        "PUNSUBSCRIBE" => {
            pubsub::punsubscribe(ctx.pubsub, client, args);
            Ok(RespValue::Null)
        }
        "PUBLISH" => Ok(pubsub::publish(ctx.pubsub, args)),
        "PUBSUB" => pubsub::pubsub_cmd(ctx.pubsub, args),

        "BLPOP" => blocking::blpop(ctx.keyspace, ctx.blocking, client.db_index, args, false).await,
        "BRPOP" => blocking::blpop(ctx.keyspace, ctx.blocking, client.db_index, args, true).await,
        "BLMOVE" => blocking::blmove(ctx.keyspace, ctx.blocking, client.db_index, args).await,
        "BRPOPLPUSH" => blocking::brpoplpush(ctx.keyspace, ctx.blocking, client.db_index, args).await,
        "BZPOPMIN" => blocking::bzpop(ctx.keyspace, ctx.blocking, client.db_index, args, false).await,
        "BZPOPMAX" => blocking::bzpop(ctx.keyspace, ctx.blocking, client.db_index, args, true).await,

        "GET" => with_db!(strings::get),
        "SET" => with_db!(strings::set),
        "SETNX" => with_db!(strings::setnx),
        "GETSET" => with_db!(strings::getset),
        "GETDEL" => with_db!(strings::getdel),
        "MGET" => with_db!(strings::mget),
        "MSET" => with_db!(strings::mset),
        "MSETNX" => with_db!(strings::msetnx),
        "APPEND" => with_db!(strings::append),
        "STRLEN" => with_db!(strings::strlen),
        "SETRANGE" => with_db!(strings::setrange),
        "GETRANGE" => with_db!(strings::getrange),
        "INCR" => with_db!(strings::incr),
        "DECR" => with_db!(strings::decr),
        "INCRBY" => with_db!(strings::incrby_cmd),
        "DECRBY" => with_db!(strings::decrby_cmd),
        "INCRBYFLOAT" => with_db!(strings::incrbyfloat),

        "LPUSH" => {
            let mut db = ctx.keyspace.db(client.db_index).write();
            let r = lists::lpush(&mut db, args, false);
            if r.is_ok() {
                ctx.blocking.notify_key(client.db_index, &args[1]);
            }
            r
        }
        "RPUSH" => {
            let mut db = ctx.keyspace.db(client.db_index).write();
            let r = lists::lpush(&mut db, args, true);
            if r.is_ok() {
                ctx.blocking.notify_key(client.db_index, &args[1]);
            }
            r
        }
        "LPUSHX" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| lists::lpushx(db, a, false)),
        "RPUSHX" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| lists::lpushx(db, a, true)),
        "LPOP" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| lists::lpop(db, a, false)),
        "RPOP" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| lists::lpop(db, a, true)),
        "LLEN" => with_db!(lists::llen),
        "LINDEX" => with_db!(lists::lindex),
        "LSET" => with_db!(lists::lset),
        "LRANGE" => with_db!(lists::lrange),
        "LTRIM" => with_db!(lists::ltrim),
        "LREM" => with_db!(lists::lrem),
        "LINSERT" => with_db!(lists::linsert),
        "RPOPLPUSH" => {
            let mut db = ctx.keyspace.db(client.db_index).write();
            let r = lists::rpoplpush(&mut db, args);
            if r.is_ok() {
                ctx.blocking.notify_key(client.db_index, &args[2]);
            }
            r
        }
        "LMOVE" => {
            let mut db = ctx.keyspace.db(client.db_index).write();
            let r = lists::lmove(&mut db, args);
            if r.is_ok() {
                ctx.blocking.notify_key(client.db_index, &args[2]);
            }
            r
        }
        "LPOS" => with_db!(lists::lpos),

        "SADD" => with_db!(sets::sadd),
        "SREM" => with_db!(sets::srem),
        "SMEMBERS" => with_db!(sets::smembers),
        "SCARD" => with_db!(sets::scard),
        "SISMEMBER" => with_db!(sets::sismember),
        "SMISMEMBER" => with_db!(sets::smismember),
        "SPOP" => with_db!(sets::spop),
        "SRANDMEMBER" => with_db!(sets::srandmember),
        "SMOVE" => with_db!(sets::smove),
        "SINTER" => with_db!(sets::sinter_cmd),
        "SUNION" => with_db!(sets::sunion_cmd),
        "SDIFF" => with_db!(sets::sdiff_cmd),
        "SINTERCARD" => with_db!(sets::sintercard),
        "SINTERSTORE" => with_db!(sets::sinterstore),
        "SUNIONSTORE" => with_db!(sets::sunionstore),
        "SDIFFSTORE" => with_db!(sets::sdiffstore),

        "ZADD" => {
            let mut db = ctx.keyspace.db(client.db_index).write();
            let r = zsets::zadd(&mut db, args);
            if r.is_ok() {
                ctx.blocking.notify_key(client.db_index, &args[1]);
            }
            r
        }
        "ZREM" => with_db!(zsets::zrem),
        "ZSCORE" => with_db!(zsets::zscore),
        "ZMSCORE" => with_db!(zsets::zmscore),
        "ZCARD" => with_db!(zsets::zcard),
        "ZINCRBY" => with_db!(zsets::zincrby),
        "ZRANK" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| zsets::zrank(db, a, false)),
        "ZREVRANK" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| zsets::zrank(db, a, true)),
        "ZRANGE" => with_db!(zsets::zrange),
        "ZRANGEBYSCORE" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| zsets::zrangebyscore(db, a, false)),
        "ZREVRANGEBYSCORE" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| zsets::zrangebyscore(db, a, true)),
        "ZCOUNT" => with_db!(zsets::zcount),
        "ZREMRANGEBYRANK" => with_db!(zsets::zremrangebyrank),
        "ZREMRANGEBYSCORE" => with_db!(zsets::zremrangebyscore),
        "ZRANDMEMBER" => with_db!(zsets::zrandmember),
        "ZRANGESTORE" => with_db!(zsets::zrangestore),
        "ZDIFFSTORE" => with_db!(zsets::zdiffstore),

        "HSET" => with_db!(hashes::hset),
        "HSETNX" => with_db!(hashes::hsetnx),
        "HGET" => with_db!(hashes::hget),
        "HMGET" => with_db!(hashes::hmget),
        "HDEL" => with_db!(hashes::hdel),
        "HEXISTS" => with_db!(hashes::hexists),
        "HLEN" => with_db!(hashes::hlen),
        "HSTRLEN" => with_db!(hashes::hstrlen),
        "HKEYS" => with_db!(hashes::hkeys),
        "HVALS" => with_db!(hashes::hvals),
        "HGETALL" => with_db!(hashes::hgetall),
        "HINCRBY" => with_db!(hashes::hincrby),
        "HINCRBYFLOAT" => with_db!(hashes::hincrbyfloat),
        "HRANDFIELD" => with_db!(hashes::hrandfield),

        "DEL" => with_db!(generic::del),
        "UNLINK" => with_db!(generic::unlink),
        "EXISTS" => with_db!(generic::exists),
        "TOUCH" => with_db!(generic::touch),
        "EXPIRE" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| generic::expire(db, a, 1000, false)),
        "PEXPIRE" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| generic::expire(db, a, 1, false)),
        "EXPIREAT" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| generic::expire(db, a, 1000, true)),
        "PEXPIREAT" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| generic::expire(db, a, 1, true)),
        "TTL" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| generic::ttl(db, a, false)),
        "PTTL" => with_db!(|db: &mut crate::keyspace::Database, a: &[Bytes]| generic::ttl(db, a, true)),
        "PERSIST" => with_db!(generic::persist),
        "TYPE" => with_db!(generic::type_cmd),
        "OBJECT" => {
            let sub = String::from_utf8_lossy(&args[1]).to_ascii_uppercase();
            match sub.as_str() {
                "ENCODING" => with_db!(generic::object_encoding),
                "REFCOUNT" => with_db!(generic::object_refcount),
                "IDLETIME" => with_db!(generic::object_idletime),
                _ => Err(RedisError::err(format!("Unknown OBJECT subcommand '{sub}'"))),
            }
        }
        "RENAME" => with_db!(generic::rename),
        "RENAMENX" => with_db!(generic::renamenx),
        "KEYS" => with_db!(generic::keys),
        "SCAN" => with_db!(generic::scan),
        "RANDOMKEY" => with_db!(generic::randomkey),
        "DBSIZE" => with_db!(generic::dbsize),
        "FLUSHDB" => with_db!(generic::flushdb),
        "FLUSHALL" => generic::flushall(ctx.keyspace, args),
        "COPY" => generic::copy(ctx.keyspace, client.db_index, args),
        "MOVE" => generic::move_cmd(ctx.keyspace, client.db_index, args),
        "SWAPDB" => generic::swapdb(ctx.keyspace, args),

        "CLUSTER" => crate::cluster::cluster_cmd(ctx.cluster, ctx.keyspace, args),

        _ => unreachable!("commands present in the table must have an invoke arm"),
    }
}

fn config_dispatch(ctx: &Context<'_>, args: &[Bytes]) -> Result<RespValue> {
    let sub = String::from_utf8_lossy(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => admin::config_get(ctx.options, args),
        "SET" => Ok(admin::config_set(args)),
        "RESETSTAT" => Ok(admin::config_resetstat(ctx.stats)),
        "REWRITE" => Ok(RespValue::SimpleString("OK".to_string())),
        _ => Err(RedisError::err(format!("Unknown CONFIG subcommand '{sub}'"))),
    }
}

fn queue_or_reject(client: &mut ClientState, name: &str, args: &[Bytes]) -> RespValue {
    match command_table().get(name) {
        None => {
            client.transaction.dirty = true;
            RespValue::Error(RedisError::unknown_command(name).wire_message())
        }
        Some(spec) => {
            if check_arity(spec, name, args.len()).is_err() {
                client.transaction.dirty = true;
                return RespValue::Error(RedisError::wrong_args(name).wire_message());
            }
            client.transaction.queue.push(QueuedCommand { args: args.to_vec() });
            RespValue::SimpleString("QUEUED".to_string())
        }
    }
}

fn watch(ctx: &Context<'_>, client: &mut ClientState, args: &[Bytes]) -> Result<RespValue> {
    if client.transaction.queueing {
        return Err(RedisError::err("WATCH inside MULTI is not allowed"));
    }
    for key in &args[1..] {
        let version = {
            let mut db = ctx.keyspace.db(client.db_index).write();
            db.get_entry(key).map(|e| e.version).unwrap_or(0)
        };
        client.transaction.watched.insert((client.db_index, key.clone()), version);
    }
    Ok(RespValue::SimpleString("OK".to_string()))
}

fn watch_violated(ctx: &Context<'_>, client: &ClientState) -> bool {
    client.transaction.watched.iter().any(|((db_index, key), version)| {
        let mut db = ctx.keyspace.db(*db_index).write();
        db.get_entry(key).map(|e| e.version).unwrap_or(0) != *version
    })
}

async fn exec(ctx: &Context<'_>, client: &mut ClientState) -> RespValue {
    if !client.transaction.queueing {
        return RespValue::Error(RedisError::err("EXEC without MULTI").wire_message());
    }
    let dirty = client.transaction.dirty || watch_violated(ctx, client);
    let queue = std::mem::take(&mut client.transaction.queue);
    client.transaction.reset();
    if dirty {
        return RespValue::Null;
    }

    let mut results = Vec::with_capacity(queue.len());
    for cmd in queue {
        let name = String::from_utf8_lossy(&cmd.args[0]).to_ascii_uppercase();
        results.push(match execute_one(ctx, client, &name, &cmd.args).await {
            Ok(v) => v,
            Err(e) => RespValue::Error(e.wire_message()),
        });
    }
    RespValue::Array(results)
}

/// Replays one AOF-logged command directly against an already-locked
/// database, bypassing stats, the append log, and replica fan-out (the
/// point of a replay is to reconstruct state that produced those side
/// effects the first time around). Cross-database commands have no
/// counterpart here since the log replayer hands back one database at a
/// time keyed by the `SELECT` it last saw; they are simply skipped.
pub fn apply_replayed(db: &mut crate::keyspace::Database, args: &[Bytes]) -> Result<()> {
    if args.is_empty() {
        return Ok(());
    }
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();
    let result = match name.as_str() {
        "SET" => strings::set(db, args),
        "SETNX" => strings::setnx(db, args),
        "GETSET" => strings::getset(db, args),
        "GETDEL" => strings::getdel(db, args),
        "MSET" => strings::mset(db, args),
        "MSETNX" => strings::msetnx(db, args),
        "APPEND" => strings::append(db, args),
        "SETRANGE" => strings::setrange(db, args),
        "INCR" => strings::incr(db, args),
        "DECR" => strings::decr(db, args),
        "INCRBY" => strings::incrby_cmd(db, args),
        "DECRBY" => strings::decrby_cmd(db, args),
        "INCRBYFLOAT" => strings::incrbyfloat(db, args),
        "LPUSH" => lists::lpush(db, args, false),
        "RPUSH" => lists::lpush(db, args, true),
        "LPUSHX" => lists::lpushx(db, args, false),
        "RPUSHX" => lists::lpushx(db, args, true),
        "LPOP" => lists::lpop(db, args, false),
        "RPOP" => lists::lpop(db, args, true),
        "LSET" => lists::lset(db, args),
        "LTRIM" => lists::ltrim(db, args),
        "LREM" => lists::lrem(db, args),
        "LINSERT" => lists::linsert(db, args),
        "RPOPLPUSH" => lists::rpoplpush(db, args),
        "LMOVE" => lists::lmove(db, args),
        "SADD" => sets::sadd(db, args),
        "SREM" => sets::srem(db, args),
        "SPOP" => sets::spop(db, args),
        "SMOVE" => sets::smove(db, args),
        "SINTERSTORE" => sets::sinterstore(db, args),
        "SUNIONSTORE" => sets::sunionstore(db, args),
        "SDIFFSTORE" => sets::sdiffstore(db, args),
        "ZADD" => zsets::zadd(db, args),
        "ZREM" => zsets::zrem(db, args),
        "ZINCRBY" => zsets::zincrby(db, args),
        "ZREMRANGEBYRANK" => zsets::zremrangebyrank(db, args),
        "ZREMRANGEBYSCORE" => zsets::zremrangebyscore(db, args),
        "ZRANGESTORE" => zsets::zrangestore(db, args),
        "ZDIFFSTORE" => zsets::zdiffstore(db, args),
        "HSET" => hashes::hset(db, args),
        "HSETNX" => hashes::hsetnx(db, args),
        "HDEL" => hashes::hdel(db, args),
        "HINCRBY" => hashes::hincrby(db, args),
        "HINCRBYFLOAT" => hashes::hincrbyfloat(db, args),
        "DEL" => generic::del(db, args),
        "UNLINK" => generic::unlink(db, args),
        "EXPIRE" => generic::expire(db, args, 1000, false),
        "PEXPIRE" => generic::expire(db, args, 1, false),
        "EXPIREAT" => generic::expire(db, args, 1000, true),
        "PEXPIREAT" => generic::expire(db, args, 1, true),
        "PERSIST" => generic::persist(db, args),
        "RENAME" => generic::rename(db, args),
        "RENAMENX" => generic::renamenx(db, args),
        "FLUSHDB" | "FLUSHALL" => generic::flushdb(db, args),
        "SELECT" | "MOVE" | "COPY" | "SWAPDB" => Ok(RespValue::Null),
        _ => Ok(RespValue::Null),
    };
    result.map(|_| ())
}

/// Runs the full request pipeline for one parsed command. Returns `None`
/// when the command already delivered its reply directly through the
/// client's push channel (the `SUBSCRIBE` family), in which case the
/// connection loop must not write anything further for this request.
pub async fn dispatch(ctx: &Context<'_>, client: &mut ClientState, args: Vec<Bytes>) -> Option<RespValue> {
    if args.is_empty() {
        return Some(RespValue::Error(RedisError::err("empty command").wire_message()));
    }
    let name = String::from_utf8_lossy(&args[0]).to_ascii_uppercase();

    if client.transaction.queueing && !matches!(name.as_str(), "MULTI" | "EXEC" | "DISCARD" | "WATCH" | "RESET") {
        return Some(queue_or_reject(client, &name, &args));
    }

    match name.as_str() {
        "MULTI" => {
            client.transaction.reset();
            client.transaction.queueing = true;
            Some(RespValue::SimpleString("OK".to_string()))
        }
        "DISCARD" => Some(if !client.transaction.queueing {
            RespValue::Error(RedisError::err("DISCARD without MULTI").wire_message())
        } else {
            client.transaction.reset();
            RespValue::SimpleString("OK".to_string())
        }),
        "WATCH" => Some(match watch(ctx, client, &args) {
            Ok(v) => v,
            Err(e) => RespValue::Error(e.wire_message()),
        }),
        "UNWATCH" => {
            client.transaction.watched.clear();
            Some(RespValue::SimpleString("OK".to_string()))
        }
        "RESET" => {
            client.transaction.reset();
            Some(RespValue::SimpleString("RESET".to_string()))
        }
        "EXEC" => Some(exec(ctx, client).await),
        "SUBSCRIBE" | "UNSUBSCRIBE" | "PSUBSCRIBE" | "PUNSUBSCRIBE" | "PSYNC" => {
            match execute_one(ctx, client, &name, &args).await {
                Ok(_) => None,
                Err(e) => Some(RespValue::Error(e.wire_message())),
            }
        }
        _ => Some(match execute_one(ctx, client, &name, &args).await {
            Ok(v) => v,
            Err(e) => RespValue::Error(e.wire_message()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Options;
    use tokio::sync::mpsc;

    struct Fixture {
        keyspace: Keyspace,
        pubsub: PubSub,
        blocking: BlockingManager,
        stats: Stats,
        aof: Mutex<Option<AofWriter>>,
        options: Options,
        cluster: ClusterState,
        replication: ReplicationState,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                keyspace: Keyspace::new(4),
                pubsub: PubSub::default(),
                blocking: BlockingManager::default(),
                stats: Stats::default(),
                aof: Mutex::new(None),
                options: Options::default(),
                cluster: ClusterState::new("node1".to_string(), "127.0.0.1:6379".to_string(), false),
                replication: ReplicationState::new(),
            }
        }

        fn ctx(&self) -> Context<'_> {
            Context {
                keyspace: &self.keyspace,
                pubsub: &self.pubsub,
                blocking: &self.blocking,
                stats: &self.stats,
                aof: &self.aof,
                options: &self.options,
                cluster: &self.cluster,
                replication: &self.replication,
                start_time_ms: 0,
            }
        }
    }

    fn client() -> ClientState {
        let (tx, _rx) = mpsc::unbounded_channel();
        ClientState::new(1, "127.0.0.1:1".into(), tx)
    }

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[tokio::test]
    async fn set_and_get_round_trip() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("SET"), b("k"), b("v")]).await;
        assert_eq!(r, Some(RespValue::SimpleString("OK".to_string())));
        let r = dispatch(&ctx, &mut c, vec![b("GET"), b("k")]).await;
        assert_eq!(r, Some(RespValue::BulkString(b("v"))));
    }

    #[tokio::test]
    async fn unknown_command_errors() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("NOTACOMMAND")]).await;
        assert!(matches!(r, Some(RespValue::Error(_))));
    }

    #[tokio::test]
    async fn wrong_arity_errors() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("GET")]).await;
        assert!(matches!(r, Some(RespValue::Error(_))));
    }

    #[tokio::test]
    async fn multi_exec_runs_queued_commands() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        dispatch(&ctx, &mut c, vec![b("MULTI")]).await;
        let queued = dispatch(&ctx, &mut c, vec![b("SET"), b("k"), b("v")]).await;
        assert_eq!(queued, Some(RespValue::SimpleString("QUEUED".to_string())));
        let result = dispatch(&ctx, &mut c, vec![b("EXEC")]).await;
        assert_eq!(result, Some(RespValue::Array(vec![RespValue::SimpleString("OK".to_string())])));
        let get = dispatch(&ctx, &mut c, vec![b("GET"), b("k")]).await;
        assert_eq!(get, Some(RespValue::BulkString(b("v"))));
    }

    #[tokio::test]
    async fn watch_aborts_exec_on_conflicting_write() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        dispatch(&ctx, &mut c, vec![b("SET"), b("k"), b("v1")]).await;
        dispatch(&ctx, &mut c, vec![b("WATCH"), b("k")]).await;
        dispatch(&ctx, &mut c, vec![b("MULTI")]).await;
        dispatch(&ctx, &mut c, vec![b("GET"), b("k")]).await; // queued

        // Concurrent writer touches the watched key via a second client.
        let mut other = client();
        dispatch(&ctx, &mut other, vec![b("SET"), b("k"), b("v2")]).await;

        let result = dispatch(&ctx, &mut c, vec![b("EXEC")]).await;
        assert_eq!(result, Some(RespValue::Null));
    }

    #[tokio::test]
    async fn subscribe_sends_no_direct_reply() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("SUBSCRIBE"), b("news")]).await;
        assert_eq!(r, None);
        assert!(c.subscriptions.contains(&b("news")));
    }

    #[tokio::test]
    async fn replicaof_no_one_restores_master_role() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        dispatch(&ctx, &mut c, vec![b("REPLICAOF"), b("10.0.0.1"), b("6380")]).await;
        assert!(fx.replication.is_replica());
        dispatch(&ctx, &mut c, vec![b("REPLICAOF"), b("NO"), b("ONE")]).await;
        assert!(!fx.replication.is_replica());
    }

    #[tokio::test]
    async fn cluster_keyslot_matches_hash_slot() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("CLUSTER"), b("KEYSLOT"), b("foo")]).await;
        assert_eq!(r, Some(RespValue::Integer(crate::crc16::hash_slot(b"foo") as i64)));
    }

    #[tokio::test]
    async fn psync_attaches_replica_and_receives_propagated_writes() {
        let fx = Fixture::new();
        let ctx = fx.ctx();
        let mut c = client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        c.out_tx = tx;

        let r = dispatch(&ctx, &mut c, vec![b("PSYNC"), b("?"), b("-1")]).await;
        assert_eq!(r, None);
        assert!(c.replica_link_id.is_some());

        match rx.try_recv().unwrap() {
            RespValue::SimpleString(s) => assert!(s.starts_with("FULLRESYNC")),
            other => panic!("expected FULLRESYNC reply, got {other:?}"),
        }
        assert!(matches!(rx.try_recv().unwrap(), RespValue::BulkString(_)));

        let mut writer = client();
        dispatch(&ctx, &mut writer, vec![b("SET"), b("k"), b("v")]).await;

        let select = rx.try_recv().unwrap();
        assert!(matches!(select, RespValue::Array(ref a) if a[0] == RespValue::BulkString(b("SELECT"))));
        let command = rx.try_recv().unwrap();
        assert_eq!(
            command,
            RespValue::Array(vec![RespValue::BulkString(b("SET")), RespValue::BulkString(b("k")), RespValue::BulkString(b("v"))])
        );
    }

    #[tokio::test]
    async fn cluster_redirects_foreign_slot_with_moved() {
        let mut fx = Fixture::new();
        fx.cluster = ClusterState::new("node1".to_string(), "127.0.0.1:6379".to_string(), true);
        fx.cluster.meet("node2".to_string(), "127.0.0.1:6380".to_string());
        let slot = crate::crc16::hash_slot(b"foo");
        fx.cluster.set_slot_owner_for_test(slot, "node2".to_string());
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("SET"), b("foo"), b("bar")]).await;
        match r {
            Some(RespValue::Error(msg)) => assert!(msg.starts_with("MOVED")),
            other => panic!("expected MOVED error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn cluster_allows_keyless_command_on_any_node() {
        let mut fx = Fixture::new();
        fx.cluster = ClusterState::new("node1".to_string(), "127.0.0.1:6379".to_string(), true);
        fx.cluster.meet("node2".to_string(), "127.0.0.1:6380".to_string());
        let ctx = fx.ctx();
        let mut c = client();
        let r = dispatch(&ctx, &mut c, vec![b("PING")]).await;
        assert_eq!(r, Some(RespValue::SimpleString("PONG".to_string())));
    }

    #[tokio::test]
    async fn write_command_is_appended_to_aof() {
        let path = std::env::temp_dir().join(format!("ferrite-dispatch-aof-test-{}", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let mut fx = Fixture::new();
        fx.aof = Mutex::new(Some(AofWriter::open(&path).unwrap()));
        let ctx = fx.ctx();
        let mut c = client();
        dispatch(&ctx, &mut c, vec![b("SET"), b("k"), b("v")]).await;
        drop(ctx);
        drop(fx.aof);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("SET"));
        std::fs::remove_file(&path).unwrap();
    }
}
