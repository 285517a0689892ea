//! Server administration: `PING`/`ECHO`/`HELLO`/`SELECT`/`AUTH`, `CONFIG`,
//! `CLIENT`, `COMMAND`, `INFO`, `LASTSAVE`, `BGREWRITEAOF`, `REPLICAOF`.

use crate::config::Options;
use crate::error::{RedisError, Result};
use crate::resp::RespValue;
use crate::server::client::ClientState;
use crate::server::stats::Stats;
use bytes::Bytes;

pub fn ping(args: &[Bytes]) -> RespValue {
    match args.get(1) {
        Some(msg) => RespValue::BulkString(msg.clone()),
        None => RespValue::SimpleString("PONG".to_string()),
    }
}

pub fn echo(args: &[Bytes]) -> Result<RespValue> {
    args.get(1)
        .map(|m| RespValue::BulkString(m.clone()))
        .ok_or_else(|| RedisError::wrong_args("ECHO"))
}

pub fn select(client: &mut ClientState, args: &[Bytes], db_count: usize) -> Result<RespValue> {
    let index: usize = std::str::from_utf8(&args[1])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)?;
    if index >= db_count {
        return Err(RedisError::err("DB index is out of range"));
    }
    client.db_index = index;
    Ok(RespValue::SimpleString("OK".to_string()))
}

/// No passwords are configured in this build; `AUTH` always succeeds so
/// clients that unconditionally authenticate don't fail to connect.
pub fn auth(_args: &[Bytes]) -> RespValue {
    RespValue::SimpleString("OK".to_string())
}

pub fn hello(client: &mut ClientState, args: &[Bytes]) -> Result<RespValue> {
    if let Some(ver) = args.get(1) {
        let version: u8 = std::str::from_utf8(ver)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RedisError::err("NOPROTO unsupported protocol version"))?;
        if version != 2 && version != 3 {
            return Err(RedisError::err("NOPROTO unsupported protocol version"));
        }
        client.protocol = version;
    }
    Ok(RespValue::Map(vec![
        (RespValue::BulkString(Bytes::from_static(b"server")), RespValue::BulkString(Bytes::from_static(b"ferrite"))),
        (RespValue::BulkString(Bytes::from_static(b"version")), RespValue::BulkString(Bytes::from_static(b"1.0.0"))),
        (RespValue::BulkString(Bytes::from_static(b"proto")), RespValue::Integer(client.protocol as i64)),
        (RespValue::BulkString(Bytes::from_static(b"id")), RespValue::Integer(client.id as i64)),
        (RespValue::BulkString(Bytes::from_static(b"mode")), RespValue::BulkString(Bytes::from_static(b"standalone"))),
        (RespValue::BulkString(Bytes::from_static(b"role")), RespValue::BulkString(Bytes::from_static(b"master"))),
        (RespValue::BulkString(Bytes::from_static(b"modules")), RespValue::Array(Vec::new())),
    ]))
}

pub fn client_cmd(client: &mut ClientState, args: &[Bytes]) -> Result<RespValue> {
    let sub = String::from_utf8_lossy(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "GETNAME" => Ok(RespValue::BulkString(Bytes::from(client.name.clone()))),
        "SETNAME" => {
            let name = args.get(2).ok_or_else(|| RedisError::wrong_args("CLIENT"))?;
            client.name = String::from_utf8_lossy(name).to_string();
            Ok(RespValue::SimpleString("OK".to_string()))
        }
        "ID" => Ok(RespValue::Integer(client.id as i64)),
        "LIST" => Ok(RespValue::BulkString(Bytes::from(format!(
            "id={} addr={} name={} db={} sub={} psub={}\n",
            client.id,
            client.peer_addr,
            client.name,
            client.db_index,
            client.subscriptions.len(),
            client.psubscriptions.len(),
        )))),
        "INFO" => Ok(RespValue::BulkString(Bytes::from(format!(
            "id={} addr={} name={} db={}",
            client.id, client.peer_addr, client.name, client.db_index
        )))),
        "NO-EVICT" | "NO-TOUCH" | "REPLY" => Ok(RespValue::SimpleString("OK".to_string())),
        "UNPAUSE" | "PAUSE" => Ok(RespValue::SimpleString("OK".to_string())),
        _ => Err(RedisError::err(format!("Unknown CLIENT subcommand '{sub}'"))),
    }
}

pub fn command_cmd(args: &[Bytes]) -> RespValue {
    let table = super::command_table();
    match args.get(1).map(|a| String::from_utf8_lossy(a).to_ascii_uppercase()) {
        Some(ref s) if s == "COUNT" => RespValue::Integer(table.len() as i64),
        Some(ref s) if s == "DOCS" => RespValue::Map(Vec::new()),
        _ => RespValue::Array(
            table
                .iter()
                .map(|(name, spec)| {
                    RespValue::Array(vec![
                        RespValue::BulkString(Bytes::from(name.to_ascii_lowercase())),
                        RespValue::Integer(spec.arity as i64),
                    ])
                })
                .collect(),
        ),
    }
}

pub fn config_get(options: &Options, args: &[Bytes]) -> Result<RespValue> {
    let pattern = String::from_utf8_lossy(&args[2]).to_ascii_lowercase();
    let all = [
        ("maxclients", options.max_clients.to_string()),
        ("databases", options.db_num.to_string()),
        ("appendonly", if options.aof_enabled { "yes".into() } else { "no".into() }),
        ("appendfilename", options.aof_filename.clone()),
        ("dbfilename", options.rdb_filename.clone()),
        ("save", if options.rdb_enabled { "3600 1 300 100 60 10000".into() } else { String::new() }),
        ("slowlog-log-slower-than", options.slowlog_threshold_us.to_string()),
    ];
    let mut out = Vec::new();
    for (key, value) in all {
        if crate::keyspace::glob_match(pattern.as_bytes(), key.as_bytes()) {
            out.push(RespValue::BulkString(Bytes::from(key)));
            out.push(RespValue::BulkString(Bytes::from(value)));
        }
    }
    Ok(RespValue::Array(out))
}

pub fn config_set(_args: &[Bytes]) -> RespValue {
    // Options are currently process-startup-only; CONFIG SET acknowledges
    // but does not mutate the running configuration.
    RespValue::SimpleString("OK".to_string())
}

pub fn config_resetstat(stats: &Stats) -> RespValue {
    stats.commands_processed.store(0, std::sync::atomic::Ordering::Relaxed);
    stats.connections_received.store(0, std::sync::atomic::Ordering::Relaxed);
    RespValue::SimpleString("OK".to_string())
}

pub fn info(
    options: &Options,
    stats: &Stats,
    db_count: usize,
    start_time_ms: i64,
    replication_section: &str,
    cluster_section: &str,
) -> RespValue {
    let uptime_secs = (crate::keyspace::now_ms() - start_time_ms).max(0) / 1000;
    let text = format!(
        "# Server\r\n\
         redis_version:7.4.0\r\n\
         ferrite_version:1.0.0\r\n\
         process_id:{pid}\r\n\
         tcp_port:{addr}\r\n\
         uptime_in_seconds:{uptime}\r\n\
         \r\n\
         # Clients\r\n\
         connected_clients:1\r\n\
         maxclients:{max_clients}\r\n\
         \r\n\
         # Persistence\r\n\
         rdb_enabled:{rdb}\r\n\
         aof_enabled:{aof}\r\n\
         \r\n\
         # Stats\r\n\
         total_commands_processed:{commands}\r\n\
         total_connections_received:{connections}\r\n\
         \r\n\
         # Replication\r\n\
         {replication_section}\
         \r\n\
         # Cluster\r\n\
         {cluster_section}\
         \r\n\
         # Keyspace\r\n\
         db_count:{db_count}\r\n",
        pid = std::process::id(),
        addr = options.addr,
        uptime = uptime_secs,
        max_clients = options.max_clients,
        rdb = options.rdb_enabled as u8,
        aof = options.aof_enabled as u8,
        commands = stats.commands_processed.load(std::sync::atomic::Ordering::Relaxed),
        connections = stats.connections_received.load(std::sync::atomic::Ordering::Relaxed),
        db_count = db_count,
    );
    RespValue::BulkString(Bytes::from(text))
}

pub fn lastsave() -> RespValue {
    RespValue::Integer(crate::keyspace::now_ms() / 1000)
}

pub fn slowlog(stats: &Stats, args: &[Bytes]) -> Result<RespValue> {
    let sub = String::from_utf8_lossy(&args[1]).to_ascii_uppercase();
    match sub.as_str() {
        "GET" => Ok(RespValue::Array(
            stats.recent_slow().into_iter().map(|e| RespValue::BulkString(Bytes::from(e))).collect(),
        )),
        "RESET" => Ok(RespValue::SimpleString("OK".to_string())),
        "LEN" => Ok(RespValue::Integer(stats.recent_slow().len() as i64)),
        _ => Err(RedisError::err(format!("Unknown SLOWLOG subcommand '{sub}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn ping_without_message() {
        assert_eq!(ping(&[b("PING")]), RespValue::SimpleString("PONG".to_string()));
    }

    #[test]
    fn ping_echoes_message() {
        assert_eq!(ping(&[b("PING"), b("hi")]), RespValue::BulkString(b("hi")));
    }

    #[test]
    fn select_changes_db_index() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut c = ClientState::new(1, "a".into(), tx);
        select(&mut c, &[b("SELECT"), b("3")], 16).unwrap();
        assert_eq!(c.db_index, 3);
    }

    #[test]
    fn select_rejects_out_of_range() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut c = ClientState::new(1, "a".into(), tx);
        assert!(select(&mut c, &[b("SELECT"), b("99")], 16).is_err());
    }

    #[test]
    fn client_setname_and_getname() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut c = ClientState::new(1, "a".into(), tx);
        client_cmd(&mut c, &[b("CLIENT"), b("SETNAME"), b("bob")]).unwrap();
        assert_eq!(client_cmd(&mut c, &[b("CLIENT"), b("GETNAME")]).unwrap(), RespValue::BulkString(b("bob")));
    }

    #[test]
    fn config_get_matches_pattern() {
        let options = Options::default();
        let result = config_get(&options, &[b("CONFIG"), b("GET"), b("maxclients")]).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![RespValue::BulkString(b("maxclients")), RespValue::BulkString(Bytes::from(options.max_clients.to_string()))])
        );
    }
}
