//! Runtime configuration.
//!
//! Options are assembled with precedence CLI flag > process environment >
//! env-file entry > built-in default, matching the env-file loader's role
//! as an external config provider alongside CLI flags.

use crate::error::{RedisError, Result};
use clap::Parser;
use std::collections::HashMap;
use std::path::Path;

/// Default listen port when `REDIS_ADDR` omits one.
pub const DEFAULT_PORT: u16 = 6379;

#[derive(Parser, Debug)]
#[command(name = "ferrite-server", about = "An in-memory RESP key/value datastore")]
pub struct Cli {
    /// Listen address, e.g. 0.0.0.0:6379
    #[arg(long, env = "REDIS_ADDR")]
    pub addr: Option<String>,

    /// Number of selectable databases
    #[arg(long, env = "REDIS_DB_NUM")]
    pub dbnum: Option<usize>,

    /// Path to an env-file of KEY=VALUE lines, loaded before CLI/env overrides
    #[arg(long)]
    pub config: Option<String>,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct Options {
    /// TCP listen address.
    pub addr: String,
    /// Number of databases selectable with `SELECT`.
    pub db_num: usize,
    /// Whether periodic/explicit snapshotting is enabled.
    pub rdb_enabled: bool,
    /// Snapshot file path.
    pub rdb_filename: String,
    /// Whether the append-only log is enabled.
    pub aof_enabled: bool,
    /// Append-log file path.
    pub aof_filename: String,
    /// Whether cluster mode is enabled.
    pub cluster_enabled: bool,
    /// Gossip bus port (cluster mode only).
    pub cluster_port: u16,
    /// Stable node identifier; generated and persisted on first run if unset.
    pub cluster_node_id: Option<String>,
    /// `tracing` env-filter directive, e.g. "info" or "ferrite=debug".
    pub log_level: String,
    /// Maximum concurrent client connections.
    pub max_clients: usize,
    /// Slowlog threshold in microseconds; commands slower than this are logged.
    pub slowlog_threshold_us: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            addr: format!(":{DEFAULT_PORT}"),
            db_num: 16,
            rdb_enabled: true,
            rdb_filename: "dump.rdb".to_string(),
            aof_enabled: false,
            aof_filename: "appendonly.aof".to_string(),
            cluster_enabled: false,
            cluster_port: 0,
            cluster_node_id: None,
            log_level: "info".to_string(),
            max_clients: 10_000,
            slowlog_threshold_us: 10_000,
        }
    }
}

impl Options {
    /// Build options from the process environment, an optional env-file, and
    /// parsed CLI flags, in increasing priority order.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut env: HashMap<String, String> = std::env::vars().collect();

        if let Some(path) = &cli.config {
            let file_env = load_env_file(path)?;
            for (k, v) in file_env {
                env.entry(k).or_insert(v);
            }
        }

        let mut opts = Self::default();

        if let Some(v) = env.get("REDIS_ADDR") {
            opts.addr = v.clone();
        }
        if let Some(v) = env.get("REDIS_DB_NUM") {
            opts.db_num = parse_env(v, "REDIS_DB_NUM")?;
        }
        if let Some(v) = env.get("REDIS_RDB_ENABLED") {
            opts.rdb_enabled = parse_bool(v, "REDIS_RDB_ENABLED")?;
        }
        if let Some(v) = env.get("REDIS_RDB_FILENAME") {
            opts.rdb_filename = v.clone();
        }
        if let Some(v) = env.get("REDIS_AOF_ENABLED") {
            opts.aof_enabled = parse_bool(v, "REDIS_AOF_ENABLED")?;
        }
        if let Some(v) = env.get("REDIS_AOF_FILENAME") {
            opts.aof_filename = v.clone();
        }
        if let Some(v) = env.get("REDIS_CLUSTER_ENABLED") {
            opts.cluster_enabled = parse_bool(v, "REDIS_CLUSTER_ENABLED")?;
        }
        if let Some(v) = env.get("REDIS_CLUSTER_PORT") {
            opts.cluster_port = parse_env(v, "REDIS_CLUSTER_PORT")?;
        }
        if let Some(v) = env.get("REDIS_CLUSTER_NODE_ID") {
            opts.cluster_node_id = Some(v.clone());
        }
        if let Some(v) = env.get("REDIS_LOG_LEVEL") {
            opts.log_level = v.clone();
        }
        if let Some(v) = env.get("REDIS_MAX_CLIENTS") {
            opts.max_clients = parse_env(v, "REDIS_MAX_CLIENTS")?;
        }
        if let Some(v) = env.get("REDIS_SLOWLOG_THRESHOLD") {
            opts.slowlog_threshold_us = parse_env(v, "REDIS_SLOWLOG_THRESHOLD")?;
        }

        // CLI flags take final priority (clap already folds process env into
        // these via `env = "..."`, so this also re-applies plain process env
        // for addr/dbnum even without --config).
        if let Some(addr) = &cli.addr {
            opts.addr = addr.clone();
        }
        if let Some(dbnum) = cli.dbnum {
            opts.db_num = dbnum;
        }

        if opts.cluster_port == 0 {
            opts.cluster_port = default_cluster_port(&opts.addr);
        }

        Ok(opts)
    }

    /// The bus port cluster peers gossip on (data port + 10000, as in the
    /// reference cluster-bus convention) unless overridden.
    pub fn effective_cluster_port(&self) -> u16 {
        self.cluster_port
    }
}

fn default_cluster_port(addr: &str) -> u16 {
    addr.rsplit_once(':')
        .and_then(|(_, p)| p.parse::<u16>().ok())
        .map(|p| p.wrapping_add(10_000))
        .unwrap_or(DEFAULT_PORT + 10_000)
}

fn parse_env<T: std::str::FromStr>(v: &str, name: &str) -> Result<T> {
    v.parse()
        .map_err(|_| RedisError::err(format!("invalid value for {name}: {v}")))
}

fn parse_bool(v: &str, name: &str) -> Result<bool> {
    match v.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(RedisError::err(format!("invalid boolean for {name}: {v}"))),
    }
}

/// Parse a `.env`-style file: `KEY=VALUE` lines, blank lines and `#` comments
/// ignored, later duplicate keys in the same file override earlier ones.
fn load_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let contents = std::fs::read_to_string(path.as_ref())
        .map_err(|e| RedisError::err(format!("reading config file: {e}")))?;
    Ok(parse_env_file(&contents))
}

fn parse_env_file(contents: &str) -> HashMap<String, String> {
    let mut out = HashMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_string();
            let mut value = value.trim().to_string();
            if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
                || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
            {
                value = value[1..value.len() - 1].to_string();
            }
            out.insert(key, value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let o = Options::default();
        assert_eq!(o.addr, ":6379");
        assert_eq!(o.db_num, 16);
        assert!(o.rdb_enabled);
        assert!(!o.aof_enabled);
        assert!(!o.cluster_enabled);
    }

    #[test]
    fn env_file_basic_parsing() {
        let contents = "REDIS_ADDR=0.0.0.0:7000\n# comment\n\nREDIS_DB_NUM=4\n";
        let env = parse_env_file(contents);
        assert_eq!(env.get("REDIS_ADDR"), Some(&"0.0.0.0:7000".to_string()));
        assert_eq!(env.get("REDIS_DB_NUM"), Some(&"4".to_string()));
    }

    #[test]
    fn env_file_strips_quotes() {
        let contents = "REDIS_RDB_FILENAME=\"my dump.rdb\"\n";
        let env = parse_env_file(contents);
        assert_eq!(
            env.get("REDIS_RDB_FILENAME"),
            Some(&"my dump.rdb".to_string())
        );
    }

    #[test]
    fn env_file_duplicate_keys_last_wins() {
        let contents = "FOO=1\nFOO=2\n";
        let env = parse_env_file(contents);
        assert_eq!(env.get("FOO"), Some(&"2".to_string()));
    }

    #[test]
    fn parse_bool_variants() {
        assert!(parse_bool("true", "X").unwrap());
        assert!(parse_bool("1", "X").unwrap());
        assert!(parse_bool("yes", "X").unwrap());
        assert!(!parse_bool("false", "X").unwrap());
        assert!(!parse_bool("0", "X").unwrap());
        assert!(parse_bool("maybe", "X").is_err());
    }

    #[test]
    fn default_cluster_port_derivation() {
        assert_eq!(default_cluster_port(":6379"), 16379);
        assert_eq!(default_cluster_port("0.0.0.0:6380"), 16380);
    }
}
