use std::fmt;
use std::io;

/// Structured error kinds for programmatic matching, one per wire error
/// prefix a client can observe (`-<CODE> ...\r\n`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedisErrorKind {
    /// Generic ERR
    Err,
    /// WRONGTYPE Operation against a key holding the wrong kind of value
    WrongType,
    /// MOVED slot host:port  (cluster)
    Moved { slot: u16, addr: String },
    /// ASK slot host:port  (cluster)
    Ask { slot: u16, addr: String },
    /// CROSSSLOT Keys in request don't hash to the same slot
    CrossSlot,
    /// CLUSTERDOWN
    ClusterDown,
    /// LOADING Redis is loading the dataset in memory
    Loading,
    /// READONLY You can't write against a read only replica
    ReadOnly,
    /// NOAUTH Authentication required
    NoAuth,
    /// Any other Redis error prefix
    Other(String),
}

impl RedisErrorKind {
    /// Parse from a wire error message string (e.g. "WRONGTYPE Operation against…").
    pub fn from_error_msg(msg: &str) -> (Self, String) {
        if let Some(rest) = msg.strip_prefix("MOVED ") {
            if let Some((slot_str, addr)) = rest.split_once(' ') {
                if let Ok(slot) = slot_str.parse::<u16>() {
                    return (
                        Self::Moved {
                            slot,
                            addr: addr.to_string(),
                        },
                        msg.to_string(),
                    );
                }
            }
            return (Self::Other("MOVED".to_string()), msg.to_string());
        }
        if let Some(rest) = msg.strip_prefix("ASK ") {
            if let Some((slot_str, addr)) = rest.split_once(' ') {
                if let Ok(slot) = slot_str.parse::<u16>() {
                    return (
                        Self::Ask {
                            slot,
                            addr: addr.to_string(),
                        },
                        msg.to_string(),
                    );
                }
            }
            return (Self::Other("ASK".to_string()), msg.to_string());
        }

        let kind = if msg.starts_with("WRONGTYPE") {
            Self::WrongType
        } else if msg.starts_with("CROSSSLOT") {
            Self::CrossSlot
        } else if msg.starts_with("CLUSTERDOWN") {
            Self::ClusterDown
        } else if msg.starts_with("LOADING") {
            Self::Loading
        } else if msg.starts_with("READONLY") {
            Self::ReadOnly
        } else if msg.starts_with("NOAUTH") {
            Self::NoAuth
        } else if msg.starts_with("ERR") {
            Self::Err
        } else {
            let prefix = msg.split_whitespace().next().unwrap_or("UNKNOWN");
            Self::Other(prefix.to_string())
        };
        (kind, msg.to_string())
    }

    /// The wire prefix for this kind, as rendered after `-`.
    pub fn code(&self) -> String {
        match self {
            Self::Err => "ERR".to_string(),
            Self::WrongType => "WRONGTYPE".to_string(),
            Self::Moved { slot, addr } => format!("MOVED {slot} {addr}"),
            Self::Ask { slot, addr } => format!("ASK {slot} {addr}"),
            Self::CrossSlot => "CROSSSLOT".to_string(),
            Self::ClusterDown => "CLUSTERDOWN".to_string(),
            Self::Loading => "LOADING".to_string(),
            Self::ReadOnly => "READONLY".to_string(),
            Self::NoAuth => "NOAUTH".to_string(),
            Self::Other(code) => code.clone(),
        }
    }
}

/// All error variants produced inside the engine.
#[derive(Debug)]
pub enum RedisError {
    /// TCP / IO level errors (client socket, persistence file, peer link).
    Io(io::Error),
    /// RESP protocol parse errors.
    Protocol(String),
    /// RESP parser needs more data — not a real error, used as control flow.
    Incomplete,
    /// A structured command-level error with its wire kind.
    Redis { kind: RedisErrorKind, message: String },
    /// Snapshot/append-log read or write failure.
    Persistence(String),
    /// Cluster topology error (no owner for slot, bad gossip message, etc).
    Cluster(String),
    /// Replication link failure (handshake, stream desync).
    Replication(String),
}

impl RedisError {
    /// Create a generic ERR from a message fragment (prefixes "ERR " for you).
    pub fn err(msg: impl Into<String>) -> Self {
        Self::Redis {
            kind: RedisErrorKind::Err,
            message: format!("ERR {}", msg.into()),
        }
    }

    /// Create a Redis error from a raw error message, auto-parsing the kind.
    pub fn redis(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let (kind, message) = RedisErrorKind::from_error_msg(&msg);
        Self::Redis { kind, message }
    }

    pub fn wrong_type() -> Self {
        Self::Redis {
            kind: RedisErrorKind::WrongType,
            message: "WRONGTYPE Operation against a key holding the wrong kind of value"
                .to_string(),
        }
    }

    pub fn wrong_args(cmd: &str) -> Self {
        Self::err(format!(
            "wrong number of arguments for '{}' command",
            cmd.to_ascii_lowercase()
        ))
    }

    pub fn unknown_command(cmd: &str) -> Self {
        Self::err(format!("unknown command '{cmd}'"))
    }

    pub fn not_integer() -> Self {
        Self::err("value is not an integer or out of range")
    }

    pub fn not_float() -> Self {
        Self::err("value is not a valid float")
    }

    pub fn syntax() -> Self {
        Self::err("syntax error")
    }

    pub fn no_such_key() -> Self {
        Self::err("no such key")
    }

    pub fn moved(slot: u16, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self::Redis {
            kind: RedisErrorKind::Moved {
                slot,
                addr: addr.clone(),
            },
            message: format!("MOVED {slot} {addr}"),
        }
    }

    pub fn ask(slot: u16, addr: impl Into<String>) -> Self {
        let addr = addr.into();
        Self::Redis {
            kind: RedisErrorKind::Ask {
                slot,
                addr: addr.clone(),
            },
            message: format!("ASK {slot} {addr}"),
        }
    }

    pub fn cross_slot() -> Self {
        Self::Redis {
            kind: RedisErrorKind::CrossSlot,
            message: "CROSSSLOT Keys in request don't hash to the same slot".to_string(),
        }
    }

    pub fn cluster_down(msg: impl Into<String>) -> Self {
        Self::Redis {
            kind: RedisErrorKind::ClusterDown,
            message: format!("CLUSTERDOWN {}", msg.into()),
        }
    }

    pub fn read_only() -> Self {
        Self::Redis {
            kind: RedisErrorKind::ReadOnly,
            message: "READONLY You can't write against a read only replica".to_string(),
        }
    }

    pub fn loading() -> Self {
        Self::Redis {
            kind: RedisErrorKind::Loading,
            message: "LOADING Redis is loading the dataset in memory".to_string(),
        }
    }

    pub fn no_auth() -> Self {
        Self::Redis {
            kind: RedisErrorKind::NoAuth,
            message: "NOAUTH Authentication required".to_string(),
        }
    }

    /// Check if this is a MOVED redirect.
    pub fn is_moved(&self) -> bool {
        matches!(
            self,
            Self::Redis {
                kind: RedisErrorKind::Moved { .. },
                ..
            }
        )
    }

    /// Check if this is an ASK redirect.
    pub fn is_ask(&self) -> bool {
        matches!(
            self,
            Self::Redis {
                kind: RedisErrorKind::Ask { .. },
                ..
            }
        )
    }

    /// The message body to serialize on the wire (without the leading `-`).
    pub fn wire_message(&self) -> String {
        match self {
            Self::Io(e) => format!("ERR I/O error: {e}"),
            Self::Protocol(msg) => format!("ERR Protocol error: {msg}"),
            Self::Incomplete => "ERR incomplete request".to_string(),
            Self::Redis { message, .. } => message.clone(),
            Self::Persistence(msg) => format!("ERR {msg}"),
            Self::Cluster(msg) => format!("ERR {msg}"),
            Self::Replication(msg) => format!("ERR {msg}"),
        }
    }

    pub fn kind(&self) -> RedisErrorKind {
        match self {
            Self::Redis { kind, .. } => kind.clone(),
            _ => RedisErrorKind::Err,
        }
    }
}

impl fmt::Display for RedisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Incomplete => write!(f, "incomplete RESP message"),
            Self::Redis { message, .. } => write!(f, "{message}"),
            Self::Persistence(msg) => write!(f, "persistence error: {msg}"),
            Self::Cluster(msg) => write!(f, "cluster error: {msg}"),
            Self::Replication(msg) => write!(f, "replication error: {msg}"),
        }
    }
}

impl std::error::Error for RedisError {}

impl From<io::Error> for RedisError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, RedisError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_err() {
        let (kind, msg) = RedisErrorKind::from_error_msg("ERR unknown command 'FOO'");
        assert_eq!(kind, RedisErrorKind::Err);
        assert_eq!(msg, "ERR unknown command 'FOO'");
    }

    #[test]
    fn error_kind_wrongtype() {
        let (kind, _) =
            RedisErrorKind::from_error_msg("WRONGTYPE Operation against a key holding wrong type");
        assert_eq!(kind, RedisErrorKind::WrongType);
    }

    #[test]
    fn error_kind_moved() {
        let (kind, _) = RedisErrorKind::from_error_msg("MOVED 3999 127.0.0.1:6381");
        assert_eq!(
            kind,
            RedisErrorKind::Moved {
                slot: 3999,
                addr: "127.0.0.1:6381".to_string()
            }
        );
    }

    #[test]
    fn error_kind_ask() {
        let (kind, _) = RedisErrorKind::from_error_msg("ASK 3999 127.0.0.1:6381");
        assert_eq!(
            kind,
            RedisErrorKind::Ask {
                slot: 3999,
                addr: "127.0.0.1:6381".to_string()
            }
        );
    }

    #[test]
    fn error_kind_crossslot() {
        let (kind, _) =
            RedisErrorKind::from_error_msg("CROSSSLOT Keys in request don't hash to the same slot");
        assert_eq!(kind, RedisErrorKind::CrossSlot);
    }

    #[test]
    fn error_kind_clusterdown() {
        let (kind, _) = RedisErrorKind::from_error_msg("CLUSTERDOWN The cluster is down");
        assert_eq!(kind, RedisErrorKind::ClusterDown);
    }

    #[test]
    fn error_kind_loading() {
        let (kind, _) =
            RedisErrorKind::from_error_msg("LOADING Redis is loading the dataset in memory");
        assert_eq!(kind, RedisErrorKind::Loading);
    }

    #[test]
    fn error_kind_readonly() {
        let (kind, _) =
            RedisErrorKind::from_error_msg("READONLY You can't write against a read only replica");
        assert_eq!(kind, RedisErrorKind::ReadOnly);
    }

    #[test]
    fn error_kind_noauth() {
        let (kind, _) = RedisErrorKind::from_error_msg("NOAUTH Authentication required");
        assert_eq!(kind, RedisErrorKind::NoAuth);
    }

    #[test]
    fn error_kind_other() {
        let (kind, _) = RedisErrorKind::from_error_msg("CUSTOMPREFIX something happened");
        assert_eq!(kind, RedisErrorKind::Other("CUSTOMPREFIX".to_string()));
    }

    #[test]
    fn error_kind_moved_invalid_slot() {
        let (kind, _) = RedisErrorKind::from_error_msg("MOVED abc 127.0.0.1:6381");
        assert_eq!(kind, RedisErrorKind::Other("MOVED".to_string()));
    }

    #[test]
    fn redis_error_display() {
        let err = RedisError::Io(io::Error::new(io::ErrorKind::Other, "refused"));
        assert!(err.to_string().contains("io error"));

        let err = RedisError::Protocol("bad input".into());
        assert_eq!(err.to_string(), "protocol error: bad input");

        let err = RedisError::redis("ERR unknown command");
        assert_eq!(err.to_string(), "ERR unknown command");

        let err = RedisError::Persistence("short read".into());
        assert_eq!(err.to_string(), "persistence error: short read");

        let err = RedisError::Cluster("no node for slot".into());
        assert_eq!(err.to_string(), "cluster error: no node for slot");

        let err = RedisError::Replication("desynced offset".into());
        assert_eq!(err.to_string(), "replication error: desynced offset");
    }

    #[test]
    fn redis_error_is_moved_ask() {
        let err = RedisError::moved(3999, "127.0.0.1:6381");
        assert!(err.is_moved());
        assert!(!err.is_ask());

        let err = RedisError::ask(3999, "127.0.0.1:6381");
        assert!(!err.is_moved());
        assert!(err.is_ask());
    }

    #[test]
    fn io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::Other, "refused");
        let err: RedisError = io_err.into();
        assert!(matches!(err, RedisError::Io(_)));
    }

    #[test]
    fn wrong_args_message() {
        let err = RedisError::wrong_args("GET");
        assert_eq!(
            err.wire_message(),
            "ERR wrong number of arguments for 'get' command"
        );
    }

    #[test]
    fn unknown_command_message() {
        let err = RedisError::unknown_command("FOOBAR");
        assert!(err.wire_message().contains("unknown command"));
    }
}
