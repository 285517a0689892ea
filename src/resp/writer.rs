//! RESP serializer: request-side command encoding and response-side value
//! encoding.
//!
//! [`encode_command`] builds the bulk-string-array wire format clients (and
//! this server's replication/gossip links) send:
//! `*<N>\r\n$<len>\r\narg1\r\n$<len>\r\narg2\r\n…`
//!
//! [`encode_value`] renders a [`RespValue`] tree as a response, used by the
//! dispatcher to serialize command results back to connected clients. It
//! switches between RESP2 and RESP3 framing for the handful of types that
//! differ (`Null`, `Boolean`, `Double`, `Map`, `Set`, `BigNumber`,
//! `VerbatimString`, `BulkError`, `Push`) based on the connection's
//! negotiated protocol version.

use crate::resp::types::RespValue;
use itoa::Buffer;
use std::io::Write;

/// Encode a command (list of arguments) into RESP wire format.
///
/// Each argument is treated as a binary-safe bulk string.
///
/// # Example
/// ```ignore
/// let bytes = encode_command(&[b"SET", b"key", b"value"]);
/// // → *3\r\n$3\r\nSET\r\n$3\r\nkey\r\n$5\r\nvalue\r\n
/// ```
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    // Pre-calculate capacity for zero (or minimal) reallocation
    let mut cap = 1 + 10 + 2; // '*' + max_digits(usize) + \r\n
    for arg in args {
        cap += 1 + 10 + 2 + arg.len() + 2; // '$' + len + \r\n + data + \r\n
    }

    let mut buf = Vec::with_capacity(cap);
    let mut itoa_buf = Buffer::new();

    // *<N>\r\n
    buf.push(b'*');
    buf.extend_from_slice(itoa_buf.format(args.len()).as_bytes());
    buf.extend_from_slice(b"\r\n");

    for arg in args {
        // $<len>\r\n<data>\r\n
        buf.push(b'$');
        buf.extend_from_slice(itoa_buf.format(arg.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");
        buf.extend_from_slice(arg);
        buf.extend_from_slice(b"\r\n");
    }

    buf
}

/// Encode a command from string arguments (convenience wrapper).
pub fn encode_command_str(args: &[&str]) -> Vec<u8> {
    let byte_args: Vec<&[u8]> = args.iter().map(|s| s.as_bytes()).collect();
    encode_command(&byte_args)
}

/// Encode multiple commands into a single buffer for pipelined writes.
///
/// This avoids N allocations + N syscalls — everything is concatenated
/// into one contiguous `Vec<u8>` that can be sent in a single `write_all`.
pub fn encode_pipeline(commands: &[Vec<String>]) -> Vec<u8> {
    // Pre-calculate total capacity
    let mut cap = 0;
    for cmd_args in commands {
        cap += 1 + 10 + 2; // *N\r\n
        for arg in cmd_args {
            cap += 1 + 10 + 2 + arg.len() + 2; // $len\r\ndata\r\n
        }
    }

    let mut buf = Vec::with_capacity(cap);
    let mut itoa_buf = Buffer::new();

    for cmd_args in commands {
        // *<N>\r\n
        buf.push(b'*');
        buf.extend_from_slice(itoa_buf.format(cmd_args.len()).as_bytes());
        buf.extend_from_slice(b"\r\n");

        for arg in cmd_args {
            // $<len>\r\n<data>\r\n
            buf.push(b'$');
            buf.extend_from_slice(itoa_buf.format(arg.len()).as_bytes());
            buf.extend_from_slice(b"\r\n");
            buf.extend_from_slice(arg.as_bytes());
            buf.extend_from_slice(b"\r\n");
        }
    }

    buf
}

/// Encode a single inline command (for simple commands like PING).
///
/// Format: `COMMAND\r\n`
pub fn encode_inline(cmd: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(cmd.len() + 2);
    buf.extend_from_slice(cmd.as_bytes());
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Serialize a [`RespValue`] as a reply, appending to `out`.
///
/// `protocol` is the negotiated `HELLO` version (2 or 3). RESP3-only frame
/// kinds degrade to their RESP2 equivalent when `protocol == 2`, matching
/// what a real client on the older protocol expects to see.
pub fn encode_value(out: &mut Vec<u8>, value: &RespValue, protocol: u8) {
    let mut itoa_buf = Buffer::new();
    match value {
        RespValue::SimpleString(s) => {
            out.push(b'+');
            out.extend_from_slice(s.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        RespValue::Error(msg) => {
            out.push(b'-');
            out.extend_from_slice(msg.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        RespValue::Integer(i) => {
            out.push(b':');
            out.extend_from_slice(itoa_buf.format(*i).as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        RespValue::BulkString(b) => {
            out.push(b'$');
            out.extend_from_slice(itoa_buf.format(b.len()).as_bytes());
            out.extend_from_slice(b"\r\n");
            out.extend_from_slice(b);
            out.extend_from_slice(b"\r\n");
        }
        RespValue::Array(items) => {
            out.push(b'*');
            out.extend_from_slice(itoa_buf.format(items.len()).as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_value(out, item, protocol);
            }
        }
        RespValue::Null => {
            if protocol >= 3 {
                out.extend_from_slice(b"_\r\n");
            } else {
                out.extend_from_slice(b"$-1\r\n");
            }
        }
        RespValue::Double(d) => {
            if protocol >= 3 {
                out.push(b',');
                write!(out, "{d}").expect("writing to Vec<u8> cannot fail");
                out.extend_from_slice(b"\r\n");
            } else {
                let s = format!("{d}");
                out.push(b'$');
                out.extend_from_slice(itoa_buf.format(s.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        RespValue::Boolean(b) => {
            if protocol >= 3 {
                out.extend_from_slice(if *b { b"#t\r\n" } else { b"#f\r\n" });
            } else {
                out.extend_from_slice(if *b { b":1\r\n" } else { b":0\r\n" });
            }
        }
        RespValue::Map(pairs) => {
            if protocol >= 3 {
                out.push(b'%');
                out.extend_from_slice(itoa_buf.format(pairs.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                for (k, v) in pairs {
                    encode_value(out, k, protocol);
                    encode_value(out, v, protocol);
                }
            } else {
                out.push(b'*');
                out.extend_from_slice(itoa_buf.format(pairs.len() * 2).as_bytes());
                out.extend_from_slice(b"\r\n");
                for (k, v) in pairs {
                    encode_value(out, k, protocol);
                    encode_value(out, v, protocol);
                }
            }
        }
        RespValue::Set(items) => {
            out.push(if protocol >= 3 { b'~' } else { b'*' });
            out.extend_from_slice(itoa_buf.format(items.len()).as_bytes());
            out.extend_from_slice(b"\r\n");
            for item in items {
                encode_value(out, item, protocol);
            }
        }
        RespValue::VerbatimString { encoding, data } => {
            if protocol >= 3 {
                let payload_len = encoding.len() + 1 + data.len();
                out.push(b'=');
                out.extend_from_slice(itoa_buf.format(payload_len).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(encoding.as_bytes());
                out.push(b':');
                out.extend_from_slice(data.as_bytes());
                out.extend_from_slice(b"\r\n");
            } else {
                out.push(b'$');
                out.extend_from_slice(itoa_buf.format(data.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(data.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        RespValue::BigNumber(s) => {
            if protocol >= 3 {
                out.push(b'(');
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            } else {
                out.push(b'$');
                out.extend_from_slice(itoa_buf.format(s.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(s.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        RespValue::BulkError(msg) => {
            if protocol >= 3 {
                out.push(b'!');
                out.extend_from_slice(itoa_buf.format(msg.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(msg.as_bytes());
                out.extend_from_slice(b"\r\n");
            } else {
                out.push(b'-');
                out.extend_from_slice(msg.as_bytes());
                out.extend_from_slice(b"\r\n");
            }
        }
        RespValue::Push { kind, data } => {
            let mut items = Vec::with_capacity(data.len() + 1);
            items.push(RespValue::BulkString(bytes::Bytes::copy_from_slice(
                kind.as_bytes(),
            )));
            items.extend(data.iter().cloned());
            if protocol >= 3 {
                out.push(b'>');
                out.extend_from_slice(itoa_buf.format(items.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in &items {
                    encode_value(out, item, protocol);
                }
            } else {
                encode_value(out, &RespValue::Array(items), protocol);
            }
        }
        RespValue::Attribute { data, attributes } => {
            if protocol >= 3 {
                out.push(b'|');
                out.extend_from_slice(itoa_buf.format(attributes.len()).as_bytes());
                out.extend_from_slice(b"\r\n");
                for (k, v) in attributes {
                    encode_value(out, k, protocol);
                    encode_value(out, v, protocol);
                }
            }
            encode_value(out, data, protocol);
        }
    }
}

/// Helper macro for building commands ergonomically.
///
/// Usage:
/// ```ignore
/// let bytes = cmd!("SET", "mykey", "myvalue");
/// let bytes = cmd!("GET", key_var);
/// ```
#[macro_export]
macro_rules! cmd {
    ($($arg:expr),+ $(,)?) => {{
        $crate::resp::writer::encode_command_str(&[$($arg),+])
    }};
}

// ── Tests ──────────────────────────────────────────────────────────
