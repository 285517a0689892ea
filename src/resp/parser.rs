//! Streaming RESP2/RESP3 parser.
//!
//! [`parse`] takes a byte buffer and returns `Ok((RespValue, bytes_consumed))`
//! or `Err(Incomplete)` when more data is needed, or `Err(Protocol(…))` on
//! malformed input.
//!
//! The parser uses `Bytes` (ref-counted) buffers to enable **zero-copy**
//! extraction of bulk strings via `buf.slice()`.

use bytes::Bytes;
use crate::error::{RedisError, Result};
use crate::resp::types::RespValue;
use memchr::memchr;

/// Parse one RESP value from the front of `buf`.
///
/// Returns `(value, bytes_consumed)` on success.
/// Returns `Err(Incomplete)` when the buffer is too short —
/// callers should read more data and retry.
///
/// Uses `Bytes` (ref-counted) so bulk strings are extracted via
/// zero-copy `slice()` rather than `copy_from_slice`.
pub fn parse(buf: &Bytes) -> Result<(RespValue, usize)> {
    if buf.is_empty() {
        return Err(RedisError::Incomplete);
    }

    match buf[0] {
        b'+' => parse_simple_string(buf),
        b'-' => parse_simple_error(buf),
        b':' => parse_integer(buf),
        b'$' => parse_bulk_string(buf),
        b'*' => parse_array(buf),
        b'_' => parse_null(buf),
        b'#' => parse_boolean(buf),
        b',' => parse_double(buf),
        b'(' => parse_big_number(buf),
        b'!' => parse_bulk_error(buf),
        b'=' => parse_verbatim_string(buf),
        b'%' => parse_map(buf),
        b'~' => parse_set(buf),
        b'>' => parse_push(buf),
        b'|' => parse_attribute(buf),
        other => Err(RedisError::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

/// Convenience wrapper: parse from a byte slice (copies into `Bytes` first).
///
/// Prefer [`parse`] with a pre-existing `Bytes` for zero-copy bulk strings.
pub fn parse_slice(buf: &[u8]) -> Result<(RespValue, usize)> {
    parse(&Bytes::copy_from_slice(buf))
}

/// Compute the byte length of one complete RESP frame at the front of `buf`
/// **without allocating** or building a `RespValue` tree.
///
/// Returns `Ok(bytes_consumed)` or `Err(Incomplete)`.
/// This is used by `read_raw_response` to determine where a RESP message
/// ends without materializing the parsed value.
pub fn resp_frame_len(buf: &[u8]) -> Result<usize> {
    if buf.is_empty() {
        return Err(RedisError::Incomplete);
    }
    match buf[0] {
        b'+' | b'-' | b':' | b',' | b'(' => {
            // Simple line types: read until \r\n
            let (_, next) = read_line(buf, 1)?;
            Ok(next)
        }
        b'_' => {
            // Null: _\r\n
            if buf.len() < 3 {
                return Err(RedisError::Incomplete);
            }
            Ok(3)
        }
        b'#' => {
            // Boolean: #t\r\n or #f\r\n
            if buf.len() < 4 {
                return Err(RedisError::Incomplete);
            }
            Ok(4)
        }
        b'$' | b'!' | b'=' => {
            // Bulk string / bulk error / verbatim string: $<len>\r\n<data>\r\n
            let (line, next) = read_line(buf, 1)?;
            let len = parse_int_from_bytes(line)?;
            if len < 0 {
                return Ok(next); // $-1\r\n  null bulk
            }
            let len = len as usize;
            let total = next + len + 2;
            if buf.len() < total {
                return Err(RedisError::Incomplete);
            }
            Ok(total)
        }
        b'*' | b'~' | b'>' => {
            // Array / set / push: *<count>\r\n<elements>…
            let (line, mut next) = read_line(buf, 1)?;
            let count = parse_int_from_bytes(line)?;
            if count < 0 {
                return Ok(next); // *-1\r\n  null array
            }
            for _ in 0..count {
                let child_len = resp_frame_len(&buf[next..])?;
                next += child_len;
            }
            Ok(next)
        }
        b'%' => {
            // Map: %<count>\r\n<key><value>…
            let (line, mut next) = read_line(buf, 1)?;
            let count = parse_int_from_bytes(line)?;
            if count < 0 {
                return Err(RedisError::Protocol("negative map count".into()));
            }
            let count = count as usize;
            for _ in 0..count {
                let k_len = resp_frame_len(&buf[next..])?;
                next += k_len;
                let v_len = resp_frame_len(&buf[next..])?;
                next += v_len;
            }
            Ok(next)
        }
        b'|' => {
            // Attribute: |<count>\r\n<key><value>…<actual-data>
            let (line, mut next) = read_line(buf, 1)?;
            let count = parse_int_from_bytes(line)?;
            if count < 0 {
                return Err(RedisError::Protocol("negative attribute count".into()));
            }
            let count = count as usize;
            for _ in 0..count {
                let k_len = resp_frame_len(&buf[next..])?;
                next += k_len;
                let v_len = resp_frame_len(&buf[next..])?;
                next += v_len;
            }
            // Plus one more value (the actual data)
            let data_len = resp_frame_len(&buf[next..])?;
            next += data_len;
            Ok(next)
        }
        other => Err(RedisError::Protocol(format!(
            "unknown RESP type byte: 0x{other:02x}"
        ))),
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Find the next `\r\n` in `buf` starting at `offset`.
/// Returns the index of `\r`.
#[inline]
fn find_crlf(buf: &[u8], offset: usize) -> Result<usize> {
    let search = &buf[offset..];
    match memchr(b'\r', search) {
        Some(pos) => {
            let abs = offset + pos;
            if abs + 1 < buf.len() && buf[abs + 1] == b'\n' {
                Ok(abs)
            } else if abs + 1 >= buf.len() {
                Err(RedisError::Incomplete)
            } else {
                Err(RedisError::Protocol(
                    "expected \\n after \\r".into(),
                ))
            }
        }
        None => Err(RedisError::Incomplete),
    }
}

/// Read the line starting at `buf[offset]` up to `\r\n`.
/// Returns `(line_bytes, index_after_crlf)`.
#[inline]
fn read_line(buf: &[u8], offset: usize) -> Result<(&[u8], usize)> {
    let cr = find_crlf(buf, offset)?;
    Ok((&buf[offset..cr], cr + 2))
}

/// Parse an integer from a byte slice (no allocations).
fn parse_int_from_bytes(bytes: &[u8]) -> Result<i64> {
    if bytes.is_empty() {
        return Err(RedisError::Protocol("empty integer".into()));
    }
    let (negative, digits) = if bytes[0] == b'-' {
        (true, &bytes[1..])
    } else if bytes[0] == b'+' {
        (false, &bytes[1..])
    } else {
        (false, bytes)
    };

    if digits.is_empty() {
        return Err(RedisError::Protocol("integer has no digits".into()));
    }

    // Accumulate as negative to handle i64::MIN correctly:
    // |i64::MIN| overflows positive i64, but -|digit| never overflows negative i64.
    let mut n: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(RedisError::Protocol(format!(
                "invalid byte in integer: 0x{b:02x}"
            )));
        }
        n = n
            .checked_mul(10)
            .and_then(|n| n.checked_sub((b - b'0') as i64))
            .ok_or_else(|| RedisError::Protocol("integer overflow".into()))?;
    }

    // n is always <= 0 here. Negate for positive numbers.
    Ok(if negative { n } else { -n })
}

// ── Type parsers ──────────────────────────────────────────────────

/// `+<string>\r\n`
fn parse_simple_string(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    // Fast path for common responses — avoids allocation entirely
    let s = match line {
        b"OK" => "OK".to_string(),
        b"PONG" => "PONG".to_string(),
        b"QUEUED" => "QUEUED".to_string(),
        _ => std::str::from_utf8(line)
            .map_err(|e| RedisError::Protocol(format!("invalid UTF-8 in simple string: {e}")))?
            .to_string(),
    };
    Ok((RespValue::SimpleString(s), next))
}

/// `-<error message>\r\n`
fn parse_simple_error(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let s = std::str::from_utf8(line)
        .map_err(|e| RedisError::Protocol(format!("invalid UTF-8 in error: {e}")))?
        .to_string();
    Ok((RespValue::Error(s), next))
}

/// `:<integer>\r\n`
fn parse_integer(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let i = parse_int_from_bytes(line)?;
    Ok((RespValue::Integer(i), next))
}

/// `$<length>\r\n<data>\r\n`  or  `$-1\r\n`
///
/// **Zero-copy**: uses `buf.slice()` to share the underlying `Bytes`
/// allocation instead of copying bulk string data.
fn parse_bulk_string(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let len = parse_int_from_bytes(line)?;

    if len < 0 {
        // RESP2 null bulk string
        return Ok((RespValue::Null, next));
    }

    let len = len as usize;
    let data_end = next + len;
    // Need data + \r\n
    if buf.len() < data_end + 2 {
        return Err(RedisError::Incomplete);
    }
    if buf[data_end] != b'\r' || buf[data_end + 1] != b'\n' {
        return Err(RedisError::Protocol(
            "bulk string not terminated by \\r\\n".into(),
        ));
    }

    // Zero-copy: slice into the ref-counted Bytes buffer
    let data = buf.slice(next..data_end);
    Ok((RespValue::BulkString(data), data_end + 2))
}

/// `*<count>\r\n<elements>`  or  `*-1\r\n`
fn parse_array(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int_from_bytes(line)?;

    if count < 0 {
        // RESP2 null array
        return Ok((RespValue::Null, next));
    }

    let count = count as usize;
    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let sub = buf.slice(next..);
        let (val, consumed) = parse(&sub)?;
        elements.push(val);
        next += consumed;
    }
    Ok((RespValue::Array(elements), next))
}

/// `_\r\n`  (RESP3 null)
fn parse_null(buf: &Bytes) -> Result<(RespValue, usize)> {
    if buf.len() < 3 {
        return Err(RedisError::Incomplete);
    }
    if buf[1] != b'\r' || buf[2] != b'\n' {
        return Err(RedisError::Protocol(
            "null type not terminated by \\r\\n".into(),
        ));
    }
    Ok((RespValue::Null, 3))
}

/// `#t\r\n` or `#f\r\n`
fn parse_boolean(buf: &Bytes) -> Result<(RespValue, usize)> {
    if buf.len() < 4 {
        return Err(RedisError::Incomplete);
    }
    let val = match buf[1] {
        b't' => true,
        b'f' => false,
        other => {
            return Err(RedisError::Protocol(format!(
                "invalid boolean value: 0x{other:02x}"
            )));
        }
    };
    if buf[2] != b'\r' || buf[3] != b'\n' {
        return Err(RedisError::Protocol(
            "boolean not terminated by \\r\\n".into(),
        ));
    }
    Ok((RespValue::Boolean(val), 4))
}

/// `,<floating-point>\r\n`
fn parse_double(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let s = std::str::from_utf8(line)
        .map_err(|e| RedisError::Protocol(format!("invalid UTF-8 in double: {e}")))?;
    let d = match s {
        "inf" => f64::INFINITY,
        "-inf" => f64::NEG_INFINITY,
        "nan" => f64::NAN,
        _ => s
            .parse::<f64>()
            .map_err(|e| RedisError::Protocol(format!("invalid double: {e}")))?,
    };
    Ok((RespValue::Double(d), next))
}

/// `(<big-number>\r\n`
fn parse_big_number(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let s = std::str::from_utf8(line)
        .map_err(|e| RedisError::Protocol(format!("invalid UTF-8 in big number: {e}")))?;
    // Validate that it looks like an integer (optional leading +/-)
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RedisError::Protocol(format!(
            "invalid big number: {s}"
        )));
    }
    Ok((RespValue::BigNumber(s.to_string()), next))
}

/// `!<length>\r\n<error>\r\n`
fn parse_bulk_error(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let len = parse_int_from_bytes(line)?;
    if len < 0 {
        return Err(RedisError::Protocol("negative bulk error length".into()));
    }
    let len = len as usize;

    if buf.len() < next + len + 2 {
        return Err(RedisError::Incomplete);
    }
    if buf[next + len] != b'\r' || buf[next + len + 1] != b'\n' {
        return Err(RedisError::Protocol(
            "bulk error not terminated by \\r\\n".into(),
        ));
    }

    let s = String::from_utf8(buf[next..next + len].to_vec())
        .map_err(|e| RedisError::Protocol(format!("invalid UTF-8 in bulk error: {e}")))?;
    Ok((RespValue::BulkError(s), next + len + 2))
}

/// `=<length>\r\n<encoding>:<data>\r\n`
fn parse_verbatim_string(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, next) = read_line(buf, 1)?;
    let len = parse_int_from_bytes(line)?;
    if len < 0 {
        return Err(RedisError::Protocol("negative verbatim string length".into()));
    }
    let len = len as usize;

    if buf.len() < next + len + 2 {
        return Err(RedisError::Incomplete);
    }
    if buf[next + len] != b'\r' || buf[next + len + 1] != b'\n' {
        return Err(RedisError::Protocol(
            "verbatim string not terminated by \\r\\n".into(),
        ));
    }

    let content = &buf[next..next + len];
    // First 3 bytes are encoding, then ':', then data
    if len < 4 || content[3] != b':' {
        return Err(RedisError::Protocol(
            "verbatim string missing encoding prefix".into(),
        ));
    }

    let encoding = String::from_utf8(content[..3].to_vec())
        .map_err(|e| RedisError::Protocol(format!("invalid encoding in verbatim string: {e}")))?;
    let data = String::from_utf8(content[4..].to_vec())
        .map_err(|e| RedisError::Protocol(format!("invalid data in verbatim string: {e}")))?;

    Ok((RespValue::VerbatimString { encoding, data }, next + len + 2))
}

/// `%<count>\r\n<key><value>…`
fn parse_map(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int_from_bytes(line)?;
    if count < 0 {
        return Err(RedisError::Protocol("negative map count".into()));
    }
    let count = count as usize;

    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let sub = buf.slice(next..);
        let (key, consumed_k) = parse(&sub)?;
        next += consumed_k;
        let sub = buf.slice(next..);
        let (val, consumed_v) = parse(&sub)?;
        next += consumed_v;
        pairs.push((key, val));
    }
    Ok((RespValue::Map(pairs), next))
}

/// `~<count>\r\n<elements>…`
fn parse_set(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int_from_bytes(line)?;
    if count < 0 {
        return Err(RedisError::Protocol("negative set count".into()));
    }
    let count = count as usize;

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let sub = buf.slice(next..);
        let (val, consumed) = parse(&sub)?;
        elements.push(val);
        next += consumed;
    }
    Ok((RespValue::Set(elements), next))
}

/// `><count>\r\n<kind><elements>…`
fn parse_push(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int_from_bytes(line)?;
    if count < 0 {
        return Err(RedisError::Protocol("negative push count".into()));
    }
    let count = count as usize;

    if count == 0 {
        return Err(RedisError::Protocol(
            "push message must have at least one element (kind)".into(),
        ));
    }

    // First element is the kind string
    let sub = buf.slice(next..);
    let (kind_val, consumed) = parse(&sub)?;
    next += consumed;
    let kind = match kind_val {
        RespValue::SimpleString(s) => s,
        RespValue::BulkString(b) => String::from_utf8(b.to_vec())
            .map_err(|e| RedisError::Protocol(format!("invalid push kind: {e}")))?,
        other => {
            return Err(RedisError::Protocol(format!(
                "push kind must be a string, got {}",
                other.type_name()
            )));
        }
    };

    let mut data = Vec::with_capacity(count - 1);
    for _ in 1..count {
        let sub = buf.slice(next..);
        let (val, consumed) = parse(&sub)?;
        data.push(val);
        next += consumed;
    }

    Ok((RespValue::Push { kind, data }, next))
}

/// `|<count>\r\n<key><value>…<actual-data>`
///
/// Attributes are out-of-band metadata preceding the actual response value.
/// The attribute map has `count` key-value pairs, followed by one more RESP value
/// that is the actual data.
fn parse_attribute(buf: &Bytes) -> Result<(RespValue, usize)> {
    let (line, mut next) = read_line(buf, 1)?;
    let count = parse_int_from_bytes(line)?;
    if count < 0 {
        return Err(RedisError::Protocol("negative attribute count".into()));
    }
    let count = count as usize;

    let mut attributes = Vec::with_capacity(count);
    for _ in 0..count {
        let sub = buf.slice(next..);
        let (key, consumed_k) = parse(&sub)?;
        next += consumed_k;
        let sub = buf.slice(next..);
        let (val, consumed_v) = parse(&sub)?;
        next += consumed_v;
        attributes.push((key, val));
    }

    // The attribute is followed by the actual reply value
    let sub = buf.slice(next..);
    let (data, consumed) = parse(&sub)?;
    next += consumed;

    Ok((
        RespValue::Attribute {
            data: Box::new(data),
            attributes,
        },
        next,
    ))
}

// ── Tests ──────────────────────────────────────────────────────────
