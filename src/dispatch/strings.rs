//! STRING command handlers.

use crate::error::{RedisError, Result};
use crate::keyspace::Database;
use crate::resp::RespValue;
use crate::value::{StringValue, Value};
use bytes::Bytes;

fn get_string<'a>(db: &'a mut Database, key: &[u8]) -> Result<Option<&'a StringValue>> {
    match db.get(key) {
        Some(v) => Ok(Some(v.as_string()?)),
        None => Ok(None),
    }
}

pub fn get(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_string(db, &args[1])? {
        Some(s) => Ok(RespValue::BulkString(s.as_bytes())),
        None => Ok(RespValue::Null),
    }
}

pub fn set(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let value = &args[2];

    let mut ex_ms: Option<i64> = None;
    let mut nx = false;
    let mut xx = false;
    let mut want_get = false;
    let mut keepttl = false;

    let mut i = 3;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "GET" => want_get = true,
            "KEEPTTL" => keepttl = true,
            "EX" | "PX" | "EXAT" | "PXAT" => {
                i += 1;
                let n: i64 = args
                    .get(i)
                    .and_then(|b| std::str::from_utf8(b).ok())
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(RedisError::not_integer)?;
                let now = crate::keyspace::now_ms();
                ex_ms = Some(match opt.as_str() {
                    "EX" => now + n * 1000,
                    "PX" => now + n,
                    "EXAT" => n * 1000,
                    "PXAT" => n,
                    _ => unreachable!(),
                });
            }
            _ => return Err(RedisError::syntax()),
        }
        i += 1;
    }

    let existed = db.contains(key);
    if (nx && existed) || (xx && !existed) {
        return if want_get {
            get(db, args)
        } else {
            Ok(RespValue::Null)
        };
    }

    let old = if want_get {
        match get_string(db, key)? {
            Some(s) => Some(RespValue::BulkString(s.as_bytes())),
            None => Some(RespValue::Null),
        }
    } else {
        None
    };

    let prior_ttl = if keepttl { db.pttl(key) } else { None };
    db.set(key.clone(), Value::String(StringValue::from_bytes(value.clone())));
    if let Some(remaining) = prior_ttl {
        db.set_expiry(key, crate::keyspace::now_ms() + remaining);
    }
    if let Some(deadline) = ex_ms {
        db.set_expiry(key, deadline);
    }

    match old {
        Some(v) => Ok(v),
        None => Ok(RespValue::SimpleString("OK".to_string())),
    }
}

pub fn setnx(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    if db.contains(&args[1]) {
        Ok(RespValue::Integer(0))
    } else {
        db.set(args[1].clone(), Value::String(StringValue::from_bytes(args[2].clone())));
        Ok(RespValue::Integer(1))
    }
}

pub fn getset(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let old = get(db, args)?;
    db.set(args[1].clone(), Value::String(StringValue::from_bytes(args[2].clone())));
    Ok(old)
}

pub fn getdel(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let old = get(db, args)?;
    if !matches!(old, RespValue::Null) {
        db.remove(&args[1]);
    }
    Ok(old)
}

pub fn mget(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let mut out = Vec::with_capacity(args.len() - 1);
    for key in &args[1..] {
        let v = match db.get(key) {
            Some(Value::String(s)) => RespValue::BulkString(s.as_bytes()),
            _ => RespValue::Null,
        };
        out.push(v);
    }
    Ok(RespValue::Array(out))
}

pub fn mset(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    if (args.len() - 1) % 2 != 0 {
        return Err(RedisError::syntax());
    }
    for pair in args[1..].chunks(2) {
        db.set(pair[0].clone(), Value::String(StringValue::from_bytes(pair[1].clone())));
    }
    Ok(RespValue::SimpleString("OK".to_string()))
}

pub fn msetnx(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    if (args.len() - 1) % 2 != 0 {
        return Err(RedisError::syntax());
    }
    if args[1..].chunks(2).any(|pair| db.contains(&pair[0])) {
        return Ok(RespValue::Integer(0));
    }
    for pair in args[1..].chunks(2) {
        db.set(pair[0].clone(), Value::String(StringValue::from_bytes(pair[1].clone())));
    }
    Ok(RespValue::Integer(1))
}

pub fn append(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let suffix = &args[2];
    let new_value = match db.get(key) {
        Some(v) => {
            let mut bytes = v.as_string()?.as_bytes().to_vec();
            bytes.extend_from_slice(suffix);
            bytes
        }
        None => suffix.to_vec(),
    };
    let len = new_value.len();
    db.set(key.clone(), Value::String(StringValue::from_bytes(Bytes::from(new_value))));
    Ok(RespValue::Integer(len as i64))
}

pub fn strlen(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_string(db, &args[1])? {
        Some(s) => Ok(RespValue::Integer(s.len() as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn setrange(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let offset: usize = parse_usize(&args[2])?;
    let patch = &args[3];

    let mut bytes = match db.get(key) {
        Some(v) => v.as_string()?.as_bytes().to_vec(),
        None => Vec::new(),
    };
    if bytes.len() < offset + patch.len() {
        bytes.resize(offset + patch.len(), 0);
    }
    bytes[offset..offset + patch.len()].copy_from_slice(patch);
    let len = bytes.len();
    db.set(key.clone(), Value::String(StringValue::from_bytes(Bytes::from(bytes))));
    Ok(RespValue::Integer(len as i64))
}

pub fn getrange(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let start: i64 = parse_i64(&args[2])?;
    let end: i64 = parse_i64(&args[3])?;
    let bytes = match get_string(db, &args[1])? {
        Some(s) => s.as_bytes(),
        None => return Ok(RespValue::BulkString(Bytes::new())),
    };
    let len = bytes.len() as i64;
    if len == 0 {
        return Ok(RespValue::BulkString(Bytes::new()));
    }
    let (start, end) = normalize_range(start, end, len);
    if start > end {
        return Ok(RespValue::BulkString(Bytes::new()));
    }
    Ok(RespValue::BulkString(bytes.slice(start as usize..=end as usize)))
}

pub fn incrby(db: &mut Database, key: &Bytes, delta: i64) -> Result<i64> {
    let current = match db.get(key) {
        Some(v) => v.as_string()?.as_int().ok_or_else(RedisError::not_integer)?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or_else(|| {
        RedisError::err("increment or decrement would overflow")
    })?;
    db.set(key.clone(), Value::String(StringValue::from_bytes(Bytes::from(next.to_string()))));
    Ok(next)
}

pub fn incr(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    Ok(RespValue::Integer(incrby(db, &args[1], 1)?))
}

pub fn decr(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    Ok(RespValue::Integer(incrby(db, &args[1], -1)?))
}

pub fn incrby_cmd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let delta = parse_i64(&args[2])?;
    Ok(RespValue::Integer(incrby(db, &args[1], delta)?))
}

pub fn decrby_cmd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let delta = parse_i64(&args[2])?;
    Ok(RespValue::Integer(incrby(db, &args[1], -delta)?))
}

pub fn incrbyfloat(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let delta: f64 = std::str::from_utf8(&args[2])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_float)?;
    let current = match db.get(&args[1]) {
        Some(v) => v.as_string()?.as_f64().ok_or_else(RedisError::not_float)?,
        None => 0.0,
    };
    let next = current + delta;
    let rendered = format!("{next}");
    db.set(
        args[1].clone(),
        Value::String(StringValue::from_bytes(Bytes::from(rendered.clone()))),
    );
    Ok(RespValue::BulkString(Bytes::from(rendered)))
}

fn normalize_range(mut start: i64, mut end: i64, len: i64) -> (i64, i64) {
    if start < 0 {
        start = (len + start).max(0);
    }
    if end < 0 {
        end = len + end;
    }
    if end >= len {
        end = len - 1;
    }
    (start, end)
}

fn parse_i64(b: &[u8]) -> Result<i64> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)
}

fn parse_usize(b: &[u8]) -> Result<usize> {
    std::str::from_utf8(b)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_then_get() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("v")]).unwrap();
        assert_eq!(get(&mut db, &[b("GET"), b("k")]).unwrap(), RespValue::BulkString(b("v")));
    }

    #[test]
    fn set_nx_respects_existing_key() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("v")]).unwrap();
        let result = set(&mut db, &[b("SET"), b("k"), b("v2"), b("NX")]).unwrap();
        assert_eq!(result, RespValue::Null);
        assert_eq!(get(&mut db, &[b("GET"), b("k")]).unwrap(), RespValue::BulkString(b("v")));
    }

    #[test]
    fn append_extends_string() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("bar")]).unwrap();
        let result = append(&mut db, &[b("APPEND"), b("k"), b("baz")]).unwrap();
        assert_eq!(result, RespValue::Integer(6));
        assert_eq!(get(&mut db, &[b("GET"), b("k")]).unwrap(), RespValue::BulkString(b("barbaz")));
    }

    #[test]
    fn incr_and_decr() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("10")]).unwrap();
        assert_eq!(incr(&mut db, &[b("INCR"), b("k")]).unwrap(), RespValue::Integer(11));
        assert_eq!(decr(&mut db, &[b("DECR"), b("k")]).unwrap(), RespValue::Integer(10));
    }

    #[test]
    fn incr_non_integer_errors() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("not-a-number")]).unwrap();
        assert!(incr(&mut db, &[b("INCR"), b("k")]).is_err());
    }

    #[test]
    fn getrange_negative_indices() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("This is a string")]).unwrap();
        let result = getrange(&mut db, &[b("GETRANGE"), b("k"), b("-3"), b("-1")]).unwrap();
        assert_eq!(result, RespValue::BulkString(b("ing")));
    }

    #[test]
    fn setrange_extends_with_zero_bytes() {
        let mut db = Database::default();
        setrange(&mut db, &[b("SETRANGE"), b("k"), b("5"), b("hello")]).unwrap();
        let result = get(&mut db, &[b("GET"), b("k")]).unwrap();
        assert_eq!(result, RespValue::BulkString(Bytes::from(b"\0\0\0\0\0hello".to_vec())));
    }

    #[test]
    fn mset_and_mget() {
        let mut db = Database::default();
        mset(&mut db, &[b("MSET"), b("a"), b("1"), b("b"), b("2")]).unwrap();
        let result = mget(&mut db, &[b("MGET"), b("a"), b("b"), b("missing")]).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![
                RespValue::BulkString(b("1")),
                RespValue::BulkString(b("2")),
                RespValue::Null,
            ])
        );
    }

    #[test]
    fn incrbyfloat_accumulates() {
        let mut db = Database::default();
        set(&mut db, &[b("SET"), b("k"), b("10.5")]).unwrap();
        let result = incrbyfloat(&mut db, &[b("INCRBYFLOAT"), b("k"), b("0.1")]).unwrap();
        assert_eq!(result, RespValue::BulkString(b("10.6")));
    }
}
