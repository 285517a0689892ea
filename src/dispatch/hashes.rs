//! HASH command handlers.

use crate::error::{RedisError, Result};
use crate::keyspace::Database;
use crate::resp::RespValue;
use crate::value::{HashValue, Value};
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::thread_rng;

fn get_hash<'a>(db: &'a mut Database, key: &[u8]) -> Result<Option<&'a HashValue>> {
    match db.get(key) {
        Some(v) => Ok(Some(v.as_hash()?)),
        None => Ok(None),
    }
}

pub fn hset(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_hash()?;
    }
    let pairs = &args[2..];
    if pairs.len() % 2 != 0 || pairs.is_empty() {
        return Err(RedisError::syntax());
    }
    let hash = db
        .entry_or_insert_with(key, || Value::Hash(HashValue::new()))
        .as_hash_mut()?;
    let mut created = 0;
    for pair in pairs.chunks(2) {
        if hash.set(pair[0].clone(), pair[1].clone()) {
            created += 1;
        }
    }
    Ok(RespValue::Integer(created))
}

pub fn hsetnx(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        if existing.as_hash()?.contains(&args[2]) {
            return Ok(RespValue::Integer(0));
        }
    }
    let hash = db
        .entry_or_insert_with(key, || Value::Hash(HashValue::new()))
        .as_hash_mut()?;
    hash.set(args[2].clone(), args[3].clone());
    Ok(RespValue::Integer(1))
}

pub fn hget(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(h.get(&args[2]).map(RespValue::BulkString).unwrap_or(RespValue::Null)),
        None => Ok(RespValue::Null),
    }
}

pub fn hmget(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let hash = get_hash(db, &args[1])?;
    let out = args[2..]
        .iter()
        .map(|f| {
            hash.as_ref()
                .and_then(|h| h.get(f))
                .map(RespValue::BulkString)
                .unwrap_or(RespValue::Null)
        })
        .collect();
    Ok(RespValue::Array(out))
}

pub fn hdel(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let hash = match db.get_mut(key) {
        Some(v) => v.as_hash_mut()?,
        None => return Ok(RespValue::Integer(0)),
    };
    let mut removed = 0;
    for field in &args[2..] {
        if hash.remove(field) {
            removed += 1;
        }
    }
    if hash.is_empty() {
        db.remove(key);
    }
    Ok(RespValue::Integer(removed))
}

pub fn hexists(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(RespValue::Integer(h.contains(&args[2]) as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn hlen(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(RespValue::Integer(h.len() as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn hstrlen(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(RespValue::Integer(h.get(&args[2]).map(|v| v.len()).unwrap_or(0) as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn hkeys(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(RespValue::Array(h.iter().map(|(f, _)| RespValue::BulkString(f.clone())).collect())),
        None => Ok(RespValue::Array(Vec::new())),
    }
}

pub fn hvals(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(RespValue::Array(h.iter().map(|(_, v)| RespValue::BulkString(v.clone())).collect())),
        None => Ok(RespValue::Array(Vec::new())),
    }
}

pub fn hgetall(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_hash(db, &args[1])? {
        Some(h) => Ok(RespValue::Map(
            h.iter()
                .map(|(f, v)| (RespValue::BulkString(f.clone()), RespValue::BulkString(v.clone())))
                .collect(),
        )),
        None => Ok(RespValue::Map(Vec::new())),
    }
}

pub fn hincrby(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let delta = parse_i64(&args[2])?;
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_hash()?;
    }
    let hash = db
        .entry_or_insert_with(key, || Value::Hash(HashValue::new()))
        .as_hash_mut()?;
    let current = match hash.get(&args[2]) {
        Some(v) => std::str::from_utf8(&v).ok().and_then(|s| s.parse::<i64>().ok()).ok_or_else(RedisError::not_integer)?,
        None => 0,
    };
    let next = current.checked_add(delta).ok_or_else(|| RedisError::err("increment or decrement would overflow"))?;
    hash.set(args[2].clone(), Bytes::from(next.to_string()));
    Ok(RespValue::Integer(next))
}

pub fn hincrbyfloat(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let delta: f64 = std::str::from_utf8(&args[3]).ok().and_then(|s| s.parse().ok()).ok_or_else(RedisError::not_float)?;
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_hash()?;
    }
    let hash = db
        .entry_or_insert_with(key, || Value::Hash(HashValue::new()))
        .as_hash_mut()?;
    let current: f64 = match hash.get(&args[2]) {
        Some(v) => std::str::from_utf8(&v).ok().and_then(|s| s.parse().ok()).ok_or_else(RedisError::not_float)?,
        None => 0.0,
    };
    let next = current + delta;
    let rendered = format!("{next}");
    hash.set(args[2].clone(), Bytes::from(rendered.clone()));
    Ok(RespValue::BulkString(Bytes::from(rendered)))
}

pub fn hrandfield(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let hash = match get_hash(db, &args[1])? {
        Some(h) => h,
        None => {
            return Ok(match args.get(2) {
                Some(_) => RespValue::Array(Vec::new()),
                None => RespValue::Null,
            })
        }
    };
    let fields: Vec<(Bytes, Bytes)> = hash.iter().map(|(f, v)| (f.clone(), v.clone())).collect();
    if fields.is_empty() {
        return Ok(match args.get(2) {
            Some(_) => RespValue::Array(Vec::new()),
            None => RespValue::Null,
        });
    }
    match args.get(2) {
        None => Ok(RespValue::BulkString(fields.choose(&mut thread_rng()).cloned().unwrap().0)),
        Some(c) => {
            let n = parse_i64(c)?;
            let with_values = args.get(3).is_some_and(|a| a.eq_ignore_ascii_case(b"WITHVALUES"));
            let picked: Vec<(Bytes, Bytes)> = if n >= 0 {
                let mut pool = fields;
                pool.shuffle(&mut thread_rng());
                pool.into_iter().take(n as usize).collect()
            } else {
                let count = n.unsigned_abs() as usize;
                (0..count).map(|_| fields.choose(&mut thread_rng()).cloned().unwrap()).collect()
            };
            let mut out = Vec::with_capacity(picked.len() * if with_values { 2 } else { 1 });
            for (f, v) in picked {
                out.push(RespValue::BulkString(f));
                if with_values {
                    out.push(RespValue::BulkString(v));
                }
            }
            Ok(RespValue::Array(out))
        }
    }
}

fn parse_i64(b: &[u8]) -> Result<i64> {
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
    fn hset_and_hget() {
        let mut db = Database::default();
        hset(&mut db, &[b("HSET"), b("k"), b("f"), b("v")]).unwrap();
        assert_eq!(hget(&mut db, &[b("HGET"), b("k"), b("f")]).unwrap(), RespValue::BulkString(b("v")));
    }

    #[test]
    fn hdel_removes_empty_hash() {
        let mut db = Database::default();
        hset(&mut db, &[b("HSET"), b("k"), b("f"), b("v")]).unwrap();
        hdel(&mut db, &[b("HDEL"), b("k"), b("f")]).unwrap();
        assert_eq!(hlen(&mut db, &[b("HLEN"), b("k")]).unwrap(), RespValue::Integer(0));
    }

    #[test]
    fn hincrby_accumulates() {
        let mut db = Database::default();
        hset(&mut db, &[b("HSET"), b("k"), b("f"), b("10")]).unwrap();
        let result = hincrby(&mut db, &[b("HINCRBY"), b("k"), b("f"), b("5")]).unwrap();
        assert_eq!(result, RespValue::Integer(15));
    }

    #[test]
    fn hgetall_returns_map() {
        let mut db = Database::default();
        hset(&mut db, &[b("HSET"), b("k"), b("a"), b("1"), b("b"), b("2")]).unwrap();
        let result = hgetall(&mut db, &[b("HGETALL"), b("k")]).unwrap();
        if let RespValue::Map(mut pairs) = result {
            pairs.sort_by(|a, b| format!("{:?}", a.0).cmp(&format!("{:?}", b.0)));
            assert_eq!(pairs.len(), 2);
        } else {
            panic!("expected map");
        }
    }

    #[test]
    fn hsetnx_respects_existing_field() {
        let mut db = Database::default();
        hset(&mut db, &[b("HSET"), b("k"), b("f"), b("v1")]).unwrap();
        let result = hsetnx(&mut db, &[b("HSETNX"), b("k"), b("f"), b("v2")]).unwrap();
        assert_eq!(result, RespValue::Integer(0));
        assert_eq!(hget(&mut db, &[b("HGET"), b("k"), b("f")]).unwrap(), RespValue::BulkString(b("v1")));
    }
}
