//! Generic key-space commands: deletion, expiry, introspection, and the
//! handful of operations (`MOVE`, `COPY`, `SWAPDB`) that cross databases.

use crate::error::{RedisError, Result};
use crate::keyspace::{glob_match, now_ms, Database, Keyspace};
use crate::resp::RespValue;
use bytes::Bytes;

pub fn del(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let mut removed = 0;
    for key in &args[1..] {
        if db.remove(key).is_some() {
            removed += 1;
        }
    }
    Ok(RespValue::Integer(removed))
}

/// Identical to `DEL`: there is no separate background reclaim thread here,
/// so "non-blocking" delete is simply a synchronous one.
pub fn unlink(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    del(db, args)
}

pub fn exists(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let count = args[1..].iter().filter(|k| db.contains(k)).count();
    Ok(RespValue::Integer(count as i64))
}

pub fn touch(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    exists(db, args)
}

pub fn expire(db: &mut Database, args: &[Bytes], unit_ms: i64, absolute: bool) -> Result<RespValue> {
    let key = &args[1];
    let amount = parse_i64(&args[2])?;
    let deadline = if absolute {
        amount * unit_ms
    } else {
        now_ms() + amount * unit_ms
    };

    let mut condition_ok = true;
    if let Some(flag) = args.get(3) {
        let flag = String::from_utf8_lossy(flag).to_ascii_uppercase();
        let current = db.pttl(key);
        condition_ok = match flag.as_str() {
            "NX" => current.is_none(),
            "XX" => current.is_some(),
            "GT" => current.is_some_and(|c| deadline > now_ms() + c),
            "LT" => current.is_none() || current.is_some_and(|c| deadline < now_ms() + c),
            _ => return Err(RedisError::syntax()),
        };
    }

    if !db.contains(key) || !condition_ok {
        return Ok(RespValue::Integer(0));
    }
    db.set_expiry(key, deadline);
    Ok(RespValue::Integer(1))
}

pub fn ttl(db: &mut Database, args: &[Bytes], as_ms: bool) -> Result<RespValue> {
    if !db.contains(&args[1]) {
        return Ok(RespValue::Integer(-2));
    }
    match db.pttl(&args[1]) {
        Some(ms) => Ok(RespValue::Integer(if as_ms { ms } else { (ms + 999) / 1000 })),
        None => Ok(RespValue::Integer(-1)),
    }
}

pub fn persist(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    Ok(RespValue::Integer(db.persist(&args[1]) as i64))
}

pub fn type_cmd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match db.get(&args[1]) {
        Some(v) => Ok(RespValue::SimpleString(v.type_name().to_string())),
        None => Ok(RespValue::SimpleString("none".to_string())),
    }
}

pub fn object_encoding(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match db.get(&args[2]) {
        Some(v) => Ok(RespValue::BulkString(Bytes::from(v.encoding()))),
        None => Err(RedisError::no_such_key()),
    }
}

/// Every value here is a uniquely owned `Value`, never structurally shared
/// the way small integers are in the reference implementation, so the
/// refcount is always 1.
pub fn object_refcount(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match db.get(&args[2]) {
        Some(_) => Ok(RespValue::Integer(1)),
        None => Err(RedisError::no_such_key()),
    }
}

pub fn object_idletime(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match db.idle_ms(&args[2]) {
        Some(idle) => Ok(RespValue::Integer(idle / 1000)),
        None => Err(RedisError::no_such_key()),
    }
}

pub fn rename(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    if !db.contains(&args[1]) {
        return Err(RedisError::no_such_key());
    }
    db.rename(&args[1], args[2].clone());
    Ok(RespValue::SimpleString("OK".to_string()))
}

pub fn renamenx(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    if !db.contains(&args[1]) {
        return Err(RedisError::no_such_key());
    }
    if db.contains(&args[2]) {
        return Ok(RespValue::Integer(0));
    }
    db.rename(&args[1], args[2].clone());
    Ok(RespValue::Integer(1))
}

pub fn keys(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let matched = db.keys_matching(&args[1]);
    Ok(RespValue::Array(matched.into_iter().map(RespValue::BulkString).collect()))
}

pub fn scan(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let cursor: u64 = std::str::from_utf8(&args[1])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)?;

    let mut pattern: Option<Vec<u8>> = None;
    let mut count = 10usize;
    let mut type_filter: Option<String> = None;
    let mut i = 2;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "MATCH" => {
                i += 1;
                pattern = Some(args[i].to_vec());
            }
            "COUNT" => {
                i += 1;
                count = std::str::from_utf8(&args[i])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(RedisError::not_integer)?;
            }
            "TYPE" => {
                i += 1;
                type_filter = Some(String::from_utf8_lossy(&args[i]).to_string());
            }
            _ => return Err(RedisError::syntax()),
        }
        i += 1;
    }

    let (next, found) = db.scan(cursor, count);
    let filtered: Vec<Bytes> = found
        .into_iter()
        .filter(|k| pattern.as_ref().map_or(true, |p| glob_match(p, k)))
        .filter(|k| {
            type_filter
                .as_ref()
                .map_or(true, |t| db.get(k).is_some_and(|v| v.type_name() == t))
        })
        .collect();

    Ok(RespValue::Array(vec![
        RespValue::BulkString(Bytes::from(next.to_string())),
        RespValue::Array(filtered.into_iter().map(RespValue::BulkString).collect()),
    ]))
}

pub fn randomkey(db: &mut Database, _args: &[Bytes]) -> Result<RespValue> {
    Ok(db.random_key().map(RespValue::BulkString).unwrap_or(RespValue::Null))
}

pub fn dbsize(db: &mut Database, _args: &[Bytes]) -> Result<RespValue> {
    Ok(RespValue::Integer(db.len() as i64))
}

pub fn flushdb(db: &mut Database, _args: &[Bytes]) -> Result<RespValue> {
    db.clear();
    Ok(RespValue::SimpleString("OK".to_string()))
}

pub fn flushall(keyspace: &Keyspace, _args: &[Bytes]) -> Result<RespValue> {
    keyspace.flush_all();
    Ok(RespValue::SimpleString("OK".to_string()))
}

pub fn copy(keyspace: &Keyspace, current_db: usize, args: &[Bytes]) -> Result<RespValue> {
    let mut dest_db = current_db;
    let mut replace = false;
    let mut i = 3;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "DB" => {
                i += 1;
                dest_db = std::str::from_utf8(&args[i])
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .ok_or_else(RedisError::not_integer)?;
            }
            "REPLACE" => replace = true,
            _ => return Err(RedisError::syntax()),
        }
        i += 1;
    }
    if dest_db >= keyspace.count() {
        return Err(RedisError::err("DB index is out of range"));
    }

    let entry = {
        let mut src = keyspace.db(current_db).write();
        match src.get_entry(&args[1]) {
            Some(e) => e.value.clone(),
            None => return Ok(RespValue::Integer(0)),
        }
    };
    let mut dst = keyspace.db(dest_db).write();
    if !replace && dst.contains(&args[2]) {
        return Ok(RespValue::Integer(0));
    }
    dst.set(args[2].clone(), entry);
    Ok(RespValue::Integer(1))
}

pub fn move_cmd(keyspace: &Keyspace, current_db: usize, args: &[Bytes]) -> Result<RespValue> {
    let dest_db: usize = std::str::from_utf8(&args[2])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)?;
    if dest_db >= keyspace.count() || dest_db == current_db {
        return Err(RedisError::err("source and destination objects are the same"));
    }

    let entry = {
        let mut src = keyspace.db(current_db).write();
        match src.get_entry(&args[1]) {
            Some(e) => e.value.clone(),
            None => return Ok(RespValue::Integer(0)),
        }
    };
    {
        let mut dst = keyspace.db(dest_db).write();
        if dst.contains(&args[1]) {
            return Ok(RespValue::Integer(0));
        }
        dst.set(args[1].clone(), entry);
    }
    keyspace.db(current_db).write().remove(&args[1]);
    Ok(RespValue::Integer(1))
}

pub fn swapdb(keyspace: &Keyspace, args: &[Bytes]) -> Result<RespValue> {
    let a: usize = std::str::from_utf8(&args[1])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)?;
    let b: usize = std::str::from_utf8(&args[2])
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(RedisError::not_integer)?;
    if a >= keyspace.count() || b >= keyspace.count() {
        return Err(RedisError::err("DB index is out of range"));
    }
    if a != b {
        let mut da = keyspace.db(a).write();
        let mut db_ = keyspace.db(b).write();
        std::mem::swap(&mut *da, &mut *db_);
    }
    Ok(RespValue::SimpleString("OK".to_string()))
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
    use crate::value::{StringValue, Value};

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    fn set_str(db: &mut Database, key: &str, value: &str) {
        db.set(b(key), Value::String(StringValue::from_bytes(b(value))));
    }

    #[test]
    fn del_counts_removed_keys() {
        let mut db = Database::default();
        set_str(&mut db, "a", "1");
        set_str(&mut db, "b", "2");
        let result = del(&mut db, &[b("DEL"), b("a"), b("b"), b("c")]).unwrap();
        assert_eq!(result, RespValue::Integer(2));
    }

    #[test]
    fn expire_and_ttl() {
        let mut db = Database::default();
        set_str(&mut db, "k", "v");
        expire(&mut db, &[b("EXPIRE"), b("k"), b("100")], 1000, false).unwrap();
        let result = ttl(&mut db, &[b("TTL"), b("k")], false).unwrap();
        assert_eq!(result, RespValue::Integer(100));
    }

    #[test]
    fn ttl_missing_key() {
        let mut db = Database::default();
        assert_eq!(ttl(&mut db, &[b("TTL"), b("missing")], false).unwrap(), RespValue::Integer(-2));
    }

    #[test]
    fn rename_moves_key() {
        let mut db = Database::default();
        set_str(&mut db, "a", "1");
        rename(&mut db, &[b("RENAME"), b("a"), b("b")]).unwrap();
        assert!(!db.contains(b"a"));
        assert!(db.contains(b"b"));
    }

    #[test]
    fn swapdb_exchanges_contents() {
        let ks = Keyspace::new(2);
        ks.db(0).write().set(b("k"), Value::String(StringValue::from_bytes(b("v"))));
        swapdb(&ks, &[b("SWAPDB"), b("0"), b("1")]).unwrap();
        assert!(!ks.db(0).write().contains(b"k"));
        assert!(ks.db(1).write().contains(b"k"));
    }

    #[test]
    fn move_transfers_between_databases() {
        let ks = Keyspace::new(2);
        ks.db(0).write().set(b("k"), Value::String(StringValue::from_bytes(b("v"))));
        let result = move_cmd(&ks, 0, &[b("MOVE"), b("k"), b("1")]).unwrap();
        assert_eq!(result, RespValue::Integer(1));
        assert!(!ks.db(0).write().contains(b"k"));
        assert!(ks.db(1).write().contains(b"k"));
    }

    #[test]
    fn unlink_removes_like_del() {
        let mut db = Database::default();
        set_str(&mut db, "a", "1");
        set_str(&mut db, "b", "2");
        let result = unlink(&mut db, &[b("UNLINK"), b("a"), b("b"), b("missing")]).unwrap();
        assert_eq!(result, RespValue::Integer(2));
        assert!(!db.contains(b"a"));
    }

    #[test]
    fn object_refcount_on_existing_key() {
        let mut db = Database::default();
        set_str(&mut db, "k", "v");
        assert_eq!(object_refcount(&mut db, &[b("OBJECT"), b("REFCOUNT"), b("k")]).unwrap(), RespValue::Integer(1));
    }

    #[test]
    fn object_refcount_missing_key_errors() {
        let mut db = Database::default();
        assert!(object_refcount(&mut db, &[b("OBJECT"), b("REFCOUNT"), b("missing")]).is_err());
    }

    #[test]
    fn object_idletime_is_zero_just_after_write() {
        let mut db = Database::default();
        set_str(&mut db, "k", "v");
        let result = object_idletime(&mut db, &[b("OBJECT"), b("IDLETIME"), b("k")]).unwrap();
        assert_eq!(result, RespValue::Integer(0));
    }
}
