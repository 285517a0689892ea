//! SET command handlers.

use crate::error::{RedisError, Result};
use crate::keyspace::Database;
use crate::resp::RespValue;
use crate::value::{SetValue, Value};
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashSet;

fn get_set<'a>(db: &'a mut Database, key: &[u8]) -> Result<Option<&'a SetValue>> {
    match db.get(key) {
        Some(v) => Ok(Some(v.as_set()?)),
        None => Ok(None),
    }
}

pub fn sadd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_set()?;
    }
    let set = db
        .entry_or_insert_with(key, || Value::Set(SetValue::new()))
        .as_set_mut()?;
    let mut added = 0;
    for member in &args[2..] {
        if set.insert(member.clone()) {
            added += 1;
        }
    }
    Ok(RespValue::Integer(added))
}

pub fn srem(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let set = match db.get_mut(key) {
        Some(v) => v.as_set_mut()?,
        None => return Ok(RespValue::Integer(0)),
    };
    let mut removed = 0;
    for member in &args[2..] {
        if set.remove(member) {
            removed += 1;
        }
    }
    if set.is_empty() {
        db.remove(key);
    }
    Ok(RespValue::Integer(removed))
}

pub fn smembers(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_set(db, &args[1])? {
        Some(s) => Ok(RespValue::Set(s.members().into_iter().map(RespValue::BulkString).collect())),
        None => Ok(RespValue::Set(Vec::new())),
    }
}

pub fn scard(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_set(db, &args[1])? {
        Some(s) => Ok(RespValue::Integer(s.len() as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn sismember(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_set(db, &args[1])? {
        Some(s) => Ok(RespValue::Integer(s.contains(&args[2]) as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn smismember(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let set = get_set(db, &args[1])?;
    let out = args[2..]
        .iter()
        .map(|m| RespValue::Integer(set.as_ref().is_some_and(|s| s.contains(m)) as i64))
        .collect();
    Ok(RespValue::Array(out))
}

pub fn spop(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let count = match args.get(2) {
        Some(c) => Some(parse_usize(c)?),
        None => None,
    };
    let set = match db.get_mut(key) {
        Some(v) => v.as_set_mut()?,
        None => {
            return Ok(match count {
                Some(_) => RespValue::Set(Vec::new()),
                None => RespValue::Null,
            })
        }
    };
    let mut members = set.members();
    members.shuffle(&mut thread_rng());
    let n = count.unwrap_or(1).min(members.len());
    let popped: Vec<Bytes> = members.into_iter().take(n).collect();
    for m in &popped {
        set.remove(m);
    }
    if set.is_empty() {
        db.remove(key);
    }
    match count {
        None => Ok(popped.into_iter().next().map(RespValue::BulkString).unwrap_or(RespValue::Null)),
        Some(_) => Ok(RespValue::Set(popped.into_iter().map(RespValue::BulkString).collect())),
    }
}

pub fn srandmember(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let set = match get_set(db, &args[1])? {
        Some(s) => s,
        None => {
            return Ok(match args.get(2) {
                Some(_) => RespValue::Array(Vec::new()),
                None => RespValue::Null,
            })
        }
    };
    let members = set.members();
    if members.is_empty() {
        return Ok(match args.get(2) {
            Some(_) => RespValue::Array(Vec::new()),
            None => RespValue::Null,
        });
    }
    match args.get(2) {
        None => {
            let pick = members.choose(&mut thread_rng()).cloned().unwrap();
            Ok(RespValue::BulkString(pick))
        }
        Some(c) => {
            let n = parse_i64(c)?;
            let out = if n >= 0 {
                let mut pool = members;
                pool.shuffle(&mut thread_rng());
                pool.into_iter().take(n as usize).collect::<Vec<_>>()
            } else {
                let count = n.unsigned_abs() as usize;
                (0..count)
                    .map(|_| members.choose(&mut thread_rng()).cloned().unwrap())
                    .collect()
            };
            Ok(RespValue::Array(out.into_iter().map(RespValue::BulkString).collect()))
        }
    }
}

pub fn smove(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let (src, dst, member) = (&args[1], &args[2], &args[3]);
    let moved = {
        let source = match db.get_mut(src) {
            Some(v) => v.as_set_mut()?,
            None => return Ok(RespValue::Integer(0)),
        };
        source.remove(member)
    };
    if !moved {
        return Ok(RespValue::Integer(0));
    }
    if let Some(v) = db.get(src) {
        if v.as_set()?.is_empty() {
            db.remove(src);
        }
    }
    if let Some(existing) = db.get(dst) {
        existing.as_set()?;
    }
    let target = db
        .entry_or_insert_with(dst, || Value::Set(SetValue::new()))
        .as_set_mut()?;
    target.insert(member.clone());
    Ok(RespValue::Integer(1))
}

fn collect(db: &mut Database, key: &[u8]) -> Result<HashSet<Bytes>> {
    Ok(match get_set(db, key)? {
        Some(s) => s.members().into_iter().collect(),
        None => HashSet::new(),
    })
}

pub fn sinter(db: &mut Database, keys: &[Bytes]) -> Result<HashSet<Bytes>> {
    let mut iter = keys.iter();
    let first = match iter.next() {
        Some(k) => collect(db, k)?,
        None => return Ok(HashSet::new()),
    };
    let mut acc = first;
    for key in iter {
        let other = collect(db, key)?;
        acc.retain(|m| other.contains(m));
        if acc.is_empty() {
            break;
        }
    }
    Ok(acc)
}

pub fn sunion(db: &mut Database, keys: &[Bytes]) -> Result<HashSet<Bytes>> {
    let mut acc = HashSet::new();
    for key in keys {
        acc.extend(collect(db, key)?);
    }
    Ok(acc)
}

pub fn sdiff(db: &mut Database, keys: &[Bytes]) -> Result<HashSet<Bytes>> {
    let mut iter = keys.iter();
    let mut acc = match iter.next() {
        Some(k) => collect(db, k)?,
        None => return Ok(HashSet::new()),
    };
    for key in iter {
        let other = collect(db, key)?;
        acc.retain(|m| !other.contains(m));
    }
    Ok(acc)
}

pub fn sinter_cmd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let result = sinter(db, &args[1..])?;
    Ok(RespValue::Set(result.into_iter().map(RespValue::BulkString).collect()))
}

pub fn sunion_cmd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let result = sunion(db, &args[1..])?;
    Ok(RespValue::Set(result.into_iter().map(RespValue::BulkString).collect()))
}

pub fn sdiff_cmd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let result = sdiff(db, &args[1..])?;
    Ok(RespValue::Set(result.into_iter().map(RespValue::BulkString).collect()))
}

pub fn sintercard(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let numkeys: usize = parse_usize(&args[1])?;
    let keys = &args[2..2 + numkeys];
    let mut limit = usize::MAX;
    if args.len() > 2 + numkeys {
        let opt = String::from_utf8_lossy(&args[2 + numkeys]).to_ascii_uppercase();
        if opt == "LIMIT" {
            let n = parse_usize(&args[3 + numkeys])?;
            if n > 0 {
                limit = n;
            }
        }
    }
    let result = sinter(db, keys)?;
    Ok(RespValue::Integer(result.len().min(limit) as i64))
}

fn store_result(db: &mut Database, dest: &Bytes, members: HashSet<Bytes>) -> RespValue {
    if members.is_empty() {
        db.remove(dest);
        return RespValue::Integer(0);
    }
    let mut set = SetValue::new();
    for m in &members {
        set.insert(m.clone());
    }
    let len = set.len();
    db.set(dest.clone(), Value::Set(set));
    RespValue::Integer(len as i64)
}

pub fn sinterstore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let members = sinter(db, &args[2..])?;
    Ok(store_result(db, &args[1], members))
}

pub fn sunionstore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let members = sunion(db, &args[2..])?;
    Ok(store_result(db, &args[1], members))
}

pub fn sdiffstore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let members = sdiff(db, &args[2..])?;
    Ok(store_result(db, &args[1], members))
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
    fn sadd_and_smembers() {
        let mut db = Database::default();
        sadd(&mut db, &[b("SADD"), b("k"), b("a"), b("b"), b("a")]).unwrap();
        let result = scard(&mut db, &[b("SCARD"), b("k")]).unwrap();
        assert_eq!(result, RespValue::Integer(2));
    }

    #[test]
    fn sinter_across_keys() {
        let mut db = Database::default();
        sadd(&mut db, &[b("SADD"), b("a"), b("1"), b("2"), b("3")]).unwrap();
        sadd(&mut db, &[b("SADD"), b("b"), b("2"), b("3"), b("4")]).unwrap();
        let result = sinter_cmd(&mut db, &[b("SINTER"), b("a"), b("b")]).unwrap();
        if let RespValue::Set(mut members) = result {
            members.sort_by(|a, b| a.as_bytes().cmp(&b.as_bytes()));
            assert_eq!(members, vec![RespValue::BulkString(b("2")), RespValue::BulkString(b("3"))]);
        } else {
            panic!("expected set");
        }
    }

    #[test]
    fn smove_between_sets() {
        let mut db = Database::default();
        sadd(&mut db, &[b("SADD"), b("src"), b("x")]).unwrap();
        let moved = smove(&mut db, &[b("SMOVE"), b("src"), b("dst"), b("x")]).unwrap();
        assert_eq!(moved, RespValue::Integer(1));
        assert_eq!(sismember(&mut db, &[b("SISMEMBER"), b("dst"), b("x")]).unwrap(), RespValue::Integer(1));
    }

    #[test]
    fn sdiffstore_writes_result() {
        let mut db = Database::default();
        sadd(&mut db, &[b("SADD"), b("a"), b("1"), b("2")]).unwrap();
        sadd(&mut db, &[b("SADD"), b("b"), b("1")]).unwrap();
        sdiffstore(&mut db, &[b("SDIFFSTORE"), b("dest"), b("a"), b("b")]).unwrap();
        assert_eq!(scard(&mut db, &[b("SCARD"), b("dest")]).unwrap(), RespValue::Integer(1));
    }
}
