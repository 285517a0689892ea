//! LIST command handlers.

use crate::error::{RedisError, Result};
use crate::keyspace::Database;
use crate::resp::RespValue;
use crate::value::{ListValue, Value};
use bytes::Bytes;

fn get_list<'a>(db: &'a mut Database, key: &[u8]) -> Result<Option<&'a ListValue>> {
    match db.get(key) {
        Some(v) => Ok(Some(v.as_list()?)),
        None => Ok(None),
    }
}

fn rebuild(items: Vec<Bytes>) -> ListValue {
    let mut list = ListValue::new();
    for item in items {
        list.push_back(item);
    }
    list
}

pub fn lpush(db: &mut Database, args: &[Bytes], at_tail: bool) -> Result<RespValue> {
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_list()?;
    }
    let list = db
        .entry_or_insert_with(key, || Value::List(ListValue::new()))
        .as_list_mut()?;
    for value in &args[2..] {
        if at_tail {
            list.push_back(value.clone());
        } else {
            list.push_front(value.clone());
        }
    }
    Ok(RespValue::Integer(list.len() as i64))
}

pub fn lpushx(db: &mut Database, args: &[Bytes], at_tail: bool) -> Result<RespValue> {
    if !db.contains(&args[1]) {
        return Ok(RespValue::Integer(0));
    }
    lpush(db, args, at_tail)
}

pub fn lpop(db: &mut Database, args: &[Bytes], from_tail: bool) -> Result<RespValue> {
    let key = &args[1];
    let count = match args.get(2) {
        Some(c) => Some(parse_usize(c)?),
        None => None,
    };

    let list = match db.get_mut(key) {
        Some(v) => v.as_list_mut()?,
        None => return Ok(RespValue::Null),
    };

    let n = count.unwrap_or(1);
    let mut popped = Vec::with_capacity(n);
    for _ in 0..n {
        let item = if from_tail { list.pop_back() } else { list.pop_front() };
        match item {
            Some(v) => popped.push(v),
            None => break,
        }
    }
    if list.is_empty() {
        db.remove(key);
    }

    match count {
        None => Ok(popped
            .into_iter()
            .next()
            .map(RespValue::BulkString)
            .unwrap_or(RespValue::Null)),
        Some(_) if popped.is_empty() => Ok(RespValue::Null),
        Some(_) => Ok(RespValue::Array(popped.into_iter().map(RespValue::BulkString).collect())),
    }
}

pub fn llen(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_list(db, &args[1])? {
        Some(l) => Ok(RespValue::Integer(l.len() as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn lindex(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let index = parse_i64(&args[2])?;
    let list = match get_list(db, &args[1])? {
        Some(l) => l,
        None => return Ok(RespValue::Null),
    };
    let resolved = resolve_index(index, list.len());
    match resolved.and_then(|i| list.get(i)) {
        Some(v) => Ok(RespValue::BulkString(v.clone())),
        None => Ok(RespValue::Null),
    }
}

pub fn lset(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let index = parse_i64(&args[2])?;
    let value = args[3].clone();
    let list = db
        .get_mut(&args[1])
        .ok_or_else(RedisError::no_such_key)?
        .as_list_mut()?;
    let resolved = resolve_index(index, list.len()).ok_or_else(|| RedisError::err("index out of range"))?;
    if list.set(resolved, value) {
        Ok(RespValue::SimpleString("OK".to_string()))
    } else {
        Err(RedisError::err("index out of range"))
    }
}

pub fn lrange(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    let list = match get_list(db, &args[1])? {
        Some(l) => l,
        None => return Ok(RespValue::Array(Vec::new())),
    };
    let len = list.len() as i64;
    if len == 0 {
        return Ok(RespValue::Array(Vec::new()));
    }
    let (start, stop) = normalize_range(start, stop, len);
    if start > stop {
        return Ok(RespValue::Array(Vec::new()));
    }
    let out: Vec<RespValue> = list
        .iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .map(|v| RespValue::BulkString(v.clone()))
        .collect();
    Ok(RespValue::Array(out))
}

pub fn ltrim(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    let key = &args[1];
    let list = match db.get(key) {
        Some(v) => v.as_list()?,
        None => return Ok(RespValue::SimpleString("OK".to_string())),
    };
    let len = list.len() as i64;
    let items: Vec<Bytes> = if len == 0 {
        Vec::new()
    } else {
        let (start, stop) = normalize_range(start, stop, len);
        if start > stop {
            Vec::new()
        } else {
            list.iter()
                .skip(start as usize)
                .take((stop - start + 1) as usize)
                .cloned()
                .collect()
        }
    };
    if items.is_empty() {
        db.remove(key);
    } else {
        db.set(key.clone(), Value::List(rebuild(items)));
    }
    Ok(RespValue::SimpleString("OK".to_string()))
}

pub fn lrem(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let count = parse_i64(&args[2])?;
    let value = &args[3];
    let key = &args[1];
    let list = match db.get_mut(key) {
        Some(v) => v.as_list_mut()?,
        None => return Ok(RespValue::Integer(0)),
    };
    let removed = list.remove_matching(value, count);
    if list.is_empty() {
        db.remove(key);
    }
    Ok(RespValue::Integer(removed))
}

pub fn linsert(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let where_ = String::from_utf8_lossy(&args[2]).to_ascii_uppercase();
    let before = match where_.as_str() {
        "BEFORE" => true,
        "AFTER" => false,
        _ => return Err(RedisError::syntax()),
    };
    let pivot = &args[3];
    let value = args[4].clone();
    let key = &args[1];

    let list = match db.get(key) {
        Some(v) => v.as_list()?,
        None => return Ok(RespValue::Integer(0)),
    };
    let items: Vec<Bytes> = list.iter().cloned().collect();
    let pos = match items.iter().position(|v| v.as_ref() == pivot.as_ref()) {
        Some(p) => p,
        None => return Ok(RespValue::Integer(-1)),
    };
    let insert_at = if before { pos } else { pos + 1 };
    let mut rebuilt = items;
    rebuilt.insert(insert_at, value);
    let len = rebuilt.len();
    db.set(key.clone(), Value::List(rebuild(rebuilt)));
    Ok(RespValue::Integer(len as i64))
}

pub fn rpoplpush(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    lmove_inner(db, &args[1], &args[2], true, false)
}

pub fn lmove(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let from_tail = match &*String::from_utf8_lossy(&args[3]).to_ascii_uppercase() {
        "LEFT" => false,
        "RIGHT" => true,
        _ => return Err(RedisError::syntax()),
    };
    let to_head = match &*String::from_utf8_lossy(&args[4]).to_ascii_uppercase() {
        "LEFT" => true,
        "RIGHT" => false,
        _ => return Err(RedisError::syntax()),
    };
    lmove_inner(db, &args[1], &args[2], from_tail, to_head)
}

fn lmove_inner(db: &mut Database, src: &Bytes, dst: &Bytes, from_tail: bool, to_head: bool) -> Result<RespValue> {
    let source = match db.get_mut(src) {
        Some(v) => v.as_list_mut()?,
        None => return Ok(RespValue::Null),
    };
    let item = if from_tail { source.pop_back() } else { source.pop_front() };
    let item = match item {
        Some(i) => i,
        None => return Ok(RespValue::Null),
    };
    if source.is_empty() {
        db.remove(src);
    }
    if let Some(existing) = db.get(dst) {
        existing.as_list()?;
    }
    let target = db
        .entry_or_insert_with(dst, || Value::List(ListValue::new()))
        .as_list_mut()?;
    if to_head {
        target.push_front(item.clone());
    } else {
        target.push_back(item.clone());
    }
    Ok(RespValue::BulkString(item))
}

pub fn lpos(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let target = &args[2];
    let mut rank: i64 = 1;
    let mut count: Option<usize> = None;
    let mut i = 3;
    while i < args.len() {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "RANK" => {
                i += 1;
                rank = parse_i64(&args[i])?;
            }
            "COUNT" => {
                i += 1;
                count = Some(parse_usize(&args[i])?);
            }
            "MAXLEN" => {
                i += 1;
            }
            _ => return Err(RedisError::syntax()),
        }
        i += 1;
    }

    let list = match get_list(db, &args[1])? {
        Some(l) => l,
        None => {
            return Ok(match count {
                Some(_) => RespValue::Array(Vec::new()),
                None => RespValue::Null,
            })
        }
    };
    let items: Vec<&Bytes> = list.iter().collect();
    let mut matches: Vec<usize> = Vec::new();
    if rank >= 0 {
        for (idx, item) in items.iter().enumerate() {
            if item.as_ref() == target.as_ref() {
                matches.push(idx);
            }
        }
        let skip = (rank.max(1) - 1) as usize;
        matches = matches.into_iter().skip(skip).collect();
    } else {
        for (idx, item) in items.iter().enumerate().rev() {
            if item.as_ref() == target.as_ref() {
                matches.push(idx);
            }
        }
        let skip = (rank.unsigned_abs() - 1) as usize;
        matches = matches.into_iter().skip(skip).collect();
    }
    if let Some(n) = count {
        let limit = if n == 0 { matches.len() } else { n };
        matches.truncate(limit);
        Ok(RespValue::Array(
            matches.into_iter().map(|i| RespValue::Integer(i as i64)).collect(),
        ))
    } else {
        Ok(matches
            .into_iter()
            .next()
            .map(|i| RespValue::Integer(i as i64))
            .unwrap_or(RespValue::Null))
    }
}

fn resolve_index(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let i = if index < 0 { len + index } else { index };
    if i < 0 || i >= len {
        None
    } else {
        Some(i as usize)
    }
}

fn normalize_range(mut start: i64, mut end: i64, len: i64) -> (i64, i64) {
    if start < 0 {
        start = (len + start).max(0);
    }
    if end < 0 {
        end = len + end;
    }
    if start < 0 {
        start = 0;
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
    fn rpush_and_lrange() {
        let mut db = Database::default();
        lpush(&mut db, &[b("RPUSH"), b("k"), b("a"), b("b"), b("c")], true).unwrap();
        let result = lrange(&mut db, &[b("LRANGE"), b("k"), b("0"), b("-1")]).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![
                RespValue::BulkString(b("a")),
                RespValue::BulkString(b("b")),
                RespValue::BulkString(b("c")),
            ])
        );
    }

    #[test]
    fn lpush_prepends() {
        let mut db = Database::default();
        lpush(&mut db, &[b("LPUSH"), b("k"), b("a"), b("b")], false).unwrap();
        let result = lrange(&mut db, &[b("LRANGE"), b("k"), b("0"), b("-1")]).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![RespValue::BulkString(b("b")), RespValue::BulkString(b("a"))])
        );
    }

    #[test]
    fn lpop_with_count() {
        let mut db = Database::default();
        lpush(&mut db, &[b("RPUSH"), b("k"), b("a"), b("b"), b("c")], true).unwrap();
        let result = lpop(&mut db, &[b("LPOP"), b("k"), b("2")], false).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![RespValue::BulkString(b("a")), RespValue::BulkString(b("b"))])
        );
    }

    #[test]
    fn lrem_removes_matching() {
        let mut db = Database::default();
        lpush(&mut db, &[b("RPUSH"), b("k"), b("a"), b("b"), b("a")], true).unwrap();
        let removed = lrem(&mut db, &[b("LREM"), b("k"), b("0"), b("a")]).unwrap();
        assert_eq!(removed, RespValue::Integer(2));
    }

    #[test]
    fn linsert_before_pivot() {
        let mut db = Database::default();
        lpush(&mut db, &[b("RPUSH"), b("k"), b("a"), b("c")], true).unwrap();
        linsert(&mut db, &[b("LINSERT"), b("k"), b("BEFORE"), b("c"), b("b")]).unwrap();
        let result = lrange(&mut db, &[b("LRANGE"), b("k"), b("0"), b("-1")]).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![
                RespValue::BulkString(b("a")),
                RespValue::BulkString(b("b")),
                RespValue::BulkString(b("c")),
            ])
        );
    }

    #[test]
    fn rpoplpush_moves_between_lists() {
        let mut db = Database::default();
        lpush(&mut db, &[b("RPUSH"), b("src"), b("a"), b("b")], true).unwrap();
        let result = rpoplpush(&mut db, &[b("RPOPLPUSH"), b("src"), b("dst")]).unwrap();
        assert_eq!(result, RespValue::BulkString(b("b")));
        let dst = lrange(&mut db, &[b("LRANGE"), b("dst"), b("0"), b("-1")]).unwrap();
        assert_eq!(dst, RespValue::Array(vec![RespValue::BulkString(b("b"))]));
    }

    #[test]
    fn lpushx_noop_on_missing_key() {
        let mut db = Database::default();
        let result = lpushx(&mut db, &[b("LPUSHX"), b("missing"), b("a")], true).unwrap();
        assert_eq!(result, RespValue::Integer(0));
    }
}
