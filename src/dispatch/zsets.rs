//! ZSET command handlers.

use crate::error::{RedisError, Result};
use crate::keyspace::Database;
use crate::resp::RespValue;
use crate::value::{Value, ZSetValue};
use bytes::Bytes;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashSet;

fn get_zset<'a>(db: &'a mut Database, key: &[u8]) -> Result<Option<&'a ZSetValue>> {
    match db.get(key) {
        Some(v) => Ok(Some(v.as_zset()?)),
        None => Ok(None),
    }
}

fn parse_score(b: &[u8]) -> Result<f64> {
    match std::str::from_utf8(b).ok().map(str::trim) {
        Some("+inf") => Ok(f64::INFINITY),
        Some("-inf") => Ok(f64::NEG_INFINITY),
        Some(s) => s.parse().map_err(|_| RedisError::not_float()),
        None => Err(RedisError::not_float()),
    }
}

pub fn zadd(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_zset()?;
    }

    let mut i = 2;
    let mut nx = false;
    let mut xx = false;
    let mut gt = false;
    let mut lt = false;
    let mut ch = false;
    let mut incr = false;
    loop {
        let opt = String::from_utf8_lossy(&args[i]).to_ascii_uppercase();
        match opt.as_str() {
            "NX" => nx = true,
            "XX" => xx = true,
            "GT" => gt = true,
            "LT" => lt = true,
            "CH" => ch = true,
            "INCR" => incr = true,
            _ => break,
        }
        i += 1;
    }

    let zset = db
        .entry_or_insert_with(key, || Value::ZSet(ZSetValue::new()))
        .as_zset_mut()?;

    let mut added = 0i64;
    let mut changed = 0i64;
    let mut last_score: Option<f64> = None;

    let pairs = &args[i..];
    if pairs.len() % 2 != 0 || pairs.is_empty() {
        return Err(RedisError::syntax());
    }
    for pair in pairs.chunks(2) {
        let score = parse_score(&pair[0])?;
        let member = pair[1].clone();
        let existing_score = zset.score(&member);

        if nx && existing_score.is_some() {
            last_score = existing_score;
            continue;
        }
        if xx && existing_score.is_none() {
            continue;
        }
        let final_score = if incr {
            existing_score.unwrap_or(0.0) + score
        } else {
            score
        };
        if let Some(old) = existing_score {
            if gt && final_score <= old {
                last_score = Some(old);
                continue;
            }
            if lt && final_score >= old {
                last_score = Some(old);
                continue;
            }
        }
        let is_new = zset.insert(member, final_score);
        last_score = Some(final_score);
        if is_new {
            added += 1;
            changed += 1;
        } else if existing_score != Some(final_score) {
            changed += 1;
        }
    }

    if incr {
        return Ok(last_score.map(RespValue::Double).unwrap_or(RespValue::Null));
    }
    Ok(RespValue::Integer(if ch { changed } else { added }))
}

pub fn zrem(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let key = &args[1];
    let zset = match db.get_mut(key) {
        Some(v) => v.as_zset_mut()?,
        None => return Ok(RespValue::Integer(0)),
    };
    let mut removed = 0;
    for member in &args[2..] {
        if zset.remove(member) {
            removed += 1;
        }
    }
    if zset.is_empty() {
        db.remove(key);
    }
    Ok(RespValue::Integer(removed))
}

pub fn zscore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_zset(db, &args[1])? {
        Some(z) => Ok(z.score(&args[2]).map(RespValue::Double).unwrap_or(RespValue::Null)),
        None => Ok(RespValue::Null),
    }
}

pub fn zmscore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let zset = get_zset(db, &args[1])?;
    let out = args[2..]
        .iter()
        .map(|m| zset.as_ref().and_then(|z| z.score(m)).map(RespValue::Double).unwrap_or(RespValue::Null))
        .collect();
    Ok(RespValue::Array(out))
}

pub fn zcard(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    match get_zset(db, &args[1])? {
        Some(z) => Ok(RespValue::Integer(z.len() as i64)),
        None => Ok(RespValue::Integer(0)),
    }
}

pub fn zincrby(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let delta = parse_score(&args[2])?;
    let member = args[3].clone();
    let key = &args[1];
    if let Some(existing) = db.get(key) {
        existing.as_zset()?;
    }
    let zset = db
        .entry_or_insert_with(key, || Value::ZSet(ZSetValue::new()))
        .as_zset_mut()?;
    let new_score = zset.score(&member).unwrap_or(0.0) + delta;
    zset.insert(member, new_score);
    Ok(RespValue::Double(new_score))
}

pub fn zrank(db: &mut Database, args: &[Bytes], reverse: bool) -> Result<RespValue> {
    let with_score = args.len() > 3
        && String::from_utf8_lossy(&args[3]).eq_ignore_ascii_case("WITHSCORE");
    let zset = match get_zset(db, &args[1])? {
        Some(z) => z,
        None => return Ok(RespValue::Null),
    };
    let rank = zset.rank(&args[2]);
    let rank = rank.map(|r| if reverse { zset.len() - 1 - r } else { r });
    match (rank, with_score) {
        (Some(r), false) => Ok(RespValue::Integer(r as i64)),
        (Some(r), true) => {
            let score = zset.score(&args[2]).unwrap_or(0.0);
            Ok(RespValue::Array(vec![RespValue::Integer(r as i64), RespValue::Double(score)]))
        }
        (None, _) => Ok(RespValue::Null),
    }
}

fn sorted(db: &mut Database, key: &[u8]) -> Result<Vec<(Bytes, f64)>> {
    Ok(match get_zset(db, key)? {
        Some(z) => z.iter_sorted(),
        None => Vec::new(),
    })
}

pub fn zrange(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    let with_scores = args[4..].iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
    let rev = args[4..].iter().any(|a| a.eq_ignore_ascii_case(b"REV"));

    let mut all = sorted(db, &args[1])?;
    if rev {
        all.reverse();
    }
    let len = all.len() as i64;
    if len == 0 {
        return Ok(RespValue::Array(Vec::new()));
    }
    let (s, e) = normalize_range(start, stop, len);
    if s > e {
        return Ok(RespValue::Array(Vec::new()));
    }
    let slice = &all[s as usize..=(e as usize)];
    Ok(render(slice, with_scores))
}

pub fn zrangebyscore(db: &mut Database, args: &[Bytes], reverse: bool) -> Result<RespValue> {
    let (min_arg, max_arg) = if reverse {
        (&args[3], &args[2])
    } else {
        (&args[2], &args[3])
    };
    let (min, min_excl) = parse_bound(min_arg)?;
    let (max, max_excl) = parse_bound(max_arg)?;
    let with_scores = args[4..].iter().any(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));

    let mut limit_offset = 0i64;
    let mut limit_count: i64 = -1;
    for i in 4..args.len() {
        if args[i].eq_ignore_ascii_case(b"LIMIT") {
            limit_offset = parse_i64(&args[i + 1])?;
            limit_count = parse_i64(&args[i + 2])?;
        }
    }

    let mut all = sorted(db, &args[1])?;
    all.retain(|(_, score)| {
        let above_min = if min_excl { *score > min } else { *score >= min };
        let below_max = if max_excl { *score < max } else { *score <= max };
        above_min && below_max
    });
    if reverse {
        all.reverse();
    }
    let sliced: Vec<(Bytes, f64)> = if limit_count >= 0 {
        all.into_iter()
            .skip(limit_offset.max(0) as usize)
            .take(limit_count as usize)
            .collect()
    } else {
        all.into_iter().skip(limit_offset.max(0) as usize).collect()
    };
    Ok(render(&sliced, with_scores))
}

pub fn zcount(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let (min, min_excl) = parse_bound(&args[2])?;
    let (max, max_excl) = parse_bound(&args[3])?;
    let all = sorted(db, &args[1])?;
    let count = all
        .iter()
        .filter(|(_, score)| {
            let above_min = if min_excl { *score > min } else { *score >= min };
            let below_max = if max_excl { *score < max } else { *score <= max };
            above_min && below_max
        })
        .count();
    Ok(RespValue::Integer(count as i64))
}

pub fn zremrangebyrank(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let start = parse_i64(&args[2])?;
    let stop = parse_i64(&args[3])?;
    let key = &args[1];
    let all = sorted(db, key)?;
    let len = all.len() as i64;
    if len == 0 {
        return Ok(RespValue::Integer(0));
    }
    let (s, e) = normalize_range(start, stop, len);
    if s > e {
        return Ok(RespValue::Integer(0));
    }
    let to_remove: Vec<Bytes> = all[s as usize..=(e as usize)].iter().map(|(m, _)| m.clone()).collect();
    let removed = to_remove.len();
    let zset = db.get_mut(key).unwrap().as_zset_mut()?;
    for m in &to_remove {
        zset.remove(m);
    }
    if zset.is_empty() {
        db.remove(key);
    }
    Ok(RespValue::Integer(removed as i64))
}

pub fn zremrangebyscore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let (min, min_excl) = parse_bound(&args[2])?;
    let (max, max_excl) = parse_bound(&args[3])?;
    let key = &args[1];
    let all = sorted(db, key)?;
    let to_remove: Vec<Bytes> = all
        .iter()
        .filter(|(_, score)| {
            let above_min = if min_excl { *score > min } else { *score >= min };
            let below_max = if max_excl { *score < max } else { *score <= max };
            above_min && below_max
        })
        .map(|(m, _)| m.clone())
        .collect();
    if to_remove.is_empty() {
        return Ok(RespValue::Integer(0));
    }
    let removed = to_remove.len();
    let zset = db.get_mut(key).unwrap().as_zset_mut()?;
    for m in &to_remove {
        zset.remove(m);
    }
    if zset.is_empty() {
        db.remove(key);
    }
    Ok(RespValue::Integer(removed as i64))
}

pub fn zrandmember(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let all = sorted(db, &args[1])?;
    if all.is_empty() {
        return Ok(match args.get(2) {
            Some(_) => RespValue::Array(Vec::new()),
            None => RespValue::Null,
        });
    }
    match args.get(2) {
        None => {
            let (m, _) = all.choose(&mut thread_rng()).cloned().unwrap();
            Ok(RespValue::BulkString(m))
        }
        Some(c) => {
            let n = parse_i64(c)?;
            let with_scores = args.get(3).is_some_and(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
            let picked: Vec<(Bytes, f64)> = if n >= 0 {
                let mut pool = all;
                pool.shuffle(&mut thread_rng());
                pool.into_iter().take(n as usize).collect()
            } else {
                let count = n.unsigned_abs() as usize;
                (0..count).map(|_| all.choose(&mut thread_rng()).cloned().unwrap()).collect()
            };
            Ok(render(&picked, with_scores))
        }
    }
}

pub fn zrangestore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let dest = args[1].clone();
    let source_args: Vec<Bytes> = std::iter::once(args[0].clone()).chain(args[2..].iter().cloned()).collect();
    let result = zrange(db, &source_args)?;
    let pairs = match result {
        RespValue::Array(items) => items,
        _ => Vec::new(),
    };
    // zrange without WITHSCORES returns bare members; re-fetch scores for storage.
    let source_zset = sorted(db, &args[2])?;
    let mut zset = ZSetValue::new();
    for item in &pairs {
        if let RespValue::BulkString(member) = item {
            if let Some((_, score)) = source_zset.iter().find(|(m, _)| m == member) {
                zset.insert(member.clone(), *score);
            }
        }
    }
    let len = zset.len();
    if len == 0 {
        db.remove(&dest);
    } else {
        db.set(dest, Value::ZSet(zset));
    }
    Ok(RespValue::Integer(len as i64))
}

/// `ZDIFFSTORE destination numkeys key [key ...]`: members of the first
/// key's zset that are absent from every other key's zset, scored by
/// their score in the first key.
pub fn zdiffstore(db: &mut Database, args: &[Bytes]) -> Result<RespValue> {
    let dest = args[1].clone();
    let numkeys = parse_usize(&args[2])?;
    let keys = &args[3..3 + numkeys];
    let first = match keys.first() {
        Some(k) => sorted(db, k)?,
        None => return Err(RedisError::syntax()),
    };

    let mut others = HashSet::new();
    for key in &keys[1..] {
        others.extend(sorted(db, key)?.into_iter().map(|(member, _)| member));
    }

    let mut zset = ZSetValue::new();
    for (member, score) in first {
        if !others.contains(&member) {
            zset.insert(member, score);
        }
    }
    let len = zset.len();
    if len == 0 {
        db.remove(&dest);
    } else {
        db.set(dest, Value::ZSet(zset));
    }
    Ok(RespValue::Integer(len as i64))
}

fn render(pairs: &[(Bytes, f64)], with_scores: bool) -> RespValue {
    let mut out = Vec::with_capacity(pairs.len() * if with_scores { 2 } else { 1 });
    for (member, score) in pairs {
        out.push(RespValue::BulkString(member.clone()));
        if with_scores {
            out.push(RespValue::Double(*score));
        }
    }
    RespValue::Array(out)
}

fn parse_bound(b: &[u8]) -> Result<(f64, bool)> {
    if let Some(rest) = b.strip_prefix(b"(") {
        Ok((parse_score(rest)?, true))
    } else {
        Ok((parse_score(b)?, false))
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
    fn zadd_and_zscore() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("k"), b("1"), b("a"), b("2"), b("b")]).unwrap();
        assert_eq!(zscore(&mut db, &[b("ZSCORE"), b("k"), b("a")]).unwrap(), RespValue::Double(1.0));
    }

    #[test]
    fn zadd_nx_skips_existing() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("k"), b("1"), b("a")]).unwrap();
        zadd(&mut db, &[b("ZADD"), b("k"), b("NX"), b("5"), b("a")]).unwrap();
        assert_eq!(zscore(&mut db, &[b("ZSCORE"), b("k"), b("a")]).unwrap(), RespValue::Double(1.0));
    }

    #[test]
    fn zrange_with_scores() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("k"), b("1"), b("a"), b("2"), b("b")]).unwrap();
        let result = zrange(&mut db, &[b("ZRANGE"), b("k"), b("0"), b("-1"), b("WITHSCORES")]).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![
                RespValue::BulkString(b("a")),
                RespValue::Double(1.0),
                RespValue::BulkString(b("b")),
                RespValue::Double(2.0),
            ])
        );
    }

    #[test]
    fn zrangebyscore_exclusive_bound() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("k"), b("1"), b("a"), b("2"), b("b"), b("3"), b("c")]).unwrap();
        let result = zrangebyscore(&mut db, &[b("ZRANGEBYSCORE"), b("k"), b("(1"), b("3")], false).unwrap();
        assert_eq!(
            result,
            RespValue::Array(vec![RespValue::BulkString(b("b")), RespValue::BulkString(b("c"))])
        );
    }

    #[test]
    fn zrank_basic() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("k"), b("1"), b("a"), b("2"), b("b")]).unwrap();
        assert_eq!(zrank(&mut db, &[b("ZRANK"), b("k"), b("b")], false).unwrap(), RespValue::Integer(1));
    }

    #[test]
    fn zremrangebyscore_removes() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("k"), b("1"), b("a"), b("2"), b("b"), b("3"), b("c")]).unwrap();
        let removed = zremrangebyscore(&mut db, &[b("ZREMRANGEBYSCORE"), b("k"), b("1"), b("2")]).unwrap();
        assert_eq!(removed, RespValue::Integer(2));
        assert_eq!(zcard(&mut db, &[b("ZCARD"), b("k")]).unwrap(), RespValue::Integer(1));
    }

    #[test]
    fn zdiffstore_keeps_only_members_absent_from_other_keys() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("a"), b("1"), b("x"), b("2"), b("y")]).unwrap();
        zadd(&mut db, &[b("ZADD"), b("b"), b("5"), b("y")]).unwrap();
        let result = zdiffstore(&mut db, &[b("ZDIFFSTORE"), b("dest"), b("2"), b("a"), b("b")]).unwrap();
        assert_eq!(result, RespValue::Integer(1));
        assert_eq!(zscore(&mut db, &[b("ZSCORE"), b("dest"), b("x")]).unwrap(), RespValue::Double(1.0));
    }

    #[test]
    fn zdiffstore_removes_dest_when_empty() {
        let mut db = Database::default();
        zadd(&mut db, &[b("ZADD"), b("a"), b("1"), b("x")]).unwrap();
        zadd(&mut db, &[b("ZADD"), b("b"), b("1"), b("x")]).unwrap();
        zadd(&mut db, &[b("ZADD"), b("dest"), b("1"), b("stale")]).unwrap();
        let result = zdiffstore(&mut db, &[b("ZDIFFSTORE"), b("dest"), b("2"), b("a"), b("b")]).unwrap();
        assert_eq!(result, RespValue::Integer(0));
        assert_eq!(zcard(&mut db, &[b("ZCARD"), b("dest")]).unwrap(), RespValue::Integer(0));
    }
}
