//! Snapshot (RDB-like) writer and loader.
//!
//! Format: `"REDIS" | "0009" | (SELECTDB marker, db index, entries...)* |
//! 0xFF | 8-byte checksum`. Every entry is `[0xFD + 8-byte ms deadline]?
//! type-byte key-string type-body`. Strings are length-prefixed: a single
//! byte for lengths up to 252, marker `253` + 2-byte big-endian length, or
//! marker `254` + 4-byte big-endian length.

use crate::error::{RedisError, Result};
use crate::keyspace::Keyspace;
use crate::value::{HashValue, ListValue, SetValue, StringValue, Value, ZSetValue};
use bytes::Bytes;
use std::io::{Read, Write};

const MAGIC: &[u8; 5] = b"REDIS";
const VERSION: &[u8; 4] = b"0009";
const OP_SELECTDB: u8 = 0xFE;
const OP_EOF: u8 = 0xFF;
const OP_EXPIRE: u8 = 0xFD;

const TYPE_STRING: u8 = 0;
const TYPE_LIST: u8 = 1;
const TYPE_SET: u8 = 2;
const TYPE_ZSET: u8 = 3;
const TYPE_HASH: u8 = 4;

fn write_length(out: &mut Vec<u8>, len: u64) {
    if len <= 252 {
        out.push(len as u8);
    } else if len <= 0xFFFF {
        out.push(253);
        out.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        out.push(254);
        out.extend_from_slice(&(len as u32).to_be_bytes());
    }
}

fn read_length(input: &mut impl Read) -> Result<u64> {
    let mut marker = [0u8; 1];
    input
        .read_exact(&mut marker)
        .map_err(|e| RedisError::Persistence(format!("reading length marker: {e}")))?;
    match marker[0] {
        253 => {
            let mut buf = [0u8; 2];
            input
                .read_exact(&mut buf)
                .map_err(|e| RedisError::Persistence(format!("reading u16 length: {e}")))?;
            Ok(u16::from_be_bytes(buf) as u64)
        }
        254 => {
            let mut buf = [0u8; 4];
            input
                .read_exact(&mut buf)
                .map_err(|e| RedisError::Persistence(format!("reading u32 length: {e}")))?;
            Ok(u32::from_be_bytes(buf) as u64)
        }
        n => Ok(n as u64),
    }
}

fn write_string(out: &mut Vec<u8>, bytes: &[u8]) {
    write_length(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}

fn read_string(input: &mut impl Read) -> Result<Bytes> {
    let len = read_length(input)? as usize;
    let mut buf = vec![0u8; len];
    input
        .read_exact(&mut buf)
        .map_err(|e| RedisError::Persistence(format!("reading string body: {e}")))?;
    Ok(Bytes::from(buf))
}

fn write_value(out: &mut Vec<u8>, value: &Value) {
    match value {
        Value::String(s) => {
            out.push(TYPE_STRING);
            write_string(out, &s.as_bytes());
        }
        Value::List(l) => {
            out.push(TYPE_LIST);
            let items: Vec<&Bytes> = l.iter().collect();
            write_length(out, items.len() as u64);
            for item in items {
                write_string(out, item);
            }
        }
        Value::Set(s) => {
            out.push(TYPE_SET);
            let mut members = s.members();
            members.sort();
            write_length(out, members.len() as u64);
            for m in members {
                write_string(out, &m);
            }
        }
        Value::ZSet(z) => {
            out.push(TYPE_ZSET);
            let members = z.iter_sorted();
            write_length(out, members.len() as u64);
            for (member, score) in members {
                write_string(out, &member);
                out.extend_from_slice(&score.to_le_bytes());
            }
        }
        Value::Hash(h) => {
            out.push(TYPE_HASH);
            let mut fields: Vec<(&Bytes, &Bytes)> = h.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            write_length(out, fields.len() as u64);
            for (field, val) in fields {
                write_string(out, field);
                write_string(out, val);
            }
        }
    }
}

fn read_value(input: &mut impl Read, type_byte: u8) -> Result<Value> {
    match type_byte {
        TYPE_STRING => Ok(Value::String(StringValue::from_bytes(read_string(input)?))),
        TYPE_LIST => {
            let count = read_length(input)?;
            let mut list = ListValue::new();
            for _ in 0..count {
                list.push_back(read_string(input)?);
            }
            Ok(Value::List(list))
        }
        TYPE_SET => {
            let count = read_length(input)?;
            let mut set = SetValue::new();
            for _ in 0..count {
                set.insert(read_string(input)?);
            }
            Ok(Value::Set(set))
        }
        TYPE_ZSET => {
            let count = read_length(input)?;
            let mut zset = ZSetValue::new();
            for _ in 0..count {
                let member = read_string(input)?;
                let mut score_buf = [0u8; 8];
                input
                    .read_exact(&mut score_buf)
                    .map_err(|e| RedisError::Persistence(format!("reading score: {e}")))?;
                zset.insert(member, f64::from_le_bytes(score_buf));
            }
            Ok(Value::ZSet(zset))
        }
        TYPE_HASH => {
            let count = read_length(input)?;
            let mut hash = HashValue::new();
            for _ in 0..count {
                let field = read_string(input)?;
                let val = read_string(input)?;
                hash.set(field, val);
            }
            Ok(Value::Hash(hash))
        }
        other => Err(RedisError::Persistence(format!("unknown type byte {other}"))),
    }
}

/// Fowler-Noll-Vo 64-bit hash, used as the snapshot's trailing checksum —
/// not a cryptographic guarantee, just a cheap corruption detector.
fn fnv1a64(data: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

/// Serialize every non-empty database into the snapshot wire format.
pub fn dump(keyspace: &Keyspace) -> Vec<u8> {
    let mut body = Vec::new();
    for db_index in 0..keyspace.count() {
        let mut db = keyspace.db(db_index).write();
        if db.is_empty() {
            continue;
        }
        body.push(OP_SELECTDB);
        write_length(&mut body, db_index as u64);

        let (_, keys) = db.scan(0, usize::MAX);
        let mut keys = keys;
        keys.sort();
        for key in keys {
            let Some(entry) = db.get_entry(&key) else {
                continue;
            };
            let value = entry.value.clone();
            let deadline_ms = db_expiry_ms(&mut db, &key);
            if let Some(deadline) = deadline_ms {
                body.push(OP_EXPIRE);
                body.extend_from_slice(&deadline.to_be_bytes());
            }
            write_string(&mut body, &key);
            write_value(&mut body, &value);
        }
    }
    body.push(OP_EOF);

    let mut out = Vec::with_capacity(MAGIC.len() + VERSION.len() + body.len() + 8);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(VERSION);
    out.extend_from_slice(&body);
    let checksum = fnv1a64(&out);
    out.extend_from_slice(&checksum.to_be_bytes());
    out
}

fn db_expiry_ms(db: &mut crate::keyspace::Database, key: &[u8]) -> Option<i64> {
    db.pttl(key).map(|remaining_ms| crate::keyspace::now_ms() + remaining_ms)
}

/// Load a snapshot previously produced by [`dump`], replacing the contents
/// of every database it mentions. Databases not mentioned are left as-is.
pub fn load(data: &[u8], keyspace: &Keyspace) -> Result<()> {
    if data.len() < MAGIC.len() + VERSION.len() + 8 {
        return Err(RedisError::Persistence("snapshot too short".into()));
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(RedisError::Persistence("bad snapshot magic".into()));
    }
    let body_end = data.len() - 8;
    let checksum_expected = u64::from_be_bytes(data[body_end..].try_into().unwrap());
    let checksum_actual = fnv1a64(&data[..body_end]);
    if checksum_expected != checksum_actual {
        return Err(RedisError::Persistence("snapshot checksum mismatch".into()));
    }

    let mut cursor = std::io::Cursor::new(&data[MAGIC.len() + VERSION.len()..body_end]);
    let mut current_db = 0usize;

    loop {
        let mut opcode = [0u8; 1];
        if cursor.read_exact(&mut opcode).is_err() {
            break;
        }
        match opcode[0] {
            OP_EOF => break,
            OP_SELECTDB => {
                current_db = read_length(&mut cursor)? as usize;
                if current_db >= keyspace.count() {
                    return Err(RedisError::Persistence(format!(
                        "snapshot references db {current_db} beyond configured count"
                    )));
                }
                keyspace.db(current_db).write().clear();
            }
            OP_EXPIRE => {
                let mut deadline_buf = [0u8; 8];
                cursor
                    .read_exact(&mut deadline_buf)
                    .map_err(|e| RedisError::Persistence(format!("reading expiry: {e}")))?;
                let deadline = i64::from_be_bytes(deadline_buf);
                let key = read_string(&mut cursor)?;
                let mut type_byte = [0u8; 1];
                cursor
                    .read_exact(&mut type_byte)
                    .map_err(|e| RedisError::Persistence(format!("reading type byte: {e}")))?;
                let value = read_value(&mut cursor, type_byte[0])?;
                let mut db = keyspace.db(current_db).write();
                db.set(key.clone(), value);
                db.set_expiry(&key, deadline);
            }
            type_byte => {
                let key = read_string(&mut cursor)?;
                let value = read_value(&mut cursor, type_byte)?;
                keyspace.db(current_db).write().set(key, value);
            }
        }
    }

    Ok(())
}

/// Serialize a snapshot and write it to `path` via write-temp-then-rename.
pub fn save_to_file(keyspace: &Keyspace, path: &std::path::Path) -> Result<()> {
    let data = dump(keyspace);
    let tmp_path = path.with_extension("tmp");
    {
        let mut f = std::fs::File::create(&tmp_path)
            .map_err(|e| RedisError::Persistence(format!("creating temp snapshot: {e}")))?;
        f.write_all(&data)
            .map_err(|e| RedisError::Persistence(format!("writing temp snapshot: {e}")))?;
        f.sync_all()
            .map_err(|e| RedisError::Persistence(format!("syncing temp snapshot: {e}")))?;
    }
    std::fs::rename(&tmp_path, path)
        .map_err(|e| RedisError::Persistence(format!("renaming snapshot into place: {e}")))?;
    Ok(())
}

pub fn load_from_file(keyspace: &Keyspace, path: &std::path::Path) -> Result<()> {
    let data = std::fs::read(path)
        .map_err(|e| RedisError::Persistence(format!("reading snapshot file: {e}")))?;
    load(&data, keyspace)
}
