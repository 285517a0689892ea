//! SET value container with intset/listpack/hashtable dual encoding.
//!
//! Redis also reports a `"listpack"` set encoding for small non-integer
//! member sets; we collapse that case into the hash encoding's storage
//! (a `HashSet<Bytes>`) but still surface the `"listpack"` name from
//! `encoding()` when small enough, matching the reference name exactly.

use bytes::Bytes;
use std::collections::HashSet;

const INTSET_LIMIT: usize = 512;
const LISTPACK_LIMIT: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum SetValue {
    IntSet(Vec<i64>),
    Hash(HashSet<Bytes>),
}

impl SetValue {
    pub fn new() -> Self {
        Self::IntSet(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::IntSet(v) => v.len(),
            Self::Hash(h) => h.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, member: &[u8]) -> bool {
        match self {
            Self::IntSet(v) => parse_int(member).is_some_and(|i| v.binary_search(&i).is_ok()),
            Self::Hash(h) => h.contains(member),
        }
    }

    /// Returns true if the member was newly inserted.
    pub fn insert(&mut self, member: Bytes) -> bool {
        if let Self::IntSet(v) = self {
            if let Some(i) = parse_int(&member) {
                return match v.binary_search(&i) {
                    Ok(_) => false,
                    Err(pos) => {
                        v.insert(pos, i);
                        if v.len() > INTSET_LIMIT {
                            self.convert_to_hash();
                        }
                        true
                    }
                };
            } else {
                self.convert_to_hash();
            }
        }
        if let Self::Hash(h) = self {
            h.insert(member)
        } else {
            unreachable!()
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self {
            Self::IntSet(v) => match parse_int(member) {
                Some(i) => match v.binary_search(&i) {
                    Ok(pos) => {
                        v.remove(pos);
                        true
                    }
                    Err(_) => false,
                },
                None => false,
            },
            Self::Hash(h) => h.remove(member),
        }
    }

    pub fn members(&self) -> Vec<Bytes> {
        match self {
            Self::IntSet(v) => v.iter().map(|i| Bytes::from(i.to_string())).collect(),
            Self::Hash(h) => h.iter().cloned().collect(),
        }
    }

    fn convert_to_hash(&mut self) {
        if let Self::IntSet(v) = self {
            let members: HashSet<Bytes> =
                v.iter().map(|i| Bytes::from(i.to_string())).collect();
            *self = Self::Hash(members);
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            Self::IntSet(_) => "intset",
            Self::Hash(h) if h.len() <= LISTPACK_LIMIT => "listpack",
            Self::Hash(_) => "hashtable",
        }
    }
}

impl Default for SetValue {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_int(b: &[u8]) -> Option<i64> {
    let s = std::str::from_utf8(b).ok()?;
    if s.is_empty() || s.len() > 20 {
        return None;
    }
    let v: i64 = s.parse().ok()?;
    (v.to_string() == s).then_some(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intset_stays_sorted() {
        let mut s = SetValue::new();
        s.insert(Bytes::from_static(b"5"));
        s.insert(Bytes::from_static(b"1"));
        s.insert(Bytes::from_static(b"3"));
        if let SetValue::IntSet(v) = &s {
            assert_eq!(v, &vec![1, 3, 5]);
        } else {
            panic!("expected intset");
        }
    }

    #[test]
    fn non_integer_converts_to_hash() {
        let mut s = SetValue::new();
        s.insert(Bytes::from_static(b"1"));
        s.insert(Bytes::from_static(b"hello"));
        assert!(matches!(s, SetValue::Hash(_)));
        assert!(s.contains(b"1"));
        assert!(s.contains(b"hello"));
    }

    #[test]
    fn intset_converts_to_hash_over_limit() {
        let mut s = SetValue::new();
        for i in 0..600 {
            s.insert(Bytes::from(i.to_string()));
        }
        assert!(matches!(s, SetValue::Hash(_)));
        assert_eq!(s.len(), 600);
    }

    #[test]
    fn duplicate_insert_returns_false() {
        let mut s = SetValue::new();
        assert!(s.insert(Bytes::from_static(b"1")));
        assert!(!s.insert(Bytes::from_static(b"1")));
    }

    #[test]
    fn remove_from_intset() {
        let mut s = SetValue::new();
        s.insert(Bytes::from_static(b"1"));
        s.insert(Bytes::from_static(b"2"));
        assert!(s.remove(b"1"));
        assert!(!s.contains(b"1"));
        assert!(!s.remove(b"1"));
    }

    #[test]
    fn encoding_transitions() {
        let mut s = SetValue::new();
        assert_eq!(s.encoding(), "intset");
        s.insert(Bytes::from_static(b"abc"));
        assert_eq!(s.encoding(), "listpack");
        for i in 0..200 {
            s.insert(Bytes::from(format!("member-{i}")));
        }
        assert_eq!(s.encoding(), "hashtable");
    }
}
