//! HASH value container with listpack/hashtable dual encoding.

use bytes::Bytes;
use std::collections::HashMap;

const PACKED_FIELD_LIMIT: usize = 128;
const PACKED_VALUE_LIMIT: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum HashValue {
    Packed(Vec<(Bytes, Bytes)>),
    Map(HashMap<Bytes, Bytes>),
}

impl HashValue {
    pub fn new() -> Self {
        Self::Packed(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Packed(v) => v.len(),
            Self::Map(m) => m.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, field: &[u8]) -> Option<Bytes> {
        match self {
            Self::Packed(v) => v.iter().find(|(f, _)| f.as_ref() == field).map(|(_, val)| val.clone()),
            Self::Map(m) => m.get(field).cloned(),
        }
    }

    /// Set a field, returning whether it was newly created.
    pub fn set(&mut self, field: Bytes, value: Bytes) -> bool {
        if let Self::Packed(v) = self {
            if let Some(slot) = v.iter_mut().find(|(f, _)| *f == field) {
                slot.1 = value;
                return false;
            }
            let oversized = field.len() > PACKED_VALUE_LIMIT || value.len() > PACKED_VALUE_LIMIT;
            v.push((field, value));
            if oversized || v.len() > PACKED_FIELD_LIMIT {
                self.convert_to_map();
            }
            return true;
        }
        if let Self::Map(m) = self {
            m.insert(field, value).is_none()
        } else {
            unreachable!()
        }
    }

    pub fn remove(&mut self, field: &[u8]) -> bool {
        match self {
            Self::Packed(v) => {
                if let Some(pos) = v.iter().position(|(f, _)| f.as_ref() == field) {
                    v.remove(pos);
                    true
                } else {
                    false
                }
            }
            Self::Map(m) => m.remove(field).is_some(),
        }
    }

    pub fn contains(&self, field: &[u8]) -> bool {
        match self {
            Self::Packed(v) => v.iter().any(|(f, _)| f.as_ref() == field),
            Self::Map(m) => m.contains_key(field),
        }
    }

    pub fn iter(&self) -> Box<dyn Iterator<Item = (&Bytes, &Bytes)> + '_> {
        match self {
            Self::Packed(v) => Box::new(v.iter().map(|(f, val)| (f, val))),
            Self::Map(m) => Box::new(m.iter()),
        }
    }

    fn convert_to_map(&mut self) {
        if let Self::Packed(v) = self {
            let map: HashMap<Bytes, Bytes> = v.drain(..).collect();
            *self = Self::Map(map);
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Packed(_) => "listpack",
            Self::Map(_) => "hashtable",
        }
    }
}

impl Default for HashValue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_and_get() {
        let mut h = HashValue::new();
        assert!(h.set(b("f1"), b("v1")));
        assert!(!h.set(b("f1"), b("v2")));
        assert_eq!(h.get(b"f1"), Some(b("v2")));
    }

    #[test]
    fn remove_field() {
        let mut h = HashValue::new();
        h.set(b("f1"), b("v1"));
        assert!(h.remove(b"f1"));
        assert!(!h.remove(b"f1"));
        assert!(h.is_empty());
    }

    #[test]
    fn converts_to_hashtable_on_count() {
        let mut h = HashValue::new();
        for i in 0..200 {
            h.set(Bytes::from(format!("f{i}")), Bytes::from_static(b"v"));
        }
        assert_eq!(h.encoding(), "hashtable");
        assert_eq!(h.len(), 200);
    }

    #[test]
    fn converts_to_hashtable_on_large_value() {
        let mut h = HashValue::new();
        h.set(b("f1"), Bytes::from(vec![b'x'; 100]));
        assert_eq!(h.encoding(), "hashtable");
    }
}
