//! LIST value container with listpack/quicklist dual encoding.

use bytes::Bytes;
use std::collections::VecDeque;

/// A packed entry may not exceed this many bytes before the whole list is
/// promoted to the linked (`quicklist`) encoding.
const PACKED_ENTRY_LIMIT: usize = 64;
/// A packed list may not exceed this many entries before promotion.
const PACKED_COUNT_LIMIT: usize = 128;
/// Each node of a linked list holds up to this many entries.
const NODE_CAPACITY: usize = 128;

#[derive(Debug, Clone, PartialEq)]
pub enum ListValue {
    Packed(VecDeque<Bytes>),
    Linked(VecDeque<VecDeque<Bytes>>),
}

impl ListValue {
    pub fn new() -> Self {
        Self::Packed(VecDeque::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Packed(v) => v.len(),
            Self::Linked(nodes) => nodes.iter().map(|n| n.len()).sum(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn push_front(&mut self, value: Bytes) {
        self.promote_if_needed(value.len());
        match self {
            Self::Packed(v) => v.push_front(value),
            Self::Linked(nodes) => {
                match nodes.front_mut() {
                    Some(front) if front.len() < NODE_CAPACITY => front.push_front(value),
                    _ => {
                        let mut node = VecDeque::new();
                        node.push_back(value);
                        nodes.push_front(node);
                    }
                }
            }
        }
    }

    pub fn push_back(&mut self, value: Bytes) {
        self.promote_if_needed(value.len());
        match self {
            Self::Packed(v) => v.push_back(value),
            Self::Linked(nodes) => {
                match nodes.back_mut() {
                    Some(back) if back.len() < NODE_CAPACITY => back.push_back(value),
                    _ => {
                        let mut node = VecDeque::new();
                        node.push_back(value);
                        nodes.push_back(node);
                    }
                }
            }
        }
    }

    pub fn pop_front(&mut self) -> Option<Bytes> {
        let out = match self {
            Self::Packed(v) => v.pop_front(),
            Self::Linked(nodes) => {
                let val = nodes.front_mut().and_then(|n| n.pop_front());
                if matches!(nodes.front(), Some(n) if n.is_empty()) {
                    nodes.pop_front();
                }
                val
            }
        };
        self.collapse_if_small();
        out
    }

    pub fn pop_back(&mut self) -> Option<Bytes> {
        let out = match self {
            Self::Packed(v) => v.pop_back(),
            Self::Linked(nodes) => {
                let val = nodes.back_mut().and_then(|n| n.pop_back());
                if matches!(nodes.back(), Some(n) if n.is_empty()) {
                    nodes.pop_back();
                }
                val
            }
        };
        self.collapse_if_small();
        out
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        match self {
            Self::Packed(v) => v.get(index),
            Self::Linked(nodes) => {
                let mut remaining = index;
                for node in nodes {
                    if remaining < node.len() {
                        return node.get(remaining);
                    }
                    remaining -= node.len();
                }
                None
            }
        }
    }

    pub fn set(&mut self, index: usize, value: Bytes) -> bool {
        match self {
            Self::Packed(v) => {
                if let Some(slot) = v.get_mut(index) {
                    *slot = value;
                    true
                } else {
                    false
                }
            }
            Self::Linked(nodes) => {
                let mut remaining = index;
                for node in nodes.iter_mut() {
                    if remaining < node.len() {
                        node[remaining] = value;
                        return true;
                    }
                    remaining -= node.len();
                }
                false
            }
        }
    }

    /// Yields every element in order (used by LRANGE, LPOS, persistence).
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Bytes> + '_> {
        match self {
            Self::Packed(v) => Box::new(v.iter()),
            Self::Linked(nodes) => Box::new(nodes.iter().flat_map(|n| n.iter())),
        }
    }

    /// Remove up to `count` occurrences equal to `value`. `count == 0` removes
    /// all; negative scanning direction is handled by the caller reversing
    /// iteration order before calling this on a reversed copy.
    pub fn remove_matching(&mut self, value: &[u8], count: i64) -> i64 {
        let items: Vec<Bytes> = self.iter().cloned().collect();
        let from_tail = count < 0;
        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };

        let mut kept = Vec::with_capacity(items.len());
        let mut removed = 0usize;
        if from_tail {
            for item in items.into_iter().rev() {
                if removed < limit && item.as_ref() == value {
                    removed += 1;
                } else {
                    kept.push(item);
                }
            }
            kept.reverse();
        } else {
            for item in items {
                if removed < limit && item.as_ref() == value {
                    removed += 1;
                } else {
                    kept.push(item);
                }
            }
        }
        *self = Self::Packed(kept.into());
        self.promote_if_oversized();
        removed as i64
    }

    fn promote_if_needed(&mut self, incoming_len: usize) {
        if let Self::Packed(v) = self {
            if incoming_len > PACKED_ENTRY_LIMIT || v.len() + 1 > PACKED_COUNT_LIMIT {
                let mut nodes = VecDeque::new();
                nodes.push_back(std::mem::take(v));
                *self = Self::Linked(nodes);
            }
        }
    }

    fn promote_if_oversized(&mut self) {
        if let Self::Packed(v) = self {
            if v.len() > PACKED_COUNT_LIMIT
                || v.iter().any(|e| e.len() > PACKED_ENTRY_LIMIT)
            {
                let mut nodes = VecDeque::new();
                nodes.push_back(std::mem::take(v));
                *self = Self::Linked(nodes);
            }
        }
    }

    /// Collapse a `Linked` list back into `Packed` once it fits within one
    /// node's thresholds (mirrors the packed/linked transition being
    /// mostly-one-way except for this explicit shrink path).
    fn collapse_if_small(&mut self) {
        if let Self::Linked(nodes) = self {
            let total: usize = nodes.iter().map(|n| n.len()).sum();
            let fits = total <= PACKED_COUNT_LIMIT
                && nodes.iter().flatten().all(|e| e.len() <= PACKED_ENTRY_LIMIT);
            if fits {
                let flat: VecDeque<Bytes> = nodes.drain(..).flatten().collect();
                *self = Self::Packed(flat);
            }
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Packed(_) => "listpack",
            Self::Linked(_) => "quicklist",
        }
    }
}

impl Default for ListValue {
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
    fn push_and_pop_front_back() {
        let mut l = ListValue::new();
        l.push_back(b("a"));
        l.push_back(b("b"));
        l.push_front(b("z"));
        assert_eq!(l.len(), 3);
        assert_eq!(l.pop_front(), Some(b("z")));
        assert_eq!(l.pop_back(), Some(b("b")));
        assert_eq!(l.pop_front(), Some(b("a")));
        assert_eq!(l.pop_front(), None);
    }

    #[test]
    fn promotes_to_linked_on_entry_size() {
        let mut l = ListValue::new();
        let big = Bytes::from(vec![b'x'; 100]);
        l.push_back(big);
        assert_eq!(l.encoding(), "quicklist");
    }

    #[test]
    fn promotes_to_linked_on_count() {
        let mut l = ListValue::new();
        for i in 0..200 {
            l.push_back(Bytes::from(i.to_string()));
        }
        assert_eq!(l.encoding(), "quicklist");
        assert_eq!(l.len(), 200);
    }

    #[test]
    fn collapses_back_to_packed_after_shrink() {
        let mut l = ListValue::new();
        for i in 0..200 {
            l.push_back(Bytes::from(i.to_string()));
        }
        for _ in 0..190 {
            l.pop_back();
        }
        assert_eq!(l.encoding(), "listpack");
    }

    #[test]
    fn get_and_set_across_nodes() {
        let mut l = ListValue::new();
        for i in 0..300 {
            l.push_back(Bytes::from(i.to_string()));
        }
        assert_eq!(l.get(250).map(|b| b.as_ref()), Some(b"250".as_ref()));
        assert!(l.set(250, b("changed")));
        assert_eq!(l.get(250), Some(&b("changed")));
    }

    #[test]
    fn remove_matching_from_head() {
        let mut l = ListValue::new();
        for v in ["a", "b", "a", "c", "a"] {
            l.push_back(b(v));
        }
        let removed = l.remove_matching(b"a", 2);
        assert_eq!(removed, 2);
        let rest: Vec<_> = l.iter().map(|x| x.to_vec()).collect();
        assert_eq!(rest, vec![b"b".to_vec(), b"c".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn remove_matching_from_tail() {
        let mut l = ListValue::new();
        for v in ["a", "b", "a", "c", "a"] {
            l.push_back(b(v));
        }
        let removed = l.remove_matching(b"a", -2);
        assert_eq!(removed, 2);
        let rest: Vec<_> = l.iter().map(|x| x.to_vec()).collect();
        assert_eq!(rest, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn remove_matching_all() {
        let mut l = ListValue::new();
        for v in ["a", "a", "a"] {
            l.push_back(b(v));
        }
        assert_eq!(l.remove_matching(b"a", 0), 3);
        assert!(l.is_empty());
    }
}
