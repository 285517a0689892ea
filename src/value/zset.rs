//! ZSET value container: packed (`listpack`) below the size threshold, a
//! hand-rolled skip list (`skiplist`) above it.

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::HashMap;

const PACKED_LIMIT: usize = 128;
const MAX_LEVEL: usize = 32;
const LEVEL_PROBABILITY: f64 = 0.25;

/// Total order used throughout: by score, ties broken by member bytes —
/// matches `ZRANGEBYSCORE`/`ZRANGEBYLEX` ordering guarantees.
fn score_member_cmp(a_score: f64, a_member: &[u8], b_score: f64, b_member: &[u8]) -> Ordering {
    a_score
        .partial_cmp(&b_score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a_member.cmp(b_member))
}

struct SkipNode {
    member: Bytes,
    score: f64,
    forward: Vec<usize>,
}

/// Arena-based skip list ordered by (score, member). Index 0 is a sentinel
/// head node that never holds data.
pub struct SkipList {
    nodes: Vec<SkipNode>,
    level: usize,
    rng: SmallRng,
}

impl SkipList {
    fn new() -> Self {
        let head = SkipNode {
            member: Bytes::new(),
            score: f64::NEG_INFINITY,
            forward: vec![0; MAX_LEVEL],
        };
        Self {
            nodes: vec![head],
            level: 1,
            rng: SmallRng::from_entropy(),
        }
    }

    fn random_level(&mut self) -> usize {
        let mut level = 1;
        while level < MAX_LEVEL && self.rng.gen::<f64>() < LEVEL_PROBABILITY {
            level += 1;
        }
        level
    }

    /// Find the update path (predecessor node index at each level) for the
    /// position immediately before `(score, member)`.
    fn find_update_path(&self, score: f64, member: &[u8]) -> Vec<usize> {
        let mut update = vec![0usize; MAX_LEVEL];
        let mut cur = 0usize;
        for lvl in (0..self.level).rev() {
            loop {
                let next = self.nodes[cur].forward[lvl];
                if next == 0 {
                    break;
                }
                let node = &self.nodes[next];
                if score_member_cmp(node.score, &node.member, score, member) == Ordering::Less {
                    cur = next;
                } else {
                    break;
                }
            }
            update[lvl] = cur;
        }
        update
    }

    fn insert(&mut self, member: Bytes, score: f64) {
        let update = self.find_update_path(score, &member);
        let level = self.random_level();
        if level > self.level {
            self.level = level;
        }
        let idx = self.nodes.len();
        let mut forward = vec![0usize; MAX_LEVEL];
        for lvl in 0..level {
            let pred = update[lvl];
            forward[lvl] = self.nodes[pred].forward[lvl];
        }
        self.nodes.push(SkipNode {
            member,
            score,
            forward,
        });
        for lvl in 0..level {
            let pred = update[lvl];
            self.nodes[pred].forward[lvl] = idx;
        }
    }

    fn remove(&mut self, member: &[u8], score: f64) {
        let update = self.find_update_path(score, member);
        let mut cur = self.nodes[0].forward[0];
        // Walk forward from the update path to find the exact node (handles
        // equal-score ties by comparing member bytes directly).
        while cur != 0 && self.nodes[cur].member.as_ref() != member {
            cur = self.nodes[cur].forward[0];
        }
        if cur == 0 {
            return;
        }
        for lvl in 0..self.level {
            let pred = update[lvl];
            if self.nodes[pred].forward[lvl] == cur {
                self.nodes[pred].forward[lvl] = self.nodes[cur].forward[lvl];
            }
        }
        // Tombstone rather than compact: removing from the arena would
        // invalidate every other node's indices. Dead nodes are dropped
        // wholesale on the next packed<->skiplist rebuild.
        self.nodes[cur].forward = vec![0; MAX_LEVEL];
    }

    fn iter(&self) -> impl Iterator<Item = (&Bytes, f64)> {
        SkipListIter {
            nodes: &self.nodes,
            cur: self.nodes[0].forward[0],
        }
    }
}

struct SkipListIter<'a> {
    nodes: &'a [SkipNode],
    cur: usize,
}

impl<'a> Iterator for SkipListIter<'a> {
    type Item = (&'a Bytes, f64);

    fn next(&mut self) -> Option<Self::Item> {
        if self.cur == 0 {
            return None;
        }
        let node = &self.nodes[self.cur];
        self.cur = node.forward[0];
        Some((&node.member, node.score))
    }
}

pub enum ZSetValue {
    Packed(Vec<(Bytes, f64)>),
    Skip {
        list: SkipList,
        scores: HashMap<Bytes, f64>,
    },
}

impl ZSetValue {
    pub fn new() -> Self {
        Self::Packed(Vec::new())
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Packed(v) => v.len(),
            Self::Skip { scores, .. } => scores.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn score(&self, member: &[u8]) -> Option<f64> {
        match self {
            Self::Packed(v) => v.iter().find(|(m, _)| m.as_ref() == member).map(|(_, s)| *s),
            Self::Skip { scores, .. } => scores.get(member).copied(),
        }
    }

    /// Insert or update a member's score. Returns `true` if the member is
    /// new (used by `ZADD`'s added-count return value).
    pub fn insert(&mut self, member: Bytes, score: f64) -> bool {
        match self {
            Self::Packed(v) => {
                if let Some(pos) = v.iter().position(|(m, _)| *m == member) {
                    v.remove(pos);
                    let idx = v
                        .binary_search_by(|(m, s)| score_member_cmp(*s, m, score, &member))
                        .unwrap_or_else(|e| e);
                    v.insert(idx, (member, score));
                    if v.len() > PACKED_LIMIT {
                        self.promote();
                    }
                    false
                } else {
                    let idx = v
                        .binary_search_by(|(m, s)| score_member_cmp(*s, m, score, &member))
                        .unwrap_or_else(|e| e);
                    v.insert(idx, (member, score));
                    if v.len() > PACKED_LIMIT {
                        self.promote();
                    }
                    true
                }
            }
            Self::Skip { list, scores } => {
                let is_new = !scores.contains_key(&member);
                if let Some(&old_score) = scores.get(&member) {
                    list.remove(&member, old_score);
                }
                list.insert(member.clone(), score);
                scores.insert(member, score);
                is_new
            }
        }
    }

    pub fn remove(&mut self, member: &[u8]) -> bool {
        match self {
            Self::Packed(v) => {
                if let Some(pos) = v.iter().position(|(m, _)| m.as_ref() == member) {
                    v.remove(pos);
                    true
                } else {
                    false
                }
            }
            Self::Skip { list, scores } => {
                if let Some(score) = scores.remove(member) {
                    list.remove(member, score);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// All (member, score) pairs in ascending (score, member) order.
    pub fn iter_sorted(&self) -> Vec<(Bytes, f64)> {
        match self {
            Self::Packed(v) => v.clone(),
            Self::Skip { list, .. } => list.iter().map(|(m, s)| (m.clone(), s)).collect(),
        }
    }

    pub fn rank(&self, member: &[u8]) -> Option<usize> {
        let all = self.iter_sorted();
        all.iter().position(|(m, _)| m.as_ref() == member)
    }

    fn promote(&mut self) {
        if let Self::Packed(v) = self {
            let mut list = SkipList::new();
            let mut scores = HashMap::with_capacity(v.len());
            for (member, score) in v.drain(..) {
                list.insert(member.clone(), score);
                scores.insert(member, score);
            }
            *self = Self::Skip { list, scores };
        }
    }

    pub fn encoding(&self) -> &'static str {
        match self {
            Self::Packed(_) => "listpack",
            Self::Skip { .. } => "skiplist",
        }
    }
}

impl Default for ZSetValue {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ZSetValue {
    fn clone(&self) -> Self {
        match self {
            Self::Packed(v) => Self::Packed(v.clone()),
            Self::Skip { scores, .. } => {
                let mut list = SkipList::new();
                for (m, s) in scores {
                    list.insert(m.clone(), *s);
                }
                Self::Skip {
                    list,
                    scores: scores.clone(),
                }
            }
        }
    }
}

impl std::fmt::Debug for ZSetValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZSetValue")
            .field("encoding", &self.encoding())
            .field("len", &self.len())
            .finish()
    }
}

impl PartialEq for ZSetValue {
    fn eq(&self, other: &Self) -> bool {
        self.iter_sorted() == other.iter_sorted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn insert_and_score() {
        let mut z = ZSetValue::new();
        assert!(z.insert(b("a"), 1.0));
        assert!(!z.insert(b("a"), 2.0));
        assert_eq!(z.score(b"a"), Some(2.0));
    }

    #[test]
    fn iter_sorted_by_score_then_member() {
        let mut z = ZSetValue::new();
        z.insert(b("b"), 1.0);
        z.insert(b("a"), 1.0);
        z.insert(b("c"), 0.5);
        let order: Vec<_> = z.iter_sorted().into_iter().map(|(m, _)| m).collect();
        assert_eq!(order, vec![b("c"), b("a"), b("b")]);
    }

    #[test]
    fn promotes_to_skiplist_over_threshold() {
        let mut z = ZSetValue::new();
        for i in 0..200 {
            z.insert(Bytes::from(format!("m{i}")), i as f64);
        }
        assert_eq!(z.encoding(), "skiplist");
        assert_eq!(z.len(), 200);
        let sorted = z.iter_sorted();
        assert_eq!(sorted.first().unwrap().0, Bytes::from("m0"));
        assert_eq!(sorted.last().unwrap().0, Bytes::from("m199"));
    }

    #[test]
    fn remove_member() {
        let mut z = ZSetValue::new();
        z.insert(b("a"), 1.0);
        z.insert(b("b"), 2.0);
        assert!(z.remove(b"a"));
        assert!(!z.remove(b"a"));
        assert_eq!(z.len(), 1);
    }

    #[test]
    fn remove_in_skiplist_mode() {
        let mut z = ZSetValue::new();
        for i in 0..200 {
            z.insert(Bytes::from(format!("m{i}")), i as f64);
        }
        assert!(z.remove(b"m100"));
        assert_eq!(z.score(b"m100"), None);
        assert_eq!(z.len(), 199);
        let sorted = z.iter_sorted();
        assert!(sorted.iter().all(|(m, _)| m != &b("m100")));
    }

    #[test]
    fn rank_order() {
        let mut z = ZSetValue::new();
        z.insert(b("a"), 1.0);
        z.insert(b("b"), 2.0);
        z.insert(b("c"), 3.0);
        assert_eq!(z.rank(b"a"), Some(0));
        assert_eq!(z.rank(b"c"), Some(2));
        assert_eq!(z.rank(b"missing"), None);
    }
}
