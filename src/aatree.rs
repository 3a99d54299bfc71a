use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};

use crate::caps::Capabilities;
use crate::error::Result;
use crate::utils::fillvector::{FVIndex, FillVector};

// An AA tree over n < 2^32 nodes is never deeper than this.
const MAX_DEPTH: usize = 64;

struct Node<K, V> {
    key: K,
    value: V,
    // 1 for leaves; an absent child counts as level 0.
    level: u8,
    left: FVIndex,
    right: FVIndex,
}

enum Placement<V> {
    Inserted(FVIndex),
    // The key was already present; the value that was offered is handed back.
    Occupied(FVIndex, V),
}

#[derive(Debug)]
pub struct TreeStats {
    pub num_nodes: usize,
    pub max_height: usize,
    pub root_level: u8,
    pub nodes_per_level: BTreeMap<u8, usize>,
}

/// A sorted map backed by an AA tree (Andersson's simplification of the red-black tree).
///
/// Nodes live in a [`FillVector`] arena and link to each other by index. Lookups take the
/// borrowed `Raw` form of a key and compare it against stored keys through `C::compare`; an
/// owned key is built with `C::try_from_raw` only after an insert has found the key absent.
///
/// Balance is kept with two rotations, `skew` (removes a left horizontal link) and `split`
/// (removes two consecutive right horizontal links, promoting the middle node), applied on the
/// way back up from the modified leaf.
pub struct AaTreeMap<C: Capabilities> {
    nodes: FillVector<Node<C::Key, C::Value>>,
    root: FVIndex,
}

impl<C: Capabilities> Default for AaTreeMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Capabilities> AaTreeMap<C> {
    pub fn new() -> Self {
        Self {
            nodes: FillVector::new(),
            root: FVIndex::NONE,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: FillVector::with_capacity(capacity),
            root: FVIndex::NONE,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.size()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.nodes.try_reserve(additional)
    }

    /// The stored entry matching `raw`, if any.
    pub fn find(&self, raw: C::Raw<'_>) -> Option<(&C::Key, &C::Value)> {
        let idx = self.find_index(raw);
        let node = self.nodes.get(idx)?;
        Some((&node.key, &node.value))
    }

    pub fn get(&self, raw: C::Raw<'_>) -> Option<&C::Value> {
        self.find(raw).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, raw: C::Raw<'_>) -> Option<&mut C::Value> {
        let idx = self.find_index(raw);
        self.nodes.get_mut(idx).map(|n| &mut n.value)
    }

    pub fn contains(&self, raw: C::Raw<'_>) -> bool {
        self.find_index(raw).is_some()
    }

    /// Insert `value` under `raw`, replacing (and destroying) the old value if the key is already
    /// present. Returns the stored value and whether a new entry was created.
    pub fn insert_or_update(
        &mut self,
        raw: C::Raw<'_>,
        value: C::Value,
    ) -> Result<(&mut C::Value, bool)> {
        match self.place(raw, value)? {
            Placement::Inserted(idx) => Ok((&mut self.nodes[idx].value, true)),
            Placement::Occupied(idx, value) => {
                let old = std::mem::replace(&mut self.nodes[idx].value, value);
                C::destroy_value(old);
                Ok((&mut self.nodes[idx].value, false))
            }
        }
    }

    /// Insert `value` under `raw` only if the key is absent. An existing entry is left untouched
    /// and the offered value is dropped.
    pub fn insert_if_absent(
        &mut self,
        raw: C::Raw<'_>,
        value: C::Value,
    ) -> Result<(&mut C::Value, bool)> {
        match self.place(raw, value)? {
            Placement::Inserted(idx) => Ok((&mut self.nodes[idx].value, true)),
            Placement::Occupied(idx, _) => Ok((&mut self.nodes[idx].value, false)),
        }
    }

    /// Same as `insert_if_absent`.
    pub fn emplace(&mut self, raw: C::Raw<'_>, value: C::Value) -> Result<(&mut C::Value, bool)> {
        self.insert_if_absent(raw, value)
    }

    /// Remove the entry for `raw`, handing ownership of its key and value to the caller.
    pub fn remove(&mut self, raw: C::Raw<'_>) -> Option<(C::Key, C::Value)> {
        let (root, removed) = self.remove_from(self.root, raw);
        self.root = root;
        removed
    }

    /// Remove and destroy the entry for `raw`. Returns false if there was none.
    pub fn erase(&mut self, raw: C::Raw<'_>) -> bool {
        match self.remove(raw) {
            Some((key, value)) => {
                C::destroy_key(key);
                C::destroy_value(value);
                true
            }
            None => false,
        }
    }

    /// The entry with the smallest key.
    pub fn front(&self) -> Option<(&C::Key, &C::Value)> {
        let mut cur = self.root;
        if cur.is_none() {
            return None;
        }
        while self.nodes[cur].left.is_some() {
            cur = self.nodes[cur].left;
        }
        let node = &self.nodes[cur];
        Some((&node.key, &node.value))
    }

    /// The entry with the largest key.
    pub fn back(&self) -> Option<(&C::Key, &C::Value)> {
        let mut cur = self.root;
        if cur.is_none() {
            return None;
        }
        while self.nodes[cur].right.is_some() {
            cur = self.nodes[cur].right;
        }
        let node = &self.nodes[cur];
        Some((&node.key, &node.value))
    }

    /// In-order iteration over all entries.
    pub fn iter(&self) -> Iter<'_, C> {
        Iter {
            tree: self,
            stack: Vec::new(),
            cur: self.root,
        }
    }

    /// In-order iteration starting at the first entry whose key is not less than `raw`. When
    /// `raw` is present the walk starts exactly at its entry.
    pub fn iter_from(&self, raw: C::Raw<'_>) -> Iter<'_, C> {
        let mut stack = Vec::new();
        let mut cur = self.root;
        while cur.is_some() {
            let node = &self.nodes[cur];
            match C::compare(raw, C::to_raw(&node.key)) {
                Ordering::Less => {
                    stack.push(cur);
                    cur = node.left;
                }
                Ordering::Greater => cur = node.right,
                Ordering::Equal => {
                    stack.push(cur);
                    break;
                }
            }
        }
        Iter {
            tree: self,
            stack,
            cur: FVIndex::NONE,
        }
    }

    /// The first entry whose key is not less than `raw`.
    pub fn lower_bound(&self, raw: C::Raw<'_>) -> Option<(&C::Key, &C::Value)> {
        self.iter_from(raw).next()
    }

    pub fn keys(&self) -> impl Iterator<Item = &C::Key> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Remove and destroy every entry. The arena keeps its capacity.
    pub fn clear(&mut self) {
        self.root = FVIndex::NONE;
        for node in self.nodes.drain() {
            C::destroy_key(node.key);
            C::destroy_value(node.value);
        }
    }

    /// Tear the map down, destroying every entry. Equivalent to dropping it.
    pub fn destroy(self) {
        drop(self)
    }

    fn find_index(&self, raw: C::Raw<'_>) -> FVIndex {
        let mut cur = self.root;
        while cur.is_some() {
            let node = &self.nodes[cur];
            match C::compare(raw, C::to_raw(&node.key)) {
                Ordering::Less => cur = node.left,
                Ordering::Greater => cur = node.right,
                Ordering::Equal => return cur,
            }
        }
        FVIndex::NONE
    }

    #[inline]
    fn level(&self, idx: FVIndex) -> u8 {
        if idx.is_none() {
            0
        } else {
            self.nodes[idx].level
        }
    }

    // Rotate right when the left child sits on the same level.
    fn skew(&mut self, t: FVIndex) -> FVIndex {
        if t.is_none() {
            return t;
        }
        let l = self.nodes[t].left;
        if l.is_some() && self.nodes[l].level == self.nodes[t].level {
            self.nodes[t].left = self.nodes[l].right;
            self.nodes[l].right = t;
            return l;
        }
        t
    }

    // Rotate left and promote when the right-right grandchild sits on the same level.
    fn split(&mut self, t: FVIndex) -> FVIndex {
        if t.is_none() {
            return t;
        }
        let r = self.nodes[t].right;
        if r.is_none() {
            return t;
        }
        let rr = self.nodes[r].right;
        if rr.is_some() && self.nodes[rr].level == self.nodes[t].level {
            self.nodes[t].right = self.nodes[r].left;
            self.nodes[r].left = t;
            self.nodes[r].level += 1;
            return r;
        }
        t
    }

    fn place(&mut self, raw: C::Raw<'_>, value: C::Value) -> Result<Placement<C::Value>> {
        let mut path = [FVIndex::NONE; MAX_DEPTH];
        let mut depth = 0;
        let mut went_left = false;
        let mut cur = self.root;
        while cur.is_some() {
            path[depth] = cur;
            depth += 1;
            let node = &self.nodes[cur];
            match C::compare(raw, C::to_raw(&node.key)) {
                Ordering::Less => {
                    went_left = true;
                    cur = node.left;
                }
                Ordering::Greater => {
                    went_left = false;
                    cur = node.right;
                }
                Ordering::Equal => return Ok(Placement::Occupied(cur, value)),
            }
        }

        // Make room first so that a failed allocation leaves the tree as it was.
        self.nodes.try_reserve(1)?;
        let key = C::try_from_raw(raw)?;
        let new = self.nodes.try_add(Node {
            key,
            value,
            level: 1,
            left: FVIndex::NONE,
            right: FVIndex::NONE,
        })?;

        if depth == 0 {
            self.root = new;
            return Ok(Placement::Inserted(new));
        }
        let parent = path[depth - 1];
        if went_left {
            self.nodes[parent].left = new;
        } else {
            self.nodes[parent].right = new;
        }

        // Unwind towards the root, restoring balance at each ancestor.
        for i in (0..depth).rev() {
            let old = path[i];
            let fixed = self.skew(old);
            let fixed = self.split(fixed);
            if i == 0 {
                self.root = fixed;
            } else {
                let up = path[i - 1];
                if self.nodes[up].left == old {
                    self.nodes[up].left = fixed;
                } else {
                    self.nodes[up].right = fixed;
                }
            }
        }
        Ok(Placement::Inserted(new))
    }

    fn remove_from(
        &mut self,
        t: FVIndex,
        raw: C::Raw<'_>,
    ) -> (FVIndex, Option<(C::Key, C::Value)>) {
        if t.is_none() {
            return (t, None);
        }
        let removed = match C::compare(raw, C::to_raw(&self.nodes[t].key)) {
            Ordering::Less => {
                let (l, removed) = self.remove_from(self.nodes[t].left, raw);
                self.nodes[t].left = l;
                removed
            }
            Ordering::Greater => {
                let (r, removed) = self.remove_from(self.nodes[t].right, raw);
                self.nodes[t].right = r;
                removed
            }
            Ordering::Equal => {
                let (l, r) = (self.nodes[t].left, self.nodes[t].right);
                if l.is_none() || r.is_none() {
                    let Some(node) = self.nodes.free(t) else {
                        unreachable!("linked node missing from arena");
                    };
                    let replacement = if l.is_none() { r } else { l };
                    return (replacement, Some((node.key, node.value)));
                }
                // Two children: the in-order predecessor moves into this node.
                let (l, (key, value)) = self.remove_max(l);
                let node = &mut self.nodes[t];
                node.left = l;
                let old_key = std::mem::replace(&mut node.key, key);
                let old_value = std::mem::replace(&mut node.value, value);
                Some((old_key, old_value))
            }
        };
        if removed.is_none() {
            return (t, None);
        }
        (self.rebalance(t), removed)
    }

    fn remove_max(&mut self, t: FVIndex) -> (FVIndex, (C::Key, C::Value)) {
        let r = self.nodes[t].right;
        if r.is_none() {
            let Some(node) = self.nodes.free(t) else {
                unreachable!("linked node missing from arena");
            };
            return (node.left, (node.key, node.value));
        }
        let (r, kv) = self.remove_max(r);
        self.nodes[t].right = r;
        (self.rebalance(t), kv)
    }

    // After a removal below `t`: if a child dropped more than one level beneath it, bring `t`
    // (and a same-level right child) down, then re-run skew/split along the right spine.
    fn rebalance(&mut self, t: FVIndex) -> FVIndex {
        let level = self.nodes[t].level;
        let left_level = self.level(self.nodes[t].left);
        let right_level = self.level(self.nodes[t].right);
        let level_ok = left_level.min(right_level) + 1;
        if level_ok >= level {
            return t;
        }

        let level = level_ok;
        self.nodes[t].level = level;
        let r = self.nodes[t].right;
        if r.is_some() && self.nodes[r].level > level {
            self.nodes[r].level = level;
        }

        let t = self.skew(t);
        let r = self.skew(self.nodes[t].right);
        self.nodes[t].right = r;
        if r.is_some() {
            let rr = self.skew(self.nodes[r].right);
            self.nodes[r].right = rr;
        }
        let t = self.split(t);
        let r = self.split(self.nodes[t].right);
        self.nodes[t].right = r;
        t
    }

    /// Verify ordering, size and every AA-tree level rule.
    pub fn is_balanced(&self) -> bool {
        self.check_subtree(self.root, None, None) == Some(self.len())
    }

    fn check_subtree(&self, t: FVIndex, lo: Option<FVIndex>, hi: Option<FVIndex>) -> Option<usize> {
        if t.is_none() {
            return Some(0);
        }
        let node = self.nodes.get(t)?;
        let raw = C::to_raw(&node.key);
        if let Some(lo) = lo {
            if C::compare(C::to_raw(&self.nodes[lo].key), raw) != Ordering::Less {
                return None;
            }
        }
        if let Some(hi) = hi {
            if C::compare(raw, C::to_raw(&self.nodes[hi].key)) != Ordering::Less {
                return None;
            }
        }
        let left_level = self.level(node.left);
        let right_level = self.level(node.right);
        if left_level + 1 != node.level {
            return None;
        }
        if right_level != node.level && right_level + 1 != node.level {
            return None;
        }
        if node.right.is_some() && self.level(self.nodes[node.right].right) >= node.level {
            return None;
        }
        let left = self.check_subtree(node.left, lo, Some(t))?;
        let right = self.check_subtree(node.right, Some(t), hi)?;
        Some(1 + left + right)
    }

    pub fn tree_stats(&self) -> TreeStats {
        let mut stats = TreeStats {
            num_nodes: 0,
            max_height: 0,
            root_level: self.level(self.root),
            nodes_per_level: BTreeMap::new(),
        };
        self.tree_stats_recurse(self.root, &mut stats, 1);
        stats
    }

    fn tree_stats_recurse(&self, t: FVIndex, stats: &mut TreeStats, height: usize) {
        if t.is_none() {
            return;
        }
        let node = &self.nodes[t];
        stats.num_nodes += 1;
        stats.max_height = stats.max_height.max(height);
        *stats.nodes_per_level.entry(node.level).or_insert(0) += 1;
        self.tree_stats_recurse(node.left, stats, height + 1);
        self.tree_stats_recurse(node.right, stats, height + 1);
    }
}

impl<C: Capabilities> AaTreeMap<C>
where
    C::Key: Debug,
{
    pub fn print_tree(&self) {
        if self.root.is_none() {
            eprintln!("[]");
            return;
        }
        self.print_tree_recurse(self.root, 0);
    }

    fn print_tree_recurse(&self, t: FVIndex, depth: usize) {
        let node = &self.nodes[t];
        if node.right.is_some() {
            self.print_tree_recurse(node.right, depth + 1);
        }
        eprintln!("{}{:?} (level {})", "  ".repeat(depth), node.key, node.level);
        if node.left.is_some() {
            self.print_tree_recurse(node.left, depth + 1);
        }
    }
}

impl<C: Capabilities> Drop for AaTreeMap<C> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<C: Capabilities> Clone for AaTreeMap<C> {
    fn clone(&self) -> Self {
        Self {
            nodes: self.nodes.clone_with(|n| Node {
                key: C::clone_key(&n.key),
                value: C::clone_value(&n.value),
                level: n.level,
                left: n.left,
                right: n.right,
            }),
            root: self.root,
        }
    }
}

impl<C: Capabilities> Debug for AaTreeMap<C>
where
    C::Key: Debug,
    C::Value: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order iterator over an [`AaTreeMap`]. Holds the chain of ancestors still to be visited.
pub struct Iter<'a, C: Capabilities> {
    tree: &'a AaTreeMap<C>,
    stack: Vec<FVIndex>,
    cur: FVIndex,
}

impl<'a, C: Capabilities> Iterator for Iter<'a, C> {
    type Item = (&'a C::Key, &'a C::Value);

    fn next(&mut self) -> Option<Self::Item> {
        while self.cur.is_some() {
            self.stack.push(self.cur);
            self.cur = self.tree.nodes[self.cur].left;
        }
        let idx = self.stack.pop()?;
        let node = &self.tree.nodes[idx];
        self.cur = node.right;
        Some((&node.key, &node.value))
    }
}

impl<'a, C: Capabilities> IntoIterator for &'a AaTreeMap<C> {
    type Item = (&'a C::Key, &'a C::Value);
    type IntoIter = Iter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::cmp::Ordering;
    use std::collections::BTreeMap;

    use rand::seq::SliceRandom;
    use rand::{thread_rng, Rng};

    use crate::aatree::AaTreeMap;
    use crate::caps::{hash_value, Capabilities, IntCaps, ValueCaps};
    use crate::error::{AssocError, Result};

    type IntMap = AaTreeMap<IntCaps<i32, i32>>;

    #[test]
    fn test_empty_tree() {
        let mut tree = IntMap::new();
        assert!(tree.is_empty());
        assert_eq!(tree.front(), None);
        assert_eq!(tree.back(), None);
        assert_eq!(tree.find(1), None);
        assert!(!tree.erase(1));
        assert!(tree.remove(1).is_none());
        assert_eq!(tree.iter().count(), 0);
        assert_eq!(tree.iter_from(3).count(), 0);
        assert!(tree.is_balanced());
    }

    #[test]
    fn test_ten_keys() {
        let mut tree = IntMap::new();
        for k in [5, 3, 8, 1, 4, 7, 9, 2, 6, 0] {
            let (_, inserted) = tree.insert_or_update(k, k * 10).unwrap();
            assert!(inserted);
            assert!(tree.is_balanced());
        }
        assert_eq!(tree.len(), 10);
        assert_eq!(tree.front(), Some((&0, &0)));
        assert_eq!(tree.back(), Some((&9, &90)));
        let keys: Vec<i32> = tree.keys().copied().collect();
        assert_eq!(keys, (0..10).collect::<Vec<_>>());

        assert!(tree.erase(5));
        assert_eq!(tree.len(), 9);
        assert_eq!(tree.find(5), None);
        assert!(!tree.erase(5));
        assert!(tree.is_balanced());
    }

    #[test]
    fn test_update_vs_if_absent() {
        let mut tree = IntMap::new();
        tree.insert_or_update(1, 100).unwrap();

        let (v, inserted) = tree.insert_if_absent(1, 200).unwrap();
        assert!(!inserted);
        assert_eq!(*v, 100);

        let (v, inserted) = tree.insert_or_update(1, 300).unwrap();
        assert!(!inserted);
        assert_eq!(*v, 300);
        assert_eq!(tree.get(1), Some(&300));
        assert_eq!(tree.len(), 1);

        *tree.get_mut(1).unwrap() += 1;
        assert_eq!(tree.get(1), Some(&301));
    }

    #[test]
    fn test_iter_from() {
        let mut tree = IntMap::new();
        for k in (0..100).step_by(10) {
            tree.emplace(k, k).unwrap();
        }
        let from_40: Vec<i32> = tree.iter_from(40).map(|(k, _)| *k).collect();
        assert_eq!(from_40, vec![40, 50, 60, 70, 80, 90]);
        let from_41: Vec<i32> = tree.iter_from(41).map(|(k, _)| *k).collect();
        assert_eq!(from_41, vec![50, 60, 70, 80, 90]);
        assert_eq!(tree.iter_from(-5).count(), 10);
        assert_eq!(tree.iter_from(91).count(), 0);
        assert_eq!(tree.lower_bound(55), Some((&60, &60)));
    }

    #[test]
    fn test_sequential_inserts_stay_logarithmic() {
        let mut tree = IntMap::new();
        for k in 0..4096 {
            tree.emplace(k, k).unwrap();
        }
        assert!(tree.is_balanced());
        let stats = tree.tree_stats();
        assert_eq!(stats.num_nodes, 4096);
        // An AA tree is at most about twice as deep as a perfect tree.
        assert!(stats.max_height <= 2 * 13, "height {}", stats.max_height);
        for k in 0..4000 {
            assert!(tree.erase(k));
        }
        assert!(tree.is_balanced());
        assert_eq!(tree.len(), 96);
        assert_eq!(tree.front(), Some((&4000, &4000)));
    }

    // Random inserts and erases, compared against BTreeMap, which we can assume behaves.
    #[test]
    fn test_random_against_btree() {
        let mut tree = AaTreeMap::<ValueCaps<u64, u64>>::new();
        let mut reference = BTreeMap::new();
        let mut rng = thread_rng();
        for i in 0..20_000u64 {
            let k = rng.gen_range(0..2_000u64);
            if rng.gen_range(0..3) == 0 {
                assert_eq!(tree.erase(&k), reference.remove(&k).is_some());
            } else {
                let (_, inserted) = tree.insert_or_update(&k, i).unwrap();
                assert_eq!(inserted, reference.insert(k, i).is_none());
            }
            if i % 97 == 0 {
                assert!(tree.is_balanced());
            }
        }
        assert!(tree.is_balanced());
        assert_eq!(tree.len(), reference.len());
        for ((tk, tv), (rk, rv)) in tree.iter().zip(reference.iter()) {
            assert_eq!(tk, rk);
            assert_eq!(tv, rv);
        }
    }

    #[test]
    fn test_shuffled_erase_all() {
        let mut keys: Vec<i32> = (0..1000).collect();
        keys.shuffle(&mut thread_rng());
        let mut tree = IntMap::new();
        for k in &keys {
            tree.emplace(*k, -k).unwrap();
        }
        keys.shuffle(&mut thread_rng());
        for (n, k) in keys.iter().enumerate() {
            assert_eq!(tree.remove(*k), Some((*k, -k)));
            assert_eq!(tree.len(), 999 - n);
            assert!(tree.is_balanced());
        }
        assert!(tree.is_empty());
        assert_eq!(tree.front(), None);
    }

    #[test]
    fn test_clone_is_deep() {
        let mut a = AaTreeMap::<ValueCaps<String, Vec<u8>>>::new();
        a.emplace(&"x".to_string(), vec![1]).unwrap();
        a.emplace(&"y".to_string(), vec![2]).unwrap();
        let mut b = a.clone();
        b.get_mut(&"x".to_string()).unwrap().push(9);
        assert_eq!(a.get(&"x".to_string()), Some(&vec![1]));
        assert_eq!(b.get(&"x".to_string()), Some(&vec![1, 9]));
        assert!(b.is_balanced());
        assert_eq!(format!("{:?}", a), r#"{"x": [1], "y": [2]}"#);
    }

    thread_local! {
        static DESTROYED: Cell<usize> = const { Cell::new(0) };
    }

    // Capabilities that count how many keys the container hands back for destruction.
    struct Counting;

    impl Capabilities for Counting {
        type Key = u32;
        type Value = ();
        type Raw<'a> = u32 where Self: 'a;

        fn compare(a: Self::Raw<'_>, b: Self::Raw<'_>) -> Ordering {
            a.cmp(&b)
        }

        fn hash(raw: Self::Raw<'_>) -> u64 {
            hash_value(&raw)
        }

        fn to_raw(key: &u32) -> Self::Raw<'_> {
            *key
        }

        fn from_raw(raw: Self::Raw<'_>) -> u32 {
            raw
        }

        fn clone_value(_: &()) {}

        fn destroy_key(_: u32) {
            DESTROYED.with(|d| d.set(d.get() + 1));
        }
    }

    #[test]
    fn test_destroy_called_for_every_entry() {
        let mut tree = AaTreeMap::<Counting>::new();
        for k in 0..50 {
            tree.emplace(k, ()).unwrap();
        }
        tree.emplace(7, ()).unwrap();
        assert_eq!(DESTROYED.with(|d| d.get()), 0);

        assert!(tree.erase(7));
        assert_eq!(DESTROYED.with(|d| d.get()), 1);

        // Handing an entry back with remove transfers ownership instead.
        assert_eq!(tree.remove(8), Some((8, ())));
        assert_eq!(DESTROYED.with(|d| d.get()), 1);

        tree.clear();
        assert_eq!(DESTROYED.with(|d| d.get()), 49);
        for k in 0..10 {
            tree.emplace(k, ()).unwrap();
        }
        tree.destroy();
        assert_eq!(DESTROYED.with(|d| d.get()), 59);
    }

    thread_local! {
        static BUILT: Cell<usize> = const { Cell::new(0) };
    }

    const REFUSED: u32 = 1000;

    // Counts owned keys as they are built, and fails to build any key at or above REFUSED.
    struct Materializing;

    impl Capabilities for Materializing {
        type Key = u32;
        type Value = u32;
        type Raw<'a> = u32 where Self: 'a;

        fn compare(a: Self::Raw<'_>, b: Self::Raw<'_>) -> Ordering {
            a.cmp(&b)
        }

        fn hash(raw: Self::Raw<'_>) -> u64 {
            hash_value(&raw)
        }

        fn to_raw(key: &u32) -> Self::Raw<'_> {
            *key
        }

        fn from_raw(raw: Self::Raw<'_>) -> u32 {
            BUILT.with(|b| b.set(b.get() + 1));
            raw
        }

        fn try_from_raw(raw: Self::Raw<'_>) -> Result<u32> {
            if raw >= REFUSED {
                return Err(AssocError::overflow(raw as usize));
            }
            Ok(Self::from_raw(raw))
        }

        fn clone_value(value: &u32) -> u32 {
            *value
        }
    }

    fn built() -> usize {
        BUILT.with(|b| b.get())
    }

    #[test]
    fn test_owned_key_built_once_per_insert() {
        let base = built();
        let mut tree = AaTreeMap::<Materializing>::new();
        for k in (0..200).step_by(2) {
            tree.emplace(k, k).unwrap();
        }
        assert_eq!(built() - base, 100);

        for k in (0..200).step_by(2) {
            assert_eq!(tree.get(k), Some(&k));
            assert!(tree.lower_bound(k + 1).is_some() || k == 198);
            assert!(!tree.insert_if_absent(k, 0).unwrap().1);
            assert!(!tree.insert_or_update(k, k + 1).unwrap().1);
            assert!(!tree.erase(k + 1));
        }
        assert_eq!(tree.iter_from(50).count(), 75);
        assert_eq!(built() - base, 100);

        assert!(tree.erase(10));
        assert_eq!(built() - base, 100);
        assert!(tree.emplace(10, 10).unwrap().1);
        assert_eq!(built() - base, 101);
    }

    #[test]
    fn test_failed_insert_leaves_tree_intact() {
        let mut tree = AaTreeMap::<Materializing>::new();
        for k in 0..50 {
            tree.emplace(k, k).unwrap();
        }
        let before: Vec<(u32, u32)> = tree.iter().map(|(k, v)| (*k, *v)).collect();

        assert!(matches!(
            tree.emplace(REFUSED, 0),
            Err(AssocError::CapacityOverflow { .. })
        ));
        assert!(tree.insert_or_update(REFUSED + 7, 0).is_err());

        // The arena's index space is 32 bits; asking for more fails without touching the tree.
        assert!(matches!(
            tree.try_reserve(usize::MAX),
            Err(AssocError::CapacityOverflow { .. })
        ));

        assert_eq!(tree.len(), 50);
        assert!(tree.is_balanced());
        assert!(!tree.contains(REFUSED));
        let after: Vec<(u32, u32)> = tree.iter().map(|(k, v)| (*k, *v)).collect();
        assert_eq!(after, before);
        assert!(tree.emplace(50, 50).unwrap().1);
        assert!(tree.is_balanced());
    }
}
