use std::fmt::{self, Debug};

use crate::aatree::{self, AaTreeMap};
use crate::caps::Capabilities;
use crate::error::Result;
use crate::probe::{self, ProbeHashMap};

/// An ordered set: an `AaTreeMap` whose values are `()`.
pub struct AaTreeSet<C: Capabilities<Value = ()>> {
    map: AaTreeMap<C>,
}

impl<C: Capabilities<Value = ()>> Default for AaTreeSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Capabilities<Value = ()>> AaTreeSet<C> {
    pub fn new() -> Self {
        Self {
            map: AaTreeMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: AaTreeMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Add `raw`, building an owned key only if it was absent. Returns whether it was added.
    pub fn insert(&mut self, raw: C::Raw<'_>) -> Result<bool> {
        let (_, inserted) = self.map.emplace(raw, ())?;
        Ok(inserted)
    }

    pub fn contains(&self, raw: C::Raw<'_>) -> bool {
        self.map.contains(raw)
    }

    /// The stored key equal to `raw`.
    pub fn find(&self, raw: C::Raw<'_>) -> Option<&C::Key> {
        self.map.find(raw).map(|(k, _)| k)
    }

    pub fn remove(&mut self, raw: C::Raw<'_>) -> Option<C::Key> {
        self.map.remove(raw).map(|(k, _)| k)
    }

    pub fn erase(&mut self, raw: C::Raw<'_>) -> bool {
        self.map.erase(raw)
    }

    pub fn first(&self) -> Option<&C::Key> {
        self.map.front().map(|(k, _)| k)
    }

    pub fn last(&self) -> Option<&C::Key> {
        self.map.back().map(|(k, _)| k)
    }

    pub fn iter(&self) -> SetIter<aatree::Iter<'_, C>> {
        SetIter(self.map.iter())
    }

    /// Keys not less than `raw`, in order.
    pub fn iter_from(&self, raw: C::Raw<'_>) -> SetIter<aatree::Iter<'_, C>> {
        SetIter(self.map.iter_from(raw))
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn destroy(self) {
        self.map.destroy()
    }

    pub fn is_balanced(&self) -> bool {
        self.map.is_balanced()
    }
}

impl<C: Capabilities<Value = ()>> Clone for AaTreeSet<C> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<C: Capabilities<Value = ()>> Debug for AaTreeSet<C>
where
    C::Key: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// An unordered set: a `ProbeHashMap` whose values are `()`.
pub struct ProbeHashSet<C: Capabilities<Value = ()>> {
    map: ProbeHashMap<C>,
}

impl<C: Capabilities<Value = ()>> Default for ProbeHashSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Capabilities<Value = ()>> ProbeHashSet<C> {
    pub fn new() -> Self {
        Self {
            map: ProbeHashMap::new(),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            map: ProbeHashMap::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.map.capacity()
    }

    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        self.map.try_reserve(additional)
    }

    /// Add `raw`, building an owned key only if it was absent. Returns whether it was added.
    pub fn insert(&mut self, raw: C::Raw<'_>) -> Result<bool> {
        let (_, inserted) = self.map.emplace(raw, ())?;
        Ok(inserted)
    }

    pub fn contains(&self, raw: C::Raw<'_>) -> bool {
        self.map.contains(raw)
    }

    pub fn find(&self, raw: C::Raw<'_>) -> Option<&C::Key> {
        self.map.find(raw).map(|(k, _)| k)
    }

    pub fn remove(&mut self, raw: C::Raw<'_>) -> Option<C::Key> {
        self.map.remove(raw).map(|(k, _)| k)
    }

    pub fn erase(&mut self, raw: C::Raw<'_>) -> bool {
        self.map.erase(raw)
    }

    pub fn iter(&self) -> SetIter<probe::Iter<'_, C>> {
        SetIter(self.map.iter())
    }

    pub fn clear(&mut self) {
        self.map.clear()
    }

    pub fn destroy(self) {
        self.map.destroy()
    }

    pub fn is_probe_consistent(&self) -> bool {
        self.map.is_probe_consistent()
    }
}

impl<C: Capabilities<Value = ()>> Clone for ProbeHashSet<C> {
    fn clone(&self) -> Self {
        Self {
            map: self.map.clone(),
        }
    }
}

impl<C: Capabilities<Value = ()>> Debug for ProbeHashSet<C>
where
    C::Key: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Drops the `()` half of a map iterator.
pub struct SetIter<I>(I);

impl<'a, K: 'a, I> Iterator for SetIter<I>
where
    I: Iterator<Item = (&'a K, &'a ())>,
{
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.0.next().map(|(k, _)| k)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::{thread_rng, Rng};

    use crate::caps::IntCaps;
    use crate::set::{AaTreeSet, ProbeHashSet};

    #[test]
    fn test_tree_set_ordered() {
        let mut set = AaTreeSet::<IntCaps<i64, ()>>::new();
        for k in [5, -3, 9, 0, 5, 12] {
            set.insert(k).unwrap();
        }
        assert_eq!(set.len(), 5);
        assert_eq!(set.iter().copied().collect::<Vec<_>>(), vec![-3, 0, 5, 9, 12]);
        assert_eq!(set.iter_from(1).copied().collect::<Vec<_>>(), vec![5, 9, 12]);
        assert_eq!(set.first(), Some(&-3));
        assert_eq!(set.last(), Some(&12));
        assert_eq!(set.remove(0), Some(0));
        assert!(!set.erase(0));
        assert_eq!(format!("{:?}", set), "{-3, 5, 9, 12}");
    }

    #[test]
    fn test_hash_set_against_btreeset() {
        let mut set = ProbeHashSet::<IntCaps<u16, ()>>::new();
        let mut reference = BTreeSet::new();
        let mut rng = thread_rng();
        for _ in 0..20_000 {
            let k: u16 = rng.gen_range(0..2_000);
            if rng.gen_bool(0.6) {
                assert_eq!(set.insert(k).unwrap(), reference.insert(k));
            } else {
                assert_eq!(set.erase(k), reference.remove(&k));
            }
        }
        assert!(set.is_probe_consistent());
        assert_eq!(set.len(), reference.len());
        let mut all: Vec<u16> = set.iter().copied().collect();
        all.sort_unstable();
        assert_eq!(all, reference.into_iter().collect::<Vec<_>>());
    }
}
