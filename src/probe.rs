use std::fmt::{self, Debug};

use crate::caps::Capabilities;
use crate::error::{AssocError, Result};

/// Bucket count of the first allocation. Always a power of two.
pub const MIN_CAPACITY: usize = 8;

// Grow (doubling) once an insert would push occupancy above 7/8 of the buckets.
const MAX_LOAD_NUM: usize = 7;
const MAX_LOAD_DEN: usize = 8;

struct Bucket<K, V> {
    // Cached so that growth and backward shifting never re-hash a key.
    hash: u64,
    key: K,
    value: V,
}

enum Probe {
    Found(usize),
    Vacant(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProbeStats {
    pub len: usize,
    pub capacity: usize,
    /// Longest probe sequence (1 = found in its ideal bucket).
    pub max_probe: usize,
    pub mean_probe: f64,
}

/// An unordered map using open addressing with linear probing.
///
/// Buckets are either empty or occupied; there are no tombstones. Erasing an entry closes the
/// gap by shifting later members of the probe run back into it (backward-shift deletion), so
/// every occupied bucket stays reachable from its ideal bucket without crossing an empty one.
///
/// Lookups take the borrowed `Raw` key form. Iteration order is unspecified and changes when
/// the map is mutated.
pub struct ProbeHashMap<C: Capabilities> {
    buckets: Vec<Option<Bucket<C::Key, C::Value>>>,
    len: usize,
}

impl<C: Capabilities> Default for ProbeHashMap<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Capabilities> ProbeHashMap<C> {
    /// An empty map. No buckets are allocated until the first insert.
    pub fn new() -> Self {
        Self {
            buckets: Vec::new(),
            len: 0,
        }
    }

    /// An empty map with enough buckets for `capacity` entries before it needs to grow. Panics
    /// if no power-of-two bucket count can hold that many.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut map = Self::new();
        if capacity > 0 {
            let Some(buckets) = buckets_for(capacity) else {
                panic!("{}", AssocError::overflow(capacity));
            };
            map.buckets.resize_with(buckets, || None);
        }
        map
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of buckets (not entries).
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Like `try_reserve`, but panics on overflow or allocation failure, as `Vec::reserve` does.
    pub fn reserve(&mut self, additional: usize) {
        if let Err(e) = self.try_reserve(additional) {
            panic!("{}", e);
        }
    }

    /// Ensure `additional` more entries fit without a rehash. On failure the map is unchanged.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let wanted = self
            .len
            .checked_add(additional)
            .ok_or_else(|| AssocError::overflow(additional))?;
        if !self.buckets.is_empty() && wanted <= max_load(self.buckets.len()) {
            return Ok(());
        }
        let buckets = buckets_for(wanted).ok_or_else(|| AssocError::overflow(wanted))?;
        if buckets > self.buckets.len() {
            self.rehash(buckets)?;
        }
        Ok(())
    }

    pub fn find(&self, raw: C::Raw<'_>) -> Option<(&C::Key, &C::Value)> {
        if self.buckets.is_empty() {
            return None;
        }
        match self.probe(raw, C::hash(raw)) {
            Probe::Found(i) => self.buckets[i].as_ref().map(|b| (&b.key, &b.value)),
            Probe::Vacant(_) => None,
        }
    }

    pub fn get(&self, raw: C::Raw<'_>) -> Option<&C::Value> {
        self.find(raw).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, raw: C::Raw<'_>) -> Option<&mut C::Value> {
        if self.buckets.is_empty() {
            return None;
        }
        match self.probe(raw, C::hash(raw)) {
            Probe::Found(i) => self.buckets[i].as_mut().map(|b| &mut b.value),
            Probe::Vacant(_) => None,
        }
    }

    pub fn contains(&self, raw: C::Raw<'_>) -> bool {
        self.find(raw).is_some()
    }

    /// Insert `value` under `raw` if the key is absent; otherwise leave the entry alone and drop
    /// the offered value. Returns the stored value and whether an entry was created.
    pub fn emplace(&mut self, raw: C::Raw<'_>, value: C::Value) -> Result<(&mut C::Value, bool)> {
        let hash = C::hash(raw);
        if let Some(i) = self.position(raw, hash) {
            return Ok((self.value_at(i), false));
        }
        let i = self.vacate(raw, hash)?;
        let key = C::try_from_raw(raw)?;
        self.buckets[i] = Some(Bucket { hash, key, value });
        self.len += 1;
        Ok((self.value_at(i), true))
    }

    /// Same as `emplace`.
    pub fn insert_if_absent(
        &mut self,
        raw: C::Raw<'_>,
        value: C::Value,
    ) -> Result<(&mut C::Value, bool)> {
        self.emplace(raw, value)
    }

    /// Insert `value` under `raw`, replacing (and destroying) any previous value.
    pub fn insert_or_update(
        &mut self,
        raw: C::Raw<'_>,
        value: C::Value,
    ) -> Result<(&mut C::Value, bool)> {
        let hash = C::hash(raw);
        if let Some(i) = self.position(raw, hash) {
            let slot = self.value_at(i);
            let old = std::mem::replace(slot, value);
            C::destroy_value(old);
            return Ok((self.value_at(i), false));
        }
        let i = self.vacate(raw, hash)?;
        let key = C::try_from_raw(raw)?;
        self.buckets[i] = Some(Bucket { hash, key, value });
        self.len += 1;
        Ok((self.value_at(i), true))
    }

    /// Remove the entry for `raw`, handing its key and value to the caller.
    pub fn remove(&mut self, raw: C::Raw<'_>) -> Option<(C::Key, C::Value)> {
        let i = self.position(raw, C::hash(raw))?;
        let bucket = self.remove_at(i);
        Some((bucket.key, bucket.value))
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

    pub fn iter(&self) -> Iter<'_, C> {
        Iter {
            inner: self.buckets.iter(),
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &C::Key> + '_ {
        self.iter().map(|(k, _)| k)
    }

    /// Remove and destroy every entry. The bucket array keeps its size.
    pub fn clear(&mut self) {
        for slot in self.buckets.iter_mut() {
            if let Some(bucket) = slot.take() {
                C::destroy_key(bucket.key);
                C::destroy_value(bucket.value);
            }
        }
        self.len = 0;
    }

    /// Tear the map down, destroying every entry. Equivalent to dropping it.
    pub fn destroy(self) {
        drop(self)
    }

    #[inline]
    fn mask(&self) -> usize {
        self.buckets.len() - 1
    }

    fn value_at(&mut self, i: usize) -> &mut C::Value {
        match &mut self.buckets[i] {
            Some(bucket) => &mut bucket.value,
            None => unreachable!("bucket {} expected to be occupied", i),
        }
    }

    // Requires a non-empty bucket array. Terminates because the load factor keeps at least one
    // bucket empty.
    fn probe(&self, raw: C::Raw<'_>, hash: u64) -> Probe {
        let mask = self.mask();
        let mut i = hash as usize & mask;
        loop {
            match &self.buckets[i] {
                None => return Probe::Vacant(i),
                Some(b) if b.hash == hash && C::equals(raw, C::to_raw(&b.key)) => {
                    return Probe::Found(i)
                }
                Some(_) => i = (i + 1) & mask,
            }
        }
    }

    fn position(&self, raw: C::Raw<'_>, hash: u64) -> Option<usize> {
        if self.buckets.is_empty() {
            return None;
        }
        match self.probe(raw, hash) {
            Probe::Found(i) => Some(i),
            Probe::Vacant(_) => None,
        }
    }

    // Make room for one more entry (growing if that would cross the load limit) and return the
    // empty bucket where `raw` belongs.
    fn vacate(&mut self, raw: C::Raw<'_>, hash: u64) -> Result<usize> {
        self.try_reserve(1)?;
        match self.probe(raw, hash) {
            Probe::Vacant(i) => Ok(i),
            Probe::Found(_) => unreachable!("key appeared during growth"),
        }
    }

    // Single-shot growth: the new array is fully allocated before anything moves.
    fn rehash(&mut self, new_capacity: usize) -> Result<()> {
        debug_assert!(new_capacity.is_power_of_two());
        let mut fresh = Vec::new();
        fresh
            .try_reserve_exact(new_capacity)
            .map_err(|e| AssocError::allocation(new_capacity, e))?;
        fresh.resize_with(new_capacity, || None);

        log::debug!(
            "probe map growing from {} to {} buckets ({} live entries)",
            self.buckets.len(),
            new_capacity,
            self.len
        );
        let old = std::mem::replace(&mut self.buckets, fresh);
        let mask = new_capacity - 1;
        for bucket in old.into_iter().flatten() {
            let mut i = bucket.hash as usize & mask;
            while self.buckets[i].is_some() {
                i = (i + 1) & mask;
            }
            self.buckets[i] = Some(bucket);
        }
        Ok(())
    }

    // Knuth's algorithm R: walk the run after the hole; an entry moves into the hole unless its
    // ideal bucket lies cyclically in (hole, j], in which case moving it would put it before its
    // own ideal bucket.
    fn remove_at(&mut self, i: usize) -> Bucket<C::Key, C::Value> {
        let mask = self.mask();
        let Some(removed) = self.buckets[i].take() else {
            unreachable!("removing empty bucket {}", i);
        };
        let mut hole = i;
        let mut j = i;
        loop {
            j = (j + 1) & mask;
            let Some(bucket) = &self.buckets[j] else {
                break;
            };
            let ideal = bucket.hash as usize & mask;
            let stays = if hole <= j {
                hole < ideal && ideal <= j
            } else {
                hole < ideal || ideal <= j
            };
            if !stays {
                self.buckets[hole] = self.buckets[j].take();
                hole = j;
            }
        }
        self.len -= 1;
        removed
    }

    /// Check that the occupied bucket count matches `len` and that every entry can be reached
    /// from its ideal bucket without crossing an empty one.
    pub fn is_probe_consistent(&self) -> bool {
        if self.buckets.is_empty() {
            return self.len == 0;
        }
        let mask = self.mask();
        let mut occupied = 0;
        for (i, slot) in self.buckets.iter().enumerate() {
            let Some(bucket) = slot else {
                continue;
            };
            occupied += 1;
            let mut p = bucket.hash as usize & mask;
            while p != i {
                if self.buckets[p].is_none() {
                    return false;
                }
                p = (p + 1) & mask;
            }
        }
        occupied == self.len
    }

    pub fn probe_stats(&self) -> ProbeStats {
        let mut max_probe = 0;
        let mut total = 0;
        if !self.buckets.is_empty() {
            let mask = self.mask();
            for (i, slot) in self.buckets.iter().enumerate() {
                if let Some(bucket) = slot {
                    let ideal = bucket.hash as usize & mask;
                    let probe = (i.wrapping_sub(ideal) & mask) + 1;
                    max_probe = max_probe.max(probe);
                    total += probe;
                }
            }
        }
        ProbeStats {
            len: self.len,
            capacity: self.buckets.len(),
            max_probe,
            mean_probe: if self.len == 0 {
                0.0
            } else {
                total as f64 / self.len as f64
            },
        }
    }
}

#[inline]
fn max_load(buckets: usize) -> usize {
    buckets / MAX_LOAD_DEN * MAX_LOAD_NUM
}

// Smallest power-of-two bucket count (at least MIN_CAPACITY) that holds `entries` under the
// load limit.
fn buckets_for(entries: usize) -> Option<usize> {
    let mut buckets = MIN_CAPACITY;
    while max_load(buckets) < entries {
        buckets = buckets.checked_mul(2)?;
    }
    Some(buckets)
}

impl<C: Capabilities> Drop for ProbeHashMap<C> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<C: Capabilities> Clone for ProbeHashMap<C> {
    fn clone(&self) -> Self {
        let buckets = self
            .buckets
            .iter()
            .map(|slot| {
                slot.as_ref().map(|b| Bucket {
                    hash: b.hash,
                    key: C::clone_key(&b.key),
                    value: C::clone_value(&b.value),
                })
            })
            .collect();
        Self {
            buckets,
            len: self.len,
        }
    }
}

impl<C: Capabilities> Debug for ProbeHashMap<C>
where
    C::Key: Debug,
    C::Value: Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

pub struct Iter<'a, C: Capabilities> {
    inner: std::slice::Iter<'a, Option<Bucket<C::Key, C::Value>>>,
}

impl<'a, C: Capabilities> Iterator for Iter<'a, C> {
    type Item = (&'a C::Key, &'a C::Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner
            .by_ref()
            .find_map(|slot| slot.as_ref().map(|b| (&b.key, &b.value)))
    }
}

impl<'a, C: Capabilities> IntoIterator for &'a ProbeHashMap<C> {
    type Item = (&'a C::Key, &'a C::Value);
    type IntoIter = Iter<'a, C>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
