use std::ops::{Index, IndexMut};

use crate::error::{AssocError, Result};

// We use a u32 here instead of usize under the assumption there simply won't be that many entries
// and so that we can save some bytes in the tree nodes that link to each other with these.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct FVIndex(pub u32);

impl FVIndex {
    /// The "absent" link. Never handed out by `try_add`.
    pub const NONE: FVIndex = FVIndex(u32::MAX);

    #[inline]
    pub fn is_none(self) -> bool {
        self == Self::NONE
    }

    #[inline]
    pub fn is_some(self) -> bool {
        self != Self::NONE
    }
}

enum Slot<V> {
    Occupied(V),
    // Link to the next free slot, forming an intrusive free list.
    Free(FVIndex),
}

/// A place to store (owned) values that can be accessed by an index, with holes being re-used.
/// The free list is threaded through the vacated slots themselves, so both allocation and release
/// are O(1). A poor man's slot map or arena, really.
///
/// Growth is fallible: `try_add` reports an allocation failure instead of aborting, and leaves the
/// vector untouched when it does.
pub struct FillVector<V> {
    values: Vec<Slot<V>>,
    free_head: FVIndex,
    size: usize,
}

impl<V> FillVector<V> {
    pub fn new() -> Self {
        Self {
            values: vec![],
            free_head: FVIndex::NONE,
            size: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            values: Vec::with_capacity(capacity),
            free_head: FVIndex::NONE,
            size: 0,
        }
    }

    /// Make sure `additional` more values can be added without reallocating.
    pub fn try_reserve(&mut self, additional: usize) -> Result<()> {
        let free_slots = self.values.len() - self.size;
        if additional <= free_slots {
            return Ok(());
        }
        let needed = additional - free_slots;
        if self.values.len().saturating_add(needed) >= FVIndex::NONE.0 as usize {
            return Err(AssocError::overflow(self.values.len().saturating_add(needed)));
        }
        if self.values.capacity() - self.values.len() < needed {
            log::debug!(
                "fill vector growing from {} slots ({} live) by {}",
                self.values.capacity(),
                self.size,
                needed
            );
        }
        self.values
            .try_reserve(needed)
            .map_err(|e| AssocError::allocation(needed, e))
    }

    pub fn try_add(&mut self, value: V) -> Result<FVIndex> {
        self.try_reserve(1)?;
        let id = if self.free_head.is_some() {
            let id = self.free_head;
            let Slot::Free(next) = self.values[id.0 as usize] else {
                unreachable!("free list points at an occupied slot");
            };
            self.free_head = next;
            self.values[id.0 as usize] = Slot::Occupied(value);
            id
        } else {
            let id = FVIndex(self.values.len() as u32);
            self.values.push(Slot::Occupied(value));
            id
        };
        self.size += 1;
        Ok(id)
    }

    /// Release the value at `id`, handing it back. Returns None if the slot was already free.
    pub fn free(&mut self, id: FVIndex) -> Option<V> {
        let slot = self.values.get_mut(id.0 as usize)?;
        if let Slot::Free(_) = slot {
            return None;
        }
        let Slot::Occupied(value) = std::mem::replace(slot, Slot::Free(self.free_head)) else {
            unreachable!()
        };
        self.free_head = id;
        self.size -= 1;
        Some(value)
    }

    pub fn get(&self, id: FVIndex) -> Option<&V> {
        match self.values.get(id.0 as usize) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: FVIndex) -> Option<&mut V> {
        match self.values.get_mut(id.0 as usize) {
            Some(Slot::Occupied(v)) => Some(v),
            _ => None,
        }
    }

    /// Remove every live value, yielding them in slot order. Capacity is kept.
    pub fn drain(&mut self) -> impl Iterator<Item = V> + '_ {
        self.free_head = FVIndex::NONE;
        self.size = 0;
        self.values.drain(..).filter_map(|slot| match slot {
            Slot::Occupied(v) => Some(v),
            Slot::Free(_) => None,
        })
    }

    /// Copy the whole vector, holes included, so that indices stay valid in the copy.
    pub fn clone_with<F: FnMut(&V) -> V>(&self, mut f: F) -> Self {
        let values = self
            .values
            .iter()
            .map(|slot| match slot {
                Slot::Occupied(v) => Slot::Occupied(f(v)),
                Slot::Free(next) => Slot::Free(*next),
            })
            .collect();
        Self {
            values,
            free_head: self.free_head,
            size: self.size,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.values.capacity()
    }
}

impl<V> Index<FVIndex> for FillVector<V> {
    type Output = V;

    fn index(&self, index: FVIndex) -> &Self::Output {
        match &self.values[index.0 as usize] {
            Slot::Occupied(v) => v,
            Slot::Free(_) => panic!("access to freed slot {}", index.0),
        }
    }
}

impl<V> IndexMut<FVIndex> for FillVector<V> {
    fn index_mut(&mut self, index: FVIndex) -> &mut Self::Output {
        match &mut self.values[index.0 as usize] {
            Slot::Occupied(v) => v,
            Slot::Free(_) => panic!("access to freed slot {}", index.0),
        }
    }
}

impl<V> Default for FillVector<V> {
    fn default() -> Self {
        Self::new()
    }
}
