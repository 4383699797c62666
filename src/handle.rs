//! Generational asset handles and the tables that resolve them
//!
//! A handle is `(id, generation)`. Id 0 or generation 0 is the invalid
//! handle. Ids come from a per-table counter that only grows, and removed
//! entries are never reinserted under the same id, so every entry keeps
//! generation 1; a slot-reusing table must bump the generation on removal.

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// Common behaviour of the typed handles
pub trait AssetHandle: Copy + Eq + Hash + Debug {
    fn from_parts(id: u64, generation: u32) -> Self;
    fn id(&self) -> u64;
    fn generation(&self) -> u32;

    fn is_valid(&self) -> bool {
        self.id() != 0 && self.generation() != 0
    }
}

macro_rules! define_handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name {
            pub id: u64,
            pub generation: u32,
        }

        impl $name {
            pub const INVALID: Self = Self { id: 0, generation: 0 };

            pub const fn new(id: u64, generation: u32) -> Self {
                Self { id, generation }
            }

            pub fn is_valid(&self) -> bool {
                self.id != 0 && self.generation != 0
            }
        }

        impl AssetHandle for $name {
            fn from_parts(id: u64, generation: u32) -> Self {
                Self::new(id, generation)
            }

            fn id(&self) -> u64 {
                self.id
            }

            fn generation(&self) -> u32 {
                self.generation
            }
        }
    };
}

define_handle!(
    /// Handle to a GPU mesh
    MeshHandle
);
define_handle!(
    /// Handle to a GPU texture
    TextureHandle
);
define_handle!(
    /// Handle to a CPU material
    MaterialHandle
);
define_handle!(
    /// Handle to a model (primitives, nodes, animations)
    ModelHandle
);

const FIRST_GENERATION: u32 = 1;

#[derive(Debug)]
struct Slot<T> {
    value: T,
    generation: u32,
    ref_count: u32,
}

/// Owned entries addressed by handles of type `H`
#[derive(Debug)]
pub struct HandleTable<H, T> {
    slots: HashMap<u64, Slot<T>>,
    next_id: u64,
    _marker: PhantomData<H>,
}

impl<H: AssetHandle, T> Default for HandleTable<H, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: AssetHandle, T> HandleTable<H, T> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            next_id: 1,
            _marker: PhantomData,
        }
    }

    /// Store `value` under a fresh id
    pub fn insert(&mut self, value: T, initial_ref: u32) -> H {
        let id = self.next_id;
        self.next_id += 1;
        self.slots.insert(
            id,
            Slot {
                value,
                generation: FIRST_GENERATION,
                ref_count: initial_ref,
            },
        );
        H::from_parts(id, FIRST_GENERATION)
    }

    fn slot(&self, handle: H) -> Option<&Slot<T>> {
        if !handle.is_valid() {
            return None;
        }
        self.slots
            .get(&handle.id())
            .filter(|slot| slot.generation == handle.generation())
    }

    fn slot_mut(&mut self, handle: H) -> Option<&mut Slot<T>> {
        if !handle.is_valid() {
            return None;
        }
        self.slots
            .get_mut(&handle.id())
            .filter(|slot| slot.generation == handle.generation())
    }

    pub fn get(&self, handle: H) -> Option<&T> {
        self.slot(handle).map(|slot| &slot.value)
    }

    pub fn get_mut(&mut self, handle: H) -> Option<&mut T> {
        self.slot_mut(handle).map(|slot| &mut slot.value)
    }

    pub fn contains(&self, handle: H) -> bool {
        self.slot(handle).is_some()
    }

    /// Returns `false` for stale handles
    pub fn add_ref(&mut self, handle: H) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.ref_count = slot.ref_count.saturating_add(1);
                true
            }
            None => false,
        }
    }

    /// Decrement, clamping at zero. Returns `false` for stale handles
    pub fn release(&mut self, handle: H) -> bool {
        match self.slot_mut(handle) {
            Some(slot) => {
                slot.ref_count = slot.ref_count.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    pub fn ref_count(&self, handle: H) -> Option<u32> {
        self.slot(handle).map(|slot| slot.ref_count)
    }

    pub fn remove(&mut self, handle: H) -> Option<T> {
        self.slot(handle)?;
        self.slots.remove(&handle.id()).map(|slot| slot.value)
    }

    /// Remove every entry whose ref count is zero, in id order
    pub fn take_unreferenced(&mut self) -> Vec<(H, T)> {
        let mut ids: Vec<u64> = self
            .slots
            .iter()
            .filter(|(_, slot)| slot.ref_count == 0)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();

        ids.into_iter()
            .filter_map(|id| {
                self.slots
                    .remove(&id)
                    .map(|slot| (H::from_parts(id, slot.generation), slot.value))
            })
            .collect()
    }

    /// Remove every entry, in id order
    pub fn drain(&mut self) -> Vec<(H, T)> {
        let mut entries: Vec<(H, T)> = self
            .slots
            .drain()
            .map(|(id, slot)| (H::from_parts(id, slot.generation), slot.value))
            .collect();
        entries.sort_unstable_by_key(|(handle, _)| handle.id());
        entries
    }

    pub fn iter(&self) -> impl Iterator<Item = (H, &T)> {
        self.slots
            .iter()
            .map(|(id, slot)| (H::from_parts(*id, slot.generation), &slot.value))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handles() {
        assert!(!MeshHandle::INVALID.is_valid());
        assert!(!MeshHandle::default().is_valid());
        assert!(!MeshHandle::new(5, 0).is_valid());
        assert!(!MeshHandle::new(0, 1).is_valid());
        assert!(MeshHandle::new(5, 1).is_valid());
    }

    #[test]
    fn test_insert_assigns_increasing_ids() {
        let mut table: HandleTable<TextureHandle, &str> = HandleTable::new();
        let a = table.insert("a", 0);
        let b = table.insert("b", 1);
        assert_eq!(a, TextureHandle::new(1, 1));
        assert_eq!(b, TextureHandle::new(2, 1));
        assert_eq!(table.get(b), Some(&"b"));

        table.remove(a);
        let c = table.insert("c", 0);
        assert_eq!(c.id, 3);
        assert_eq!(table.get(a), None);
    }

    #[test]
    fn test_generation_mismatch_is_stale() {
        let mut table: HandleTable<MaterialHandle, u32> = HandleTable::new();
        let h = table.insert(7, 1);
        let stale = MaterialHandle::new(h.id, h.generation + 1);

        assert_eq!(table.get(stale), None);
        assert!(!table.add_ref(stale));
        assert!(!table.release(stale));
        assert_eq!(table.remove(stale), None);
        assert_eq!(table.ref_count(h), Some(1));
    }

    #[test]
    fn test_add_ref_then_release_restores_count() {
        let mut table: HandleTable<ModelHandle, ()> = HandleTable::new();
        let h = table.insert((), 3);
        table.add_ref(h);
        table.release(h);
        assert_eq!(table.ref_count(h), Some(3));
    }

    #[test]
    fn test_release_clamps_at_zero() {
        let mut table: HandleTable<MeshHandle, ()> = HandleTable::new();
        let h = table.insert((), 0);
        assert!(table.release(h));
        assert_eq!(table.ref_count(h), Some(0));
    }

    #[test]
    fn test_take_unreferenced_in_id_order() {
        let mut table: HandleTable<MeshHandle, char> = HandleTable::new();
        let a = table.insert('a', 0);
        let _b = table.insert('b', 1);
        let c = table.insert('c', 0);

        let taken = table.take_unreferenced();
        assert_eq!(taken, vec![(a, 'a'), (c, 'c')]);
        assert_eq!(table.len(), 1);
        assert!(table.take_unreferenced().is_empty());
    }
}
