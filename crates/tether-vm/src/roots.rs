//! Host-held GC roots.
//!
//! Every value the host keeps across boundary crossings must be pinned here,
//! otherwise the next collection may free it. Slots are generational so a stale
//! [`RootId`] can never release somebody else's registration.

use crate::value::Value;

/// Registration handle returned by [`RootTable::insert`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RootId {
    index: u32,
    generation: u32,
}

/// What a root slot keeps alive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinned {
    pub value: Value,
    /// Container `value` was read from, pinned by the same registration.
    pub anchor: Option<Value>,
}

#[derive(Debug)]
struct RootSlot {
    generation: u32,
    pinned: Option<Pinned>,
}

#[derive(Debug, Default)]
pub struct RootTable {
    slots: Vec<RootSlot>,
    free: Vec<u32>,
    live: usize,
}

impl RootTable {
    pub fn insert(&mut self, value: Value, anchor: Option<Value>) -> RootId {
        self.live += 1;
        let pinned = Some(Pinned { value, anchor });
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.pinned.is_none(), "free list points at live root slot");
            slot.pinned = pinned;
            return RootId {
                index,
                generation: slot.generation,
            };
        }
        let index = u32::try_from(self.slots.len()).expect("root table index overflow");
        self.slots.push(RootSlot { generation: 0, pinned });
        RootId { index, generation: 0 }
    }

    /// Releases a registration. Returns `false` if `id` is stale or already released.
    pub fn remove(&mut self, id: RootId) -> bool {
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        if slot.pinned.take().is_none() {
            return false;
        }
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        true
    }

    #[must_use]
    pub fn get(&self, id: RootId) -> Option<Pinned> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.pinned)
    }

    /// Replaces the pinned value, keeping the anchor. Returns `false` for a stale id.
    pub fn set_value(&mut self, id: RootId, value: Value) -> bool {
        match self.slot_mut(id).and_then(|slot| slot.pinned.as_mut()) {
            Some(pinned) => {
                pinned.value = value;
                true
            }
            None => false,
        }
    }

    /// Number of live registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Every value kept alive by the table, anchors included.
    pub fn values(&self) -> impl Iterator<Item = Value> + '_ {
        self.slots
            .iter()
            .filter_map(|slot| slot.pinned)
            .flat_map(|pinned| std::iter::once(pinned.value).chain(pinned.anchor))
    }

    fn slot_mut(&mut self, id: RootId) -> Option<&mut RootSlot> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
    }
}
