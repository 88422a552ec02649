use std::collections::BTreeMap;

use crate::{
    types::{BoundMethod, Dict, ExceptionObject, Function, Module},
    value::Value,
};

/// Identifier for values stored inside the heap arena.
///
/// Slots are reused after a collection; the generation tells an id for the
/// current occupant apart from one for an object that was freed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HeapId {
    index: usize,
    generation: u32,
}

impl HeapId {
    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.index
    }

    #[inline]
    #[must_use]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

#[derive(Debug, Default)]
struct HeapSlot {
    generation: u32,
    data: Option<HeapData>,
}

/// Payload of a heap slot.
#[derive(Debug)]
pub enum HeapData {
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Dict(Dict),
    Function(Function),
    Method(BoundMethod),
    Module(Module),
    Exception(ExceptionObject),
}

impl HeapData {
    /// Runtime type name, as reported by `type_of()` and the host bridge.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "str",
            Self::List(_) => "list",
            Self::Tuple(_) => "tuple",
            Self::Dict(_) => "dict",
            Self::Function(_) => "function",
            Self::Method(_) => "method",
            Self::Module(_) => "module",
            Self::Exception(e) => e.exc_type.into(),
        }
    }

    fn variant_name(&self) -> &'static str {
        match self {
            Self::Str(_) => "Str",
            Self::List(_) => "List",
            Self::Tuple(_) => "Tuple",
            Self::Dict(_) => "Dict",
            Self::Function(_) => "Function",
            Self::Method(_) => "Method",
            Self::Module(_) => "Module",
            Self::Exception(_) => "Exception",
        }
    }

    /// Pushes every heap reference held by this object onto `out`.
    fn push_children(&self, out: &mut Vec<HeapId>) {
        let mut push = |v: &Value| {
            if let Value::Ref(id) = v {
                out.push(*id);
            }
        };
        match self {
            Self::Str(_) | Self::Exception(_) => {}
            Self::List(items) | Self::Tuple(items) => items.iter().for_each(&mut push),
            Self::Dict(dict) => dict.pairs().for_each(|(k, v)| {
                push(&k);
                push(&v);
            }),
            Self::Function(f) => {
                f.defaults.iter().for_each(&mut push);
                f.captures.iter().for_each(|(_, v)| push(v));
            }
            Self::Method(m) => push(&m.receiver),
            Self::Module(m) => m.namespace.values().for_each(&mut push),
        }
    }
}

/// Snapshot of heap state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct HeapStats {
    /// Total number of live objects on the heap.
    pub live_objects: usize,
    /// Number of free (recycled) slots available for reuse.
    pub free_slots: usize,
    /// Breakdown of live objects by `HeapData` variant name.
    pub objects_by_type: BTreeMap<String, usize>,
    /// Number of live GC-root registrations.
    pub roots: usize,
    /// Completed collection cycles.
    pub collections: usize,
}

/// Arena of heap objects with a free list and a mark/sweep collector.
///
/// The heap never collects on its own; the runtime calls [`Heap::collect`] only
/// between boundary crossings, when every live value is reachable from the root
/// set it passes in.
#[derive(Debug, Default)]
pub struct Heap {
    entries: Vec<HeapSlot>,
    free: Vec<usize>,
    allocations_since_gc: usize,
    collections: usize,
}

impl Heap {
    pub fn allocate(&mut self, data: HeapData) -> HeapId {
        self.allocations_since_gc = self.allocations_since_gc.wrapping_add(1);
        if let Some(index) = self.free.pop() {
            let slot = &mut self.entries[index];
            debug_assert!(slot.data.is_none(), "free list points at live slot");
            slot.data = Some(data);
            HeapId {
                index,
                generation: slot.generation,
            }
        } else {
            self.entries.push(HeapSlot {
                generation: 0,
                data: Some(data),
            });
            HeapId {
                index: self.entries.len() - 1,
                generation: 0,
            }
        }
    }

    fn slot(&self, id: HeapId) -> Option<&HeapData> {
        self.entries
            .get(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_ref())
    }

    #[must_use]
    pub fn get(&self, id: HeapId) -> &HeapData {
        self.slot(id).expect("Heap::get: object already freed")
    }

    pub fn get_mut(&mut self, id: HeapId) -> &mut HeapData {
        self.entries
            .get_mut(id.index)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.data.as_mut())
            .expect("Heap::get_mut: object already freed")
    }

    /// Whether `id` refers to the object it was issued for.
    #[must_use]
    pub fn is_live(&self, id: HeapId) -> bool {
        self.slot(id).is_some()
    }

    #[must_use]
    pub fn allocations_since_gc(&self) -> usize {
        self.allocations_since_gc
    }

    /// Marks everything reachable from `roots` and frees the rest.
    ///
    /// Returns the number of freed slots.
    pub fn collect(&mut self, roots: impl IntoIterator<Item = Value>) -> usize {
        let mut marked = vec![false; self.entries.len()];
        let mut work: Vec<HeapId> = roots.into_iter().filter_map(Value::heap_id).collect();
        while let Some(id) = work.pop() {
            let Some(mark) = marked.get_mut(id.index) else {
                continue;
            };
            if *mark {
                continue;
            }
            *mark = true;
            if let Some(data) = self.slot(id) {
                data.push_children(&mut work);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.entries.iter_mut().enumerate() {
            if slot.data.is_some() && !marked[index] {
                slot.data = None;
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index);
                freed += 1;
            }
        }
        self.allocations_since_gc = 0;
        self.collections += 1;
        freed
    }

    #[must_use]
    pub fn stats(&self, roots: usize) -> HeapStats {
        let mut objects_by_type = BTreeMap::new();
        for data in self.entries.iter().filter_map(|slot| slot.data.as_ref()) {
            *objects_by_type.entry(data.variant_name().to_owned()).or_insert(0) += 1;
        }
        HeapStats {
            live_objects: self.entries.len() - self.free.len(),
            free_slots: self.free.len(),
            objects_by_type,
            roots,
            collections: self.collections,
        }
    }
}
