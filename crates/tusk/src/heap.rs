//! Object arena.
//!
//! Objects live in a slot vector owned by the interpreter instance and are
//! addressed by stable [`ObjectId`] handles, so cyclic and self-referential
//! object graphs need no ownership gymnastics: a property holding another
//! object holds its id. Identity comparison is handle equality. Slots are
//! reclaimed only through `unset`-driven teardown at interpreter shutdown;
//! there is no tracing collector.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::{types::ClassDef, value::Value};

/// Stable handle to an object in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u32);

impl ObjectId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

/// An allocated object: its class and the property table. Property order is
/// insertion order, which `var_dump` and `foreach` observe.
#[derive(Debug, Clone)]
pub struct ObjectData {
    pub class: Rc<ClassDef>,
    pub props: IndexMap<String, Value>,
}

#[derive(Debug, Default)]
pub struct Heap {
    slots: Vec<Option<ObjectData>>,
}

impl Heap {
    pub fn alloc(&mut self, class: Rc<ClassDef>) -> ObjectId {
        self.slots.push(Some(ObjectData { class, props: IndexMap::new() }));
        ObjectId((self.slots.len() - 1) as u32)
    }

    pub fn get(&self, id: ObjectId) -> Option<&ObjectData> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut ObjectData> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    /// Shallow copy for `clone`: same class, property table copied cell by
    /// cell. `__clone` is the evaluator's job afterwards.
    pub fn clone_object(&mut self, id: ObjectId) -> Option<ObjectId> {
        let data = self.get(id)?.clone();
        self.slots.push(Some(data));
        Some(ObjectId((self.slots.len() - 1) as u32))
    }

    /// Ids of every live object, oldest first. Used for shutdown destructor
    /// sweeps.
    pub fn live_ids(&self) -> Vec<ObjectId> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| ObjectId(i as u32)))
            .collect()
    }
}
