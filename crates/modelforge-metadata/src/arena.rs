//! Slot arena with typed, never-reused identifiers.
//!
//! The schema graph is full of back-references (entity type ↔ foreign key ↔
//! navigation ↔ key). Every element lives in an arena slot and every link is
//! stored as an id; removed slots stay empty forever so a stale id simply
//! resolves to `None`.

use std::fmt;
use std::marker::PhantomData;

use serde::Serialize;

pub trait ArenaId: Copy + Eq + Ord + std::hash::Hash + fmt::Debug {
    fn from_index(index: usize) -> Self;
    fn index(self) -> usize;
}

macro_rules! arena_ids {
    ($($(#[$meta:meta])* $name:ident => $prefix:literal),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
            pub struct $name(u32);

            impl ArenaId for $name {
                fn from_index(index: usize) -> Self {
                    Self(u32::try_from(index).unwrap_or(u32::MAX))
                }

                fn index(self) -> usize {
                    self.0 as usize
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, concat!($prefix, "#{}"), self.0)
                }
            }
        )*
    };
}

arena_ids! {
    /// Identifies an [`crate::EntityType`].
    EntityTypeId => "entity",
    /// Identifies a [`crate::ComplexType`].
    ComplexTypeId => "complex",
    /// Identifies a [`crate::Property`].
    PropertyId => "property",
    /// Identifies a [`crate::ComplexProperty`].
    ComplexPropertyId => "complex_property",
    /// Identifies a [`crate::Key`].
    KeyId => "key",
    /// Identifies an [`crate::Index`].
    IndexId => "index",
    /// Identifies a [`crate::ForeignKey`].
    ForeignKeyId => "fk",
    /// Identifies a [`crate::Navigation`].
    NavigationId => "navigation",
    /// Identifies a [`crate::SkipNavigation`].
    SkipNavigationId => "skip_navigation",
    /// Identifies a [`crate::Trigger`].
    TriggerId => "trigger",
}

#[derive(Debug, Clone)]
pub struct Arena<I, T> {
    slots: Vec<Option<T>>,
    live: usize,
    _id: PhantomData<I>,
}

impl<I, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            _id: PhantomData,
        }
    }
}

impl<I: ArenaId, T> Arena<I, T> {
    pub fn insert(&mut self, value: T) -> I {
        let id = I::from_index(self.slots.len());
        self.slots.push(Some(value));
        self.live += 1;
        id
    }

    /// The id the next `insert` will hand out.
    pub fn next_id(&self) -> I {
        I::from_index(self.slots.len())
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.index()).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        let removed = self.slots.get_mut(id.index()).and_then(Option::take);
        if removed.is_some() {
            self.live -= 1;
        }
        removed
    }

    /// Live elements in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|value| (I::from_index(index), value)))
    }

    pub fn ids(&self) -> Vec<I> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}
