//! Fixed-capacity handle sets.
//!
//! A [`SlotSet`] is a row of optional handles sized once from the server
//! configuration. Inserts always take the lowest free index and report
//! saturation explicitly, so "slot 0 holds this handle" and "there was no
//! room" can never be confused.

use core::fmt;

use heapless::Vec;

/// Compile-time storage bound for every per-client set.
pub const MAX_INSTANCES: usize = 16;

/// Which bounded resource a capacity failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    Client,
    Engine,
    Decoder,
    Encoder,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Client => "client",
            Self::Engine => "engine",
            Self::Decoder => "decoder",
            Self::Encoder => "encoder",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotSet<H> {
    slots: Vec<Option<H>, MAX_INSTANCES>,
    occupied: usize,
}

impl<H: Copy + PartialEq> SlotSet<H> {
    /// A set with `capacity` slots, clamped to [`MAX_INSTANCES`].
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::new();
        for _ in 0..capacity.min(MAX_INSTANCES) {
            let _ = slots.push(None);
        }
        Self { slots, occupied: 0 }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.occupied
    }

    pub fn is_empty(&self) -> bool {
        self.occupied == 0
    }

    pub fn is_saturated(&self) -> bool {
        self.occupied == self.slots.len()
    }

    pub fn contains(&self, handle: H) -> bool {
        self.position(handle).is_some()
    }

    /// Store `handle` in the lowest free slot and return that index.
    /// `None` means the set is saturated; nothing changes.
    pub fn insert(&mut self, handle: H) -> Option<usize> {
        let index = self.slots.iter().position(Option::is_none)?;
        self.slots[index] = Some(handle);
        self.occupied += 1;
        Some(index)
    }

    /// Clear the slot holding `handle` and return its index.
    pub fn remove(&mut self, handle: H) -> Option<usize> {
        let index = self.position(handle)?;
        self.slots[index] = None;
        self.occupied -= 1;
        Some(index)
    }

    pub fn get(&self, index: usize) -> Option<H> {
        self.slots.get(index).copied().flatten()
    }

    /// Live handles in slot order.
    pub fn iter(&self) -> impl Iterator<Item = H> + '_ {
        self.slots.iter().filter_map(|slot| *slot)
    }

    /// Copy of the live handles, for callers that mutate while walking.
    pub fn snapshot(&self) -> Vec<H, MAX_INSTANCES> {
        self.iter().collect()
    }

    pub fn clear(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
        self.occupied = 0;
    }

    fn position(&self, handle: H) -> Option<usize> {
        self.slots.iter().position(|slot| *slot == Some(handle))
    }
}
