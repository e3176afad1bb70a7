//! Fixed-capacity slot pool for in-flight transactions
//!
//! Slots are indices into a vector with a free list. A `SlotId` is a
//! move-only handle carrying the slot generation, so a handle kept past its
//! release is caught as stale instead of aliasing the next occupant.

use crate::error::{OffloadError, OffloadResult};

/// Handle to an occupied slot. Not `Clone`: exactly one owner at a time.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

#[derive(Debug)]
pub struct SlotPool<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    capacity: usize,
}

impl<T> SlotPool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            capacity,
        }
    }

    /// Store `value` in a free slot
    pub fn checkout(&mut self, value: T) -> OffloadResult<SlotId> {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.value.is_none());
            slot.value = Some(value);
            return Ok(SlotId {
                index,
                generation: slot.generation,
            });
        }

        if self.slots.len() >= self.capacity {
            return Err(OffloadError::PoolExhausted(self.capacity));
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Ok(SlotId {
            index,
            generation: 0,
        })
    }

    fn slot(&self, id: &SlotId) -> OffloadResult<&Slot<T>> {
        self.slots
            .get(id.index as usize)
            .filter(|s| s.generation == id.generation && s.value.is_some())
            .ok_or(OffloadError::StaleSlot {
                index: id.index,
                generation: id.generation,
            })
    }

    pub fn get(&self, id: &SlotId) -> OffloadResult<&T> {
        self.slot(id)?.value.as_ref().ok_or(OffloadError::StaleSlot {
            index: id.index,
            generation: id.generation,
        })
    }

    pub fn get_mut(&mut self, id: &SlotId) -> OffloadResult<&mut T> {
        let stale = OffloadError::StaleSlot {
            index: id.index,
            generation: id.generation,
        };
        match self.slots.get_mut(id.index as usize) {
            Some(slot) if slot.generation == id.generation => slot.value.as_mut().ok_or(stale),
            _ => Err(stale),
        }
    }

    /// Free the slot, consuming its handle, and return the value
    pub fn release(&mut self, id: SlotId) -> OffloadResult<T> {
        self.slot(&id)?;
        let slot = &mut self.slots[id.index as usize];
        let value = slot.value.take().ok_or(OffloadError::StaleSlot {
            index: id.index,
            generation: id.generation,
        })?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        Ok(value)
    }

    /// Occupied slots
    pub fn in_use(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn available(&self) -> usize {
        self.capacity - self.in_use()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
