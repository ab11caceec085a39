//! Fixed-capacity parking slot pool.

use crate::error::{GateError, Result};
use crate::store::TokenStore;
use crate::token::TokenId;

pub type SlotIndex = usize;

/// Parking slots, each empty or held by one card.
///
/// Assignment is lowest-index-first so the layout is reproducible. Occupancy
/// is never persisted; every slot starts empty.
#[derive(Debug, Clone)]
pub struct SlotPool {
    slots: Vec<Option<TokenId>>,
}

impl SlotPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn available_count(&self) -> usize {
        self.capacity() - self.occupied_count()
    }

    pub fn slot_of(&self, id: &TokenId) -> Option<SlotIndex> {
        self.slots.iter().position(|s| s.as_ref() == Some(id))
    }

    pub fn get(&self, index: SlotIndex) -> Option<&TokenId> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Assign `id` to the first empty slot.
    pub fn occupy(&mut self, id: TokenId) -> Result<SlotIndex> {
        if let Some(slot) = self.slot_of(&id) {
            return Err(GateError::AlreadyParked { token: id, slot });
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(GateError::SlotsFull)?;
        self.slots[index] = Some(id);
        Ok(index)
    }

    /// Free the first occupied slot.
    ///
    /// The exit sensor cannot tell which vehicle left, so the released token
    /// is not necessarily the departing one.
    pub fn vacate_first_occupied(&mut self) -> Option<(SlotIndex, TokenId)> {
        let index = self.slots.iter().position(Option::is_some)?;
        self.slots[index].take().map(|id| (index, id))
    }

    /// Undo an assignment: free `index` if `id` still holds it.
    pub fn release(&mut self, index: SlotIndex, id: &TokenId) -> bool {
        match self.slots.get_mut(index) {
            Some(slot) if slot.as_ref() == Some(id) => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    /// Undo a vacate: put `id` back in `index` if that slot is still empty and
    /// the token is not parked elsewhere.
    pub fn reinstate(&mut self, index: SlotIndex, id: TokenId) -> bool {
        if self.slot_of(&id).is_some() {
            return false;
        }
        match self.slots.get_mut(index) {
            Some(slot) if slot.is_none() => {
                *slot = Some(id);
                true
            }
            _ => false,
        }
    }

    /// Slots currently held by reserved cards.
    pub fn reserved_occupancy_count(&self, store: &TokenStore) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|id| store.is_reserved(id))
            .count()
    }
}
