//! RAII guard for zero-copy reads

use crate::layout::Slot;

/// A claimed slot whose payload is read in place.
///
/// The slot goes back to the producer when the guard is dropped or
/// [`release`](Self::release)d. [`forget`](Self::forget) keeps it held and
/// hands back the slot id for a later
/// [`Consumer::release`](crate::Consumer::release).
pub struct SlotGuard<'a> {
    /// None once forgotten
    slot: Option<&'a Slot>,
    slot_id: usize,
    lost: usize,
}

impl<'a> SlotGuard<'a> {
    pub(crate) fn new(slot: &'a Slot, slot_id: usize, lost: usize) -> Self {
        Self {
            slot: Some(slot),
            slot_id,
            lost,
        }
    }

    /// Physical slot position
    pub fn slot_id(&self) -> usize {
        self.slot_id
    }

    /// Records dropped since the previous read
    pub fn lost(&self) -> usize {
        self.lost
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Payload, in place in shared memory
    pub fn as_bytes(&self) -> &[u8] {
        match self.slot {
            // Safety: the slot was claimed and observed ready, and it is not
            // released while the guard (and so this borrow) lives.
            Some(slot) => unsafe { slot.payload() },
            None => &[],
        }
    }

    /// Hand the slot back to the producer
    pub fn release(self) {
        drop(self);
    }

    /// Keep the slot held without releasing it.
    ///
    /// The producer cannot reuse the slot until `Consumer::release` is called
    /// with the returned id.
    pub fn forget(mut self) -> usize {
        self.slot = None;
        self.slot_id
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.release();
        }
    }
}
