//! Segment memory layout
//!
//! `[header padded to SLOT_SIZE][slot 0]...[slot capacity-1]`
//!
//! The header is padded to a full slot so the whole region is indexed with a
//! single stride. All fields touched concurrently are atomics; slot bodies are
//! handed over through the `ready` flag.

use crate::control::AtomicWord;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering};

/// log2 of [`SLOT_SIZE`]
pub const SLOT_SIZE_LOG2: usize = 8;

/// Size of one slot in bytes, header region included
pub const SLOT_SIZE: usize = 1 << SLOT_SIZE_LOG2;

/// `ready` flag plus length byte
pub const SLOT_HEADER_SIZE: usize = 2;

/// Longest payload a slot holds; longer writes are truncated
pub const MAX_PAYLOAD: usize = SLOT_SIZE - SLOT_HEADER_SIZE;

/// Slot count used when none is configured
pub const DEFAULT_CAPACITY: usize = 1024;

/// Control header stored at offset 0 of the segment
#[repr(C)]
pub struct SegmentHeader {
    /// Slot count, written once by the producer before anyone attaches
    pub capacity: u32,
    /// Registered consumer identity, 0 when nobody applies backpressure
    pub consumer_id: AtomicI32,
    /// Packed head/tail, see [`crate::control`]
    pub control: AtomicWord,
}

/// One record
#[repr(C)]
pub struct Slot {
    /// true: consumer may read the body. false: producer may write it.
    pub ready: AtomicBool,
    /// Payload length, only meaningful while `ready` is set
    pub len: AtomicU8,
    body: UnsafeCell<[u8; MAX_PAYLOAD]>,
}

const _: () = assert!(std::mem::size_of::<SegmentHeader>() <= SLOT_SIZE);
const _: () = assert!(std::mem::size_of::<Slot>() == SLOT_SIZE);
const _: () = assert!(MAX_PAYLOAD <= u8::MAX as usize);

/// Region size needed for `capacity` slots, `None` if it overflows `usize`
pub const fn region_size(capacity: usize) -> Option<usize> {
    match capacity.checked_add(1) {
        Some(slots) => slots.checked_mul(SLOT_SIZE),
        None => None,
    }
}

/// Byte offset of slot `index`
pub const fn slot_offset(index: usize) -> usize {
    SLOT_SIZE + index * SLOT_SIZE
}

impl Slot {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Spin until the consumer hands the slot back.
    pub(crate) fn wait_free(&self) {
        while self.ready.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    /// Spin until the producer has published the slot.
    pub(crate) fn wait_ready(&self) {
        while !self.ready.load(Ordering::Acquire) {
            std::thread::yield_now();
        }
    }

    /// Copy `payload` into the body and publish it. `ready` is stored last.
    ///
    /// # Safety
    /// The caller must own the slot: it claimed the slot's logical index and
    /// observed `ready == false`. `payload` must fit in [`MAX_PAYLOAD`].
    pub(crate) unsafe fn publish(&self, payload: &[u8]) {
        debug_assert!(payload.len() <= MAX_PAYLOAD);
        std::ptr::copy_nonoverlapping(payload.as_ptr(), self.body.get() as *mut u8, payload.len());
        self.len.store(payload.len() as u8, Ordering::Relaxed);
        self.ready.store(true, Ordering::Release);
    }

    /// View the published payload.
    ///
    /// # Safety
    /// The caller must have claimed the slot and observed `ready == true`;
    /// the slice must be dropped before the slot is released.
    pub(crate) unsafe fn payload(&self) -> &[u8] {
        let len = (self.len.load(Ordering::Relaxed) as usize).min(MAX_PAYLOAD);
        std::slice::from_raw_parts(self.body.get() as *const u8, len)
    }

    /// Hand the slot back to the producer.
    pub(crate) fn release(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_sizes() {
        // Cross-process compatibility depends on these staying put.
        assert_eq!(SLOT_SIZE, 256);
        assert_eq!(MAX_PAYLOAD, 254);
        assert_eq!(std::mem::offset_of!(SegmentHeader, consumer_id), 4);
        assert_eq!(std::mem::offset_of!(SegmentHeader, control), 8);
        assert_eq!(std::mem::offset_of!(Slot, len), 1);
    }

    #[test]
    fn test_region_size() {
        assert_eq!(region_size(0), Some(SLOT_SIZE));
        assert_eq!(region_size(4), Some(5 * SLOT_SIZE));
        assert_eq!(slot_offset(0), SLOT_SIZE);
        assert_eq!(slot_offset(3), 4 * SLOT_SIZE);
    }

    #[test]
    fn test_region_size_overflow() {
        assert_eq!(region_size(usize::MAX / SLOT_SIZE), None);
        assert_eq!(region_size(usize::MAX), None);
        assert!(region_size(usize::MAX / SLOT_SIZE - 1).is_some());
    }
}
