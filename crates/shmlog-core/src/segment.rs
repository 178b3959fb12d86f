//! Segment lifecycle: create, attach, destroy
//!
//! One segment per producer, named after the producer's identity so a
//! consumer only needs the identity to attach.

use crate::control::{AtomicWord, HeadTail, Index, MAX_CAPACITY};
use crate::layout::{region_size, slot_offset, SegmentHeader, Slot, SLOT_SIZE};
use crate::shm::SharedMemory;
use crate::storage::AccessMode;
use crate::{Error, Result};
use std::sync::atomic::{AtomicI32, Ordering};
use tracing::{debug, error};

/// Name prefix in the shared-memory namespace
pub const SEGMENT_PREFIX: &str = "/shmlog-";

/// Shared-memory name of the segment owned by `identity`
pub fn segment_name(identity: i32) -> String {
    format!("{}{}", SEGMENT_PREFIX, identity)
}

/// Point-in-time view of a segment's header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentInfo {
    pub identity: i32,
    pub name: String,
    /// Mapped region size in bytes
    pub size: usize,
    pub capacity: usize,
    /// Registered consumer, 0 if none
    pub consumer_id: i32,
    pub head: Index,
    pub tail: Index,
}

impl SegmentInfo {
    /// Records currently held
    pub fn len(&self) -> usize {
        self.tail.saturating_sub(self.head) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }
}

/// A mapped segment
pub struct Segment {
    shm: Option<SharedMemory>,
    identity: i32,
    capacity: usize,
    mode: AccessMode,
}

// Safety: every concurrently accessed field of the mapping is atomic, and slot
// bodies are only touched by whoever the slot's `ready` flag designates.
unsafe impl Send for Segment {}
unsafe impl Sync for Segment {}

impl Segment {
    /// Create and initialize the segment for `identity`.
    ///
    /// Fails with [`Error::AlreadyExists`] if the name is taken. The returned
    /// handle owns the name and unlinks it on [`destroy`](Self::destroy) or drop.
    pub fn create(identity: i32, capacity: usize) -> Result<Self> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(Error::InvalidCapacity {
                requested: capacity,
                max: MAX_CAPACITY,
            });
        }

        let size = region_size(capacity).ok_or(Error::InvalidCapacity {
            requested: capacity,
            max: MAX_CAPACITY,
        })?;

        let name = segment_name(identity);
        let mut shm = SharedMemory::create(&name, size)?;

        // Initialize header
        let base = shm.as_mut_ptr();
        let header = unsafe { &mut *(base as *mut SegmentHeader) };
        header.capacity = capacity as u32;
        header.consumer_id = AtomicI32::new(0);
        header.control = AtomicWord::new(0);

        for index in 0..capacity {
            let slot = unsafe { &*(base.add(slot_offset(index)) as *const Slot) };
            slot.len.store(0, Ordering::Relaxed);
            slot.ready.store(false, Ordering::Release);
        }

        debug!(name = %name, capacity, size = shm.size(), "created segment");

        Ok(Self {
            shm: Some(shm),
            identity,
            capacity,
            mode: AccessMode::ReadWrite,
        })
    }

    /// Map the existing segment of `identity`.
    ///
    /// Fails with [`Error::InvalidSegment`] if the region cannot hold the
    /// capacity its header declares.
    pub fn attach(identity: i32, mode: AccessMode) -> Result<Self> {
        let name = segment_name(identity);
        let shm = SharedMemory::open(&name)?;

        let size = shm.size();
        if size < SLOT_SIZE {
            return Err(Error::InvalidSegment(format!(
                "{}: {} bytes is smaller than the header",
                name, size
            )));
        }

        // Validate header
        let header = unsafe { &*(shm.as_ptr() as *const SegmentHeader) };
        let capacity = header.capacity as usize;
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(Error::InvalidSegment(format!(
                "{}: unsupported capacity {}",
                name, capacity
            )));
        }
        match region_size(capacity) {
            Some(needed) if needed <= size => {}
            needed => {
                return Err(Error::InvalidSegment(format!(
                    "{}: {} slots need {:?} bytes, region has {}",
                    name, capacity, needed, size
                )));
            }
        }

        debug!(name = %name, capacity, ?mode, "attached segment");

        Ok(Self {
            shm: Some(shm),
            identity,
            capacity,
            mode,
        })
    }

    /// Remove a leftover segment name for `identity`.
    ///
    /// Stale-segment cleanup calls this once it has decided the owner is gone.
    pub fn unlink(identity: i32) -> Result<()> {
        SharedMemory::unlink(&segment_name(identity))
    }

    /// Whether a segment for `identity` exists
    pub fn exists(identity: i32) -> bool {
        SharedMemory::exists(&segment_name(identity))
    }

    /// Unmap the segment, unlinking it too if this handle created it.
    ///
    /// Safe to call more than once.
    pub fn destroy(&mut self) {
        if let Some(shm) = self.shm.take() {
            debug!(name = shm.name(), owner = shm.is_owner(), "releasing segment");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.shm.is_some()
    }

    pub fn identity(&self) -> i32 {
        self.identity
    }

    pub fn name(&self) -> String {
        segment_name(self.identity)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    /// Snapshot of the header
    pub fn info(&self) -> Result<SegmentInfo> {
        let view = self.view()?;
        let ht = view.load();
        Ok(SegmentInfo {
            identity: self.identity,
            name: self.name(),
            size: view.size,
            capacity: self.capacity,
            consumer_id: view.header.consumer_id.load(Ordering::Acquire),
            head: ht.head,
            tail: ht.tail,
        })
    }

    pub(crate) fn view(&self) -> Result<SegmentView<'_>> {
        let shm = self.shm.as_ref().ok_or(Error::NotInitialized)?;
        let base = shm.as_ptr();
        Ok(SegmentView {
            header: unsafe { &*(base as *const SegmentHeader) },
            base,
            size: shm.size(),
            capacity: self.capacity as Index,
        })
    }

    pub(crate) fn writable_view(&self) -> Result<SegmentView<'_>> {
        if self.mode == AccessMode::ReadOnly {
            return Err(Error::ReadOnly);
        }
        self.view()
    }
}

/// Typed accessors over a mapped segment
pub(crate) struct SegmentView<'a> {
    pub header: &'a SegmentHeader,
    base: *const u8,
    size: usize,
    pub capacity: Index,
}

impl<'a> SegmentView<'a> {
    pub fn control(&self) -> &'a AtomicWord {
        &self.header.control
    }

    pub fn load(&self) -> HeadTail {
        HeadTail::from_word(self.header.control.load(Ordering::Acquire))
    }

    /// Slot holding logical index `index`
    pub fn slot(&self, index: Index) -> &'a Slot {
        self.slot_at((index % self.capacity) as usize)
    }

    /// Slot at physical position `position`
    pub fn slot_at(&self, position: usize) -> &'a Slot {
        debug_assert!(position < self.capacity as usize);
        unsafe { &*(self.base.add(slot_offset(position)) as *const Slot) }
    }

    /// `head > tail` leaves nothing to reason about: log and abort.
    pub fn check(&self, observed: HeadTail) {
        if observed.is_corrupt() {
            error!(
                head = observed.head,
                tail = observed.tail,
                "segment control word corrupted: head is past tail"
            );
            std::process::abort();
        }
    }
}

/// Header snapshot of the segment owned by `identity`, attached read-only
pub fn inspect(identity: i32) -> Result<SegmentInfo> {
    Segment::attach(identity, AccessMode::ReadOnly)?.info()
}

#[cfg(test)]
pub(crate) fn unique_identity() -> i32 {
    use std::sync::atomic::AtomicU32;
    static NEXT: AtomicU32 = AtomicU32::new(0);

    // Above any real pid, unique per test process.
    let n = NEXT.fetch_add(1, Ordering::Relaxed);
    let identity = (1 << 24) + ((std::process::id() % 100_000) * 1000 + n % 1000) as i32;
    Segment::unlink(identity).unwrap();
    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DEFAULT_CAPACITY;

    #[test]
    fn test_create_and_attach() {
        let identity = unique_identity();
        let producer = Segment::create(identity, 8).unwrap();
        assert!(Segment::exists(identity));

        let consumer = Segment::attach(identity, AccessMode::ReadWrite).unwrap();
        assert_eq!(consumer.capacity(), 8);

        let info = consumer.info().unwrap();
        assert_eq!(info.capacity, 8);
        assert_eq!(info.consumer_id, 0);
        assert_eq!((info.head, info.tail), (0, 0));
        assert!(info.size >= region_size(8).unwrap());
        assert!(info.is_empty());

        let view = producer.view().unwrap();
        for position in 0..8 {
            assert!(!view.slot_at(position).is_ready());
        }
    }

    #[test]
    fn test_create_twice_fails() {
        let identity = unique_identity();
        let _first = Segment::create(identity, 4).unwrap();
        let second = Segment::create(identity, 4);
        assert!(matches!(second, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn test_invalid_capacity() {
        let identity = unique_identity();
        assert!(matches!(
            Segment::create(identity, 0),
            Err(Error::InvalidCapacity { requested: 0, .. })
        ));
        assert!(matches!(
            Segment::create(identity, MAX_CAPACITY + 1),
            Err(Error::InvalidCapacity { .. })
        ));
        assert!(!Segment::exists(identity));
    }

    #[test]
    fn test_attach_missing_fails() {
        let identity = unique_identity();
        assert!(matches!(
            Segment::attach(identity, AccessMode::ReadOnly),
            Err(Error::SharedMemory(_))
        ));
    }

    #[test]
    fn test_attach_truncated_segment() {
        let identity = unique_identity();
        let name = segment_name(identity);

        // Header claims more slots than the region holds.
        let mut shm = SharedMemory::create(&name, region_size(2).unwrap()).unwrap();
        let header = unsafe { &mut *(shm.as_mut_ptr() as *mut SegmentHeader) };
        header.capacity = DEFAULT_CAPACITY as u32;

        let attached = Segment::attach(identity, AccessMode::ReadWrite);
        assert!(matches!(attached, Err(Error::InvalidSegment(_))));
    }

    #[test]
    fn test_destroy_is_idempotent() {
        let identity = unique_identity();
        let mut segment = Segment::create(identity, 4).unwrap();
        segment.destroy();
        segment.destroy();
        assert!(!segment.is_attached());
        assert!(matches!(segment.info(), Err(Error::NotInitialized)));
        assert!(!Segment::exists(identity));
    }

    #[test]
    fn test_segment_outlives_consumer() {
        let identity = unique_identity();
        let _producer = Segment::create(identity, 4).unwrap();
        let mut consumer = Segment::attach(identity, AccessMode::ReadWrite).unwrap();
        consumer.destroy();
        assert!(Segment::exists(identity));
        assert!(inspect(identity).is_ok());
    }

    #[test]
    fn test_read_only_is_not_writable() {
        let identity = unique_identity();
        let _producer = Segment::create(identity, 4).unwrap();
        let observer = Segment::attach(identity, AccessMode::ReadOnly).unwrap();
        assert!(matches!(observer.writable_view(), Err(Error::ReadOnly)));
        assert!(observer.view().is_ok());
    }

    #[test]
    fn test_unlink_missing_is_ok() {
        let identity = unique_identity();
        assert!(Segment::unlink(identity).is_ok());
    }
}
