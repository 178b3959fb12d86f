//! Consumer engine
//!
//! Claims the oldest unread record by advancing the head in the control word,
//! reports how many records were overwritten since the previous read, then
//! reads the slot once the producer has published it.

use crate::backoff::Backoff;
use crate::config::ConsumerConfig;
use crate::control::{head_advance, HeadTail, Index};
use crate::guard::SlotGuard;
use crate::liveness::current_identity;
use crate::segment::{Segment, SegmentInfo};
use crate::storage::{AccessMode, ConsumerMode};
use crate::{Error, Result};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::debug;

/// Result of a copying read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOutcome {
    /// Bytes copied into the caller's buffer
    pub len: usize,
    /// Records overwritten before this consumer could read them, since its previous read.
    /// Exact while fewer than [`rebase_step`](crate::control::rebase_step) records
    /// were written in between.
    pub lost: usize,
}

/// Reading side of a segment
pub struct Consumer {
    segment: Segment,
    config: ConsumerConfig,
    identity: i32,
    last_head: Index,
    remaining: usize,
}

impl Consumer {
    /// Attach to the segment of `producer_identity`.
    ///
    /// In [`ConsumerMode::Blocking`] the consumer registers itself if nobody
    /// else is registered.
    pub fn attach(producer_identity: i32, config: ConsumerConfig) -> Result<Self> {
        let segment = Segment::attach(producer_identity, AccessMode::ReadWrite)?;
        let current = segment.view()?.load();

        let consumer = Self {
            segment,
            identity: config.identity.unwrap_or_else(current_identity),
            config,
            last_head: current.head,
            remaining: current.len() as usize,
        };
        consumer.register();
        Ok(consumer)
    }

    /// Identity used for registration
    pub fn identity(&self) -> i32 {
        self.identity
    }

    pub fn producer_identity(&self) -> i32 {
        self.segment.identity()
    }

    pub fn mode(&self) -> ConsumerMode {
        self.config.mode
    }

    pub fn capacity(&self) -> usize {
        self.segment.capacity()
    }

    /// Records still queued after the last claim
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn info(&self) -> Result<SegmentInfo> {
        self.segment.info()
    }

    /// Whether this consumer currently holds the registration
    pub fn is_registered(&self) -> bool {
        self.segment
            .view()
            .map(|view| view.header.consumer_id.load(Ordering::Acquire) == self.identity)
            .unwrap_or(false)
    }

    /// Take the registration if it is free. Best effort, never required for
    /// correctness.
    fn register(&self) {
        if self.config.mode != ConsumerMode::Blocking {
            return;
        }
        if let Ok(view) = self.segment.writable_view() {
            let _ = view.header.consumer_id.compare_exchange(
                0,
                self.identity,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    fn unregister(&self) {
        if let Ok(view) = self.segment.writable_view() {
            let _ = view.header.consumer_id.compare_exchange(
                self.identity,
                0,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
        }
    }

    /// Copy the oldest unread record into `buf`, truncating to `buf.len()`.
    ///
    /// `timeout` of `None` waits forever; `Some(Duration::ZERO)` polls once.
    pub fn read(&mut self, buf: &mut [u8], timeout: Option<Duration>) -> Result<ReadOutcome> {
        let (index, lost) = self.claim(timeout)?;

        let view = self.segment.view()?;
        let slot = view.slot(index);
        // Safety: claimed and observed ready by `claim`.
        let payload = unsafe { slot.payload() };
        let len = payload.len().min(buf.len());
        buf[..len].copy_from_slice(&payload[..len]);
        slot.release();

        Ok(ReadOutcome { len, lost })
    }

    /// Claim the oldest unread record and read it in place.
    ///
    /// The slot stays unavailable to the producer until the guard is released.
    pub fn zero_copy_read(&mut self, timeout: Option<Duration>) -> Result<SlotGuard<'_>> {
        let (index, lost) = self.claim(timeout)?;

        let view = self.segment.view()?;
        let slot_id = (index % view.capacity) as usize;
        Ok(SlotGuard::new(view.slot_at(slot_id), slot_id, lost))
    }

    /// Release a slot kept by [`SlotGuard::forget`].
    pub fn release(&self, slot_id: usize) -> Result<()> {
        let view = self.segment.writable_view()?;
        if slot_id >= self.segment.capacity() {
            return Err(Error::SlotNotFound(slot_id));
        }
        view.slot_at(slot_id).release();
        Ok(())
    }

    /// Advance the head past the oldest record and wait until it is published.
    ///
    /// Returns the claimed logical index and the lost count.
    fn claim(&mut self, timeout: Option<Duration>) -> Result<(Index, usize)> {
        self.register();

        let view = self.segment.writable_view()?;
        let control = view.control();
        let started = Instant::now();
        let mut backoff = Backoff::new(self.config.backoff);
        let mut current = control.load(Ordering::Acquire);

        let (observed, next) = loop {
            let observed = HeadTail::from_word(current);
            view.check(observed);

            if observed.is_empty() {
                let limit = match timeout {
                    Some(timeout) => {
                        let elapsed = started.elapsed();
                        if elapsed >= timeout {
                            return Err(Error::Timeout);
                        }
                        Some(timeout - elapsed)
                    }
                    None => None,
                };
                backoff.snooze(limit);
                current = control.load(Ordering::Acquire);
                continue;
            }
            backoff.reset();

            let next = HeadTail::new(observed.head + 1, observed.tail).rebased(view.capacity);
            match control.compare_exchange_weak(
                current,
                next.to_word(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break (observed, next),
                Err(actual) => current = actual,
            }
        };

        let lost = head_advance(self.last_head, observed.head, view.capacity) as usize;
        self.last_head = next.head;
        self.remaining = next.len() as usize;

        view.slot(observed.head).wait_ready();
        Ok((observed.head, lost))
    }

    /// Unregister and unmap. Dropping the consumer does the same.
    pub fn detach(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if !self.segment.is_attached() {
            return;
        }
        if self.config.mode == ConsumerMode::Blocking {
            self.unregister();
        }
        debug!(
            producer = self.segment.identity(),
            consumer = self.identity,
            "consumer detaching"
        );
        self.segment.destroy();
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.close();
    }
}
