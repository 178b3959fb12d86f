//! Producer engine
//!
//! Claims a slot by advancing the tail in the control word, overwriting the
//! oldest record when the buffer is full, then publishes the payload through
//! the slot's `ready` flag.
//!
//! There is exactly one writer per segment: writing takes `&mut self`, so
//! threads sharing a producer serialize through their own lock.

use crate::backoff::Backoff;
use crate::config::ProducerConfig;
use crate::control::{HeadTail, Index};
use crate::layout::MAX_PAYLOAD;
use crate::liveness::{current_identity, Liveness, SignalProbe};
use crate::segment::{Segment, SegmentInfo, SegmentView};
use crate::Result;
use std::fmt;
use std::sync::atomic::Ordering;
use tracing::{debug, warn};

/// Writing side of a segment, created by the process that owns it
pub struct Producer<L = SignalProbe> {
    segment: Segment,
    config: ProducerConfig,
    liveness: L,
}

impl Producer<SignalProbe> {
    /// Create the segment and start producing
    pub fn create(config: ProducerConfig) -> Result<Self> {
        Self::with_liveness(config, SignalProbe)
    }
}

impl<L: Liveness> Producer<L> {
    /// Create the segment, probing consumer liveness with `liveness`
    pub fn with_liveness(config: ProducerConfig, liveness: L) -> Result<Self> {
        let identity = config.identity.unwrap_or_else(current_identity);
        if config.remove_stale {
            Segment::unlink(identity)?;
        }
        let segment = Segment::create(identity, config.capacity)?;
        Ok(Self {
            segment,
            config,
            liveness,
        })
    }

    /// Identity consumers attach with
    pub fn identity(&self) -> i32 {
        self.segment.identity()
    }

    pub fn capacity(&self) -> usize {
        self.segment.capacity()
    }

    /// Payloads longer than this are truncated
    pub fn max_payload(&self) -> usize {
        MAX_PAYLOAD
    }

    pub fn is_initialized(&self) -> bool {
        self.segment.is_attached()
    }

    pub fn info(&self) -> Result<SegmentInfo> {
        self.segment.info()
    }

    /// Append one record, truncated to [`MAX_PAYLOAD`] bytes.
    ///
    /// When the buffer is full and a live consumer is registered, waits with
    /// backoff for it to drain; once the retries run out, or if no live
    /// consumer is registered, the oldest record is overwritten.
    ///
    /// Returns the number of bytes stored.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize> {
        let view = self.segment.view()?;
        let body = &payload[..payload.len().min(MAX_PAYLOAD)];
        let capacity = view.capacity;

        let (claimed, dropped) = self.claim(&view, capacity);

        if dropped {
            // The oldest record was never claimed by a consumer, its slot is
            // the one about to be written.
            view.slot(claimed.head).release();
        }

        let slot = view.slot(claimed.tail);
        slot.wait_free();
        // Safety: the tail index was claimed by the CAS above, the slot was
        // observed free and no other writer exists.
        unsafe { slot.publish(body) };

        Ok(body.len())
    }

    /// Format locally, then [`write`](Self::write) the text.
    pub fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> Result<usize> {
        match args.as_str() {
            Some(text) => self.write(text.as_bytes()),
            None => self.write(args.to_string().as_bytes()),
        }
    }

    /// Advance the tail by one. Returns the observed head/tail (the tail is
    /// the claimed index) and whether the oldest record was dropped.
    fn claim(&self, view: &SegmentView<'_>, capacity: Index) -> (HeadTail, bool) {
        let control = view.control();
        let mut backoff = Backoff::new(self.config.backoff);
        let mut current = control.load(Ordering::Acquire);

        loop {
            let observed = HeadTail::from_word(current);
            view.check(observed);

            let mut next = HeadTail::new(observed.head, observed.tail + 1);
            let full = next.len() > capacity;
            if full {
                let consumer = view.header.consumer_id.load(Ordering::Acquire);
                if consumer > 0 && !backoff.is_exhausted() && self.liveness.is_alive(consumer) {
                    backoff.snooze(None);
                    current = control.load(Ordering::Acquire);
                    continue;
                }
                if consumer > 0 {
                    self.clear_consumer(view, consumer, backoff.retries());
                }
                next.head += 1;
            }
            let next = next.rebased(capacity);

            match control.compare_exchange_weak(
                current,
                next.to_word(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return (observed, full),
                Err(actual) => current = actual,
            }
        }
    }

    /// Drop a registration that no longer drains the buffer.
    fn clear_consumer(&self, view: &SegmentView<'_>, consumer: i32, waited: u32) {
        let cleared = view
            .header
            .consumer_id
            .compare_exchange(consumer, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cleared {
            if waited > 0 {
                warn!(consumer, retries = waited, "consumer not draining, clearing registration");
            } else {
                warn!(consumer, "registered consumer is gone, clearing registration");
            }
        }
    }

    /// Unmap and unlink the segment. Later writes fail with
    /// [`Error::NotInitialized`](crate::Error::NotInitialized).
    pub fn shutdown(&mut self) {
        if self.segment.is_attached() {
            debug!(identity = self.identity(), "producer shutting down");
        }
        self.segment.destroy();
    }
}
