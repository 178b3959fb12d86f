//! shmlog - Lock-free cross-process log ring buffer
//!
//! A producer process creates a segment named after its process id and
//! appends small records without locks or syscalls on the hot path; any
//! process knowing that id can attach a [`Consumer`] and drain them.

pub mod backoff;
pub mod config;
pub mod consumer;
pub mod control;
pub mod error;
pub mod guard;
pub mod layout;
pub mod liveness;
pub mod producer;
pub mod segment;
pub mod shm;
pub mod storage;

pub use config::{BackoffConfig, ConsumerConfig, ProducerConfig};
pub use consumer::{Consumer, ReadOutcome};
pub use error::{Error, Result};
pub use guard::SlotGuard;
pub use layout::{DEFAULT_CAPACITY, MAX_PAYLOAD, SLOT_SIZE};
pub use liveness::{Liveness, SignalProbe};
pub use producer::Producer;
pub use segment::{inspect, segment_name, Segment, SegmentInfo};
pub use storage::{AccessMode, ConsumerMode};
