//! Attachment access modes

/// How a process maps an existing segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Pure observer: may inspect the header, never consume or register
    ReadOnly,
    /// Consumer: may claim records and register for backpressure
    ReadWrite,
}

/// Whether a consumer registers itself with the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConsumerMode {
    /// Register as the segment's consumer. A full buffer then makes the
    /// producer wait briefly before overwriting, so fewer records are lost at
    /// the cost of write latency.
    Blocking,
    /// Never register; the producer overwrites immediately when full.
    #[default]
    NonBlocking,
}
