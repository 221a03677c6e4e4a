//! Analytics events for test runs and their delivery.
//!
//! Delivery is fire-and-forget: sinks never report failures back to the
//! reconciler.

pub mod sink;
pub mod testing;

pub use sink::{EventSink, LogSink, MemorySink, SegmentSink};
pub use testing::{TestingEvent, TrackedEvent};
