pub mod fifo_drop_oldest_queue;
pub mod isolated_forwarder;
pub mod latest1_queue;

pub use fifo_drop_oldest_queue::*;
pub use isolated_forwarder::*;
pub use latest1_queue::*;

/// How a subscriber's inbox for one event type behaves under pressure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKind {
    /// Keep only the newest event.
    Latest1,
    /// Keep the newest `capacity` events.
    FifoDropOldest { capacity: usize },
    /// Dedicated channel, refuses events when full.
    Isolated { output_buffer: usize },
}
