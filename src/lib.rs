//! Bookkeeping for sub-allocating streaming GPU uploads
//!
//! These allocators track byte ranges, not memory: each hands out offsets
//! into an externally-owned buffer and recovers them once the caller reports
//! that the work consuming them, identified by a monotonically increasing
//! [`Serial`], has completed. Pair them with whatever owns the actual
//! buffers; nothing here depends on a particular GPU API.

pub mod ring_pool;

mod ring_alloc;
mod serial;
mod serial_queue;

pub use ring_alloc::RingAlloc;
pub use ring_pool::{PoolAlloc, RingId, RingPool, TooLarge};
pub use serial::Serial;
pub use serial_queue::SerialQueue;
