//! First-fit pooling of serial-tracked rings
//!
//! Mirrors how a streaming uploader manages its staging memory: each ring
//! corresponds to one externally-owned backing buffer, the pool grows when
//! every live ring is full, and rings that drain empty are retired so their
//! buffers can be released.

use log::{debug, trace};
use thiserror::Error;

use crate::{RingAlloc, Serial};

/// A growable set of fixed-size rings serviced first-fit
///
/// Rings are identified by a [`RingId`] that stays stable for the ring's
/// whole lifetime, letting the caller bind each one to a backing buffer it
/// owns. The serial contract is that of [`RingAlloc::alloc`], applied
/// pool-wide.
pub struct RingPool {
    rings: Vec<PoolRing>,
    ring_capacity: u64,
    next_id: u64,
}

struct PoolRing {
    id: RingId,
    allocator: RingAlloc,
}

/// Stable identity of one ring within a [`RingPool`]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RingId(u64);

/// A sub-allocation served by a [`RingPool`]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PoolAlloc {
    /// Ring the range was reserved from
    pub ring: RingId,
    /// Offset of the range within that ring's backing buffer
    pub offset: u64,
}

/// Error returned for requests no pool ring could ever hold
///
/// Such requests should be serviced by a dedicated buffer rather than the
/// pool.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("allocation of {size} bytes exceeds the ring capacity of {capacity}")]
pub struct TooLarge {
    pub size: u64,
    pub capacity: u64,
}

impl RingPool {
    /// Create a pool whose rings each span `ring_capacity` bytes
    pub fn new(ring_capacity: u64) -> Self {
        let mut pool = Self {
            rings: Vec::new(),
            ring_capacity,
            next_id: 0,
        };
        pool.grow();
        pool
    }

    /// Size of each ring in bytes
    #[inline]
    pub fn ring_capacity(&self) -> u64 {
        self.ring_capacity
    }

    /// Number of live rings
    #[inline]
    pub fn ring_count(&self) -> usize {
        self.rings.len()
    }

    /// Combined capacity of all live rings
    pub fn total_capacity(&self) -> u64 {
        self.rings
            .iter()
            .map(|ring| ring.allocator.capacity())
            .sum()
    }

    /// Combined live bytes across all rings
    pub fn used(&self) -> u64 {
        self.rings.iter().map(|ring| ring.allocator.used()).sum()
    }

    /// Whether no ring has allocations awaiting reclaim
    pub fn is_empty(&self) -> bool {
        self.rings.iter().all(|ring| ring.allocator.is_empty())
    }

    /// Reserve `size` bytes at a multiple of `align` from the first ring with
    /// room, appending a fresh ring if none has
    pub fn alloc(&mut self, size: u64, align: u64, serial: Serial) -> Result<PoolAlloc, TooLarge> {
        if size > self.ring_capacity {
            return Err(TooLarge {
                size,
                capacity: self.ring_capacity,
            });
        }
        for ring in &mut self.rings {
            if let Some(offset) = ring.allocator.alloc(size, align, serial) {
                return Ok(PoolAlloc {
                    ring: ring.id,
                    offset,
                });
            }
        }
        let ring = self.grow();
        let offset = ring
            .allocator
            .alloc(size, align, serial)
            .expect("an empty ring has room for any request within its capacity");
        Ok(PoolAlloc {
            ring: ring.id,
            offset,
        })
    }

    /// Release every allocation tagged with a serial at or before
    /// `completed`, returning the ids of rings that drained empty and were
    /// retired
    ///
    /// The caller can release the buffers backing the returned ids; no
    /// further allocations will name them. The most recently created ring is
    /// always kept so steady-state load does not oscillate between releasing
    /// and recreating a buffer.
    pub fn reclaim(&mut self, completed: Serial) -> Vec<RingId> {
        for ring in &mut self.rings {
            ring.allocator.reclaim(completed);
        }
        let newest = self.rings.last().map(|ring| ring.id);
        let mut retired = Vec::new();
        self.rings.retain(|ring| {
            if ring.allocator.is_empty() && Some(ring.id) != newest {
                retired.push(ring.id);
                false
            } else {
                true
            }
        });
        if !retired.is_empty() {
            trace!("retired {} empty ring(s)", retired.len());
        }
        retired
    }

    fn grow(&mut self) -> &mut PoolRing {
        let id = RingId(self.next_id);
        self.next_id += 1;
        debug!("adding ring {:?} of {} bytes", id, self.ring_capacity);
        self.rings.push(PoolRing {
            id,
            allocator: RingAlloc::new(self.ring_capacity),
        });
        self.rings.last_mut().unwrap()
    }
}
