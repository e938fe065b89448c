use crate::{Serial, SerialQueue};

/// State tracker for a fixed-capacity circular buffer whose allocations are
/// retired in serial order
///
/// Offsets are handed out from a bounded ring and reclaimed once the caller
/// reports, via [`reclaim`](RingAlloc::reclaim), that the work using them has
/// completed. The allocator is pure bookkeeping: it never touches memory, and
/// the returned offsets index an externally-owned buffer of
/// [`capacity`](RingAlloc::capacity) bytes.
///
/// Space is only ever recovered from the oldest live allocation forward, so
/// retaining any allocation indefinitely will eventually block the whole
/// ring.
pub struct RingAlloc {
    inflight: SerialQueue<Request>,
    /// Offset one past the most recently allocated byte
    used_end: u64,
    /// Offset of the oldest live allocation
    used_start: u64,
    /// Bytes accounted as live, alignment padding and skipped tails included
    used: u64,
    capacity: u64,
}

struct Request {
    /// Value of `used_end` immediately after this allocation was made;
    /// reclaiming the request rolls `used_start` forward to here
    end_offset: u64,
    /// Bytes charged against the ring for this request
    size: u64,
}

impl RingAlloc {
    pub fn new(capacity: u64) -> Self {
        Self {
            inflight: SerialQueue::new(),
            used_end: 0,
            used_start: 0,
            used: 0,
            capacity,
        }
    }

    /// Total size of the ring in bytes
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes currently accounted as live, padding and wraparound waste
    /// included
    #[inline]
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Bytes not currently accounted as live
    ///
    /// An upper bound on the largest satisfiable request; an allocation of
    /// this size can still fail if the free span is interrupted by the end of
    /// the buffer.
    #[inline]
    pub fn available(&self) -> u64 {
        self.capacity - self.used
    }

    /// Whether no allocations are awaiting reclaim
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    /// Returns the starting offset of a run of `size` bytes positioned at a
    /// multiple of `align`, or `None` if the ring cannot currently satisfy
    /// the request
    ///
    /// The run stays reserved until [`reclaim`](RingAlloc::reclaim) is called
    /// with a serial at or past `serial`. Serials must be non-decreasing
    /// across calls so that allocation order matches reclaim order, and
    /// `align` must be a nonzero power of two.
    pub fn alloc(&mut self, size: u64, align: u64, serial: Serial) -> Option<u64> {
        debug_assert!(align.is_power_of_two(), "alignment must be a power of two");
        // Conservative: charged waste from earlier wraps counts against the
        // remaining capacity. Also guards the arithmetic below from overflow.
        if self.used >= self.capacity || size > self.capacity - self.used {
            return None;
        }

        // First aligned position at or after the append cursor
        let aligned_end = align_up(self.used_end, align);
        let padding = aligned_end - self.used_end;

        let (start, charged) = if self.used_start <= self.used_end {
            // Not split. Try the end first; allocating at the front while the
            // end still has room would break the match between allocation
            // order and reclaim order.
            if aligned_end + size <= self.capacity {
                (aligned_end, size + padding)
            } else if size <= self.used_start {
                // Wrap to the front, charging the skipped tail to this
                // request. The ring then reads as full until the request is
                // reclaimed, and reclaiming it frees the tail as well.
                (0, (self.capacity - self.used_end) + size)
            } else {
                return None;
            }
        } else if aligned_end + size <= self.used_start {
            // Split. The only free span lies between the two cursors.
            (aligned_end, size + padding)
        } else {
            return None;
        };

        self.used_end = start + size;
        self.used += charged;
        self.inflight.enqueue(
            Request {
                end_offset: self.used_end,
                size: charged,
            },
            serial,
        );
        Some(start)
    }

    /// Free every allocation tagged with a serial at or before `completed`,
    /// returning whether any storage was recovered
    ///
    /// The caller asserts that all work up to and including `completed` has
    /// finished with its byte ranges. Serials that were never allocated
    /// against, or whose requests were already reclaimed, are a no-op.
    pub fn reclaim(&mut self, completed: Serial) -> bool {
        let mut any = false;
        for (_, request) in self.inflight.drain_up_to(completed) {
            // Requests drain oldest-first, so the newest reclaimed one wins
            self.used_start = request.end_offset;
            self.used -= request.size;
            any = true;
        }
        any
    }
}

impl Default for RingAlloc {
    /// A zero-capacity ring that refuses every allocation
    fn default() -> Self {
        Self::new(0)
    }
}

fn align_up(x: u64, align: u64) -> u64 {
    (x + align - 1) & !(align - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn serial(x: u64) -> Serial {
        Serial::new(x)
    }

    #[test]
    fn fills_then_wraps() {
        let mut r = RingAlloc::new(100);
        assert_eq!(r.alloc(40, 1, serial(1)), Some(0));
        assert_eq!(r.used(), 40);
        assert_eq!(r.alloc(40, 1, serial(2)), Some(40));
        assert_eq!(r.used(), 80);
        // Only 20 bytes remain
        assert_eq!(r.alloc(40, 1, serial(3)), None);
        assert_eq!(r.used(), 80);

        assert!(r.reclaim(serial(1)));
        assert_eq!(r.used(), 40);

        // Does not fit at the end, so it wraps to the front; the 20 byte tail
        // is charged to the request
        assert_eq!(r.alloc(40, 1, serial(3)), Some(0));
        assert_eq!(r.used(), 100);
        assert_eq!(r.available(), 0);
        assert_eq!(r.alloc(1, 1, serial(4)), None);

        assert!(r.reclaim(serial(3)));
        assert_eq!(r.used(), 0);
        assert!(r.is_empty());
    }

    #[test]
    fn reclaim_stops_at_cutoff() {
        let mut r = RingAlloc::new(64);
        assert_eq!(r.alloc(16, 1, serial(1)), Some(0));
        assert_eq!(r.alloc(16, 1, serial(2)), Some(16));
        assert_eq!(r.alloc(16, 1, serial(3)), Some(32));
        assert!(r.reclaim(serial(2)));
        assert_eq!(r.used(), 16);
        assert!(!r.is_empty());
        assert!(r.reclaim(serial(3)));
        assert!(r.is_empty());
    }

    #[test]
    fn reclaim_is_idempotent() {
        let mut r = RingAlloc::new(32);
        assert_eq!(r.alloc(8, 1, serial(1)), Some(0));
        assert!(r.reclaim(serial(1)));
        assert!(!r.reclaim(serial(1)));
        assert_eq!(r.used(), 0);
        // Serials nothing was allocated against are also a no-op
        assert!(!r.reclaim(serial(9)));
    }

    #[test]
    fn zero_capacity_refuses() {
        let mut r = RingAlloc::default();
        assert_eq!(r.capacity(), 0);
        assert_eq!(r.alloc(1, 1, serial(1)), None);
        assert!(r.is_empty());
    }

    #[test]
    fn alignment_pads_the_cursor() {
        let mut r = RingAlloc::new(16);
        assert_eq!(r.alloc(3, 1, serial(1)), Some(0));
        // Cursor sits at 3; padding to 4 is charged along with the request
        assert_eq!(r.alloc(2, 4, serial(2)), Some(4));
        assert_eq!(r.used(), 6);
        assert!(r.reclaim(serial(2)));
        assert_eq!(r.used(), 0);
    }

    #[test]
    fn allocates_into_split_span() {
        let mut r = RingAlloc::new(8);
        assert_eq!(r.alloc(5, 1, serial(1)), Some(0));
        assert_eq!(r.alloc(2, 1, serial(2)), Some(5));
        assert!(r.reclaim(serial(1)));
        // Wraps past the one-byte tail, charging it
        assert_eq!(r.alloc(3, 1, serial(3)), Some(0));
        assert_eq!(r.used(), 6);
        // Used span now straddles the boundary; the free span is [3, 5)
        assert_eq!(r.alloc(2, 1, serial(4)), Some(3));
        assert_eq!(r.used(), 8);
        assert_eq!(r.alloc(1, 1, serial(5)), None);
        assert!(r.reclaim(serial(3)));
        assert_eq!(r.used(), 2);
        assert!(r.reclaim(serial(5)));
        assert!(r.is_empty());
        assert_eq!(r.used(), 0);
    }

    proptest! {
        /// Random allocate/reclaim interleavings keep accounting within
        /// capacity, honor alignment, and never hand out overlapping ranges
        #[test]
        fn random_interleavings_stay_consistent(
            ops in proptest::collection::vec((1u64..48, 0u32..4, any::<bool>()), 1..64),
        ) {
            const CAPACITY: u64 = 64;
            let mut r = RingAlloc::new(CAPACITY);
            let mut next = Serial::new(1);
            // Outstanding (serial, offset, size) triples
            let mut live: Vec<(Serial, u64, u64)> = Vec::new();
            for (size, align_log, retire) in ops {
                if retire {
                    if let Some(&(oldest, _, _)) = live.first() {
                        r.reclaim(oldest);
                        live.retain(|&(s, _, _)| s > oldest);
                    }
                } else {
                    let align = 1u64 << align_log;
                    let serial = next;
                    next = next.next();
                    if let Some(offset) = r.alloc(size, align, serial) {
                        prop_assert_eq!(offset % align, 0);
                        prop_assert!(offset + size <= CAPACITY);
                        for &(_, o, s) in &live {
                            prop_assert!(offset + size <= o || o + s <= offset);
                        }
                        live.push((serial, offset, size));
                    }
                }
                prop_assert!(r.used() <= r.capacity());
            }
            // Completing all outstanding work returns the ring to empty
            r.reclaim(next);
            prop_assert!(r.is_empty());
            prop_assert_eq!(r.used(), 0);
        }
    }
}
