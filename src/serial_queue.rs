use std::collections::VecDeque;

use crate::Serial;

/// A FIFO of values keyed by the serial of the work that retires them
///
/// Values are enqueued in non-decreasing serial order and removed in bulk
/// once the caller learns that work up to some serial has completed. Any
/// number of values may share a serial.
pub struct SerialQueue<T> {
    /// One group per distinct serial, ordered by strictly increasing serial
    entries: VecDeque<(Serial, Vec<T>)>,
}

impl<T> SerialQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total number of queued values
    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, values)| values.len()).sum()
    }

    /// Serial of the oldest queued value
    pub fn first_serial(&self) -> Option<Serial> {
        self.entries.front().map(|&(serial, _)| serial)
    }

    /// Record `value` as retired by `serial`
    ///
    /// `serial` must be no less than the serial of every value already
    /// queued.
    pub fn enqueue(&mut self, value: T, serial: Serial) {
        if let Some(&mut (last, ref mut values)) = self.entries.back_mut() {
            debug_assert!(serial >= last, "serials must be enqueued in order");
            if last == serial {
                values.push(value);
                return;
            }
        }
        self.entries.push_back((serial, vec![value]));
    }

    /// Remove and yield every value with a serial at or before `completed`,
    /// oldest first
    ///
    /// Values in the drained range are removed even if the iterator is
    /// dropped before being exhausted. Serials that have already been drained
    /// yield nothing.
    pub fn drain_up_to(&mut self, completed: Serial) -> impl Iterator<Item = (Serial, T)> + '_ {
        let end = self
            .entries
            .partition_point(|&(serial, _)| serial <= completed);
        self.entries
            .drain(..end)
            .flat_map(|(serial, values)| values.into_iter().map(move |value| (serial, value)))
    }
}

impl<T> Default for SerialQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
