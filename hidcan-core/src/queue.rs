//! Bounded FIFO of input events.

use heapless::Deque;
use hidcan_proto::InputEvent;

/// Default event queue capacity.
pub const EVENT_QUEUE_SIZE: usize = 32;

/// Fixed-capacity event FIFO.
///
/// When full, `push` drops the oldest event to make room: fresh input wins
/// over stale input.
pub struct EventQueue<const N: usize = EVENT_QUEUE_SIZE> {
    events: Deque<InputEvent, N>,
    evicted: u32,
}

impl<const N: usize> EventQueue<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            evicted: 0,
        }
    }

    /// Append an event. Returns `true` if the oldest event was evicted.
    pub fn push(&mut self, event: InputEvent) -> bool {
        let mut evicted = false;
        if self.events.is_full() {
            self.events.pop_front();
            self.evicted = self.evicted.wrapping_add(1);
            evicted = true;
        }
        // Cannot fail: a slot was freed above if needed.
        let _ = self.events.push_back(event);
        evicted
    }

    #[inline]
    pub fn pop(&mut self) -> Option<InputEvent> {
        self.events.pop_front()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Events dropped to overflow since creation.
    #[inline]
    #[must_use]
    pub fn evicted(&self) -> u32 {
        self.evicted
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}
