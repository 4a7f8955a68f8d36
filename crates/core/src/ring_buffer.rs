use std::collections::VecDeque;

/// Fixed-capacity FIFO that evicts the oldest item once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
    total_pushed: u64,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity.min(1024)),
            total_pushed: 0,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[must_use]
    pub fn total_pushed(&self) -> u64 {
        self.total_pushed
    }

    #[must_use]
    pub fn evicted(&self) -> u64 {
        self.total_pushed.saturating_sub(self.items.len() as u64)
    }

    /// Appends `item`, returning the entry evicted to make room for it.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() == self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        self.total_pushed += 1;
        evicted
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    #[must_use]
    pub fn window(&self, start: usize, limit: usize) -> Vec<&T> {
        if limit == 0 || start >= self.items.len() {
            return Vec::new();
        }

        let end = (start + limit).min(self.items.len());
        self.items.iter().skip(start).take(end - start).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}

impl<T: Clone> RingBuffer<T> {
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}
