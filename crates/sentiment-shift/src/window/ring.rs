/// Fixed-capacity FIFO of scores.
///
/// Pushing into a full ring evicts the oldest entry and hands it back.
#[derive(Clone, Debug)]
pub struct ScoreRing {
    slots: Vec<f64>,
    capacity: usize,
    head: usize,
}

impl ScoreRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            head: 0,
        }
    }

    /// Append a score, returning the evicted one when the ring was full.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        if self.slots.len() < self.capacity {
            self.slots.push(value);
            return None;
        }
        let evicted = std::mem::replace(&mut self.slots[self.head], value);
        self.head = (self.head + 1) % self.capacity;
        Some(evicted)
    }

    /// Scores oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = f64> + '_ {
        let (newer, older) = self.slots.split_at(self.head);
        older.iter().chain(newer.iter()).copied()
    }

    /// The `n`-th most recent score (`0` is the newest).
    pub fn nth_back(&self, n: usize) -> Option<f64> {
        self.iter().rev().nth(n)
    }

    pub fn last(&self) -> Option<f64> {
        self.nth_back(0)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Arithmetic mean, `0.0` when empty.
    pub fn mean(&self) -> f64 {
        if self.slots.is_empty() {
            return 0.0;
        }
        self.slots.iter().sum::<f64>() / self.slots.len() as f64
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }
}
