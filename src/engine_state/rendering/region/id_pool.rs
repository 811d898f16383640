//! Small integer ids that are reused as soon as they are freed.

use bitvec::prelude::BitVec;

/// Hands out the smallest id not currently in use.
#[derive(Debug, Default)]
pub struct IdPool {
    used: BitVec,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&mut self) -> usize {
        match self.used.first_zero() {
            Some(id) => {
                self.used.set(id, true);
                id
            }
            None => {
                self.used.push(true);
                self.used.len() - 1
            }
        }
    }

    /// # Panics
    /// Panics if `id` is not in use.
    pub fn free(&mut self, id: usize) {
        assert!(
            id < self.used.len() && self.used[id],
            "Id {} is not allocated",
            id
        );

        self.used.set(id, false);
    }

    /// Number of ids that have ever been needed at once; the size a table indexed by id
    /// must have.
    pub fn capacity(&self) -> usize {
        self.used.len()
    }

    pub fn in_use(&self) -> usize {
        self.used.count_ones()
    }
}
