//! Player-scoped global quest variables.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;

/// Integer variables shared by every quest of one player. Absent keys read as 0.
///
/// Read-modify-write operations lock the key's shard for their duration, so an
/// increment can never interleave with another update of the same key.
#[derive(Debug, Clone, Default)]
pub struct GlobalVariableStore {
    values: Arc<DashMap<u32, i32>>,
}

impl GlobalVariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: u32) -> i32 {
        self.values.get(&id).map(|v| *v).unwrap_or(0)
    }

    pub fn set(&self, id: u32, value: i32) {
        self.values.insert(id, value);
    }

    /// Add `delta` and return the new value
    pub fn increment(&self, id: u32, delta: i32) -> i32 {
        let mut entry = self.values.entry(id).or_insert(0);
        *entry = entry.saturating_add(delta);
        *entry
    }

    /// Subtract a positive `amount` and return the new value
    pub fn decrement(&self, id: u32, amount: i32) -> i32 {
        let mut entry = self.values.entry(id).or_insert(0);
        *entry = entry.saturating_sub(amount);
        *entry
    }

    pub fn snapshot(&self) -> HashMap<u32, i32> {
        self.values.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    pub fn replace_all(&self, values: HashMap<u32, i32>) {
        self.values.clear();
        for (id, value) in values {
            self.values.insert(id, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_reads_zero_and_increments_accumulate() {
        let store = GlobalVariableStore::new();
        assert_eq!(store.get(7), 0);
        assert_eq!(store.increment(7, 3), 3);
        assert_eq!(store.increment(7, 4), 7);
        assert_eq!(store.get(7), 7);
    }

    #[test]
    fn test_decrement_takes_positive_amount() {
        let store = GlobalVariableStore::new();
        store.set(2, 10);
        assert_eq!(store.decrement(2, 4), 6);
        assert_eq!(store.decrement(9, 1), -1);
    }

    #[test]
    fn test_concurrent_increments_are_atomic() {
        let store = GlobalVariableStore::new();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        store.increment(1, 1);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.get(1), 8000);
    }

    #[test]
    fn test_replace_all() {
        let store = GlobalVariableStore::new();
        store.set(1, 1);
        store.replace_all(HashMap::from([(2, 5)]));
        assert_eq!(store.get(1), 0);
        assert_eq!(store.snapshot(), HashMap::from([(2, 5)]));
    }
}
