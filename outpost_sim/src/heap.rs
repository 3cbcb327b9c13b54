// Indexable binary min-heap.
//
// `std::collections::BinaryHeap` cannot reprioritize an element it already
// holds, so A* would have to push duplicates and skip stale entries. This
// heap tracks every element's slot in a key → index map, which gives O(1)
// `contains` and O(log n) `update` (decrease-key or increase-key) from the
// element's current slot.
//
// Ordering is the element's `Ord`: the smallest element pops first. Elements
// must break ties themselves (secondary key, then identity) so the order is
// total and pops are deterministic.
//
// Invariant, after every public mutation: for each slot `i`,
// `index[items[i].heap_key()] == i`, and `items[parent(i)] <= items[i]`.
//
// See also: `pathfinding.rs`, whose open set is an `IndexedHeap<OpenNode>`.

use crate::error::EmptyQueueError;
use rustc_hash::FxHashMap;
use std::hash::Hash;

/// An element that can live in an `IndexedHeap`.
pub trait HeapItem: Ord {
    /// Stable identity of the element, independent of its priority.
    type Key: Copy + Eq + Hash;

    fn heap_key(&self) -> Self::Key;
}

/// Binary min-heap with a tracked index per element.
#[derive(Clone, Debug)]
pub struct IndexedHeap<T: HeapItem> {
    items: Vec<T>,
    index: FxHashMap<T::Key, usize>,
}

impl<T: HeapItem> Default for IndexedHeap<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: FxHashMap::default(),
        }
    }
}

impl<T: HeapItem> IndexedHeap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            index: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
        self.index.clear();
    }

    pub fn contains(&self, key: &T::Key) -> bool {
        self.index.contains_key(key)
    }

    /// Current element for `key`, if present.
    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.index.get(key).map(|&i| &self.items[i])
    }

    /// The minimum element without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.items.first()
    }

    /// Insert an element. If an element with the same key is already
    /// present it is replaced and re-sifted, so a key is never stored twice.
    pub fn insert(&mut self, item: T) {
        if self.index.contains_key(&item.heap_key()) {
            self.update(item);
            return;
        }
        let slot = self.items.len();
        self.index.insert(item.heap_key(), slot);
        self.items.push(item);
        self.sift_up(slot);
    }

    /// Remove and return the minimum element.
    pub fn pop_min(&mut self) -> Result<T, EmptyQueueError> {
        if self.items.is_empty() {
            return Err(EmptyQueueError);
        }
        let last = self.items.len() - 1;
        self.swap(0, last);
        let item = self.items.pop().ok_or(EmptyQueueError)?;
        self.index.remove(&item.heap_key());
        if !self.items.is_empty() {
            self.sift_down(0);
        }
        Ok(item)
    }

    /// Replace the stored element that shares `item`'s key and restore heap
    /// order from its current slot. Returns `false` (and stores nothing) if
    /// the key is not present.
    pub fn update(&mut self, item: T) -> bool {
        let Some(&slot) = self.index.get(&item.heap_key()) else {
            return false;
        };
        self.items[slot] = item;
        self.resift(slot);
        true
    }

    /// Mutate the element for `key` in place, then re-sync its position.
    /// The closure must not change the element's key.
    pub fn update_with(&mut self, key: &T::Key, f: impl FnOnce(&mut T)) -> bool {
        let Some(&slot) = self.index.get(key) else {
            return false;
        };
        f(&mut self.items[slot]);
        debug_assert!(self.items[slot].heap_key() == *key, "update_with changed the key");
        self.resift(slot);
        true
    }

    /// Remove the element for `key`, wherever it sits.
    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let slot = *self.index.get(key)?;
        let last = self.items.len() - 1;
        self.swap(slot, last);
        let item = self.items.pop()?;
        self.index.remove(key);
        if slot < self.items.len() {
            self.resift(slot);
        }
        Some(item)
    }

    fn resift(&mut self, slot: usize) {
        let slot = self.sift_up(slot);
        self.sift_down(slot);
    }

    fn swap(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        self.items.swap(a, b);
        self.index.insert(self.items[a].heap_key(), a);
        self.index.insert(self.items[b].heap_key(), b);
    }

    /// Returns the element's final slot.
    fn sift_up(&mut self, mut slot: usize) -> usize {
        while slot > 0 {
            let parent = (slot - 1) / 2;
            if self.items[slot] < self.items[parent] {
                self.swap(slot, parent);
                slot = parent;
            } else {
                break;
            }
        }
        slot
    }

    fn sift_down(&mut self, mut slot: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * slot + 1;
            let right = left + 1;
            let mut smallest = slot;
            if left < len && self.items[left] < self.items[smallest] {
                smallest = left;
            }
            if right < len && self.items[right] < self.items[smallest] {
                smallest = right;
            }
            if smallest == slot {
                break;
            }
            self.swap(slot, smallest);
            slot = smallest;
        }
    }

    /// Full invariant check: heap order plus index agreement.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        if self.index.len() != self.items.len() {
            return false;
        }
        for (i, item) in self.items.iter().enumerate() {
            if self.index.get(&item.heap_key()) != Some(&i) {
                return false;
            }
            if i > 0 && self.items[(i - 1) / 2] > *item {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cmp::Ordering;
    use std::collections::BTreeMap;

    /// Test element: priority plus identity, ordered (priority, id).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    struct Entry {
        id: u32,
        priority: i32,
    }

    impl Ord for Entry {
        fn cmp(&self, other: &Self) -> Ordering {
            self.priority
                .cmp(&other.priority)
                .then_with(|| self.id.cmp(&other.id))
        }
    }

    impl PartialOrd for Entry {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }

    impl HeapItem for Entry {
        type Key = u32;
        fn heap_key(&self) -> u32 {
            self.id
        }
    }

    fn entry(id: u32, priority: i32) -> Entry {
        Entry { id, priority }
    }

    #[test]
    fn pops_in_priority_order() {
        let mut heap = IndexedHeap::new();
        for (id, p) in [(1, 50), (2, 10), (3, 30), (4, 10), (5, 70)] {
            heap.insert(entry(id, p));
        }
        let order: Vec<u32> = std::iter::from_fn(|| heap.pop_min().ok())
            .map(|e| e.id)
            .collect();
        // Ties on priority break by id.
        assert_eq!(order, vec![2, 4, 3, 1, 5]);
    }

    #[test]
    fn pop_on_empty_is_an_error() {
        let mut heap: IndexedHeap<Entry> = IndexedHeap::new();
        assert_eq!(heap.pop_min(), Err(EmptyQueueError));
        heap.insert(entry(1, 1));
        assert!(heap.pop_min().is_ok());
        assert_eq!(heap.pop_min(), Err(EmptyQueueError));
    }

    #[test]
    fn decrease_key_moves_element_to_front() {
        let mut heap = IndexedHeap::new();
        for id in 0..10 {
            heap.insert(entry(id, 100 + id as i32));
        }
        assert!(heap.update(entry(7, 1)));
        assert!(heap.is_consistent());
        assert_eq!(heap.peek().map(|e| e.id), Some(7));
    }

    #[test]
    fn increase_key_sinks_element() {
        let mut heap = IndexedHeap::new();
        for id in 0..10 {
            heap.insert(entry(id, id as i32));
        }
        assert!(heap.update_with(&0, |e| e.priority = 1000));
        assert!(heap.is_consistent());
        assert_eq!(heap.pop_min().unwrap().id, 1);
    }

    #[test]
    fn update_of_missing_key_is_rejected() {
        let mut heap = IndexedHeap::new();
        heap.insert(entry(1, 5));
        assert!(!heap.update(entry(2, 0)));
        assert_eq!(heap.len(), 1);
    }

    #[test]
    fn insert_existing_key_replaces() {
        let mut heap = IndexedHeap::new();
        heap.insert(entry(1, 5));
        heap.insert(entry(1, 3));
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.get(&1).map(|e| e.priority), Some(3));
    }

    #[test]
    fn remove_from_middle_keeps_invariants() {
        let mut heap = IndexedHeap::new();
        for id in 0..20 {
            heap.insert(entry(id, (id as i32 * 7) % 13));
        }
        assert!(heap.remove(&5).is_some());
        assert!(heap.remove(&5).is_none());
        assert!(!heap.contains(&5));
        assert!(heap.is_consistent());
        assert_eq!(heap.len(), 19);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(u32, i32),
        Update(u32, i32),
        Pop,
        Remove(u32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..32, -100i32..100).prop_map(|(id, p)| Op::Insert(id, p)),
            (0u32..32, -100i32..100).prop_map(|(id, p)| Op::Update(id, p)),
            Just(Op::Pop),
            (0u32..32).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn heap_matches_model_under_any_op_sequence(
            ops in prop::collection::vec(op_strategy(), 0..200)
        ) {
            let mut heap = IndexedHeap::new();
            // Reference model: id -> priority.
            let mut model: BTreeMap<u32, i32> = BTreeMap::new();

            for op in ops {
                match op {
                    Op::Insert(id, p) => {
                        heap.insert(entry(id, p));
                        model.insert(id, p);
                    }
                    Op::Update(id, p) => {
                        let updated = heap.update(entry(id, p));
                        prop_assert_eq!(updated, model.contains_key(&id));
                        if updated {
                            model.insert(id, p);
                        }
                    }
                    Op::Pop => {
                        let expected = model
                            .iter()
                            .map(|(&id, &p)| entry(id, p))
                            .min();
                        match (heap.pop_min(), expected) {
                            (Ok(got), Some(want)) => {
                                prop_assert_eq!(got, want);
                                model.remove(&got.id);
                            }
                            (Err(_), None) => {}
                            (got, want) => prop_assert!(false, "pop {:?} vs model {:?}", got, want),
                        }
                    }
                    Op::Remove(id) => {
                        let removed = heap.remove(&id);
                        prop_assert_eq!(removed.map(|e| e.priority), model.remove(&id));
                    }
                }

                prop_assert!(heap.is_consistent());
                prop_assert_eq!(heap.len(), model.len());
                for id in 0..32u32 {
                    prop_assert_eq!(heap.contains(&id), model.contains_key(&id));
                }
            }
        }

        #[test]
        fn draining_yields_sorted_sequence(
            priorities in prop::collection::vec(-1000i32..1000, 0..100)
        ) {
            let mut heap = IndexedHeap::with_capacity(priorities.len());
            for (id, &p) in priorities.iter().enumerate() {
                heap.insert(entry(id as u32, p));
            }
            let mut drained = Vec::new();
            while let Ok(e) = heap.pop_min() {
                drained.push(e);
            }
            let mut sorted = drained.clone();
            sorted.sort();
            prop_assert_eq!(drained, sorted);
        }
    }
}
