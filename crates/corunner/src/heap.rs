//! Array-backed binary min-heap ordered by a caller-supplied comparator.
//!
//! `std::collections::BinaryHeap` requires `Ord` on the element type; the
//! runner ranks tasks with a runtime comparator instead, so it keeps its own
//! heap. The element at index 0 is always the one the comparator ranks
//! lowest (`Ordering::Less` = higher priority). Equal elements come out in
//! unspecified order.

use std::cmp::Ordering;
use std::fmt;

/// Boxed comparator over heap elements.
pub type HeapComparator<V> = Box<dyn Fn(&V, &V) -> Ordering + Send + Sync>;

pub struct PriorityHeap<V> {
    items: Vec<V>,
    compare: HeapComparator<V>,
}

impl<V> PriorityHeap<V> {
    pub fn new(compare: impl Fn(&V, &V) -> Ordering + Send + Sync + 'static) -> Self {
        Self {
            items: Vec::new(),
            compare: Box::new(compare),
        }
    }

    /// Insert a value: append, then sift up towards the root.
    pub fn push(&mut self, value: V) {
        self.items.push(value);
        self.sift_up(self.items.len() - 1);
    }

    /// Remove and return the highest-priority value.
    pub fn pop(&mut self) -> Option<V> {
        if self.items.len() <= 1 {
            return self.items.pop();
        }
        let top = self.items.swap_remove(0);
        self.sift_down(0);
        Some(top)
    }

    pub fn peek(&self) -> Option<&V> {
        self.items.first()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Remove every value, in no particular order.
    pub fn drain(&mut self) -> std::vec::Drain<'_, V> {
        self.items.drain(..)
    }

    /// Iterate over the values in storage order (not priority order).
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    /// Replace the comparator and restore the heap property under it.
    pub fn set_comparator(&mut self, compare: impl Fn(&V, &V) -> Ordering + Send + Sync + 'static) {
        self.compare = Box::new(compare);
        self.rebuild();
    }

    /// Bottom-up heapify of the whole array, O(n).
    fn rebuild(&mut self) {
        let len = self.items.len();
        for i in (0..len / 2).rev() {
            self.sift_down(i);
        }
    }

    fn sift_up(&mut self, mut index: usize) {
        while index > 0 {
            let parent = (index - 1) / 2;
            if (self.compare)(&self.items[parent], &self.items[index]) == Ordering::Greater {
                self.items.swap(parent, index);
                index = parent;
            } else {
                break;
            }
        }
    }

    fn sift_down(&mut self, mut index: usize) {
        let len = self.items.len();
        loop {
            let left = 2 * index + 1;
            let right = left + 1;
            let mut smallest = index;

            if left < len && (self.compare)(&self.items[left], &self.items[smallest]) == Ordering::Less {
                smallest = left;
            }
            if right < len && (self.compare)(&self.items[right], &self.items[smallest]) == Ordering::Less {
                smallest = right;
            }
            if smallest == index {
                return;
            }
            self.items.swap(smallest, index);
            index = smallest;
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for PriorityHeap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PriorityHeap")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_heap() -> PriorityHeap<i64> {
        PriorityHeap::new(|a: &i64, b: &i64| a.cmp(b))
    }

    fn drain_sorted(heap: &mut PriorityHeap<i64>) -> Vec<i64> {
        std::iter::from_fn(|| heap.pop()).collect()
    }

    /// Checks every parent against its children.
    fn assert_heap_property(heap: &PriorityHeap<i64>) {
        let items = &heap.items;
        for i in 1..items.len() {
            let parent = (i - 1) / 2;
            assert!(
                items[parent] <= items[i],
                "parent {} at {} greater than child {} at {}",
                items[parent],
                parent,
                items[i],
                i
            );
        }
    }

    #[test]
    fn pop_empty_returns_none() {
        let mut heap = min_heap();
        assert!(heap.pop().is_none());
        assert!(heap.peek().is_none());
        assert!(heap.is_empty());
    }

    #[test]
    fn single_element() {
        let mut heap = min_heap();
        heap.push(7);
        assert_eq!(heap.peek(), Some(&7));
        assert_eq!(heap.pop(), Some(7));
        assert!(heap.is_empty());
    }

    #[test]
    fn extracts_in_non_decreasing_order() {
        let mut heap = min_heap();
        for v in [5, 3, 9, 1, 4, 8, 2, 7, 6, 0] {
            heap.push(v);
            assert_heap_property(&heap);
        }
        assert_eq!(heap.len(), 10);
        assert_eq!(drain_sorted(&mut heap), (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn ascending_and_descending_insertions() {
        let mut heap = min_heap();
        for v in 0..50 {
            heap.push(v);
        }
        assert_eq!(drain_sorted(&mut heap), (0..50).collect::<Vec<_>>());

        for v in (0..50).rev() {
            heap.push(v);
        }
        assert_eq!(drain_sorted(&mut heap), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn scrambled_insertions_with_duplicates() {
        // Deterministic scramble: multiplicative walk modulo a prime.
        let mut heap = min_heap();
        let mut expected = Vec::new();
        let mut x: i64 = 1;
        for _ in 0..500 {
            x = (x * 48271) % 2_147_483_647;
            let v = x % 97;
            heap.push(v);
            expected.push(v);
        }
        assert_heap_property(&heap);
        expected.sort();
        assert_eq!(drain_sorted(&mut heap), expected);
    }

    #[test]
    fn interleaved_push_and_pop() {
        let mut heap = min_heap();
        heap.push(10);
        heap.push(4);
        heap.push(6);
        assert_eq!(heap.pop(), Some(4));
        heap.push(1);
        heap.push(8);
        assert_eq!(heap.pop(), Some(1));
        assert_eq!(heap.pop(), Some(6));
        heap.push(2);
        assert_heap_property(&heap);
        assert_eq!(drain_sorted(&mut heap), vec![2, 8, 10]);
    }

    #[test]
    fn custom_comparator_max_first() {
        let mut heap = PriorityHeap::new(|a: &i64, b: &i64| b.cmp(a));
        for v in [3, 11, 7, 1] {
            heap.push(v);
        }
        assert_eq!(heap.pop(), Some(11));
        assert_eq!(heap.pop(), Some(7));
    }

    #[test]
    fn set_comparator_rebuilds() {
        let mut heap = min_heap();
        for v in [4, 9, 2, 7, 5, 1, 8] {
            heap.push(v);
        }
        heap.set_comparator(|a: &i64, b: &i64| b.cmp(a));
        assert_eq!(drain_sorted(&mut heap), vec![9, 8, 7, 5, 4, 2, 1]);
    }

    #[test]
    fn clear_and_drain() {
        let mut heap = min_heap();
        for v in [3, 1, 2] {
            heap.push(v);
        }
        let mut drained: Vec<i64> = heap.drain().collect();
        drained.sort();
        assert_eq!(drained, vec![1, 2, 3]);
        assert!(heap.is_empty());

        heap.push(5);
        heap.clear();
        assert_eq!(heap.len(), 0);
    }
}
