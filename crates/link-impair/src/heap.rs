//! Binary min-heap with a caller-supplied ordering.
//!
//! The scheduler keeps deferred packets here, ordered by expiration deadline.
//! Storage is a contiguous `Vec` grown in fixed-size chunks and never shrunk;
//! the queue drains and refills constantly, so holding on to the high-water
//! allocation avoids churn.

/// How many item slots each allocation step adds.
const SLOTS_PER_GROW: usize = 20;

/// A binary min-heap over `T`, ordered by a strict "comes-before" predicate.
///
/// `before(a, b)` must return true iff `a` sorts strictly before `b`; equal
/// elements are not-before each other and may pop in any order. Elements move
/// in on [`push`](MinHeap::push) and back out on [`pop`](MinHeap::pop);
/// dropping the heap drops whatever is still enqueued.
pub struct MinHeap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    slots: Vec<T>,
    before: F,
}

impl<T, F> MinHeap<T, F>
where
    F: Fn(&T, &T) -> bool,
{
    pub fn new(before: F) -> Self {
        let mut slots = Vec::new();
        slots.reserve_exact(SLOTS_PER_GROW);
        Self { slots, before }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The minimal element, without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.slots.first()
    }

    /// Insert `value`, sifting it up while it sorts before its parent.
    pub fn push(&mut self, value: T) {
        if self.slots.len() == self.slots.capacity() {
            self.slots.reserve_exact(SLOTS_PER_GROW);
        }
        self.slots.push(value);
        self.sift_up(self.slots.len() - 1);
    }

    /// Remove and return the minimal element.
    pub fn pop(&mut self) -> Option<T> {
        if self.slots.is_empty() {
            return None;
        }
        // Swap the last element into the root, then restore the heap
        // invariant by sifting it down.
        let min = self.slots.swap_remove(0);
        if !self.slots.is_empty() {
            self.sift_down(0);
        }
        Some(min)
    }

    fn sift_up(&mut self, mut at: usize) {
        while at > 0 {
            let parent = (at - 1) / 2;
            if !(self.before)(&self.slots[at], &self.slots[parent]) {
                break;
            }
            self.slots.swap(at, parent);
            at = parent;
        }
    }

    fn sift_down(&mut self, mut at: usize) {
        loop {
            let left = 2 * at + 1;
            if left >= self.slots.len() {
                break;
            }
            let right = left + 1;
            // Prefer the left child; the right only wins a strict comparison.
            let mut child = left;
            if right < self.slots.len() && (self.before)(&self.slots[right], &self.slots[left]) {
                child = right;
            }
            if !(self.before)(&self.slots[child], &self.slots[at]) {
                break;
            }
            self.slots.swap(at, child);
            at = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn less(a: &u64, b: &u64) -> bool {
        a < b
    }

    fn u64_heap() -> MinHeap<u64, fn(&u64, &u64) -> bool> {
        MinHeap::new(less)
    }

    #[test]
    fn pop_on_empty_is_none() {
        let mut heap = u64_heap();
        assert!(heap.is_empty());
        assert_eq!(heap.peek(), None);
        assert_eq!(heap.pop(), None);
    }

    #[test]
    fn pops_in_ascending_order_regardless_of_insertion_order() {
        let mut heap = u64_heap();
        for v in [9, 3, 7, 1, 8, 2, 6, 0, 5, 4] {
            heap.push(v);
        }
        let drained: Vec<u64> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(drained, (0..10).collect::<Vec<u64>>());
    }

    #[test]
    fn duplicates_all_surface() {
        let mut heap = u64_heap();
        for v in [5, 5, 1, 5, 1] {
            heap.push(v);
        }
        let drained: Vec<u64> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(drained, vec![1, 1, 5, 5, 5]);
    }

    #[test]
    fn peek_tracks_minimum() {
        let mut heap = u64_heap();
        heap.push(10);
        assert_eq!(heap.peek(), Some(&10));
        heap.push(3);
        assert_eq!(heap.peek(), Some(&3));
        heap.push(7);
        assert_eq!(heap.peek(), Some(&3));
        heap.pop();
        assert_eq!(heap.peek(), Some(&7));
    }

    // 10^4 random push/pop operations against a sorted reference model,
    // crossing many growth chunks along the way.
    #[test]
    fn random_operations_match_reference_model() {
        let mut rng = StdRng::seed_from_u64(0xFEED);
        let mut heap = u64_heap();
        let mut model: Vec<u64> = Vec::new();

        for _ in 0..10_000 {
            if model.is_empty() || rng.gen_bool(0.6) {
                let v = rng.gen_range(0..1_000u64);
                heap.push(v);
                model.push(v);
            } else {
                let popped = heap.pop().unwrap();
                let min_at = model
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| **v)
                    .map(|(i, _)| i)
                    .unwrap();
                assert_eq!(popped, model.swap_remove(min_at));
            }
            assert_eq!(heap.len(), model.len());
            assert_eq!(heap.peek().copied(), model.iter().min().copied());
        }

        model.sort_unstable();
        let drained: Vec<u64> = std::iter::from_fn(|| heap.pop()).collect();
        assert_eq!(drained, model);
    }
}
