//! Min-heap with decrease/increase-key over elements addressed by stable handles.
//!
//! The queue owns its elements. An element is identified by the handle returned from
//! [`AdjustablePriorityQueue::add`] (its insertion index) and stores its own position in
//! the heap, so a changed priority is repaired in O(log n) without searching.

use anyhow::{ensure, Result};
use std::cmp::Ordering;

pub trait HeapElement {
    fn priority(&self) -> f64;
    fn heap_index(&self) -> usize;
    fn set_heap_index(&mut self, index: usize);
}

#[derive(Debug, Clone)]
pub struct AdjustablePriorityQueue<T: HeapElement> {
    elements: Vec<T>,
    // heap position -> element handle
    heap: Vec<usize>,
    capacity: usize,
}

impl<T: HeapElement> Default for AdjustablePriorityQueue<T> {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}

impl<T: HeapElement> AdjustablePriorityQueue<T> {
    pub fn with_capacity(capacity: usize) -> Self {
        AdjustablePriorityQueue {
            elements: Vec::with_capacity(capacity),
            heap: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Changes the number of elements the queue accepts.
    pub fn set_capacity(&mut self, capacity: usize) -> Result<()> {
        ensure!(
            capacity >= self.elements.len(),
            "capacity {} is below the current size {}",
            capacity,
            self.elements.len()
        );
        self.elements.reserve(capacity - self.elements.len());
        self.heap.reserve(capacity - self.heap.len());
        self.capacity = capacity;
        Ok(())
    }

    /// Inserts `element` and returns its handle.
    pub fn add(&mut self, mut element: T) -> Result<usize> {
        ensure!(
            self.elements.len() < self.capacity,
            "priority queue is full ({} elements)",
            self.capacity
        );
        let handle = self.elements.len();
        element.set_heap_index(self.heap.len());
        self.elements.push(element);
        self.heap.push(handle);
        self.sift_up(self.heap.len() - 1);
        Ok(handle)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Handle of the element with the smallest priority.
    #[inline]
    pub fn top(&self) -> Option<usize> {
        self.heap.first().copied()
    }

    #[inline]
    pub fn top_element(&self) -> Option<&T> {
        self.top().map(|handle| &self.elements[handle])
    }

    #[inline]
    pub fn get(&self, handle: usize) -> &T {
        &self.elements[handle]
    }

    /// Mutable access to an element. A change of its priority must be followed by
    /// [`note_changed_priority`](Self::note_changed_priority).
    #[inline]
    pub fn get_mut(&mut self, handle: usize) -> &mut T {
        &mut self.elements[handle]
    }

    /// Applies `f` to an element and restores the heap order afterwards.
    pub fn update<F: FnOnce(&mut T)>(&mut self, handle: usize, f: F) {
        f(&mut self.elements[handle]);
        self.note_changed_priority(handle);
    }

    /// Restores the heap order after the priority of `handle` was changed in place.
    pub fn note_changed_priority(&mut self, handle: usize) {
        let position = self.elements[handle].heap_index();
        debug_assert_eq!(self.heap[position], handle);
        if position > 0 && self.less(position, (position - 1) / 2) {
            self.sift_up(position);
        } else {
            self.sift_down(position);
        }
    }

    /// Elements in handle order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.elements.iter()
    }

    /// Checks the heap order and that every element knows its heap position.
    pub fn is_consistent(&self) -> bool {
        let positions_match = self
            .heap
            .iter()
            .enumerate()
            .all(|(position, &handle)| self.elements[handle].heap_index() == position);
        let ordered = (1..self.heap.len()).all(|position| !self.less(position, (position - 1) / 2));
        positions_match && ordered && self.heap.len() == self.elements.len()
    }

    // ties go to the smaller handle so the order doesn't depend on the sift history
    #[inline]
    fn less(&self, a: usize, b: usize) -> bool {
        let handle_a = self.heap[a];
        let handle_b = self.heap[b];
        match self.elements[handle_a]
            .priority()
            .total_cmp(&self.elements[handle_b].priority())
        {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => handle_a < handle_b,
        }
    }

    #[inline]
    fn swap(&mut self, a: usize, b: usize) {
        self.heap.swap(a, b);
        let handle_a = self.heap[a];
        let handle_b = self.heap[b];
        self.elements[handle_a].set_heap_index(a);
        self.elements[handle_b].set_heap_index(b);
    }

    fn sift_up(&mut self, mut position: usize) {
        while position > 0 {
            let parent = (position - 1) / 2;
            if !self.less(position, parent) {
                break;
            }
            self.swap(position, parent);
            position = parent;
        }
    }

    fn sift_down(&mut self, mut position: usize) {
        let len = self.heap.len();
        loop {
            let left = 2 * position + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let smallest = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(smallest, position) {
                break;
            }
            self.swap(position, smallest);
            position = smallest;
        }
    }
}
