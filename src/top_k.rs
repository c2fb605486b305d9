//! Bounded selection of the `k` most valuable candidate edges of one bidder.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

/// Edge from the current bidder to `object` together with its net value
/// `weight - price(object)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate<I> {
    pub value: f64,
    pub object: I,
    pub weight: f64,
}

// Ranks by value, an earlier offer beats a later one with the same value.
#[derive(Debug)]
struct Ranked<I> {
    candidate: Candidate<I>,
    seq: usize,
}

impl<I> Ord for Ranked<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.candidate
            .value
            .total_cmp(&other.candidate.value)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<I> PartialOrd for Ranked<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I> PartialEq for Ranked<I> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl<I> Eq for Ranked<I> {}

/// Keeps the `k` best candidates offered since the last [`reset`](TopK::reset) in a min-heap
/// of size `k`. The buffer is reused between bidders.
#[derive(Debug)]
pub struct TopK<I> {
    k: usize,
    seq: usize,
    // heap top is the worst kept candidate
    heap: BinaryHeap<Reverse<Ranked<I>>>,
}

impl<I: Copy> TopK<I> {
    pub fn new() -> Self {
        TopK {
            k: 0,
            seq: 0,
            heap: BinaryHeap::new(),
        }
    }

    pub fn reset(&mut self, k: usize) {
        self.k = k;
        self.seq = 0;
        self.heap.clear();
        self.heap.reserve(k);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn offer(&mut self, candidate: Candidate<I>) {
        if self.k == 0 {
            return;
        }
        let ranked = Ranked {
            candidate,
            seq: self.seq,
        };
        self.seq += 1;
        if self.heap.len() < self.k {
            self.heap.push(Reverse(ranked));
        } else if self
            .heap
            .peek()
            .map_or(false, |Reverse(worst)| ranked > *worst)
        {
            self.heap.pop();
            self.heap.push(Reverse(ranked));
        }
    }

    /// Moves the kept candidates into `out`, ascending by value. Among equal values the
    /// later offered candidate comes first.
    pub fn drain_ascending(&mut self, out: &mut Vec<Candidate<I>>) {
        out.clear();
        while let Some(Reverse(ranked)) = self.heap.pop() {
            out.push(ranked.candidate);
        }
    }
}

impl<I: Copy> Default for TopK<I> {
    fn default() -> Self {
        Self::new()
    }
}
