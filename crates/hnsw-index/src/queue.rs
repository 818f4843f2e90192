use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;

use crate::NodeId;

/// A candidate node at a given traveling distance from the current
/// search target. `Ord` is reversed relative to the natural ordering on
/// `distance` so that a plain `BinaryHeap<Candidate>` behaves as a
/// *min*-heap (closest candidate on top) — the same trick the teacher's
/// `search_layer_candidates` relies on. Ties are broken by smaller id so
/// the heap's total order is deterministic even when two candidates sit
/// at identical distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub id: NodeId,
    pub distance: f64,
}

impl Eq for Candidate {}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .distance
            .partial_cmp(&self.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Expansion heap ("closer-is-on-top") — the frontier still being
/// explored during `search_layer` (spec §4.1).
#[derive(Debug, Default)]
pub struct ExpansionHeap(BinaryHeap<Candidate>);

impl ExpansionHeap {
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }

    pub fn push(&mut self, c: Candidate) {
        self.0.push(c);
    }

    pub fn pop(&mut self) -> Option<Candidate> {
        self.0.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Result heap ("farther-from-target is on top"), capped at `ef` by the
/// caller popping whenever `len() > ef` (spec §4.1 / §4.6).
#[derive(Debug, Default)]
pub struct ResultHeap(BinaryHeap<Reverse<Candidate>>);

impl ResultHeap {
    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.0.reserve(additional);
    }

    pub fn push(&mut self, c: Candidate) {
        self.0.push(Reverse(c));
    }

    /// Removes and returns the farthest candidate. A programmer error to
    /// call on an empty heap (spec §4.1).
    pub fn pop_farthest(&mut self) -> Candidate {
        self.0.pop().expect("pop on empty priority queue").0
    }

    pub fn peek_farthest(&self) -> Option<Candidate> {
        self.0.peek().map(|Reverse(c)| *c)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Drains the heap into an ascending-by-distance `Vec`.
    pub fn into_sorted_vec(mut self) -> Vec<Candidate> {
        let mut out = Vec::with_capacity(self.0.len());
        while let Some(Reverse(c)) = self.0.pop() {
            out.push(c);
        }
        out.reverse();
        out
    }

    /// Non-consuming version of `into_sorted_vec`, for scratch buffers
    /// that get reused across calls.
    pub fn to_sorted_vec(&self) -> Vec<Candidate> {
        let mut out: Vec<Candidate> = self.0.iter().map(|Reverse(c)| *c).collect();
        out.sort_unstable_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        out
    }
}
