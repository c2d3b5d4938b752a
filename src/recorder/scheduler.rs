//! Deferred single-shot tasks
//!
//! Tasks wait on an agenda ordered by wake time and are resumed by the tick
//! loop once the timeline clock reaches them. Nothing here sleeps or spawns;
//! the owner polls `pop_due` after advancing its clock.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Deferred<T> {
    wake_at: f64,
    seq: u64,
    task: T,
}

impl<T> Ord for Deferred<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Earliest wake time first, then submission order
        other
            .wake_at
            .total_cmp(&self.wake_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl<T> PartialOrd for Deferred<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> PartialEq for Deferred<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for Deferred<T> {}

/// Agenda of tasks keyed by wake time
pub struct DeferredQueue<T> {
    agenda: BinaryHeap<Deferred<T>>,
    next_seq: u64,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            agenda: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Queue a task to resume at `wake_at` on the owner's clock
    pub fn schedule(&mut self, wake_at: f64, task: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.agenda.push(Deferred { wake_at, seq, task });
    }

    /// Pop the next task whose wake time has been reached
    pub fn pop_due(&mut self, now: f64) -> Option<T> {
        if self.agenda.peek()?.wake_at <= now {
            self.agenda.pop().map(|d| d.task)
        } else {
            None
        }
    }

    pub fn next_wake(&self) -> Option<f64> {
        self.agenda.peek().map(|d| d.wake_at)
    }

    /// Count tasks matching a predicate
    pub fn count_where(&self, mut predicate: impl FnMut(&T) -> bool) -> usize {
        self.agenda.iter().filter(|d| predicate(&d.task)).count()
    }

    pub fn len(&self) -> usize {
        self.agenda.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agenda.is_empty()
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
