/*
 * Priority-Ordered Thread Queue
 *
 * Used for the ready queue and for every wait list (semaphores, condition
 * variables). Entries are kept in arrival order; removal scans for the
 * highest priority and takes the earliest entry among equals. The live
 * thread count is small, so a linear scan beats keeping the queue sorted
 * while priorities change underneath it through donation.
 */

use alloc::collections::VecDeque;

use super::{Priority, ThreadId};

/// Insertion-ordered queue with "pop highest priority, FIFO among ties"
#[derive(Debug, Default, Clone)]
pub struct ThreadQueue {
    entries: VecDeque<ThreadId>,
}

impl ThreadQueue {
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append a thread at the back (latest arrival)
    pub fn push_back(&mut self, tid: ThreadId) {
        kassert!(!self.entries.contains(&tid), "{} queued twice", tid);
        self.entries.push_back(tid);
    }

    /// Remove a specific thread; returns whether it was queued
    pub fn remove(&mut self, tid: ThreadId) -> bool {
        match self.entries.iter().position(|&t| t == tid) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Index of the earliest entry with the maximum priority
    fn max_index<F>(&self, mut priority_of: F) -> Option<usize>
    where
        F: FnMut(ThreadId) -> Priority,
    {
        let mut best: Option<(usize, Priority)> = None;
        for (index, &tid) in self.entries.iter().enumerate() {
            let priority = priority_of(tid);
            // Strictly greater keeps the earliest arrival among equals
            if best.map_or(true, |(_, p)| priority > p) {
                best = Some((index, priority));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Remove and return the highest-priority thread
    pub fn pop_max<F>(&mut self, priority_of: F) -> Option<ThreadId>
    where
        F: FnMut(ThreadId) -> Priority,
    {
        let index = self.max_index(priority_of)?;
        self.entries.remove(index)
    }

    /// Highest priority currently queued
    pub fn max_priority<F>(&self, mut priority_of: F) -> Option<Priority>
    where
        F: FnMut(ThreadId) -> Priority,
    {
        self.entries.iter().map(|&tid| priority_of(tid)).max()
    }

    pub fn contains(&self, tid: ThreadId) -> bool {
        self.entries.contains(&tid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Threads in arrival order
    pub fn iter(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.entries.iter().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prio(tid: ThreadId) -> Priority {
        // Thread N has priority N % 100 in these tests
        Priority((tid.0 % 100) as i32)
    }

    #[test]
    fn pops_highest_priority_first() {
        let mut q = ThreadQueue::new();
        for id in [5, 10, 3] {
            q.push_back(ThreadId(id));
        }
        assert_eq!(q.max_priority(prio), Some(Priority(10)));
        assert_eq!(q.pop_max(prio), Some(ThreadId(10)));
        assert_eq!(q.pop_max(prio), Some(ThreadId(5)));
        assert_eq!(q.pop_max(prio), Some(ThreadId(3)));
        assert_eq!(q.pop_max(prio), None);
    }

    #[test]
    fn equal_priorities_leave_in_arrival_order() {
        let mut q = ThreadQueue::new();
        // 107, 207 and 7 all have priority 7
        for id in [107, 7, 207] {
            q.push_back(ThreadId(id));
        }
        assert_eq!(q.pop_max(prio), Some(ThreadId(107)));
        assert_eq!(q.pop_max(prio), Some(ThreadId(7)));
        assert_eq!(q.pop_max(prio), Some(ThreadId(207)));
    }

    #[test]
    fn remove_specific_thread() {
        let mut q = ThreadQueue::new();
        q.push_back(ThreadId(1));
        q.push_back(ThreadId(2));
        assert!(q.remove(ThreadId(1)));
        assert!(!q.remove(ThreadId(1)));
        assert_eq!(q.len(), 1);
        assert!(q.contains(ThreadId(2)));
    }

    #[test]
    #[should_panic(expected = "queued twice")]
    fn double_insert_is_fatal() {
        let mut q = ThreadQueue::new();
        q.push_back(ThreadId(1));
        q.push_back(ThreadId(1));
    }
}
