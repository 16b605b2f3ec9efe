/*
 * Scheduler Context - KernelSchedCtx Implementation
 *
 * This module provides SchedContext, the bridge between scheduling policies
 * and the thread table. It implements the KernelSchedCtx trait, giving
 * policies a controlled view of kernel scheduling state without direct
 * access to the Thread records.
 *
 * A SchedContext is built on the stack for the duration of one policy call
 * (see the `sched_ctx!` macro in the mechanism) and borrows only the thread
 * table, so the mechanism can hand the policy holder a context while it
 * still owns every other field.
 */

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::fixed_point::Fixed;

use super::{
    Thread, ThreadId,
    traits::KernelSchedCtx,
    types::Priority,
};

/// Scheduling context for policy access
///
/// # Lifetime
/// The 'a lifetime ensures that the context cannot outlive the borrow of
/// the thread table it was built from.
pub struct SchedContext<'a> {
    threads: &'a mut BTreeMap<ThreadId, Thread>,
    current: ThreadId,
    idle: Option<ThreadId>,
    timer_freq: u32,
    resched: bool,
}

impl<'a> SchedContext<'a> {
    /// Create a new scheduling context
    ///
    /// # Arguments
    /// - `threads`: The mechanism's thread table
    /// - `current`: The running thread
    /// - `idle`: The idle thread, if the scheduler has started
    /// - `timer_freq`: Timer interrupts per second
    pub fn new(
        threads: &'a mut BTreeMap<ThreadId, Thread>,
        current: ThreadId,
        idle: Option<ThreadId>,
        timer_freq: u32,
    ) -> Self {
        Self {
            threads,
            current,
            idle,
            timer_freq,
            resched: false,
        }
    }
}

impl KernelSchedCtx for SchedContext<'_> {
    fn current_thread(&self) -> ThreadId {
        self.current
    }

    fn idle_thread(&self) -> Option<ThreadId> {
        self.idle
    }

    fn thread_priority(&self, tid: ThreadId) -> Option<Priority> {
        self.threads.get(&tid).map(|t| t.priority)
    }

    fn thread_nice(&self, tid: ThreadId) -> Option<i32> {
        self.threads.get(&tid).map(|t| t.nice)
    }

    fn recent_cpu(&self, tid: ThreadId) -> Option<Fixed> {
        self.threads.get(&tid).map(|t| t.recent_cpu)
    }

    fn timer_freq(&self) -> u32 {
        self.timer_freq
    }

    fn all_threads(&self) -> Vec<ThreadId> {
        self.threads
            .values()
            .filter(|t| t.is_alive())
            .map(|t| t.id)
            .collect()
    }

    fn set_recent_cpu(&mut self, tid: ThreadId, value: Fixed) {
        if let Some(thread) = self.threads.get_mut(&tid) {
            thread.recent_cpu = value;
        }
    }

    fn set_thread_priority(&mut self, tid: ThreadId, priority: Priority) {
        if let Some(thread) = self.threads.get_mut(&tid) {
            let priority = Priority::clamped(priority.0);
            thread.base_priority = priority;
            thread.priority = priority;
        }
    }

    fn request_reschedule(&mut self) {
        self.resched = true;
    }

    fn take_reschedule_request(&mut self) -> bool {
        core::mem::take(&mut self.resched)
    }

    fn log(&self, level: log::Level, message: &str) {
        log::log!(level, "[policy] {}", message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ThreadState;

    #[test]
    fn context_reads_and_writes_thread_table() {
        let mut threads = BTreeMap::new();
        threads.insert(ThreadId(1), Thread::new(ThreadId(1), "main", Priority::DEFAULT));
        let mut gone = Thread::new(ThreadId(2), "gone", Priority::DEFAULT);
        gone.state = ThreadState::Dying;
        threads.insert(ThreadId(2), gone);

        let mut ctx = SchedContext::new(&mut threads, ThreadId(1), None, 100);
        assert_eq!(ctx.all_threads(), [ThreadId(1)]);
        assert_eq!(ctx.thread_nice(ThreadId(1)), Some(0));
        assert_eq!(ctx.thread_priority(ThreadId(3)), None);

        ctx.set_thread_priority(ThreadId(1), Priority(99));
        assert_eq!(ctx.thread_priority(ThreadId(1)), Some(Priority::MAX));

        ctx.request_reschedule();
        assert!(ctx.take_reschedule_request());
        assert!(!ctx.take_reschedule_request());
    }
}
