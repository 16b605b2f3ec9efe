/*
 * Condition Variable
 *
 * Mesa-style monitor condition: `wait` atomically releases the monitor lock
 * and sleeps; after a `signal` the waiter holds the lock again before
 * `wait` returns. Waiters must re-check their condition.
 *
 * A signalled waiter is moved from the condition's wait list straight onto
 * the lock's wait list (wait morphing) rather than being readied only to
 * block again on the lock. It donates to the signaller like any other lock
 * waiter and runs once the lock is handed to it. Waiters leave the
 * condition in priority order.
 */

use crate::error::SchedError;
use crate::scheduler::{
    BlockReason, Priority, QueueSlot, Scheduler, ThreadId, WaitTarget, queue::ThreadQueue,
};

use super::{CondvarId, LockId};

/// Condition variable state
#[derive(Debug, Default)]
pub struct Condvar {
    pub(crate) waiters: ThreadQueue,
}

impl Condvar {
    pub const fn new() -> Self {
        Self {
            waiters: ThreadQueue::new(),
        }
    }

    /// Number of waiting threads
    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}

impl Scheduler {
    /// Create a condition variable
    pub fn condvar_create(&mut self) -> CondvarId {
        self.sync.insert_condvar(Condvar::new())
    }

    /// Release `lock`, wait for a signal, reacquire `lock`
    ///
    /// The caller must hold `lock`.
    pub fn condvar_wait(&mut self, id: CondvarId, lock: LockId) -> Result<(), SchedError> {
        kassert!(!self.cpu.in_interrupt(), "condvar_wait inside an interrupt handler");
        self.sync.condvar(id)?;
        let holder = self.sync.lock(lock)?.holder;
        let me = self.current;
        kassert!(holder == Some(me), "{} waits on {} without holding {}", me, id, lock);

        let old = self.cpu.intr_disable();
        if let Some(condvar) = self.sync.condvars.get_mut(&id) {
            condvar.waiters.push_back(me);
        }
        self.thread_mut(me).queue = QueueSlot::Waiting(WaitTarget::Condvar(id));
        self.release_lock_inner(me, lock);

        // Woken holding `lock` again
        self.block_inner(BlockReason::Condvar(id));
        self.cpu.set_intr_level(old);
        Ok(())
    }

    /// Wake the highest-priority waiter, if any
    ///
    /// The caller must hold `lock`.
    pub fn condvar_signal(&mut self, id: CondvarId, lock: LockId) -> Result<(), SchedError> {
        self.check_monitor(id, lock)?;

        let old = self.cpu.intr_disable();
        self.condvar_morph_one(id, lock);
        self.cpu.set_intr_level(old);
        Ok(())
    }

    /// Wake every waiter
    ///
    /// The caller must hold `lock`.
    pub fn condvar_broadcast(&mut self, id: CondvarId, lock: LockId) -> Result<(), SchedError> {
        self.check_monitor(id, lock)?;

        let old = self.cpu.intr_disable();
        while self.condvar_morph_one(id, lock).is_some() {}
        self.cpu.set_intr_level(old);
        Ok(())
    }

    /// Number of threads waiting on a condition
    pub fn condvar_waiting(&self, id: CondvarId) -> Result<usize, SchedError> {
        Ok(self.sync.condvar(id)?.waiting())
    }

    fn check_monitor(&self, id: CondvarId, lock: LockId) -> Result<(), SchedError> {
        kassert!(!self.cpu.in_interrupt(), "condition signalled inside an interrupt handler");
        self.sync.condvar(id)?;
        let holder = self.sync.lock(lock)?.holder;
        kassert!(
            holder == Some(self.current),
            "{} signals {} without holding {}",
            self.current,
            id,
            lock
        );
        Ok(())
    }

    /// Move the best waiter from the condition onto the lock's wait list
    fn condvar_morph_one(&mut self, id: CondvarId, lock: LockId) -> Option<ThreadId> {
        let threads = &self.threads;
        let waiter = self
            .sync
            .condvars
            .get_mut(&id)?
            .waiters
            .pop_max(|tid| threads.get(&tid).map_or(Priority::MIN, |t| t.priority))?;

        let (holder, sema) = {
            let entry = self.sync.locks.get(&lock)?;
            (entry.holder, entry.sema)
        };

        let thread = self.thread_mut(waiter);
        thread.waiting_lock = Some(lock);
        thread.queue = QueueSlot::Waiting(WaitTarget::Semaphore(sema));
        self.sema_enqueue(sema, waiter);
        log::debug!("{} signalled on {}, now waits for {}", waiter, id, lock);

        if let Some(holder) = holder {
            if self.donation_enabled() {
                self.refresh_donation_chain(holder);
            }
        }
        Some(waiter)
    }
}
