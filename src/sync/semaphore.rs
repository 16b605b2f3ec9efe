/*
 * Counting Semaphore
 *
 * A non-negative count plus a wait list.
 *
 * - down: take a unit if there is one, otherwise join the wait list and
 *   block until an `up` hands a unit over
 * - up: hand the unit to the highest-priority waiter if there is one,
 *   otherwise increment the count
 *
 * Because `up` hands the unit over directly, the count stays zero while
 * anybody waits and a woken thread never re-checks it.
 */

use crate::error::SchedError;
use crate::scheduler::{
    BlockReason, Priority, QueueSlot, Scheduler, ThreadId, WaitTarget, queue::ThreadQueue,
};

use super::SemaphoreId;

/// Semaphore state
#[derive(Debug, Default)]
pub struct Semaphore {
    pub(crate) value: u32,
    pub(crate) waiters: ThreadQueue,
}

impl Semaphore {
    pub const fn new(value: u32) -> Self {
        Self {
            value,
            waiters: ThreadQueue::new(),
        }
    }

    /// Current count
    pub fn value(&self) -> u32 {
        self.value
    }

    /// Waiters in arrival order
    pub fn waiters(&self) -> impl Iterator<Item = ThreadId> + '_ {
        self.waiters.iter()
    }
}

impl Scheduler {
    /// Create a semaphore with an initial count
    pub fn sema_create(&mut self, value: u32) -> SemaphoreId {
        self.sync.insert_semaphore(Semaphore::new(value))
    }

    /// Down (P)
    ///
    /// Must not be called from an interrupt handler.
    pub fn sema_down(&mut self, id: SemaphoreId) -> Result<(), SchedError> {
        kassert!(!self.cpu.in_interrupt(), "sema_down inside an interrupt handler");
        self.sync.semaphore(id)?;

        let old = self.cpu.intr_disable();
        if !self.sema_take(id) {
            let tid = self.current;
            self.sema_enqueue(id, tid);
            self.thread_mut(tid).queue = QueueSlot::Waiting(WaitTarget::Semaphore(id));
            self.block_inner(BlockReason::Semaphore(id));
        }
        self.cpu.set_intr_level(old);
        Ok(())
    }

    /// Down only if no waiting is needed
    pub fn sema_try_down(&mut self, id: SemaphoreId) -> Result<bool, SchedError> {
        self.sync.semaphore(id)?;
        let old = self.cpu.intr_disable();
        let taken = self.sema_take(id);
        self.cpu.set_intr_level(old);
        Ok(taken)
    }

    /// Up (V)
    ///
    /// May be called from an interrupt handler.
    pub fn sema_up(&mut self, id: SemaphoreId) -> Result<(), SchedError> {
        self.sync.semaphore(id)?;

        let old = self.cpu.intr_disable();
        let woken = self.sema_release(id);
        self.cpu.set_intr_level(old);

        if woken.is_some() {
            self.preempt_if_outranked();
        }
        Ok(())
    }

    /// Current count
    pub fn sema_value(&self, id: SemaphoreId) -> Result<u32, SchedError> {
        Ok(self.sync.semaphore(id)?.value)
    }

    pub(crate) fn sema_mut(&mut self, id: SemaphoreId) -> &mut Semaphore {
        match self.sync.semaphores.get_mut(&id) {
            Some(sema) => sema,
            None => kpanic!("{} is not registered", id),
        }
    }

    /// Take a unit if one is available
    pub(crate) fn sema_take(&mut self, id: SemaphoreId) -> bool {
        let sema = self.sema_mut(id);
        if sema.value > 0 {
            sema.value -= 1;
            true
        } else {
            false
        }
    }

    pub(crate) fn sema_enqueue(&mut self, id: SemaphoreId, tid: ThreadId) {
        self.sema_mut(id).waiters.push_back(tid);
    }

    /// Remove the highest-priority waiter from a semaphore's wait list
    pub(crate) fn sema_pop_waiter(&mut self, id: SemaphoreId) -> Option<ThreadId> {
        let threads = &self.threads;
        let sema = self.sync.semaphores.get_mut(&id)?;
        sema.waiters
            .pop_max(|tid| threads.get(&tid).map_or(Priority::MIN, |t| t.priority))
    }

    /// Highest effective priority among a semaphore's waiters
    pub(crate) fn sema_max_waiter_priority(&self, id: SemaphoreId) -> Option<Priority> {
        let sema = self.sync.semaphores.get(&id)?;
        sema.waiters
            .max_priority(|tid| self.threads.get(&tid).map_or(Priority::MIN, |t| t.priority))
    }

    /// Hand a unit to the best waiter, or bank it
    ///
    /// Returns the woken thread. Never switches.
    fn sema_release(&mut self, id: SemaphoreId) -> Option<ThreadId> {
        match self.sema_pop_waiter(id) {
            Some(tid) => {
                self.make_ready(tid, BlockReason::Semaphore(id));
                Some(tid)
            }
            None => {
                self.sema_mut(id).value += 1;
                None
            }
        }
    }
}
