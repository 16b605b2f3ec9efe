/*
 * Lock with Priority Donation
 *
 * A lock is a binary semaphore with an owner. Only the holder may release
 * it, and a thread may not acquire a lock it already holds. Invariant: the
 * lock has a holder exactly when its semaphore count is zero.
 *
 * PRIORITY DONATION:
 * ==================
 *
 * Without donation, a low-priority holder can be starved by medium-priority
 * threads while a high-priority thread waits for the lock. So:
 *
 *   effective(t) = max(base(t), max over locks held by t of
 *                              max effective priority of that lock's waiters)
 *
 * When a thread starts waiting on a lock, the holder's effective priority is
 * recomputed, then the holder's holder (if the holder is itself waiting on
 * a lock), and so on:
 *
 *   A(10) --waits on L1--> B(5) --waits on L2--> C(1)
 *   => B becomes 10, C becomes 10
 *
 * The walk is a loop bounded by the number of threads and stops as soon as
 * a priority does not change. On release the lock leaves the holder's held
 * set, the holder falls back to whatever its remaining locks still donate,
 * and the lock is handed to its best waiter.
 *
 * Under MLFQS donation is disabled and effective == base.
 */

use alloc::vec::Vec;

use crate::error::SchedError;
use crate::scheduler::{BlockReason, Priority, QueueSlot, Scheduler, ThreadId, WaitTarget};

use super::{LockId, Semaphore, SemaphoreId};

/// Lock state
#[derive(Debug)]
pub struct Lock {
    pub(crate) holder: Option<ThreadId>,

    /// Binary semaphore the waiters queue on
    pub(crate) sema: SemaphoreId,
}

impl Lock {
    /// Current holder
    pub fn holder(&self) -> Option<ThreadId> {
        self.holder
    }

    /// The semaphore underneath
    pub fn semaphore(&self) -> SemaphoreId {
        self.sema
    }
}

impl Scheduler {
    /// Create a free lock
    pub fn lock_create(&mut self) -> LockId {
        let sema = self.sync.insert_semaphore(Semaphore::new(1));
        self.sync.insert_lock(Lock { holder: None, sema })
    }

    fn lock_ref(&self, id: LockId) -> &Lock {
        match self.sync.locks.get(&id) {
            Some(lock) => lock,
            None => kpanic!("{} is not registered", id),
        }
    }

    fn lock_mut(&mut self, id: LockId) -> &mut Lock {
        match self.sync.locks.get_mut(&id) {
            Some(lock) => lock,
            None => kpanic!("{} is not registered", id),
        }
    }

    /// Acquire a lock, sleeping until it is available
    ///
    /// While waiting, the caller donates its priority to the holder chain.
    /// Acquiring a lock the caller already holds halts the kernel.
    pub fn lock_acquire(&mut self, id: LockId) -> Result<(), SchedError> {
        kassert!(!self.cpu.in_interrupt(), "lock_acquire inside an interrupt handler");
        let lock = self.sync.lock(id)?;
        let (holder, sema) = (lock.holder, lock.sema);
        let me = self.current;
        kassert!(holder != Some(me), "{} acquiring {} it already holds", me, id);

        let old = self.cpu.intr_disable();
        match holder {
            None => self.take_lock(id, me),
            Some(holder) => {
                log::debug!("{} waits for {} held by {}", me, id, holder);

                let thread = self.thread_mut(me);
                thread.waiting_lock = Some(id);
                thread.queue = QueueSlot::Waiting(WaitTarget::Semaphore(sema));
                self.sema_enqueue(sema, me);

                if self.donation_enabled() {
                    self.refresh_donation_chain(holder);
                }

                // Woken by a release that already handed the lock to us
                self.block_inner(BlockReason::Lock(id));
            }
        }
        self.cpu.set_intr_level(old);
        Ok(())
    }

    /// Acquire a lock only if it is free
    pub fn lock_try_acquire(&mut self, id: LockId) -> Result<bool, SchedError> {
        let holder = self.sync.lock(id)?.holder;
        let me = self.current;
        kassert!(holder != Some(me), "{} acquiring {} it already holds", me, id);
        if holder.is_some() {
            return Ok(false);
        }

        let old = self.cpu.intr_disable();
        self.take_lock(id, me);
        self.cpu.set_intr_level(old);
        Ok(true)
    }

    /// Release a lock held by the running thread
    ///
    /// The lock goes to its highest-priority waiter, the caller loses the
    /// priority that waiters on this lock donated, and the caller yields
    /// if it is now outranked.
    pub fn lock_release(&mut self, id: LockId) -> Result<(), SchedError> {
        let holder = self.sync.lock(id)?.holder;
        let me = self.current;
        kassert!(holder == Some(me), "{} releasing {} it does not hold", me, id);

        let old = self.cpu.intr_disable();
        self.release_lock_inner(me, id);
        self.cpu.set_intr_level(old);

        self.preempt_if_outranked();
        Ok(())
    }

    /// Does the running thread hold this lock?
    pub fn lock_held_by_current(&self, id: LockId) -> Result<bool, SchedError> {
        Ok(self.sync.lock(id)?.holder == Some(self.current))
    }

    /// Current holder of a lock
    pub fn lock_holder(&self, id: LockId) -> Result<Option<ThreadId>, SchedError> {
        Ok(self.sync.lock(id)?.holder)
    }

    /// Locks a thread currently holds, in acquisition order
    pub fn held_locks(&self, tid: ThreadId) -> Result<Vec<LockId>, SchedError> {
        self.threads
            .get(&tid)
            .map(|t| t.held_locks.clone())
            .ok_or(SchedError::NoSuchThread)
    }

    /// Lock a thread is blocked acquiring
    pub fn waiting_lock(&self, tid: ThreadId) -> Result<Option<LockId>, SchedError> {
        self.threads
            .get(&tid)
            .map(|t| t.waiting_lock)
            .ok_or(SchedError::NoSuchThread)
    }

    /// Record `tid` as the holder of a free lock
    fn take_lock(&mut self, id: LockId, tid: ThreadId) {
        let sema = self.lock_ref(id).sema;
        let taken = self.sema_take(sema);
        kassert!(taken, "{} is free but its semaphore is not", id);

        self.lock_mut(id).holder = Some(tid);
        self.thread_mut(tid).held_locks.push(id);
    }

    /// Give up `id` held by `holder` and hand it to the best waiter
    ///
    /// Never switches. Interrupts must be off.
    pub(crate) fn release_lock_inner(&mut self, holder: ThreadId, id: LockId) {
        self.thread_mut(holder).held_locks.retain(|&l| l != id);
        let sema = self.lock_ref(id).sema;

        match self.sema_pop_waiter(sema) {
            Some(next) => {
                self.lock_mut(id).holder = Some(next);
                self.thread_mut(next).held_locks.push(id);
                self.make_ready(next, BlockReason::Lock(id));
                // Remaining waiters now donate to the new holder
                self.recompute_priority(next);
                log::debug!("{} handed from {} to {}", id, holder, next);
            }
            None => {
                self.lock_mut(id).holder = None;
                self.sema_mut(sema).value += 1;
            }
        }

        self.recompute_priority(holder);
    }

    // ========================================================================
    // DONATION ENGINE
    // ========================================================================

    /// Priority donated to `tid` through the locks it holds
    fn donated_priority(&self, tid: ThreadId) -> Option<Priority> {
        let thread = self.threads.get(&tid)?;
        thread
            .held_locks
            .iter()
            .filter_map(|lock| self.sync.locks.get(lock))
            .filter_map(|lock| self.sema_max_waiter_priority(lock.sema))
            .max()
    }

    /// Recompute one thread's effective priority
    ///
    /// # Returns
    /// true if it changed
    pub(crate) fn recompute_priority(&mut self, tid: ThreadId) -> bool {
        let Some(thread) = self.threads.get(&tid) else {
            return false;
        };
        let mut effective = thread.base_priority;
        if self.donation_enabled() {
            if let Some(donated) = self.donated_priority(tid) {
                effective = effective.max(donated);
            }
        }
        self.update_effective_priority(tid, effective)
    }

    /// Recompute `start` and push the change down its waiting-on chain
    pub(crate) fn refresh_donation_chain(&mut self, start: ThreadId) {
        let mut tid = start;
        for _ in 0..self.threads.len() {
            if !self.recompute_priority(tid) {
                break;
            }

            let Some(lock) = self.threads.get(&tid).and_then(|t| t.waiting_lock) else {
                break;
            };
            let Some(holder) = self.sync.locks.get(&lock).and_then(|l| l.holder) else {
                break;
            };

            log::trace!("{} donates {:?} onwards to {}", tid, self.thread_ref(tid).priority, holder);
            tid = holder;
        }
    }
}
