/*
 * Synchronization Primitives
 *
 * Semaphores, locks and condition variables for kernel threads. The objects
 * live in a table owned by the scheduler and are named by small copyable
 * handles, so a handle can be stored anywhere (a driver struct, a syscall
 * table) without borrowing scheduler state.
 *
 * WAKE ORDER:
 * ===========
 *
 * Every wait list wakes the waiter with the highest effective priority,
 * earliest arrival first among equals. A semaphore `up` hands its unit
 * straight to that waiter; a lock release hands the lock over the same way.
 *
 * PRIORITY DONATION:
 * ==================
 *
 * A thread blocked on a lock lends its effective priority to the holder,
 * and through the holder's own wait to the next holder, and so on (see
 * `lock.rs`). Donation is off under MLFQS.
 *
 * The methods live on `Scheduler`; the free functions at the bottom of this
 * file run them on the global scheduler instance.
 */

pub mod condvar;
pub mod lock;
pub mod semaphore;

use alloc::collections::BTreeMap;
use core::fmt;

use crate::error::SchedError;
use crate::scheduler::with_scheduler_mut;

pub use condvar::Condvar;
pub use lock::Lock;
pub use semaphore::Semaphore;

/// Semaphore handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemaphoreId(pub usize);

/// Lock handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub usize);

/// Condition variable handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CondvarId(pub usize);

impl fmt::Display for SemaphoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Semaphore({})", self.0)
    }
}

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lock({})", self.0)
    }
}

impl fmt::Display for CondvarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Condvar({})", self.0)
    }
}

/// Every synchronization object in the system
#[derive(Debug, Default)]
pub struct SyncTable {
    pub(crate) semaphores: BTreeMap<SemaphoreId, Semaphore>,
    pub(crate) locks: BTreeMap<LockId, Lock>,
    pub(crate) condvars: BTreeMap<CondvarId, Condvar>,
    next_id: usize,
}

impl SyncTable {
    pub const fn new() -> Self {
        Self {
            semaphores: BTreeMap::new(),
            locks: BTreeMap::new(),
            condvars: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// IDs are unique across all three kinds
    fn allocate_id(&mut self) -> usize {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub(crate) fn insert_semaphore(&mut self, sema: Semaphore) -> SemaphoreId {
        let id = SemaphoreId(self.allocate_id());
        self.semaphores.insert(id, sema);
        id
    }

    pub(crate) fn insert_lock(&mut self, lock: Lock) -> LockId {
        let id = LockId(self.allocate_id());
        self.locks.insert(id, lock);
        id
    }

    pub(crate) fn insert_condvar(&mut self, condvar: Condvar) -> CondvarId {
        let id = CondvarId(self.allocate_id());
        self.condvars.insert(id, condvar);
        id
    }

    pub fn semaphore(&self, id: SemaphoreId) -> Result<&Semaphore, SchedError> {
        self.semaphores.get(&id).ok_or(SchedError::NoSuchSemaphore)
    }

    pub fn lock(&self, id: LockId) -> Result<&Lock, SchedError> {
        self.locks.get(&id).ok_or(SchedError::NoSuchLock)
    }

    pub fn condvar(&self, id: CondvarId) -> Result<&Condvar, SchedError> {
        self.condvars.get(&id).ok_or(SchedError::NoSuchCondvar)
    }
}

// ============================================================================
// GLOBAL INTERFACE
// ============================================================================

/// Create a semaphore on the global scheduler
pub fn sema_create(value: u32) -> Result<SemaphoreId, SchedError> {
    with_scheduler_mut(|s| s.sema_create(value))
}

/// Down (P); blocks while the count is zero
pub fn sema_down(id: SemaphoreId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.sema_down(id))?
}

/// Down without blocking; false if the count was zero
pub fn sema_try_down(id: SemaphoreId) -> Result<bool, SchedError> {
    with_scheduler_mut(|s| s.sema_try_down(id))?
}

/// Up (V); wakes the highest-priority waiter
pub fn sema_up(id: SemaphoreId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.sema_up(id))?
}

/// Create a lock on the global scheduler
pub fn lock_create() -> Result<LockId, SchedError> {
    with_scheduler_mut(|s| s.lock_create())
}

/// Acquire a lock, donating priority to its holder while waiting
pub fn lock_acquire(id: LockId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.lock_acquire(id))?
}

/// Acquire a lock only if it is free
pub fn lock_try_acquire(id: LockId) -> Result<bool, SchedError> {
    with_scheduler_mut(|s| s.lock_try_acquire(id))?
}

/// Release a lock held by the running thread
pub fn lock_release(id: LockId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.lock_release(id))?
}

/// Does the running thread hold this lock?
pub fn lock_held_by_current(id: LockId) -> Result<bool, SchedError> {
    with_scheduler_mut(|s| s.lock_held_by_current(id))?
}

/// Create a condition variable on the global scheduler
pub fn condvar_create() -> Result<CondvarId, SchedError> {
    with_scheduler_mut(|s| s.condvar_create())
}

/// Release `lock`, wait for a signal, reacquire `lock`
pub fn condvar_wait(id: CondvarId, lock: LockId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.condvar_wait(id, lock))?
}

/// Wake the highest-priority waiter
pub fn condvar_signal(id: CondvarId, lock: LockId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.condvar_signal(id, lock))?
}

/// Wake every waiter
pub fn condvar_broadcast(id: CondvarId, lock: LockId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.condvar_broadcast(id, lock))?
}
