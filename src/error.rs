/*
 * Scheduler Error Handling
 *
 * Two classes of failure exist at this layer:
 *
 * 1. Programming errors (self-deadlock, releasing a lock we don't hold,
 *    switching with interrupts enabled, a smashed stack canary, ...). These
 *    mean a bug above the scheduler, so the kernel halts through `kassert!`.
 * 2. Lookups by handle coming from collaborators (syscall layer, drivers).
 *    A stale ThreadId or LockId is reported as a `SchedError`.
 */

use core::fmt;

/// Assert a scheduler invariant, halting the kernel if it does not hold.
#[macro_export]
macro_rules! kassert {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            panic!("kernel fatal: {}", format_args!($($arg)+));
        }
    };
}

/// Halt the kernel unconditionally.
#[macro_export]
macro_rules! kpanic {
    ($($arg:tt)+) => {
        panic!("kernel fatal: {}", format_args!($($arg)+))
    };
}

/// Recoverable failures of handle-based scheduler calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// No live thread with this ID
    NoSuchThread,
    /// No semaphore with this ID
    NoSuchSemaphore,
    /// No lock with this ID
    NoSuchLock,
    /// No condition variable with this ID
    NoSuchCondvar,
    /// Nice value outside [NICE_MIN, NICE_MAX]
    NiceOutOfRange,
    /// Priority outside [Priority::MIN, Priority::MAX]
    PriorityOutOfRange,
    /// The global scheduler has not been initialized yet
    NotInitialized,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::NoSuchThread => "no such thread",
            SchedError::NoSuchSemaphore => "no such semaphore",
            SchedError::NoSuchLock => "no such lock",
            SchedError::NoSuchCondvar => "no such condition variable",
            SchedError::NiceOutOfRange => "nice value out of range",
            SchedError::PriorityOutOfRange => "priority out of range",
            SchedError::NotInitialized => "scheduler not initialized",
        };
        f.write_str(msg)
    }
}
