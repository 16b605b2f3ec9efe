/*
 * Scheduler Type Definitions
 *
 * This module defines the core types used throughout the scheduler subsystem.
 * These types are designed to be lightweight, Copy-able, and suitable for
 * use in both policy and mechanism layers.
 */

use crate::sync::{CondvarId, LockId, SemaphoreId};

use super::ThreadId;

/// Thread priority
///
/// Higher values indicate higher priority. The valid range is
/// [`Priority::MIN`, `Priority::MAX`]; everything the scheduler stores is
/// clamped into it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(pub i32);

impl Priority {
    /// Lowest priority (idle thread)
    pub const MIN: Priority = Priority(0);

    /// Default priority for new threads
    pub const DEFAULT: Priority = Priority(31);

    /// Highest priority
    pub const MAX: Priority = Priority(63);

    /// Clamp an arbitrary value into the valid range
    pub fn clamped(value: i32) -> Priority {
        Priority(value.clamp(Self::MIN.0, Self::MAX.0))
    }

    /// Is this value inside the valid range?
    pub fn is_valid(self) -> bool {
        (Self::MIN..=Self::MAX).contains(&self)
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::DEFAULT
    }
}

/// Lowest nice value (most favourable under MLFQS)
pub const NICE_MIN: i32 = -20;

/// Default nice value
pub const NICE_DEFAULT: i32 = 0;

/// Highest nice value
pub const NICE_MAX: i32 = 20;

/// Time slice duration in timer ticks
///
/// With a 100Hz timer, TimeSliceTicks(1) = 10ms.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimeSliceTicks(pub u32);

impl TimeSliceTicks {
    /// Default time slice (4 ticks = 40ms @ 100Hz)
    pub const DEFAULT: TimeSliceTicks = TimeSliceTicks(4);

    /// Get the value as u32
    pub fn get(self) -> u32 {
        self.0
    }
}

/// Dispatch decision made by a scheduling policy
#[derive(Debug, Clone)]
pub struct DispatchDecision {
    /// Thread to schedule next (None = run the idle thread)
    pub next: Option<ThreadId>,

    /// Time slice for the selected thread
    pub timeslice: TimeSliceTicks,
}

impl DispatchDecision {
    /// Create a decision to run a specific thread
    pub fn run_thread(tid: ThreadId, timeslice: TimeSliceTicks) -> Self {
        Self {
            next: Some(tid),
            timeslice,
        }
    }

    /// Create a decision to idle the CPU
    pub fn idle(timeslice: TimeSliceTicks) -> Self {
        Self {
            next: None,
            timeslice,
        }
    }
}

/// Reason why a thread was blocked
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// Waiting in `Semaphore::down`
    Semaphore(SemaphoreId),

    /// Waiting to acquire a lock
    Lock(LockId),

    /// Waiting on a condition variable
    Condvar(CondvarId),

    /// Blocked by an external collaborator through `block_current`
    Other,
}

/// Which scheduling policy drives priorities
///
/// Selected once at boot; the two policies are mutually exclusive.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedulerMode {
    /// Static priorities with priority donation through locks
    Priority,

    /// Multi-level feedback queue: priorities derived from nice and
    /// recent CPU usage, no donation
    Mlfqs,
}

/// Tick accounting, reported by `print_stats`
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SchedStats {
    /// Ticks spent in the idle thread
    pub idle_ticks: u64,

    /// Ticks spent in every other thread
    pub kernel_ticks: u64,

    /// Number of context switches performed
    pub context_switches: u64,
}
