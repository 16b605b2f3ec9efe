/*
 * Thread Management
 *
 * This module defines the Thread structure and related types for the
 * preemptive scheduler.
 *
 * A thread is two independently owned resources:
 *
 * - The `Thread` record below (identity, status, priorities, MLFQS
 *   accounting, lock bookkeeping). It lives in the scheduler's thread table.
 * - A `KernelStack` region holding the thread's execution state. The record
 *   owns it through `stack`; the saved stack pointer lives in `context`.
 *
 * The lowest word of every kernel stack holds a canary. A stack that grows
 * past its end overwrites the canary first, which the scheduler checks on
 * every switch.
 */

use alloc::{boxed::Box, vec, vec::Vec};
use core::fmt;

use crate::fixed_point::Fixed;
use crate::sync::{CondvarId, LockId, SemaphoreId};

use super::types::{NICE_DEFAULT, Priority};

/// Entry point of a kernel thread
pub type ThreadFunc = fn(usize);

/// Canary stored at the bottom of every kernel stack
pub const STACK_CANARY: u64 = 0xcd6a_bf4b;

/// Maximum thread name length in bytes
pub const THREAD_NAME_LEN: usize = 16;

/// Thread identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub usize);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Thread({})", self.0)
    }
}

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Running,
    Ready,
    Blocked,
    Dying,
}

/// A wait list a blocked thread can sit on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    Semaphore(SemaphoreId),
    Condvar(CondvarId),
}

/// Which queue currently holds the thread
///
/// A thread is on at most one queue at a time: the ready queue while READY,
/// one wait list while BLOCKED on a primitive, none otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueSlot {
    NotQueued,
    Ready,
    Waiting(WaitTarget),
}

/// Saved execution context (the stack pointer at the last switch)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Context {
    pub sp: usize,
}

/// Kernel stack region owned by one thread
pub struct KernelStack {
    words: Box<[u64]>,
}

impl KernelStack {
    /// Allocate a stack of (at least) `size` bytes with the canary in place
    pub fn new(size: usize) -> Self {
        let len = (size / 8).max(32);
        let mut words = vec![0u64; len].into_boxed_slice();
        words[0] = STACK_CANARY;
        Self { words }
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.words.len() * 8
    }

    /// Lowest address of the region
    pub fn base(&self) -> usize {
        self.words.as_ptr() as usize
    }

    /// Initial stack pointer: the end of the region, 16-byte aligned
    pub fn top(&self) -> usize {
        (self.base() + self.size()) & !0xf
    }

    /// Has the bottom-of-stack canary survived?
    pub fn canary_intact(&self) -> bool {
        self.words[0] == STACK_CANARY
    }

    /// Copy `frame` to the top of the stack and return the new stack pointer
    ///
    /// `frame[0]` ends up at the lowest address, i.e. where the returned
    /// stack pointer points.
    pub fn push_frame(&mut self, frame: &[u64]) -> usize {
        let top_index = (self.top() - self.base()) / 8;
        kassert!(
            frame.len() < top_index,
            "initial frame of {} words does not fit the stack",
            frame.len()
        );
        let start = top_index - frame.len();
        self.words[start..top_index].copy_from_slice(frame);
        self.base() + start * 8
    }

    /// Overwrite the canary, as a runaway stack would
    #[cfg(test)]
    pub(crate) fn smash_canary(&mut self) {
        self.words[0] = 0;
    }
}

impl fmt::Debug for KernelStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KernelStack")
            .field("base", &format_args!("{:#x}", self.base()))
            .field("size", &self.size())
            .field("canary_intact", &self.canary_intact())
            .finish()
    }
}

/// Truncate a name to the record's fixed capacity
fn bounded_name(name: &str) -> heapless::String<THREAD_NAME_LEN> {
    let mut bounded = heapless::String::new();
    for ch in name.chars() {
        if bounded.push(ch).is_err() {
            break;
        }
    }
    bounded
}

/// Thread structure
///
/// Every field is owned by the scheduler and only mutated with interrupts
/// disabled.
pub struct Thread {
    pub id: ThreadId,
    pub name: heapless::String<THREAD_NAME_LEN>,
    pub state: ThreadState,

    /// Priority set at creation or by `set_priority` (derived under MLFQS)
    pub base_priority: Priority,

    /// Priority the scheduler selects by: base raised by donations
    pub priority: Priority,

    // MLFQS accounting
    pub nice: i32,
    pub recent_cpu: Fixed,

    /// Locks this thread currently holds
    pub held_locks: Vec<LockId>,

    /// Lock this thread is blocked trying to acquire
    pub waiting_lock: Option<LockId>,

    /// Queue membership
    pub queue: QueueSlot,

    /// Kernel stack; None for the boot thread (runs on the boot stack) and
    /// for dying threads once their stack has been reclaimed
    pub stack: Option<KernelStack>,
    pub context: Context,

    /// Ticks this thread has been running
    pub ticks: u64,

    /// Exit status, set when the thread exits
    pub exit_code: Option<i32>,
}

impl Thread {
    pub fn new(id: ThreadId, name: &str, priority: Priority) -> Self {
        Self {
            id,
            name: bounded_name(name),
            state: ThreadState::Blocked,
            base_priority: priority,
            priority,
            nice: NICE_DEFAULT,
            recent_cpu: Fixed::ZERO,
            held_locks: Vec::new(),
            waiting_lock: None,
            queue: QueueSlot::NotQueued,
            stack: None,
            context: Context::default(),
            ticks: 0,
            exit_code: None,
        }
    }

    /// Is the thread still schedulable (not exited)?
    pub fn is_alive(&self) -> bool {
        self.state != ThreadState::Dying
    }

    /// Check the stack canary (threads without their own stack always pass)
    pub fn stack_intact(&self) -> bool {
        self.stack.as_ref().map_or(true, KernelStack::canary_intact)
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("name", &self.name.as_str())
            .field("state", &self.state)
            .field("priority", &self.priority.0)
            .field("base_priority", &self.base_priority.0)
            .field("queue", &self.queue)
            .field("stack_size", &self.stack.as_ref().map(KernelStack::size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_truncated_to_sixteen_bytes() {
        let t = Thread::new(ThreadId(3), "a-very-long-thread-name", Priority::DEFAULT);
        assert_eq!(t.name.as_str(), "a-very-long-thre");
        assert_eq!(t.state, ThreadState::Blocked);
        assert_eq!(t.queue, QueueSlot::NotQueued);
    }

    #[test]
    fn stack_canary_detects_overflow() {
        let mut stack = KernelStack::new(4096);
        assert!(stack.canary_intact());
        assert_eq!(stack.size(), 4096);
        assert_eq!(stack.top() % 16, 0);
        stack.words[0] = 0;
        assert!(!stack.canary_intact());
    }

    #[test]
    fn push_frame_lands_below_top() {
        let mut stack = KernelStack::new(4096);
        let sp = stack.push_frame(&[1, 2, 3]);
        assert_eq!(stack.top() - sp, 24);
        let index = (sp - stack.base()) / 8;
        assert_eq!(&stack.words[index..index + 3], &[1, 2, 3]);
        assert!(stack.canary_intact());
    }
}
