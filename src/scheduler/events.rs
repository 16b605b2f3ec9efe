/*
 * Scheduler Event Definitions
 *
 * This module defines the events that the scheduler mechanism reports to
 * scheduling policies. Policies react to these events to maintain their
 * ready queue and their priority bookkeeping.
 *
 * This design decouples the policy (which thread to run, how priorities
 * evolve) from the mechanism (thread records, context switches, locks).
 */

use super::{ThreadId, types::{BlockReason, Priority}};

/// Events that the scheduler mechanism reports to policies
#[derive(Debug, Clone)]
pub enum SchedEvent {
    /// A new thread was created and is ready to run
    ///
    /// The policy should add this thread to its ready queue.
    ThreadCreated {
        tid: ThreadId,
        priority: Priority,
    },

    /// A blocked thread became runnable
    ///
    /// The policy should move this thread back to its ready queue.
    ThreadWoke {
        tid: ThreadId,
        was_blocked_on: BlockReason,
    },

    /// A running thread gave up the CPU (voluntarily or preempted)
    ///
    /// The thread goes to the back of the ready queue.
    ThreadYielded {
        tid: ThreadId,
    },

    /// A thread became blocked
    ThreadBlocked {
        tid: ThreadId,
        reason: BlockReason,
    },

    /// A thread exited and will not run again
    ThreadExited {
        tid: ThreadId,
        exit_code: i32,
    },

    /// Timer interrupt (tick) occurred
    ///
    /// `now` is the tick count since boot, including this tick.
    Tick {
        now: u64,
        current_thread: ThreadId,
    },

    /// A thread's effective priority was changed externally
    PriorityChanged {
        tid: ThreadId,
        old_priority: Priority,
        new_priority: Priority,
    },

    /// A thread's nice value changed
    NiceChanged {
        tid: ThreadId,
        nice: i32,
    },
}

impl SchedEvent {
    /// Get a short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            SchedEvent::ThreadCreated { .. } => "ThreadCreated",
            SchedEvent::ThreadWoke { .. } => "ThreadWoke",
            SchedEvent::ThreadYielded { .. } => "ThreadYielded",
            SchedEvent::ThreadBlocked { .. } => "ThreadBlocked",
            SchedEvent::ThreadExited { .. } => "ThreadExited",
            SchedEvent::Tick { .. } => "Tick",
            SchedEvent::PriorityChanged { .. } => "PriorityChanged",
            SchedEvent::NiceChanged { .. } => "NiceChanged",
        }
    }
}
