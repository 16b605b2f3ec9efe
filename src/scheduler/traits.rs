/*
 * Scheduler Trait Definitions
 *
 * This module defines the traits that separate scheduling policy from mechanism:
 *
 * - SchedPolicy: The policy interface that the two algorithms implement
 * - KernelSchedCtx: The mechanism interface that policies use to interact with the kernel
 *
 * This separation allows:
 * 1. Selecting the scheduling algorithm at boot without changing kernel code
 * 2. Testing policies in isolation
 * 3. Clear ownership boundaries (policies never touch Thread structs directly)
 */

use alloc::vec::Vec;

use crate::fixed_point::Fixed;

use super::{
    ThreadId,
    events::SchedEvent,
    types::{DispatchDecision, Priority},
};

/// Scheduling policy trait
///
/// The SchedulerCore (mechanism) holds a Box<dyn SchedPolicy> and forwards
/// events to it.
///
/// Policies are responsible for:
/// - Deciding which thread to run next (pick_next)
/// - Reacting to system events (on_event)
/// - Managing the ready queue
pub trait SchedPolicy: Send {
    /// React to a scheduling event
    fn on_event(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent);

    /// Choose the next thread to run, removing it from the ready queue
    fn pick_next(&mut self, ctx: &mut dyn KernelSchedCtx) -> DispatchDecision;

    /// Highest effective priority among ready threads
    fn highest_ready(&self, ctx: &dyn KernelSchedCtx) -> Option<Priority>;

    /// Number of threads in the ready queue
    fn ready_count(&self) -> usize;

    /// Whether locks donate priority under this policy
    fn donation_enabled(&self) -> bool;

    /// System load average (only meaningful under MLFQS)
    fn load_avg(&self) -> Fixed {
        Fixed::ZERO
    }

    /// Get the policy name for debugging
    fn name(&self) -> &'static str;
}

/// Kernel context interface for scheduling policies
///
/// This trait is the ONLY way policies can query or modify kernel state.
pub trait KernelSchedCtx {
    // ========== QUERY OPERATIONS ==========

    /// The running thread
    fn current_thread(&self) -> ThreadId;

    /// The idle thread, once the scheduler has started
    fn idle_thread(&self) -> Option<ThreadId>;

    /// Get a thread's effective priority
    fn thread_priority(&self, tid: ThreadId) -> Option<Priority>;

    /// Get a thread's nice value
    fn thread_nice(&self, tid: ThreadId) -> Option<i32>;

    /// Get a thread's recent CPU estimate
    fn recent_cpu(&self, tid: ThreadId) -> Option<Fixed>;

    /// Timer interrupts per second
    fn timer_freq(&self) -> u32;

    /// All live (non-dying) threads, including the idle thread
    fn all_threads(&self) -> Vec<ThreadId>;

    // ========== STATE MODIFICATION ==========

    /// Overwrite a thread's recent CPU estimate
    fn set_recent_cpu(&mut self, tid: ThreadId, value: Fixed);

    /// Overwrite a thread's base and effective priority
    fn set_thread_priority(&mut self, tid: ThreadId, priority: Priority);

    /// Ask the mechanism to reschedule at the next opportunity
    fn request_reschedule(&mut self);

    /// Consume a pending reschedule request
    fn take_reschedule_request(&mut self) -> bool;

    // ========== DEBUGGING ==========

    /// Log a message from the policy
    fn log(&self, level: log::Level, message: &str);
}
