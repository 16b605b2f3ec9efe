/*
 * Preemptive Priority Scheduler
 *
 * This module is the scheduler subsystem of the CLUU kernel. It decides
 * which thread runs next, blocks and wakes threads, and keeps the tick
 * accounting the scheduling policies feed on.
 *
 * ARCHITECTURE:
 * =============
 *
 * The subsystem separates mechanism from policy:
 *
 * - Scheduler (scheduler.rs): thread table, lifecycle, context switch
 * - SchedulerCore (sched_core.rs): holds the active policy, timeslice state
 * - SchedPolicy (traits.rs): what a policy implements
 *     - PriorityPolicy: strict priority, FIFO among equals, donation on
 *     - MlfqsPolicy: 4.4BSD feedback queue, donation off
 * - SchedContext (context.rs): the policy's view of the thread table
 *
 * The policy is picked once at boot from SchedConfig (`-o mlfqs`).
 *
 * PREEMPTION:
 * ===========
 *
 * The timer interrupt (PIT, 100Hz) calls `on_timer_interrupt()`. A thread
 * is preempted when its time slice (4 ticks) runs out, or at once when a
 * ready thread gets a strictly higher effective priority than it.
 *
 * BUILT-IN IDLE THREAD:
 * =====================
 *
 * `start()` creates an idle thread that runs whenever no other thread is
 * ready. It halts the CPU between interrupts.
 *
 * GLOBAL INSTANCE:
 * ================
 *
 * There is one scheduler per kernel, created by `init()` and never torn
 * down. It lives behind a spin mutex that is only taken with interrupts
 * disabled, so the timer interrupt can never find it locked by the code it
 * interrupted. The free functions below are the interface the rest of the
 * kernel (syscall layer, drivers) uses.
 */

pub mod context;
pub mod events;
pub mod policies;
pub mod queue;
pub mod sched_core;
#[allow(clippy::module_inception)]
pub mod scheduler;
pub mod thread;
pub mod traits;
pub mod types;

use spin::{Mutex, Once};

use crate::arch::{Cpu, IntrLevel};
use crate::config::SchedConfig;
use crate::error::SchedError;

pub use scheduler::{MAIN_THREAD_ID, Scheduler};
pub use thread::{
    Context, KernelStack, QueueSlot, STACK_CANARY, Thread, ThreadFunc, ThreadId, ThreadState,
    WaitTarget,
};
pub use types::{
    BlockReason, DispatchDecision, NICE_DEFAULT, NICE_MAX, NICE_MIN, Priority, SchedStats,
    SchedulerMode, TimeSliceTicks,
};

/// The kernel's scheduler
static SCHEDULER: Mutex<Option<Scheduler>> = Mutex::new(None);

/// CPU backend, set once by `init()`
static CPU: Once<&'static dyn Cpu> = Once::new();

/// Initialize the global scheduler
///
/// Adopts the calling code as the boot thread. Must be called once, with
/// interrupts disabled, before any other function in this module.
pub fn init(cpu: &'static dyn Cpu, config: SchedConfig) {
    CPU.call_once(|| cpu);

    let mut scheduler = SCHEDULER.lock();
    kassert!(scheduler.is_none(), "scheduler initialised twice");
    *scheduler = Some(Scheduler::new(cpu, config));
}

/// Create the idle thread and enable interrupts
pub fn start() -> Result<(), SchedError> {
    // Only after the lock is released: a timer tick taken while it is held
    // would spin on it forever.
    with_scheduler_mut(|s| s.start())?;
    if let Some(cpu) = CPU.get() {
        cpu.set_intr_level(IntrLevel::On);
    }
    Ok(())
}

/// Has `init()` run?
pub fn is_initialized() -> bool {
    CPU.get().is_some()
}

/// Execute a closure with read access to the global scheduler
pub fn with_scheduler<F, R>(f: F) -> Result<R, SchedError>
where
    F: FnOnce(&Scheduler) -> R,
{
    with_scheduler_mut(|s| f(s))
}

/// Execute a closure with mutable access to the global scheduler
///
/// Interrupts are disabled for the duration and restored afterwards. If
/// the closure switches threads, the lock stays held across the switch and
/// is released by whichever thread runs next.
pub fn with_scheduler_mut<F, R>(f: F) -> Result<R, SchedError>
where
    F: FnOnce(&mut Scheduler) -> R,
{
    let cpu = CPU.get().ok_or(SchedError::NotInitialized)?;
    let old = cpu.intr_disable();

    let result = {
        let mut guard = SCHEDULER.lock();
        guard.as_mut().map(f).ok_or(SchedError::NotInitialized)
    };

    cpu.set_intr_level(old);
    result
}

// ============================================================================
// THREAD INTERFACE
// ============================================================================

/// Create a thread running `entry(arg)`
///
/// # Arguments
/// - `name`: Debug name (truncated to 16 bytes)
/// - `priority`: Initial priority, PRI_MIN..=PRI_MAX
/// - `entry`: Thread body; returning from it exits the thread with code 0
/// - `arg`: Passed to `entry`
///
/// # Returns
/// The new thread's ID
pub fn spawn_thread(
    name: &str,
    priority: Priority,
    entry: ThreadFunc,
    arg: usize,
) -> Result<ThreadId, SchedError> {
    with_scheduler_mut(|s| s.create(name, priority, entry, arg))?
}

/// The running thread
///
/// Halts the kernel if called before `init()`.
pub fn current_thread_id() -> ThreadId {
    match with_scheduler(|s| s.current()) {
        Ok(tid) => tid,
        Err(_) => kpanic!("current thread requested before the scheduler was initialised"),
    }
}

/// Block the running thread until `wake_thread` is called on it
pub fn block_current_thread() -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.block_current())
}

/// Make a blocked thread ready; safe inside interrupt handlers
pub fn wake_thread(tid: ThreadId) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.unblock(tid))?
}

/// Give up the CPU voluntarily
pub fn yield_now() -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.yield_current())
}

/// Terminate the running thread
pub fn exit_thread(exit_code: i32) -> ! {
    let _ = with_scheduler_mut(|s| s.exit_current(exit_code));

    // Only reached without a scheduler to switch away through
    loop {
        match CPU.get() {
            Some(cpu) => cpu.idle_wait(),
            None => core::hint::spin_loop(),
        }
    }
}

/// Collect the exit code of a dying thread
pub fn reap_thread(tid: ThreadId) -> Result<Option<i32>, SchedError> {
    with_scheduler_mut(|s| s.reap(tid))?
}

/// Timer interrupt hook (called by the PIT handler on every tick)
pub fn on_timer_interrupt() -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.on_timer_interrupt())
}

/// Hook for the end of every other interrupt handler
pub fn on_interrupt_return() -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.on_interrupt_return())
}

// ============================================================================
// PRIORITY AND MLFQS INTERFACE
// ============================================================================

/// Effective priority of a thread
pub fn thread_priority(tid: ThreadId) -> Result<Priority, SchedError> {
    with_scheduler(|s| s.priority(tid))?
}

/// Set a thread's base priority
pub fn set_thread_priority(tid: ThreadId, priority: Priority) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.set_priority(tid, priority))?
}

/// Nice value of a thread
pub fn thread_nice(tid: ThreadId) -> Result<i32, SchedError> {
    with_scheduler(|s| s.nice(tid))?
}

/// Set a thread's nice value
pub fn set_thread_nice(tid: ThreadId, nice: i32) -> Result<(), SchedError> {
    with_scheduler_mut(|s| s.set_nice(tid, nice))?
}

/// 100 times the system load average
pub fn load_avg_x100() -> Result<i32, SchedError> {
    with_scheduler(|s| s.load_avg_x100())
}

/// 100 times a thread's recent CPU estimate
pub fn recent_cpu_x100(tid: ThreadId) -> Result<i32, SchedError> {
    with_scheduler(|s| s.recent_cpu_x100(tid))?
}

/// Log the tick statistics
pub fn print_stats() -> Result<(), SchedError> {
    with_scheduler(|s| s.print_stats())
}

// ============================================================================
// ARCH HOOKS
// ============================================================================

/// First thing a new thread runs, before its entry function
///
/// The thread that switched to us still holds the scheduler lock and
/// disabled interrupts; release both.
pub fn thread_started() {
    // SAFETY: the lock was taken by the thread we switched away from, which
    // cannot release it until it runs again.
    unsafe { SCHEDULER.force_unlock() };

    let _ = with_scheduler_mut(|s| s.finish_switch());
    if let Some(cpu) = CPU.get() {
        cpu.set_intr_level(IntrLevel::On);
    }
}

/// Is the global scheduler lock taken right now?
#[cfg(test)]
pub(crate) fn scheduler_lock_held() -> bool {
    SCHEDULER.is_locked()
}

/// Body of the idle thread
pub(crate) fn idle_thread_main(_arg: usize) {
    loop {
        match CPU.get() {
            Some(cpu) => cpu.idle_wait(),
            None => core::hint::spin_loop(),
        }
    }
}
