/*
 * Thread Registry and Dispatcher
 *
 * The Scheduler struct is the mechanism half of the scheduler subsystem. It
 * owns every Thread record, the synchronization object tables and the
 * policy holder (SchedulerCore), and it performs the actual context switch.
 *
 * THREAD LIFECYCLE:
 * =================
 *
 *   create --> Ready --(picked)--> Running --(exit)--> Dying --(reap)--> gone
 *                ^                  |    |
 *                |    (yield/tick)  |    | (block / sema down / lock wait)
 *                +------------------+    v
 *                +-------(unblock)---- Blocked
 *
 * - The boot thread ("main", id 1) is adopted as Running when the scheduler
 *   is created. It runs on the boot stack and owns no KernelStack.
 * - The idle thread is created by `start()`. It is never queued; the
 *   dispatcher falls back to it when the ready queue is empty.
 * - A Dying thread's stack is released right after the switch away from it.
 *   Its record stays until a collaborator collects the exit code.
 *
 * INTERRUPT DISCIPLINE:
 * =====================
 *
 * Every public operation runs with interrupts disabled and restores the
 * previous level on the way out. `schedule()` refuses to run with interrupts
 * enabled. Operations that may block refuse to run inside an interrupt
 * handler; `unblock` is the only wake-up path handlers may use, and inside a
 * handler it only requests a reschedule on interrupt return.
 *
 * PREEMPTION:
 * ===========
 *
 * After anything that can make a ready thread outrank the running one
 * (create, unblock, a priority or nice change, a lock release, a tick), the
 * running thread yields immediately if a ready thread has a strictly higher
 * effective priority.
 */

use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::arch::{Cpu, IntrLevel};
use crate::config::SchedConfig;
use crate::error::SchedError;
use crate::fixed_point::Fixed;
use crate::sync::SyncTable;

use super::{
    KernelStack, QueueSlot, Thread, ThreadFunc, ThreadId, ThreadState,
    context::SchedContext,
    policies::{MlfqsPolicy, PriorityPolicy},
    sched_core::SchedulerCore,
    traits::SchedPolicy,
    types::{BlockReason, NICE_MAX, NICE_MIN, Priority, SchedStats, SchedulerMode},
};

/// Thread id of the boot thread
pub const MAIN_THREAD_ID: ThreadId = ThreadId(1);

/// Build a SchedContext over the thread table
///
/// Borrows only `threads`, so `self.core` stays usable alongside it.
macro_rules! sched_ctx {
    ($s:ident) => {
        SchedContext::new(&mut $s.threads, $s.current, $s.idle, $s.config.timer_freq)
    };
}

/// The scheduler mechanism
pub struct Scheduler {
    /// All threads, live and dying
    pub(crate) threads: BTreeMap<ThreadId, Thread>,

    /// Next thread ID to assign
    next_thread_id: usize,

    /// The running thread
    pub(crate) current: ThreadId,

    /// The idle thread, once `start()` ran
    pub(crate) idle: Option<ThreadId>,

    /// Policy holder
    pub(crate) core: SchedulerCore,

    /// Semaphores, locks and condition variables
    pub(crate) sync: SyncTable,

    /// CPU backend
    pub(crate) cpu: &'static dyn Cpu,

    config: SchedConfig,

    /// Thread switched away from, until `finish_switch` ran
    prev: Option<ThreadId>,

    stats: SchedStats,
    started: bool,
}

impl Scheduler {
    /// Create the scheduler and adopt the calling code as the boot thread
    ///
    /// Interrupts must be off; they stay off until `start()`.
    pub fn new(cpu: &'static dyn Cpu, config: SchedConfig) -> Self {
        kassert!(
            cpu.intr_level() == IntrLevel::Off,
            "scheduler initialised with interrupts enabled"
        );

        let policy: Box<dyn SchedPolicy> = match config.mode() {
            SchedulerMode::Priority => Box::new(PriorityPolicy::new(config.time_slice)),
            SchedulerMode::Mlfqs => Box::new(MlfqsPolicy::new(config.time_slice)),
        };
        let mut core = SchedulerCore::new(policy);

        let mut main = Thread::new(MAIN_THREAD_ID, "main", Priority::DEFAULT);
        main.state = ThreadState::Running;
        core.set_current(MAIN_THREAD_ID, config.time_slice.get());

        let mut threads = BTreeMap::new();
        threads.insert(MAIN_THREAD_ID, main);

        log::info!(
            "Scheduler initialized: mode {:?}, cpu backend {}, time slice {} ticks",
            config.mode(),
            cpu.name(),
            config.time_slice.get()
        );

        Self {
            threads,
            next_thread_id: MAIN_THREAD_ID.0 + 1,
            current: MAIN_THREAD_ID,
            idle: None,
            core,
            sync: SyncTable::new(),
            cpu,
            config,
            prev: None,
            stats: SchedStats::default(),
            started: false,
        }
    }

    /// Create the idle thread
    ///
    /// Interrupts stay off. The caller turns them on once nothing holds the
    /// scheduler lock.
    pub fn start(&mut self) {
        kassert!(!self.started, "scheduler started twice");

        let tid = self.allocate_id();
        let mut idle = Thread::new(tid, "idle", Priority::MIN);
        let mut stack = KernelStack::new(self.config.stack_size);
        idle.context = self.cpu.prepare_context(&mut stack, super::idle_thread_main, 0);
        idle.stack = Some(stack);
        self.threads.insert(tid, idle);

        self.idle = Some(tid);
        self.started = true;

        log::info!("Scheduler started, idle thread is {}", tid);
    }

    fn allocate_id(&mut self) -> ThreadId {
        let tid = ThreadId(self.next_thread_id);
        self.next_thread_id += 1;
        tid
    }

    pub(crate) fn thread_ref(&self, tid: ThreadId) -> &Thread {
        match self.threads.get(&tid) {
            Some(thread) => thread,
            None => kpanic!("{} is not registered", tid),
        }
    }

    pub(crate) fn thread_mut(&mut self, tid: ThreadId) -> &mut Thread {
        match self.threads.get_mut(&tid) {
            Some(thread) => thread,
            None => kpanic!("{} is not registered", tid),
        }
    }

    fn live_thread(&self, tid: ThreadId) -> Result<&Thread, SchedError> {
        self.threads
            .get(&tid)
            .filter(|t| t.is_alive())
            .ok_or(SchedError::NoSuchThread)
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Create a new thread, READY to run `entry(arg)`
    ///
    /// The new thread inherits the creator's nice value and recent CPU
    /// estimate. If it outranks the creator, the creator yields to it before
    /// this returns.
    ///
    /// # Arguments
    /// - `name`: Debug name (truncated to 16 bytes)
    /// - `priority`: Initial base priority
    /// - `entry`: Thread body
    /// - `arg`: Passed to `entry`
    pub fn create(
        &mut self,
        name: &str,
        priority: Priority,
        entry: ThreadFunc,
        arg: usize,
    ) -> Result<ThreadId, SchedError> {
        if !priority.is_valid() {
            return Err(SchedError::PriorityOutOfRange);
        }

        let old = self.cpu.intr_disable();

        let tid = self.allocate_id();
        let mut thread = Thread::new(tid, name, priority);
        if let Some(parent) = self.threads.get(&self.current) {
            thread.nice = parent.nice;
            thread.recent_cpu = parent.recent_cpu;
        }

        let mut stack = KernelStack::new(self.config.stack_size);
        thread.context = self.cpu.prepare_context(&mut stack, entry, arg);
        thread.stack = Some(stack);
        thread.state = ThreadState::Ready;
        thread.queue = QueueSlot::Ready;
        self.threads.insert(tid, thread);

        let mut ctx = sched_ctx!(self);
        self.core.thread_created(&mut ctx, tid, priority);

        log::info!("Created thread {} '{}' with priority {}", tid, name, priority.0);

        self.cpu.set_intr_level(old);
        self.preempt_if_outranked();
        Ok(tid)
    }

    /// The running thread
    ///
    /// Halts the kernel if the running thread overflowed its stack.
    pub fn current(&self) -> ThreadId {
        let thread = self.thread_ref(self.current);
        kassert!(thread.stack_intact(), "stack overflow in {}", self.current);
        kassert!(
            thread.state == ThreadState::Running,
            "current {} is {:?}",
            self.current,
            thread.state
        );
        self.current
    }

    /// The idle thread, once the scheduler has started
    pub fn idle_thread(&self) -> Option<ThreadId> {
        self.idle
    }

    /// Block the running thread until someone calls `unblock` on it
    pub fn block_current(&mut self) {
        kassert!(!self.cpu.in_interrupt(), "block inside an interrupt handler");
        let old = self.cpu.intr_disable();
        self.block_inner(BlockReason::Other);
        self.cpu.set_intr_level(old);
    }

    /// RUNNING -> BLOCKED, then pick someone else
    ///
    /// Interrupts must be off. Wait-list membership is the caller's job.
    pub(crate) fn block_inner(&mut self, reason: BlockReason) {
        let tid = self.current;
        kassert!(Some(tid) != self.idle, "idle thread cannot block");

        self.thread_mut(tid).state = ThreadState::Blocked;
        let mut ctx = sched_ctx!(self);
        self.core.thread_blocked(&mut ctx, tid, reason);

        log::trace!("{} blocked on {:?}", tid, reason);
        self.schedule();
    }

    /// Make a blocked thread READY
    ///
    /// Safe to call from an interrupt handler: there it never switches, it
    /// only asks for a reschedule on interrupt return.
    pub fn unblock(&mut self, tid: ThreadId) -> Result<(), SchedError> {
        let state = self.live_thread(tid)?.state;
        kassert!(state == ThreadState::Blocked, "unblock of {} while {:?}", tid, state);

        let old = self.cpu.intr_disable();
        self.make_ready(tid, BlockReason::Other);
        self.cpu.set_intr_level(old);

        self.preempt_if_outranked();
        Ok(())
    }

    /// BLOCKED -> READY without any preemption check
    pub(crate) fn make_ready(&mut self, tid: ThreadId, reason: BlockReason) {
        let thread = self.thread_mut(tid);
        kassert!(
            thread.state == ThreadState::Blocked,
            "{} woken while {:?}",
            tid,
            thread.state
        );
        thread.state = ThreadState::Ready;
        thread.queue = QueueSlot::Ready;
        thread.waiting_lock = None;

        let mut ctx = sched_ctx!(self);
        self.core.thread_woke(&mut ctx, tid, reason);
        log::trace!("{} woke ({:?})", tid, reason);
    }

    /// Give up the processor; the running thread stays READY
    pub fn yield_current(&mut self) {
        kassert!(!self.cpu.in_interrupt(), "yield inside an interrupt handler");
        self.yield_inner();
    }

    fn yield_inner(&mut self) {
        let old = self.cpu.intr_disable();

        let tid = self.current;
        if Some(tid) == self.idle {
            self.thread_mut(tid).state = ThreadState::Blocked;
        } else {
            let thread = self.thread_mut(tid);
            thread.state = ThreadState::Ready;
            thread.queue = QueueSlot::Ready;
            let mut ctx = sched_ctx!(self);
            self.core.thread_yielded(&mut ctx, tid);
        }

        self.schedule();
        self.cpu.set_intr_level(old);
    }

    /// Terminate the running thread
    ///
    /// Every lock it still holds is released (and handed to the next
    /// waiter). The record stays DYING until `reap`. On real hardware this
    /// never returns; on the simulated CPU it returns with the next thread
    /// running.
    pub fn exit_current(&mut self, exit_code: i32) {
        kassert!(!self.cpu.in_interrupt(), "exit inside an interrupt handler");
        let old = self.cpu.intr_disable();

        let tid = self.current;
        kassert!(Some(tid) != self.idle, "idle thread cannot exit");

        let held = core::mem::take(&mut self.thread_mut(tid).held_locks);
        for lock in held {
            log::debug!("{} exits holding {}, releasing", tid, lock);
            self.release_lock_inner(tid, lock);
        }

        let thread = self.thread_mut(tid);
        thread.state = ThreadState::Dying;
        thread.exit_code = Some(exit_code);

        let mut ctx = sched_ctx!(self);
        self.core.thread_exited(&mut ctx, tid, exit_code);
        log::info!("Thread {} exited with code {}", tid, exit_code);

        self.schedule();
        self.cpu.set_intr_level(old);
    }

    /// Collect a dying thread's exit code and drop its record
    ///
    /// # Returns
    /// - Ok(Some(code)): the thread had exited, its record is gone
    /// - Ok(None): the thread is still alive
    pub fn reap(&mut self, tid: ThreadId) -> Result<Option<i32>, SchedError> {
        let thread = self.threads.get(&tid).ok_or(SchedError::NoSuchThread)?;
        if thread.is_alive() || self.prev == Some(tid) {
            return Ok(None);
        }
        let exit_code = thread.exit_code;
        self.threads.remove(&tid);
        log::debug!("Reaped {}", tid);
        Ok(exit_code)
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Switch to the thread the policy picks
    ///
    /// The outgoing thread's state must already be updated. Interrupts must
    /// be off.
    pub(crate) fn schedule(&mut self) {
        kassert!(
            self.cpu.intr_level() == IntrLevel::Off,
            "schedule with interrupts enabled"
        );

        let prev = self.current;
        let mut ctx = sched_ctx!(self);
        let next = match self.core.reschedule(&mut ctx) {
            Some(tid) => tid,
            None => kpanic!("no runnable thread and no idle thread"),
        };

        let thread = self.thread_mut(next);
        thread.state = ThreadState::Running;
        thread.queue = QueueSlot::NotQueued;
        self.current = next;

        if next == prev {
            return;
        }

        kassert!(self.thread_ref(prev).stack_intact(), "stack overflow in {}", prev);
        kassert!(self.thread_ref(next).stack_intact(), "stack overflow in {}", next);
        log::trace!("switch {} -> {}", prev, next);

        self.stats.context_switches += 1;
        self.prev = Some(prev);

        let from: *mut _ = &mut self.thread_mut(prev).context;
        let to: *const _ = &self.thread_ref(next).context;
        // SAFETY: both contexts live in the thread table, which nobody
        // touches while interrupts are off; the backend reads and writes
        // them before any other thread runs.
        unsafe { self.cpu.switch(from, to) };

        self.finish_switch();
    }

    /// Runs on the incoming thread right after a switch
    ///
    /// Releases the stack of the thread we left if it was dying.
    pub(crate) fn finish_switch(&mut self) {
        let Some(prev) = self.prev.take() else {
            return;
        };
        if let Some(thread) = self.threads.get_mut(&prev) {
            if thread.state == ThreadState::Dying && thread.stack.take().is_some() {
                log::trace!("released stack of {}", prev);
            }
        }
    }

    /// Does a READY thread outrank the running one?
    pub(crate) fn ready_outranks_current(&mut self) -> bool {
        let ctx = sched_ctx!(self);
        let Some(top) = self.core.highest_ready(&ctx) else {
            return false;
        };
        if Some(self.current) == self.idle {
            return true;
        }
        self.threads
            .get(&self.current)
            .is_none_or(|t| top > t.priority)
    }

    /// Yield now (or on interrupt return) if a READY thread outranks us
    pub(crate) fn preempt_if_outranked(&mut self) {
        if !self.started || !self.ready_outranks_current() {
            return;
        }
        if self.cpu.in_interrupt() {
            self.core.request_reschedule();
        } else {
            self.yield_inner();
        }
    }

    // ========================================================================
    // TIMER
    // ========================================================================

    /// Per-tick accounting
    ///
    /// # Returns
    /// true if the running thread should yield when the interrupt returns
    /// (time slice used up, or a ready thread now outranks it)
    pub fn tick(&mut self) -> bool {
        let old = self.cpu.intr_disable();

        let current = self.current;
        if Some(current) == self.idle {
            self.stats.idle_ticks += 1;
        } else {
            self.stats.kernel_ticks += 1;
        }
        if let Some(thread) = self.threads.get_mut(&current) {
            thread.ticks += 1;
        }

        let mut ctx = sched_ctx!(self);
        let mut yield_on_return = self.core.on_tick(&mut ctx);
        if self.ready_outranks_current() {
            yield_on_return = true;
        }

        self.cpu.set_intr_level(old);
        yield_on_return
    }

    /// Timer interrupt hook: account the tick, then yield if it asked for it
    pub fn on_timer_interrupt(&mut self) {
        if self.tick() && self.started {
            self.yield_inner();
        }
    }

    /// Interrupt-return hook for every other handler
    ///
    /// Performs the yield an `unblock` from inside the handler asked for.
    pub fn on_interrupt_return(&mut self) {
        if self.core.need_resched() && self.started {
            self.yield_inner();
        }
    }

    /// Ticks since boot
    pub fn ticks(&self) -> u64 {
        self.core.total_ticks()
    }

    // ========================================================================
    // PRIORITY AND MLFQS ACCESSORS
    // ========================================================================

    /// Effective priority (base raised by donations)
    pub fn priority(&self, tid: ThreadId) -> Result<Priority, SchedError> {
        Ok(self.live_thread(tid)?.priority)
    }

    /// Base priority (without donations)
    pub fn base_priority(&self, tid: ThreadId) -> Result<Priority, SchedError> {
        Ok(self.live_thread(tid)?.base_priority)
    }

    /// Set a thread's base priority
    ///
    /// The effective priority stays raised while donations are in effect.
    /// Under MLFQS the value is accepted and overwritten at the next
    /// recalculation.
    pub fn set_priority(&mut self, tid: ThreadId, priority: Priority) -> Result<(), SchedError> {
        if !priority.is_valid() {
            return Err(SchedError::PriorityOutOfRange);
        }
        self.live_thread(tid)?;

        let old = self.cpu.intr_disable();
        self.thread_mut(tid).base_priority = priority;
        self.refresh_donation_chain(tid);
        self.cpu.set_intr_level(old);

        self.preempt_if_outranked();
        Ok(())
    }

    /// Nice value
    pub fn nice(&self, tid: ThreadId) -> Result<i32, SchedError> {
        Ok(self.live_thread(tid)?.nice)
    }

    /// Set a thread's nice value (MLFQS re-derives its priority at once)
    pub fn set_nice(&mut self, tid: ThreadId, nice: i32) -> Result<(), SchedError> {
        if !(NICE_MIN..=NICE_MAX).contains(&nice) {
            return Err(SchedError::NiceOutOfRange);
        }
        self.live_thread(tid)?;

        let old = self.cpu.intr_disable();
        self.thread_mut(tid).nice = nice;
        let mut ctx = sched_ctx!(self);
        self.core.nice_changed(&mut ctx, tid, nice);
        self.cpu.set_intr_level(old);

        self.preempt_if_outranked();
        Ok(())
    }

    /// Recent CPU estimate
    pub fn recent_cpu(&self, tid: ThreadId) -> Result<Fixed, SchedError> {
        Ok(self.live_thread(tid)?.recent_cpu)
    }

    /// 100 times the recent CPU estimate, rounded to nearest
    pub fn recent_cpu_x100(&self, tid: ThreadId) -> Result<i32, SchedError> {
        Ok((self.recent_cpu(tid)? * 100).to_int_round())
    }

    /// System load average
    pub fn load_avg(&self) -> Fixed {
        self.core.load_avg()
    }

    /// 100 times the system load average, rounded to nearest
    pub fn load_avg_x100(&self) -> i32 {
        (self.load_avg() * 100).to_int_round()
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Thread state (dying threads included until reaped)
    pub fn state(&self, tid: ThreadId) -> Result<ThreadState, SchedError> {
        self.threads
            .get(&tid)
            .map(|t| t.state)
            .ok_or(SchedError::NoSuchThread)
    }

    /// Run `f` on every live thread, idle and boot thread included
    pub fn for_each_thread<F>(&self, mut f: F)
    where
        F: FnMut(&Thread),
    {
        self.threads.values().filter(|t| t.is_alive()).for_each(|t| f(t));
    }

    /// Live thread IDs in creation order
    pub fn thread_ids(&self) -> Vec<ThreadId> {
        let mut ids = Vec::new();
        self.for_each_thread(|t| ids.push(t.id));
        ids
    }

    /// Number of threads in the ready queue
    pub fn ready_count(&self) -> usize {
        self.core.ready_count()
    }

    /// Scheduling mode chosen at boot
    pub fn mode(&self) -> SchedulerMode {
        self.config.mode()
    }

    /// Boot configuration
    pub fn config(&self) -> &SchedConfig {
        &self.config
    }

    /// Tick and switch statistics
    pub fn stats(&self) -> SchedStats {
        self.stats
    }

    /// Log the tick statistics
    pub fn print_stats(&self) {
        log::info!(
            "Thread: {} idle ticks, {} kernel ticks, {} context switches",
            self.stats.idle_ticks,
            self.stats.kernel_ticks,
            self.stats.context_switches
        );
    }

    /// Log every live thread
    pub fn dump_threads(&self) {
        log::info!(
            "=== {} threads ({} policy, {} ready) ===",
            self.threads.len(),
            self.core.policy_name(),
            self.ready_count()
        );
        self.for_each_thread(|t| log::info!("  {:?}", t));
    }

    // ========================================================================
    // POLICY EVENTS FROM THE SYNC LAYER
    // ========================================================================

    /// Set a thread's effective priority and tell the policy
    pub(crate) fn update_effective_priority(&mut self, tid: ThreadId, priority: Priority) -> bool {
        let thread = self.thread_mut(tid);
        let old_priority = thread.priority;
        if old_priority == priority {
            return false;
        }
        thread.priority = priority;

        let mut ctx = sched_ctx!(self);
        self.core.priority_changed(&mut ctx, tid, old_priority, priority);
        true
    }

    pub(crate) fn donation_enabled(&self) -> bool {
        self.core.donation_enabled()
    }
}
