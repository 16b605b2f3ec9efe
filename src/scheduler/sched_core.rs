/*
 * Scheduler Core - Policy Holder
 *
 * This module implements SchedulerCore, the layer between the mechanism
 * (thread table, context switches, locks) and the active policy:
 * 1. Holds the active scheduling policy (Box<dyn SchedPolicy>)
 * 2. Manages the processor's scheduling state (timeslice, need_resched)
 * 3. Translates kernel operations into SchedEvents
 * 4. Turns policy decisions into "who runs next"
 *
 * CLUU threads run on a single processor, so there is exactly one
 * CpuSchedState.
 */

use alloc::boxed::Box;

use crate::fixed_point::Fixed;

use super::{
    ThreadId,
    events::SchedEvent,
    traits::{KernelSchedCtx, SchedPolicy},
    types::{BlockReason, Priority},
};

/// Processor scheduling state
#[derive(Debug, Default)]
pub struct CpuSchedState {
    /// Thread currently running on the processor
    pub current_thread: Option<ThreadId>,

    /// Whether to reschedule at the next opportunity
    pub need_resched: bool,

    /// Ticks remaining in the current thread's timeslice
    pub timeslice_remaining: u32,

    /// Total ticks since boot
    pub total_ticks: u64,
}

impl CpuSchedState {
    /// Check if the processor needs to reschedule
    pub fn should_reschedule(&self) -> bool {
        self.need_resched || self.timeslice_remaining == 0
    }
}

/// Scheduler Core
///
/// The mechanism calls methods like thread_created(), thread_woke() and
/// on_tick(), and SchedulerCore forwards them as SchedEvents to the active
/// policy. Reschedule requests raised by the policy through the context
/// are folded into `need_resched`.
pub struct SchedulerCore {
    /// The active scheduling policy (chosen at boot)
    policy: Box<dyn SchedPolicy>,

    /// Processor scheduling state
    state: CpuSchedState,
}

impl SchedulerCore {
    /// Create a new SchedulerCore with the given policy
    pub fn new(policy: Box<dyn SchedPolicy>) -> Self {
        log::info!("SchedulerCore initialized with policy: {}", policy.name());

        Self {
            policy,
            state: CpuSchedState::default(),
        }
    }

    /// Get the name of the active policy
    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Whether locks donate priority under the active policy
    pub fn donation_enabled(&self) -> bool {
        self.policy.donation_enabled()
    }

    /// System load average as tracked by the policy
    pub fn load_avg(&self) -> Fixed {
        self.policy.load_avg()
    }

    /// Number of threads waiting in the ready queue
    pub fn ready_count(&self) -> usize {
        self.policy.ready_count()
    }

    /// Highest effective priority in the ready queue
    pub fn highest_ready(&self, ctx: &dyn KernelSchedCtx) -> Option<Priority> {
        self.policy.highest_ready(ctx)
    }

    /// Forward an event to the policy, collecting any reschedule request
    fn dispatch(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent) {
        log::trace!("[sched] event {}", event.name());
        self.policy.on_event(ctx, event);
        if ctx.take_reschedule_request() {
            self.state.need_resched = true;
        }
    }

    // ========================================================================
    // EVENTS - What the mechanism reports
    // ========================================================================

    /// Notify that a new thread was created
    pub fn thread_created(&mut self, ctx: &mut dyn KernelSchedCtx, tid: ThreadId, priority: Priority) {
        self.dispatch(ctx, SchedEvent::ThreadCreated { tid, priority });
    }

    /// Notify that a blocked thread became runnable
    pub fn thread_woke(&mut self, ctx: &mut dyn KernelSchedCtx, tid: ThreadId, reason: BlockReason) {
        self.dispatch(
            ctx,
            SchedEvent::ThreadWoke {
                tid,
                was_blocked_on: reason,
            },
        );
    }

    /// Notify that the running thread gave up the processor
    pub fn thread_yielded(&mut self, ctx: &mut dyn KernelSchedCtx, tid: ThreadId) {
        self.dispatch(ctx, SchedEvent::ThreadYielded { tid });
        self.state.need_resched = true;
    }

    /// Notify that a thread became blocked
    pub fn thread_blocked(&mut self, ctx: &mut dyn KernelSchedCtx, tid: ThreadId, reason: BlockReason) {
        self.dispatch(ctx, SchedEvent::ThreadBlocked { tid, reason });
        if Some(tid) == self.state.current_thread {
            self.state.need_resched = true;
        }
    }

    /// Notify that a thread exited
    pub fn thread_exited(&mut self, ctx: &mut dyn KernelSchedCtx, tid: ThreadId, exit_code: i32) {
        self.dispatch(ctx, SchedEvent::ThreadExited { tid, exit_code });
        if Some(tid) == self.state.current_thread {
            self.state.need_resched = true;
        }
    }

    /// Notify that a thread's effective priority changed
    pub fn priority_changed(
        &mut self,
        ctx: &mut dyn KernelSchedCtx,
        tid: ThreadId,
        old_priority: Priority,
        new_priority: Priority,
    ) {
        self.dispatch(
            ctx,
            SchedEvent::PriorityChanged {
                tid,
                old_priority,
                new_priority,
            },
        );
    }

    /// Notify that a thread's nice value changed
    pub fn nice_changed(&mut self, ctx: &mut dyn KernelSchedCtx, tid: ThreadId, nice: i32) {
        self.dispatch(ctx, SchedEvent::NiceChanged { tid, nice });
    }

    // ========================================================================
    // TIMER INTERRUPT HANDLING
    // ========================================================================

    /// Handle a timer tick
    ///
    /// # Returns
    /// true if the running thread should give up the processor
    pub fn on_tick(&mut self, ctx: &mut dyn KernelSchedCtx) -> bool {
        self.state.total_ticks += 1;

        if self.state.timeslice_remaining > 0 {
            self.state.timeslice_remaining -= 1;
        }

        let event = SchedEvent::Tick {
            now: self.state.total_ticks,
            current_thread: ctx.current_thread(),
        };
        self.dispatch(ctx, event);

        self.state.should_reschedule()
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Ask the policy which thread runs next
    ///
    /// Falls back to the idle thread when the policy has nothing ready.
    ///
    /// # Returns
    /// - Some(ThreadId): Switch to this thread
    /// - None: nothing is ready and there is no idle thread
    pub fn reschedule(&mut self, ctx: &mut dyn KernelSchedCtx) -> Option<ThreadId> {
        self.state.need_resched = false;

        let decision = self.policy.pick_next(ctx);
        let next = decision.next.or_else(|| ctx.idle_thread());

        self.state.current_thread = next;
        self.state.timeslice_remaining = decision.timeslice.get();
        next
    }

    /// Record the thread that is running without a dispatch (the boot thread)
    pub fn set_current(&mut self, tid: ThreadId, timeslice: u32) {
        self.state.current_thread = Some(tid);
        self.state.timeslice_remaining = timeslice;
    }

    /// Request a reschedule at the next opportunity
    pub fn request_reschedule(&mut self) {
        self.state.need_resched = true;
    }

    /// Check if a reschedule is pending
    pub fn need_resched(&self) -> bool {
        self.state.need_resched
    }

    /// Ticks since boot
    pub fn total_ticks(&self) -> u64 {
        self.state.total_ticks
    }
}
