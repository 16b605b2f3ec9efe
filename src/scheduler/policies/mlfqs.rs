/*
 * MLFQS Scheduling Policy
 *
 * 4.4BSD-style multi-level feedback queue scheduler. Priorities are not set
 * by anyone; they are derived from how much CPU a thread has used recently
 * and from its nice value:
 *
 *   priority   = PRI_MAX - recent_cpu / 4 - nice * 2          (every 4 ticks)
 *   recent_cpu = (2*load_avg)/(2*load_avg + 1) * recent_cpu + nice
 *                                                             (every second)
 *   load_avg   = (59/60)*load_avg + (1/60)*ready_threads      (every second)
 *
 * and the running thread's recent_cpu grows by one on every tick. All of it
 * is 17.14 fixed-point arithmetic.
 *
 * Dispatch itself is the priority policy's: highest priority first, FIFO
 * among equals. Priority donation is disabled in this mode.
 */

use alloc::vec::Vec;

use crate::fixed_point::Fixed;

use super::super::{
    Priority, ThreadId,
    events::SchedEvent,
    traits::{KernelSchedCtx, SchedPolicy},
    types::{DispatchDecision, TimeSliceTicks},
};
use super::PriorityPolicy;

/// Priorities are recomputed every this many ticks
const PRIORITY_PERIOD: u64 = 4;

/// MLFQS scheduling policy
pub struct MlfqsPolicy {
    /// Ready queue and dispatch
    inner: PriorityPolicy,

    /// System load average, estimated once per second
    load_avg: Fixed,
}

impl MlfqsPolicy {
    /// Create a new MLFQS policy
    pub fn new(timeslice: TimeSliceTicks) -> Self {
        Self {
            inner: PriorityPolicy::new(timeslice),
            load_avg: Fixed::ZERO,
        }
    }

    /// priority = PRI_MAX - trunc(recent_cpu/4) - 2*nice, clamped to the valid range
    pub fn derive_priority(recent_cpu: Fixed, nice: i32) -> Priority {
        let cpu_penalty = recent_cpu.div_int(4).to_int_trunc();
        Priority::clamped(Priority::MAX.0 - cpu_penalty - nice * 2)
    }

    /// Non-idle live threads
    fn workers(ctx: &dyn KernelSchedCtx) -> Vec<ThreadId> {
        let idle = ctx.idle_thread();
        let mut threads = ctx.all_threads();
        threads.retain(|&tid| Some(tid) != idle);
        threads
    }

    /// Once-per-second load average and recent_cpu decay
    fn update_load(&mut self, ctx: &mut dyn KernelSchedCtx) {
        let running = usize::from(Some(ctx.current_thread()) != ctx.idle_thread());
        let ready_threads = (self.inner.ready_count() + running) as i32;

        let fifty_nine_sixtieths = Fixed::from_int(59).div_int(60);
        let one_sixtieth = Fixed::from_int(1).div_int(60);
        self.load_avg = fifty_nine_sixtieths * self.load_avg + one_sixtieth * ready_threads;

        let twice_load = self.load_avg * 2;
        let decay = twice_load / (twice_load + 1);

        for tid in Self::workers(ctx) {
            let recent = ctx.recent_cpu(tid).unwrap_or(Fixed::ZERO);
            let nice = ctx.thread_nice(tid).unwrap_or(0);
            ctx.set_recent_cpu(tid, decay * recent + nice);
        }

        log::trace!("[mlfqs] load_avg {} ({} ready)", self.load_avg, ready_threads);
    }

    /// Re-derive one thread's priority
    fn update_priority(ctx: &mut dyn KernelSchedCtx, tid: ThreadId) {
        let recent = ctx.recent_cpu(tid).unwrap_or(Fixed::ZERO);
        let nice = ctx.thread_nice(tid).unwrap_or(0);
        ctx.set_thread_priority(tid, Self::derive_priority(recent, nice));
    }

    /// Ask for a reschedule if the running thread no longer ranks first
    fn check_rank(&self, ctx: &mut dyn KernelSchedCtx) {
        let current = ctx.current_thread();
        let Some(top) = self.inner.highest_ready(ctx) else {
            return;
        };
        let outranked = Some(current) == ctx.idle_thread()
            || ctx.thread_priority(current).is_none_or(|p| top > p);
        if outranked {
            ctx.request_reschedule();
        }
    }
}

impl SchedPolicy for MlfqsPolicy {
    fn on_event(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent) {
        match event {
            SchedEvent::Tick {
                now,
                current_thread,
            } => {
                if Some(current_thread) != ctx.idle_thread() {
                    let recent = ctx.recent_cpu(current_thread).unwrap_or(Fixed::ZERO);
                    ctx.set_recent_cpu(current_thread, recent + 1);
                }

                let freq = u64::from(ctx.timer_freq());
                if freq != 0 && now % freq == 0 {
                    self.update_load(ctx);
                }

                if now % PRIORITY_PERIOD == 0 {
                    for tid in Self::workers(ctx) {
                        Self::update_priority(ctx, tid);
                    }
                    self.check_rank(ctx);
                }
            }

            SchedEvent::ThreadCreated { tid, .. } => {
                // With nothing inherited the derived value would be PRI_MAX;
                // such a thread keeps its requested priority until the next
                // recalculation.
                let inherited = ctx.thread_nice(tid).is_some_and(|n| n != 0)
                    || ctx.recent_cpu(tid).is_some_and(|r| r != Fixed::ZERO);
                if inherited {
                    Self::update_priority(ctx, tid);
                }
                self.inner.on_event(ctx, event);
            }

            SchedEvent::NiceChanged { tid, nice } => {
                ctx.log(log::Level::Debug, "nice changed, re-deriving priority");
                log::trace!("[mlfqs] {} nice {}", tid, nice);
                Self::update_priority(ctx, tid);
                self.check_rank(ctx);
            }

            other => self.inner.on_event(ctx, other),
        }
    }

    fn pick_next(&mut self, ctx: &mut dyn KernelSchedCtx) -> DispatchDecision {
        self.inner.pick_next(ctx)
    }

    fn highest_ready(&self, ctx: &dyn KernelSchedCtx) -> Option<Priority> {
        self.inner.highest_ready(ctx)
    }

    fn ready_count(&self) -> usize {
        self.inner.ready_count()
    }

    fn donation_enabled(&self) -> bool {
        false
    }

    fn load_avg(&self) -> Fixed {
        self.load_avg
    }

    fn name(&self) -> &'static str {
        "MLFQS"
    }
}
