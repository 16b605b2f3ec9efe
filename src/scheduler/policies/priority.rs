/*
 * Priority Scheduling Policy
 *
 * Strict priority scheduling with round-robin among equals:
 *
 * - The ready thread with the highest effective priority always runs next
 * - Threads of equal priority run in the order they became ready
 * - Every thread gets the same time slice; when it runs out the thread goes
 *   to the back of the ready queue
 *
 * Effective priorities are raised and lowered by the donation engine in the
 * lock code. The ready queue is scanned at pick time, so a donation that
 * lands while a thread is queued needs no requeue.
 *
 * This is the default policy for CLUU.
 */

use super::super::{
    Priority, ThreadId,
    events::SchedEvent,
    queue::ThreadQueue,
    traits::{KernelSchedCtx, SchedPolicy},
    types::{DispatchDecision, TimeSliceTicks},
};

/// Priority scheduling policy
pub struct PriorityPolicy {
    /// Threads ready to run, in arrival order
    ready_queue: ThreadQueue,

    /// Time slice handed out on every dispatch
    timeslice: TimeSliceTicks,
}

impl PriorityPolicy {
    /// Create a new priority policy
    pub fn new(timeslice: TimeSliceTicks) -> Self {
        Self {
            ready_queue: ThreadQueue::new(),
            timeslice,
        }
    }

    /// Put a thread at the back of the ready queue
    ///
    /// The idle thread is never queued; it runs only when the queue is empty.
    pub(super) fn enqueue(&mut self, ctx: &dyn KernelSchedCtx, tid: ThreadId) {
        if Some(tid) == ctx.idle_thread() {
            return;
        }
        if !self.ready_queue.contains(tid) {
            self.ready_queue.push_back(tid);
        }
    }
}

impl SchedPolicy for PriorityPolicy {
    fn on_event(&mut self, ctx: &mut dyn KernelSchedCtx, event: SchedEvent) {
        match event {
            SchedEvent::ThreadCreated { tid, .. } | SchedEvent::ThreadYielded { tid } => {
                self.enqueue(ctx, tid);
            }

            SchedEvent::ThreadWoke { tid, was_blocked_on } => {
                log::trace!("[priority] {} woke from {:?}", tid, was_blocked_on);
                self.enqueue(ctx, tid);
            }

            SchedEvent::ThreadBlocked { tid, .. } | SchedEvent::ThreadExited { tid, .. } => {
                self.ready_queue.remove(tid);
            }

            SchedEvent::PriorityChanged {
                tid,
                old_priority,
                new_priority,
            } => {
                log::trace!(
                    "[priority] {} priority {} -> {}",
                    tid,
                    old_priority.0,
                    new_priority.0
                );
            }

            SchedEvent::Tick { .. } | SchedEvent::NiceChanged { .. } => {}
        }
    }

    fn pick_next(&mut self, ctx: &mut dyn KernelSchedCtx) -> DispatchDecision {
        let next = self
            .ready_queue
            .pop_max(|tid| ctx.thread_priority(tid).unwrap_or(Priority::MIN));

        match next {
            Some(tid) => DispatchDecision::run_thread(tid, self.timeslice),
            None => DispatchDecision::idle(self.timeslice),
        }
    }

    fn highest_ready(&self, ctx: &dyn KernelSchedCtx) -> Option<Priority> {
        self.ready_queue
            .max_priority(|tid| ctx.thread_priority(tid).unwrap_or(Priority::MIN))
    }

    fn ready_count(&self) -> usize {
        self.ready_queue.len()
    }

    fn donation_enabled(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "Priority"
    }
}
