/*
 * Scenario Test Suite for the CLUU Scheduler
 *
 * Whole-kernel scenarios driven on the simulated CPU. A context switch on
 * SimulatedCpu returns immediately, so after every call that may switch,
 * the test code simply continues "as" whichever thread the scheduler now
 * reports as current.
 *
 * ## Suites
 * - `priority_sched` - dispatch order, preemption, time slices, lifecycle
 * - `donation` - single, chained and released priority donation
 * - `sync_objects` - semaphores, locks and condition variables
 * - `mlfqs` - load average, recent CPU and derived priorities
 * - `global_api` - the free-function interface on the global instance
 */

mod global_api;
mod mlfqs;
mod sync_objects;

use crate::arch::{Cpu, IntrLevel, SimulatedCpu};
use crate::config::SchedConfig;
use crate::scheduler::Scheduler;

/// Thread body for threads whose code never runs on the simulated CPU
pub(crate) fn noop(_arg: usize) {}

/// A started scheduler on a fresh simulated CPU
pub(crate) fn boot(config: SchedConfig) -> (Scheduler, &'static SimulatedCpu) {
    let cpu = SimulatedCpu::leak();
    let mut sched = Scheduler::new(cpu, config);
    sched.start();
    cpu.set_intr_level(IntrLevel::On);
    (sched, cpu)
}

/// A started scheduler in priority mode
pub(crate) fn boot_priority() -> Scheduler {
    boot(SchedConfig::default()).0
}

/// A started scheduler in MLFQS mode
pub(crate) fn boot_mlfqs() -> Scheduler {
    boot(SchedConfig {
        mlfqs: true,
        ..SchedConfig::default()
    })
    .0
}
