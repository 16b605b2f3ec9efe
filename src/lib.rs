/*
 * CLUU Thread Scheduling Core
 *
 * This crate is the thread-scheduling and synchronization core of the CLUU
 * kernel. It decides which thread runs next, blocks and wakes threads on
 * semaphores, locks and condition variables, and resolves priority inversion
 * through priority donation. An alternate load-aware mode (MLFQS) derives
 * priorities from recent CPU usage and the system load average.
 *
 * Why this is important:
 * - Every data structure here can be touched by the timer interrupt, so all
 *   scheduler state is mutated with interrupts disabled
 * - The ready queue and every wait list always wake the highest effective
 *   priority first, ties broken by arrival order
 * - Donation chains are walked iteratively, bounded by the live thread count
 *
 * Layout:
 * - `fixed_point`: 17.14 fixed-point numbers for the MLFQS arithmetic
 * - `arch`: the CPU backend (interrupt level, context switch)
 * - `scheduler`: thread registry, ready queue, policies and the global API
 * - `sync`: semaphores, locks (with donation) and condition variables
 * - `utils`: kernel logger
 */

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod error;

pub mod arch;
pub mod config;
pub mod fixed_point;
pub mod scheduler;
pub mod sync;
pub mod utils;

#[cfg(test)]
mod tests;

pub use config::SchedConfig;
pub use error::SchedError;
pub use fixed_point::Fixed;
pub use scheduler::{Priority, Scheduler, SchedulerMode, ThreadId, ThreadState};
pub use sync::{CondvarId, LockId, SemaphoreId};
