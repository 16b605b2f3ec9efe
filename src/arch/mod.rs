/*
 * CPU Backend Abstraction
 *
 * The scheduler core never executes privileged instructions directly. It asks
 * a `Cpu` backend to:
 *
 * - Report and change the interrupt level (the only mutual exclusion on a
 *   single processor)
 * - Tell whether we are running inside an external interrupt handler
 * - Lay out the initial context of a new thread on its kernel stack
 * - Switch from one saved context to another
 *
 * Backends:
 * - `x86_64::X86Cpu`: bare-metal backend (cli/sti/hlt + stack switch routine)
 * - `sim::SimulatedCpu`: models the interrupt flag in memory; a switch only
 *   records itself. Used by the host test suite.
 */

pub mod sim;

#[cfg(all(target_arch = "x86_64", any(target_os = "none", target_os = "linux")))]
pub mod x86_64;

use crate::scheduler::{Context, KernelStack, ThreadFunc};

pub use sim::SimulatedCpu;

/// Interrupt level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// CPU backend used by the scheduler mechanism
pub trait Cpu: Send + Sync {
    /// Current interrupt level
    fn intr_level(&self) -> IntrLevel;

    /// Set the interrupt level, returning the previous one
    fn set_intr_level(&self, level: IntrLevel) -> IntrLevel;

    /// Disable interrupts, returning the previous level
    fn intr_disable(&self) -> IntrLevel {
        self.set_intr_level(IntrLevel::Off)
    }

    /// True while an external interrupt handler is running
    fn in_interrupt(&self) -> bool;

    /// Build the first context of a thread that will start in `entry(arg)`
    fn prepare_context(&self, stack: &mut KernelStack, entry: ThreadFunc, arg: usize) -> Context;

    /// Save the running context into `from` and resume `to`
    ///
    /// # Safety
    /// Both pointers must reference live contexts owned by the scheduler,
    /// interrupts must be disabled, and `to` must have been produced by
    /// `prepare_context` or by an earlier switch away from that thread.
    unsafe fn switch(&self, from: *mut Context, to: *const Context);

    /// Idle until the next interrupt (body of the idle thread)
    fn idle_wait(&self);

    /// Backend name for logging
    fn name(&self) -> &'static str;
}
