/*
 * Simulated CPU
 *
 * A `Cpu` backend with no hardware behind it. The interrupt flag and the
 * "inside an interrupt handler" flag live in atomics, and a context switch
 * just counts itself and returns.
 *
 * Because the switch returns immediately, code driving a scheduler on this
 * backend keeps executing after a blocking call, but the scheduler's notion
 * of the current thread has moved on. Test scenarios use this to play each
 * thread in turn.
 */

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{Cpu, IntrLevel};
use crate::scheduler::{Context, KernelStack, ThreadFunc};

/// In-memory CPU model
#[derive(Debug)]
pub struct SimulatedCpu {
    interrupts_on: AtomicBool,
    in_interrupt: AtomicBool,
    switches: AtomicUsize,
    idle_waits: AtomicUsize,
}

impl SimulatedCpu {
    /// Create a CPU with interrupts disabled, as at boot
    pub const fn new() -> Self {
        Self {
            interrupts_on: AtomicBool::new(false),
            in_interrupt: AtomicBool::new(false),
            switches: AtomicUsize::new(0),
            idle_waits: AtomicUsize::new(0),
        }
    }

    /// Create a CPU that lives for the rest of the program
    pub fn leak() -> &'static SimulatedCpu {
        alloc::boxed::Box::leak(alloc::boxed::Box::new(Self::new()))
    }

    /// Pretend an external interrupt handler is (or stops) running
    pub fn set_in_interrupt(&self, value: bool) {
        self.in_interrupt.store(value, Ordering::SeqCst);
    }

    /// Number of context switches performed so far
    pub fn switch_count(&self) -> usize {
        self.switches.load(Ordering::SeqCst)
    }

    /// Number of times the idle thread asked to wait for an interrupt
    pub fn idle_wait_count(&self) -> usize {
        self.idle_waits.load(Ordering::SeqCst)
    }
}

impl Default for SimulatedCpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu for SimulatedCpu {
    fn intr_level(&self) -> IntrLevel {
        if self.interrupts_on.load(Ordering::SeqCst) {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn set_intr_level(&self, level: IntrLevel) -> IntrLevel {
        let was_on = self
            .interrupts_on
            .swap(level == IntrLevel::On, Ordering::SeqCst);
        if was_on { IntrLevel::On } else { IntrLevel::Off }
    }

    fn in_interrupt(&self) -> bool {
        self.in_interrupt.load(Ordering::SeqCst)
    }

    fn prepare_context(&self, stack: &mut KernelStack, _entry: ThreadFunc, _arg: usize) -> Context {
        Context { sp: stack.top() }
    }

    unsafe fn switch(&self, _from: *mut Context, _to: *const Context) {
        self.switches.fetch_add(1, Ordering::SeqCst);
    }

    fn idle_wait(&self) {
        self.idle_waits.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_level_round_trip() {
        let cpu = SimulatedCpu::new();
        assert_eq!(cpu.intr_level(), IntrLevel::Off);
        assert_eq!(cpu.set_intr_level(IntrLevel::On), IntrLevel::Off);
        assert_eq!(cpu.intr_disable(), IntrLevel::On);
        assert_eq!(cpu.intr_level(), IntrLevel::Off);
    }

    #[test]
    fn switch_only_counts() {
        let cpu = SimulatedCpu::new();
        let mut a = Context::default();
        let b = Context { sp: 0x1000 };
        unsafe { cpu.switch(&mut a, &b) };
        assert_eq!(cpu.switch_count(), 1);
        assert_eq!(a, Context::default());
    }
}
