/*
 * x86_64 CPU Backend
 *
 * Bare-metal implementation of the `Cpu` trait.
 *
 * INTERRUPT LEVEL:
 * ================
 *
 * cli/sti through the x86_64 crate. The interrupt glue brackets every
 * external interrupt handler with `enter_interrupt()` / `leave_interrupt()`
 * so the scheduler can refuse to block inside a handler.
 *
 * CONTEXT SWITCHING:
 * ==================
 *
 * A thread's saved context is just its stack pointer. `cluu_switch_context`
 * pushes the callee-saved registers on the outgoing stack, stores RSP into
 * the outgoing Context, loads the incoming RSP and pops the same registers.
 * Caller-saved registers are already spilled by the Rust caller.
 *
 * INITIAL FRAME FOR A NEW THREAD:
 * ===============================
 *
 * High Address  [16-byte aligned stack top]
 *               [cluu_thread_entry]       <- popped by `ret`
 *               [rbp = 0]
 *               [rbx = arg]
 *               [r12 = entry]
 *               [r13 = 0]
 *               [r14 = 0]
 *               [r15 = 0]                 <- Context.sp
 * Low Address   [... free stack ...][canary]
 *
 * The first switch "returns" into `cluu_thread_entry`, which moves entry/arg
 * into argument registers and calls `thread_start` with RSP 16-byte aligned.
 */

use core::arch::global_asm;
use core::sync::atomic::{AtomicBool, Ordering};

use ::x86_64::instructions::interrupts;

use super::{Cpu, IntrLevel};
use crate::scheduler::{Context, KernelStack, ThreadFunc};

/// Set while an external interrupt handler runs
static IN_INTERRUPT: AtomicBool = AtomicBool::new(false);

global_asm!(
    ".global cluu_switch_context",
    "cluu_switch_context:",
    "    push rbp",
    "    push rbx",
    "    push r12",
    "    push r13",
    "    push r14",
    "    push r15",
    "    mov [rdi], rsp",
    "    mov rsp, rsi",
    "    pop r15",
    "    pop r14",
    "    pop r13",
    "    pop r12",
    "    pop rbx",
    "    pop rbp",
    "    ret",
    "",
    ".global cluu_thread_entry",
    "cluu_thread_entry:",
    "    mov rdi, r12",
    "    mov rsi, rbx",
    "    call {start}",
    "    ud2",
    start = sym thread_start,
);

unsafe extern "C" {
    fn cluu_switch_context(save_sp: *mut usize, load_sp: usize);
    fn cluu_thread_entry();
}

/// First Rust code a new thread executes
extern "C" fn thread_start(entry: usize, arg: usize) -> ! {
    crate::scheduler::thread_started();

    // SAFETY: `entry` was stored by `prepare_context` from a `ThreadFunc`.
    let entry: ThreadFunc = unsafe { core::mem::transmute::<usize, ThreadFunc>(entry) };
    entry(arg);

    crate::scheduler::exit_thread(0)
}

/// Mark the start of an external interrupt handler
pub fn enter_interrupt() {
    IN_INTERRUPT.store(true, Ordering::SeqCst);
}

/// Mark the end of an external interrupt handler
pub fn leave_interrupt() {
    IN_INTERRUPT.store(false, Ordering::SeqCst);
}

/// Bare-metal x86_64 CPU
#[derive(Debug, Default)]
pub struct X86Cpu;

impl Cpu for X86Cpu {
    fn intr_level(&self) -> IntrLevel {
        if interrupts::are_enabled() {
            IntrLevel::On
        } else {
            IntrLevel::Off
        }
    }

    fn set_intr_level(&self, level: IntrLevel) -> IntrLevel {
        let old = self.intr_level();
        match level {
            IntrLevel::On => interrupts::enable(),
            IntrLevel::Off => interrupts::disable(),
        }
        old
    }

    fn in_interrupt(&self) -> bool {
        IN_INTERRUPT.load(Ordering::SeqCst)
    }

    fn prepare_context(&self, stack: &mut KernelStack, entry: ThreadFunc, arg: usize) -> Context {
        let frame = [
            0,                                                  // r15
            0,                                                  // r14
            0,                                                  // r13
            entry as *const () as u64,                          // r12
            arg as u64,                                         // rbx
            0,                                                  // rbp
            cluu_thread_entry as *const () as u64,              // return address
        ];
        Context { sp: stack.push_frame(&frame) }
    }

    unsafe fn switch(&self, from: *mut Context, to: *const Context) {
        // SAFETY: guaranteed by the caller (see trait docs).
        unsafe { cluu_switch_context(&raw mut (*from).sp, (*to).sp) }
    }

    fn idle_wait(&self) {
        interrupts::enable_and_hlt();
    }

    fn name(&self) -> &'static str {
        "x86_64"
    }
}
