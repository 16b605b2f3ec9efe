/*
 * The free-function interface on the global scheduler
 *
 * The global instance can be initialised once per process, so everything
 * runs in one test.
 */

use core::sync::atomic::{AtomicBool, Ordering};

use super::noop;
use crate::SchedError;
use crate::arch::{Cpu, IntrLevel, SimulatedCpu};
use crate::config::SchedConfig;
use crate::scheduler::{self, Context, KernelStack, MAIN_THREAD_ID, Priority, ThreadFunc, ThreadId};
use crate::sync;

/// Simulated CPU that notes interrupts being enabled under the scheduler lock
struct LockCheckingCpu {
    inner: SimulatedCpu,
    enabled_while_locked: AtomicBool,
}

impl Cpu for LockCheckingCpu {
    fn intr_level(&self) -> IntrLevel {
        self.inner.intr_level()
    }

    fn set_intr_level(&self, level: IntrLevel) -> IntrLevel {
        if level == IntrLevel::On && scheduler::scheduler_lock_held() {
            self.enabled_while_locked.store(true, Ordering::SeqCst);
        }
        self.inner.set_intr_level(level)
    }

    fn in_interrupt(&self) -> bool {
        self.inner.in_interrupt()
    }

    fn prepare_context(&self, stack: &mut KernelStack, entry: ThreadFunc, arg: usize) -> Context {
        self.inner.prepare_context(stack, entry, arg)
    }

    unsafe fn switch(&self, from: *mut Context, to: *const Context) {
        unsafe { self.inner.switch(from, to) }
    }

    fn idle_wait(&self) {
        self.inner.idle_wait()
    }

    fn name(&self) -> &'static str {
        "lock-checking"
    }
}

static CPU: LockCheckingCpu = LockCheckingCpu {
    inner: SimulatedCpu::new(),
    enabled_while_locked: AtomicBool::new(false),
};

#[test]
fn global_interface_end_to_end() {
    assert!(!scheduler::is_initialized());
    assert_eq!(
        scheduler::thread_priority(MAIN_THREAD_ID),
        Err(SchedError::NotInitialized)
    );
    assert_eq!(scheduler::yield_now(), Err(SchedError::NotInitialized));
    assert_eq!(scheduler::on_timer_interrupt(), Err(SchedError::NotInitialized));
    assert_eq!(scheduler::on_interrupt_return(), Err(SchedError::NotInitialized));
    assert_eq!(scheduler::print_stats(), Err(SchedError::NotInitialized));

    scheduler::init(&CPU, SchedConfig::from_cmdline("-q run alarm"));
    scheduler::start().unwrap();
    assert!(scheduler::is_initialized());
    assert_eq!(CPU.intr_level(), IntrLevel::On);
    assert!(!CPU.enabled_while_locked.load(Ordering::SeqCst));
    assert_eq!(scheduler::current_thread_id(), MAIN_THREAD_ID);

    let worker = scheduler::spawn_thread("worker", Priority(10), noop, 0).unwrap();
    assert_eq!(scheduler::thread_priority(worker), Ok(Priority(10)));
    assert_eq!(
        scheduler::spawn_thread("bad", Priority(99), noop, 0),
        Err(SchedError::PriorityOutOfRange)
    );
    assert_eq!(scheduler::thread_priority(ThreadId(999)), Err(SchedError::NoSuchThread));

    scheduler::set_thread_nice(worker, 3).unwrap();
    assert_eq!(scheduler::thread_nice(worker), Ok(3));
    scheduler::set_thread_priority(worker, Priority(12)).unwrap();
    assert_eq!(scheduler::thread_priority(worker), Ok(Priority(12)));
    assert_eq!(scheduler::load_avg_x100(), Ok(0));
    assert_eq!(scheduler::recent_cpu_x100(worker), Ok(0));

    let lock = sync::lock_create().unwrap();
    sync::lock_acquire(lock).unwrap();
    assert_eq!(sync::lock_held_by_current(lock), Ok(true));
    assert_eq!(sync::lock_try_acquire(sync::LockId(999)), Err(SchedError::NoSuchLock));
    sync::lock_release(lock).unwrap();
    assert_eq!(sync::lock_held_by_current(lock), Ok(false));

    let sema = sync::sema_create(0).unwrap();
    sync::sema_up(sema).unwrap();
    assert_eq!(sync::sema_try_down(sema), Ok(true));
    assert_eq!(sync::sema_try_down(sema), Ok(false));

    let cv = sync::condvar_create().unwrap();
    sync::lock_acquire(lock).unwrap();
    sync::condvar_signal(cv, lock).unwrap();
    sync::condvar_broadcast(cv, lock).unwrap();
    sync::lock_release(lock).unwrap();

    for _ in 0..8 {
        scheduler::on_timer_interrupt().unwrap();
    }
    scheduler::on_interrupt_return().unwrap();
    scheduler::yield_now().unwrap();
    assert_eq!(scheduler::current_thread_id(), MAIN_THREAD_ID);
    assert_eq!(scheduler::reap_thread(worker), Ok(None));
    assert_eq!(
        scheduler::with_scheduler(|s| s.stats().kernel_ticks),
        Ok(8)
    );
    scheduler::print_stats().unwrap();
    assert!(!CPU.enabled_while_locked.load(Ordering::SeqCst));
}
