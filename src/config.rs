/*
 * Scheduler Boot Configuration
 *
 * The scheduler is configured once at boot, before the first thread is
 * created. The only runtime-visible switch is the scheduling mode: the
 * kernel command line option `-o mlfqs` selects the multi-level feedback
 * queue scheduler instead of strict priority scheduling with donation.
 */

use crate::scheduler::{SchedulerMode, TimeSliceTicks};

/// Timer interrupts per second (PIT programmed at 100Hz)
pub const TIMER_FREQ: u32 = 100;

/// Kernel stack size for every spawned thread
pub const THREAD_STACK_SIZE: usize = 16 * 1024;

/// Scheduler configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedConfig {
    /// Use the MLFQS policy (priority donation disabled)
    pub mlfqs: bool,

    /// Ticks a thread may run before it is preempted
    pub time_slice: TimeSliceTicks,

    /// Timer interrupts per second; drives the once-per-second MLFQS pass
    pub timer_freq: u32,

    /// Bytes of kernel stack allocated per thread
    pub stack_size: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            mlfqs: false,
            time_slice: TimeSliceTicks::DEFAULT,
            timer_freq: TIMER_FREQ,
            stack_size: THREAD_STACK_SIZE,
        }
    }
}

impl SchedConfig {
    /// Parse the kernel command line
    ///
    /// Recognizes `-o mlfqs` (and the short form `-mlfqs`). Every other
    /// token belongs to some other subsystem and is ignored.
    pub fn from_cmdline(cmdline: &str) -> Self {
        let mut config = Self::default();
        let mut tokens = cmdline.split_whitespace();

        while let Some(token) = tokens.next() {
            match token {
                "-o" => {
                    if tokens.next() == Some("mlfqs") {
                        config.mlfqs = true;
                    }
                }
                "-mlfqs" => config.mlfqs = true,
                _ => {}
            }
        }

        config
    }

    /// Scheduling mode selected by this configuration
    pub fn mode(&self) -> SchedulerMode {
        if self.mlfqs {
            SchedulerMode::Mlfqs
        } else {
            SchedulerMode::Priority
        }
    }
}
