/*
 * MLFQS: recent CPU, load average and derived priorities
 */

use super::{boot, boot_mlfqs, boot_priority, noop};
use crate::SchedError;
use crate::config::SchedConfig;
use crate::fixed_point::Fixed;
use crate::scheduler::{MAIN_THREAD_ID, Priority, SchedulerMode, TimeSliceTicks};

/// MLFQS with a time slice long enough that only priorities force a switch
fn boot_mlfqs_long_slice() -> crate::scheduler::Scheduler {
    boot(SchedConfig {
        mlfqs: true,
        time_slice: TimeSliceTicks(100),
        ..SchedConfig::default()
    })
    .0
}

#[test]
fn fresh_thread_starts_at_default_priority() {
    let mut s = boot_mlfqs();
    assert_eq!(s.mode(), SchedulerMode::Mlfqs);

    let tid = s.create("fresh", Priority::DEFAULT, noop, 0).unwrap();
    assert_eq!(s.priority(tid), Ok(Priority::DEFAULT));
    assert_eq!(s.nice(tid), Ok(0));
    assert_eq!(s.recent_cpu(tid), Ok(Fixed::ZERO));
    assert_eq!(s.load_avg(), Fixed::ZERO);
}

#[test]
fn cpu_use_raises_recent_cpu_and_lowers_priority() {
    let mut s = boot_mlfqs();

    let mut last_recent = 0;
    let mut last_priority = Priority::MAX.0 + 1;
    for tick in 1..=96 {
        s.tick();

        let recent = s.recent_cpu_x100(MAIN_THREAD_ID).unwrap();
        assert!(recent > last_recent, "recent_cpu did not grow at tick {}", tick);
        last_recent = recent;

        if tick % 4 == 0 {
            let priority = s.priority(MAIN_THREAD_ID).unwrap().0;
            assert!(priority < last_priority, "priority did not drop at tick {}", tick);
            assert_eq!(priority, Priority::MAX.0 - tick / 4);
            last_priority = priority;
        }
    }
    assert_eq!(last_recent, 9600);
}

#[test]
fn load_average_is_updated_once_per_second() {
    let mut s = boot_mlfqs();

    for _ in 0..99 {
        s.tick();
    }
    assert_eq!(s.load_avg_x100(), 0);

    // One runnable thread for one second: 1/60 = 0.0166.. -> 2
    s.tick();
    assert_eq!(s.load_avg_x100(), 2);

    // recent_cpu decays with the new load average
    assert!(s.recent_cpu_x100(MAIN_THREAD_ID).unwrap() < 10000);
}

#[test]
fn nice_is_validated_inherited_and_applied_at_once() {
    let mut s = boot_mlfqs();

    assert_eq!(s.set_nice(MAIN_THREAD_ID, 21), Err(SchedError::NiceOutOfRange));
    assert_eq!(s.set_nice(MAIN_THREAD_ID, -21), Err(SchedError::NiceOutOfRange));

    s.set_nice(MAIN_THREAD_ID, 5).unwrap();
    assert_eq!(s.nice(MAIN_THREAD_ID), Ok(5));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority(53)));

    let child = s.create("child", Priority(10), noop, 0).unwrap();
    assert_eq!(s.nice(child), Ok(5));
}

#[test]
fn raising_nice_lets_others_run() {
    let mut s = boot_mlfqs();
    let other = s.create("other", Priority::DEFAULT, noop, 0).unwrap();
    assert_eq!(s.current(), MAIN_THREAD_ID);

    // 63 - 2*20 = 23 < 31
    s.set_nice(MAIN_THREAD_ID, 20).unwrap();
    assert_eq!(s.current(), other);
}

#[test]
fn manual_priority_is_overwritten_at_the_next_recalculation() {
    let mut s = boot_mlfqs();

    s.set_priority(MAIN_THREAD_ID, Priority(10)).unwrap();
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority(10)));

    for _ in 0..4 {
        s.tick();
    }
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority(62)));
}

#[test]
fn locks_do_not_donate_under_mlfqs() {
    let mut s = boot_mlfqs();
    let lock = s.lock_create();

    s.lock_acquire(lock).unwrap();
    let waiter = s.create("waiter", Priority(40), noop, 0).unwrap();
    assert_eq!(s.current(), waiter);
    s.lock_acquire(lock).unwrap();

    assert_eq!(s.current(), MAIN_THREAD_ID);
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority::DEFAULT));

    s.lock_release(lock).unwrap();
    assert_eq!(s.current(), waiter);
    assert_eq!(s.lock_holder(lock), Ok(Some(waiter)));
}

#[test]
fn priority_mode_keeps_a_zero_load_average() {
    let mut s = boot_priority();
    for _ in 0..200 {
        s.tick();
    }
    assert_eq!(s.load_avg_x100(), 0);
    assert_eq!(s.recent_cpu(MAIN_THREAD_ID), Ok(Fixed::ZERO));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority::DEFAULT));
}

#[test]
fn recalculation_that_demotes_the_runner_requests_a_switch() {
    let mut s = boot_mlfqs_long_slice();
    let other = s.create("other", Priority::DEFAULT, noop, 0).unwrap();
    assert_eq!(s.current(), MAIN_THREAD_ID);

    for _ in 0..3 {
        assert!(!s.tick());
    }

    // main: 63 - 4/4 = 62, other: 63
    assert!(s.tick());
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority(62)));
    assert_eq!(s.priority(other), Ok(Priority::MAX));
    assert_eq!(s.current(), MAIN_THREAD_ID);

    s.on_interrupt_return();
    assert_eq!(s.current(), other);
}

#[test]
fn timer_interrupt_switches_on_the_recalculation_boundary() {
    let mut s = boot_mlfqs_long_slice();
    let other = s.create("other", Priority::DEFAULT, noop, 0).unwrap();

    for _ in 0..3 {
        s.on_timer_interrupt();
        assert_eq!(s.current(), MAIN_THREAD_ID);
    }
    s.on_timer_interrupt();
    assert_eq!(s.current(), other);
}

#[test]
fn fractional_recent_cpu_is_truncated_before_subtracting() {
    let mut s = boot_mlfqs();

    // At the one second mark main's recent_cpu of 100 decays to about 3.22,
    // and 3.22 / 4 truncates to zero.
    for _ in 0..100 {
        s.tick();
    }
    assert_eq!(s.recent_cpu_x100(MAIN_THREAD_ID), Ok(322));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority::MAX));
}

#[test]
fn child_with_inherited_nice_is_derived_at_creation() {
    let mut s = boot_mlfqs();
    s.set_nice(MAIN_THREAD_ID, 5).unwrap();

    // 63 - 0 - 2*5
    let child = s.create("child", Priority::DEFAULT, noop, 0).unwrap();
    assert_eq!(s.nice(child), Ok(5));
    assert_eq!(s.priority(child), Ok(Priority(53)));
    assert_eq!(s.base_priority(child), Ok(Priority(53)));
    assert_eq!(s.current(), MAIN_THREAD_ID);
}
