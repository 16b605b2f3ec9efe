/*
 * Semaphores, locks and condition variables
 */

use super::{boot_priority, noop};
use crate::SchedError;
use crate::scheduler::{MAIN_THREAD_ID, Priority, ThreadState};
use crate::sync::{LockId, SemaphoreId};

#[test]
fn semaphore_wakes_highest_priority_waiter_first() {
    let mut s = boot_priority();
    let sema = s.sema_create(0);

    // Let every new thread run straight away and block on the semaphore
    s.set_priority(MAIN_THREAD_ID, Priority::MIN).unwrap();
    let mut waiters = std::vec::Vec::new();
    for priority in [2, 9, 5] {
        let tid = s.create("waiter", Priority(priority), noop, 0).unwrap();
        assert_eq!(s.current(), tid);
        s.sema_down(sema).unwrap();
        assert_eq!(s.current(), MAIN_THREAD_ID);
        waiters.push(tid);
    }
    let (two, nine, five) = (waiters[0], waiters[1], waiters[2]);
    s.set_priority(MAIN_THREAD_ID, Priority::MAX).unwrap();

    s.sema_up(sema).unwrap();
    assert_eq!(s.state(nine), Ok(ThreadState::Ready));
    assert_eq!(s.state(five), Ok(ThreadState::Blocked));
    s.sema_up(sema).unwrap();
    assert_eq!(s.state(five), Ok(ThreadState::Ready));
    assert_eq!(s.state(two), Ok(ThreadState::Blocked));
    s.sema_up(sema).unwrap();
    assert_eq!(s.state(two), Ok(ThreadState::Ready));

    // Each up handed its unit straight to a waiter
    assert_eq!(s.sema_value(sema), Ok(0));
}

#[test]
fn semaphore_up_without_waiters_banks_the_unit() {
    let mut s = boot_priority();
    let sema = s.sema_create(1);

    assert_eq!(s.sema_try_down(sema), Ok(true));
    assert_eq!(s.sema_try_down(sema), Ok(false));
    s.sema_up(sema).unwrap();
    s.sema_up(sema).unwrap();
    assert_eq!(s.sema_value(sema), Ok(2));

    s.sema_down(sema).unwrap();
    assert_eq!(s.current(), MAIN_THREAD_ID);
    assert_eq!(s.sema_value(sema), Ok(1));
}

#[test]
fn waking_a_better_thread_preempts_the_waker() {
    let mut s = boot_priority();
    let sema = s.sema_create(0);

    let waiter = s.create("waiter", Priority(50), noop, 0).unwrap();
    s.sema_down(sema).unwrap();
    assert_eq!(s.current(), MAIN_THREAD_ID);

    s.sema_up(sema).unwrap();
    assert_eq!(s.current(), waiter);
}

#[test]
fn unknown_handles_are_reported() {
    let mut s = boot_priority();
    assert_eq!(s.sema_up(SemaphoreId(999)), Err(SchedError::NoSuchSemaphore));
    assert_eq!(s.lock_acquire(LockId(999)), Err(SchedError::NoSuchLock));
    let lock = s.lock_create();
    let cv = s.condvar_create();
    assert_eq!(
        s.condvar_signal(crate::sync::CondvarId(999), lock),
        Err(SchedError::NoSuchCondvar)
    );
    assert_eq!(s.condvar_waiting(cv), Ok(0));
}

#[test]
fn releasing_an_uncontended_lock_leaves_it_free() {
    let mut s = boot_priority();
    let lock = s.lock_create();
    let other = s.create("other", Priority(7), noop, 0).unwrap();

    s.lock_acquire(lock).unwrap();
    assert_eq!(s.lock_holder(lock), Ok(Some(MAIN_THREAD_ID)));
    let sema = s.sync.lock(lock).unwrap().semaphore();
    assert_eq!(s.sema_value(sema), Ok(0));

    s.lock_release(lock).unwrap();
    assert_eq!(s.lock_holder(lock), Ok(None));
    assert_eq!(s.sema_value(sema), Ok(1));
    assert_eq!(s.held_locks(MAIN_THREAD_ID), Ok(vec![]));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority::DEFAULT));
    assert_eq!(s.priority(other), Ok(Priority(7)));
    assert_eq!(s.current(), MAIN_THREAD_ID);
}

#[test]
fn try_acquire_never_waits() {
    let mut s = boot_priority();
    let lock = s.lock_create();

    let holder = s.create("holder", Priority(40), noop, 0).unwrap();
    assert_eq!(s.lock_try_acquire(lock), Ok(true));
    s.block_current();

    assert_eq!(s.lock_try_acquire(lock), Ok(false));
    assert_eq!(s.lock_held_by_current(lock), Ok(false));
    assert_eq!(s.lock_holder(lock), Ok(Some(holder)));
    assert_eq!(s.current(), MAIN_THREAD_ID);
}

#[test]
#[should_panic(expected = "already holds")]
fn acquiring_a_held_lock_again_is_fatal() {
    let mut s = boot_priority();
    let lock = s.lock_create();
    s.lock_acquire(lock).unwrap();
    let _ = s.lock_acquire(lock);
}

#[test]
#[should_panic(expected = "does not hold")]
fn releasing_someone_elses_lock_is_fatal() {
    let mut s = boot_priority();
    let lock = s.lock_create();
    let _ = s.lock_release(lock);
}

#[test]
fn condvar_signal_hands_the_lock_back_to_the_waiter() {
    let mut s = boot_priority();
    let lock = s.lock_create();
    let cv = s.condvar_create();

    let waiter = s.create("waiter", Priority(40), noop, 0).unwrap();
    s.lock_acquire(lock).unwrap();
    s.condvar_wait(cv, lock).unwrap();
    assert_eq!(s.current(), MAIN_THREAD_ID);
    assert_eq!(s.lock_holder(lock), Ok(None));
    assert_eq!(s.condvar_waiting(cv), Ok(1));

    s.lock_acquire(lock).unwrap();
    s.condvar_signal(cv, lock).unwrap();
    // The signalled waiter now waits for the lock and donates to us
    assert_eq!(s.current(), MAIN_THREAD_ID);
    assert_eq!(s.state(waiter), Ok(ThreadState::Blocked));
    assert_eq!(s.waiting_lock(waiter), Ok(Some(lock)));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority(40)));

    s.lock_release(lock).unwrap();
    assert_eq!(s.current(), waiter);
    assert_eq!(s.lock_holder(lock), Ok(Some(waiter)));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority::DEFAULT));
}

#[test]
fn condvar_broadcast_wakes_in_priority_order() {
    let mut s = boot_priority();
    let lock = s.lock_create();
    let cv = s.condvar_create();

    let mut waiters = std::vec::Vec::new();
    for priority in [40, 45] {
        let tid = s.create("waiter", Priority(priority), noop, 0).unwrap();
        s.lock_acquire(lock).unwrap();
        s.condvar_wait(cv, lock).unwrap();
        assert_eq!(s.current(), MAIN_THREAD_ID);
        waiters.push(tid);
    }
    let (forty, forty_five) = (waiters[0], waiters[1]);

    s.lock_acquire(lock).unwrap();
    s.condvar_broadcast(cv, lock).unwrap();
    assert_eq!(s.condvar_waiting(cv), Ok(0));
    assert_eq!(s.priority(MAIN_THREAD_ID), Ok(Priority(45)));

    s.lock_release(lock).unwrap();
    assert_eq!(s.current(), forty_five);
    s.lock_release(lock).unwrap();
    assert_eq!(s.lock_holder(lock), Ok(Some(forty)));
    assert_eq!(s.current(), forty_five);

    s.exit_current(0);
    assert_eq!(s.current(), forty);
    assert!(s.lock_held_by_current(lock).unwrap());
}

#[test]
#[should_panic(expected = "without holding")]
fn signalling_without_the_lock_is_fatal() {
    let mut s = boot_priority();
    let lock = s.lock_create();
    let cv = s.condvar_create();
    let _ = s.condvar_signal(cv, lock);
}
