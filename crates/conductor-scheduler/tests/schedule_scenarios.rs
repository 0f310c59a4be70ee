// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use conductor_core::CommandQueue;
use conductor_scheduler::{ProcessThread, TimerThread};

fn poll_until(mut check: impl FnMut() -> bool, attempts: usize, step: Duration) -> bool {
    for _ in 0..attempts {
        if check() {
            return true;
        }
        thread::sleep(step);
    }
    check()
}

/// S2: a later one-shot scheduled first (50ms) and an earlier one-shot
/// scheduled second (20ms) fire in expiration order, both on the owning
/// thread's queue.
#[test]
fn earlier_delay_fires_before_later_delay() {
    let timer = TimerThread::start();
    let process = ProcessThread::new("a", timer.clone());
    process.start();

    let order: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let order_slow = order.clone();
    let order_fast = order.clone();

    process.schedule(move || order_slow.lock().unwrap().push("slow"), Duration::from_millis(50));
    process.schedule(move || order_fast.lock().unwrap().push("fast"), Duration::from_millis(20));

    assert!(poll_until(|| order.lock().unwrap().len() == 2, 100, Duration::from_millis(10)));
    assert_eq!(*order.lock().unwrap(), vec!["fast", "slow"]);

    process.stop();
    process.join();
    timer.stop();
    timer.join();
}

/// S3: a recurring schedule with first=10ms, interval=30ms, cancelled after
/// the 3rd tick, fires exactly 3 times.
#[test]
fn recurring_schedule_stops_after_cancel() {
    let timer = TimerThread::start();
    let process = ProcessThread::new("a", timer.clone());
    process.start();

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticks_for_action = ticks.clone();
    let control = process.schedule_on_interval(
        move || { ticks_for_action.fetch_add(1, Ordering::SeqCst); },
        Duration::from_millis(10),
        Duration::from_millis(30),
    );

    assert!(poll_until(|| ticks.load(Ordering::SeqCst) >= 3, 100, Duration::from_millis(10)));
    control.cancel();
    let at_cancel = ticks.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(100));
    assert_eq!(ticks.load(Ordering::SeqCst), at_cancel);

    process.stop();
    process.join();
    timer.stop();
    timer.join();
}

/// Property 3: scheduling monotonicity — an event scheduled with delay d
/// runs no earlier than the scheduling instant + d.
#[test]
fn scheduled_event_does_not_run_early() {
    let timer = TimerThread::start();
    let queue = Arc::new(CommandQueue::new("q"));
    let ran_at: Arc<Mutex<Option<Instant>>> = Arc::new(Mutex::new(None));
    let ran_at2 = ran_at.clone();
    let started = Instant::now();
    let _control = timer.schedule(
        queue.clone(),
        Arc::new(move || { *ran_at2.lock().unwrap() = Some(Instant::now()); }),
        Duration::from_millis(30),
    );
    let consumer = queue.clone();
    thread::spawn(move || consumer.run());

    assert!(poll_until(|| ran_at.lock().unwrap().is_some(), 100, Duration::from_millis(10)));
    let elapsed = ran_at.lock().unwrap().unwrap() - started;
    assert!(elapsed >= Duration::from_millis(25), "ran too early: {elapsed:?}");

    queue.stop();
    timer.stop();
    timer.join();
}
