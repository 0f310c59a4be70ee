// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Conductor Contributors

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use conductor_bus::{MessageBus, ProcessBus, Topic};
use conductor_scheduler::TimerThread;

/// S6: enqueue 100 no-op commands onto a process thread, then stop; the
/// worker exits after draining some prefix, and no callback runs after
/// `stop()` returns and `join()` completes.
#[test]
fn stop_mid_flight_drains_prefix_then_halts() {
    let timer = TimerThread::start();
    let bus = MessageBus::new(timer.clone());
    bus.start();

    let a = ProcessBus::new("a", timer.clone(), bus.clone());
    a.start();

    let executed = Arc::new(AtomicUsize::new(0));
    for _ in 0..100 {
        let executed = executed.clone();
        let _ = a.enqueue(Box::new(move || { executed.fetch_add(1, Ordering::SeqCst); }));
    }
    a.stop();
    a.join();

    let after_join = executed.load(Ordering::SeqCst);
    assert!(after_join <= 100);

    // Nothing runs after join has returned.
    std::thread::sleep(std::time::Duration::from_millis(20));
    assert_eq!(executed.load(Ordering::SeqCst), after_join);

    bus.stop();
    bus.join();
    timer.stop();
    timer.join();
}

/// Delivery isolation (property 6): a handler registered on context A is
/// invoked only on A's process thread, even when the publisher is on B's.
#[test]
fn handler_runs_only_on_its_own_context() {
    let timer = TimerThread::start();
    let bus = MessageBus::new(timer.clone());
    bus.start();

    let a = ProcessBus::new("a", timer.clone(), bus.clone());
    a.start();
    let b = ProcessBus::new("b", timer.clone(), bus.clone());
    b.start();

    let observed_on_a = Arc::new(std::sync::Mutex::new(None));
    let observed2 = observed_on_a.clone();
    a.subscribe::<u32, _>(Arc::new(Topic::new("x")), move |_h, _v: &u32| {
        *observed2.lock().unwrap() = Some(std::thread::current().id());
    });

    b.publish(Topic::new("x"), 7u32, None).unwrap();

    let mut attempts = 0;
    while observed_on_a.lock().unwrap().is_none() && attempts < 100 {
        std::thread::sleep(std::time::Duration::from_millis(10));
        attempts += 1;
    }
    assert!(observed_on_a.lock().unwrap().is_some());

    a.stop();
    b.stop();
    a.join();
    b.join();
    bus.stop();
    bus.join();
    timer.stop();
    timer.join();
}
