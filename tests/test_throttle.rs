//! Flush interval control under synthetic load

use esmonitor::throttle::{Adjustment, ManualScheduler, MockClock, ThrottleController};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn controller() -> (ThrottleController, MockClock, Arc<ManualScheduler>) {
    let clock = MockClock::new(Instant::now());
    let scheduler = Arc::new(ManualScheduler::new());
    let controller = ThrottleController::new(Arc::new(clock.clone()), scheduler.clone());
    (controller, clock, scheduler)
}

/// `count` events evenly spread so the last one closes a 1s window
fn window(controller: &ThrottleController, clock: &MockClock, count: u32) -> Adjustment {
    let step = Duration::from_secs(1) / count;
    for _ in 0..count - 1 {
        clock.advance(step);
        controller.register_event();
    }
    clock.advance(Duration::from_secs(1) - step * (count - 1));
    controller.register_event()
}

fn in_bounds(interval: f64) -> bool {
    (0.1 - 1e-9..=1.5 + 1e-9).contains(&interval)
}

#[test]
fn test_fifteen_hundred_events_in_one_second() {
    let (controller, clock, _) = controller();
    window(&controller, &clock, 1500);
    // 0.1 + 0.001 * (1500 - 1000)
    assert!((controller.save_interval() - 0.6).abs() < 1e-3);
}

#[test]
fn test_interval_stays_in_bounds() {
    let (controller, clock, scheduler) = controller();
    // Deterministic pseudo random load
    let mut seed: u64 = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
        seed ^= seed << 13;
        seed ^= seed >> 7;
        seed ^= seed << 17;
        seed
    };

    for _ in 0..200 {
        let burst = (next() % 6000) as u32 + 1;
        window(&controller, &clock, burst);
        assert!(in_bounds(controller.save_interval()));

        if next() % 3 == 0 {
            scheduler.run_pending();
            assert!(in_bounds(controller.save_interval()));
        }
        if next() % 5 == 0 {
            clock.advance(Duration::from_millis(next() % 5000));
        }
    }
    scheduler.run_pending();
    assert!(in_bounds(controller.save_interval()));
}

#[test]
fn test_sustained_heavy_flow_never_lowers_interval() {
    let (controller, clock, scheduler) = controller();
    let mut previous = controller.save_interval();
    for _ in 0..30 {
        window(&controller, &clock, 1300);
        scheduler.run_pending();
        let current = controller.save_interval();
        assert!(current >= previous);
        previous = current;
    }
    assert_eq!(scheduler.pending_count(), 0);
    assert!((previous - 1.5).abs() < 1e-9);
}

#[test]
fn test_idle_flow_never_raises_interval() {
    let (controller, clock, scheduler) = controller();
    for _ in 0..3 {
        window(&controller, &clock, 3000);
    }
    let mut previous = controller.save_interval();
    assert!(previous > 1.0);

    for _ in 0..20 {
        // One stray event after a long quiet period
        clock.advance(Duration::from_secs(10));
        let adjustment = controller.register_event();
        assert!(!matches!(adjustment, Adjustment::Increased { .. }));
        scheduler.run_pending();

        let current = controller.save_interval();
        assert!(current <= previous);
        previous = current;
    }
    assert!((previous - 0.1).abs() < 1e-9);
}

#[test]
fn test_event_rate_is_readable_while_counting() {
    let (controller, clock, _) = controller();
    let reader = controller.clone();
    for _ in 0..200 {
        controller.register_event();
    }
    clock.advance(Duration::from_millis(250));
    assert!((reader.event_rate() - 800.0).abs() < 1e-6);
    assert!((reader.save_interval() - 0.1).abs() < 1e-9);
}

#[test]
fn test_readers_see_consistent_state_under_concurrent_load() {
    let (controller, clock, scheduler) = controller();
    let done = AtomicBool::new(false);
    let reads = AtomicU64::new(0);

    thread::scope(|scope| {
        for _ in 0..2 {
            let reader = controller.clone();
            let (done, reads) = (&done, &reads);
            scope.spawn(move || {
                while !done.load(Ordering::Acquire) {
                    let interval = reader.save_interval();
                    assert!(interval.is_finite() && in_bounds(interval), "interval {}", interval);
                    let rate = reader.event_rate();
                    assert!(rate.is_finite() && rate >= 0.0, "rate {}", rate);
                    reads.fetch_add(1, Ordering::Relaxed);
                }
            });
        }

        for round in 0..40 {
            window(&controller, &clock, if round % 4 == 3 { 10 } else { 4000 });
            if round % 3 == 0 {
                scheduler.run_pending();
            }
        }
        scheduler.run_pending();
        while reads.load(Ordering::Relaxed) == 0 {
            thread::yield_now();
        }
        done.store(true, Ordering::Release);
    });

    assert!(reads.load(Ordering::Relaxed) > 0);
    assert!(in_bounds(controller.save_interval()));
}
