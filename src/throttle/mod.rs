//! Adaptive persistence pacing
//!
//! The controller counts admitted events in 1s windows. When a window closes:
//! - rate >= heavy flow rate: the flush interval grows in proportion to the excess, immediately
//! - otherwise, if above the minimum: a fixed step decrease is scheduled after a grace delay
//!
//! Scheduled decreases are never cancelled. An increase that lands between
//! scheduling and firing is still followed by the decrease, so the interval
//! can drift slightly under rapidly alternating load.

pub mod clock;
pub mod scheduler;

pub use clock::{Clock, MockClock, SystemClock};
pub use scheduler::{DeferredScheduler, DeferredTask, ManualScheduler, ThreadScheduler, TokioScheduler};

use log::debug;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::constants::{
    DE_THROTTLE_GRACE, DE_THROTTLE_RATE, HEAVY_FLOW_RATE, MAX_SAVE_INTERVAL, MIN_SAVE_INTERVAL,
    RATE_WINDOW, THROTTLE_FACTOR,
};

/// Tuning knobs of the controller
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThrottleParams {
    /// Events per second at or above which flushing slows down
    pub heavy_flow_rate: f64,
    /// Seconds added per event/second above `heavy_flow_rate`
    pub throttle_factor: f64,
    pub min_interval: f64,
    pub max_interval: f64,
    /// Seconds removed per relaxation step
    pub de_throttle_rate: f64,
    pub window: Duration,
    pub grace: Duration,
}

impl Default for ThrottleParams {
    fn default() -> Self {
        ThrottleParams {
            heavy_flow_rate: HEAVY_FLOW_RATE,
            throttle_factor: THROTTLE_FACTOR,
            min_interval: MIN_SAVE_INTERVAL,
            max_interval: MAX_SAVE_INTERVAL,
            de_throttle_rate: DE_THROTTLE_RATE,
            window: RATE_WINDOW,
            grace: DE_THROTTLE_GRACE,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ThrottleState {
    counter: u64,
    window_start: Instant,
    /// Current flush interval in seconds
    interval: f64,
}

/// What a window rollover did to the interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Adjustment {
    /// Window still open
    None,
    /// Heavy flow, interval raised immediately
    Increased { rate: f64, interval: f64 },
    /// Light flow, a decrease was scheduled
    DecreaseScheduled { rate: f64 },
    /// Light flow, already at the minimum
    Steady { rate: f64 },
}

/// Shared flush-interval controller.
///
/// `register_event` is the single writer; `event_rate` and `save_interval`
/// may be read concurrently and always see a fully applied update.
#[derive(Debug, Clone)]
pub struct ThrottleController {
    state: Arc<RwLock<ThrottleState>>,
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn DeferredScheduler>,
    params: ThrottleParams,
}

impl ThrottleController {
    pub fn new(clock: Arc<dyn Clock>, scheduler: Arc<dyn DeferredScheduler>) -> Self {
        Self::with_params(clock, scheduler, ThrottleParams::default())
    }

    pub fn with_params(
        clock: Arc<dyn Clock>,
        scheduler: Arc<dyn DeferredScheduler>,
        params: ThrottleParams,
    ) -> Self {
        let state = ThrottleState {
            counter: 0,
            window_start: clock.now(),
            interval: params.min_interval,
        };
        ThrottleController {
            state: Arc::new(RwLock::new(state)),
            clock,
            scheduler,
            params,
        }
    }

    /// System clock with relaxation on the current tokio runtime, or on
    /// plain threads outside one
    pub fn system() -> Self {
        let scheduler: Arc<dyn DeferredScheduler> = match TokioScheduler::current() {
            Some(tokio) => Arc::new(tokio),
            None => Arc::new(ThreadScheduler),
        };
        Self::new(Arc::new(SystemClock::new()), scheduler)
    }

    pub fn params(&self) -> &ThrottleParams {
        &self.params
    }

    /// Count one admitted event and adjust the interval if the window closed
    pub fn register_event(&self) -> Adjustment {
        let mut state = self.write();
        state.counter += 1;

        let now = self.clock.now();
        let elapsed = now.saturating_duration_since(state.window_start);
        if elapsed < self.params.window {
            return Adjustment::None;
        }

        let rate = state.counter as f64 / elapsed.as_secs_f64();
        state.counter = 0;
        state.window_start = now;

        if rate >= self.params.heavy_flow_rate {
            let step = self.params.throttle_factor * (rate - self.params.heavy_flow_rate);
            state.interval = (state.interval + step).min(self.params.max_interval);
            debug!(
                "Heavy flow at {:.0} events/s, flush interval raised to {:.4}s",
                rate, state.interval
            );
            return Adjustment::Increased {
                rate,
                interval: state.interval,
            };
        }

        if state.interval > self.params.min_interval {
            drop(state);
            self.schedule_decrease();
            return Adjustment::DecreaseScheduled { rate };
        }

        Adjustment::Steady { rate }
    }

    fn schedule_decrease(&self) {
        let state = Arc::clone(&self.state);
        let params = self.params;
        self.scheduler.schedule(
            params.grace,
            Box::new(move || {
                let mut state = state
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                state.interval = (state.interval - params.de_throttle_rate).max(params.min_interval);
                debug!("Flush interval relaxed to {:.4}s", state.interval);
            }),
        );
    }

    /// Events per second in the current window, 0 when no time has passed
    pub fn event_rate(&self) -> f64 {
        let state = self.read();
        let elapsed = self
            .clock
            .now()
            .saturating_duration_since(state.window_start)
            .as_secs_f64();
        if elapsed > 0.0 {
            state.counter as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Current flush interval in seconds
    pub fn save_interval(&self) -> f64 {
        self.read().interval
    }

    pub fn save_interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.save_interval())
    }

    fn read(&self) -> RwLockReadGuard<'_, ThrottleState> {
        self.state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ThrottleState> {
        self.state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    fn controller() -> (ThrottleController, MockClock, Arc<ManualScheduler>) {
        let clock = MockClock::new(Instant::now());
        let scheduler = Arc::new(ManualScheduler::new());
        let controller = ThrottleController::new(Arc::new(clock.clone()), scheduler.clone());
        (controller, clock, scheduler)
    }

    /// Register `count` events spread over exactly one window
    fn burst(controller: &ThrottleController, clock: &MockClock, count: u32) -> Adjustment {
        let step = Duration::from_secs(1) / count;
        for _ in 0..count - 1 {
            clock.advance(step);
            assert_eq!(controller.register_event(), Adjustment::None);
        }
        // Land the last event exactly on the window boundary
        clock.advance(Duration::from_secs(1) - step * (count - 1));
        controller.register_event()
    }

    #[test]
    fn test_starts_at_minimum() {
        let (controller, _, _) = controller();
        assert!((controller.save_interval() - 0.1).abs() < EPSILON);
        assert_eq!(controller.event_rate(), 0.0);
    }

    #[test]
    fn test_heavy_window_increases_proportionally() {
        let (controller, clock, scheduler) = controller();
        let adjustment = burst(&controller, &clock, 1500);

        match adjustment {
            Adjustment::Increased { rate, interval } => {
                assert!((rate - 1500.0).abs() < 1.0);
                assert!((interval - 0.6).abs() < 1e-3);
            }
            other => panic!("expected increase, got {:?}", other),
        }
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_increase_is_capped() {
        let (controller, clock, _) = controller();
        for _ in 0..10 {
            burst(&controller, &clock, 5000);
        }
        assert!((controller.save_interval() - 1.5).abs() < EPSILON);
    }

    #[test]
    fn test_light_window_schedules_decrease_after_grace() {
        let (controller, clock, scheduler) = controller();
        burst(&controller, &clock, 2000);
        let raised = controller.save_interval();
        assert!(raised > 0.1);

        let adjustment = burst(&controller, &clock, 10);
        assert!(matches!(adjustment, Adjustment::DecreaseScheduled { .. }));
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_secs(1)]);

        // Nothing changes until the deferred task runs
        assert!((controller.save_interval() - raised).abs() < EPSILON);
        scheduler.run_pending();
        assert!((controller.save_interval() - (raised - 0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_no_decrease_scheduled_at_minimum() {
        let (controller, clock, scheduler) = controller();
        let adjustment = burst(&controller, &clock, 10);
        assert!(matches!(adjustment, Adjustment::Steady { .. }));
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn test_decrease_not_cancelled_by_later_increase() {
        let (controller, clock, scheduler) = controller();
        burst(&controller, &clock, 1200); // 0.1 + 0.2
        burst(&controller, &clock, 10); // schedules -0.1
        burst(&controller, &clock, 1100); // +0.1 before the decrease fires
        let before = controller.save_interval();
        assert!((before - 0.4).abs() < 1e-3);

        scheduler.run_pending();
        assert!((controller.save_interval() - (before - 0.1)).abs() < 1e-6);
    }

    #[test]
    fn test_relaxation_floors_at_minimum() {
        let (controller, clock, scheduler) = controller();
        burst(&controller, &clock, 1050); // 0.15
        burst(&controller, &clock, 10);
        burst(&controller, &clock, 10);
        scheduler.run_pending();
        assert!((controller.save_interval() - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_event_rate_reflects_open_window() {
        let (controller, clock, _) = controller();
        for _ in 0..50 {
            controller.register_event();
        }
        clock.advance(Duration::from_millis(500));
        assert!((controller.event_rate() - 100.0).abs() < 1e-6);
    }
}
