use std::thread;
use std::time::{Duration, Instant};

/// Source of "now" and the only way this program waits.
///
/// Every pause (rate limiter, retry backoff, inter-item delay) goes through a clock so
/// the whole pipeline can run against a manual clock in tests.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        if duration > Duration::from_secs(0) {
            thread::sleep(duration);
        }
    }
}

#[cfg(test)]
pub use self::manual::ManualClock;

#[cfg(test)]
mod manual {
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, Instant};

    use super::Clock;

    #[derive(Debug)]
    struct ManualState {
        now: Instant,
        sleeps: Vec<Duration>,
    }

    /// Clock that only moves when slept on or advanced. Clones share the same timeline.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        state: Rc<RefCell<ManualState>>,
    }

    impl ManualClock {
        pub fn new() -> ManualClock {
            ManualClock {
                state: Rc::new(RefCell::new(ManualState { now: Instant::now(), sleeps: Vec::new() })),
            }
        }

        pub fn advance(&self, duration: Duration) {
            self.state.borrow_mut().now += duration;
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.state.borrow().sleeps.clone()
        }

        pub fn total_slept(&self) -> Duration {
            self.state.borrow().sleeps.iter().sum()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.state.borrow().now
        }

        fn sleep(&self, duration: Duration) {
            let mut state = self.state.borrow_mut();
            state.now += duration;
            state.sleeps.push(duration);
        }
    }
}

#[test]
fn test_manual_clock_shares_timeline() {
    let clock = ManualClock::new();
    let other = clock.clone();
    let start = clock.now();

    other.sleep(Duration::from_secs(5));
    clock.advance(Duration::from_secs(1));

    assert_eq!(clock.now() - start, Duration::from_secs(6));
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(5)]);
    assert_eq!(other.total_slept(), Duration::from_secs(5));
}
