//! Polled link state machine with hysteresis.

use std::time::{Duration, Instant};

/// Minimum back-off between reconnect attempts, per spec.md §4.6. Not a
/// named configuration option in spec.md §6 — see DESIGN.md.
const RETRY_MIN: Duration = Duration::from_millis(4_000);

/// Models the Wi-Fi station driver: the only interface the core consumes
/// (spec.md's external-collaborator boundary).
pub trait LinkDriver {
    /// Whether the link currently holds an IP address.
    fn has_ip(&mut self) -> bool;
    /// Kick off (or re-kick) an association attempt.
    fn begin_connect(&mut self);
}

/// An edge the monitor observed on this poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkEdge {
    None,
    Up,
    Down,
}

/// Hysteresis-gated link readiness over a [`LinkDriver`].
pub struct LinkMonitor<D> {
    driver: D,
    stabilize: Duration,
    has_ip_since: Option<Instant>,
    last_retry_at: Option<Instant>,
    was_ready: bool,
}

impl<D: LinkDriver> LinkMonitor<D> {
    /// `stabilize` is `timing.stabilize_ms` (spec.md §6): minimum time the
    /// link must have carried an IP before `ready()` reports true.
    #[must_use]
    pub fn new(driver: D, stabilize: Duration) -> Self {
        Self {
            driver,
            stabilize,
            has_ip_since: None,
            last_retry_at: None,
            was_ready: false,
        }
    }

    /// Whether the link has had an IP continuously for at least the
    /// stabilization period.
    #[must_use]
    pub const fn ready(&self) -> bool {
        self.was_ready
    }

    /// Poll the driver and update hysteresis state. Returns any up/down
    /// edge observed this call; the supervisor primes a one-shot replay on
    /// [`LinkEdge::Up`].
    pub fn poll(&mut self, now: Instant) -> LinkEdge {
        let has_ip = self.driver.has_ip();

        if has_ip {
            self.has_ip_since.get_or_insert(now);
        } else {
            self.has_ip_since = None;
            let should_retry = self
                .last_retry_at
                .is_none_or(|last| now.duration_since(last) >= RETRY_MIN);
            if should_retry {
                self.driver.begin_connect();
                self.last_retry_at = Some(now);
            }
        }

        let ready_now = self
            .has_ip_since
            .is_some_and(|since| now.duration_since(since) >= self.stabilize);

        let edge = match (self.was_ready, ready_now) {
            (false, true) => LinkEdge::Up,
            (true, false) => LinkEdge::Down,
            _ => LinkEdge::None,
        };
        self.was_ready = ready_now;
        edge
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STABILIZE: Duration = Duration::from_millis(2_500);

    struct FakeDriver {
        has_ip: bool,
        connect_attempts: u32,
    }

    impl LinkDriver for FakeDriver {
        fn has_ip(&mut self) -> bool {
            self.has_ip
        }

        fn begin_connect(&mut self) {
            self.connect_attempts += 1;
        }
    }

    #[test]
    fn not_ready_before_stabilization_period() {
        let mut monitor = LinkMonitor::new(
            FakeDriver {
                has_ip: true,
                connect_attempts: 0,
            },
            STABILIZE,
        );
        let t0 = Instant::now();
        monitor.poll(t0);
        assert!(!monitor.ready());
        monitor.poll(t0 + Duration::from_millis(1000));
        assert!(!monitor.ready());
    }

    #[test]
    fn ready_after_stabilization_and_emits_up_edge() {
        let mut monitor = LinkMonitor::new(
            FakeDriver {
                has_ip: true,
                connect_attempts: 0,
            },
            STABILIZE,
        );
        let t0 = Instant::now();
        monitor.poll(t0);
        let edge = monitor.poll(t0 + STABILIZE + Duration::from_millis(1));
        assert_eq!(edge, LinkEdge::Up);
        assert!(monitor.ready());
    }

    #[test]
    fn losing_ip_emits_down_edge_immediately() {
        let mut monitor = LinkMonitor::new(
            FakeDriver {
                has_ip: true,
                connect_attempts: 0,
            },
            STABILIZE,
        );
        let t0 = Instant::now();
        monitor.poll(t0);
        monitor.poll(t0 + STABILIZE + Duration::from_millis(1));
        assert!(monitor.ready());

        monitor.driver.has_ip = false;
        let edge = monitor.poll(t0 + STABILIZE + Duration::from_millis(2));
        assert_eq!(edge, LinkEdge::Down);
        assert!(!monitor.ready());
    }

    #[test]
    fn reconnect_respects_minimum_backoff() {
        let mut monitor = LinkMonitor::new(
            FakeDriver {
                has_ip: false,
                connect_attempts: 0,
            },
            STABILIZE,
        );
        let t0 = Instant::now();
        monitor.poll(t0);
        monitor.poll(t0 + Duration::from_millis(500));
        assert_eq!(monitor.driver.connect_attempts, 1);

        monitor.poll(t0 + RETRY_MIN + Duration::from_millis(1));
        assert_eq!(monitor.driver.connect_attempts, 2);
    }
}
