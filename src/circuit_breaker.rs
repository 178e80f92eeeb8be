// =============================================================================
// circuit_breaker.rs - THE PORTAL'S BOUNCER
// =============================================================================
//
// Session acquisition is the front door of every run. When the portal is down
// (and it goes down: it is a government website serving a country of a billion
// litigants), every parallel run would otherwise hammer that door, fail, and
// report the same outage N times.
//
// So all runs share one breaker in front of session acquisition:
//   Closed   -> requests flow, consecutive failures are counted
//   Open     -> acquisitions fail fast until the reset timeout passes
//   HalfOpen -> one probe goes through; success closes, failure reopens
//
// The breaker never retries anything itself. The run's own retry budgets
// (five CAPTCHAs, one session refresh) stay exactly what they are.
// =============================================================================

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    probe_successes: u32,
    opened_at: Option<Instant>,
    total_trips: u64,
}

pub struct CircuitBreaker {
    name: String,
    inner: Mutex<BreakerState>,
    failure_threshold: u32,
    reset_timeout: Duration,
    success_threshold: u32,
}

impl CircuitBreaker {
    pub fn new(
        name: impl Into<String>,
        failure_threshold: u32,
        reset_timeout: Duration,
        success_threshold: u32,
    ) -> Self {
        let name = name.into();
        info!(
            name = %name,
            failure_threshold,
            reset_timeout_secs = reset_timeout.as_secs(),
            success_threshold,
            "Circuit breaker armed in front of the portal"
        );

        Self {
            name,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                probe_successes: 0,
                opened_at: None,
                total_trips: 0,
            }),
            failure_threshold: failure_threshold.max(1),
            reset_timeout,
            success_threshold: success_threshold.max(1),
        }
    }

    /// May a request go out right now? Moves Open -> HalfOpen once the reset
    /// timeout has passed.
    pub fn allow_request(&self) -> bool {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled_down = inner
                    .opened_at
                    .map(|at| at.elapsed() >= self.reset_timeout)
                    .unwrap_or(true);

                if cooled_down {
                    info!(name = %self.name, "Circuit breaker OPEN -> HALF_OPEN, sending a probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_successes = 0;
                    true
                } else {
                    warn!(name = %self.name, "Circuit breaker OPEN, request refused");
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => inner.consecutive_failures = 0,
            CircuitState::HalfOpen => {
                inner.probe_successes += 1;
                if inner.probe_successes >= self.success_threshold {
                    info!(name = %self.name, "Circuit breaker HALF_OPEN -> CLOSED, portal is answering again");
                    inner.state = CircuitState::Closed;
                    inner.consecutive_failures = 0;
                    inner.probe_successes = 0;
                    inner.opened_at = None;
                }
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.failure_threshold {
                    warn!(
                        name = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit breaker TRIPPED, CLOSED -> OPEN"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(Instant::now());
                    inner.total_trips += 1;
                } else {
                    warn!(
                        name = %self.name,
                        failures = inner.consecutive_failures,
                        threshold = self.failure_threshold,
                        "Portal failure recorded"
                    );
                }
            }
            CircuitState::HalfOpen => {
                warn!(name = %self.name, "Probe failed, HALF_OPEN -> OPEN");
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                inner.total_trips += 1;
            }
            CircuitState::Open => inner.opened_at = Some(Instant::now()),
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn total_trips(&self) -> u64 {
        self.inner.lock().total_trips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_closed() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(5), 1);
        assert_eq!(cb.state(), CircuitState::Closed);
        assert!(cb.allow_request());
    }

    #[test]
    fn test_trips_after_threshold_failures() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(5), 1);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(!cb.allow_request());
        assert_eq!(cb.total_trips(), 1);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let cb = CircuitBreaker::new("test", 3, Duration::from_secs(5), 1);
        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_closes_on_success() {
        let cb = CircuitBreaker::new("test", 1, Duration::ZERO, 1);
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.allow_request());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_half_open_probe_failure_reopens() {
        let cb = CircuitBreaker::new("test", 1, Duration::ZERO, 1);
        cb.record_failure();
        assert!(cb.allow_request());
        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.total_trips(), 2);
    }
}
